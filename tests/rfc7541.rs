use hpack_codec::{Decoder, Encoder, Event, FieldFlags, FieldName, HeaderField, HpackError};

/// Collects wire output from encoder events.
fn wire_of(events: &mut Vec<u8>) -> impl FnMut(Event) + '_ {
    move |event| {
        if let Event::Data(d) = event {
            events.extend_from_slice(d);
        }
    }
}

/// Assembles `(name, value)` pairs from a decode event stream, usable
/// across cut boundaries.
#[derive(Default)]
struct Assembler {
    list: Vec<(Vec<u8>, Vec<u8>)>,
    name: Vec<u8>,
    value: Vec<u8>,
    in_value: bool,
    has_field: bool,
}

impl Assembler {
    fn sink(&mut self) -> impl FnMut(Event) + '_ {
        move |event| match event {
            Event::Field => {
                self.close();
            }
            Event::Name { data, .. } => {
                self.name.clear();
                if let Some(d) = data {
                    self.name.extend_from_slice(d);
                }
                self.in_value = false;
                self.has_field = true;
            }
            Event::Value { data, .. } => {
                self.value.clear();
                if let Some(d) = data {
                    self.value.extend_from_slice(d);
                }
                self.in_value = true;
            }
            Event::Data(d) => {
                if self.in_value {
                    self.value.extend_from_slice(d);
                } else if self.has_field {
                    self.name.extend_from_slice(d);
                }
            }
            _ => {}
        }
    }

    fn close(&mut self) {
        if self.has_field && self.in_value {
            self.list.push((
                std::mem::take(&mut self.name),
                std::mem::take(&mut self.value),
            ));
        }
        self.in_value = false;
        self.has_field = false;
    }

    fn finish(mut self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.close();
        self.list
    }
}

fn pairs(list: &[(&str, &str)]) -> Vec<(Vec<u8>, Vec<u8>)> {
    list.iter()
        .map(|(n, v)| (n.as_bytes().to_vec(), v.as_bytes().to_vec()))
        .collect()
}

// RFC 7541 C.3, three plain-text requests over one connection.
const C_3_1: &[u8] = &[
    0x82, 0x86, 0x84, 0x41, 0x0f, 0x77, 0x77, 0x77, 0x2e, 0x65, 0x78, 0x61, 0x6d, 0x70, 0x6c,
    0x65, 0x2e, 0x63, 0x6f, 0x6d,
];
const C_3_2: &[u8] = &[
    0x82, 0x86, 0x84, 0xbe, 0x58, 0x08, 0x6e, 0x6f, 0x2d, 0x63, 0x61, 0x63, 0x68, 0x65,
];
const C_3_3: &[u8] = &[
    0x82, 0x87, 0x85, 0xbf, 0x40, 0x0a, 0x63, 0x75, 0x73, 0x74, 0x6f, 0x6d, 0x2d, 0x6b, 0x65,
    0x79, 0x0c, 0x63, 0x75, 0x73, 0x74, 0x6f, 0x6d, 0x2d, 0x76, 0x61, 0x6c, 0x75, 0x65,
];

// RFC 7541 C.4, the same requests with huffman-coded strings.
const C_4_1: &[u8] = &[
    0x82, 0x86, 0x84, 0x41, 0x8c, 0xf1, 0xe3, 0xc2, 0xe5, 0xf2, 0x3a, 0x6b, 0xa0, 0xab, 0x90,
    0xf4, 0xff,
];
const C_4_2: &[u8] = &[
    0x82, 0x86, 0x84, 0xbe, 0x58, 0x86, 0xa8, 0xeb, 0x10, 0x64, 0x9c, 0xbf,
];
const C_4_3: &[u8] = &[
    0x82, 0x87, 0x85, 0xbf, 0x40, 0x88, 0x25, 0xa8, 0x49, 0xe9, 0x5b, 0xa9, 0x7d, 0x7f, 0x89,
    0x25, 0xa8, 0x49, 0xe9, 0x5b, 0xb8, 0xe8, 0xb4, 0xbf,
];

const REQUEST_1: &[(&str, &str)] = &[
    (":method", "GET"),
    (":scheme", "http"),
    (":path", "/"),
    (":authority", "www.example.com"),
];
const REQUEST_2: &[(&str, &str)] = &[
    (":method", "GET"),
    (":scheme", "http"),
    (":path", "/"),
    (":authority", "www.example.com"),
    ("cache-control", "no-cache"),
];
const REQUEST_3: &[(&str, &str)] = &[
    (":method", "GET"),
    (":scheme", "https"),
    (":path", "/index.html"),
    (":authority", "www.example.com"),
    ("custom-key", "custom-value"),
];

fn check_request_sequence(blocks: [&[u8]; 3]) {
    let mut dec = Decoder::new(4096).unwrap();

    let list = dec.decode_list(blocks[0]).unwrap();
    assert_eq!(list, pairs(REQUEST_1));
    assert_eq!(dec.table_size(), 57);
    assert_eq!(
        dec.table_to_vec(),
        pairs(&[(":authority", "www.example.com")])
    );

    let list = dec.decode_list(blocks[1]).unwrap();
    assert_eq!(list, pairs(REQUEST_2));
    assert_eq!(dec.table_size(), 110);
    assert_eq!(
        dec.table_to_vec(),
        pairs(&[
            ("cache-control", "no-cache"),
            (":authority", "www.example.com"),
        ])
    );

    let list = dec.decode_list(blocks[2]).unwrap();
    assert_eq!(list, pairs(REQUEST_3));
    assert_eq!(dec.table_size(), 164);
    assert_eq!(
        dec.table_to_vec(),
        pairs(&[
            ("custom-key", "custom-value"),
            ("cache-control", "no-cache"),
            (":authority", "www.example.com"),
        ])
    );
}

#[test]
fn decode_c3_request_sequence() {
    check_request_sequence([C_3_1, C_3_2, C_3_3]);
}

#[test]
fn decode_c4_huffman_request_sequence() {
    check_request_sequence([C_4_1, C_4_2, C_4_3]);
}

fn encode_requests(flags: FieldFlags) -> (Encoder, [Vec<u8>; 3]) {
    let mut enc = Encoder::new(4096).unwrap();
    let mut out = [Vec::new(), Vec::new(), Vec::new()];
    for (i, request) in [REQUEST_1, REQUEST_2, REQUEST_3].iter().enumerate() {
        let headers: Vec<(&[u8], &[u8])> = request
            .iter()
            .map(|(n, v)| (n.as_bytes(), v.as_bytes()))
            .collect();
        enc.encode_list(&headers, flags, wire_of(&mut out[i])).unwrap();
    }
    (enc, out)
}

#[test]
fn encode_c3_byte_exact() {
    let (enc, out) = encode_requests(FieldFlags::raw());
    assert_eq!(out[0], C_3_1);
    assert_eq!(out[1], C_3_2);
    assert_eq!(out[2], C_3_3);
    assert_eq!(enc.table_size(), 164);
}

#[test]
fn encode_c4_byte_exact() {
    let (enc, out) = encode_requests(FieldFlags::huffman());
    assert_eq!(out[0], C_4_1);
    assert_eq!(out[1], C_4_2);
    assert_eq!(out[2], C_4_3);
    assert_eq!(enc.table_size(), 164);
}

#[test]
fn encoder_and_decoder_tables_mirror() {
    let (enc, out) = encode_requests(FieldFlags::huffman());
    let mut dec = Decoder::new(4096).unwrap();
    for block in out.iter() {
        dec.decode_list(block).unwrap();
    }
    assert_eq!(enc.table_size(), dec.table_size());
    assert_eq!(enc.table_count(), dec.table_count());
    assert_eq!(enc.table_to_vec(), dec.table_to_vec());
}

#[test]
fn resumability_at_every_split() {
    let whole = {
        let mut dec = Decoder::new(4096).unwrap();
        dec.decode_list(C_4_1).unwrap()
    };
    for cut in 0..=C_4_1.len() {
        let mut dec = Decoder::new(4096).unwrap();
        let mut asm = Assembler::default();
        let res = dec.decode(&C_4_1[..cut], true, asm.sink());
        assert_eq!(res, Err(HpackError::BlockContinues), "cut={}", cut);
        let res = dec.decode(&C_4_1[cut..], false, asm.sink());
        assert!(res.is_ok(), "cut={}", cut);
        assert_eq!(asm.finish(), whole, "cut={}", cut);
        assert_eq!(dec.table_size(), 57);
    }
}

#[test]
fn resumability_byte_by_byte() {
    let mut dec = Decoder::new(4096).unwrap();
    let mut asm = Assembler::default();
    for (i, &b) in C_3_3.iter().enumerate() {
        let last = i + 1 == C_3_3.len();
        let res = dec.decode(&[b], !last, asm.sink());
        if last {
            assert!(res.is_ok());
        } else {
            assert_eq!(res, Err(HpackError::BlockContinues));
        }
    }
    assert_eq!(asm.finish(), pairs(REQUEST_3));
}

#[test]
fn all_representations_round_trip() {
    let mut enc = Encoder::new(4096).unwrap();
    let mut dec = Decoder::new(4096).unwrap();
    let fields = [
        HeaderField::Indexed(2),
        HeaderField::WithIndexing {
            name: FieldName::Literal(b"x-trace-id"),
            value: b"0af7651916cd43dd8448eb211c80319c",
            flags: FieldFlags::HUFFMAN_VALUE,
        },
        HeaderField::WithoutIndexing {
            name: FieldName::Index(4),
            value: b"/metrics",
            flags: FieldFlags::raw(),
        },
        HeaderField::NeverIndexed {
            name: FieldName::Literal(b"authorization"),
            value: b"Basic dGVzdDp0ZXN0",
            flags: FieldFlags::huffman(),
        },
        HeaderField::Indexed(62),
    ];
    let mut block = Vec::new();
    enc.encode(&fields, wire_of(&mut block)).unwrap();

    let mut never_seen = 0;
    let mut asm = Assembler::default();
    {
        let mut sink = asm.sink();
        dec.decode(&block, false, |event| {
            if let Event::Never = event {
                never_seen += 1;
            }
            sink(event);
        })
        .unwrap();
    }
    assert_eq!(never_seen, 1);
    assert_eq!(
        asm.finish(),
        vec![
            (b":method".to_vec(), b"GET".to_vec()),
            (
                b"x-trace-id".to_vec(),
                b"0af7651916cd43dd8448eb211c80319c".to_vec()
            ),
            (b":path".to_vec(), b"/metrics".to_vec()),
            (b"authorization".to_vec(), b"Basic dGVzdDp0ZXN0".to_vec()),
            (
                b"x-trace-id".to_vec(),
                b"0af7651916cd43dd8448eb211c80319c".to_vec()
            ),
        ]
    );
    assert_eq!(enc.table_to_vec(), dec.table_to_vec());
}

#[test]
fn resize_announcement_crosses_the_wire() {
    // monotonic shrink: one update is required and accepted
    let mut enc = Encoder::new(256).unwrap();
    enc.resize(128).unwrap();
    enc.resize(64).unwrap();
    let mut block = Vec::new();
    enc.encode(&[HeaderField::Indexed(2)], wire_of(&mut block)).unwrap();

    let mut dec = Decoder::new(256).unwrap();
    dec.resize(128).unwrap();
    dec.resize(64).unwrap();
    dec.decode_list(&block).unwrap();
    assert_eq!(dec.table_limit(), 64);
    assert_eq!(enc.table_limit(), 64);
    assert_eq!(dec.max_table_size(), 64);
}

#[test]
fn shrink_then_grow_announcement_crosses_the_wire() {
    let mut enc = Encoder::new(256).unwrap();
    enc.resize(64).unwrap();
    enc.resize(192).unwrap();
    let mut block = Vec::new();
    enc.encode(&[HeaderField::Indexed(2)], wire_of(&mut block)).unwrap();

    let mut dec = Decoder::new(256).unwrap();
    dec.resize(64).unwrap();
    dec.resize(192).unwrap();
    let mut updates = Vec::new();
    dec.decode(&block, false, |event| {
        if let Event::Table { size } = event {
            updates.push(size);
        }
    })
    .unwrap();
    assert_eq!(updates, vec![64, 192]);
    assert_eq!(dec.table_limit(), 192);
    assert_eq!(enc.table_limit(), 192);
}

#[test]
fn eviction_mirrors_across_small_tables() {
    let mut enc = Encoder::new(128).unwrap();
    let mut dec = Decoder::new(128).unwrap();
    let headers: Vec<(Vec<u8>, Vec<u8>)> = (0..12)
        .map(|i| {
            (
                format!("x-header-{:02}", i).into_bytes(),
                format!("value-number-{:02}", i).into_bytes(),
            )
        })
        .collect();
    for (name, value) in headers.iter() {
        let borrowed: Vec<(&[u8], &[u8])> = vec![(name.as_slice(), value.as_slice())];
        let mut block = Vec::new();
        enc.encode_list(&borrowed, FieldFlags::raw(), wire_of(&mut block))
            .unwrap();
        dec.decode_list(&block).unwrap();
        assert_eq!(enc.table_size(), dec.table_size());
        assert!(dec.table_size() <= 128);
    }
    assert_eq!(enc.table_to_vec(), dec.table_to_vec());
    assert!(dec.table_count() >= 1);
}

#[test]
fn defunct_decoder_stays_defunct() {
    let mut dec = Decoder::new(4096).unwrap();
    assert_eq!(
        dec.decode(&[0x82, 0x28], false, |_| {}),
        Err(HpackError::UpdateNotAllowed)
    );
    assert_eq!(dec.decode(&[0x82], false, |_| {}), Err(HpackError::InvalidArgument));
    assert_eq!(dec.resize(128), Err(HpackError::InvalidArgument));
    assert_eq!(dec.trim(), Err(HpackError::InvalidArgument));
}

#[test]
fn strerror_covers_every_code() {
    let codes = [
        HpackError::BlockContinues,
        HpackError::InvalidArgument,
        HpackError::BufferExhausted,
        HpackError::IntegerOverflow,
        HpackError::SizeExceeded,
        HpackError::InvalidCharacter,
        HpackError::IndexOutOfBounds,
        HpackError::UpdateNotAllowed,
        HpackError::MissingSizeUpdate,
        HpackError::OutOfMemory,
        HpackError::Truncated,
        HpackError::Busy,
        HpackError::FieldTooBig,
        HpackError::ReallocForbidden,
        HpackError::FieldSkipped,
    ];
    for code in codes {
        assert!(!code.to_string().is_empty());
        assert_eq!(code.is_partial(), code == HpackError::BlockContinues);
    }
}
