// Copyright 2023 - 2024 Wenmeng See the COPYRIGHT
// file at the top-level directory of this distribution.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
//
// Author: tickbh
// -----
// Created Date: 2024/03/12 15:02:10

bitflags! {
    /// Per-field switches for the encoder.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct FieldFlags: u8 {
        const HUFFMAN_NAME = 0x1;
        const HUFFMAN_VALUE = 0x2;
    }
}

impl FieldFlags {
    pub fn raw() -> FieldFlags {
        FieldFlags::empty()
    }

    pub fn huffman() -> FieldFlags {
        FieldFlags::HUFFMAN_NAME | FieldFlags::HUFFMAN_VALUE
    }
}

/// A literal field names its header either by table index or by octets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldName<'a> {
    Index(u16),
    Literal(&'a [u8]),
}

/// One header field the caller hands to the encoder, tagged with the wire
/// representation it should take.
#[derive(Debug, Clone, Copy)]
pub enum HeaderField<'a> {
    /// The whole field is in the table.
    Indexed(u16),
    /// Literal with incremental indexing, the field enters the table.
    WithIndexing {
        name: FieldName<'a>,
        value: &'a [u8],
        flags: FieldFlags,
    },
    /// Literal without indexing.
    WithoutIndexing {
        name: FieldName<'a>,
        value: &'a [u8],
        flags: FieldFlags,
    },
    /// Literal that intermediaries must never index.
    NeverIndexed {
        name: FieldName<'a>,
        value: &'a [u8],
        flags: FieldFlags,
    },
}

/// Everything the codec reports through the user callback.
///
/// The order per field is fixed: `Field`, then `Never` when applicable,
/// then `Name`, `Value` with their `Data` continuations, then `Index`
/// after an insert. `Table` follows an applied size update, `Data` also
/// carries flushed wire output on the encode path.
///
/// When a raw string sits whole in the current input the `Name`/`Value`
/// event carries it directly in `data`; a huffman-coded or split string
/// announces `data: None` with its wire length and the octets follow in
/// `Data` events, so callers never have to buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event<'a> {
    /// A header field begins.
    Field,
    /// The current field uses the never-indexed representation.
    Never,
    Name { data: Option<&'a [u8]>, len: usize },
    Value { data: Option<&'a [u8]>, len: usize },
    Data(&'a [u8]),
    /// An entry entered the dynamic table, `size` is the table length now.
    Index { size: usize },
    /// A table size update took effect, `size` is the new limit.
    Table { size: usize },
}
