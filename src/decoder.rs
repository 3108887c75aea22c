//! Exposes the struct `Decoder` that walks HPACK-encoded header blocks one
//! representation at a time and reports every decoded element through a
//! caller-supplied callback.
//!
//! The decoder only follows HPACK rules, without performing any additional
//! semantic checks on the header name/value pairs beyond the character
//! alphabets RFC 7541 imposes.
//!
//! # Example
//!
//! ```rust
//! use hpack_codec::Decoder;
//! let mut decoder = Decoder::new(4096).unwrap();
//!
//! let header_list = decoder.decode_list(&[0x82, 0x84]).unwrap();
//!
//! assert_eq!(header_list, [
//!     (b":method".to_vec(), b"GET".to_vec()),
//!     (b":path".to_vec(), b"/".to_vec()),
//! ]);
//! ```
//!
//! Input may stop at any byte boundary: a decode call with `cut` set
//! suspends with `BlockContinues` instead of failing, and the next call
//! picks the block up exactly where it stopped.

use crate::huffman::HuffmanDecoder;
use crate::integer::IntegerDecoder;
use crate::table::{DynamicTable, TableIter, ENTRY_OVERHEAD};
use crate::validate::Validator;
use crate::{Event, HpackError, HpackResult};

/// Different variants of how a particular header field can be represented
/// in an HPACK encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldRepresentation {
    Indexed,
    LiteralWithIncrementalIndexing,
    SizeUpdate,
    LiteralNeverIndexed,
    LiteralWithoutIndexing,
}

impl FieldRepresentation {
    /// Based on the given octet, returns the type of the field
    /// representation, from the top-order bits down.
    fn new(octet: u8) -> FieldRepresentation {
        if octet & 128 == 128 {
            FieldRepresentation::Indexed
        } else if octet & 64 == 64 {
            FieldRepresentation::LiteralWithIncrementalIndexing
        } else if octet & 32 == 32 {
            FieldRepresentation::SizeUpdate
        } else if octet & 16 == 16 {
            FieldRepresentation::LiteralNeverIndexed
        } else {
            FieldRepresentation::LiteralWithoutIndexing
        }
    }

    fn prefix(&self) -> u8 {
        match self {
            FieldRepresentation::Indexed => 7,
            FieldRepresentation::LiteralWithIncrementalIndexing => 6,
            FieldRepresentation::SizeUpdate => 5,
            FieldRepresentation::LiteralNeverIndexed => 4,
            FieldRepresentation::LiteralWithoutIndexing => 4,
        }
    }
}

/// Where the parser stands inside the current representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    FieldInt,
    NameLen,
    NameStr,
    ValueLen,
    ValueStr,
}

/// Everything that has to survive a cut so the next call resumes exactly
/// where the input stopped.
#[derive(Debug)]
struct DecodeState {
    step: Step,
    int: IntegerDecoder,
    repr: FieldRepresentation,
    can_update: bool,
    /// A two-update announce had its first half accepted.
    await_second: bool,
    insert: bool,
    /// The staged field stopped fitting the table, it will clear-and-skip.
    oversize: bool,
    str_remaining: usize,
    str_huffman: bool,
    huff: HuffmanDecoder,
    validator: Validator,
    staged_name: Vec<u8>,
    staged_value: Vec<u8>,
}

impl DecodeState {
    fn new() -> DecodeState {
        DecodeState {
            step: Step::FieldInt,
            int: IntegerDecoder::new(),
            repr: FieldRepresentation::Indexed,
            can_update: true,
            await_second: false,
            insert: false,
            oversize: false,
            str_remaining: 0,
            str_huffman: false,
            huff: HuffmanDecoder::new(),
            validator: Validator::new(),
            staged_name: Vec::new(),
            staged_value: Vec::new(),
        }
    }

    fn reset_block(&mut self) {
        self.step = Step::FieldInt;
        self.int = IntegerDecoder::new();
        self.can_update = true;
        self.await_second = false;
        self.insert = false;
        self.oversize = false;
        self.str_remaining = 0;
        self.huff.reset();
        self.staged_name.clear();
        self.staged_value.clear();
    }
}

/// Decodes headers encoded using HPACK, maintaining the dynamic table the
/// peer encoder mirrors.
pub struct Decoder {
    table: DynamicTable,
    state: DecodeState,
    scratch: Vec<u8>,
    defunct: bool,
    blocked: bool,
}

impl Default for Decoder {
    fn default() -> Decoder {
        Decoder {
            table: DynamicTable::with_size(crate::DEFAULT_SETTINGS_HEADER_TABLE_SIZE, false),
            state: DecodeState::new(),
            scratch: Vec::new(),
            defunct: false,
            blocked: false,
        }
    }
}

impl Decoder {
    /// Creates a decoder whose dynamic table may hold up to `max` bytes,
    /// the transport-advertised SETTINGS value.
    pub fn new(max: usize) -> HpackResult<Decoder> {
        Decoder::build(max, false)
    }

    /// Like `new`, but the table allocation can never change size again.
    pub fn fixed(max: usize) -> HpackResult<Decoder> {
        Decoder::build(max, true)
    }

    fn build(max: usize, fixed: bool) -> HpackResult<Decoder> {
        if max > u16::MAX as usize {
            return Err(HpackError::InvalidArgument);
        }
        Ok(Decoder {
            table: DynamicTable::with_size(max, fixed),
            state: DecodeState::new(),
            scratch: Vec::new(),
            defunct: false,
            blocked: false,
        })
    }

    /// Queues an expectation: the peer advertised a new maximum and its
    /// next block must open with the matching size updates.
    pub fn resize(&mut self, max: usize) -> HpackResult<()> {
        if self.defunct {
            return Err(HpackError::InvalidArgument);
        }
        if self.blocked {
            return Err(HpackError::Busy);
        }
        if max > u16::MAX as usize {
            return Err(HpackError::InvalidArgument);
        }
        self.table.enqueue_resize(max as u16)
    }

    /// Shrinks the table allocation back to the current limit.
    pub fn trim(&mut self) -> HpackResult<()> {
        if self.defunct {
            return Err(HpackError::InvalidArgument);
        }
        if self.blocked {
            return Err(HpackError::Busy);
        }
        self.table.trim()
    }

    /// Bytes currently stored in the dynamic table.
    pub fn table_size(&self) -> usize {
        self.table.size()
    }

    /// The limit currently in effect.
    pub fn table_limit(&self) -> usize {
        self.table.lim
    }

    pub fn table_count(&self) -> usize {
        self.table.count()
    }

    pub fn max_table_size(&self) -> usize {
        self.table.max
    }

    /// Bytes currently allocated for the table ring.
    pub fn table_capacity(&self) -> usize {
        self.table.mem()
    }

    /// True while a cut block waits for its continuation.
    pub fn is_busy(&self) -> bool {
        self.blocked
    }

    /// Iterates the dynamic entries newest to oldest.
    pub fn iter(&self) -> TableIter {
        self.table.iter()
    }

    /// Snapshot of the dynamic entries, newest first.
    pub fn table_to_vec(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.table.to_vec()
    }

    /// Decodes one chunk of a header block, reporting through `cb`.
    ///
    /// With `cut` set the chunk may stop anywhere and the call suspends
    /// with `BlockContinues`; without it the chunk must close the block or
    /// the instance dies with `Truncated`. Any other error is fatal and
    /// marks the instance defunct.
    pub fn decode<F>(&mut self, blk: &[u8], cut: bool, mut cb: F) -> HpackResult<()>
    where
        F: FnMut(Event),
    {
        if self.defunct {
            return Err(HpackError::InvalidArgument);
        }
        let res = self.run(blk, &mut cb);
        match res {
            Ok(()) => {
                if cut {
                    self.blocked = true;
                    return Err(HpackError::BlockContinues);
                }
                if self.state.step != Step::FieldInt || self.state.int.is_busy() {
                    self.defunct = true;
                    return Err(HpackError::Truncated);
                }
                if self.table.min.is_some() || self.state.await_second {
                    self.defunct = true;
                    return Err(HpackError::MissingSizeUpdate);
                }
                self.blocked = false;
                self.state.reset_block();
                Ok(())
            }
            Err(e) => {
                if e.is_fatal() {
                    self.defunct = true;
                }
                Err(e)
            }
        }
    }

    /// Convenience wrapper assembling owned `(name, value)` pairs out of
    /// the event stream. The block must be complete.
    pub fn decode_list(&mut self, blk: &[u8]) -> HpackResult<Vec<(Vec<u8>, Vec<u8>)>> {
        enum Cur {
            Idle,
            Name,
            Value,
        }
        let mut list: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        let mut name: Vec<u8> = Vec::new();
        let mut value: Vec<u8> = Vec::new();
        let mut cur = Cur::Idle;
        self.decode(blk, false, |event| match event {
            Event::Field => {
                if let Cur::Value = cur {
                    list.push((std::mem::take(&mut name), std::mem::take(&mut value)));
                }
                cur = Cur::Idle;
            }
            Event::Name { data, .. } => {
                name.clear();
                if let Some(d) = data {
                    name.extend_from_slice(d);
                }
                cur = Cur::Name;
            }
            Event::Value { data, .. } => {
                value.clear();
                if let Some(d) = data {
                    value.extend_from_slice(d);
                }
                cur = Cur::Value;
            }
            Event::Data(d) => match cur {
                Cur::Name => name.extend_from_slice(d),
                Cur::Value => value.extend_from_slice(d),
                Cur::Idle => {}
            },
            _ => {}
        })?;
        if let Cur::Value = cur {
            list.push((name, value));
        }
        Ok(list)
    }

    fn run<F: FnMut(Event)>(&mut self, blk: &[u8], cb: &mut F) -> HpackResult<()> {
        let mut pos = 0;
        while pos < blk.len() {
            match self.state.step {
                Step::FieldInt => {
                    let octet = blk[pos];
                    pos += 1;
                    let done = if self.state.int.is_busy() {
                        self.state.int.step(octet)?
                    } else {
                        let repr = FieldRepresentation::new(octet);
                        self.dispatch(repr, cb)?;
                        self.state.int.start(octet, repr.prefix())?
                    };
                    if let Some(v) = done {
                        self.field_int(v as usize, cb)?;
                    }
                }
                Step::NameLen => {
                    let octet = blk[pos];
                    pos += 1;
                    let done = if self.state.int.is_busy() {
                        self.state.int.step(octet)?
                    } else {
                        self.state.str_huffman = octet & 0x80 == 0x80;
                        self.state.int.start(octet, 7)?
                    };
                    if let Some(len) = done {
                        self.begin_string(len as usize, true, blk, &mut pos, cb)?;
                    }
                }
                Step::NameStr => {
                    self.string_chunk(true, blk, &mut pos, cb)?;
                }
                Step::ValueLen => {
                    let octet = blk[pos];
                    pos += 1;
                    let done = if self.state.int.is_busy() {
                        self.state.int.step(octet)?
                    } else {
                        self.state.str_huffman = octet & 0x80 == 0x80;
                        self.state.int.start(octet, 7)?
                    };
                    if let Some(len) = done {
                        self.begin_string(len as usize, false, blk, &mut pos, cb)?;
                    }
                }
                Step::ValueStr => {
                    self.string_chunk(false, blk, &mut pos, cb)?;
                }
            }
        }
        Ok(())
    }

    /// Applies the per-block framing rules when a representation starts.
    fn dispatch<F: FnMut(Event)>(
        &mut self,
        repr: FieldRepresentation,
        cb: &mut F,
    ) -> HpackResult<()> {
        if repr == FieldRepresentation::SizeUpdate {
            if !self.state.can_update {
                return Err(HpackError::UpdateNotAllowed);
            }
            self.state.repr = repr;
            return Ok(());
        }
        // 首个普通字段之前必须完成所有待确认的更新
        if self.table.min.is_some() || self.state.await_second {
            return Err(HpackError::MissingSizeUpdate);
        }
        self.state.can_update = false;
        self.state.repr = repr;
        self.state.insert = repr == FieldRepresentation::LiteralWithIncrementalIndexing;
        self.state.oversize = false;
        self.state.staged_name.clear();
        self.state.staged_value.clear();
        cb(Event::Field);
        if repr == FieldRepresentation::LiteralNeverIndexed {
            cb(Event::Never);
        }
        Ok(())
    }

    /// The representation's leading integer is complete.
    fn field_int<F: FnMut(Event)>(&mut self, v: usize, cb: &mut F) -> HpackResult<()> {
        match self.state.repr {
            FieldRepresentation::Indexed => {
                let (name, value) = self
                    .table
                    .get(v)
                    .ok_or(HpackError::IndexOutOfBounds)?;
                log::trace!("HPACK: 解码索引头字段; index={}", v);
                cb(Event::Name {
                    data: Some(name),
                    len: name.len(),
                });
                cb(Event::Value {
                    data: Some(value),
                    len: value.len(),
                });
                self.state.step = Step::FieldInt;
            }
            FieldRepresentation::SizeUpdate => {
                self.size_update(v, cb)?;
                self.state.step = Step::FieldInt;
            }
            _ => {
                if v == 0 {
                    self.state.step = Step::NameLen;
                } else {
                    let (name, _) = self
                        .table
                        .get(v)
                        .ok_or(HpackError::IndexOutOfBounds)?;
                    cb(Event::Name {
                        data: Some(name),
                        len: name.len(),
                    });
                    let staged = if self.state.insert {
                        name.to_vec()
                    } else {
                        Vec::new()
                    };
                    if self.state.insert {
                        self.stage(&staged, true);
                    }
                    self.state.step = Step::ValueLen;
                }
            }
        }
        Ok(())
    }

    /// A string length is known; either hand the raw octets over whole or
    /// switch to the streaming path.
    fn begin_string<F: FnMut(Event)>(
        &mut self,
        len: usize,
        name: bool,
        blk: &[u8],
        pos: &mut usize,
        cb: &mut F,
    ) -> HpackResult<()> {
        self.state.validator.reset(name);
        if !self.state.str_huffman && blk.len() - *pos >= len {
            let data = &blk[*pos..*pos + len];
            *pos += len;
            self.state.validator.push(data)?;
            self.state.validator.finish()?;
            if name {
                cb(Event::Name {
                    data: Some(data),
                    len,
                });
                self.stage(data, true);
                self.state.step = Step::ValueLen;
            } else {
                cb(Event::Value {
                    data: Some(data),
                    len,
                });
                self.stage(data, false);
                self.field_done(cb)?;
            }
            return Ok(());
        }
        self.state.huff.reset();
        self.state.str_remaining = len;
        if name {
            cb(Event::Name { data: None, len });
            self.state.step = Step::NameStr;
        } else {
            cb(Event::Value { data: None, len });
            self.state.step = Step::ValueStr;
        }
        if len == 0 {
            self.finish_string(name, cb)?;
        }
        Ok(())
    }

    /// Feeds as much of the current string as the input holds.
    fn string_chunk<F: FnMut(Event)>(
        &mut self,
        name: bool,
        blk: &[u8],
        pos: &mut usize,
        cb: &mut F,
    ) -> HpackResult<()> {
        let take = self.state.str_remaining.min(blk.len() - *pos);
        let chunk = &blk[*pos..*pos + take];
        *pos += take;
        self.state.str_remaining -= take;
        if self.state.str_huffman {
            self.scratch.clear();
            self.state.huff.decode(chunk, &mut self.scratch)?;
            if !self.scratch.is_empty() {
                self.state.validator.push(&self.scratch)?;
                let staged = std::mem::take(&mut self.scratch);
                self.stage(&staged, name);
                cb(Event::Data(&staged));
                self.scratch = staged;
            }
        } else if !chunk.is_empty() {
            self.state.validator.push(chunk)?;
            self.stage(chunk, name);
            cb(Event::Data(chunk));
        }
        if self.state.str_remaining == 0 {
            self.finish_string(name, cb)?;
        }
        Ok(())
    }

    fn finish_string<F: FnMut(Event)>(&mut self, name: bool, cb: &mut F) -> HpackResult<()> {
        if self.state.str_huffman {
            self.state.huff.finish().map_err(HpackError::from)?;
        }
        self.state.validator.finish()?;
        if name {
            self.state.step = Step::ValueLen;
        } else {
            self.field_done(cb)?;
        }
        Ok(())
    }

    /// The value is complete: perform the insert when the representation
    /// asks for one, then return to the field boundary.
    fn field_done<F: FnMut(Event)>(&mut self, cb: &mut F) -> HpackResult<()> {
        if self.state.insert {
            if self.state.oversize {
                self.table.adjust(0);
            } else {
                let name = std::mem::take(&mut self.state.staged_name);
                let value = std::mem::take(&mut self.state.staged_value);
                self.table.insert(&name, &value);
            }
            cb(Event::Index {
                size: self.table.size(),
            });
        }
        self.state.insert = false;
        self.state.oversize = false;
        self.state.staged_name.clear();
        self.state.staged_value.clear();
        self.state.step = Step::FieldInt;
        Ok(())
    }

    /// Copies decoded octets into the staging area of a pending insert,
    /// degrading to clear-and-skip as soon as the cost leaves the limit.
    fn stage(&mut self, bytes: &[u8], name: bool) {
        if !self.state.insert || self.state.oversize {
            return;
        }
        let lim = self.table.lim;
        let st = &mut self.state;
        if name {
            st.staged_name.extend_from_slice(bytes);
        } else {
            st.staged_value.extend_from_slice(bytes);
        }
        if st.staged_name.len() + st.staged_value.len() + ENTRY_OVERHEAD > lim {
            st.oversize = true;
            st.staged_name = Vec::new();
            st.staged_value = Vec::new();
        }
    }

    fn size_update<F: FnMut(Event)>(&mut self, v: usize, cb: &mut F) -> HpackResult<()> {
        if v > self.table.effective_max() {
            return Err(HpackError::SizeExceeded);
        }
        if self.state.await_second {
            let nxt = self.table.nxt.unwrap_or(0) as usize;
            if v > nxt {
                return Err(HpackError::MissingSizeUpdate);
            }
            self.state.await_second = false;
            self.table.nxt = None;
            self.table.max = nxt;
            self.table.set_limit(v)?;
        } else if let Some(min) = self.table.min {
            if v != min as usize {
                return Err(HpackError::MissingSizeUpdate);
            }
            let nxt = self.table.nxt.unwrap_or(min);
            self.table.min = None;
            if nxt == min {
                self.table.nxt = None;
                self.table.max = nxt as usize;
            } else {
                self.state.await_second = true;
            }
            self.table.set_limit(v)?;
        } else {
            // 对端主动缩小动态表
            self.table.set_limit(v)?;
        }
        log::trace!("HPACK: 动态表大小更新; limit={}", v);
        cb(Event::Table { size: v });
        Ok(())
    }
}
