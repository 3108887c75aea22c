//! Exposes the struct `Encoder` that turns caller-tagged header fields
//! into HPACK representations, mirroring every table mutation the peer
//! decoder will perform.
//!
//! Output octets are batched through a fixed scratch buffer and surface
//! as `Data` events whenever it fills or the block ends; the rest of the
//! event stream matches the decode side so both ends stay in lockstep.

use crate::huffman;
use crate::integer::encode_integer;
use crate::table::{DynamicTable, TableIter};
use crate::validate::Validator;
use crate::{Event, FieldFlags, FieldName, HeaderField, HpackError, HpackResult};

const SCRATCH_SIZE: usize = 256;

/// Fixed-size output buffer flushed to the callback as it fills.
struct Scratch {
    buf: [u8; SCRATCH_SIZE],
    len: usize,
}

impl Scratch {
    fn new() -> Scratch {
        Scratch {
            buf: [0; SCRATCH_SIZE],
            len: 0,
        }
    }

    fn push<F: FnMut(Event)>(&mut self, byte: u8, cb: &mut F) {
        if self.len == SCRATCH_SIZE {
            self.flush(cb);
        }
        self.buf[self.len] = byte;
        self.len += 1;
    }

    fn write<F: FnMut(Event)>(&mut self, bytes: &[u8], cb: &mut F) {
        for &b in bytes {
            self.push(b, cb);
        }
    }

    fn flush<F: FnMut(Event)>(&mut self, cb: &mut F) {
        if self.len > 0 {
            log::trace!("HPACK: 编码输出缓冲刷新; len={}", self.len);
            cb(Event::Data(&self.buf[..self.len]));
            self.len = 0;
        }
    }
}

/// Encodes header lists using HPACK, holding the dynamic table its peer
/// decoder mirrors byte for byte.
pub struct Encoder {
    table: DynamicTable,
    defunct: bool,
}

impl Default for Encoder {
    fn default() -> Encoder {
        Encoder {
            table: DynamicTable::with_size(crate::DEFAULT_SETTINGS_HEADER_TABLE_SIZE, false),
            defunct: false,
        }
    }
}

impl Encoder {
    /// Creates an encoder whose dynamic table may hold up to `max` bytes.
    pub fn new(max: usize) -> HpackResult<Encoder> {
        Encoder::build(max, false)
    }

    /// Like `new`, but the table allocation can never change size again.
    pub fn fixed(max: usize) -> HpackResult<Encoder> {
        Encoder::build(max, true)
    }

    fn build(max: usize, fixed: bool) -> HpackResult<Encoder> {
        if max > u16::MAX as usize {
            return Err(HpackError::InvalidArgument);
        }
        Ok(Encoder {
            table: DynamicTable::with_size(max, fixed),
            defunct: false,
        })
    }

    /// Queues a new maximum for announcement at the next block head. With
    /// a soft cap in place the queued value is clamped to it.
    pub fn resize(&mut self, max: usize) -> HpackResult<()> {
        if self.defunct {
            return Err(HpackError::InvalidArgument);
        }
        if max > u16::MAX as usize {
            return Err(HpackError::InvalidArgument);
        }
        let clamped = match self.table.cap {
            Some(cap) => max.min(cap as usize),
            None => max,
        };
        self.table.enqueue_resize(clamped as u16)
    }

    /// Sets the soft cap this encoder will advertise before its next
    /// block, at most the agreed maximum.
    pub fn limit(&mut self, cap: usize) -> HpackResult<()> {
        if self.defunct {
            return Err(HpackError::InvalidArgument);
        }
        if cap > self.table.effective_max() {
            return Err(HpackError::InvalidArgument);
        }
        self.table.cap = Some(cap as u16);
        Ok(())
    }

    /// Shrinks the table allocation back to the current limit.
    pub fn trim(&mut self) -> HpackResult<()> {
        if self.defunct {
            return Err(HpackError::InvalidArgument);
        }
        self.table.trim()
    }

    pub fn table_size(&self) -> usize {
        self.table.size()
    }

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

    /// Iterates the dynamic entries newest to oldest.
    pub fn iter(&self) -> TableIter {
        self.table.iter()
    }

    /// Snapshot of the dynamic entries, newest first.
    pub fn table_to_vec(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.table.to_vec()
    }

    /// Finds a header in the tables: `(index, true)` on a full match,
    /// `(index, false)` when only the name is indexed.
    pub fn find(&self, name: &[u8], value: &[u8]) -> Option<(usize, bool)> {
        self.table.find(name, value)
    }

    /// Encodes one block out of tagged field descriptors, reporting wire
    /// output and table mutations through `cb`. A failure aborts the
    /// block and leaves the instance defunct.
    pub fn encode<F>(&mut self, fields: &[HeaderField], mut cb: F) -> HpackResult<()>
    where
        F: FnMut(Event),
    {
        if self.defunct {
            return Err(HpackError::InvalidArgument);
        }
        let res = self.run(fields, &mut cb);
        if let Err(e) = &res {
            if e.is_fatal() {
                self.defunct = true;
            }
        }
        res
    }

    /// Encodes a plain header list, picking the cheapest representation
    /// for each field the way `find` resolves it.
    pub fn encode_list<F>(
        &mut self,
        headers: &[(&[u8], &[u8])],
        flags: FieldFlags,
        mut cb: F,
    ) -> HpackResult<()>
    where
        F: FnMut(Event),
    {
        for &(name, value) in headers {
            let field = match self.table.find(name, value) {
                Some((index, true)) => HeaderField::Indexed(index as u16),
                Some((index, false)) => HeaderField::WithIndexing {
                    name: FieldName::Index(index as u16),
                    value,
                    flags,
                },
                None => HeaderField::WithIndexing {
                    name: FieldName::Literal(name),
                    value,
                    flags,
                },
            };
            self.encode(std::slice::from_ref(&field), &mut cb)?;
        }
        Ok(())
    }

    fn run<F: FnMut(Event)>(&mut self, fields: &[HeaderField], cb: &mut F) -> HpackResult<()> {
        let mut scratch = Scratch::new();
        // 块首先发送未确认的大小更新
        if let Some(min) = self.table.min.take() {
            let nxt = self.table.nxt.take().unwrap_or(min);
            self.emit_update(min as usize, &mut scratch, cb)?;
            if nxt != min {
                self.emit_update(nxt as usize, &mut scratch, cb)?;
            }
            self.table.max = nxt as usize;
        }
        if let Some(cap) = self.table.cap.take() {
            self.emit_update(cap as usize, &mut scratch, cb)?;
        }
        for field in fields {
            self.field(field, &mut scratch, cb)?;
        }
        scratch.flush(cb);
        Ok(())
    }

    fn emit_update<F: FnMut(Event)>(
        &mut self,
        size: usize,
        scratch: &mut Scratch,
        cb: &mut F,
    ) -> HpackResult<()> {
        encode_integer(size, 0x20, 5, &mut |b| scratch.push(b, cb));
        self.table.set_limit(size)?;
        log::trace!("HPACK: 编码动态表大小更新; limit={}", size);
        cb(Event::Table { size });
        Ok(())
    }

    fn field<F: FnMut(Event)>(
        &mut self,
        field: &HeaderField,
        scratch: &mut Scratch,
        cb: &mut F,
    ) -> HpackResult<()> {
        match *field {
            HeaderField::Indexed(index) => {
                cb(Event::Field);
                if self.table.get(index as usize).is_none() {
                    return Err(HpackError::IndexOutOfBounds);
                }
                encode_integer(index as usize, 0x80, 7, &mut |b| scratch.push(b, cb));
            }
            HeaderField::WithIndexing { name, value, flags } => {
                cb(Event::Field);
                let name_bytes = self.literal(name, value, flags, 0x40, 6, scratch, cb)?;
                self.table.insert(&name_bytes, value);
                cb(Event::Index {
                    size: self.table.size(),
                });
            }
            HeaderField::WithoutIndexing { name, value, flags } => {
                cb(Event::Field);
                self.literal(name, value, flags, 0x00, 4, scratch, cb)?;
            }
            HeaderField::NeverIndexed { name, value, flags } => {
                cb(Event::Field);
                cb(Event::Never);
                self.literal(name, value, flags, 0x10, 4, scratch, cb)?;
            }
        }
        Ok(())
    }

    /// Emits one literal representation and hands back the resolved name
    /// octets for a following insert.
    fn literal<F: FnMut(Event)>(
        &mut self,
        name: FieldName,
        value: &[u8],
        flags: FieldFlags,
        pattern: u8,
        prefix: u8,
        scratch: &mut Scratch,
        cb: &mut F,
    ) -> HpackResult<Vec<u8>> {
        let mut validator = Validator::new();
        let name_bytes: Vec<u8> = match name {
            FieldName::Index(index) => {
                let (n, _) = self
                    .table
                    .get(index as usize)
                    .ok_or(HpackError::IndexOutOfBounds)?;
                n.to_vec()
            }
            FieldName::Literal(n) => {
                if n.len() > u16::MAX as usize {
                    return Err(HpackError::FieldTooBig);
                }
                validator.reset(true);
                validator.push(n)?;
                validator.finish()?;
                n.to_vec()
            }
        };
        if value.len() > u16::MAX as usize {
            return Err(HpackError::FieldTooBig);
        }
        validator.reset(false);
        validator.push(value)?;
        validator.finish()?;

        match name {
            FieldName::Index(index) => {
                encode_integer(index as usize, pattern, prefix, &mut |b| scratch.push(b, cb));
            }
            FieldName::Literal(n) => {
                encode_integer(0, pattern, prefix, &mut |b| scratch.push(b, cb));
                self.string(n, flags.contains(FieldFlags::HUFFMAN_NAME), scratch, cb)?;
            }
        }
        self.string(value, flags.contains(FieldFlags::HUFFMAN_VALUE), scratch, cb)?;
        Ok(name_bytes)
    }

    fn string<F: FnMut(Event)>(
        &mut self,
        s: &[u8],
        huffman: bool,
        scratch: &mut Scratch,
        cb: &mut F,
    ) -> HpackResult<()> {
        if huffman {
            let coded_len = huffman::encoded_len(s);
            if coded_len > u16::MAX as usize {
                return Err(HpackError::FieldTooBig);
            }
            encode_integer(coded_len, 0x80, 7, &mut |b| scratch.push(b, cb));
            huffman::encode(s, &mut |b| scratch.push(b, cb));
        } else {
            encode_integer(s.len(), 0x00, 7, &mut |b| scratch.push(b, cb));
            scratch.write(s, cb);
        }
        Ok(())
    }
}
