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
// Created Date: 2024/03/12 11:08:33

use std::collections::{vec_deque, HashMap, VecDeque};

use lazy_static::lazy_static;

use crate::{HpackError, HpackResult};

/// Per-entry overhead mandated by RFC 7541 Section 4.1.
pub const ENTRY_OVERHEAD: usize = 32;

/// Dynamic entries start right after the static table.
pub const DYNAMIC_TABLE_OFFSET: usize = 62;

/// One dynamic entry: the packed name and value live in the ring, the
/// metadata records where.
#[derive(Debug, Clone, Copy)]
struct Entry {
    off: usize,
    name_len: u16,
    value_len: u16,
}

impl Entry {
    fn payload(&self) -> usize {
        self.name_len as usize + self.value_len as usize
    }

    fn size(&self) -> usize {
        self.payload() + ENTRY_OVERHEAD
    }
}

/// The indexing table: 61 immutable static entries plus a FIFO of dynamic
/// entries whose octets live in one contiguous ring allocation.
///
/// Payload space is claimed downward from `head`; eviction always drops
/// the oldest entry at the high end. When the run below `head` is too
/// small for a new payload the live payloads are repacked against the top
/// of the ring, which the byte accounting guarantees makes room without
/// ever evicting more than the RFC requires.
#[derive(Debug, Clone)]
pub(crate) struct DynamicTable {
    ring: Vec<u8>,
    entries: VecDeque<Entry>,
    head: usize,
    /// Sum of entry sizes currently stored.
    len: usize,
    /// Current limit in effect.
    pub(crate) lim: usize,
    /// Peer-agreed maximum, the SETTINGS mirror.
    pub(crate) max: usize,
    /// Announce queue: final pending size.
    pub(crate) nxt: Option<u16>,
    /// Announce queue: smallest pending size, advertised first.
    pub(crate) min: Option<u16>,
    /// Encoder-side soft cap to advertise before the next block.
    pub(crate) cap: Option<u16>,
    fixed: bool,
}

impl DynamicTable {
    pub fn with_size(max: usize, fixed: bool) -> DynamicTable {
        DynamicTable {
            ring: vec![0; max],
            entries: VecDeque::new(),
            head: max,
            len: 0,
            lim: max,
            max,
            nxt: None,
            min: None,
            cap: None,
            fixed,
        }
    }

    pub fn size(&self) -> usize {
        self.len
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn mem(&self) -> usize {
        self.ring.len()
    }

    /// The bound a wire update is checked against: the agreed maximum, or
    /// the pending final size while a grow is still being announced.
    pub fn effective_max(&self) -> usize {
        match self.nxt {
            Some(nxt) if nxt as usize > self.max => nxt as usize,
            _ => self.max,
        }
    }

    fn entry_parts(&self, e: &Entry) -> (&[u8], &[u8]) {
        let mid = e.off + e.name_len as usize;
        (&self.ring[e.off..mid], &self.ring[mid..mid + e.value_len as usize])
    }

    /// Looks up the 1-based wire index over the concatenated tables.
    pub fn get(&self, index: usize) -> Option<(&[u8], &[u8])> {
        if index == 0 {
            return None;
        }
        if index < DYNAMIC_TABLE_OFFSET {
            let v = &STATIC_TABLE[index - 1];
            return Some((v.0, v.1));
        }
        self.entries
            .get(index - DYNAMIC_TABLE_OFFSET)
            .map(|e| self.entry_parts(e))
    }

    /// Inserts a field, evicting from the oldest end first. An entry
    /// bigger than the limit legally clears the table and stores nothing.
    pub fn insert(&mut self, name: &[u8], value: &[u8]) {
        debug_assert!(name.len() <= u16::MAX as usize && value.len() <= u16::MAX as usize);
        let cost = name.len() + value.len() + ENTRY_OVERHEAD;
        if cost > self.lim {
            log::trace!("HPACK: 条目超过动态表上限, 清空表; cost={}", cost);
            self.entries.clear();
            self.len = 0;
            self.head = self.ring.len();
            return;
        }
        while self.len + cost > self.lim {
            self.evict();
        }
        let plen = cost - ENTRY_OVERHEAD;
        if self.head < plen {
            self.reallocate(self.ring.len());
        }
        let off = self.head - plen;
        self.ring[off..off + name.len()].copy_from_slice(name);
        self.ring[off + name.len()..off + plen].copy_from_slice(value);
        self.head = off;
        self.entries.push_front(Entry {
            off,
            name_len: name.len() as u16,
            value_len: value.len() as u16,
        });
        self.len += cost;
    }

    /// Evicts from the oldest end until no more than `target` bytes stay.
    pub fn adjust(&mut self, target: usize) {
        while self.len > target {
            self.evict();
        }
    }

    fn evict(&mut self) {
        let e = self
            .entries
            .pop_back()
            .expect("table size is positive but no entries left");
        self.len -= e.size();
        if self.entries.is_empty() {
            self.head = self.ring.len();
        }
    }

    /// Moves every live payload into a fresh allocation of `new_mem`
    /// bytes, oldest packed against the top.
    fn reallocate(&mut self, new_mem: usize) {
        let mut fresh = vec![0u8; new_mem];
        let mut cursor = new_mem;
        for e in self.entries.iter_mut().rev() {
            let plen = e.payload();
            cursor -= plen;
            fresh[cursor..cursor + plen].copy_from_slice(&self.ring[e.off..e.off + plen]);
            e.off = cursor;
        }
        self.ring = fresh;
        self.head = cursor;
    }

    /// Makes sure the ring can host `size` bytes of limit.
    pub fn ensure_mem(&mut self, size: usize) -> HpackResult<()> {
        if size <= self.ring.len() {
            return Ok(());
        }
        if self.fixed {
            return Err(HpackError::ReallocForbidden);
        }
        self.reallocate(size);
        Ok(())
    }

    /// Applies an acknowledged size update: the new limit takes effect and
    /// surplus entries leave.
    pub fn set_limit(&mut self, limit: usize) -> HpackResult<()> {
        self.ensure_mem(limit)?;
        self.lim = limit;
        self.adjust(limit);
        Ok(())
    }

    /// Queues a future maximum for announcement before the next block.
    pub fn enqueue_resize(&mut self, size: u16) -> HpackResult<()> {
        self.ensure_mem(size as usize)?;
        self.min = match self.min {
            Some(min) if min < size => Some(min),
            _ => Some(size),
        };
        self.nxt = Some(size);
        Ok(())
    }

    /// Shrinks the allocation back to the current limit.
    pub fn trim(&mut self) -> HpackResult<()> {
        if self.fixed {
            return Err(HpackError::ReallocForbidden);
        }
        if self.ring.len() > self.lim {
            self.reallocate(self.lim);
        }
        Ok(())
    }

    /// Finds a header in either table: `(index, true)` on a full match,
    /// `(index, false)` when only the name is known.
    pub fn find(&self, name: &[u8], value: &[u8]) -> Option<(usize, bool)> {
        if let Some((first, values)) = STATIC_HASH.get(name) {
            if let Some(&idx) = values.get(value) {
                return Some((idx, true));
            }
            for (i, e) in self.entries.iter().enumerate() {
                let (n, v) = self.entry_parts(e);
                if n == name && v == value {
                    return Some((DYNAMIC_TABLE_OFFSET + i, true));
                }
            }
            return Some((*first, false));
        }
        let mut name_at = None;
        for (i, e) in self.entries.iter().enumerate() {
            let (n, v) = self.entry_parts(e);
            if n == name {
                if v == value {
                    return Some((DYNAMIC_TABLE_OFFSET + i, true));
                }
                if name_at.is_none() {
                    name_at = Some(DYNAMIC_TABLE_OFFSET + i);
                }
            }
        }
        name_at.map(|i| (i, false))
    }

    pub fn iter(&self) -> TableIter {
        TableIter {
            table: self,
            inner: self.entries.iter(),
        }
    }

    /// Snapshot of the dynamic entries, newest first.
    pub fn to_vec(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.iter().map(|(n, v, _)| (n.to_vec(), v.to_vec())).collect()
    }
}

/// An `Iterator` over the dynamic entries, newest to oldest, yielding the
/// name, the value and the entry's current byte cost.
pub struct TableIter<'a> {
    table: &'a DynamicTable,
    inner: vec_deque::Iter<'a, Entry>,
}

impl<'a> Iterator for TableIter<'a> {
    type Item = (&'a [u8], &'a [u8], usize);

    fn next(&mut self) -> Option<(&'a [u8], &'a [u8], usize)> {
        match self.inner.next() {
            Some(e) => {
                let (n, v) = self.table.entry_parts(e);
                Some((n, v, e.size()))
            }
            None => None,
        }
    }
}

/// (HPACK, Appendix A)
static STATIC_TABLE: &'static [(&'static [u8], &'static [u8])] = &[
    (b":authority", b""),
    (b":method", b"GET"),
    (b":method", b"POST"),
    (b":path", b"/"),
    (b":path", b"/index.html"),
    (b":scheme", b"http"),
    (b":scheme", b"https"),
    (b":status", b"200"),
    (b":status", b"204"),
    (b":status", b"206"),
    (b":status", b"304"),
    (b":status", b"400"),
    (b":status", b"404"),
    (b":status", b"500"),
    (b"accept-charset", b""),
    (b"accept-encoding", b"gzip, deflate"),
    (b"accept-language", b""),
    (b"accept-ranges", b""),
    (b"accept", b""),
    (b"access-control-allow-origin", b""),
    (b"age", b""),
    (b"allow", b""),
    (b"authorization", b""),
    (b"cache-control", b""),
    (b"content-disposition", b""),
    (b"content-encoding", b""),
    (b"content-language", b""),
    (b"content-length", b""),
    (b"content-location", b""),
    (b"content-range", b""),
    (b"content-type", b""),
    (b"cookie", b""),
    (b"date", b""),
    (b"etag", b""),
    (b"expect", b""),
    (b"expires", b""),
    (b"from", b""),
    (b"host", b""),
    (b"if-match", b""),
    (b"if-modified-since", b""),
    (b"if-none-match", b""),
    (b"if-range", b""),
    (b"if-unmodified-since", b""),
    (b"last-modified", b""),
    (b"link", b""),
    (b"location", b""),
    (b"max-forwards", b""),
    (b"proxy-authenticate", b""),
    (b"proxy-authorization", b""),
    (b"range", b""),
    (b"referer", b""),
    (b"refresh", b""),
    (b"retry-after", b""),
    (b"server", b""),
    (b"set-cookie", b""),
    (b"strict-transport-security", b""),
    (b"transfer-encoding", b""),
    (b"user-agent", b""),
    (b"vary", b""),
    (b"via", b""),
    (b"www-authenticate", b""),
];

lazy_static! {
    static ref STATIC_HASH: HashMap<&'static [u8], (usize, HashMap<&'static [u8], usize>)> = {
        let mut h = HashMap::<&'static [u8], (usize, HashMap<&'static [u8], usize>)>::new();
        for (idx, &(name, value)) in STATIC_TABLE.iter().enumerate() {
            let slot = h.entry(name).or_insert_with(|| (idx + 1, HashMap::new()));
            slot.1.insert(value, idx + 1);
        }
        h
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_lookup() {
        let table = DynamicTable::with_size(4096, false);
        assert_eq!(table.get(0), None);
        assert_eq!(table.get(2), Some((&b":method"[..], &b"GET"[..])));
        assert_eq!(table.get(16), Some((&b"accept-encoding"[..], &b"gzip, deflate"[..])));
        assert_eq!(table.get(61), Some((&b"www-authenticate"[..], &b""[..])));
        assert_eq!(table.get(62), None);
    }

    #[test]
    fn insert_and_lookup() {
        let mut table = DynamicTable::with_size(4096, false);
        table.insert(b"custom-key", b"custom-header");
        assert_eq!(table.size(), 55);
        assert_eq!(table.count(), 1);
        assert_eq!(table.get(62), Some((&b"custom-key"[..], &b"custom-header"[..])));

        table.insert(b"x-a", b"1");
        // 最新的条目在62
        assert_eq!(table.get(62), Some((&b"x-a"[..], &b"1"[..])));
        assert_eq!(table.get(63), Some((&b"custom-key"[..], &b"custom-header"[..])));
        assert_eq!(table.size(), 55 + 36);
    }

    #[test]
    fn eviction_is_fifo() {
        // each entry below costs 33 bytes, three fit in 100
        let mut table = DynamicTable::with_size(100, false);
        table.insert(b"a", b"");
        table.insert(b"b", b"");
        table.insert(b"c", b"");
        assert_eq!(table.count(), 3);
        table.insert(b"d", b"");
        assert_eq!(table.count(), 3);
        assert_eq!(table.get(62), Some((&b"d"[..], &b""[..])));
        assert_eq!(table.get(64), Some((&b"b"[..], &b""[..])));
        assert!(table.size() <= 100);
    }

    #[test]
    fn oversized_entry_clears_table() {
        let mut table = DynamicTable::with_size(64, false);
        table.insert(b"a", b"");
        assert_eq!(table.count(), 1);
        let big = vec![b'v'; 64];
        table.insert(b"huge", &big);
        assert_eq!(table.count(), 0);
        assert_eq!(table.size(), 0);
    }

    #[test]
    fn adjust_evicts_to_target() {
        let mut table = DynamicTable::with_size(200, false);
        table.insert(b"a", b"");
        table.insert(b"b", b"");
        table.insert(b"c", b"");
        table.adjust(70);
        assert_eq!(table.count(), 2);
        assert_eq!(table.size(), 66);
        assert_eq!(table.get(62), Some((&b"c"[..], &b""[..])));
        table.adjust(0);
        assert_eq!(table.count(), 0);
        assert_eq!(table.size(), 0);
    }

    #[test]
    fn iter_is_newest_first() {
        let mut table = DynamicTable::with_size(4096, false);
        table.insert(b"one", b"1");
        table.insert(b"two", b"2");
        let got: Vec<_> = table.iter().collect();
        assert_eq!(got, vec![(&b"two"[..], &b"2"[..], 36), (&b"one"[..], &b"1"[..], 36)]);
    }

    #[test]
    fn ring_survives_many_cycles() {
        // small ring, payloads keep marching down and force repacking
        let mut table = DynamicTable::with_size(120, false);
        for i in 0..200u32 {
            let name = format!("k{:03}", i % 7);
            let value = format!("value-{:05}", i);
            table.insert(name.as_bytes(), value.as_bytes());
            let (n, v) = table.get(62).unwrap();
            assert_eq!(n, name.as_bytes());
            assert_eq!(v, value.as_bytes());
            assert!(table.size() <= 120);
        }
        // entries stay readable oldest to newest
        let snapshot = table.to_vec();
        assert_eq!(snapshot.len(), table.count());
    }

    #[test]
    fn find_prefers_exact_match() {
        let mut table = DynamicTable::with_size(4096, false);
        assert_eq!(table.find(b":method", b"GET"), Some((2, true)));
        assert_eq!(table.find(b":method", b"PUT"), Some((2, false)));
        assert_eq!(table.find(b"etag", b"xyz"), Some((34, false)));
        assert_eq!(table.find(b"x-custom", b"1"), None);

        table.insert(b"x-custom", b"1");
        assert_eq!(table.find(b"x-custom", b"1"), Some((62, true)));
        assert_eq!(table.find(b"x-custom", b"2"), Some((62, false)));
        table.insert(b"etag", b"xyz");
        assert_eq!(table.find(b"etag", b"xyz"), Some((62, true)));
    }

    #[test]
    fn trim_and_fixed_mode() {
        let mut table = DynamicTable::with_size(4096, false);
        table.insert(b"a", b"b");
        table.set_limit(64).unwrap();
        assert!(table.trim().is_ok());
        assert_eq!(table.mem(), 64);
        assert_eq!(table.get(62), Some((&b"a"[..], &b"b"[..])));
        // growth back is on demand
        table.set_limit(256).unwrap();
        assert_eq!(table.mem(), 256);

        let mut fixed = DynamicTable::with_size(128, true);
        assert_eq!(fixed.trim(), Err(HpackError::ReallocForbidden));
        assert_eq!(fixed.ensure_mem(256), Err(HpackError::ReallocForbidden));
        assert!(fixed.ensure_mem(64).is_ok());
    }

    #[test]
    fn enqueue_tracks_smallest_and_final() {
        let mut table = DynamicTable::with_size(256, false);
        table.enqueue_resize(128).unwrap();
        assert_eq!((table.min, table.nxt), (Some(128), Some(128)));
        table.enqueue_resize(64).unwrap();
        assert_eq!((table.min, table.nxt), (Some(64), Some(64)));

        let mut table = DynamicTable::with_size(256, false);
        table.enqueue_resize(64).unwrap();
        table.enqueue_resize(192).unwrap();
        assert_eq!((table.min, table.nxt), (Some(64), Some(192)));
        assert_eq!(table.effective_max(), 256);
    }
}
