//! Bounded string interning for tag strings.
//!
//! The string table is bounded by both entry count and total interned
//! bytes. Once either bound is reached, new strings are not added to the
//! table — they are written inline in the entity record instead, marked by
//! a "spilled" bit.
//! Eviction is deliberately not implemented here: evicting an entry would
//! invalidate on-disk `tag_id` references already written into entity
//! records.

use std::collections::HashMap;

/// A bounded, append-only string table.
#[derive(Debug, Clone)]
pub struct StringTable {
    by_string: HashMap<String, u32>,
    by_id: Vec<String>,
    total_bytes: usize,
    max_entries: usize,
    max_bytes: usize,
}

impl StringTable {
    /// Create an empty table bounded by `max_entries` entries and
    /// `max_bytes` total interned bytes.
    pub fn new(max_entries: usize, max_bytes: usize) -> Self {
        StringTable {
            by_string: HashMap::new(),
            by_id: Vec::new(),
            total_bytes: 0,
            max_entries,
            max_bytes,
        }
    }

    /// Intern `s`, returning its id. If `s` is already interned, returns the
    /// existing id without consuming more budget. Returns `None` when `s` is
    /// new and interning it would exceed either bound — the caller should
    /// store `s` inline in the entity record instead.
    pub fn intern(&mut self, s: &str) -> Option<u32> {
        if let Some(&id) = self.by_string.get(s) {
            return Some(id);
        }
        if self.by_id.len() >= self.max_entries || self.total_bytes + s.len() > self.max_bytes {
            return None;
        }
        let id = self.by_id.len() as u32;
        self.by_id.push(s.to_string());
        self.by_string.insert(s.to_string(), id);
        self.total_bytes += s.len();
        Some(id)
    }

    /// Resolve a previously interned id back to its string.
    pub fn resolve(&self, id: u32) -> Option<&str> {
        self.by_id.get(id as usize).map(|s| s.as_str())
    }

    /// Number of interned entries.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the table has no interned entries.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Total bytes currently interned.
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Serialize the table to bytes for persistence in the index section:
    /// `count:u32` then, for each entry in id order, `len:u16 | bytes`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.by_id.len() as u32).to_le_bytes());
        for s in &self.by_id {
            out.extend_from_slice(&(s.len() as u16).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        out
    }

    /// Deserialize a table written by [`StringTable::to_bytes`], keeping the
    /// same bounds so future interning still respects them.
    pub fn from_bytes(buf: &[u8], max_entries: usize, max_bytes: usize) -> Option<(Self, usize)> {
        if buf.len() < 4 {
            return None;
        }
        let count = u32::from_le_bytes(buf[0..4].try_into().ok()?) as usize;
        let mut cursor = 4;
        let mut table = StringTable::new(max_entries, max_bytes);
        for _ in 0..count {
            if cursor + 2 > buf.len() {
                return None;
            }
            let len = u16::from_le_bytes(buf[cursor..cursor + 2].try_into().ok()?) as usize;
            cursor += 2;
            if cursor + len > buf.len() {
                return None;
            }
            let s = std::str::from_utf8(&buf[cursor..cursor + len]).ok()?.to_string();
            cursor += len;
            let id = table.by_id.len() as u32;
            table.total_bytes += s.len();
            table.by_string.insert(s.clone(), id);
            table.by_id.push(s);
        }
        Some((table, cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interns_and_resolves() {
        let mut t = StringTable::new(10, 1024);
        let id = t.intern("status").unwrap();
        assert_eq!(t.resolve(id), Some("status"));
        // interning again returns the same id, no extra budget consumed
        let id2 = t.intern("status").unwrap();
        assert_eq!(id, id2);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn spills_past_entry_count_bound() {
        let mut t = StringTable::new(1, 1024);
        assert!(t.intern("a").is_some());
        assert!(t.intern("b").is_none());
    }

    #[test]
    fn spills_past_byte_budget() {
        let mut t = StringTable::new(100, 4);
        assert!(t.intern("abcd").is_some());
        assert!(t.intern("efgh").is_none());
    }

    #[test]
    fn round_trips_through_bytes() {
        let mut t = StringTable::new(10, 1024);
        t.intern("type");
        t.intern("status");
        let bytes = t.to_bytes();
        let (restored, consumed) = StringTable::from_bytes(&bytes, 10, 1024).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(restored.resolve(0), Some("type"));
        assert_eq!(restored.resolve(1), Some("status"));
    }
}
