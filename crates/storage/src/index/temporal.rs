//! Temporal index keyed by `(tag_name, timestamp_ns, entity_id)`.
//!
//! A `BTreeMap` keyed by timestamp so a range query only touches the
//! matching slice instead of scanning everything: `GetAsOf`-style "entities
//! tagged X as of T" queries become a bounded range scan rather than a full
//! tag-log scan.

use std::collections::BTreeSet;

use entitydb_core::EntityId;

/// A sorted run of `(tag_string, timestamp_ns, entity_id)` triples.
#[derive(Debug, Default, Clone)]
pub struct TemporalIndex {
    entries: BTreeSet<(String, i64, EntityId)>,
}

impl TemporalIndex {
    /// Build an empty index.
    pub fn new() -> Self {
        TemporalIndex::default()
    }

    /// Record that `entity_id` carried `tag` as of `ts`.
    pub fn insert(&mut self, tag: &str, ts: i64, entity_id: EntityId) {
        self.entries.insert((tag.to_string(), ts, entity_id));
    }

    /// For every entity that ever carried `tag`, the most recent
    /// `timestamp_ns <= at` at which it did` to `(X, T)` taking the last entry per entity id").
    pub fn entities_with_tag_as_of(&self, tag: &str, at: i64) -> Vec<EntityId> {
        use std::ops::Bound::{Excluded, Included};
        let lower = (tag.to_string(), i64::MIN, EntityId::from_str_unchecked(""));
        let upper = (tag.to_string(), at, EntityId::from_str_unchecked("\u{10FFFF}"));
        let mut latest: std::collections::BTreeMap<EntityId, i64> = std::collections::BTreeMap::new();
        for (t, ts, id) in self.entries.range((Included(lower), Excluded(upper))) {
            if t != tag {
                continue;
            }
            latest
                .entry(id.clone())
                .and_modify(|best| {
                    if *ts > *best {
                        *best = *ts;
                    }
                })
                    .or_insert(*ts);
        }
        latest.into_keys().collect()
    }

    /// Number of indexed `(tag, ts, entity)` triples.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize as `count:u32` then, per entry,
    /// `tag_len:u16 | tag[..] | ts:i64 | id_len:u16 | id[..]`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for (tag, ts, id) in &self.entries {
            let tag_bytes = tag.as_bytes();
            out.extend_from_slice(&(tag_bytes.len() as u16).to_le_bytes());
            out.extend_from_slice(tag_bytes);
            out.extend_from_slice(&ts.to_le_bytes());
            let id_bytes = id.as_str().as_bytes();
            out.extend_from_slice(&(id_bytes.len() as u16).to_le_bytes());
            out.extend_from_slice(id_bytes);
        }
        out
    }

    /// Deserialize an index written by [`TemporalIndex::to_bytes`]. Returns
    /// the index and bytes consumed.
    pub fn from_bytes(buf: &[u8]) -> Option<(Self, usize)> {
        let mut cursor = 0usize;
        let count = u32::from_le_bytes(buf.get(0..4)?.try_into().ok()?);
        cursor += 4;
        let mut entries = BTreeSet::new();
        for _ in 0..count {
            let tag_len = u16::from_le_bytes(buf.get(cursor..cursor + 2)?.try_into().ok()?) as usize;
            cursor += 2;
            let tag = std::str::from_utf8(buf.get(cursor..cursor + tag_len)?).ok()?.to_string();
            cursor += tag_len;
            let ts = i64::from_le_bytes(buf.get(cursor..cursor + 8)?.try_into().ok()?);
            cursor += 8;
            let id_len = u16::from_le_bytes(buf.get(cursor..cursor + 2)?.try_into().ok()?) as usize;
            cursor += 2;
            let id = std::str::from_utf8(buf.get(cursor..cursor + id_len)?).ok()?.to_string();
            cursor += id_len;
            entries.insert((tag, ts, EntityId::from_str_unchecked(id)));
        }
        Some((TemporalIndex { entries }, cursor))
    }
}
