//! Sharded tag→entity-ids index.
//!
//! A `BTreeSet` of ids per key keeps iteration ordered. Shards are keyed by
//! a hash of the *namespace* component only, so every tag under one
//! namespace lives in one shard and a `namespace:*` wildcard lookup never
//! has to touch more than one.

use std::collections::BTreeSet;

use parking_lot::RwLock;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

use entitydb_core::EntityId;

const NUM_SHARDS: usize = 32;

fn shard_for(namespace: &str) -> usize {
    let mut hasher = FxHasher::default();
    namespace.hash(&mut hasher);
    (hasher.finish() as usize) % NUM_SHARDS
}

fn namespace_of(tag: &str) -> &str {
    tag.split_once(':').map(|(ns, _)| ns).unwrap_or(tag)
}

type Shard = RwLock<std::collections::BTreeMap<String, BTreeSet<EntityId>>>;

/// Sharded map from `tag_string` to the sorted set of entity ids carrying
/// that tag at least once.
pub struct TagIndex {
    shards: Vec<Shard>,
}

impl Default for TagIndex {
    fn default() -> Self {
        TagIndex::new()
    }
}

impl TagIndex {
    /// Build an empty index.
    pub fn new() -> Self {
        TagIndex {
            shards: (0..NUM_SHARDS).map(|_| RwLock::new(Default::default())).collect(),
        }
    }

    /// Record that `entity_id` carries `tag`.
    pub fn insert(&self, tag: &str, entity_id: EntityId) {
        let shard = &self.shards[shard_for(namespace_of(tag))];
        shard.write().entry(tag.to_string()).or_default().insert(entity_id);
    }

    /// Remove a single `(tag, entity_id)` association, e.g. when a chunk
    /// entity is garbage-collected.
    pub fn remove(&self, tag: &str, entity_id: &EntityId) {
        let shard = &self.shards[shard_for(namespace_of(tag))];
        let mut guard = shard.write();
        if let Some(ids) = guard.get_mut(tag) {
            ids.remove(entity_id);
            if ids.is_empty() {
                guard.remove(tag);
            }
        }
    }

    /// Exact lookup: every entity id ever tagged with exactly `tag`.
    pub fn lookup_exact(&self, tag: &str) -> Vec<EntityId> {
        let shard = &self.shards[shard_for(namespace_of(tag))];
        shard
            .read()
            .get(tag)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Wildcard lookup: every entity id tagged with any `namespace:*` tag.
    /// Only ever touches the single shard that namespace hashes to.
    pub fn lookup_prefix(&self, namespace: &str) -> Vec<EntityId> {
        let prefix = format!("{namespace}:");
        let shard = &self.shards[shard_for(namespace)];
        let mut out = BTreeSet::new();
        for (key, ids) in shard.read().iter() {
            if key.starts_with(&prefix) {
                out.extend(ids.iter().cloned());
            }
        }
        out.into_iter().collect()
    }

    /// Every distinct tag string currently indexed, across all shards.
    pub fn all_tags(&self) -> Vec<String> {
        self.shards
            .iter()
            .flat_map(|s| s.read().keys().cloned().collect::<Vec<_>>())
            .collect()
    }

    /// Serialize as `shard_count:u32` then, per shard,
    /// `entry_count:u32 | (tag_len:u16 | tag[..] | id_count:u32 | (id_len:u16 | id[..])×id_count)`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.shards.len() as u32).to_le_bytes());
        for shard in &self.shards {
            let guard = shard.read();
            out.extend_from_slice(&(guard.len() as u32).to_le_bytes());
            for (tag, ids) in guard.iter() {
                let tag_bytes = tag.as_bytes();
                out.extend_from_slice(&(tag_bytes.len() as u16).to_le_bytes());
                out.extend_from_slice(tag_bytes);
                out.extend_from_slice(&(ids.len() as u32).to_le_bytes());
                for id in ids {
                    let id_bytes = id.as_str().as_bytes();
                    out.extend_from_slice(&(id_bytes.len() as u16).to_le_bytes());
                    out.extend_from_slice(id_bytes);
                }
            }
        }
        out
    }

    /// Deserialize an index written by [`TagIndex::to_bytes`]. Returns the
    /// index and bytes consumed.
    pub fn from_bytes(buf: &[u8]) -> Option<(Self, usize)> {
        let mut cursor = 0usize;
        let shard_count = read_u32(buf, &mut cursor)? as usize;
        let index = TagIndex::new();
        for shard_no in 0..shard_count {
            let entry_count = read_u32(buf, &mut cursor)?;
            for _ in 0..entry_count {
                let tag_len = read_u16(buf, &mut cursor)?;
                let tag = std::str::from_utf8(buf.get(cursor..cursor + tag_len)?).ok()?.to_string();
                cursor += tag_len;
                let id_count = read_u32(buf, &mut cursor)?;
                let mut ids = BTreeSet::new();
                for _ in 0..id_count {
                    let id_len = read_u16(buf, &mut cursor)?;
                    let id = std::str::from_utf8(buf.get(cursor..cursor + id_len)?).ok()?.to_string();
                    cursor += id_len;
                    ids.insert(EntityId::from_str_unchecked(id));
                }
                // Use the shard the tag naturally hashes to rather than
                // `shard_no`: on a future NUM_SHARDS change this stays
                // self-consistent rather than silently misrouting.
                let _ = shard_no;
                index.shards[shard_for(namespace_of(&tag))].write().insert(tag, ids);
            }
        }
        Some((index, cursor))
    }
}

fn read_u16(buf: &[u8], cursor: &mut usize) -> Option<usize> {
    let v = u16::from_le_bytes(buf.get(*cursor..*cursor + 2)?.try_into().ok()?) as usize;
    *cursor += 2;
    Some(v)
}

fn read_u32(buf: &[u8], cursor: &mut usize) -> Option<u32> {
    let v = u32::from_le_bytes(buf.get(*cursor..*cursor + 4)?.try_into().ok()?);
    *cursor += 4;
    Some(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_prefix_lookup() {
        let idx = TagIndex::new();
        idx.insert("status:active", EntityId::from_str_unchecked("e1"));
        idx.insert("status:draft", EntityId::from_str_unchecked("e2"));
        idx.insert("type:doc", EntityId::from_str_unchecked("e1"));

        assert_eq!(idx.lookup_exact("status:active"), vec![EntityId::from_str_unchecked("e1")]);
        let mut prefix = idx.lookup_prefix("status");
        prefix.sort();
        assert_eq!(
            prefix,
            vec![EntityId::from_str_unchecked("e1"), EntityId::from_str_unchecked("e2")]
        );
    }

    #[test]
    fn remove_drops_empty_entries() {
        let idx = TagIndex::new();
        let id = EntityId::from_str_unchecked("e1");
        idx.insert("status:active", id.clone());
        idx.remove("status:active", &id);
        assert!(idx.lookup_exact("status:active").is_empty());
    }

    #[test]
    fn round_trips_through_bytes() {
        let idx = TagIndex::new();
        idx.insert("status:active", EntityId::from_str_unchecked("e1"));
        idx.insert("type:doc", EntityId::from_str_unchecked("e1"));
        let bytes = idx.to_bytes();
        let (restored, consumed) = TagIndex::from_bytes(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(restored.lookup_exact("status:active"), idx.lookup_exact("status:active"));
    }
}
