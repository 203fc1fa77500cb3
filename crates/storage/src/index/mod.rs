//! The index section: tag→entity-ids, temporal, and Bloom indexes, persisted
//! together as one versioned blob.
//!
//! The index is an accelerator, never a source of truth: every index here
//! is fully rebuildable from the entity section —
//! [`IndexSection::rebuild`] is the one function that does it, and is used
//! both by the checkpointer's incremental path (fed one entity at a time)
//! and by `entitydb-engine`'s full-reindex fallback (fed every entity in the
//! file).

pub mod bloom;
pub mod tag_index;
pub mod temporal;

pub use bloom::BloomFilter;
pub use tag_index::TagIndex;
pub use temporal::TemporalIndex;

use entitydb_core::Entity;

use crate::codec::StringTable;

const INDEX_SECTION_VERSION: u32 = 1;

/// The three indexes plus the string table they share, bundled as the
/// index-section payload.
pub struct IndexSection {
    /// Interned tag strings, persisted alongside the indexes that reference
    /// them.
    pub strings: StringTable,
    /// Exact/wildcard tag lookup.
    pub tag_index: TagIndex,
    /// `(tag, ts, entity)` range-queryable run.
    pub temporal: TemporalIndex,
    /// Negative-lookup accelerator.
    pub bloom: BloomFilter,
    /// When this index section was (re)built, nanoseconds since epoch. Used
    /// by `entitydb-engine`'s reindex scheduler to compare against the
    /// entity section's last-write time.
    pub built_at_ns: i64,
}

impl IndexSection {
    /// An empty index section, as used for a brand-new database file.
    pub fn empty(string_table_max_entries: usize, string_table_max_bytes: usize, built_at_ns: i64) -> Self {
        IndexSection {
            strings: StringTable::new(string_table_max_entries, string_table_max_bytes),
            tag_index: TagIndex::new(),
            temporal: TemporalIndex::new(),
            bloom: BloomFilter::new(1024),
            built_at_ns,
        }
    }

    /// Feed a single entity's current tag log into all three indexes. Used
    /// both for incremental per-write updates and, entity by entity, for a
    /// full rebuild.
    pub fn index_entity(&mut self, entity: &Entity) {
        for record in entity.tags() {
            let tag_str = record.tag.as_str();
            self.tag_index.insert(tag_str, entity.id().clone());
            self.temporal
                .insert(tag_str, record.timestamp.as_nanos(), entity.id().clone());
            self.bloom.insert(tag_str);
        }
    }

    /// Rebuild an index section from scratch given every entity currently
    /// in the entity section. The
    /// Bloom filter is pre-sized off an estimate of distinct tags to keep
    /// the false-positive rate reasonable.
    pub fn rebuild<'a>(
        entities: impl Iterator<Item = &'a Entity>,
        string_table_max_entries: usize,
        string_table_max_bytes: usize,
        built_at_ns: i64,
    ) -> Self {
        let entities: Vec<&Entity> = entities.collect();
        let estimated_tags: usize = entities.iter().map(|e| e.tags().len()).sum::<usize>().max(1);
        let mut section = IndexSection {
            strings: StringTable::new(string_table_max_entries, string_table_max_bytes),
            tag_index: TagIndex::new(),
            temporal: TemporalIndex::new(),
            bloom: BloomFilter::new(estimated_tags),
            built_at_ns,
        };
        for entity in entities {
            section.index_entity(entity);
        }
        section
    }

    /// Serialize the whole section as `version:u32 | built_at_ns:i64 |
    /// strings_len:u32 | strings[..] | tag_index_len:u32 | tag_index[..] |
    /// temporal_len:u32 | temporal[..] | bloom_len:u32 | bloom[..] |
    /// crc32:u32`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let strings = self.strings.to_bytes();
        let tags = self.tag_index.to_bytes();
        let temporal = self.temporal.to_bytes();
        let bloom = self.bloom.to_bytes();

        let mut body = Vec::new();
        body.extend_from_slice(&INDEX_SECTION_VERSION.to_le_bytes());
        body.extend_from_slice(&self.built_at_ns.to_le_bytes());
        for chunk in [&strings, &tags, &temporal, &bloom] {
            body.extend_from_slice(&(chunk.len() as u32).to_le_bytes());
            body.extend_from_slice(chunk);
        }
        let crc = crc32fast::hash(&body);
        body.extend_from_slice(&crc.to_le_bytes());
        body
    }

    /// Deserialize a section written by [`IndexSection::to_bytes`], keeping
    /// the string table's configured bounds so future interning still
    /// respects them.
    pub fn from_bytes(
        buf: &[u8],
        string_table_max_entries: usize,
        string_table_max_bytes: usize,
    ) -> Option<Self> {
        if buf.len() < 4 {
            return None;
        }
        let (payload, crc_bytes) = buf.split_at(buf.len() - 4);
        let expected = u32::from_le_bytes(crc_bytes.try_into().ok()?);
        if crc32fast::hash(payload) != expected {
            return None;
        }
        let mut cursor = 0usize;
        let version = u32::from_le_bytes(payload.get(0..4)?.try_into().ok()?);
        if version != INDEX_SECTION_VERSION {
            return None;
        }
        cursor += 4;
        let built_at_ns = i64::from_le_bytes(payload.get(cursor..cursor + 8)?.try_into().ok()?);
        cursor += 8;

        let (strings_bytes, cursor_after) = read_chunk(payload, cursor)?;
        let (strings, _) = StringTable::from_bytes(strings_bytes, string_table_max_entries, string_table_max_bytes)?;
        cursor = cursor_after;

        let (tags_bytes, cursor_after) = read_chunk(payload, cursor)?;
        let (tag_index, _) = TagIndex::from_bytes(tags_bytes)?;
        cursor = cursor_after;

        let (temporal_bytes, cursor_after) = read_chunk(payload, cursor)?;
        let (temporal, _) = TemporalIndex::from_bytes(temporal_bytes)?;
        cursor = cursor_after;

        let (bloom_bytes, _) = read_chunk(payload, cursor)?;
        let (bloom, _) = BloomFilter::from_bytes(bloom_bytes)?;

        Some(IndexSection {
            strings,
            tag_index,
            temporal,
            bloom,
            built_at_ns,
        })
    }
}

fn read_chunk(buf: &[u8], cursor: usize) -> Option<(&[u8], usize)> {
    let len = u32::from_le_bytes(buf.get(cursor..cursor + 4)?.try_into().ok()?) as usize;
    let start = cursor + 4;
    let chunk = buf.get(start..start + len)?;
    Some((chunk, start + len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use entitydb_core::{EntityId, Tag, Timestamp};

    fn sample_entity(id: &str) -> Entity {
        let mut e = Entity::new(EntityId::from_str_unchecked(id));
        e.append_tags(Timestamp::from_nanos(1000), [Tag::parse("type:doc").unwrap()]);
        e.append_tags(Timestamp::from_nanos(2000), [Tag::parse("status:draft").unwrap()]);
        e
    }

    #[test]
    fn rebuild_reflects_every_entity() {
        let entities = vec![sample_entity("e1"), sample_entity("e2")];
        let section = IndexSection::rebuild(entities.iter(), 1000, 65536, 0);
        let mut ids = section.tag_index.lookup_exact("type:doc");
        ids.sort();
        assert_eq!(
            ids,
            vec![EntityId::from_str_unchecked("e1"), EntityId::from_str_unchecked("e2")]
        );
        assert!(section.bloom.might_contain("status:draft"));
    }

    #[test]
    fn round_trips_through_bytes() {
        let entities = vec![sample_entity("e1")];
        let section = IndexSection::rebuild(entities.iter(), 1000, 65536, 12345);
        let bytes = section.to_bytes();
        let restored = IndexSection::from_bytes(&bytes, 1000, 65536).unwrap();
        assert_eq!(restored.built_at_ns, 12345);
        assert_eq!(
            restored.tag_index.lookup_exact("type:doc"),
            section.tag_index.lookup_exact("type:doc")
        );
    }

    #[test]
    fn rejects_corrupted_blob() {
        let entities = vec![sample_entity("e1")];
        let section = IndexSection::rebuild(entities.iter(), 1000, 65536, 0);
        let mut bytes = section.to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(IndexSection::from_bytes(&bytes, 1000, 65536).is_none());
    }
}
