//! Checkpointing: fold the WAL into the entity section, rebuild the index,
//! and truncate the WAL to empty.
//!
//! A checkpoint here is a full compacting rewrite: every entity currently
//! held in memory (entity-section records plus whatever WAL replayed on top
//! of them) is re-encoded fresh starting at [`Header::ENTITY_SECTION_START`],
//! using one [`StringTable`] shared between the entity encoding pass and the
//! index section that follows it, so interned `tag_id`s in the rewritten
//! entity records agree with the ids the rebuilt [`IndexSection`] resolves.
//! This sidesteps incremental append-offset bookkeeping entirely — the
//! entity section's only consistent state is "everything currently in
//! memory", so a full rewrite is also the only representation that is
//! trivially correct: serialize everything, then swap the on-disk watermark
//! in one atomic header write.

use std::collections::HashMap;

use entitydb_core::{Entity, EntityId};
use entitydb_storage::codec::{encode_entity, StringTable};
use entitydb_storage::container::{FileContainer, Header};
use entitydb_storage::index::IndexSection;
use entitydb_storage::wal::WalWriter;
use tracing::info;

/// Configuration a checkpoint needs beyond the entity table itself: the
/// string table's bounds, carried over unchanged across checkpoints.
#[derive(Debug, Clone, Copy)]
pub struct CheckpointConfig {
    /// Max interned string-table entries.
    pub string_table_max_entries: usize,
    /// Max interned string-table bytes.
    pub string_table_max_bytes: usize,
}

/// Rewrite the entity section from `entities`, rebuild the index section
/// fresh, and atomically swap the header to point at both — then reset the
/// WAL writer to the new (empty) WAL region.
///
/// Entities are written in a deterministic order (sorted by id) so two
/// checkpoints of the same logical state produce byte-identical output,
/// which keeps the crash-recovery property "replay from the last checkpoint
/// is idempotent" easy to reason about.
pub fn checkpoint(
    container: &FileContainer,
    wal: &mut WalWriter,
    entities: &HashMap<EntityId, Entity>,
    config: CheckpointConfig,
    now_ns: i64,
) -> std::io::Result<Header> {
    let mut ordered: Vec<&Entity> = entities.values().collect();
    ordered.sort_by(|a, b| a.id().as_str().cmp(b.id().as_str()));

    let mut table = StringTable::new(config.string_table_max_entries, config.string_table_max_bytes);
    let mut entity_bytes = Vec::new();
    for entity in &ordered {
        entity_bytes.extend_from_slice(&encode_entity(entity, &mut table));
    }

    let mut index = IndexSection::empty(config.string_table_max_entries, config.string_table_max_bytes, now_ns);
    index.strings = table;
    for entity in &ordered {
        index.index_entity(entity);
    }
    let index_bytes = index.to_bytes();

    let entity_section_start = Header::ENTITY_SECTION_START;
    let wal_offset = entity_section_start + entity_bytes.len() as u64;
    let index_offset = wal_offset;

    container.write_at(entity_section_start, &entity_bytes)?;
    container.write_at(index_offset, &index_bytes)?;
    container.truncate(index_offset + index_bytes.len() as u64)?;

    let header = Header {
        version: entitydb_storage::container::FORMAT_VERSION,
        created_ns: container.read_header().map(|h| h.created_ns).unwrap_or(now_ns),
        entity_count: ordered.len() as u64,
        wal_offset,
        wal_length: 0,
        index_offset,
        index_length: index_bytes.len() as u64,
    };
    container.update_header(&header)?;
    wal.reset(wal_offset);

    info!(
        entities = header.entity_count,
        index_bytes = index_bytes.len(),
        "checkpoint complete"
    );
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use entitydb_core::{Tag, Timestamp};
    use entitydb_storage::wal::DurabilityMode;
    use tempfile::tempdir;

    fn entity_with(id: &str, tag: &str) -> Entity {
        let mut e = Entity::new(EntityId::from_str_unchecked(id));
        e.append_tags(Timestamp::from_nanos(1000), [Tag::parse(tag).unwrap()]);
        e
    }

    #[test]
    fn checkpoint_persists_entities_and_resets_wal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.edb");
        let container = FileContainer::create(&path, 0).unwrap();
        let mut wal = WalWriter::new(Header::ENTITY_SECTION_START, 0, DurabilityMode::Strict);

        let mut entities = HashMap::new();
        entities.insert(EntityId::from_str_unchecked("b"), entity_with("b", "type:doc"));
        entities.insert(EntityId::from_str_unchecked("a"), entity_with("a", "status:draft"));

        let config = CheckpointConfig { string_table_max_entries: 1000, string_table_max_bytes: 65536 };
        let header = checkpoint(&container, &mut wal, &entities, config, 5000).unwrap();

        assert_eq!(header.entity_count, 2);
        assert_eq!(header.wal_length, 0);
        assert_eq!(wal.pending_bytes(), 0);
        assert_eq!(wal.wal_offset(), header.wal_offset);

        let report = crate::recovery::recover(&container, header, 1000, 65536).unwrap();
        assert_eq!(report.entities.len(), 2);
        assert!(report.index.is_some());
    }

    #[test]
    fn checkpoint_of_empty_table_truncates_to_header_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.edb");
        let container = FileContainer::create(&path, 0).unwrap();
        let mut wal = WalWriter::new(Header::ENTITY_SECTION_START, 0, DurabilityMode::Strict);

        let config = CheckpointConfig { string_table_max_entries: 100, string_table_max_bytes: 4096 };
        let header = checkpoint(&container, &mut wal, &HashMap::new(), config, 0).unwrap();
        assert_eq!(header.entity_count, 0);
        assert_eq!(header.wal_offset, Header::ENTITY_SECTION_START);
    }

    #[test]
    fn repeated_checkpoints_of_same_state_are_deterministic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.edb");
        let container = FileContainer::create(&path, 0).unwrap();
        let mut wal = WalWriter::new(Header::ENTITY_SECTION_START, 0, DurabilityMode::Strict);

        let mut entities = HashMap::new();
        entities.insert(EntityId::from_str_unchecked("a"), entity_with("a", "type:doc"));

        let config = CheckpointConfig { string_table_max_entries: 100, string_table_max_bytes: 4096 };
        let h1 = checkpoint(&container, &mut wal, &entities, config, 10).unwrap();
        let h2 = checkpoint(&container, &mut wal, &entities, config, 10).unwrap();
        assert_eq!(h1.index_length, h2.index_length);
        assert_eq!(h1.wal_offset, h2.wal_offset);
    }
}
