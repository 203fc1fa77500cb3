//! Applying a decoded [`WalRecord`] to the in-memory entity table.
//!
//! Shared between startup recovery (replaying the WAL) and the live write
//! path (`entitydb-engine`'s repository applies the exact same function the
//! instant a write's WAL record is fsynced). Keeping one function for both
//! means recovery can never drift from what a live write actually does.

use std::collections::HashMap;

use entitydb_core::{Entity, EntityId};
use entitydb_storage::wal::{WalOp, WalRecord};

/// Apply one WAL record's effect to the in-memory entity table, mutating it
/// in place.
///
/// `Create`/`ChunkWrite` insert a brand-new entity (overwriting any
/// existing entry with the same id, which should not normally happen since
/// `Create` is rejected by the repository on a collision before a WAL
/// record is ever produced). `Update`/`Delete` append the record's tags
/// onto whatever entity already exists, creating one if recovery somehow
/// encounters an update before its create (should not happen under normal
/// operation, but recovery must not panic on it).
pub fn apply(entities: &mut HashMap<EntityId, Entity>, record: &WalRecord) {
    match record.op {
        WalOp::Create | WalOp::ChunkWrite => {
            let mut entity = Entity::new(record.entity_id.clone());
            for (ts, tag) in &record.tags {
                entity.append_tags(*ts, [tag.clone()]);
            }
            if let Some(content) = &record.content {
                entity.set_content(content.clone());
            }
            entities.insert(record.entity_id.clone(), entity);
        }
        WalOp::Update | WalOp::Delete => {
            let entity = entities
                .entry(record.entity_id.clone())
                .or_insert_with(|| Entity::new(record.entity_id.clone()));
            for (ts, tag) in &record.tags {
                entity.append_tags(*ts, [tag.clone()]);
            }
            if let Some(content) = &record.content {
                entity.set_content(content.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entitydb_core::{Tag, Timestamp};

    fn record(op: WalOp, id: &str, ts: i64, tag: &str, content: Option<&str>) -> WalRecord {
        WalRecord {
            op,
            timestamp: Timestamp::from_nanos(ts),
            entity_id: EntityId::from_str_unchecked(id),
            tags: vec![(Timestamp::from_nanos(ts), Tag::parse(tag).unwrap())],
            content: content.map(|s| s.as_bytes().to_vec()),
        }
    }

    #[test]
    fn create_then_update_merges_in_order() {
        let mut entities = HashMap::new();
        apply(&mut entities, &record(WalOp::Create, "e1", 1000, "type:doc", Some("hi")));
        apply(&mut entities, &record(WalOp::Update, "e1", 2000, "status:draft", None));

        let e = entities.get(&EntityId::from_str_unchecked("e1")).unwrap();
        assert_eq!(e.tags().len(), 2);
        assert_eq!(e.content(), b"hi");
    }

    #[test]
    fn update_replaces_content_when_present() {
        let mut entities = HashMap::new();
        apply(&mut entities, &record(WalOp::Create, "e1", 1000, "type:doc", Some("old")));
        apply(&mut entities, &record(WalOp::Update, "e1", 2000, "status:draft", Some("new")));
        assert_eq!(entities[&EntityId::from_str_unchecked("e1")].content(), b"new");
    }

    #[test]
    fn delete_appends_status_deleted_like_update() {
        let mut entities = HashMap::new();
        apply(&mut entities, &record(WalOp::Create, "e1", 1000, "type:doc", Some("")));
        apply(&mut entities, &record(WalOp::Delete, "e1", 2000, "status:deleted", None));
        let e = &entities[&EntityId::from_str_unchecked("e1")];
        assert!(e.tags().iter().any(|t| t.tag.as_str() == "status:deleted"));
    }
}
