//! `GetHistory` and `GetDiff`.
//!
//! Both walk an entity's append-only tag log directly rather than going
//! through [`entitydb_core::Entity::tags_as_of`]'s namespace-grouped view,
//! because a chunked write's four `content:*` bookkeeping tags
//! (`content:chunks:N`, `content:chunk-size:X`, `content:sha256:Y`,
//! `content:size:Z`) all share the `content` namespace and are written in
//! the same batch — `tags_as_of` would only ever surface one of them. A
//! dedicated `content:written:<ts>` marker tag (appended by the repository
//! whenever content is actually set) is how content changes are detected
//! here instead.

use std::collections::HashMap;

use entitydb_core::{Entity, Tag, TagRecord, Timestamp};

/// One event in an entity's history.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEvent {
    /// The first tag ever written in this namespace.
    TagAdded { namespace: String, tag: Tag },
    /// A later tag in the same namespace replaced an earlier one.
    TagSuperseded { namespace: String, old_tag: Tag, new_tag: Tag },
    /// Content was replaced.
    ContentChanged,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub timestamp: Timestamp,
    pub event: HistoryEvent,
}

const CONTENT_WRITTEN_PREFIX: &str = "written:";

/// `GetHistory(id, from, to)`: an ordered sequence of tag_added /
/// tag_superseded / content_changed events whose timestamp falls in
/// `[from, to]`.
pub fn get_history(entity: &Entity, from: Timestamp, to: Timestamp) -> Vec<HistoryEntry> {
    let mut last_by_namespace: HashMap<&str, &TagRecord> = HashMap::new();
    let mut sorted: Vec<&TagRecord> = entity.tags().iter().collect();
    sorted.sort_by_key(|r| r.timestamp);

    let mut out = Vec::new();
    for record in sorted {
        let namespace = record.tag.namespace();
        if record.timestamp >= from && record.timestamp <= to {
            if namespace == "content" && record.tag.value().starts_with(CONTENT_WRITTEN_PREFIX) {
                out.push(HistoryEntry { timestamp: record.timestamp, event: HistoryEvent::ContentChanged });
            } else if let Some(prev) = last_by_namespace.get(namespace) {
                out.push(HistoryEntry {
                    timestamp: record.timestamp,
                    event: HistoryEvent::TagSuperseded {
                        namespace: namespace.to_string(),
                        old_tag: prev.tag.clone(),
                        new_tag: record.tag.clone(),
                    },
                });
            } else {
                out.push(HistoryEntry {
                    timestamp: record.timestamp,
                    event: HistoryEvent::TagAdded { namespace: namespace.to_string(), tag: record.tag.clone() },
                });
            }
        }
        last_by_namespace.insert(namespace, record);
    }
    out
}

/// `GetDiff(id, t1, t2)`: tags added between `t1` and `t2`, tags superseded
/// (no longer the namespace's latest) over that window, and whether content
/// changed.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffResult {
    pub added_tags: Vec<Tag>,
    pub removed_tags: Vec<Tag>,
    pub content_changed: bool,
}

pub fn get_diff(entity: &Entity, t1: Timestamp, t2: Timestamp) -> DiffResult {
    let snap1 = entity.tags_as_of(t1);
    let snap2 = entity.tags_as_of(t2);

    let mut added = Vec::new();
    for (&ns, &tag2) in snap2.iter() {
        match snap1.get(ns) {
            Some(&tag1) if tag1.as_str() == tag2.as_str() => {}
            _ => added.push(tag2.clone()),
        }
    }

    let mut removed = Vec::new();
    for (&ns, &tag1) in snap1.iter() {
        match snap2.get(ns) {
            Some(&tag2) if tag2.as_str() == tag1.as_str() => {}
            _ => removed.push(tag1.clone()),
        }
    }

    let content_changed = entity.tags().iter().any(|r| {
        r.timestamp > t1
            && r.timestamp <= t2
            && r.tag.namespace() == "content"
            && r.tag.value().starts_with(CONTENT_WRITTEN_PREFIX)
    });

    DiffResult { added_tags: added, removed_tags: removed, content_changed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entitydb_core::EntityId;

    fn entity_with_history() -> Entity {
        let mut e = Entity::new(EntityId::from_str_unchecked("e1"));
        e.append_tags(Timestamp::from_nanos(100), [Tag::parse("type:doc").unwrap()]);
        e.append_tags(Timestamp::from_nanos(200), [Tag::parse("status:draft").unwrap()]);
        e.append_tags(Timestamp::from_nanos(300), [Tag::parse("status:published").unwrap()]);
        e.append_tags(Timestamp::from_nanos(300), [Tag::parse("content:written:300").unwrap()]);
        e
    }

    #[test]
    fn history_reports_added_then_superseded() {
        let e = entity_with_history();
        let events = get_history(&e, Timestamp::from_nanos(0), Timestamp::from_nanos(1000));
        assert!(matches!(events[0].event, HistoryEvent::TagAdded {.. }));
        assert!(matches!(events[1].event, HistoryEvent::TagAdded {.. }));
        assert!(matches!(events[2].event, HistoryEvent::TagSuperseded {.. }));
        assert!(events.iter().any(|ev| ev.event == HistoryEvent::ContentChanged));
    }

    #[test]
    fn diff_reports_added_removed_and_content_changed() {
        let e = entity_with_history();
        let diff = get_diff(&e, Timestamp::from_nanos(150), Timestamp::from_nanos(350));
        assert!(diff.added_tags.iter().any(|t| t.as_str() == "status:published"));
        assert!(diff.removed_tags.iter().any(|t| t.as_str() == "status:draft"));
        assert!(diff.content_changed);
    }
}
