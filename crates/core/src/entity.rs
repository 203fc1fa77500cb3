//! The `Entity` data model.

use crate::id::EntityId;
use crate::tag::Tag;
use crate::timestamp::Timestamp;

/// A single timestamped tag as it is stored in an entity's tag log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRecord {
    /// When this tag was written.
    pub timestamp: Timestamp,
    /// The tag itself.
    pub tag: Tag,
}

impl TagRecord {
    /// Construct a tag record.
    pub fn new(timestamp: Timestamp, tag: Tag) -> Self {
        TagRecord { timestamp, tag }
    }
}

/// An opaque unit of storage: an id, an ordered tag log, and an optional
/// content payload.
///
/// `tags` is append-only and ordered by write order. `created_at`/`updated_at` are *derived*, never stored
/// independently — they are the min/max of `tags[].timestamp` computed on
/// demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    id: EntityId,
    tags: Vec<TagRecord>,
    content: Vec<u8>,
}

impl Entity {
    /// Construct a new entity with no tags and no content.
    pub fn new(id: EntityId) -> Self {
        Entity {
            id,
            tags: Vec::new(),
            content: Vec::new(),
        }
    }

    /// Construct an entity from its full tag log and content, as read back
    /// off disk. Does not re-validate monotonicity — the codec layer is
    /// trusted to hand back exactly what was written.
    pub fn from_parts(id: EntityId, tags: Vec<TagRecord>, content: Vec<u8>) -> Self {
        Entity { id, tags, content }
    }

    /// The entity's id.
    pub fn id(&self) -> &EntityId {
        &self.id
    }

    /// The full, ordered tag log.
    pub fn tags(&self) -> &[TagRecord] {
        &self.tags
    }

    /// The content payload. Empty when content has been chunked —
    /// callers that need the bytes back should use the chunk-reassembly
    /// path instead of reading this field directly.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Append a batch of new tags, all at the same `timestamp`. Never edits
    /// or removes any prior tag.
    pub fn append_tags(&mut self, timestamp: Timestamp, tags: impl IntoIterator<Item = Tag>) {
        for tag in tags {
            self.tags.push(TagRecord::new(timestamp, tag));
        }
    }

    /// Replace the content payload. This does not touch the tag log; callers
    /// that chunk large content are expected to also append the `content:*`
    /// bookkeeping tags themselves.
    pub fn set_content(&mut self, content: Vec<u8>) {
        self.content = content;
    }

    /// The earliest tag timestamp, or `None` for a brand new entity with no
    /// tags yet.
    pub fn created_at(&self) -> Option<Timestamp> {
        self.tags.iter().map(|t| t.timestamp).min()
    }

    /// The latest tag timestamp, or `None` for a brand new entity with no
    /// tags yet.
    pub fn updated_at(&self) -> Option<Timestamp> {
        self.tags.iter().map(|t| t.timestamp).max()
    }

    /// Reconstruct the latest-wins tag map as of a point in time: for every
    /// namespace, the tag with the greatest `timestamp <= at`.
    ///
    /// Returns an empty map if no tag in the log has `timestamp <= at`.
    pub fn tags_as_of(&self, at: Timestamp) -> std::collections::BTreeMap<&str, &Tag> {
        let mut latest: std::collections::BTreeMap<&str, (&Timestamp, &Tag)> =
            std::collections::BTreeMap::new();
        for record in &self.tags {
            if record.timestamp > at {
                continue;
            }
            latest
                .entry(record.tag.namespace())
                .and_modify(|(ts, tag)| {
                    if record.timestamp >= **ts {
                        *ts = &record.timestamp;
                        *tag = &record.tag;
                    }
                })
                .or_insert((&record.timestamp, &record.tag));
        }
        latest.into_iter().map(|(ns, (_, tag))| (ns, tag)).collect()
    }

    /// Whether the entity existed at the given point in time, i.e. it has
    /// at least one tag with `timestamp <= at`.
    pub fn existed_at(&self, at: Timestamp) -> bool {
        self.tags.iter().any(|t| t.timestamp <= at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(s: &str) -> Tag {
        Tag::parse(s).unwrap()
    }

    #[test]
    fn created_and_updated_at_are_derived_from_tags() {
        let mut e = Entity::new(EntityId::from_str_unchecked("e1"));
        assert_eq!(e.created_at(), None);
        e.append_tags(Timestamp::from_nanos(1000), [tag("type:doc")]);
        e.append_tags(Timestamp::from_nanos(3000), [tag("status:draft")]);
        assert_eq!(e.created_at(), Some(Timestamp::from_nanos(1000)));
        assert_eq!(e.updated_at(), Some(Timestamp::from_nanos(3000)));
    }

    #[test]
    fn as_of_latest_wins_per_namespace() {
        let mut e = Entity::new(EntityId::from_str_unchecked("e1"));
        e.append_tags(Timestamp::from_nanos(1000), [tag("type:doc"), tag("status:draft")]);
        e.append_tags(Timestamp::from_nanos(2000), [tag("status:review")]);
        e.append_tags(Timestamp::from_nanos(3000), [tag("status:published")]);

        let at_1500 = e.tags_as_of(Timestamp::from_nanos(1500));
        assert_eq!(at_1500.get("status").unwrap().value(), "draft");

        let at_2500 = e.tags_as_of(Timestamp::from_nanos(2500));
        assert_eq!(at_2500.get("status").unwrap().value(), "review");

        let at_3500 = e.tags_as_of(Timestamp::from_nanos(3500));
        assert_eq!(at_3500.get("status").unwrap().value(), "published");
    }

    #[test]
    fn not_existed_before_first_tag() {
        let mut e = Entity::new(EntityId::from_str_unchecked("e1"));
        e.append_tags(Timestamp::from_nanos(1000), [tag("type:doc")]);
        assert!(!e.existed_at(Timestamp::from_nanos(500)));
        assert!(e.existed_at(Timestamp::from_nanos(1000)));
    }

    #[test]
    fn append_never_removes_prior_tags() {
        let mut e = Entity::new(EntityId::from_str_unchecked("e1"));
        e.append_tags(Timestamp::from_nanos(1), [tag("status:draft")]);
        e.append_tags(Timestamp::from_nanos(2), [tag("status:review")]);
        assert_eq!(e.tags().len(), 2);
        assert_eq!(e.tags()[0].tag.value(), "draft");
    }
}
