//! `Query` filter, sort, and pagination.

use std::cmp::Ordering as CmpOrdering;

use entitydb_core::{Entity, Timestamp};

/// A single predicate. `Query`'s filter is a conjunction of these.
#[derive(Debug, Clone)]
pub enum Predicate {
    TagEq(String),
    TagNe(String),
    TagStartsWith(String),
    CreatedAtLt(Timestamp),
    CreatedAtGt(Timestamp),
    CreatedAtBetween(Timestamp, Timestamp),
    ContentSizeOp(SizeOp, usize),
}

#[derive(Debug, Clone, Copy)]
pub enum SizeOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

/// Conjunction of [`Predicate`]s.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub predicates: Vec<Predicate>,
}

impl Filter {
    pub fn matches(&self, entity: &Entity) -> bool {
        self.predicates.iter().all(|p| predicate_matches(p, entity))
    }
}

fn predicate_matches(predicate: &Predicate, entity: &Entity) -> bool {
    match predicate {
        Predicate::TagEq(tag) => entity.tags().iter().any(|t| t.tag.as_str() == tag),
        Predicate::TagNe(tag) => entity.tags().iter().all(|t| t.tag.as_str() != tag),
        Predicate::TagStartsWith(prefix) => {
            entity.tags().iter().any(|t| t.tag.as_str().starts_with(prefix.as_str()))
        }
        Predicate::CreatedAtLt(t) => entity.created_at().map(|c| c < *t).unwrap_or(false),
        Predicate::CreatedAtGt(t) => entity.created_at().map(|c| c > *t).unwrap_or(false),
        Predicate::CreatedAtBetween(lo, hi) => {
            entity.created_at().map(|c| c >= *lo && c <= *hi).unwrap_or(false)
        }
        Predicate::ContentSizeOp(op, size) => {
            let len = entity.content().len();
            match op {
                SizeOp::Lt => len < *size,
                SizeOp::Le => len <= *size,
                SizeOp::Gt => len > *size,
                SizeOp::Ge => len >= *size,
                SizeOp::Eq => len == *size,
            }
        }
    }
}

/// Sort keys `Query` supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    CreatedAt,
    UpdatedAt,
    Id,
    TagCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy)]
pub struct Sort {
    pub key: SortKey,
    pub direction: SortDirection,
}

/// Ordering is stable under ties by breaking them on id ascending.
pub fn compare(a: &Entity, b: &Entity, sort: Sort) -> CmpOrdering {
    let primary = match sort.key {
        SortKey::CreatedAt => a.created_at().cmp(&b.created_at()),
        SortKey::UpdatedAt => a.updated_at().cmp(&b.updated_at()),
        SortKey::Id => a.id().cmp(b.id()),
        SortKey::TagCount => a.tags().len().cmp(&b.tags().len()),
    };
    let primary = match sort.direction {
        SortDirection::Ascending => primary,
        SortDirection::Descending => primary.reverse(),
    };
    primary.then_with(|| a.id().cmp(b.id()))
}

/// Apply filter, then sort (or id order if unspecified), then offset/limit.
pub fn run_query<'a>(
    entities: impl Iterator<Item = &'a Entity>,
    filter: &Filter,
    sort: Option<Sort>,
    offset: usize,
    limit: usize,
) -> Vec<&'a Entity> {
    let mut matched: Vec<&Entity> = entities.filter(|e| filter.matches(e)).collect();
    match sort {
        Some(sort) => matched.sort_by(|a, b| compare(a, b, sort)),
        None => matched.sort_by(|a, b| a.id().cmp(b.id())),
    }
    matched.into_iter().skip(offset).take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use entitydb_core::{EntityId, Tag};

    fn entity(id: &str, tag: &str, ts: i64) -> Entity {
        let mut e = Entity::new(EntityId::from_str_unchecked(id));
        e.append_tags(Timestamp::from_nanos(ts), [Tag::parse(tag).unwrap()]);
        e
    }

    #[test]
    fn filters_by_tag_eq() {
        let entities = vec![entity("a", "type:doc", 1), entity("b", "type:image", 2)];
        let filter = Filter { predicates: vec![Predicate::TagEq("type:doc".into())] };
        let matched = run_query(entities.iter(), &filter, None, 0, 10);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id().as_str(), "a");
    }

    #[test]
    fn sorts_and_paginates() {
        let entities = vec![entity("a", "type:doc", 30), entity("b", "type:doc", 10), entity("c", "type:doc", 20)];
        let sort = Sort { key: SortKey::CreatedAt, direction: SortDirection::Ascending };
        let page = run_query(entities.iter(), &Filter::default(), Some(sort), 1, 1);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id().as_str(), "c");
    }

    #[test]
    fn ties_break_by_id() {
        let entities = vec![entity("b", "type:doc", 10), entity("a", "type:doc", 10)];
        let sort = Sort { key: SortKey::CreatedAt, direction: SortDirection::Ascending };
        let ordered = run_query(entities.iter(), &Filter::default(), Some(sort), 0, 10);
        assert_eq!(ordered[0].id().as_str(), "a");
        assert_eq!(ordered[1].id().as_str(), "b");
    }
}
