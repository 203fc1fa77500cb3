//! Size limits for ids, tags, and content.

/// Size limits enforced by [`crate::id::EntityId::parse`] and
/// [`crate::tag::Tag::parse`].
///
/// A small, `Copy`, all-defaults struct that every construction path
/// consults rather than hardcoding magic numbers inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum length of an `EntityId` string.
    pub max_id_len: usize,
    /// Maximum length of a single tag string (`namespace:value`).
    pub max_tag_len: usize,
    /// Maximum number of tags a single entity may carry before `Update`
    /// starts rejecting new appends with `InvalidArgument`.
    pub max_tags_per_entity: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_id_len: 512,
            max_tag_len: 4096,
            max_tags_per_entity: 1_000_000,
        }
    }
}
