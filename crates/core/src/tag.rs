//! Tags: the atomic unit of entity state.
//!
//! A tag is a string of the shape `namespace:value`. The engine
//! enforces only that shape; everything else — types, roles, relationships,
//! even content chunking — is convention layered on top of plain tag
//! strings by callers.

use std::fmt;
use thiserror::Error;

use crate::limits::Limits;

/// Error returned when a tag string fails the `namespace:value` shape check.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TagError {
    /// The tag contained no `:` separator.
    #[error("tag is missing a ':' namespace separator: {0:?}")]
    MissingSeparator(String),
    /// The namespace component (before the first `:`) was empty.
    #[error("tag has an empty namespace: {0:?}")]
    EmptyNamespace(String),
    /// The tag exceeded the configured maximum length.
    #[error("tag exceeds max length ({len} > {max}): {preview:?}...")]
    TooLong { preview: String, len: usize, max: usize },
}

/// A validated `namespace:value` tag string.
///
/// `Tag` borrows nothing and owns its string; the namespace boundary is the
/// first `:` in the string; everything after it, including further colons
/// (e.g. `rbac:perm:entity:view`), is the value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(String);

impl Tag {
    /// Parse and validate a tag string.
    pub fn parse(s: impl Into<String>) -> Result<Self, TagError> {
        let s = s.into();
        let limits = Limits::default();
        if s.len() > limits.max_tag_len {
            return Err(TagError::TooLong {
                preview: s.chars().take(32).collect(),
                len: s.len(),
                max: limits.max_tag_len,
            });
        }
        let colon = s.find(':').ok_or_else(|| TagError::MissingSeparator(s.clone()))?;
        if colon == 0 {
            return Err(TagError::EmptyNamespace(s));
        }
        Ok(Tag(s))
    }

    /// The namespace component: everything before the first `:`.
    ///
    /// This is the key by which "latest-wins" reconstruction groups tags
    ///.
    pub fn namespace(&self) -> &str {
        let colon = self.0.find(':').expect("validated at construction");
        &self.0[..colon]
    }

    /// The value component: everything after the first `:`.
    pub fn value(&self) -> &str {
        let colon = self.0.find(':').expect("validated at construction");
        &self.0[colon + 1..]
    }

    /// The full `namespace:value` string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this tag's namespace matches a wildcard prefix like
    /// `namespace:*`.
    pub fn matches_prefix(&self, namespace_prefix: &str) -> bool {
        self.namespace() == namespace_prefix
    }

    /// Build a tag from an already-validated namespace and value, skipping
    /// re-validation. Used internally to construct well-known tags (e.g.
    /// `content:chunks:<N>`) that the engine itself generates.
    pub fn from_parts(namespace: &str, value: &str) -> Self {
        Tag(format!("{namespace}:{value}"))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Tag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Tag {
    type Error = TagError;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Tag::parse(s)
    }
}

impl TryFrom<String> for Tag {
    type Error = TagError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Tag::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_tag() {
        let t = Tag::parse("type:user").unwrap();
        assert_eq!(t.namespace(), "type");
        assert_eq!(t.value(), "user");
    }

    #[test]
    fn value_may_contain_further_colons() {
        let t = Tag::parse("rbac:perm:entity:view").unwrap();
        assert_eq!(t.namespace(), "rbac");
        assert_eq!(t.value(), "perm:entity:view");
    }

    #[test]
    fn rejects_missing_separator() {
        assert_eq!(
            Tag::parse("noseparator"),
            Err(TagError::MissingSeparator("noseparator".into()))
        );
    }

    #[test]
    fn rejects_empty_namespace() {
        assert!(matches!(Tag::parse(":value"), Err(TagError::EmptyNamespace(_))));
    }

    #[test]
    fn wildcard_prefix_match() {
        let t = Tag::parse("status:active").unwrap();
        assert!(t.matches_prefix("status"));
        assert!(!t.matches_prefix("type"));
    }
}
