//! Entity identifiers.

use std::fmt;

use crate::limits::Limits;

/// A stable identifier for an entity, unique within the database.
///
/// IDs are opaque strings on the wire and may be supplied by the
/// caller at `Create` time or generated automatically (a UUIDv4 string) when
/// omitted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(String);

impl EntityId {
    /// Generate a new random id (UUIDv4, hyphenated form).
    pub fn generate() -> Self {
        EntityId(uuid::Uuid::new_v4().to_string())
    }

    /// Validate and wrap a caller-supplied id.
    ///
    /// An id must be non-empty and no longer than
    /// [`Limits::max_id_len`](crate::limits::Limits::max_id_len).
    pub fn parse(s: impl Into<String>) -> Result<Self, crate::error::Error> {
        let s = s.into();
        if s.is_empty() {
            return Err(crate::error::Error::InvalidArgument(
                "entity id must not be empty".into(),
            ));
        }
        if s.len() > Limits::default().max_id_len {
            return Err(crate::error::Error::InvalidArgument(format!(
                "entity id exceeds max length ({} > {})",
                s.len(),
                Limits::default().max_id_len
            )));
        }
        Ok(EntityId(s))
    }

    /// Wrap a string as an id without validation. Used internally by the
    /// codec layer when reading ids back off disk (they were validated on
    /// the way in) and by tests.
    pub fn from_str_unchecked(s: impl Into<String>) -> Self {
        EntityId(s.into())
    }

    /// Borrow the id as a `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner `String`.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        EntityId(s)
    }
}
