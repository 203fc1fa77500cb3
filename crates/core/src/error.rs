//! Error taxonomy for EntityDB.
//!
//! `Error` is the single currency every public operation in this workspace
//! returns. Each variant maps to a user-visible status the way §7 of the
//! specification describes: `NotFound` → 404, `InvalidArgument` → 400,
//! `Overloaded` → 503, `Io`/`Corrupted` → 500.

use std::io;
use thiserror::Error as ThisError;

use crate::id::EntityId;

/// Result type alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds exposed by the EntityDB core.
#[derive(Debug, ThisError)]
pub enum Error {
    /// No entity with the given id, or no state existed at the requested
    /// `as_of` timestamp.
    #[error("entity not found: {0}")]
    NotFound(EntityId),

    /// `Create` was called with a caller-supplied id that already exists.
    #[error("entity already exists: {0}")]
    AlreadyExists(EntityId),

    /// Malformed tag, empty id on `Update`, out-of-range pagination, etc.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A CRC mismatch was found on a record that was supposed to be
    /// committed. The offending record is quarantined and recovery
    /// continues past it; this error is only returned when the caller
    /// specifically asked to read that record (e.g. `GetByID` on an entity
    /// whose record failed its checksum).
    #[error("corrupted record: {0}")]
    Corrupted(String),

    /// Memory pressure is critical; the caller may retry. Never returned for
    /// reads, only for writes that would allocate under pressure (chunked
    /// creates).
    #[error("database overloaded, retry later")]
    Overloaded,

    /// The operation was aborted via a cancellation signal or deadline. A
    /// write that had already fsynced its WAL record before cancellation is
    /// *not* rolled back.
    #[error("operation canceled")]
    Canceled,

    /// Underlying filesystem failure. Fatal to the current operation, not
    /// to the process.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// `true` only for [`Error::Overloaded`] — the one error kind that is
    /// transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Overloaded)
    }

    /// Always `false`. I/O and corruption errors are fatal to the operation
    /// that hit them, never to the process — the database stays open and
    /// continues serving other requests.
    pub fn is_fatal_to_process(&self) -> bool {
        false
    }

    /// The HTTP-ish status code a caller layering a wire protocol on top of
    /// this crate would map this error to. The HTTP surface itself is out
    /// of scope.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound(_) => 404,
            Error::AlreadyExists(_) => 409,
            Error::InvalidArgument(_) => 400,
            Error::Overloaded => 503,
            Error::Canceled => 499,
            Error::Corrupted(_) | Error::Io(_) => 500,
        }
    }
}
