//! Cooperative cancellation and deadlines.
//!
//! Long operations — full reindex, large streaming reads, chunked writes —
//! accept a [`CancellationToken`] and check it between chunks or index
//! shards rather than being preemptively interrupted. A [`Deadline`] is the
//! same idea expressed as wall-clock time instead of an explicit signal.
//! A write that has already fsynced its WAL record before cancellation is
//! *not* rolled back — the caller is expected to check *before* starting the
//! next WAL-durable step, never in the middle of one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use entitydb_core::Error;

/// A cooperative, shareable cancel flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    canceled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A token that is never canceled.
    pub fn new() -> Self {
        CancellationToken::default()
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
    }

    /// Whether [`CancellationToken::cancel`] has been called.
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    /// Returns `Err(Error::Canceled)` if canceled, `Ok(())` otherwise. Meant
    /// to be called at cooperative yield points between chunks/shards.
    pub fn check(&self) -> Result<(), Error> {
        if self.is_canceled() {
            Err(Error::Canceled)
        } else {
            Ok(())
        }
    }
}

/// A wall-clock deadline for a single operation.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// A deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Deadline { at: Instant::now() + timeout }
    }

    /// Whether the deadline has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Returns `Err(Error::Canceled)` if the deadline has passed. Writers
    /// only consult this between WAL records, never mid-record.
    pub fn check(&self) -> Result<(), Error> {
        if self.is_expired() {
            Err(Error::Canceled)
        } else {
            Ok(())
        }
    }
}
