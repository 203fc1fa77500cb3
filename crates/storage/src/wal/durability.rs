//! Durability modes controlling when a WAL append is considered committed.
//!
//! Four tiers: no fsync at all, fsync every record, fsync on a batch
//! boundary, or fsync off the hot path entirely via a background flusher.

/// How aggressively the WAL writer fsyncs before acknowledging a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurabilityMode {
    /// Never fsync. Fastest, and appropriate only for ephemeral/test
    /// databases — a process crash can lose any amount of the WAL tail.
    InMemory,
    /// fsync after every single record. The strongest guarantee: a write is never acknowledged
    /// until it is durable.
    #[default]
    Strict,
    /// Batch up to `batch_size` records (or `batch_interval_ms` elapsed,
    /// whichever comes first) before fsyncing. Trades a bounded amount of
    /// durability for throughput under write bursts.
    Batched {
        /// Max records to accumulate before a forced fsync.
        batch_size: usize,
        /// Max milliseconds to hold an unflushed record before a forced
        /// fsync.
        batch_interval_ms: u64,
    },
    /// fsync happens on a background timer completely decoupled from the
    /// calling write, which returns as soon as the record is appended.
    /// Acknowledged writes can still be lost on crash within the window.
    Async {
        /// Interval between background fsyncs.
        interval_ms: u64,
    },
}

impl DurabilityMode {
    /// Whether a record written under this mode must be fsynced before the
    /// call that appended it returns.
    pub fn fsyncs_inline(&self) -> bool {
        matches!(self, DurabilityMode::Strict)
    }
}
