//! Write-ahead log.
//!
//! The WAL region sits immediately after the entity section, at
//! `header.wal_offset`. Every write appends a length-prefixed, CRC-checked
//! [`WalRecord`] there and — depending on [`DurabilityMode`] — fsyncs before
//! the call returns, so a crash can never make a record visible to readers
//! without first being durable on disk.
//!
//! A checkpoint folds every pending record into the entity section,
//! rebuilds the index, and resets the WAL region to empty. Between checkpoints, [`WalWriter`]
//! tracks how many bytes it has appended purely in memory: the authoritative
//! answer to "how much WAL is there" is always "scan from `wal_offset`
//! forward validating checksums until one fails", which is exactly what
//! [`replay`] does on startup. This means a writer never needs to trust a
//! header field that could itself be stale between checkpoints, and it means
//! whatever on-disk index section happened to be sitting past `wal_offset`
//! from the previous checkpoint is silently overwritten by the first new WAL
//! record — harmless, since the index is always rebuilt from the entity
//! section at the next checkpoint.

pub mod durability;
pub mod record;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use entitydb_core::Timestamp;
use tracing::{debug, warn};

pub use durability::DurabilityMode;
pub use record::{WalOp, WalRecord, WalRecordError};

use crate::container::FileContainer;

/// Appends records into the WAL region and honors a [`DurabilityMode`].
pub struct WalWriter {
    wal_offset: u64,
    pending_bytes: AtomicU64,
    batch_count: AtomicUsize,
    mode: DurabilityMode,
}

impl WalWriter {
    /// Construct a writer for the WAL region starting at `wal_offset`.
    /// `initial_pending_bytes` should be the number of valid bytes recovery
    /// found there (0 right after a fresh checkpoint).
    pub fn new(wal_offset: u64, initial_pending_bytes: u64, mode: DurabilityMode) -> Self {
        WalWriter {
            wal_offset,
            pending_bytes: AtomicU64::new(initial_pending_bytes),
            batch_count: AtomicUsize::new(0),
            mode,
        }
    }

    /// Bytes appended since the WAL region was last reset (i.e. since the
    /// last checkpoint).
    pub fn pending_bytes(&self) -> u64 {
        self.pending_bytes.load(Ordering::Acquire)
    }

    /// Append `record` to the WAL region, honoring the configured
    /// [`DurabilityMode`]. Returns the file offset the record was written
    /// at.
    pub fn append(&self, container: &FileContainer, record: &WalRecord) -> std::io::Result<u64> {
        let bytes = record.to_bytes();
        let offset = self.wal_offset + self.pending_bytes.load(Ordering::Acquire);
        container.write_at_unsynced(offset, &bytes)?;
        self.pending_bytes.fetch_add(bytes.len() as u64, Ordering::AcqRel);

        match self.mode {
            DurabilityMode::Strict => container.sync()?,
            DurabilityMode::Batched { batch_size,.. } => {
                let count = self.batch_count.fetch_add(1, Ordering::AcqRel) + 1;
                if count >= batch_size {
                    container.sync()?;
                    self.batch_count.store(0, Ordering::Release);
                }
            }
            DurabilityMode::Async {.. } | DurabilityMode::InMemory => {}
        }
        debug!(offset, op = ?record.op, "wal append");
        Ok(offset)
    }

    /// Force an fsync of everything appended so far, regardless of mode.
    /// Called by the background flush timer under `Async` mode and by the
    /// checkpointer before folding the WAL into the entity section.
    pub fn flush(&self, container: &FileContainer) -> std::io::Result<()> {
        container.sync()?;
        self.batch_count.store(0, Ordering::Release);
        Ok(())
    }

    /// Reset bookkeeping after a checkpoint moves `wal_offset` to the new
    /// (empty) tail of the entity section.
    pub fn reset(&mut self, new_wal_offset: u64) {
        self.wal_offset = new_wal_offset;
        self.pending_bytes.store(0, Ordering::Release);
        self.batch_count.store(0, Ordering::Release);
    }

    /// The offset the WAL region currently starts at.
    pub fn wal_offset(&self) -> u64 {
        self.wal_offset
    }
}

/// The result of replaying a WAL region: every valid record in order, and
/// the number of bytes that were valid (i.e. where the first corrupt or
/// truncated record began).
pub struct ReplayResult {
    /// Valid records, in append order.
    pub records: Vec<WalRecord>,
    /// Byte length of the valid prefix of the WAL region.
    pub valid_bytes: u64,
}

/// Scan the WAL region starting at `wal_offset` through the current end of
/// file, decoding records until one is truncated, fails its checksum, or
/// names an unknown op — at which point the scan stops and everything
/// decoded so far is returned.
pub fn replay(container: &FileContainer, wal_offset: u64) -> std::io::Result<ReplayResult> {
    let file_len = container.file_len()?;
    if wal_offset >= file_len {
        return Ok(ReplayResult { records: Vec::new(), valid_bytes: 0 });
    }
    let region = container.read_at(wal_offset, (file_len - wal_offset) as usize)?;

    let mut records = Vec::new();
    let mut cursor = 0usize;
    loop {
        match WalRecord::from_bytes(&region[cursor..]) {
            Ok((record, consumed)) => {
                cursor += consumed;
                records.push(record);
            }
            Err(err) => {
                if cursor < region.len() {
                    warn!(
                        offset = wal_offset + cursor as u64,
                        %err,
                        "WAL replay stopped: invalid record, treating remainder as a torn tail"
                    );
                }
                break;
            }
        }
    }
    Ok(ReplayResult {
        records,
        valid_bytes: cursor as u64,
    })
}

/// Convenience constructor for a timestamped single-tag-namespace record,
/// used by the repository layer's `Delete` operation: a delete
/// is implemented as an `Update` that appends `status:deleted`.
pub fn delete_record(entity_id: entitydb_core::EntityId, at: Timestamp) -> WalRecord {
    use entitydb_core::Tag;
    WalRecord {
        op: WalOp::Delete,
        timestamp: at,
        entity_id,
        tags: vec![(at, Tag::parse("status:deleted").expect("static tag is valid"))],
        content: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::FileContainer;
    use entitydb_core::{EntityId, Tag};
    use tempfile::tempdir;

    fn sample_record(id: &str, ts: i64) -> WalRecord {
        WalRecord {
            op: WalOp::Create,
            timestamp: Timestamp::from_nanos(ts),
            entity_id: EntityId::from_str_unchecked(id),
            tags: vec![(Timestamp::from_nanos(ts), Tag::parse("type:doc").unwrap())],
            content: Some(b"x".to_vec()),
        }
    }

    #[test]
    fn append_then_replay_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.edb");
        let container = FileContainer::create(&path, 0).unwrap();
        let header = container.read_header().unwrap();
        let writer = WalWriter::new(header.wal_offset, 0, DurabilityMode::Strict);

        let r1 = sample_record("a", 100);
        let r2 = sample_record("b", 200);
        writer.append(&container, &r1).unwrap();
        writer.append(&container, &r2).unwrap();

        let result = replay(&container, header.wal_offset).unwrap();
        assert_eq!(result.records, vec![r1, r2]);
        assert_eq!(result.valid_bytes, writer.pending_bytes());
    }

    #[test]
    fn replay_stops_at_corrupt_record_and_ignores_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.edb");
        let container = FileContainer::create(&path, 0).unwrap();
        let header = container.read_header().unwrap();
        let writer = WalWriter::new(header.wal_offset, 0, DurabilityMode::Strict);

        let r1 = sample_record("a", 100);
        writer.append(&container, &r1).unwrap();
        // Append garbage after the valid record, simulating a torn write.
        container
            .write_at(header.wal_offset + writer.pending_bytes(), &[0xFF; 20])
            .unwrap();

        let result = replay(&container, header.wal_offset).unwrap();
        assert_eq!(result.records, vec![r1]);
        assert_eq!(result.valid_bytes, writer.pending_bytes());
    }

    #[test]
    fn empty_wal_region_replays_to_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.edb");
        let container = FileContainer::create(&path, 0).unwrap();
        let header = container.read_header().unwrap();
        let result = replay(&container, header.wal_offset).unwrap();
        assert!(result.records.is_empty());
        assert_eq!(result.valid_bytes, 0);
    }

    #[test]
    fn reset_moves_offset_and_clears_pending() {
        let mut writer = WalWriter::new(128, 64, DurabilityMode::Strict);
        assert_eq!(writer.pending_bytes(), 64);
        writer.reset(500);
        assert_eq!(writer.wal_offset(), 500);
        assert_eq!(writer.pending_bytes(), 0);
    }
}
