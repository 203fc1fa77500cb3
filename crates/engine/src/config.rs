//! Engine configuration.
//!
//! A typed builder, not a file format: this crate does not parse TOML or any
//! other on-disk config representation — that is left to whatever binary
//! embeds `entitydb-engine`; nothing in the contract this builder exposes
//! calls for a file loader.

use std::path::PathBuf;
use std::time::Duration;

use entitydb_concurrency::ThrottleConfig;
use entitydb_storage::RetentionPolicy;

/// Everything [`crate::EntityDb::open_with_config`] needs to bring a
/// database online: where the unified file lives, checkpoint/chunking
/// thresholds, cache budgets, memory watermarks, retention policy, and the
/// reindex grace period.
#[derive(Debug, Clone)]
pub struct EntityDbConfig {
    pub data_path: PathBuf,
    pub wal_checkpoint_bytes: u64,
    pub wal_checkpoint_records: u64,
    pub checkpoint_interval: Duration,
    pub chunk_threshold_bytes: u64,
    pub chunk_size_bytes: u64,
    pub entity_cache_entries: usize,
    pub entity_cache_bytes: u64,
    pub string_cache_entries: usize,
    pub string_cache_bytes: u64,
    pub memory_high_watermark: f32,
    pub memory_critical_watermark: f32,
    pub retention: RetentionPolicy,
    pub reindex_grace: Duration,
    pub throttle: ThrottleConfig,
}

impl EntityDbConfig {
    /// Start building a config rooted at `data_path`, the unified `.edb`
    /// file's location.
    pub fn builder(data_path: impl Into<PathBuf>) -> EntityDbConfigBuilder {
        EntityDbConfigBuilder::new(data_path)
    }
}

/// Fallible builder for [`EntityDbConfig`]. Every field has a sane default;
/// `build()` rejects combinations that would leave the engine unable to
/// start.
#[derive(Debug, Clone)]
pub struct EntityDbConfigBuilder {
    data_path: PathBuf,
    wal_checkpoint_bytes: u64,
    wal_checkpoint_records: u64,
    checkpoint_interval: Duration,
    chunk_threshold_bytes: u64,
    chunk_size_bytes: u64,
    entity_cache_entries: usize,
    entity_cache_bytes: u64,
    string_cache_entries: usize,
    string_cache_bytes: u64,
    memory_high_watermark: f32,
    memory_critical_watermark: f32,
    retention: RetentionPolicy,
    reindex_grace: Duration,
    throttle: ThrottleConfig,
}

/// Why [`EntityDbConfigBuilder::build`] refused a configuration.
#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("chunk_threshold_bytes must be > 0")]
    ZeroChunkThreshold,
    #[error("chunk_size_bytes must be > 0")]
    ZeroChunkSize,
    #[error("entity_cache_entries must be > 0")]
    ZeroEntityCacheEntries,
    #[error("string_cache_entries must be > 0")]
    ZeroStringCacheEntries,
    #[error("memory_high_watermark must be in (0, 1]")]
    HighWatermarkOutOfRange,
    #[error("memory_critical_watermark must be in (0, 1]")]
    CriticalWatermarkOutOfRange,
    #[error("memory_high_watermark ({high}) must be less than memory_critical_watermark ({critical})")]
    WatermarksNotOrdered { high: f32, critical: f32 },
}

impl EntityDbConfigBuilder {
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        EntityDbConfigBuilder {
            data_path: data_path.into(),
            wal_checkpoint_bytes: 64 * 1024 * 1024,
            wal_checkpoint_records: 10_000,
            checkpoint_interval: Duration::from_secs(60),
            chunk_threshold_bytes: entitydb_storage::chunk::DEFAULT_CHUNK_THRESHOLD as u64,
            chunk_size_bytes: entitydb_storage::chunk::DEFAULT_CHUNK_SIZE as u64,
            entity_cache_entries: 10_000,
            entity_cache_bytes: 64 * 1024 * 1024,
            string_cache_entries: 100_000,
            string_cache_bytes: 16 * 1024 * 1024,
            memory_high_watermark: 0.80,
            memory_critical_watermark: 0.95,
            retention: RetentionPolicy::KeepAll,
            reindex_grace: Duration::from_secs(120),
            throttle: ThrottleConfig::default(),
        }
    }

    pub fn wal_checkpoint_bytes(mut self, v: u64) -> Self {
        self.wal_checkpoint_bytes = v;
        self
    }
    pub fn wal_checkpoint_records(mut self, v: u64) -> Self {
        self.wal_checkpoint_records = v;
        self
    }
    pub fn checkpoint_interval(mut self, v: Duration) -> Self {
        self.checkpoint_interval = v;
        self
    }
    pub fn chunk_threshold_bytes(mut self, v: u64) -> Self {
        self.chunk_threshold_bytes = v;
        self
    }
    pub fn chunk_size_bytes(mut self, v: u64) -> Self {
        self.chunk_size_bytes = v;
        self
    }
    pub fn entity_cache_entries(mut self, v: usize) -> Self {
        self.entity_cache_entries = v;
        self
    }
    pub fn entity_cache_bytes(mut self, v: u64) -> Self {
        self.entity_cache_bytes = v;
        self
    }
    pub fn string_cache_entries(mut self, v: usize) -> Self {
        self.string_cache_entries = v;
        self
    }
    pub fn string_cache_bytes(mut self, v: u64) -> Self {
        self.string_cache_bytes = v;
        self
    }
    pub fn memory_high_watermark(mut self, v: f32) -> Self {
        self.memory_high_watermark = v;
        self
    }
    pub fn memory_critical_watermark(mut self, v: f32) -> Self {
        self.memory_critical_watermark = v;
        self
    }
    pub fn retention(mut self, v: RetentionPolicy) -> Self {
        self.retention = v;
        self
    }
    pub fn reindex_grace(mut self, v: Duration) -> Self {
        self.reindex_grace = v;
        self
    }
    pub fn throttle(mut self, v: ThrottleConfig) -> Self {
        self.throttle = v;
        self
    }

    pub fn build(self) -> Result<EntityDbConfig, ConfigError> {
        if self.chunk_threshold_bytes == 0 {
            return Err(ConfigError::ZeroChunkThreshold);
        }
        if self.chunk_size_bytes == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.entity_cache_entries == 0 {
            return Err(ConfigError::ZeroEntityCacheEntries);
        }
        if self.string_cache_entries == 0 {
            return Err(ConfigError::ZeroStringCacheEntries);
        }
        if !(self.memory_high_watermark > 0.0 && self.memory_high_watermark <= 1.0) {
            return Err(ConfigError::HighWatermarkOutOfRange);
        }
        if !(self.memory_critical_watermark > 0.0 && self.memory_critical_watermark <= 1.0) {
            return Err(ConfigError::CriticalWatermarkOutOfRange);
        }
        if self.memory_high_watermark >= self.memory_critical_watermark {
            return Err(ConfigError::WatermarksNotOrdered {
                high: self.memory_high_watermark,
                critical: self.memory_critical_watermark,
            });
        }

        Ok(EntityDbConfig {
            data_path: self.data_path,
            wal_checkpoint_bytes: self.wal_checkpoint_bytes,
            wal_checkpoint_records: self.wal_checkpoint_records,
            checkpoint_interval: self.checkpoint_interval,
            chunk_threshold_bytes: self.chunk_threshold_bytes,
            chunk_size_bytes: self.chunk_size_bytes,
            entity_cache_entries: self.entity_cache_entries,
            entity_cache_bytes: self.entity_cache_bytes,
            string_cache_entries: self.string_cache_entries,
            string_cache_bytes: self.string_cache_bytes,
            memory_high_watermark: self.memory_high_watermark,
            memory_critical_watermark: self.memory_critical_watermark,
            retention: self.retention,
            reindex_grace: self.reindex_grace,
            throttle: self.throttle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build_successfully() {
        let cfg = EntityDbConfig::builder("/tmp/x.edb").build().unwrap();
        assert_eq!(cfg.chunk_threshold_bytes, 4 * 1024 * 1024);
        assert_eq!(cfg.reindex_grace, Duration::from_secs(120));
    }

    #[test]
    fn rejects_zero_chunk_threshold() {
        let err = EntityDbConfig::builder("/tmp/x.edb")
            .chunk_threshold_bytes(0)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::ZeroChunkThreshold);
    }

    #[test]
    fn rejects_unordered_watermarks() {
        let err = EntityDbConfig::builder("/tmp/x.edb")
            .memory_high_watermark(0.9)
            .memory_critical_watermark(0.8)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::WatermarksNotOrdered {.. }));
    }

    #[test]
    fn rejects_watermark_out_of_range() {
        let err = EntityDbConfig::builder("/tmp/x.edb")
            .memory_high_watermark(0.0)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::HighWatermarkOutOfRange);
    }
}
