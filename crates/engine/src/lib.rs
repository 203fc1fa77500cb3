//! EntityDB: a temporal, tag-based entity database backed by one unified
//! file.
//!
//! `open` opens or creates the file, recovers whatever the last session
//! left behind, wires the WAL writer and the write coordinator on top of
//! recovered state, then hands back a facade that owns the background
//! workers' lifecycle alongside the repository.

pub mod cache;
pub mod config;
pub mod history;
pub mod query;
pub mod reindex;
pub mod repository;
pub mod retention_collector;

use std::sync::Arc;
use std::thread::JoinHandle;

use entitydb_concurrency::{MemoryMonitor, MemoryThresholds};
use entitydb_core::Result;
use entitydb_storage::container::FileContainer;
use entitydb_storage::index::IndexSection;
use entitydb_storage::wal::{DurabilityMode, WalWriter};
use tracing::info;

pub use config::{ConfigError, EntityDbConfig, EntityDbConfigBuilder};
pub use repository::{EntityRepository, EntityView, GetOptions, TagQuery, TagView};

use reindex::{ReindexScheduler, ReindexState};
use retention_collector::{RetentionCollector, RetentionState};

/// The top-level handle applications hold: the repository plus the
/// background reindex and retention workers running over it.
pub struct EntityDb {
    repository: Arc<EntityRepository>,
    reindex: ReindexScheduler,
    retention: RetentionCollector,
    reindex_handle: Option<JoinHandle<()>>,
    retention_handle: Option<JoinHandle<()>>,
}

impl EntityDb {
    /// Open (creating if absent) the database file named by `config`,
    /// recover it, and start the background workers.
    ///
    /// Recovery reads the header, scans the entity section, decodes
    /// whatever index section is present, then replays the WAL on top. If
    /// no index section survived (a brand-new file, or one whose index
    /// decode failed), a full reindex runs once before background workers
    /// start.
    pub fn open(config: EntityDbConfig) -> Result<Self> {
        let created_ns = entitydb_core::Timestamp::now().as_nanos();
        let container = FileContainer::open_or_create(&config.data_path, created_ns)
            .map_err(entitydb_core::Error::Io)?;
        let header = container
            .read_header()
            .map_err(|e| entitydb_core::Error::Corrupted(e.to_string()))?;

        let report = entitydb_durability::recover(
            &container,
            header,
            config.string_cache_entries,
            config.string_cache_bytes as usize,
        )
        .map_err(entitydb_core::Error::Io)?;

        let entity_mtime_ns = report
            .entities
            .values()
            .flat_map(|e| e.tags().iter().map(|t| t.timestamp.as_nanos()))
            .max()
            .unwrap_or(0);

        let index = match report.index {
            Some(index) => index,
            None => IndexSection::rebuild(
                report.entities.values(),
                config.string_cache_entries,
                config.string_cache_bytes as usize,
                entity_mtime_ns,
            ),
        };
        if !report.quarantined.is_empty() {
            tracing::warn!(count = report.quarantined.len(), "recovery quarantined corrupted entity records");
        }

        let wal = WalWriter::new(report.header.wal_offset, report.wal_valid_bytes, DurabilityMode::Strict);

        let thresholds = MemoryThresholds {
            budget_bytes: estimate_memory_budget(&config),
            high_watermark: config.memory_high_watermark as f64,
            critical_watermark: config.memory_critical_watermark as f64,
        };
        let memory_monitor = MemoryMonitor::new(thresholds);

        let repository = Arc::new(EntityRepository::new(
            container,
            wal,
            report.entities,
            index,
            memory_monitor,
            entity_mtime_ns,
            config.chunk_threshold_bytes,
            config.chunk_size_bytes,
            config.entity_cache_entries,
            config.entity_cache_bytes,
            config.wal_checkpoint_bytes,
            config.wal_checkpoint_records,
            config.string_cache_entries,
            config.string_cache_bytes as usize,
        ));

        let reindex_state = Arc::new(ReindexState {
            entities: repository.entities_handle(),
            index: repository.index_handle(),
            entity_mtime_ns: repository.entity_mtime_handle(),
            string_table_max_entries: config.string_cache_entries,
            string_table_max_bytes: config.string_cache_bytes as usize,
        });
        reindex::maybe_reindex(&reindex_state, config.reindex_grace);
        let reindex = ReindexScheduler::new(reindex_state, config.checkpoint_interval, config.reindex_grace);

        let retention_state = Arc::new(RetentionState {
            entities: repository.entities_handle(),
            retention: config.retention.clone(),
            orphan_grace: config.checkpoint_interval,
        });
        let retention = RetentionCollector::new(retention_state, config.checkpoint_interval);

        info!(path = %config.data_path.display(), entities = repository.cache_stats().hits, "database open");

        Ok(EntityDb {
            repository,
            reindex,
            retention,
            reindex_handle: None,
            retention_handle: None,
        })
    }

    /// Start the background reindex and retention workers. Idempotent to
    /// call more than once is not supported — callers own the returned
    /// handles via [`EntityDb::shutdown`].
    pub fn start_background_workers(&mut self) {
        self.reindex_handle = Some(self.reindex.start());
        self.retention_handle = Some(self.retention.start());
    }

    /// The repository handle applications issue `Create`/`Update`/`Query`/
    /// etc. calls against.
    pub fn repository(&self) -> Arc<EntityRepository> {
        Arc::clone(&self.repository)
    }

    /// Signal both background workers to stop and join their threads.
    pub fn shutdown(&mut self) {
        self.reindex.shutdown();
        self.retention.shutdown();
        if let Some(handle) = self.reindex_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.retention_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for EntityDb {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A heuristic total-memory budget for the process, since
/// [`EntityDbConfig`] only carries cache-specific byte budgets rather than a
/// single process-wide figure. Sized generously above the sum of the
/// configured caches so the high/critical watermarks trip on genuine
/// external pressure rather than on the caches simply being full.
fn estimate_memory_budget(config: &EntityDbConfig) -> u64 {
    let cache_floor = config.entity_cache_bytes + config.string_cache_bytes;
    cache_floor.saturating_mul(8).max(256 * 1024 * 1024)
}

#[cfg(test)]
mod tests {
    use super::*;
    use entitydb_core::{Tag, Timestamp};
    use tempfile::tempdir;

    #[test]
    fn opens_creates_and_recovers_across_restarts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("restart.edb");

        let id = {
            let config = EntityDbConfig::builder(&path).build().unwrap();
            let db = EntityDb::open(config).unwrap();
            let repo = db.repository();
            let created = repo
                .create(None, vec![Tag::parse("type:doc").unwrap()], b"hello".to_vec(), Timestamp::now())
                .unwrap();
            created.id().clone()
        };

        let config = EntityDbConfig::builder(&path).build().unwrap();
        let db = EntityDb::open(config).unwrap();
        let repo = db.repository();
        let view = repo
            .get_by_id(&id, &repository::GetOptions { include_content: true,..Default::default() })
            .unwrap();
        assert_eq!(view.content, b"hello");
    }
}
