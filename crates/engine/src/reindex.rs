//! Background reindex scheduler.
//!
//! A background thread, gated by an atomic shutdown flag, sleeping in short
//! increments so shutdown is never more than ~100ms away, that does its
//! work through the same path a startup check would use rather than
//! touching internal state ad hoc.
//!
//! **Critical invariant**: the staleness trigger is
//! `entity_mtime > index_mtime + grace`, never the inverse. Getting this
//! backwards makes every freshly rebuilt index look stale again on the very
//! next check, and the engine spins rebuilding forever under steady write
//! load.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use entitydb_core::{Entity, EntityId};
use entitydb_storage::index::IndexSection;
use parking_lot::RwLock;
use tracing::{info, warn};

/// State shared between the repository's write path and the reindex
/// scheduler.
pub struct ReindexState {
    pub entities: Arc<RwLock<HashMap<EntityId, Entity>>>,
    pub index: Arc<RwLock<IndexSection>>,
    pub entity_mtime_ns: Arc<AtomicI64>,
    pub string_table_max_entries: usize,
    pub string_table_max_bytes: usize,
}

/// Runs [`maybe_reindex`] on a fixed interval in a background thread.
pub struct ReindexScheduler {
    state: Arc<ReindexState>,
    check_interval: Duration,
    grace: Duration,
    shutdown: Arc<AtomicBool>,
}

impl ReindexScheduler {
    pub fn new(state: Arc<ReindexState>, check_interval: Duration, grace: Duration) -> Self {
        ReindexScheduler { state, check_interval, grace, shutdown: Arc::new(AtomicBool::new(false)) }
    }

    /// Start the background thread. Callers should join the returned handle
    /// after calling [`ReindexScheduler::shutdown`].
    pub fn start(&self) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let shutdown = Arc::clone(&self.shutdown);
        let check_interval = self.check_interval;
        let grace = self.grace;

        thread::spawn(move || {
            let poll = Duration::from_millis(100).min(check_interval);
            while !shutdown.load(Ordering::Relaxed) {
                let deadline = Instant::now() + check_interval;
                while Instant::now() < deadline {
                    if shutdown.load(Ordering::Relaxed) {
                        return;
                    }
                    thread::sleep(poll);
                }
                maybe_reindex(&state, grace);
            }
        })
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

/// Check the staleness condition once and rebuild in place if needed.
/// Exposed standalone so startup (run once before the background loop
/// starts) and the recurring background check share one code path.
pub fn maybe_reindex(state: &ReindexState, grace: Duration) {
    let entity_mtime = state.entity_mtime_ns.load(Ordering::Acquire);
    let index_mtime = state.index.read().built_at_ns;

    if entity_mtime > index_mtime.saturating_add(grace.as_nanos() as i64) {
        warn!(entity_mtime, index_mtime, "index stale, running full reindex");
        let started = Instant::now();
        let (rebuilt, count) = {
            let entities = state.entities.read();
            let rebuilt = IndexSection::rebuild(
                entities.values(),
                state.string_table_max_entries,
                state.string_table_max_bytes,
                entity_mtime,
            );
            (rebuilt, entities.len())
        };
        *state.index.write() = rebuilt;
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            entities = count,
            "full reindex complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entitydb_core::{Tag, Timestamp};

    fn make_state(entity_mtime: i64, index_mtime: i64) -> ReindexState {
        let mut e = Entity::new(EntityId::from_str_unchecked("a"));
        e.append_tags(Timestamp::from_nanos(entity_mtime), [Tag::parse("type:doc").unwrap()]);
        let mut entities = HashMap::new();
        entities.insert(EntityId::from_str_unchecked("a"), e);
        ReindexState {
            entities: Arc::new(RwLock::new(entities)),
            index: Arc::new(RwLock::new(IndexSection::empty(1000, 65536, index_mtime))),
            entity_mtime_ns: Arc::new(AtomicI64::new(entity_mtime)),
            string_table_max_entries: 1000,
            string_table_max_bytes: 65536,
        }
    }

    #[test]
    fn rebuilds_when_entities_are_newer_than_grace_allows() {
        let state = make_state(1_000_000_000, 0);
        maybe_reindex(&state, Duration::from_secs(0));
        assert!(state.index.read().tag_index.lookup_exact("type:doc").len() == 1);
        assert_eq!(state.index.read().built_at_ns, 1_000_000_000);
    }

    #[test]
    fn does_not_rebuild_within_grace() {
        let state = make_state(1000, 0);
        maybe_reindex(&state, Duration::from_secs(3600));
        assert_eq!(state.index.read().built_at_ns, 0);
    }
}
