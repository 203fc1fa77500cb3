//! Background retention sweep and orphan-chunk collection.
//!
//! Two sweeps run on the same interval: dropping tags a [`RetentionPolicy`]
//! says not to retain, and collecting chunk entities whose parent no
//! longer references their generation.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use entitydb_core::{Entity, EntityId, Timestamp};
use entitydb_storage::RetentionPolicy;
use parking_lot::RwLock;
use tracing::info;

/// State shared between the repository and the retention collector.
pub struct RetentionState {
    pub entities: Arc<RwLock<HashMap<EntityId, Entity>>>,
    pub retention: RetentionPolicy,
    /// How long an orphan chunk is kept before collection, to tolerate a
    /// write still in flight.
    pub orphan_grace: Duration,
}

/// Runs [`sweep`] on a fixed interval in a background thread.
pub struct RetentionCollector {
    state: Arc<RetentionState>,
    check_interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl RetentionCollector {
    pub fn new(state: Arc<RetentionState>, check_interval: Duration) -> Self {
        RetentionCollector { state, check_interval, shutdown: Arc::new(AtomicBool::new(false)) }
    }

    pub fn start(&self) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let shutdown = Arc::clone(&self.shutdown);
        let check_interval = self.check_interval;

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
                sweep(&state, Timestamp::now());
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

/// Run one sweep: collect orphan chunks, then prune superseded tags per
/// [`RetentionPolicy`]. Exposed standalone so the background loop and tests
/// share one code path.
pub fn sweep(state: &RetentionState, now: Timestamp) {
    let orphans = find_orphan_chunks(&state.entities.read(), now, state.orphan_grace);
    if !orphans.is_empty() {
        let mut entities = state.entities.write();
        for id in &orphans {
            entities.remove(id);
        }
        info!(count = orphans.len(), "collected orphan chunk entities");
    }

    let pruned = prune_retained_tags(&mut state.entities.write(), &state.retention, now);
    if pruned > 0 {
        info!(tags_pruned = pruned, "retention sweep pruned superseded tags");
    }
}

/// A `type:chunk` entity is an orphan if its `parent:<id>` tag points at a
/// parent that no longer exists, or at a parent whose current
/// `content:chunks:N` generation was written after this chunk was created
/// (the parent was re-chunked and this chunk belongs to a prior
/// generation).
fn find_orphan_chunks(entities: &HashMap<EntityId, Entity>, now: Timestamp, grace: Duration) -> HashSet<EntityId> {
    let mut orphans = HashSet::new();
    for entity in entities.values() {
        if !entity.tags().iter().any(|t| t.tag.as_str() == "type:chunk") {
            continue;
        }
        let Some(created) = entity.created_at() else { continue };
        if now.as_nanos().saturating_sub(created.as_nanos()) < grace.as_nanos() as i64 {
            continue;
        }

        let parent_id = entity
            .tags()
            .iter()
            .find(|t| t.tag.namespace() == "parent")
            .map(|t| EntityId::from_str_unchecked(t.tag.value()));

        let is_orphan = match parent_id {
            None => true,
            Some(parent_id) => match entities.get(&parent_id) {
                None => true,
                Some(parent) => {
                    let current_generation = parent
                        .tags()
                        .iter()
                        .filter(|t| t.tag.namespace() == "content" && t.tag.value().starts_with("chunks:"))
                        .map(|t| t.timestamp)
                        .max();
                    match current_generation {
                        Some(gen_ts) => created < gen_ts,
                        None => true,
                    }
                }
            },
        };
        if is_orphan {
            orphans.insert(entity.id().clone());
        }
    }
    orphans
}

/// Drop tags a [`RetentionPolicy`] says not to retain, per namespace per
/// entity. Returns the total number of tags pruned. No-op under
/// `RetentionPolicy::KeepAll`.
fn prune_retained_tags(entities: &mut HashMap<EntityId, Entity>, retention: &RetentionPolicy, now: Timestamp) -> usize {
    if matches!(retention, RetentionPolicy::KeepAll) {
        return 0;
    }
    let mut total_pruned = 0usize;
    for entity in entities.values_mut() {
        let mut by_namespace: HashMap<&str, Vec<usize>> = HashMap::new();
        for (idx, record) in entity.tags().iter().enumerate() {
            by_namespace.entry(record.tag.namespace()).or_default().push(idx);
        }

        let mut keep = vec![true; entity.tags().len()];
        let mut entity_pruned = 0usize;
        for (namespace, mut indices) in by_namespace {
            indices.sort_by_key(|&idx| std::cmp::Reverse(entity.tags()[idx].timestamp));
            for (rank, &idx) in indices.iter().enumerate() {
                let ts = entity.tags()[idx].timestamp;
                if !retention.should_retain(ts, rank, now, namespace) {
                    keep[idx] = false;
                    entity_pruned += 1;
                }
            }
        }

        if entity_pruned > 0 {
            let retained: Vec<_> = entity
                .tags()
                .iter()
                .zip(keep.iter())
                .filter(|(_, keep)| **keep)
                .map(|(record, _)| record.clone())
                .collect();
            *entity = Entity::from_parts(entity.id().clone(), retained, entity.content().to_vec());
            total_pruned += entity_pruned;
        }
    }
    total_pruned
}
