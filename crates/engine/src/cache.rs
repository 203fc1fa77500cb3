//! Bounded entity cache.
//!
//! Built on the `lru` crate. Unlike the interned-string cache
//! (`entitydb_storage::StringTable`, which is itself a source of on-disk
//! truth once checkpointed), this cache sits in front of the repository's
//! authoritative in-memory entity table: eviction here never loses data, it
//! just means the next read re-clones from that table.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use entitydb_core::{Entity, EntityId};
use lru::LruCache;
use parking_lot::Mutex;

fn entity_byte_size(entity: &Entity) -> u64 {
    let tags_bytes: usize = entity.tags().iter().map(|t| t.tag.as_str().len() + 8).sum();
    (entity.content().len() + tags_bytes + entity.id().as_str().len()) as u64
}

/// Hit/miss/eviction counters.
#[derive(Debug, Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Point-in-time read of a cache's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct Inner {
    lru: LruCache<EntityId, Entity>,
    total_bytes: u64,
    max_bytes: u64,
}

/// Read-through cache over id -> `Entity`, bounded by both entry count and
/// total bytes. Writes invalidate the relevant entry explicitly; nothing
/// here expires on a timer.
pub struct EntityCache {
    inner: Mutex<Inner>,
    stats: CacheStats,
}

impl EntityCache {
    pub fn new(max_entries: usize, max_bytes: u64) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::new(1).unwrap());
        EntityCache {
            inner: Mutex::new(Inner { lru: LruCache::new(capacity), total_bytes: 0, max_bytes }),
            stats: CacheStats::default(),
        }
    }

    /// Look up `id`, cloning the cached entity and marking it
    /// most-recently-used.
    pub fn get(&self, id: &EntityId) -> Option<Entity> {
        let mut inner = self.inner.lock();
        match inner.lru.get(id) {
            Some(entity) => {
                let clone = entity.clone();
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(clone)
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or refresh `entity`, evicting least-recently-used entries
    /// until both the entry-count and byte-budget bounds are satisfied.
    pub fn put(&self, entity: Entity) {
        let mut inner = self.inner.lock();
        let id = entity.id().clone();
        let size = entity_byte_size(&entity);
        if let Some(old) = inner.lru.put(id, entity) {
            inner.total_bytes = inner.total_bytes.saturating_sub(entity_byte_size(&old));
        }
        inner.total_bytes += size;
        while inner.total_bytes > inner.max_bytes {
            match inner.lru.pop_lru() {
                Some((_, evicted)) => {
                    inner.total_bytes = inner.total_bytes.saturating_sub(entity_byte_size(&evicted));
                    self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }
    }

    /// Drop `id` from the cache. Called on every `Update`/`Delete` so a
    /// stale snapshot is never served.
    pub fn invalidate(&self, id: &EntityId) {
        let mut inner = self.inner.lock();
        if let Some(entity) = inner.lru.pop(id) {
            inner.total_bytes = inner.total_bytes.saturating_sub(entity_byte_size(&entity));
        }
    }

    /// Halve both the entry-count capacity and the byte budget, evicting until both are satisfied.
    pub fn shrink_by_half(&self) {
        let mut inner = self.inner.lock();
        let new_cap = (inner.lru.cap().get() / 2).max(1);
        inner.max_bytes = (inner.max_bytes / 2).max(1);
        inner.lru.resize(NonZeroUsize::new(new_cap).unwrap());
        while inner.total_bytes > inner.max_bytes {
            match inner.lru.pop_lru() {
                Some((_, evicted)) => {
                    inner.total_bytes = inner.total_bytes.saturating_sub(entity_byte_size(&evicted));
                    self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let evicted = inner.lru.len() as u64;
        inner.lru.clear();
        inner.total_bytes = 0;
        self.stats.evictions.fetch_add(evicted, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
