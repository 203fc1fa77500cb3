//! The public repository API: `Create`, `Update`, `GetByID`,
//! `ListByTag`, `Query`, `GetAsOf`, `GetHistory`, `GetChanges`, `GetDiff`,
//! `Delete`, `StreamContent`.
//!
//! An in-memory table is the authoritative state, a WAL ahead of it for
//! durability, and every mutating call funneled through a single
//! [`WriteCoordinator`] so only one write is ever in flight. Reads never
//! take the writer lock — they go straight to the in-memory table (or the
//! entity cache in front of it) under a shared `RwLock`; readers never
//! block on the writer.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use entitydb_concurrency::{CancellationToken, MemoryMonitor, PressureLevel, WriteCoordinator};
use entitydb_core::{Entity, EntityId, Error, Result, Tag, Timestamp};
use entitydb_storage::container::FileContainer;
use entitydb_storage::index::IndexSection;
use entitydb_storage::wal::{delete_record, WalOp, WalRecord, WalWriter};
use entitydb_storage::{chunk, chunk_entity, plan_chunks};
use parking_lot::{Mutex, RwLock};
use tracing::warn;

use crate::cache::EntityCache;
use crate::history::{self, DiffResult, HistoryEntry};
use crate::query::{self, Filter, Sort};

const CONTENT_WRITTEN_NAMESPACE: &str = "content";
const CONTENT_WRITTEN_PREFIX: &str = "written:";

/// Options controlling what [`EntityRepository::get_by_id`] returns.
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Return the full timestamped tag log instead of the latest-per-
    /// namespace view.
    pub include_timestamps: bool,
    /// Populate content (otherwise left empty, avoiding a chunk
    /// reassembly for callers that only want tags).
    pub include_content: bool,
    /// When `include_content` is set and the entity is chunked, reassemble
    /// the full content from its chunk children.
    pub include_chunks: bool,
}

/// The tag view returned by [`EntityRepository::get_by_id`].
#[derive(Debug, Clone)]
pub enum TagView {
    Latest(BTreeMap<String, String>),
    Timestamped(Vec<(Timestamp, Tag)>),
}

/// What `GetByID` returns.
#[derive(Debug, Clone)]
pub struct EntityView {
    pub id: EntityId,
    pub tags: TagView,
    pub content: Vec<u8>,
}

/// `ListByTag`'s query shape: exact tag or a namespace prefix.
#[derive(Debug, Clone)]
pub enum TagQuery {
    Exact(Tag),
    Prefix(String),
}

/// Everything the repository needs to operate, produced by
/// [`crate::EntityDb::open_with_config`] after recovery.
pub struct EntityRepository {
    container: FileContainer,
    wal: Mutex<WalWriter>,
    coordinator: WriteCoordinator,
    entities: Arc<RwLock<HashMap<EntityId, Entity>>>,
    index: Arc<RwLock<IndexSection>>,
    cache: EntityCache,
    memory_monitor: Mutex<MemoryMonitor>,
    entity_mtime_ns: Arc<AtomicI64>,
    pending_records: AtomicU64,
    chunk_threshold_bytes: u64,
    chunk_size_bytes: u64,
    wal_checkpoint_bytes: u64,
    wal_checkpoint_records: u64,
    string_table_max_entries: usize,
    string_table_max_bytes: usize,
}

impl EntityRepository {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        container: FileContainer,
        wal: WalWriter,
        entities: HashMap<EntityId, Entity>,
        index: IndexSection,
        memory_monitor: MemoryMonitor,
        entity_mtime_ns: i64,
        chunk_threshold_bytes: u64,
        chunk_size_bytes: u64,
        entity_cache_entries: usize,
        entity_cache_bytes: u64,
        wal_checkpoint_bytes: u64,
        wal_checkpoint_records: u64,
        string_table_max_entries: usize,
        string_table_max_bytes: usize,
    ) -> Self {
        EntityRepository {
            container,
            wal: Mutex::new(wal),
            coordinator: WriteCoordinator::new(),
            entities: Arc::new(RwLock::new(entities)),
            index: Arc::new(RwLock::new(index)),
            cache: EntityCache::new(entity_cache_entries, entity_cache_bytes),
            memory_monitor: Mutex::new(memory_monitor),
            entity_mtime_ns: Arc::new(AtomicI64::new(entity_mtime_ns)),
            pending_records: AtomicU64::new(0),
            chunk_threshold_bytes,
            chunk_size_bytes,
            wal_checkpoint_bytes,
            wal_checkpoint_records,
            string_table_max_entries,
            string_table_max_bytes,
        }
    }

    /// Handles shared with the background reindex scheduler and retention
    /// collector.
    pub(crate) fn entities_handle(&self) -> Arc<RwLock<HashMap<EntityId, Entity>>> {
        Arc::clone(&self.entities)
    }

    pub(crate) fn index_handle(&self) -> Arc<RwLock<IndexSection>> {
        Arc::clone(&self.index)
    }

    pub(crate) fn entity_mtime_handle(&self) -> Arc<AtomicI64> {
        Arc::clone(&self.entity_mtime_ns)
    }

    pub fn cache_stats(&self) -> crate::cache::CacheStatsSnapshot {
        self.cache.stats()
    }

    fn is_critical_pressure(&self) -> bool {
        self.memory_monitor.lock().sample() == PressureLevel::Critical
    }

    // ---- writes -----------------------------------------------------

    pub fn create(&self, id: Option<EntityId>, tags: Vec<Tag>, content: Vec<u8>, at: Timestamp) -> Result<Entity> {
        self.coordinator.with_writer(|| {
            let id = match id {
                Some(id) => {
                    if self.entities.read().contains_key(&id) {
                        return Err(Error::AlreadyExists(id));
                    }
                    id
                }
                None => EntityId::generate(),
            };

            let mut all_tags = tags;
            let mut chunk_records: Vec<WalRecord> = Vec::new();
            let wal_content = if content.len() as u64 > self.chunk_threshold_bytes {
                if self.is_critical_pressure() {
                    return Err(Error::Overloaded);
                }
                self.plan_chunk_records(&id, &content, at, &mut all_tags, &mut chunk_records);
                Vec::new()
            } else {
                if !content.is_empty() {
                    all_tags.push(content_written_tag(at));
                }
                content
            };

            let record = WalRecord {
                op: WalOp::Create,
                timestamp: at,
                entity_id: id.clone(),
                tags: all_tags.iter().map(|t| (at, t.clone())).collect(),
                content: Some(wal_content),
            };

            self.append_all(&record, &chunk_records)?;
            let created = self.apply_and_index(&record, &chunk_records, at.as_nanos())?;
            self.cache.put(created.clone());
            self.note_write(1 + chunk_records.len() as u64);
            self.maybe_checkpoint();
            Ok(created)
        })
    }

    pub fn update(&self, id: &EntityId, new_tags: Vec<Tag>, new_content: Option<Vec<u8>>, at: Timestamp) -> Result<Entity> {
        self.coordinator.with_writer(|| {
            let last_observed = {
                let entities = self.entities.read();
                let existing = entities.get(id).ok_or_else(|| Error::NotFound(id.clone()))?;
                existing.updated_at()
            };
            let effective_at = at.monotonic(last_observed);

            let mut all_tags = new_tags;
            let mut chunk_records: Vec<WalRecord> = Vec::new();
            let wal_content: Option<Vec<u8>> = match new_content {
                None => None,
                Some(content) if content.len() as u64 > self.chunk_threshold_bytes => {
                    if self.is_critical_pressure() {
                        return Err(Error::Overloaded);
                    }
                    self.plan_chunk_records(id, &content, effective_at, &mut all_tags, &mut chunk_records);
                    Some(Vec::new())
                }
                Some(content) => {
                    all_tags.push(content_written_tag(effective_at));
                    Some(content)
                }
            };

            let record = WalRecord {
                op: WalOp::Update,
                timestamp: effective_at,
                entity_id: id.clone(),
                tags: all_tags.iter().map(|t| (effective_at, t.clone())).collect(),
                content: wal_content,
            };

            self.append_all(&record, &chunk_records)?;
            let updated = self.apply_and_index(&record, &chunk_records, effective_at.as_nanos())?;
            self.cache.invalidate(id);
            self.note_write(1 + chunk_records.len() as u64);
            self.maybe_checkpoint();
            Ok(updated)
        })
    }

    pub fn delete(&self, id: &EntityId, at: Timestamp) -> Result<()> {
        self.coordinator.with_writer(|| {
            let last_observed = {
                let entities = self.entities.read();
                let existing = entities.get(id).ok_or_else(|| Error::NotFound(id.clone()))?;
                existing.updated_at()
            };
            let effective_at = at.monotonic(last_observed);
            let record = delete_record(id.clone(), effective_at);

            self.append_all(&record, &[])?;
            self.apply_and_index(&record, &[], effective_at.as_nanos())?;
            self.cache.invalidate(id);
            self.note_write(1);
            self.maybe_checkpoint();
            Ok(())
        })
    }

    fn plan_chunk_records(
        &self,
        parent_id: &EntityId,
        content: &[u8],
        at: Timestamp,
        all_tags: &mut Vec<Tag>,
        chunk_records: &mut Vec<WalRecord>,
    ) {
        let plan = plan_chunks(content, self.chunk_size_bytes as usize);
        for slice in &plan.slices {
            let chunk_id = EntityId::generate();
            let chunk = chunk_entity(chunk_id.clone(), parent_id, slice, at);
            chunk_records.push(WalRecord {
                op: WalOp::ChunkWrite,
                timestamp: at,
                entity_id: chunk_id,
                tags: chunk.tags().iter().map(|r| (r.timestamp, r.tag.clone())).collect(),
                content: Some(chunk.content().to_vec()),
            });
        }
        all_tags.extend(plan.parent_tags);
        all_tags.push(content_written_tag(at));
    }

    fn append_all(&self, record: &WalRecord, chunk_records: &[WalRecord]) -> Result<()> {
        let wal = self.wal.lock();
        wal.append(&self.container, record)?;
        for cr in chunk_records {
            wal.append(&self.container, cr)?;
        }
        Ok(())
    }

    fn apply_and_index(&self, record: &WalRecord, chunk_records: &[WalRecord], mtime_ns: i64) -> Result<Entity> {
        let mut entities = self.entities.write();
        entitydb_durability::apply(&mut entities, record);
        for cr in chunk_records {
            entitydb_durability::apply(&mut entities, cr);
        }
        let parent = entities
            .get(&record.entity_id)
            .cloned()
            .expect("record was just applied to this table");

        let mut index = self.index.write();
        index.index_entity(&parent);
        for cr in chunk_records {
            if let Some(child) = entities.get(&cr.entity_id) {
                index.index_entity(child);
            }
        }
        drop(index);
        drop(entities);

        self.entity_mtime_ns.fetch_max(mtime_ns, Ordering::AcqRel);
        Ok(parent)
    }

    fn note_write(&self, n: u64) {
        self.pending_records.fetch_add(n, Ordering::Relaxed);
    }

    fn maybe_checkpoint(&self) {
        let bytes_over = self.wal.lock().pending_bytes() >= self.wal_checkpoint_bytes;
        let records_over = self.pending_records.load(Ordering::Relaxed) >= self.wal_checkpoint_records;
        if bytes_over || records_over {
            self.checkpoint_locked();
        }
    }

    /// Force a checkpoint outside the normal size/record thresholds.
    pub fn checkpoint(&self) {
        self.coordinator.with_writer(|| self.checkpoint_locked());
    }

    fn checkpoint_locked(&self) {
        let now_ns = Timestamp::now().as_nanos();
        let cfg = entitydb_durability::CheckpointConfig {
            string_table_max_entries: self.string_table_max_entries,
            string_table_max_bytes: self.string_table_max_bytes,
        };
        let entities = self.entities.read();
        let mut wal = self.wal.lock();
        match entitydb_durability::checkpoint(&self.container, &mut wal, &entities, cfg, now_ns) {
            Ok(_header) => {
                let rebuilt = IndexSection::rebuild(
                    entities.values(),
                    self.string_table_max_entries,
                    self.string_table_max_bytes,
                    now_ns,
                );
                drop(entities);
                drop(wal);
                *self.index.write() = rebuilt;
                self.pending_records.store(0, Ordering::Relaxed);
                self.coordinator.record_checkpoint();
            }
            Err(err) => {
                warn!(error = %err, "checkpoint failed, WAL retained for retry");
            }
        }
    }

    // ---- reads --------------------------------------------------------

    pub fn get_by_id(&self, id: &EntityId, options: &GetOptions) -> Result<EntityView> {
        if let Some(cached) = self.cache.get(id) {
            return self.build_view(&cached, options);
        }
        let entities = self.entities.read();
        let entity = entities.get(id).ok_or_else(|| Error::NotFound(id.clone()))?;
        let view = self.build_view(entity, options)?;
        let clone = entity.clone();
        drop(entities);
        self.cache.put(clone);
        Ok(view)
    }

    fn build_view(&self, entity: &Entity, options: &GetOptions) -> Result<EntityView> {
        let tags = if options.include_timestamps {
            TagView::Timestamped(entity.tags().iter().map(|r| (r.timestamp, r.tag.clone())).collect())
        } else {
            TagView::Latest(
                entity
                    .tags_as_of(Timestamp::now())
                    .into_iter()
                    .map(|(ns, tag)| (ns.to_string(), tag.value().to_string()))
                    .collect(),
            )
        };
        let content = if options.include_content {
            if options.include_chunks {
                self.reassemble_content(entity)?
            } else {
                entity.content().to_vec()
            }
        } else {
            Vec::new()
        };
        Ok(EntityView { id: entity.id().clone(), tags, content })
    }

    fn reassemble_content(&self, entity: &Entity) -> Result<Vec<u8>> {
        let Some((_, value)) = latest_tag_value(entity, CONTENT_WRITTEN_NAMESPACE, "chunks:") else {
            return Ok(entity.content().to_vec());
        };
        let count: usize = value.trim_start_matches("chunks:").parse().unwrap_or(0);
        if count == 0 {
            return Ok(entity.content().to_vec());
        }
        let sha256 = latest_tag_value(entity, CONTENT_WRITTEN_NAMESPACE, "sha256:")
            .map(|(_, v)| v.trim_start_matches("sha256:").to_string())
            .unwrap_or_default();

        let parent_tag = format!("parent:{}", entity.id());
        let child_ids = self.index.read().tag_index.lookup_exact(&parent_tag);
        let entities = self.entities.read();

        let mut ordered: Vec<(usize, &[u8])> = Vec::new();
        for child_id in &child_ids {
            if let Some(child) = entities.get(child_id) {
                if let Some((_, idx_value)) = latest_tag_value(child, "chunk", "index:") {
                    if let Ok(idx) = idx_value.trim_start_matches("index:").parse::<usize>() {
                        if idx < count {
                            ordered.push((idx, child.content()));
                        }
                    }
                }
            }
        }
        ordered.sort_by_key(|(idx, _)| *idx);
        if ordered.len() != count {
            return Err(Error::Corrupted(format!(
                "expected {count} chunks for {}, found {}",
                entity.id(),
                ordered.len()
            )));
        }
        chunk::reassemble(ordered.into_iter().map(|(_, bytes)| bytes), &sha256)
            .map_err(|e| Error::Corrupted(e.to_string()))
    }

    /// Stream an entity's content chunk by chunk via `sink`, without
    /// materializing the whole thing in memory at once.
    pub fn stream_content(
        &self,
        id: &EntityId,
        mut sink: impl FnMut(&[u8]) -> std::io::Result<()>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let count = {
            let entities = self.entities.read();
            let entity = entities.get(id).ok_or_else(|| Error::NotFound(id.clone()))?;
            match latest_tag_value(entity, CONTENT_WRITTEN_NAMESPACE, "chunks:") {
                None => {
                    sink(entity.content()).map_err(Error::Io)?;
                    return Ok(());
                }
                Some((_, value)) => value.trim_start_matches("chunks:").parse::<usize>().unwrap_or(0),
            }
        };

        let parent_tag = format!("parent:{id}");
        let child_ids = self.index.read().tag_index.lookup_exact(&parent_tag);
        let entities = self.entities.read();
        let mut ordered: Vec<(usize, EntityId)> = Vec::new();
        for child_id in &child_ids {
            if let Some(child) = entities.get(child_id) {
                if let Some((_, idx_value)) = latest_tag_value(child, "chunk", "index:") {
                    if let Ok(idx) = idx_value.trim_start_matches("index:").parse::<usize>() {
                        if idx < count {
                            ordered.push((idx, child_id.clone()));
                        }
                    }
                }
            }
        }
        ordered.sort_by_key(|(idx, _)| *idx);

        for (_, child_id) in ordered {
            cancel.check()?;
            if let Some(child) = entities.get(&child_id) {
                sink(child.content()).map_err(Error::Io)?;
            }
        }
        Ok(())
    }

    pub fn list_by_tag(&self, query: &TagQuery, include_deleted: bool) -> Vec<Entity> {
        let ids = {
            let index = self.index.read();
            match query {
                TagQuery::Exact(tag) => {
                    if !index.bloom.might_contain(tag.as_str()) {
                        Vec::new()
                    } else {
                        index.tag_index.lookup_exact(tag.as_str())
                    }
                }
                TagQuery::Prefix(namespace) => index.tag_index.lookup_prefix(namespace),
            }
        };
        let entities = self.entities.read();
        ids.iter()
            .filter_map(|id| entities.get(id).cloned())
            .filter(|e| include_deleted || !is_deleted(e))
            .collect()
    }

    pub fn query(&self, filter: &Filter, sort: Option<Sort>, limit: usize, offset: usize, include_deleted: bool) -> Vec<Entity> {
        let entities = self.entities.read();
        let visible: Vec<&Entity> = entities.values().filter(|e| include_deleted || !is_deleted(e)).collect();
        query::run_query(visible.into_iter(), filter, sort, offset, limit)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn get_as_of(&self, id: &EntityId, at: Timestamp) -> Result<BTreeMap<String, String>> {
        let entities = self.entities.read();
        let entity = entities.get(id).ok_or_else(|| Error::NotFound(id.clone()))?;
        if !entity.existed_at(at) {
            return Err(Error::NotFound(id.clone()));
        }
        Ok(entity
            .tags_as_of(at)
            .into_iter()
            .map(|(ns, tag)| (ns.to_string(), tag.value().to_string()))
            .collect())
    }

    pub fn get_history(&self, id: &EntityId, from: Timestamp, to: Timestamp) -> Result<Vec<HistoryEntry>> {
        let entities = self.entities.read();
        let entity = entities.get(id).ok_or_else(|| Error::NotFound(id.clone()))?;
        Ok(history::get_history(entity, from, to))
    }

    pub fn get_changes(&self, since: Timestamp) -> Vec<EntityId> {
        let entities = self.entities.read();
        entities
            .values()
            .filter(|e| e.tags().iter().any(|t| t.timestamp > since))
            .map(|e| e.id().clone())
            .collect()
    }

    pub fn get_diff(&self, id: &EntityId, t1: Timestamp, t2: Timestamp) -> Result<DiffResult> {
        let entities = self.entities.read();
        let entity = entities.get(id).ok_or_else(|| Error::NotFound(id.clone()))?;
        Ok(history::get_diff(entity, t1, t2))
    }
}

fn content_written_tag(at: Timestamp) -> Tag {
    Tag::from_parts(CONTENT_WRITTEN_NAMESPACE, &format!("{CONTENT_WRITTEN_PREFIX}{}", at.as_nanos()))
}

fn latest_tag_value<'a>(entity: &'a Entity, namespace: &str, value_prefix: &str) -> Option<(Timestamp, &'a str)> {
    entity
        .tags()
        .iter()
        .filter(|r| r.tag.namespace() == namespace && r.tag.value().starts_with(value_prefix))
        .max_by_key(|r| r.timestamp)
        .map(|r| (r.timestamp, r.tag.value()))
}

fn is_deleted(entity: &Entity) -> bool {
    entity
        .tags_as_of(Timestamp::now())
        .get("status")
        .map(|t| t.value() == "deleted")
        .unwrap_or(false)
}
