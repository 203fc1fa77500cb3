//! # EntityDB
//!
//! A temporal, tag-based entity database backed by a single unified file:
//! container, write-ahead log, tag and temporal indexes, content chunking,
//! and crash recovery all live in one `.edb` file per database.
//!
//! # Quick start
//!
//! ```no_run
//! use entitydb::{EntityDb, EntityDbConfig};
//! use entitydb_core::{Tag, Timestamp};
//!
//! fn main() -> entitydb_core::Result<()> {
//!     let config = EntityDbConfig::builder("./my-data.edb").build().unwrap();
//!     let mut db = EntityDb::open(config)?;
//!     db.start_background_workers();
//!
//!     let repo = db.repository();
//!     let entity = repo.create(None, vec![Tag::parse("type:doc").unwrap()], b"hello".to_vec(), Timestamp::now())?;
//!     println!("created {}", entity.id());
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! [`EntityDb`] is the entry point: it owns recovery on open, the
//! background reindex and retention workers, and a handle to the
//! [`entitydb_engine::EntityRepository`] that every `Create`/`Update`/
//! `Query`/etc. call goes through. The on-disk format, WAL, and indexes
//! live in `entitydb-storage`; checkpointing and crash recovery in
//! `entitydb-durability`; single-writer serialization and memory-pressure
//! sampling in `entitydb-concurrency`. Only this crate's surface is meant
//! to be depended on directly.

pub use entitydb_core::{Entity, EntityId, Error, Limits, Result, Tag, TagError, TagRecord, Timestamp};
pub use entitydb_engine::{
    config::ConfigError,
    history::{DiffResult, HistoryEntry, HistoryEvent},
    query::{Filter, Predicate, Sort, SortDirection, SortKey},
    repository::{EntityView, GetOptions, TagQuery, TagView},
    EntityDb, EntityDbConfig, EntityDbConfigBuilder, EntityRepository,
};
pub use entitydb_storage::RetentionPolicy;
