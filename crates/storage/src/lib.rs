//! On-disk storage primitives for EntityDB: the unified file container, the
//! entity wire codec, the write-ahead log, the tag/temporal indexes, content
//! chunking, and retention policy types.
//!
//! This crate knows how bytes are laid out on disk. It does not know about
//! concurrency coordination (`entitydb-concurrency`), checkpointing or crash
//! recovery (`entitydb-durability`), or the public repository API
//! (`entitydb-engine`) — those layers are built on top of what's here.

pub mod chunk;
pub mod codec;
pub mod container;
pub mod index;
pub mod retention;
pub mod wal;

pub use chunk::{chunk_entity, plan_chunks, reassemble, ChunkIntegrityError, ChunkPlan, ChunkSlice};
pub use codec::{decode_entity, encode_entity, CodecError, StringTable};
pub use container::{FileContainer, Header, HeaderError, MmapView, FORMAT_VERSION, HEADER_SIZE, MAGIC};
pub use index::{BloomFilter, IndexSection, TagIndex, TemporalIndex};
pub use retention::RetentionPolicy;
