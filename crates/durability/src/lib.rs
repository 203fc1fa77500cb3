//! Checkpointing and crash recovery for EntityDB.
//!
//! This crate sits between `entitydb-storage` (which knows the on-disk byte
//! layout but nothing about sequencing) and `entitydb-engine` (which owns
//! the public API and decides *when* to checkpoint or recover). It provides
//! the two operations that must agree with each other bit-for-bit: folding
//! the WAL into the entity section, and reconstructing the entity table from
//! whatever a crash left behind.

pub mod apply;
pub mod checkpoint;
pub mod recovery;

pub use apply::apply;
pub use checkpoint::{checkpoint, CheckpointConfig};
pub use recovery::{recover, QuarantinedRecord, RecoveryReport};
