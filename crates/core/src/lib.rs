//! Core types shared across the EntityDB workspace.
//!
//! This crate defines the vocabulary every other crate builds on:
//! - [`EntityId`]: the opaque identifier for an entity.
//! - [`Timestamp`]: nanosecond-resolution wall-clock time, the unit tags are
//!   ordered by.
//! - [`Tag`]: a `namespace:value` string, the atomic unit of state.
//! - [`Entity`]: an id, an ordered tag log, and an optional content blob.
//! - [`Error`] / [`Result`]: the error taxonomy every public operation returns.
//!
//! Nothing in this crate touches disk. It is pure data modeling so that
//! `entitydb-storage`, `entitydb-durability`, `entitydb-concurrency`, and
//! `entitydb-engine` share one definition of what an entity *is*.

pub mod entity;
pub mod error;
pub mod id;
pub mod limits;
pub mod tag;
pub mod timestamp;

pub use entity::{Entity, TagRecord};
pub use error::{Error, Result};
pub use id::EntityId;
pub use limits::Limits;
pub use tag::{Tag, TagError};
pub use timestamp::Timestamp;
