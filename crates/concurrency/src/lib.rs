//! Concurrency coordination for EntityDB: single-writer
//! serialization, cooperative cancellation/deadlines, process memory-pressure
//! sampling, and the optional per-client request throttle.
//!
//! This crate knows nothing about the on-disk format (`entitydb-storage`) or
//! checkpoint/recovery sequencing (`entitydb-durability`) — it only
//! provides the coordination primitives those layers and
//! `entitydb-engine`'s repository compose together.

pub mod cancellation;
pub mod memory_monitor;
pub mod throttle;
pub mod writer;

pub use cancellation::{CancellationToken, Deadline};
pub use memory_monitor::{MemoryMonitor, MemoryThresholds, PressureLevel};
pub use throttle::{RequestThrottle, ThrottleConfig, ThrottleDecision};
pub use writer::WriteCoordinator;
