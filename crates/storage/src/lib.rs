//! Storage layer for lockprobe
//!
//! This crate implements the transactional store the harness drives:
//! - LockTableStore: in-memory rows with exclusive row locks, waits-for
//!   deadlock detection, and a bounded lock wait
//! - StoreStats: begin/commit/rollback/deadlock/timeout counters
//! - testing: fault-injecting store wrapper for failure-path tests

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod lock_table;
pub mod testing;

pub use lock_table::{LockTableStore, StoreStats, DEFAULT_LOCK_TIMEOUT};
