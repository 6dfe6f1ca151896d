//! Core types and traits for lockprobe
//!
//! This crate defines the foundational types used throughout the system:
//! - ResourceId: Name of a lockable row in the store
//! - LockOrder: Duplicate-free acquisition order for one session
//! - SessionId / TxHandle: Session and transaction identifiers
//! - StoreError / HarnessError: Error type hierarchy
//! - TransactionalStore: The narrow store seam sessions drive
//! - ScenarioConfig: TOML scenario configuration and validation

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{
    parse_lock_orders, validate_scenario, RetryPolicy, ScenarioConfig, StoreConfig,
    CONFIG_FILE_NAME, MIN_SESSIONS,
};
pub use error::{
    Conflict, ConflictKind, HarnessError, HarnessResult, StoreError, StoreResult,
};
pub use traits::TransactionalStore;
pub use types::{LockOrder, LockOrderError, ResourceId, SessionId, TxHandle};
