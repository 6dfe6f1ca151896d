//! lockprobe - provoke and observe lock conflicts between concurrent transactions
//!
//! lockprobe runs several transactional sessions against a shared store at
//! the same time, each acquiring row locks in its own order, and reports
//! which sessions committed and which were aborted by a store-signaled
//! conflict (deadlock or lock-wait timeout).
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use lockprobe::{ConflictOrchestrator, LockTableStore, ScenarioConfig};
//!
//! let config = ScenarioConfig::canonical(Duration::from_millis(500));
//! let store = Arc::new(LockTableStore::new().seeded(&config.resources, "initial"));
//! let orchestrator = ConflictOrchestrator::from_config(store, &config);
//!
//! let result = orchestrator.run_scenario(&config.resources, &config.sessions)?;
//! assert!(result.conflict_observed);
//! # Ok::<(), lockprobe::HarnessError>(())
//! ```
//!
//! # Architecture
//!
//! - `lockprobe-core`: identifiers, errors, the `TransactionalStore` seam, config
//! - `lockprobe-storage`: the in-memory lock table store
//! - `lockprobe-concurrency`: sessions, pacing, orchestrator, reporter

pub use lockprobe_concurrency::*;
pub use lockprobe_core::*;
pub use lockprobe_storage::{LockTableStore, StoreStats, DEFAULT_LOCK_TIMEOUT};

/// Fault-injecting store wrapper for failure-path tests
pub use lockprobe_storage::testing;
