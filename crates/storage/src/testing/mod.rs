//! Testing utilities for driving sessions into failure paths
//!
//! - **FaultyStore**: wraps a store and injects one-shot errors into
//!   `begin`, the n-th `lock`, or `commit`
//!
//! # Example
//!
//! ```ignore
//! use lockprobe_storage::testing::{FaultPoint, FaultyStore};
//! use lockprobe_storage::LockTableStore;
//!
//! let store = FaultyStore::new(LockTableStore::new())
//!     .inject(FaultPoint::Begin, StoreError::connection("refused"));
//! ```

mod faulty;

pub use faulty::{Fault, FaultPoint, FaultyStore};
