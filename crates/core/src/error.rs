//! Error types for lockprobe
//!
//! This module defines the two error families used throughout the system:
//! - `StoreError`: failures reported by a transactional store to a session
//! - `HarnessError`: failures raised before any session is launched
//!
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use crate::types::{LockOrderError, ResourceId, TxHandle};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for harness setup operations
pub type HarnessResult<T> = std::result::Result<T, HarnessError>;

/// Kind of contention signal raised by a store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConflictKind {
    /// The store found a cycle in its waits-for graph and chose this
    /// transaction as the victim
    Deadlock {
        /// Transactions forming the cycle, starting with the victim
        cycle: Vec<u64>,
    },
    /// The lock was not granted within the store's lock-wait bound
    LockTimeout {
        /// How long the request waited, in milliseconds
        waited_ms: u64,
    },
}

/// A store-signaled conflict on a specific resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{kind} on resource '{resource}'")]
pub struct Conflict {
    /// Resource whose lock request was rejected
    pub resource: ResourceId,
    /// What the store detected
    #[serde(flatten)]
    pub kind: ConflictKind,
}

impl Conflict {
    /// Deadlock detected while requesting `resource`
    pub fn deadlock(resource: ResourceId, cycle: Vec<u64>) -> Self {
        Self {
            resource,
            kind: ConflictKind::Deadlock { cycle },
        }
    }

    /// Lock wait on `resource` exceeded the store's bound
    pub fn lock_timeout(resource: ResourceId, waited_ms: u64) -> Self {
        Self {
            resource,
            kind: ConflictKind::LockTimeout { waited_ms },
        }
    }

    /// True if this conflict is a detected deadlock
    pub fn is_deadlock(&self) -> bool {
        matches!(self.kind, ConflictKind::Deadlock { .. })
    }
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictKind::Deadlock { cycle } => {
                write!(f, "deadlock detected (cycle of {} transactions)", cycle.len())
            }
            ConflictKind::LockTimeout { waited_ms } => {
                write!(f, "lock wait timeout after {}ms", waited_ms)
            }
        }
    }
}

/// Errors a transactional store reports to a session
///
/// Taxonomy:
/// - `Connection`: store unreachable; fatal to the session, never retried
/// - `Conflict`: contention or deadlock; expected, retryable by policy
/// - `Query` / `Commit`: unexpected store-side failure; surfaced, not retried
/// - `Internal`: the session itself crashed; surfaced, not retried
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum StoreError {
    /// Cannot open a transaction against the store
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the failure
        message: String,
    },

    /// Store-detected contention (deadlock victim or lock wait timeout)
    #[error("Conflict: {0}")]
    Conflict(Conflict),

    /// A modify operation failed for a reason other than contention
    #[error("Query error on '{resource}': {message}")]
    Query {
        /// Resource the operation targeted
        resource: ResourceId,
        /// Description of the failure
        message: String,
    },

    /// Commit was rejected
    #[error("Commit error for {tx}: {message}")]
    Commit {
        /// Transaction that failed to commit
        tx: TxHandle,
        /// Description of the failure
        message: String,
    },

    /// The session crashed before producing an outcome
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the failure
        message: String,
    },
}

impl StoreError {
    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        StoreError::Connection {
            message: message.into(),
        }
    }

    /// Create a query error on a resource
    pub fn query(resource: ResourceId, message: impl Into<String>) -> Self {
        StoreError::Query {
            resource,
            message: message.into(),
        }
    }

    /// Create a commit error for a transaction
    pub fn commit(tx: TxHandle, message: impl Into<String>) -> Self {
        StoreError::Commit {
            tx,
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        StoreError::Internal {
            message: message.into(),
        }
    }

    /// True if the store signaled contention
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    /// The conflict payload, if this is a conflict
    pub fn as_conflict(&self) -> Option<&Conflict> {
        match self {
            StoreError::Conflict(conflict) => Some(conflict),
            _ => None,
        }
    }
}

impl From<Conflict> for StoreError {
    fn from(conflict: Conflict) -> Self {
        StoreError::Conflict(conflict)
    }
}

/// Errors raised while preparing a scenario, before any session starts
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Scenario shape is invalid (too few sessions, undeclared resource, ...)
    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),

    /// A lock order violates its invariants
    #[error("Invalid lock order for session {session}: {source}")]
    InvalidLockOrder {
        /// Zero-based index of the offending session
        session: usize,
        /// The violated invariant
        #[source]
        source: LockOrderError,
    },

    /// Reading or writing a configuration file failed
    #[error("I/O error on '{path}': {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Configuration file could not be parsed
    #[error("Failed to parse config '{path}': {message}")]
    Parse {
        /// File involved
        path: PathBuf,
        /// Parser message
        message: String,
    },
}

impl HarnessError {
    /// Create an invalid-scenario error
    pub fn invalid_scenario(message: impl Into<String>) -> Self {
        HarnessError::InvalidScenario(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_display_deadlock() {
        let err = StoreError::from(Conflict::deadlock(ResourceId::new("R2"), vec![2, 1]));
        let msg = err.to_string();
        assert!(msg.contains("Conflict"));
        assert!(msg.contains("deadlock"));
        assert!(msg.contains("R2"));
    }

    #[test]
    fn test_conflict_display_timeout() {
        let err = StoreError::from(Conflict::lock_timeout(ResourceId::new("R1"), 250));
        let msg = err.to_string();
        assert!(msg.contains("timeout"));
        assert!(msg.contains("250"));
    }

    #[test]
    fn test_only_conflicts_are_conflicts() {
        let conflict = StoreError::from(Conflict::deadlock(ResourceId::new("R1"), vec![1, 2]));
        assert!(conflict.is_conflict());
        assert!(conflict.as_conflict().is_some());

        let others = [
            StoreError::connection("refused"),
            StoreError::query(ResourceId::new("R1"), "no such row"),
            StoreError::commit(TxHandle::new(7), "already finished"),
            StoreError::internal("panicked"),
        ];
        for err in others {
            assert!(!err.is_conflict(), "{err} should not be a conflict");
            assert!(err.as_conflict().is_none());
        }
    }

    #[test]
    fn test_conflict_serializes_with_kind_tag() {
        let err = StoreError::from(Conflict::deadlock(ResourceId::new("R1"), vec![3, 4]));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error"], "conflict");
    }

    #[test]
    fn test_harness_error_display() {
        let err = HarnessError::invalid_scenario("need at least 2 sessions");
        assert!(err.to_string().contains("need at least 2 sessions"));

        let err = HarnessError::InvalidLockOrder {
            session: 1,
            source: LockOrderError::Empty,
        };
        assert!(err.to_string().contains("session 1"));
    }
}
