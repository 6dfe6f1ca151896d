//! Core trait for the transactional store seam
//!
//! Sessions never see a concrete store. They drive a `TransactionalStore`
//! handed to them at construction, so tests can inject in-memory or
//! fault-injecting stores in place of a real database.

use std::sync::Arc;

use crate::error::StoreResult;
use crate::types::{ResourceId, TxHandle};

/// Transactional store with row-level exclusive locking
///
/// The store owns lock management and contention detection. Callers only
/// open transactions, request locks, and terminate transactions.
///
/// Thread safety: all methods must be safe to call concurrently from
/// multiple threads (requires Send + Sync).
pub trait TransactionalStore: Send + Sync {
    /// Open a new transaction
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Connection` if the store cannot be reached.
    fn begin(&self) -> StoreResult<TxHandle>;

    /// Write `value` to `resource`, taking an exclusive lock on it
    ///
    /// Blocks until the store grants or rejects the lock.
    ///
    /// # Errors
    ///
    /// - `StoreError::Conflict` if the store detected a deadlock or the wait
    ///   exceeded its bound
    /// - `StoreError::Query` for any other failure
    fn lock(&self, tx: &TxHandle, resource: &ResourceId, value: &str) -> StoreResult<()>;

    /// Commit the transaction, publishing its writes and releasing its locks
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Commit` if the commit is rejected.
    fn commit(&self, tx: &TxHandle) -> StoreResult<()>;

    /// Roll back the transaction, discarding its writes and releasing its locks
    ///
    /// Must be safe to call after any failure and idempotent: rolling back a
    /// transaction that is already finished is not an error.
    fn rollback(&self, tx: &TxHandle) -> StoreResult<()>;
}

impl<S: TransactionalStore + ?Sized> TransactionalStore for Arc<S> {
    fn begin(&self) -> StoreResult<TxHandle> {
        (**self).begin()
    }

    fn lock(&self, tx: &TxHandle, resource: &ResourceId, value: &str) -> StoreResult<()> {
        (**self).lock(tx, resource, value)
    }

    fn commit(&self, tx: &TxHandle) -> StoreResult<()> {
        (**self).commit(tx)
    }

    fn rollback(&self, tx: &TxHandle) -> StoreResult<()> {
        (**self).rollback(tx)
    }
}
