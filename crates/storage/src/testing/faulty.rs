//! Fault-injecting store wrapper
//!
//! Wraps any `TransactionalStore` and fails selected operations once, so the
//! failure paths of a session (connection loss, query error, rejected commit)
//! can be exercised against an otherwise healthy store.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use lockprobe_core::{ResourceId, StoreError, StoreResult, TransactionalStore, TxHandle};

/// Operation a fault is injected into
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultPoint {
    /// Fail the next `begin`
    Begin,
    /// Fail the n-th `lock` call (1-based, counted across all transactions)
    Lock(usize),
    /// Fail the next `commit`
    Commit,
}

/// A one-shot fault: where it fires and what it returns
#[derive(Debug, Clone)]
pub struct Fault {
    /// Where the fault fires
    pub point: FaultPoint,
    /// Error returned instead of calling the inner store
    pub error: StoreError,
}

/// Store wrapper that injects one-shot faults
///
/// Every call that does not hit an armed fault is forwarded to the inner
/// store. Rollbacks are always forwarded and counted, so tests can check
/// that a failed session still released its transaction.
#[derive(Debug)]
pub struct FaultyStore<S> {
    inner: S,
    faults: Mutex<Vec<Fault>>,
    lock_calls: AtomicUsize,
    rollbacks: AtomicUsize,
}

impl<S: TransactionalStore> FaultyStore<S> {
    /// Wrap a store with no faults armed
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            faults: Mutex::new(Vec::new()),
            lock_calls: AtomicUsize::new(0),
            rollbacks: AtomicUsize::new(0),
        }
    }

    /// Arm a one-shot fault
    pub fn inject(self, point: FaultPoint, error: StoreError) -> Self {
        self.faults.lock().push(Fault { point, error });
        self
    }

    /// The wrapped store
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of rollbacks forwarded to the inner store
    pub fn rollback_count(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    /// Take the first armed fault matching `point`
    fn take(&self, point: &FaultPoint) -> Option<StoreError> {
        let mut faults = self.faults.lock();
        let index = faults.iter().position(|f| &f.point == point)?;
        Some(faults.remove(index).error)
    }
}

impl<S: TransactionalStore> TransactionalStore for FaultyStore<S> {
    fn begin(&self) -> StoreResult<TxHandle> {
        if let Some(error) = self.take(&FaultPoint::Begin) {
            return Err(error);
        }
        self.inner.begin()
    }

    fn lock(&self, tx: &TxHandle, resource: &ResourceId, value: &str) -> StoreResult<()> {
        let call = self.lock_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(error) = self.take(&FaultPoint::Lock(call)) {
            return Err(error);
        }
        self.inner.lock(tx, resource, value)
    }

    fn commit(&self, tx: &TxHandle) -> StoreResult<()> {
        if let Some(error) = self.take(&FaultPoint::Commit) {
            return Err(error);
        }
        self.inner.commit(tx)
    }

    fn rollback(&self, tx: &TxHandle) -> StoreResult<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.inner.rollback(tx)
    }
}
