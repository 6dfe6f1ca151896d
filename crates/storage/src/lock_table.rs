//! LockTableStore: in-memory row store with exclusive row locks
//!
//! This module implements the TransactionalStore trait using:
//! - `BTreeMap<ResourceId, Row>` for the committed row values and lock owners
//! - `parking_lot::Mutex` + `Condvar` so blocked lock requests sleep until a
//!   release wakes them
//! - A waits-for map (one outgoing edge per waiting transaction) for
//!   deadlock detection
//! - `AtomicU64` counters for transaction ids and observational metrics
//!
//! # Design Notes
//!
//! - **Requester is the victim**: the lock request that closes a cycle in the
//!   waits-for graph is rejected with a deadlock conflict. Every other member
//!   of the cycle keeps waiting and is granted once the victim rolls back.
//! - **Bounded waits**: a request that is neither granted nor part of a cycle
//!   within `lock_timeout` is rejected with a lock-timeout conflict.
//! - **Buffered writes**: a locked row's new value is held by its transaction
//!   and only becomes visible to `read` on commit.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tracing::{debug, trace, warn};

use lockprobe_core::{
    Conflict, ResourceId, StoreConfig, StoreError, StoreResult, TransactionalStore, TxHandle,
};

/// Default upper bound on a single lock wait
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// A committed row and its current lock owner
#[derive(Debug)]
struct Row {
    value: String,
    owner: Option<u64>,
}

/// Per-transaction state for an active transaction
#[derive(Debug, Default)]
struct TxState {
    /// Rows this transaction holds locks on, in acquisition order
    held: Vec<ResourceId>,
    /// Buffered values, applied on commit
    pending: HashMap<ResourceId, String>,
}

/// Everything guarded by the store mutex
#[derive(Debug, Default)]
struct LockTable {
    rows: BTreeMap<ResourceId, Row>,
    active: HashMap<u64, TxState>,
    /// Waiting transaction → transaction holding the row it wants
    waits_for: HashMap<u64, u64>,
}

impl LockTable {
    /// Follow waits-for edges from `start`; returns the cycle if one leads back
    ///
    /// Each transaction waits on at most one row, so the graph is a set of
    /// chains and a walk from `start` either ends or revisits a node.
    fn find_cycle(&self, start: u64) -> Option<Vec<u64>> {
        let mut path = vec![start];
        let mut visited = HashSet::from([start]);
        let mut current = start;

        while let Some(&next) = self.waits_for.get(&current) {
            if next == start {
                return Some(path);
            }
            if !visited.insert(next) {
                return None;
            }
            path.push(next);
            current = next;
        }
        None
    }

    /// Release every lock held by a finished transaction
    fn release(&mut self, tx: u64, state: &TxState) {
        for resource in &state.held {
            if let Some(row) = self.rows.get_mut(resource) {
                if row.owner == Some(tx) {
                    row.owner = None;
                }
            }
        }
        self.waits_for.remove(&tx);
    }
}

/// Counters describing store activity
///
/// Purely observational; read with Relaxed ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Transactions opened
    pub begun: u64,
    /// Transactions committed
    pub committed: u64,
    /// Transactions rolled back (first rollback only)
    pub rolled_back: u64,
    /// Lock requests rejected as deadlock victims
    pub deadlocks: u64,
    /// Lock requests rejected after the wait bound
    pub lock_timeouts: u64,
}

/// In-memory transactional row store with deadlock detection
///
/// Thread-safe through `parking_lot::Mutex` and `AtomicU64`. All lock waits
/// park on a single condition variable that is notified on every commit and
/// rollback.
#[derive(Debug)]
pub struct LockTableStore {
    table: Mutex<LockTable>,
    released: Condvar,
    next_tx: AtomicU64,
    lock_timeout: Duration,
    offline: AtomicBool,
    begun: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
    deadlocks: AtomicU64,
    lock_timeouts: AtomicU64,
}

impl Default for LockTableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LockTableStore {
    /// Create an empty store with the default lock-wait bound
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Create an empty store with a specific lock-wait bound
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            table: Mutex::new(LockTable::default()),
            released: Condvar::new(),
            next_tx: AtomicU64::new(1),
            lock_timeout,
            offline: AtomicBool::new(false),
            begun: AtomicU64::new(0),
            committed: AtomicU64::new(0),
            rolled_back: AtomicU64::new(0),
            deadlocks: AtomicU64::new(0),
            lock_timeouts: AtomicU64::new(0),
        }
    }

    /// Create an empty store from scenario store settings
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::with_lock_timeout(config.lock_timeout())
    }

    /// Seed one row per resource, each holding `initial` as committed value
    pub fn seeded<'a, I>(self, resources: I, initial: &str) -> Self
    where
        I: IntoIterator<Item = &'a ResourceId>,
    {
        for resource in resources {
            self.insert_row(resource.clone(), initial);
        }
        self
    }

    /// Insert or overwrite a committed row outside any transaction
    ///
    /// Does not touch the row's lock owner.
    pub fn insert_row(&self, resource: ResourceId, value: impl Into<String>) {
        let value = value.into();
        let mut table = self.table.lock();
        table
            .rows
            .entry(resource)
            .and_modify(|row| row.value = value.clone())
            .or_insert(Row { value, owner: None });
    }

    /// Committed value of a row, or None if the row does not exist
    pub fn read(&self, resource: &ResourceId) -> Option<String> {
        self.table.lock().rows.get(resource).map(|row| row.value.clone())
    }

    /// Transaction currently holding the lock on a row
    pub fn holder(&self, resource: &ResourceId) -> Option<TxHandle> {
        self.table
            .lock()
            .rows
            .get(resource)
            .and_then(|row| row.owner)
            .map(TxHandle::new)
    }

    /// Number of transactions currently blocked on a lock
    pub fn waiting_count(&self) -> usize {
        self.table.lock().waits_for.len()
    }

    /// Number of open transactions
    pub fn active_count(&self) -> usize {
        self.table.lock().active.len()
    }

    /// Upper bound on a single lock wait
    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Simulate losing (or regaining) the connection to the store
    ///
    /// While offline, `begin` fails with a connection error. Transactions
    /// already open are unaffected.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Snapshot of the activity counters
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            begun: self.begun.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            rolled_back: self.rolled_back.load(Ordering::Relaxed),
            deadlocks: self.deadlocks.load(Ordering::Relaxed),
            lock_timeouts: self.lock_timeouts.load(Ordering::Relaxed),
        }
    }
}

impl TransactionalStore for LockTableStore {
    fn begin(&self) -> StoreResult<TxHandle> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::connection("store is offline"));
        }

        let id = self.next_tx.fetch_add(1, Ordering::SeqCst);
        self.table.lock().active.insert(id, TxState::default());
        self.begun.fetch_add(1, Ordering::Relaxed);

        debug!(target: "lockprobe::store", tx = id, "Transaction started");
        Ok(TxHandle::new(id))
    }

    fn lock(&self, tx: &TxHandle, resource: &ResourceId, value: &str) -> StoreResult<()> {
        let id = tx.id();
        let started = Instant::now();
        let deadline = started + self.lock_timeout;
        let mut table = self.table.lock();

        loop {
            if !table.active.contains_key(&id) {
                table.waits_for.remove(&id);
                return Err(StoreError::query(
                    resource.clone(),
                    format!("{} is not active", tx),
                ));
            }

            let owner = match table.rows.get(resource) {
                Some(row) => row.owner,
                None => {
                    return Err(StoreError::query(resource.clone(), "no such row"));
                }
            };

            match owner {
                Some(holder) if holder != id => {
                    table.waits_for.insert(id, holder);

                    if let Some(cycle) = table.find_cycle(id) {
                        table.waits_for.remove(&id);
                        self.deadlocks.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            target: "lockprobe::store",
                            tx = id,
                            resource = %resource,
                            cycle = ?cycle,
                            "Deadlock detected, aborting requester"
                        );
                        return Err(Conflict::deadlock(resource.clone(), cycle).into());
                    }

                    if Instant::now() >= deadline {
                        table.waits_for.remove(&id);
                        self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
                        let waited_ms = started.elapsed().as_millis() as u64;
                        warn!(
                            target: "lockprobe::store",
                            tx = id,
                            resource = %resource,
                            holder,
                            waited_ms,
                            "Lock wait timed out"
                        );
                        return Err(Conflict::lock_timeout(resource.clone(), waited_ms).into());
                    }

                    trace!(target: "lockprobe::store", tx = id, resource = %resource, holder, "Waiting for lock");
                    self.released.wait_until(&mut table, deadline);
                }
                _ => {
                    table.waits_for.remove(&id);
                    if let Some(row) = table.rows.get_mut(resource) {
                        row.owner = Some(id);
                    }
                    if let Some(state) = table.active.get_mut(&id) {
                        if !state.held.contains(resource) {
                            state.held.push(resource.clone());
                        }
                        state.pending.insert(resource.clone(), value.to_string());
                    }
                    trace!(target: "lockprobe::store", tx = id, resource = %resource, "Lock granted");
                    return Ok(());
                }
            }
        }
    }

    fn commit(&self, tx: &TxHandle) -> StoreResult<()> {
        let id = tx.id();
        let mut table = self.table.lock();

        let state = table
            .active
            .remove(&id)
            .ok_or_else(|| StoreError::commit(*tx, "transaction is not active"))?;

        for (resource, value) in &state.pending {
            if let Some(row) = table.rows.get_mut(resource) {
                row.value = value.clone();
            }
        }
        table.release(id, &state);
        drop(table);
        self.released.notify_all();

        self.committed.fetch_add(1, Ordering::Relaxed);
        debug!(target: "lockprobe::store", tx = id, writes = state.pending.len(), "Transaction committed");
        Ok(())
    }

    fn rollback(&self, tx: &TxHandle) -> StoreResult<()> {
        let id = tx.id();
        let mut table = self.table.lock();

        let Some(state) = table.active.remove(&id) else {
            trace!(target: "lockprobe::store", tx = id, "Rollback of finished transaction ignored");
            return Ok(());
        };

        table.release(id, &state);
        drop(table);
        self.released.notify_all();

        self.rolled_back.fetch_add(1, Ordering::Relaxed);
        debug!(target: "lockprobe::store", tx = id, discarded = state.pending.len(), "Transaction rolled back");
        Ok(())
    }
}
