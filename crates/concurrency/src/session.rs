//! Session: one transactional actor acquiring locks in a fixed order
//!
//! A session opens a transaction, writes its label into every resource of
//! its lock order (each write takes an exclusive row lock), pauses between
//! acquisitions, and commits. Its run ends in exactly one `Outcome`.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle -> TransactionOpen -> AcquiringLock(0) -> ... -> AcquiringLock(n-1)
//!                                   |                          |
//!                                   v                          v
//!                       AbortedConflict | Failed     Committed | Failed
//! ```
//!
//! Terminal states are final: running a finished session again returns the
//! recorded outcome without touching the store.
//!
//! The transaction is held by a guard that rolls back on drop, so every early
//! return releases the store's locks.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use lockprobe_core::{
    Conflict, LockOrder, ResourceId, SessionId, StoreError, StoreResult, TransactionalStore,
    TxHandle,
};

use crate::pacing::Pacer;

/// Terminal result of one session run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    /// Every lock was acquired and the transaction committed
    Committed,
    /// The store signaled a conflict; the transaction was rolled back
    Aborted(Conflict),
    /// Any other failure; the transaction (if opened) was rolled back
    Failed(StoreError),
}

impl Outcome {
    /// Classify a store error: conflicts abort, everything else fails
    pub fn from_error(error: StoreError) -> Self {
        match error {
            StoreError::Conflict(conflict) => Outcome::Aborted(conflict),
            other => Outcome::Failed(other),
        }
    }

    /// True if the session committed
    pub fn is_committed(&self) -> bool {
        matches!(self, Outcome::Committed)
    }

    /// True if the session was aborted by a store-signaled conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Outcome::Aborted(_))
    }

    /// True if the session failed for a non-conflict reason
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    /// The conflict, if the session was aborted
    pub fn conflict(&self) -> Option<&Conflict> {
        match self {
            Outcome::Aborted(conflict) => Some(conflict),
            _ => None,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Committed => write!(f, "committed"),
            Outcome::Aborted(conflict) => write!(f, "aborted: {}", conflict),
            Outcome::Failed(error) => write!(f, "failed: {}", error),
        }
    }
}

/// Position of a session in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Constructed, not yet run
    Idle,
    /// Transaction opened, no lock requested yet
    TransactionOpen,
    /// Requesting the lock at this index of the lock order
    AcquiringLock {
        /// Zero-based index into the lock order
        step: usize,
    },
    /// Terminal: committed
    Committed,
    /// Terminal: aborted by a conflict
    AbortedConflict,
    /// Terminal: failed
    Failed,
}

impl SessionState {
    /// True for Committed, AbortedConflict, and Failed
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Committed | SessionState::AbortedConflict | SessionState::Failed
        )
    }
}

impl From<&Outcome> for SessionState {
    fn from(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Committed => SessionState::Committed,
            Outcome::Aborted(_) => SessionState::AbortedConflict,
            Outcome::Failed(_) => SessionState::Failed,
        }
    }
}

/// Scoped transaction: rolls back on drop unless finished
struct TxGuard<'a, S: TransactionalStore + ?Sized> {
    store: &'a S,
    tx: TxHandle,
    finished: bool,
}

impl<'a, S: TransactionalStore + ?Sized> TxGuard<'a, S> {
    fn begin(store: &'a S) -> StoreResult<Self> {
        let tx = store.begin()?;
        Ok(Self {
            store,
            tx,
            finished: false,
        })
    }

    fn lock(&self, resource: &ResourceId, value: &str) -> StoreResult<()> {
        self.store.lock(&self.tx, resource, value)
    }

    /// Commit; on failure the guard stays armed and rolls back on drop
    fn commit(mut self) -> StoreResult<()> {
        self.store.commit(&self.tx)?;
        self.finished = true;
        Ok(())
    }
}

impl<S: TransactionalStore + ?Sized> Drop for TxGuard<'_, S> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.store.rollback(&self.tx) {
            warn!(target: "lockprobe::session", tx = %self.tx, error = %e, "Rollback failed");
        }
    }
}

/// One logical actor in a contention scenario
///
/// Owns its store handle, lock order, and pacing. Never observes other
/// sessions; all coordination happens through the store's locks.
pub struct Session<S: TransactionalStore> {
    id: SessionId,
    store: Arc<S>,
    lock_order: LockOrder,
    pacer: Arc<dyn Pacer>,
    state: SessionState,
    outcome: Option<Outcome>,
}

impl<S: TransactionalStore> Session<S> {
    /// Create an idle session
    pub fn new(id: SessionId, store: Arc<S>, lock_order: LockOrder, pacer: Arc<dyn Pacer>) -> Self {
        Self {
            id,
            store,
            lock_order,
            pacer,
            state: SessionState::Idle,
            outcome: None,
        }
    }

    /// Session identifier
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Resources this session locks, in order
    pub fn lock_order(&self) -> &LockOrder {
        &self.lock_order
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Recorded outcome, once the session has run
    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// Run the session to a terminal outcome
    ///
    /// Blocks while the store decides on each lock request and during
    /// pacing. Running an already finished session returns its recorded
    /// outcome.
    pub fn run(&mut self) -> Outcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }

        debug!(target: "lockprobe::session", session = %self.id, order = %self.lock_order, "Session started");
        let outcome = self.execute();

        self.state = SessionState::from(&outcome);
        self.outcome = Some(outcome.clone());

        match &outcome {
            Outcome::Committed => {
                debug!(target: "lockprobe::session", session = %self.id, "Session committed")
            }
            Outcome::Aborted(conflict) => {
                debug!(target: "lockprobe::session", session = %self.id, conflict = %conflict, "Session aborted")
            }
            Outcome::Failed(error) => {
                warn!(target: "lockprobe::session", session = %self.id, error = %error, "Session failed")
            }
        }
        outcome
    }

    fn execute(&mut self) -> Outcome {
        let label = self.id.label();

        let txn = match TxGuard::begin(self.store.as_ref()) {
            Ok(txn) => txn,
            Err(e) => return Outcome::Failed(e),
        };
        self.state = SessionState::TransactionOpen;

        for (step, resource) in self.lock_order.iter().enumerate() {
            if step > 0 {
                self.pacer.pause(self.id, step - 1);
            }
            self.state = SessionState::AcquiringLock { step };
            if let Err(e) = txn.lock(resource, &label) {
                return Outcome::from_error(e);
            }
        }

        match txn.commit() {
            Ok(()) => Outcome::Committed,
            Err(e) => Outcome::Failed(e),
        }
    }
}

impl<S: TransactionalStore> std::fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("lock_order", &self.lock_order)
            .field("state", &self.state)
            .field("outcome", &self.outcome)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pacing::FixedDelay;
    use lockprobe_core::ConflictKind;
    use lockprobe_storage::testing::{FaultPoint, FaultyStore};
    use lockprobe_storage::LockTableStore;
    use parking_lot::Mutex;

    fn r(name: &str) -> ResourceId {
        ResourceId::new(name)
    }

    fn store(names: &[&str]) -> LockTableStore {
        let resources: Vec<ResourceId> = names.iter().map(|n| r(n)).collect();
        LockTableStore::new().seeded(&resources, "initial")
    }

    fn order(names: &[&str]) -> LockOrder {
        LockOrder::new(names.iter().copied()).unwrap()
    }

    fn no_pause() -> Arc<dyn Pacer> {
        Arc::new(FixedDelay::ZERO)
    }

    /// Records every pause call
    #[derive(Default)]
    struct RecordingPacer {
        calls: Mutex<Vec<(SessionId, usize)>>,
    }

    impl Pacer for RecordingPacer {
        fn pause(&self, session: SessionId, step: usize) {
            self.calls.lock().push((session, step));
        }
    }

    #[test]
    fn test_uncontended_session_commits_all_writes() {
        let store = Arc::new(store(&["R1", "R2", "R3"]));
        let mut session = Session::new(
            SessionId(0),
            Arc::clone(&store),
            order(&["R1", "R2", "R3"]),
            no_pause(),
        );
        assert_eq!(session.state(), SessionState::Idle);

        assert_eq!(session.run(), Outcome::Committed);
        assert_eq!(session.state(), SessionState::Committed);
        for name in ["R1", "R2", "R3"] {
            assert_eq!(store.read(&r(name)).as_deref(), Some("session-1"));
        }
        assert_eq!(store.active_count(), 0);
    }

    #[test]
    fn test_pacer_called_between_acquisitions_only() {
        let store = Arc::new(store(&["R1", "R2", "R3"]));
        let pacer = Arc::new(RecordingPacer::default());
        let mut session = Session::new(
            SessionId(4),
            store,
            order(&["R1", "R2", "R3"]),
            pacer.clone(),
        );
        session.run();

        assert_eq!(
            *pacer.calls.lock(),
            vec![(SessionId(4), 0), (SessionId(4), 1)]
        );
    }

    #[test]
    fn test_single_lock_session_never_pauses() {
        let pacer = Arc::new(RecordingPacer::default());
        let mut session = Session::new(
            SessionId(0),
            Arc::new(store(&["R1"])),
            order(&["R1"]),
            pacer.clone(),
        );
        assert!(session.run().is_committed());
        assert!(pacer.calls.lock().is_empty());
    }

    #[test]
    fn test_begin_failure_is_failed_without_rollback() {
        let faulty = Arc::new(
            FaultyStore::new(store(&["R1"]))
                .inject(FaultPoint::Begin, StoreError::connection("refused")),
        );
        let mut session = Session::new(SessionId(0), Arc::clone(&faulty), order(&["R1"]), no_pause());

        let outcome = session.run();
        assert!(matches!(outcome, Outcome::Failed(StoreError::Connection { .. })));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(faulty.rollback_count(), 0);
    }

    #[test]
    fn test_query_error_fails_and_rolls_back() {
        let faulty = Arc::new(
            FaultyStore::new(store(&["R1", "R2"]))
                .inject(FaultPoint::Lock(2), StoreError::query(r("R2"), "check violation")),
        );
        let mut session =
            Session::new(SessionId(0), Arc::clone(&faulty), order(&["R1", "R2"]), no_pause());

        let outcome = session.run();
        assert!(outcome.is_failed());
        assert_eq!(faulty.rollback_count(), 1);
        assert_eq!(faulty.inner().read(&r("R1")).as_deref(), Some("initial"));
        assert_eq!(faulty.inner().holder(&r("R1")), None);
    }

    #[test]
    fn test_conflict_aborts_and_rolls_back() {
        let conflict = Conflict::deadlock(r("R2"), vec![2, 1]);
        let faulty = Arc::new(
            FaultyStore::new(store(&["R1", "R2"]))
                .inject(FaultPoint::Lock(2), conflict.clone().into()),
        );
        let mut session =
            Session::new(SessionId(1), Arc::clone(&faulty), order(&["R1", "R2"]), no_pause());

        assert_eq!(session.run(), Outcome::Aborted(conflict));
        assert_eq!(session.state(), SessionState::AbortedConflict);
        assert_eq!(faulty.rollback_count(), 1);
        assert_eq!(faulty.inner().active_count(), 0);
    }

    #[test]
    fn test_commit_failure_is_failed_and_rolls_back() {
        let faulty = Arc::new(
            FaultyStore::new(store(&["R1"]))
                .inject(FaultPoint::Commit, StoreError::commit(TxHandle::new(1), "rejected")),
        );
        let mut session = Session::new(SessionId(0), Arc::clone(&faulty), order(&["R1"]), no_pause());

        assert!(matches!(session.run(), Outcome::Failed(StoreError::Commit { .. })));
        assert_eq!(faulty.rollback_count(), 1);
        assert_eq!(faulty.inner().active_count(), 0);
    }

    #[test]
    fn test_lock_timeout_is_a_conflict() {
        let store = Arc::new(
            LockTableStore::with_lock_timeout(std::time::Duration::from_millis(20))
                .seeded(&[r("R1")], "initial"),
        );
        let blocker = store.begin().unwrap();
        store.lock(&blocker, &r("R1"), "blocker").unwrap();

        let mut session = Session::new(SessionId(0), Arc::clone(&store), order(&["R1"]), no_pause());
        let outcome = session.run();
        assert!(matches!(
            outcome.conflict().map(|c| &c.kind),
            Some(ConflictKind::LockTimeout { .. })
        ));
        store.rollback(&blocker).unwrap();
    }

    #[test]
    fn test_terminal_state_is_final() {
        let faulty = Arc::new(FaultyStore::new(store(&["R1"])));
        let mut session = Session::new(SessionId(0), Arc::clone(&faulty), order(&["R1"]), no_pause());

        let first = session.run();
        let second = session.run();
        assert_eq!(first, second);
        assert_eq!(faulty.inner().stats().begun, 1);
    }

    #[test]
    fn test_outcome_serializes_with_tag() {
        let json = serde_json::to_value(Outcome::Committed).unwrap();
        assert_eq!(json["outcome"], "committed");

        let aborted = Outcome::Aborted(Conflict::lock_timeout(r("R1"), 5));
        let json = serde_json::to_value(&aborted).unwrap();
        assert_eq!(json["outcome"], "aborted");
        assert_eq!(json["detail"]["resource"], "R1");
        assert_eq!(json["detail"]["kind"], "lock_timeout");
    }
}
