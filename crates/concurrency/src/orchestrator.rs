//! Conflict orchestrator: launches sessions concurrently and collects outcomes
//!
//! ## Run Sequence
//!
//! ```text
//! 1. validate_scenario() - >= 2 sessions, declared resources only
//! 2. Build one Session per lock order (shared store, shared pacer)
//! 3. Spawn every session on its own scoped thread
//! 4. Join every thread, in input order
//! 5. OutcomeReporter::classify() - derive the scenario result
//! ```
//!
//! All threads are spawned before any is joined. The orchestrator holds no
//! locks, never times a session out, and never cancels one: a session runs
//! until the store grants or rejects its requests.

use std::any::Any;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error};

use lockprobe_core::{
    validate_scenario, HarnessResult, LockOrder, ResourceId, RetryPolicy, ScenarioConfig,
    SessionId, StoreError, TransactionalStore,
};

use crate::pacing::{FixedDelay, Pacer};
use crate::reporter::{OutcomeReporter, ScenarioResult, SessionRun};
use crate::session::{Outcome, Session};

/// Aggregate of several runs of the same scenario
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepetitionSummary {
    /// Scenario runs performed
    pub runs: usize,
    /// Runs in which a conflict was observed
    pub conflicted_runs: usize,
    /// Runs in which every session committed
    pub all_committed_runs: usize,
    /// Runs in which at least one session failed
    pub failed_runs: usize,
    /// Zero-based index of the first run that observed a conflict
    pub first_conflict_run: Option<usize>,
}

impl RepetitionSummary {
    /// Fold one scenario result into the summary
    pub fn record(&mut self, result: &ScenarioResult) {
        if result.conflict_observed {
            self.conflicted_runs += 1;
            self.first_conflict_run.get_or_insert(self.runs);
        }
        if result.all_committed {
            self.all_committed_runs += 1;
        }
        if result.any_failed {
            self.failed_runs += 1;
        }
        self.runs += 1;
    }
}

/// Runs contention scenarios against a shared store
///
/// The store handle and pacing are explicit dependencies, so tests can
/// inject an in-memory store and a barrier instead of a real delay.
pub struct ConflictOrchestrator<S: TransactionalStore> {
    store: Arc<S>,
    pacer: Arc<dyn Pacer>,
}

impl<S: TransactionalStore> ConflictOrchestrator<S> {
    /// Create an orchestrator with explicit pacing
    pub fn new(store: Arc<S>, pacer: Arc<dyn Pacer>) -> Self {
        Self { store, pacer }
    }

    /// Create an orchestrator that sleeps `delay` between lock acquisitions
    pub fn with_delay(store: Arc<S>, delay: Duration) -> Self {
        Self::new(store, Arc::new(FixedDelay(delay)))
    }

    /// Create an orchestrator paced by the configuration's inter-lock delay
    ///
    /// The store is the caller's; for the bundled store, build it from
    /// `config.store` so the lock-wait bound matches.
    pub fn from_config(store: Arc<S>, config: &ScenarioConfig) -> Self {
        Self::with_delay(store, config.inter_lock_delay())
    }

    /// The shared store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Run a scenario once and classify its outcomes
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::InvalidScenario` before any session starts if
    /// fewer than two lock orders are given or one references a resource not
    /// in `resources`.
    pub fn run_scenario(
        &self,
        resources: &[ResourceId],
        specs: &[LockOrder],
    ) -> HarnessResult<ScenarioResult> {
        validate_scenario(resources, specs)?;
        self.pacer.begin_run();

        let sessions = specs
            .iter()
            .enumerate()
            .map(|(index, order)| (SessionId(index), order.clone()))
            .collect();
        Ok(OutcomeReporter::classify(self.run_sessions(sessions)))
    }

    /// Run a scenario, then retry conflicted sessions under `policy`
    ///
    /// # Errors
    ///
    /// Same as [`run_scenario`](Self::run_scenario).
    pub fn run_with_retry(
        &self,
        resources: &[ResourceId],
        specs: &[LockOrder],
        policy: &RetryPolicy,
    ) -> HarnessResult<ScenarioResult> {
        let result = self.run_scenario(resources, specs)?;
        Ok(OutcomeReporter::retry(self, result, policy))
    }

    /// Run a scenario, retrying conflicted sessions only when a policy is given
    ///
    /// # Errors
    ///
    /// Same as [`run_scenario`](Self::run_scenario).
    pub fn run_with_policy(
        &self,
        resources: &[ResourceId],
        specs: &[LockOrder],
        policy: Option<&RetryPolicy>,
    ) -> HarnessResult<ScenarioResult> {
        match policy {
            Some(policy) => self.run_with_retry(resources, specs, policy),
            None => self.run_scenario(resources, specs),
        }
    }

    /// Run the same scenario `runs` times and summarize
    ///
    /// # Errors
    ///
    /// Returns the validation error before the first run; runs themselves
    /// never fail.
    pub fn run_repeated(
        &self,
        resources: &[ResourceId],
        specs: &[LockOrder],
        runs: usize,
    ) -> HarnessResult<RepetitionSummary> {
        validate_scenario(resources, specs)?;

        let mut summary = RepetitionSummary::default();
        for _ in 0..runs {
            let result = self.run_scenario(resources, specs)?;
            summary.record(&result);
        }
        Ok(summary)
    }

    /// Launch the given sessions concurrently and wait for all of them
    ///
    /// Returns one run per input, in input order. A session whose thread
    /// could not be spawned or panicked is reported as failed.
    pub(crate) fn run_sessions(&self, sessions: Vec<(SessionId, LockOrder)>) -> Vec<SessionRun> {
        let mut sessions: Vec<Session<S>> = sessions
            .into_iter()
            .map(|(id, order)| {
                Session::new(id, Arc::clone(&self.store), order, Arc::clone(&self.pacer))
            })
            .collect();

        debug!(target: "lockprobe::orchestrator", sessions = sessions.len(), "Launching sessions");

        let outcomes: Vec<Outcome> = thread::scope(|scope| {
            let handles: Vec<_> = sessions
                .iter_mut()
                .map(|session| {
                    let name = format!("lockprobe-{}", session.id());
                    thread::Builder::new()
                        .name(name)
                        .spawn_scoped(scope, move || session.run())
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| match handle {
                    Ok(handle) => handle.join().unwrap_or_else(|payload| {
                        let message = panic_message(payload.as_ref());
                        error!(target: "lockprobe::orchestrator", panic = %message, "Session thread panicked");
                        Outcome::Failed(StoreError::internal(format!(
                            "session panicked: {}",
                            message
                        )))
                    }),
                    Err(e) => Outcome::Failed(StoreError::internal(format!(
                        "failed to spawn session thread: {}",
                        e
                    ))),
                })
                .collect()
        });

        sessions
            .into_iter()
            .zip(outcomes)
            .map(|(session, outcome)| SessionRun {
                session: session.id(),
                lock_order: session.lock_order().clone(),
                outcome,
            })
            .collect()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pacing::StepBarrier;
    use lockprobe_core::{HarnessError, StoreResult, TxHandle};
    use lockprobe_storage::LockTableStore;

    fn r(name: &str) -> ResourceId {
        ResourceId::new(name)
    }

    fn order(names: &[&str]) -> LockOrder {
        LockOrder::new(names.iter().copied()).unwrap()
    }

    fn seeded(names: &[&str]) -> Arc<LockTableStore> {
        let resources: Vec<ResourceId> = names.iter().map(|n| r(n)).collect();
        Arc::new(LockTableStore::new().seeded(&resources, "initial"))
    }

    /// Store whose lock panics on a chosen resource
    struct PanickingStore {
        inner: LockTableStore,
        poisoned: ResourceId,
    }

    impl TransactionalStore for PanickingStore {
        fn begin(&self) -> StoreResult<TxHandle> {
            self.inner.begin()
        }

        fn lock(&self, tx: &TxHandle, resource: &ResourceId, value: &str) -> StoreResult<()> {
            if resource == &self.poisoned {
                panic!("lock on poisoned resource");
            }
            self.inner.lock(tx, resource, value)
        }

        fn commit(&self, tx: &TxHandle) -> StoreResult<()> {
            self.inner.commit(tx)
        }

        fn rollback(&self, tx: &TxHandle) -> StoreResult<()> {
            self.inner.rollback(tx)
        }
    }

    #[test]
    fn test_rejects_single_session_before_launch() {
        let store = seeded(&["R1"]);
        let orchestrator = ConflictOrchestrator::with_delay(Arc::clone(&store), Duration::ZERO);

        let err = orchestrator.run_scenario(&[r("R1")], &[order(&["R1"])]).unwrap_err();
        assert!(matches!(err, HarnessError::InvalidScenario(_)));
        assert_eq!(store.stats().begun, 0);
    }

    #[test]
    fn test_rejects_undeclared_resource_before_launch() {
        let store = seeded(&["R1", "R2"]);
        let orchestrator = ConflictOrchestrator::with_delay(Arc::clone(&store), Duration::ZERO);

        let err = orchestrator
            .run_scenario(&[r("R1")], &[order(&["R1"]), order(&["R2"])])
            .unwrap_err();
        assert!(matches!(err, HarnessError::InvalidScenario(_)));
        assert_eq!(store.stats().begun, 0);
    }

    #[test]
    fn test_disjoint_sessions_all_commit() {
        let store = seeded(&["R1", "R2", "R3", "R4"]);
        let orchestrator = ConflictOrchestrator::with_delay(Arc::clone(&store), Duration::ZERO);

        let result = orchestrator
            .run_scenario(
                &[r("R1"), r("R2"), r("R3"), r("R4")],
                &[order(&["R1", "R2"]), order(&["R3", "R4"])],
            )
            .unwrap();

        assert!(result.all_committed);
        assert!(!result.conflict_observed);
        assert_eq!(store.read(&r("R1")).as_deref(), Some("session-1"));
        assert_eq!(store.read(&r("R4")).as_deref(), Some("session-2"));
    }

    #[test]
    fn test_barrier_forces_deadlock() {
        let store = seeded(&["R1", "R2"]);
        let orchestrator =
            ConflictOrchestrator::new(Arc::clone(&store), Arc::new(StepBarrier::new(2)));

        let result = orchestrator
            .run_scenario(&[r("R1"), r("R2")], &[order(&["R1", "R2"]), order(&["R2", "R1"])])
            .unwrap();

        assert!(result.conflict_observed);
        assert_eq!(result.committed().len(), 1);
        assert_eq!(result.aborted().len(), 1);
        assert_eq!(store.active_count(), 0);
    }

    #[test]
    fn test_from_config_uses_configured_delay() {
        let store = seeded(&["R1", "R2"]);
        let config = ScenarioConfig::canonical(Duration::from_millis(40));
        let orchestrator = ConflictOrchestrator::from_config(Arc::clone(&store), &config);

        let start = std::time::Instant::now();
        orchestrator
            .run_scenario(&[r("R1"), r("R2")], &[order(&["R1", "R2"]), order(&["R1", "R2"])])
            .unwrap();
        // Two sessions in the same order serialize, each pausing once
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_panicking_session_is_reported_failed() {
        let inner = LockTableStore::new().seeded(&[r("R1"), r("R2")], "initial");
        let store = Arc::new(PanickingStore {
            inner,
            poisoned: r("R2"),
        });
        let orchestrator = ConflictOrchestrator::with_delay(Arc::clone(&store), Duration::ZERO);

        let result = orchestrator
            .run_scenario(&[r("R1"), r("R2")], &[order(&["R1"]), order(&["R2"])])
            .unwrap();

        assert_eq!(result.sessions.len(), 2);
        assert!(result.sessions[0].outcome().is_committed());
        assert!(matches!(
            result.sessions[1].outcome(),
            Outcome::Failed(StoreError::Internal { .. })
        ));
        assert!(result.any_failed);
        // The guard released the panicking session's transaction during unwind
        assert_eq!(store.inner.active_count(), 0);
    }

    #[test]
    fn test_repetition_summary_counts_runs() {
        let store = seeded(&["R1", "R2"]);
        let orchestrator = ConflictOrchestrator::with_delay(Arc::clone(&store), Duration::ZERO);

        let summary = orchestrator
            .run_repeated(&[r("R1"), r("R2")], &[order(&["R1"]), order(&["R2"])], 5)
            .unwrap();

        assert_eq!(summary.runs, 5);
        assert_eq!(summary.all_committed_runs, 5);
        assert_eq!(summary.conflicted_runs, 0);
        assert_eq!(summary.first_conflict_run, None);
    }

    #[test]
    fn test_summary_records_first_conflict() {
        let committed = OutcomeReporter::classify(vec![SessionRun {
            session: SessionId(0),
            lock_order: order(&["R1"]),
            outcome: Outcome::Committed,
        }]);
        let conflicted = OutcomeReporter::classify(vec![SessionRun {
            session: SessionId(0),
            lock_order: order(&["R1"]),
            outcome: Outcome::Aborted(lockprobe_core::Conflict::lock_timeout(r("R1"), 1)),
        }]);

        let mut summary = RepetitionSummary::default();
        summary.record(&committed);
        summary.record(&conflicted);
        summary.record(&conflicted);

        assert_eq!(summary.runs, 3);
        assert_eq!(summary.conflicted_runs, 2);
        assert_eq!(summary.first_conflict_run, Some(1));
    }
}
