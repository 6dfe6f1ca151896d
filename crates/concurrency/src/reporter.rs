//! Outcome classification and conflict retry
//!
//! `OutcomeReporter::classify` turns per-session runs into a
//! `ScenarioResult`. It is a pure function: no I/O, no store access.
//!
//! `OutcomeReporter::retry` re-runs only sessions whose latest outcome is a
//! conflict abort, after the policy's delay, until they commit or the budget
//! runs out. Failed sessions are never retried.

use serde::Serialize;
use tracing::debug;

use lockprobe_core::{LockOrder, RetryPolicy, SessionId, TransactionalStore};

use crate::orchestrator::ConflictOrchestrator;
use crate::session::Outcome;

/// One finished session run, as produced by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRun {
    /// Session identifier (input position)
    pub session: SessionId,
    /// Order the session acquired its locks in
    pub lock_order: LockOrder,
    /// How the run ended
    pub outcome: Outcome,
}

/// Everything observed about one configured session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    /// Session identifier (input position)
    pub session: SessionId,
    /// Order the session acquires its locks in
    pub lock_order: LockOrder,
    /// Outcome of every run, first run first; never empty
    attempts: Vec<Outcome>,
}

impl SessionReport {
    /// Report for a session that has run once
    pub fn new(session: SessionId, lock_order: LockOrder, first: Outcome) -> Self {
        Self {
            session,
            lock_order,
            attempts: vec![first],
        }
    }

    /// Outcome of every run, first run first
    pub fn attempts(&self) -> &[Outcome] {
        &self.attempts
    }

    /// Final outcome (latest run)
    pub fn outcome(&self) -> &Outcome {
        // attempts is non-empty by construction
        &self.attempts[self.attempts.len() - 1]
    }

    /// Number of runs after the first
    pub fn retries(&self) -> usize {
        self.attempts.len().saturating_sub(1)
    }
}

impl From<SessionRun> for SessionReport {
    fn from(run: SessionRun) -> Self {
        Self::new(run.session, run.lock_order, run.outcome)
    }
}

/// Classified result of a scenario
///
/// Reports are aligned with the scenario's input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioResult {
    /// One report per configured session, in input order
    pub sessions: Vec<SessionReport>,
    /// True iff any run of any session was aborted by a conflict
    pub conflict_observed: bool,
    /// True iff every session's final outcome is Committed
    pub all_committed: bool,
    /// True iff any session's final outcome is Failed
    pub any_failed: bool,
}

impl ScenarioResult {
    /// Derive the summary facts from a set of reports
    pub fn from_reports(sessions: Vec<SessionReport>) -> Self {
        let conflict_observed = sessions
            .iter()
            .any(|report| report.attempts.iter().any(Outcome::is_conflict));
        let all_committed = sessions.iter().all(|report| report.outcome().is_committed());
        let any_failed = sessions.iter().any(|report| report.outcome().is_failed());

        Self {
            sessions,
            conflict_observed,
            all_committed,
            any_failed,
        }
    }

    /// Final outcomes in input order
    pub fn outcomes(&self) -> Vec<&Outcome> {
        self.sessions.iter().map(SessionReport::outcome).collect()
    }

    /// Sessions whose final outcome is Committed
    pub fn committed(&self) -> Vec<SessionId> {
        self.select(Outcome::is_committed)
    }

    /// Sessions whose final outcome is a conflict abort
    pub fn aborted(&self) -> Vec<SessionId> {
        self.select(Outcome::is_conflict)
    }

    /// Sessions whose final outcome is Failed
    pub fn failed(&self) -> Vec<SessionId> {
        self.select(Outcome::is_failed)
    }

    /// Report for a session
    pub fn report(&self, session: SessionId) -> Option<&SessionReport> {
        self.sessions.iter().find(|report| report.session == session)
    }

    fn select(&self, predicate: fn(&Outcome) -> bool) -> Vec<SessionId> {
        self.sessions
            .iter()
            .filter(|report| predicate(report.outcome()))
            .map(|report| report.session)
            .collect()
    }
}

/// Classifies session outcomes and applies the retry policy
pub struct OutcomeReporter;

impl OutcomeReporter {
    /// Classify finished runs into a scenario result
    ///
    /// Pure: the result depends only on `runs`, whose order is preserved.
    pub fn classify(runs: Vec<SessionRun>) -> ScenarioResult {
        ScenarioResult::from_reports(runs.into_iter().map(SessionReport::from).collect())
    }

    /// Re-run conflicted sessions under `policy`
    ///
    /// Each round waits `policy.retry_delay()`, then re-runs every session
    /// whose latest outcome is a conflict abort, concurrently. A session gets
    /// at most `policy.max_attempts` additional runs. Sessions that committed
    /// or failed are left untouched.
    pub fn retry<S: TransactionalStore>(
        orchestrator: &ConflictOrchestrator<S>,
        result: ScenarioResult,
        policy: &RetryPolicy,
    ) -> ScenarioResult {
        let mut reports = result.sessions;

        for round in 1..=policy.max_attempts {
            let pending: Vec<(usize, SessionId, LockOrder)> = reports
                .iter()
                .enumerate()
                .filter(|(_, report)| report.outcome().is_conflict())
                .map(|(index, report)| (index, report.session, report.lock_order.clone()))
                .collect();
            if pending.is_empty() {
                break;
            }

            debug!(
                target: "lockprobe::reporter",
                round,
                sessions = pending.len(),
                "Retrying conflicted sessions"
            );
            std::thread::sleep(policy.retry_delay());

            let runs = orchestrator.run_sessions(
                pending
                    .iter()
                    .map(|(_, session, order)| (*session, order.clone()))
                    .collect(),
            );
            for ((index, _, _), run) in pending.into_iter().zip(runs) {
                reports[index].attempts.push(run.outcome);
            }
        }

        ScenarioResult::from_reports(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockprobe_core::{Conflict, ResourceId, StoreError};

    fn run(i: usize, outcome: Outcome) -> SessionRun {
        SessionRun {
            session: SessionId(i),
            lock_order: LockOrder::new(["R1", "R2"]).unwrap(),
            outcome,
        }
    }

    fn aborted() -> Outcome {
        Outcome::Aborted(Conflict::deadlock(ResourceId::new("R1"), vec![2, 1]))
    }

    fn failed() -> Outcome {
        Outcome::Failed(StoreError::connection("refused"))
    }

    #[test]
    fn test_classify_deadlock_pair() {
        let result = OutcomeReporter::classify(vec![run(0, Outcome::Committed), run(1, aborted())]);

        assert!(result.conflict_observed);
        assert!(!result.all_committed);
        assert!(!result.any_failed);
        assert_eq!(result.committed(), vec![SessionId(0)]);
        assert_eq!(result.aborted(), vec![SessionId(1)]);
        assert!(result.failed().is_empty());
    }

    #[test]
    fn test_classify_all_committed() {
        let result =
            OutcomeReporter::classify(vec![run(0, Outcome::Committed), run(1, Outcome::Committed)]);
        assert!(result.all_committed);
        assert!(!result.conflict_observed);
        assert!(!result.any_failed);
    }

    #[test]
    fn test_classify_failed_is_not_a_conflict() {
        let result = OutcomeReporter::classify(vec![run(0, failed()), run(1, Outcome::Committed)]);
        assert!(result.any_failed);
        assert!(!result.conflict_observed);
        assert_eq!(result.failed(), vec![SessionId(0)]);
    }

    #[test]
    fn test_classify_preserves_input_order() {
        let result = OutcomeReporter::classify(vec![
            run(2, aborted()),
            run(0, Outcome::Committed),
            run(1, failed()),
        ]);
        let ids: Vec<SessionId> = result.sessions.iter().map(|r| r.session).collect();
        assert_eq!(ids, vec![SessionId(2), SessionId(0), SessionId(1)]);
        assert_eq!(result.outcomes(), vec![&aborted(), &Outcome::Committed, &failed()]);
    }

    #[test]
    fn test_conflict_observed_survives_later_commit() {
        let report = SessionReport {
            session: SessionId(0),
            lock_order: LockOrder::new(["R1"]).unwrap(),
            attempts: vec![aborted(), Outcome::Committed],
        };
        let other = SessionReport::from(run(1, Outcome::Committed));
        let result = ScenarioResult::from_reports(vec![report, other]);

        assert!(result.conflict_observed);
        assert!(result.all_committed);
        assert_eq!(result.report(SessionId(0)).unwrap().retries(), 1);
    }

    #[test]
    fn test_result_serializes_summary() {
        let result = OutcomeReporter::classify(vec![run(0, Outcome::Committed), run(1, aborted())]);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["conflict_observed"], true);
        assert_eq!(json["sessions"][0]["lock_order"][0], "R1");
        assert_eq!(json["sessions"][1]["attempts"][0]["outcome"], "aborted");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn outcome_strategy() -> impl Strategy<Value = Outcome> {
            prop_oneof![
                Just(Outcome::Committed),
                Just(aborted()),
                Just(failed()),
            ]
        }

        proptest! {
            #[test]
            fn classify_reports_one_outcome_per_run(
                outcomes in proptest::collection::vec(outcome_strategy(), 2..8)
            ) {
                let runs: Vec<SessionRun> = outcomes
                    .iter()
                    .cloned()
                    .enumerate()
                    .map(|(i, o)| run(i, o))
                    .collect();
                let result = OutcomeReporter::classify(runs);

                prop_assert_eq!(result.sessions.len(), outcomes.len());
                prop_assert_eq!(
                    result.outcomes().into_iter().cloned().collect::<Vec<_>>(),
                    outcomes.clone()
                );
                prop_assert_eq!(
                    result.conflict_observed,
                    outcomes.iter().any(Outcome::is_conflict)
                );
                prop_assert_eq!(
                    result.all_committed,
                    outcomes.iter().all(Outcome::is_committed)
                );
                prop_assert_eq!(result.any_failed, outcomes.iter().any(Outcome::is_failed));
                prop_assert_eq!(
                    result.committed().len() + result.aborted().len() + result.failed().len(),
                    outcomes.len()
                );
            }
        }
    }
}
