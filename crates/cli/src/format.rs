//! Scenario results -> human/json string formatting.
//!
//! - **Human** (default): one line per session, then the summary facts
//! - **JSON** (`--json`): `serde_json::to_string_pretty`

use lockprobe_concurrency::{RepetitionSummary, ScenarioResult, SessionReport};
use lockprobe_core::HarnessError;
use lockprobe_storage::StoreStats;

/// Output formatting mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

/// Format a single scenario run together with the store's counters.
pub fn format_result(result: &ScenarioResult, stats: &StoreStats, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => to_json(&serde_json::json!({
            "result": result,
            "store": stats,
        })),
        OutputMode::Human => {
            let mut lines: Vec<String> = result.sessions.iter().map(format_report).collect();
            lines.push(String::new());
            lines.push(format!("conflict observed: {}", yes_no(result.conflict_observed)));
            lines.push(format!("all committed:     {}", yes_no(result.all_committed)));
            if result.any_failed {
                lines.push(format!("failed sessions:   {}", result.failed().len()));
            }
            lines.push(format!(
                "store: {} begun, {} committed, {} rolled back, {} deadlocks, {} lock timeouts",
                stats.begun, stats.committed, stats.rolled_back, stats.deadlocks, stats.lock_timeouts
            ));
            lines.join("\n")
        }
    }
}

/// Format the summary of repeated runs.
pub fn format_summary(summary: &RepetitionSummary, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => to_json(summary),
        OutputMode::Human => {
            let mut out = format!(
                "runs: {}\nwith conflict: {}\nall committed: {}\nwith failures: {}",
                summary.runs, summary.conflicted_runs, summary.all_committed_runs, summary.failed_runs
            );
            if let Some(run) = summary.first_conflict_run {
                out.push_str(&format!("\nfirst conflict: run {}", run + 1));
            }
            out
        }
    }
}

/// Format an error.
pub fn format_error(err: &HarnessError, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => serde_json::to_string_pretty(&serde_json::json!({
            "error": format!("{}", err)
        }))
        .unwrap_or_else(|_| format!("{{\"error\": \"{}\"}}", err)),
        OutputMode::Human => format!("(error) {}", err),
    }
}

fn format_report(report: &SessionReport) -> String {
    let mut line = format!("{} {}: {}", report.session, report.lock_order, report.outcome());
    match report.retries() {
        0 => {}
        1 => line.push_str(" (after 1 retry)"),
        n => line.push_str(&format!(" (after {} retries)", n)),
    }
    line
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"serialization failed: {}\"}}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockprobe_concurrency::{Outcome, OutcomeReporter, SessionRun};
    use lockprobe_core::{Conflict, LockOrder, ResourceId, SessionId};

    fn deadlock_result() -> ScenarioResult {
        let forward = LockOrder::new(["R1", "R2"]).unwrap();
        let backward = forward.reversed();
        OutcomeReporter::classify(vec![
            SessionRun {
                session: SessionId(0),
                lock_order: forward,
                outcome: Outcome::Committed,
            },
            SessionRun {
                session: SessionId(1),
                lock_order: backward,
                outcome: Outcome::Aborted(Conflict::deadlock(ResourceId::new("R1"), vec![2, 1])),
            },
        ])
    }

    #[test]
    fn test_human_result_lists_sessions() {
        let out = format_result(&deadlock_result(), &StoreStats::default(), OutputMode::Human);
        let mut lines = out.lines();
        assert_eq!(lines.next(), Some("session-1 [R1 -> R2]: committed"));
        assert!(lines.next().unwrap().starts_with("session-2 [R2 -> R1]: aborted: deadlock"));
        assert!(out.contains("conflict observed: yes"));
        assert!(out.contains("all committed:     no"));
        assert!(!out.contains("failed sessions"));
    }

    #[test]
    fn test_json_result_is_valid() {
        let out = format_result(&deadlock_result(), &StoreStats::default(), OutputMode::Json);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["result"]["conflict_observed"], true);
        assert_eq!(value["store"]["deadlocks"], 0);
    }

    #[test]
    fn test_human_summary_names_first_conflict() {
        let summary = RepetitionSummary {
            runs: 20,
            conflicted_runs: 18,
            all_committed_runs: 2,
            failed_runs: 0,
            first_conflict_run: Some(0),
        };
        let out = format_summary(&summary, OutputMode::Human);
        assert!(out.contains("with conflict: 18"));
        assert!(out.ends_with("first conflict: run 1"));
    }

    #[test]
    fn test_format_error() {
        let err = HarnessError::invalid_scenario("need at least 2 sessions");
        assert!(format_error(&err, OutputMode::Human).starts_with("(error) "));
        let json: serde_json::Value =
            serde_json::from_str(&format_error(&err, OutputMode::Json)).unwrap();
        assert!(json["error"].as_str().unwrap().contains("2 sessions"));
    }
}
