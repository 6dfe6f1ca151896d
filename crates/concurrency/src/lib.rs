//! Contention harness for lockprobe
//!
//! This crate drives concurrent transactional sessions against a
//! `TransactionalStore` and classifies how each one ended:
//! - `Session`: one transaction acquiring row locks in a fixed order
//! - `Pacer`: pause between acquisitions (`FixedDelay`, `StepBarrier`)
//! - `ConflictOrchestrator`: launches sessions concurrently, joins them all
//! - `OutcomeReporter`: derives the scenario result and applies retries

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod orchestrator;
pub mod pacing;
pub mod reporter;
pub mod session;

pub use orchestrator::{ConflictOrchestrator, RepetitionSummary};
pub use pacing::{FixedDelay, Pacer, StepBarrier, DEFAULT_RENDEZVOUS_TIMEOUT};
pub use reporter::{OutcomeReporter, ScenarioResult, SessionReport, SessionRun};
pub use session::{Outcome, Session, SessionState};
