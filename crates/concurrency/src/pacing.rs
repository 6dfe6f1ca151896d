//! Pacing between lock acquisitions
//!
//! A session calls its `Pacer` after each successful lock acquisition except
//! the last, before requesting the next resource. This is where the
//! contention window is widened.
//!
//! - `FixedDelay`: sleeps for a configured duration (zero = no pause)
//! - `StepBarrier`: rendezvous armed once per run; the first `parties`
//!   sessions to reach a given step wait for each other, which makes the
//!   reversed-order deadlock deterministic without any sleep

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::warn;

use lockprobe_core::SessionId;

/// Default bound on how long a `StepBarrier` waits for missing parties
pub const DEFAULT_RENDEZVOUS_TIMEOUT: Duration = Duration::from_secs(10);

/// Hook invoked between successive lock acquisitions
///
/// `step` is the zero-based index of the lock the session just acquired.
pub trait Pacer: Send + Sync {
    /// Block (or not) before the session requests its next lock
    fn pause(&self, session: SessionId, step: usize);

    /// Called once before the sessions of a new scenario run are launched
    ///
    /// Retry rounds within a run do not call this.
    fn begin_run(&self) {}
}

/// Sleep for a fixed duration between lock acquisitions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixedDelay(pub Duration);

impl FixedDelay {
    /// No pause at all
    pub const ZERO: FixedDelay = FixedDelay(Duration::ZERO);

    /// Delay of `ms` milliseconds
    pub fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }
}

impl Pacer for FixedDelay {
    fn pause(&self, _session: SessionId, _step: usize) {
        if !self.0.is_zero() {
            std::thread::sleep(self.0);
        }
    }
}

#[derive(Debug, Default)]
struct Rendezvous {
    arrived: usize,
    open: bool,
}

/// Per-run rendezvous at a fixed step
///
/// The first `parties` pauses at `step` block until all of them have arrived;
/// after that the barrier stays open until the next `begin_run`, so retried
/// sessions within a run are never held. If a party never shows up (for
/// example because its session failed before reaching the step), waiters give
/// up after `timeout` and open the barrier.
#[derive(Debug)]
pub struct StepBarrier {
    parties: usize,
    step: usize,
    timeout: Duration,
    state: Mutex<Rendezvous>,
    arrived: Condvar,
}

impl StepBarrier {
    /// Rendezvous of `parties` sessions right after their first lock
    pub fn new(parties: usize) -> Self {
        Self::at_step(parties, 0)
    }

    /// Rendezvous of `parties` sessions after the lock at index `step`
    pub fn at_step(parties: usize, step: usize) -> Self {
        Self {
            parties,
            step,
            timeout: DEFAULT_RENDEZVOUS_TIMEOUT,
            state: Mutex::new(Rendezvous::default()),
            arrived: Condvar::new(),
        }
    }

    /// Set how long a waiter tolerates missing parties
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// True once every party arrived or a waiter timed out
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }
}

impl Pacer for StepBarrier {
    fn begin_run(&self) {
        let mut state = self.state.lock();
        state.arrived = 0;
        state.open = false;
    }

    fn pause(&self, session: SessionId, step: usize) {
        if step != self.step {
            return;
        }

        let mut state = self.state.lock();
        if state.open {
            return;
        }

        state.arrived += 1;
        if state.arrived >= self.parties {
            state.open = true;
            self.arrived.notify_all();
            return;
        }

        let deadline = Instant::now() + self.timeout;
        while !state.open {
            if self.arrived.wait_until(&mut state, deadline).timed_out() && !state.open {
                warn!(
                    target: "lockprobe::session",
                    session = %session,
                    arrived = state.arrived,
                    parties = self.parties,
                    "Rendezvous timed out, releasing waiters"
                );
                state.open = true;
                self.arrived.notify_all();
            }
        }
    }
}
