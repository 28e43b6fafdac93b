//! Waiting for the remote to finish indexing a submitted batch.
//!
//! [`IndexingWait`] polls the batch status until one of three terminal states
//! is reached:
//!
//! ```text
//!            ┌──────────────► Settled      in_progress == 0 (failed items allowed)
//!  Polling ──┼──────────────► TimedOut     deadline passed, still in progress
//!            └──────────────► FailedFatal  status errors beyond the retry budget
//! ```
//!
//! Polls are spaced by a capped exponential backoff (`initial`, `2×initial`,
//! ... up to `max`), independent of the deadline. The last sleep before a
//! finite deadline is shortened so the final poll lands on the deadline.
//! Transient status errors are retried on the same schedule; permanent ones
//! end the wait at once. The wait reports a [`ProgressEvent::Indexing`]
//! snapshot after every successful poll and never logs on its own.

use std::time::{Duration, Instant};

use crate::error::RemoteError;
use crate::models::{BatchRef, BatchStatus};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::remote::RemoteIndex;

/// Delay between status polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffSchedule {
    pub initial: Duration,
    pub max: Duration,
}

impl BackoffSchedule {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
        }
    }

    /// The delay following `current`: doubled, capped at `max`.
    pub fn next(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max)
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(10))
    }
}

/// Upper bound on the whole wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    After(Duration),
    Unlimited,
}

impl Deadline {
    /// `0` means no limit.
    pub fn from_secs(secs: u64) -> Self {
        if secs == 0 {
            Deadline::Unlimited
        } else {
            Deadline::After(Duration::from_secs(secs))
        }
    }
}

/// Time source for the wait. [`SystemClock`] sleeps the calling thread.
pub trait Clock {
    /// Monotonic time since an arbitrary fixed origin.
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Duration {
        (**self).now()
    }
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Tunables for one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    pub schedule: BackoffSchedule,
    pub deadline: Deadline,
    /// Consecutive transient status errors tolerated before giving up.
    pub max_poll_errors: u32,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            schedule: BackoffSchedule::default(),
            deadline: Deadline::from_secs(600),
            max_poll_errors: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    Polling,
    Settled,
    TimedOut,
    FailedFatal,
}

/// Terminal result of a wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Nothing left in progress; `status.failed_items` may be non-empty.
    Settled { status: BatchStatus, polls: u32 },
    /// The deadline passed while items were still in progress.
    TimedOut {
        last: Option<BatchStatus>,
        elapsed: Duration,
    },
    /// Status polling failed beyond the retry budget.
    FailedFatal {
        last: Option<BatchStatus>,
        error: RemoteError,
    },
}

impl WaitOutcome {
    pub fn state(&self) -> WaitState {
        match self {
            WaitOutcome::Settled { .. } => WaitState::Settled,
            WaitOutcome::TimedOut { .. } => WaitState::TimedOut,
            WaitOutcome::FailedFatal { .. } => WaitState::FailedFatal,
        }
    }

    /// The most recent status observed before the wait ended.
    pub fn last_status(&self) -> Option<&BatchStatus> {
        match self {
            WaitOutcome::Settled { status, .. } => Some(status),
            WaitOutcome::TimedOut { last, .. } | WaitOutcome::FailedFatal { last, .. } => {
                last.as_ref()
            }
        }
    }
}

/// Polls one batch until it settles, times out or polling fails for good.
pub struct IndexingWait<'a> {
    remote: &'a dyn RemoteIndex,
    config: WaitConfig,
    clock: Box<dyn Clock + 'a>,
    state: WaitState,
}

impl<'a> IndexingWait<'a> {
    pub fn new(remote: &'a dyn RemoteIndex, config: WaitConfig) -> Self {
        Self {
            remote,
            config,
            clock: Box::new(SystemClock::new()),
            state: WaitState::Polling,
        }
    }

    /// Replace the system clock, e.g. with a simulated one.
    pub fn with_clock(mut self, clock: impl Clock + 'a) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn state(&self) -> WaitState {
        self.state
    }

    /// Poll `batch` until a terminal state is reached.
    pub fn run(&mut self, batch: &BatchRef, progress: &dyn ProgressReporter) -> WaitOutcome {
        let outcome = self.poll_until_terminal(batch, progress);
        self.state = outcome.state();
        outcome
    }

    fn poll_until_terminal(
        &self,
        batch: &BatchRef,
        progress: &dyn ProgressReporter,
    ) -> WaitOutcome {
        let started = self.clock.now();
        let mut delay = self.config.schedule.initial;
        let mut last: Option<BatchStatus> = None;
        let mut polls = 0u32;
        let mut consecutive_errors = 0u32;

        loop {
            match self.remote.batch_status(batch) {
                Ok(status) => {
                    polls += 1;
                    consecutive_errors = 0;
                    progress.report(ProgressEvent::Indexing(status.clone()));
                    if status.is_settled() {
                        return WaitOutcome::Settled { status, polls };
                    }
                    last = Some(status);
                }
                Err(error) => {
                    consecutive_errors += 1;
                    if !error.is_transient() || consecutive_errors > self.config.max_poll_errors
                    {
                        return WaitOutcome::FailedFatal { last, error };
                    }
                }
            }

            let elapsed = self.clock.now().saturating_sub(started);
            let pause = match self.config.deadline {
                Deadline::Unlimited => delay,
                Deadline::After(limit) => {
                    if elapsed >= limit {
                        return WaitOutcome::TimedOut { last, elapsed };
                    }
                    delay.min(limit - elapsed)
                }
            };
            self.clock.sleep(pause);
            delay = self.config.schedule.next(delay);
        }
    }
}
