//! Retry/recovery policy for plan entries.
//!
//! Only transient backend errors are retried; a test that ran and failed is
//! a real failure. Timeouts are retried only when the policy opts in.

use std::time::Duration;

use simrun_core::{EntryState, InvalidTransition, Outcome};
use tracing::debug;

/// Retry limits.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Re-queues allowed per entry
    pub max_retries: u32,
    /// Treat timeouts as transient
    pub retry_timeouts: bool,
    /// Pause before a re-queued attempt
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_timeouts: false,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Set the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Opt timeouts into retries.
    pub fn with_retry_timeouts(mut self, retry_timeouts: bool) -> Self {
        self.retry_timeouts = retry_timeouts;
        self
    }

    /// Set the backoff between attempts.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

/// What to do after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Entry went back to pending
    Retry,
    /// Entry is done with this outcome
    Finalize(Outcome),
}

/// Drives one entry through its lifecycle.
#[derive(Debug)]
pub struct RetryController {
    policy: RetryPolicy,
    state: EntryState,
    attempts: u32,
    retries: u32,
}

impl RetryController {
    /// A controller for a fresh, pending entry.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: EntryState::Pending,
            attempts: 0,
            retries: 0,
        }
    }

    /// Pending -> Running. Returns the 1-based attempt number.
    pub fn begin_attempt(&mut self) -> Result<u32, InvalidTransition> {
        self.state.start()?;
        self.attempts += 1;
        Ok(self.attempts)
    }

    /// Record how the running attempt ended.
    ///
    /// `transient` is only consulted for [`Outcome::Errored`].
    pub fn record(&mut self, outcome: Outcome, transient: bool) -> Result<Verdict, InvalidTransition> {
        let retryable = match outcome {
            Outcome::Errored => transient,
            Outcome::TimedOut => self.policy.retry_timeouts,
            _ => false,
        };

        if retryable && self.retries < self.policy.max_retries {
            self.state.requeue()?;
            self.retries += 1;
            debug!("Re-queued after {} (retry {}/{})", outcome, self.retries, self.policy.max_retries);
            return Ok(Verdict::Retry);
        }

        self.state.finish(outcome)?;
        Ok(Verdict::Finalize(outcome))
    }

    /// Stop the entry. No further attempts are made.
    pub fn cancel(&mut self) -> Result<(), InvalidTransition> {
        self.state.cancel()
    }

    /// Current state.
    pub fn state(&self) -> EntryState {
        self.state
    }

    /// Attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Backoff before the next attempt.
    pub fn backoff(&self) -> Duration {
        self.policy.backoff
    }
}
