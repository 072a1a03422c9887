//! Per-entry outcomes and the entry lifecycle.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Time;

/// Result of running one plan entry (or one attempt of it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The test passed
    Passed,
    /// The test ran and reported failure
    Failed,
    /// The attempt exceeded its time budget
    TimedOut,
    /// The backend could not run the test
    Errored,
    /// The attempt errored transiently and was re-queued
    Retried,
    /// Stopped by an external signal
    Cancelled,
}

impl Outcome {
    /// Terminal outcomes never change once recorded.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::Retried)
    }

    /// Whether this counts as a pass.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Passed)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Passed => write!(f, "passed"),
            Outcome::Failed => write!(f, "failed"),
            Outcome::TimedOut => write!(f, "timeout"),
            Outcome::Errored => write!(f, "error"),
            Outcome::Retried => write!(f, "retried"),
            Outcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Lifecycle of a plan entry.
///
/// ```text
/// Pending -> Running -> Done(Passed | Failed | Errored | TimedOut)
///               |
///               +-> Pending   (transient error, retry budget left)
/// Pending | Running -> Done(Cancelled)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Waiting for a worker
    Pending,
    /// An attempt is in flight
    Running,
    /// Finalized
    Done(Outcome),
}

/// Rejected state change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid entry transition: {from:?} -> {to}")]
pub struct InvalidTransition {
    /// State before the attempted change
    pub from: EntryState,
    /// What was attempted
    pub to: &'static str,
}

impl EntryState {
    /// Pending -> Running.
    pub fn start(&mut self) -> Result<(), InvalidTransition> {
        match self {
            EntryState::Pending => {
                *self = EntryState::Running;
                Ok(())
            }
            _ => Err(self.reject("running")),
        }
    }

    /// Running -> Done(outcome). `Retried` and `Cancelled` go through
    /// [`requeue`](Self::requeue) and [`cancel`](Self::cancel).
    pub fn finish(&mut self, outcome: Outcome) -> Result<(), InvalidTransition> {
        match (*self, outcome) {
            (EntryState::Running, Outcome::Retried | Outcome::Cancelled) => Err(self.reject("done")),
            (EntryState::Running, outcome) => {
                *self = EntryState::Done(outcome);
                Ok(())
            }
            _ => Err(self.reject("done")),
        }
    }

    /// Running -> Pending, after a transient error.
    pub fn requeue(&mut self) -> Result<(), InvalidTransition> {
        match self {
            EntryState::Running => {
                *self = EntryState::Pending;
                Ok(())
            }
            _ => Err(self.reject("pending")),
        }
    }

    /// Pending | Running -> Done(Cancelled).
    pub fn cancel(&mut self) -> Result<(), InvalidTransition> {
        match self {
            EntryState::Pending | EntryState::Running => {
                *self = EntryState::Done(Outcome::Cancelled);
                Ok(())
            }
            _ => Err(self.reject("cancelled")),
        }
    }

    /// The final outcome, once done.
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            EntryState::Done(outcome) => Some(*outcome),
            _ => None,
        }
    }

    fn reject(&self, to: &'static str) -> InvalidTransition {
        InvalidTransition { from: *self, to }
    }
}

/// One attempt at running an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    /// 1-based attempt number
    pub number: u32,
    /// What this attempt ended as
    pub outcome: Outcome,
    /// Wall time of the attempt
    pub duration: Duration,
    /// Exit code, error text or similar
    pub detail: Option<String>,
}

/// Finalized record of one plan entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryReport {
    /// Position in the plan
    pub index: usize,
    /// Case name
    pub case: String,
    /// Backend the case ran on
    pub backend: String,
    /// Terminal outcome
    pub outcome: Outcome,
    /// Attempt history, oldest first
    pub attempts: Vec<Attempt>,
    /// When the first attempt started (None if never started)
    pub started_at: Option<Time>,
    /// When the entry was finalized
    pub finished_at: Option<Time>,
    /// Total wall time across attempts
    pub duration: Duration,
}

impl EntryReport {
    /// Number of attempts that were re-queued.
    pub fn retries(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.outcome == Outcome::Retried)
            .count()
    }

    /// Detail of the last attempt, if any.
    pub fn last_detail(&self) -> Option<&str> {
        self.attempts.last().and_then(|a| a.detail.as_deref())
    }
}
