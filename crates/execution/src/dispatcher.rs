//! Dispatcher - runs plan entries with bounded parallelism.
//!
//! Every entry runs as its own task. A semaphore caps how many attempts are
//! in flight; a re-queued entry gives its permit back and waits again like
//! any other pending entry. Reports come back in plan order no matter which
//! entry finishes first.

use std::sync::Arc;
use std::time::{Duration, Instant};

use simrun_core::{Attempt, EntryReport, InvalidTransition, Outcome, RunId, Time};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::launcher::{BackendLauncher, Completion};
use crate::plan::{ExecutionPlan, PlanEntry};
use crate::retry::{RetryController, RetryPolicy, Verdict};
use crate::scheduler::Budget;

/// Runs execution plans against a launcher.
#[derive(Clone)]
pub struct Dispatcher {
    launcher: Arc<dyn BackendLauncher>,
    budget: Budget,
    retry: RetryPolicy,
}

impl Dispatcher {
    /// Create a dispatcher with the default budget and retry policy.
    pub fn new(launcher: Arc<dyn BackendLauncher>) -> Self {
        Self {
            launcher,
            budget: Budget::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Set the concurrency limit and per-attempt timeout.
    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    /// Set the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run every entry of `plan`. One report per entry, in plan order.
    ///
    /// Cancelling `cancel` stops in-flight attempts and marks every entry
    /// that has not finished as [`Outcome::Cancelled`].
    pub async fn run(&self, plan: ExecutionPlan, cancel: CancellationToken) -> Vec<EntryReport> {
        self.run_as(RunId::new(), plan, cancel).await
    }

    /// Like [`run`](Self::run), logging under a caller-chosen run id.
    pub async fn run_as(&self, run_id: RunId, plan: ExecutionPlan, cancel: CancellationToken) -> Vec<EntryReport> {
        let total = plan.len();
        info!(
            "{}: dispatching {} entries via {} (jobs={}, timeout={:?})",
            run_id,
            total,
            self.launcher.name(),
            self.budget.max_concurrent,
            self.budget.timeout
        );

        let semaphore = Arc::new(Semaphore::new(self.budget.max_concurrent.get()));
        let mut labels = Vec::with_capacity(total);
        let mut workers = JoinSet::new();

        for entry in plan.into_entries() {
            labels.push((entry.case.name.clone(), entry.backend.to_string()));
            let worker = Worker {
                entry,
                launcher: Arc::clone(&self.launcher),
                semaphore: Arc::clone(&semaphore),
                cancel: cancel.clone(),
                timeout: self.budget.timeout,
                controller: RetryController::new(self.retry),
            };
            workers.spawn(worker.run());
        }

        let mut slots: Vec<Option<EntryReport>> = (0..total).map(|_| None).collect();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(report) => {
                    let index = report.index;
                    if let Some(slot) = slots.get_mut(index) {
                        *slot = Some(report);
                    }
                }
                Err(e) => error!("{}: entry worker failed: {}", run_id, e),
            }
        }

        slots
            .into_iter()
            .zip(labels)
            .enumerate()
            .map(|(index, (slot, (case, backend)))| {
                slot.unwrap_or_else(|| lost_report(index, case, backend))
            })
            .collect()
    }
}

fn lost_report(index: usize, case: String, backend: String) -> EntryReport {
    EntryReport {
        index,
        case,
        backend,
        outcome: Outcome::Errored,
        attempts: vec![Attempt {
            number: 1,
            outcome: Outcome::Errored,
            duration: Duration::ZERO,
            detail: Some("entry worker panicked".to_string()),
        }],
        started_at: None,
        finished_at: Some(chrono::Utc::now()),
        duration: Duration::ZERO,
    }
}

/// Everything one entry needs; owned by its task.
struct Worker {
    entry: PlanEntry,
    launcher: Arc<dyn BackendLauncher>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    timeout: Duration,
    controller: RetryController,
}

/// Accumulates the report while a worker runs.
struct Progress {
    attempts: Vec<Attempt>,
    started_at: Option<Time>,
    elapsed: Duration,
}

impl Worker {
    async fn run(mut self) -> EntryReport {
        let mut progress = Progress {
            attempts: Vec::new(),
            started_at: None,
            elapsed: Duration::ZERO,
        };

        let outcome = match self.drive(&mut progress).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("{}: {}", self.entry.case.name, e);
                Outcome::Errored
            }
        };

        EntryReport {
            index: self.entry.index,
            case: self.entry.case.name,
            backend: self.entry.backend.to_string(),
            outcome,
            attempts: progress.attempts,
            started_at: progress.started_at,
            finished_at: Some(chrono::Utc::now()),
            duration: progress.elapsed,
        }
    }

    async fn drive(&mut self, progress: &mut Progress) -> Result<Outcome, InvalidTransition> {
        loop {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = Arc::clone(&self.semaphore).acquire_owned() => permit.ok(),
            };
            let Some(_permit) = permit else {
                self.controller.cancel()?;
                debug!("{}: cancelled before start", self.entry.case.name);
                return Ok(Outcome::Cancelled);
            };

            let number = self.controller.begin_attempt()?;
            progress.started_at.get_or_insert_with(chrono::Utc::now);
            debug!("{}: attempt {} on {}", self.entry.case.name, number, self.entry.backend);

            let start = Instant::now();
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                r = tokio::time::timeout(self.timeout, self.launcher.launch(&self.entry)) => Some(r),
            };
            let duration = start.elapsed();
            progress.elapsed += duration;

            let (outcome, transient, detail) = match result {
                None => {
                    self.controller.cancel()?;
                    progress.attempts.push(Attempt {
                        number,
                        outcome: Outcome::Cancelled,
                        duration,
                        detail: Some("cancelled while running".to_string()),
                    });
                    info!("{}: cancelled", self.entry.case.name);
                    return Ok(Outcome::Cancelled);
                }
                Some(Err(_)) => (
                    Outcome::TimedOut,
                    false,
                    Some(format!("no result within {:?}", self.timeout)),
                ),
                Some(Ok(Ok(Completion::Passed))) => (Outcome::Passed, false, None),
                Some(Ok(Ok(Completion::Failed { exit_code, detail }))) => {
                    let code = exit_code.map_or_else(|| "?".to_string(), |c| c.to_string());
                    (Outcome::Failed, false, Some(format!("exit code {code}: {detail}")))
                }
                Some(Ok(Err(e))) => (Outcome::Errored, e.is_transient(), Some(e.to_string())),
            };

            match self.controller.record(outcome, transient)? {
                Verdict::Retry => {
                    warn!("{}: attempt {} {}, retrying", self.entry.case.name, number, outcome);
                    progress.attempts.push(Attempt {
                        number,
                        outcome: Outcome::Retried,
                        duration,
                        detail,
                    });
                    drop(_permit);

                    let backoff = self.controller.backoff();
                    if !backoff.is_zero() {
                        tokio::select! {
                            biased;
                            _ = self.cancel.cancelled() => {}
                            _ = tokio::time::sleep(backoff) => {}
                        }
                    }
                }
                Verdict::Finalize(outcome) => {
                    info!("{}: {}", self.entry.case.name, outcome);
                    progress.attempts.push(Attempt {
                        number,
                        outcome,
                        duration,
                        detail,
                    });
                    return Ok(outcome);
                }
            }
        }
    }
}
