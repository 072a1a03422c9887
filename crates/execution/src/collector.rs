//! Result collection - folds entry reports into a run summary.

use serde::{Deserialize, Serialize};
use simrun_core::{EntryReport, Outcome};

/// Per-outcome tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    /// Entries that passed
    pub passed: usize,
    /// Entries that failed
    pub failed: usize,
    /// Entries that timed out
    pub timed_out: usize,
    /// Entries the backend could not run
    pub errored: usize,
    /// Entries stopped by cancellation
    pub cancelled: usize,
}

impl OutcomeCounts {
    fn add(mut self, outcome: Outcome) -> Self {
        match outcome {
            Outcome::Passed => self.passed += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::TimedOut => self.timed_out += 1,
            Outcome::Errored => self.errored += 1,
            Outcome::Cancelled => self.cancelled += 1,
            // Reports only carry terminal outcomes.
            Outcome::Retried => {}
        }
        self
    }

    /// Sum of all tallies.
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.timed_out + self.errored + self.cancelled
    }
}

/// Aggregated result of one run, entries in plan order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Entry reports, one per plan entry
    pub entries: Vec<EntryReport>,
    /// Outcome tallies
    pub counts: OutcomeCounts,
    /// Re-queued attempts across all entries
    pub retries: usize,
}

impl RunSummary {
    /// True when every entry passed. An empty run counts as a success.
    pub fn success(&self) -> bool {
        self.counts.passed == self.entries.len()
    }

    /// Entries that did not pass.
    pub fn problems(&self) -> impl Iterator<Item = &EntryReport> {
        self.entries.iter().filter(|e| !e.outcome.is_success())
    }
}

/// Folds dispatcher output into a [`RunSummary`].
pub struct ResultCollector;

impl ResultCollector {
    /// Create a new collector.
    pub fn new() -> Self {
        Self
    }

    /// Summarize `reports`. Order is preserved; nothing is dropped.
    pub fn collect(&self, reports: Vec<EntryReport>) -> RunSummary {
        let (counts, retries) = reports
            .iter()
            .fold((OutcomeCounts::default(), 0), |(counts, retries), report| {
                (counts.add(report.outcome), retries + report.retries())
            });

        RunSummary {
            entries: reports,
            counts,
            retries,
        }
    }
}

impl Default for ResultCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simrun_core::Attempt;
    use std::time::Duration;

    fn report(index: usize, outcome: Outcome, retries: usize) -> EntryReport {
        let mut attempts: Vec<Attempt> = (0..retries)
            .map(|i| Attempt {
                number: i as u32 + 1,
                outcome: Outcome::Retried,
                duration: Duration::from_millis(1),
                detail: None,
            })
            .collect();
        attempts.push(Attempt {
            number: retries as u32 + 1,
            outcome,
            duration: Duration::from_millis(1),
            detail: None,
        });

        EntryReport {
            index,
            case: format!("case-{index}"),
            backend: "qemu".to_string(),
            outcome,
            attempts,
            started_at: None,
            finished_at: None,
            duration: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_collect_counts_and_order() {
        let reports = vec![
            report(0, Outcome::Passed, 0),
            report(1, Outcome::Failed, 0),
            report(2, Outcome::Errored, 2),
            report(3, Outcome::TimedOut, 0),
            report(4, Outcome::Cancelled, 0),
            report(5, Outcome::Passed, 1),
        ];

        let summary = ResultCollector::new().collect(reports);

        assert_eq!(summary.entries.len(), 6);
        assert_eq!(summary.counts.total(), 6);
        assert_eq!(summary.counts.passed, 2);
        assert_eq!(summary.counts.failed, 1);
        assert_eq!(summary.counts.errored, 1);
        assert_eq!(summary.counts.timed_out, 1);
        assert_eq!(summary.counts.cancelled, 1);
        assert_eq!(summary.retries, 3);
        assert!(!summary.success());

        let indices: Vec<_> = summary.entries.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(summary.problems().count(), 4);
    }

    #[test]
    fn test_all_passed_is_success() {
        let summary = ResultCollector::new().collect(vec![report(0, Outcome::Passed, 0)]);
        assert!(summary.success());
        assert!(ResultCollector::new().collect(Vec::new()).success());
    }
}
