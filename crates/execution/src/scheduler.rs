//! Resource budget for dispatching plan entries.

use std::num::NonZeroUsize;
use std::time::Duration;

/// Budget for plan execution.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    /// Time budget per attempt
    pub timeout: Duration,
    /// Max concurrently running entries
    pub max_concurrent: NonZeroUsize,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_concurrent: std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl Budget {
    /// Create a new budget.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set time budget per attempt.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set max concurrent entries.
    pub fn with_max_concurrent(mut self, max: NonZeroUsize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Set max concurrent entries from a plain count; zero is treated as one.
    pub fn with_jobs(self, jobs: usize) -> Self {
        self.with_max_concurrent(NonZeroUsize::new(jobs).unwrap_or(NonZeroUsize::MIN))
    }
}
