//! The execution engine - validate, plan, dispatch, collect.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use simrun_core::{BackendRegistry, Result, RunId, TestCase, Time};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::collector::{ResultCollector, RunSummary};
use crate::dispatcher::Dispatcher;
use crate::launcher::BackendLauncher;
use crate::plan::{ExecutionPlan, PlanBuilder};
use crate::retry::RetryPolicy;
use crate::scheduler::Budget;

/// Configuration for the execution engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineConfig {
    /// Concurrency and per-attempt timeout
    pub budget: Budget,
    /// Retry behaviour for transient failures
    pub retry: RetryPolicy,
}

/// One finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Run identifier
    pub run_id: RunId,
    /// Backend every entry ran on
    pub backend: String,
    /// When dispatch started
    pub started_at: Time,
    /// When the last entry finished
    pub finished_at: Time,
    /// Aggregated results
    #[serde(flatten)]
    pub summary: RunSummary,
}

impl RunReport {
    /// Write the report as pretty JSON.
    pub async fn write_json(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("writing report to {}", path.display()))
    }
}

/// The main execution engine.
///
/// Runs one invocation end to end:
/// ```text
/// Validate backend → Build plan → Dispatch → Collect
/// ```
/// Validation and planning errors are returned before anything launches.
pub struct ExecutionEngine {
    registry: Arc<BackendRegistry>,
    launcher: Arc<dyn BackendLauncher>,
    builder: PlanBuilder,
    collector: ResultCollector,
    config: EngineConfig,
}

impl ExecutionEngine {
    /// Create a new execution engine.
    pub fn new(registry: Arc<BackendRegistry>, launcher: Arc<dyn BackendLauncher>) -> Self {
        Self {
            registry,
            launcher,
            builder: PlanBuilder::new(),
            collector: ResultCollector::new(),
            config: EngineConfig::default(),
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// The registry backends are validated against.
    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Validate `backend` and build a plan for `cases`.
    pub fn plan(&self, cases: Vec<TestCase>, backend: &str) -> Result<ExecutionPlan> {
        let backend = self.registry.validate(backend)?;
        self.builder.build(cases, &backend)
    }

    /// Run `cases` on `backend`.
    pub async fn run(&self, cases: Vec<TestCase>, backend: &str, cancel: CancellationToken) -> Result<RunReport> {
        let plan = self.plan(cases, backend)?;
        let run_id = RunId::new();
        let started_at = chrono::Utc::now();

        let dispatcher = Dispatcher::new(Arc::clone(&self.launcher))
            .with_budget(self.config.budget)
            .with_retry_policy(self.config.retry);
        let reports = dispatcher.run_as(run_id, plan, cancel).await;
        let summary = self.collector.collect(reports);

        info!(
            "{}: {} passed, {} failed, {} timed out, {} errored, {} cancelled",
            run_id,
            summary.counts.passed,
            summary.counts.failed,
            summary.counts.timed_out,
            summary.counts.errored,
            summary.counts.cancelled
        );

        Ok(RunReport {
            run_id,
            backend: backend.to_string(),
            started_at,
            finished_at: chrono::Utc::now(),
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::{Completion, LaunchError};
    use crate::plan::PlanEntry;
    use async_trait::async_trait;
    use simrun_core::{Error, Outcome, Requirement};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingLauncher {
        launched: AtomicUsize,
    }

    #[async_trait]
    impl BackendLauncher for CountingLauncher {
        fn name(&self) -> &str {
            "counting"
        }

        async fn launch(&self, entry: &PlanEntry) -> std::result::Result<Completion, LaunchError> {
            self.launched.fetch_add(1, Ordering::SeqCst);
            if entry.case.name.starts_with("fail") {
                Ok(Completion::Failed {
                    exit_code: Some(2),
                    detail: String::new(),
                })
            } else {
                Ok(Completion::Passed)
            }
        }
    }

    fn engine(launcher: Arc<CountingLauncher>) -> ExecutionEngine {
        ExecutionEngine::new(BackendRegistry::builtin(), launcher).with_config(EngineConfig {
            budget: Budget::new().with_jobs(2).with_timeout(Duration::from_secs(5)),
            retry: RetryPolicy::none(),
        })
    }

    #[tokio::test]
    async fn test_run_end_to_end() {
        let launcher = Arc::new(CountingLauncher::default());
        let cases = vec![
            TestCase::new("a", "out/a").requires(Requirement::DirectExec),
            TestCase::new("fail-b", "out/b"),
            TestCase::new("c", "out/c"),
        ];

        let report = engine(Arc::clone(&launcher))
            .run(cases, "native", CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.backend, "native");
        assert_eq!(report.summary.entries.len(), 3);
        assert_eq!(report.summary.counts.passed, 2);
        assert_eq!(report.summary.counts.failed, 1);
        assert_eq!(report.summary.entries[1].outcome, Outcome::Failed);
        assert!(report.finished_at >= report.started_at);
        assert_eq!(launcher.launched.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unsupported_backend_aborts_before_launch() {
        let launcher = Arc::new(CountingLauncher::default());
        let err = engine(Arc::clone(&launcher))
            .run(vec![TestCase::new("a", "out/a")], "bogus", CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UnsupportedBackend(_)));
        assert_eq!(launcher.launched.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_capability_mismatch_aborts_before_launch() {
        let launcher = Arc::new(CountingLauncher::default());
        let cases = vec![
            TestCase::new("a", "out/a"),
            TestCase::new("b", "out/b").requires(Requirement::DirectExec),
        ];

        let err = engine(Arc::clone(&launcher))
            .run(cases, "qemu", CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::CapabilityMismatch { .. }));
        assert_eq!(launcher.launched.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_report_serializes_flat() {
        let launcher = Arc::new(CountingLauncher::default());
        let report = engine(launcher)
            .run(vec![TestCase::new("a", "out/a")], "qemu", CancellationToken::new())
            .await
            .unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["backend"], "qemu");
        assert_eq!(json["counts"]["passed"], 1);
        assert_eq!(json["run_id"], report.run_id.to_string());
    }

    #[tokio::test]
    async fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = engine(Arc::new(CountingLauncher::default()))
            .run(vec![TestCase::new("fail-a", "out/a")], "qemu", CancellationToken::new())
            .await
            .unwrap();

        report.write_json(&path).await.unwrap();

        let written: RunReport = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.run_id, report.run_id);
        assert_eq!(written.backend, "qemu");
        assert_eq!(written.started_at, report.started_at);
        assert_eq!(written.summary.counts, report.summary.counts);
        assert_eq!(written.summary.entries[0].outcome, Outcome::Failed);
    }
}
