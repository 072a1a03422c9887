//! Execution layer - plan building, dispatch, retries and result collection.

#![warn(missing_docs)]

pub mod plan;
pub mod launcher;
pub mod retry;
pub mod scheduler;
pub mod dispatcher;
pub mod collector;
pub mod engine;

pub use plan::{ExecutionPlan, PlanBuilder, PlanEntry};
pub use launcher::{BackendLauncher, Completion, LaunchError, LauncherConfig, ProcessLauncher};
pub use retry::{RetryController, RetryPolicy, Verdict};
pub use scheduler::Budget;
pub use dispatcher::Dispatcher;
pub use collector::{ResultCollector, RunSummary, OutcomeCounts};
pub use engine::{ExecutionEngine, EngineConfig, RunReport};

pub use tokio_util::sync::CancellationToken;
