//! Execution plan building.

use simrun_core::{BackendId, Error, Result, TestCase};
use tracing::debug;

/// One (test case, backend) pairing scheduled for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    /// Position in the plan
    pub index: usize,
    /// The case to run
    pub case: TestCase,
    /// Backend to run it on
    pub backend: BackendId,
}

/// An ordered, capability-checked sequence of plan entries.
///
/// Only [`PlanBuilder`] constructs plans, so every entry's backend is known
/// to satisfy its case's requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    entries: Vec<PlanEntry>,
}

impl ExecutionPlan {
    /// Entries in plan order.
    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the plan is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consume the plan.
    pub fn into_entries(self) -> Vec<PlanEntry> {
        self.entries
    }
}

/// Builds execution plans.
pub struct PlanBuilder;

impl PlanBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self
    }

    /// Pair every case with `backend`, keeping the order of `cases`.
    ///
    /// Fails on the first case whose requirement the backend cannot meet;
    /// no partial plan is returned.
    pub fn build(&self, cases: Vec<TestCase>, backend: &BackendId) -> Result<ExecutionPlan> {
        let capability = backend.capability();

        if let Some(case) = cases.iter().find(|c| !capability.satisfies(c.requires)) {
            return Err(Error::CapabilityMismatch {
                case: case.name.clone(),
                backend: backend.to_string(),
                required: case.requires,
            });
        }

        let entries: Vec<_> = cases
            .into_iter()
            .enumerate()
            .map(|(index, case)| PlanEntry {
                index,
                case,
                backend: backend.clone(),
            })
            .collect();

        debug!("Built plan with {} entries on {}", entries.len(), backend);
        Ok(ExecutionPlan { entries })
    }
}

impl Default for PlanBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simrun_core::{BackendRegistry, Requirement};

    fn cases() -> Vec<TestCase> {
        vec![
            TestCase::new("a", "out/a"),
            TestCase::new("b", "out/b").requires(Requirement::DirectExec),
            TestCase::new("c", "out/c"),
        ]
    }

    #[test]
    fn test_build_preserves_order() {
        let native = BackendRegistry::builtin().validate("native").unwrap();
        let plan = PlanBuilder::new().build(cases(), &native).unwrap();

        assert_eq!(plan.len(), 3);
        let names: Vec<_> = plan.entries().iter().map(|e| e.case.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        for (i, entry) in plan.entries().iter().enumerate() {
            assert_eq!(entry.index, i);
            assert_eq!(entry.backend, native);
        }
    }

    #[test]
    fn test_exec_case_on_non_exec_backend_fails() {
        let registry = BackendRegistry::new(&["native", "qemu"], &["native", "qemu"], &["native"]).unwrap();
        let qemu = registry.validate("qemu").unwrap();

        let err = PlanBuilder::new().build(cases(), &qemu).unwrap_err();
        match err {
            Error::CapabilityMismatch { case, backend, required } => {
                assert_eq!(case, "b");
                assert_eq!(backend, "qemu");
                assert_eq!(required, Requirement::DirectExec);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_pytest_case_on_exec_only_backend_fails() {
        let renode = BackendRegistry::builtin().validate("renode").unwrap();
        let cases = vec![TestCase::new("p", "tests/pytest").requires(Requirement::Pytest)];

        assert!(matches!(
            PlanBuilder::new().build(cases, &renode),
            Err(Error::CapabilityMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_plan() {
        let qemu = BackendRegistry::builtin().validate("qemu").unwrap();
        let plan = PlanBuilder::new().build(Vec::new(), &qemu).unwrap();
        assert!(plan.is_empty());
    }
}
