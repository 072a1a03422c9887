//! Test case model.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Backend capability a test case needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    /// Runs on any supported backend
    #[default]
    Any,
    /// Needs the pytest harness
    Pytest,
    /// Needs direct executable invocation
    DirectExec,
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Any => write!(f, "any backend"),
            Requirement::Pytest => write!(f, "pytest support"),
            Requirement::DirectExec => write!(f, "direct execution"),
        }
    }
}

/// A test case to schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Case name, unique within a run
    pub name: String,

    /// Built artifact (executable, pytest directory or build dir)
    pub artifact: PathBuf,

    /// Extra arguments passed to the backend invocation
    #[serde(default)]
    pub args: Vec<String>,

    /// Capability the backend must have
    #[serde(default)]
    pub requires: Requirement,
}

impl TestCase {
    /// Create a case that runs on any backend.
    pub fn new(name: impl Into<String>, artifact: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            artifact: artifact.into(),
            args: Vec::new(),
            requires: Requirement::Any,
        }
    }

    /// Set the required capability.
    pub fn requires(mut self, requirement: Requirement) -> Self {
        self.requires = requirement;
        self
    }

    /// Add an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}
