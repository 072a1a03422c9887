//! simrun core data models.
//!
//! This crate defines the static backend configuration and the data
//! structures shared by the scheduler: validated backend identifiers,
//! test cases, per-entry outcomes and the error taxonomy.

#![warn(missing_docs)]

// Core identities
mod id;

// Environment and static configuration
mod env;
mod backend;

// Test execution
mod case;
mod outcome;

mod error;

// Re-exports
pub use id::*;

pub use env::{BaseDir, BASE_DIR_VAR};
pub use backend::{
    BackendId, BackendRegistry, Capability,
    SUPPORTED_BACKENDS, PYTEST_BACKENDS, EXEC_BACKENDS,
};
pub use case::{TestCase, Requirement};
pub use outcome::{Outcome, EntryState, Attempt, EntryReport, InvalidTransition};
pub use error::{Error, ConfigError, Result};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
