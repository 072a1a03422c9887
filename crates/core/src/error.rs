//! Error taxonomy for configuration, validation and planning.
//!
//! Per-entry failures (timeouts, launch errors, cancellation) are not errors
//! here; they are recorded as [`Outcome`](crate::Outcome)s on the entry.

use std::path::PathBuf;

use crate::case::Requirement;

/// Result type for simrun operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Configuration problems detected before anything runs.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The base directory variable is unset or empty
    #[error("${0} environment variable undefined")]
    MissingBaseDir(&'static str),

    /// The base directory could not be resolved
    #[error("cannot resolve base directory {path}: {source}")]
    InvalidBaseDir {
        /// Path as supplied
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// The base directory exists but is not a directory
    #[error("base directory {0} is not a directory")]
    NotADirectory(PathBuf),

    /// A capability subset names a backend the supported set lacks
    #[error("{subset} backend '{backend}' is not in the supported set")]
    InconsistentRegistry {
        /// Which subset carried the stray id
        subset: &'static str,
        /// The stray id
        backend: String,
    },

    /// A backend appears twice in the supported set
    #[error("backend '{0}' listed more than once")]
    DuplicateBackend(String),
}

/// Errors that abort a run before any plan entry executes.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or invalid environment / static configuration
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Requested backend is not in the supported set
    #[error("unsupported backend '{0}'")]
    UnsupportedBackend(String),

    /// A case needs a capability the chosen backend lacks
    #[error("case '{case}' requires {required} but backend '{backend}' does not support it")]
    CapabilityMismatch {
        /// Offending case name
        case: String,
        /// Backend the plan targeted
        backend: String,
        /// What the case needed
        required: Requirement,
    },
}

impl Error {
    /// Whether this is a configuration failure (as opposed to a rejected request).
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}
