//! Backend registry - the supported simulator/emulator set and its capabilities.

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::Serialize;

use crate::case::Requirement;
use crate::error::{ConfigError, Error, Result};

/// Every backend the scheduler knows how to drive.
pub const SUPPORTED_BACKENDS: &[&str] = &[
    "mdb-nsim",
    "nsim",
    "renode",
    "qemu",
    "tsim",
    "armfvp",
    "xt-sim",
    "native",
    "custom",
    "simics",
];

/// Backends usable under the pytest harness.
pub const PYTEST_BACKENDS: &[&str] = &["native", "qemu"];

/// Backends whose artifacts can be invoked directly as executables.
pub const EXEC_BACKENDS: &[&str] = &["nsim", "mdb-nsim", "renode", "tsim", "native", "simics", "custom"];

/// What a backend can do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Capability {
    /// Runs under the pytest harness
    pub pytest: bool,
    /// Artifacts can be executed directly
    pub exec: bool,
}

impl Capability {
    /// Whether this capability satisfies a case requirement.
    pub fn satisfies(&self, requirement: Requirement) -> bool {
        match requirement {
            Requirement::Any => true,
            Requirement::Pytest => self.pytest,
            Requirement::DirectExec => self.exec,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = |b: bool| if b { "yes" } else { "no" };
        write!(f, "pytest={} exec={}", mark(self.pytest), mark(self.exec))
    }
}

/// A backend identifier that has been checked against a registry.
///
/// Only [`BackendRegistry::validate`] hands these out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BackendId {
    name: String,
    capability: Capability,
}

impl BackendId {
    /// Backend name.
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Capabilities recorded at validation time.
    pub fn capability(&self) -> Capability {
        self.capability
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Read-only lookup over the supported backend tables.
#[derive(Debug, Clone)]
pub struct BackendRegistry {
    // Table order is kept for listing.
    entries: Vec<(String, Capability)>,
}

impl BackendRegistry {
    /// Build a registry from custom tables.
    ///
    /// Fails when a subset names a backend outside the supported set.
    pub fn new<S: AsRef<str>>(supported: &[S], pytest: &[S], exec: &[S]) -> Result<Self> {
        let mut entries: Vec<(String, Capability)> = Vec::with_capacity(supported.len());
        for id in supported {
            let id = id.as_ref();
            if entries.iter().any(|(name, _)| name == id) {
                return Err(ConfigError::DuplicateBackend(id.to_string()).into());
            }
            entries.push((id.to_string(), Capability::default()));
        }

        for (subset, ids) in [("pytest", pytest), ("exec", exec)] {
            for id in ids {
                let id = id.as_ref();
                let Some((_, cap)) = entries.iter_mut().find(|(name, _)| name == id) else {
                    return Err(ConfigError::InconsistentRegistry {
                        subset,
                        backend: id.to_string(),
                    }
                    .into());
                };
                match subset {
                    "pytest" => cap.pytest = true,
                    _ => cap.exec = true,
                }
            }
        }

        Ok(Self { entries })
    }

    /// Handle to the process-wide registry built from the built-in tables.
    pub fn builtin() -> Arc<BackendRegistry> {
        static BUILTIN: OnceLock<Arc<BackendRegistry>> = OnceLock::new();
        let registry = BUILTIN.get_or_init(|| {
            let entries = SUPPORTED_BACKENDS
                .iter()
                .map(|id| {
                    let capability = Capability {
                        pytest: PYTEST_BACKENDS.contains(id),
                        exec: EXEC_BACKENDS.contains(id),
                    };
                    (id.to_string(), capability)
                })
                .collect();
            Arc::new(BackendRegistry { entries })
        });
        Arc::clone(registry)
    }

    /// Check `id` against the supported set.
    pub fn validate(&self, id: &str) -> Result<BackendId> {
        self.lookup(id)
            .map(|capability| BackendId {
                name: id.to_string(),
                capability,
            })
            .ok_or_else(|| Error::UnsupportedBackend(id.to_string()))
    }

    /// Capabilities of `id`.
    pub fn capabilities(&self, id: &str) -> Result<Capability> {
        self.lookup(id)
            .ok_or_else(|| Error::UnsupportedBackend(id.to_string()))
    }

    /// All supported backends, in table order.
    pub fn backends(&self) -> impl Iterator<Item = (&str, Capability)> {
        self.entries.iter().map(|(name, cap)| (name.as_str(), *cap))
    }

    /// Backends usable under the pytest harness.
    pub fn pytest_backends(&self) -> Vec<&str> {
        self.backends().filter(|(_, c)| c.pytest).map(|(n, _)| n).collect()
    }

    /// Backends supporting direct execution.
    pub fn exec_backends(&self) -> Vec<&str> {
        self.backends().filter(|(_, c)| c.exec).map(|(n, _)| n).collect()
    }

    /// Number of supported backends.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, id: &str) -> Option<Capability> {
        self.entries
            .iter()
            .find(|(name, _)| name == id)
            .map(|(_, cap)| *cap)
    }
}
