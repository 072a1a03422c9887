//! Backend process launching.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use simrun_core::{BaseDir, Requirement, BASE_DIR_VAR};
use tokio::process::Command;
use tracing::debug;

use crate::plan::PlanEntry;

/// How a launched test finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Exit status zero
    Passed,
    /// The test ran and reported failure
    Failed {
        /// Process exit code
        exit_code: Option<i32>,
        /// Tail of the captured output
        detail: String,
    },
}

/// The backend could not run the test.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LaunchError {
    /// Worth retrying (simulator failed to come up, died on a signal, ...)
    #[error("transient launch failure: {0}")]
    Transient(String),

    /// Retrying will not help
    #[error("launch failure: {0}")]
    Fatal(String),
}

impl LaunchError {
    /// Whether the retry controller may re-queue the entry.
    pub fn is_transient(&self) -> bool {
        matches!(self, LaunchError::Transient(_))
    }
}

/// Starts a backend for one plan entry and waits for it to finish.
///
/// Implementations must stop the backend when the returned future is
/// dropped; the dispatcher relies on that for timeouts and cancellation.
#[async_trait]
pub trait BackendLauncher: Send + Sync {
    /// Launcher name, for logs.
    fn name(&self) -> &str;

    /// Run `entry` to completion.
    async fn launch(&self, entry: &PlanEntry) -> Result<Completion, LaunchError>;
}

/// Settings for [`ProcessLauncher`].
#[derive(Debug, Clone)]
pub struct LauncherConfig {
    /// Program used for pytest-harness cases
    pub pytest_program: String,

    /// Command for cases on backends without direct execution.
    /// `{backend}` and `{artifact}` are substituted.
    pub runner_template: Vec<String>,

    /// Exported to children as `ZEPHYR_BASE` (raw form)
    pub base_dir: Option<BaseDir>,

    /// Extra environment variables
    pub env: HashMap<String, String>,

    /// Working directory for children
    pub work_dir: Option<PathBuf>,

    /// How many trailing output lines to keep on failure
    pub detail_lines: usize,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            pytest_program: "pytest".to_string(),
            runner_template: vec![
                "west".to_string(),
                "build".to_string(),
                "-d".to_string(),
                "{artifact}".to_string(),
                "-t".to_string(),
                "run".to_string(),
            ],
            base_dir: None,
            env: HashMap::new(),
            work_dir: None,
            detail_lines: 20,
        }
    }
}

impl LauncherConfig {
    /// Set the base directory exported to children.
    pub fn with_base_dir(mut self, base_dir: BaseDir) -> Self {
        self.base_dir = Some(base_dir);
        self
    }

    /// Set the runner template.
    pub fn with_runner_template(mut self, template: Vec<String>) -> Self {
        self.runner_template = template;
        self
    }

    /// Set the pytest program.
    pub fn with_pytest_program(mut self, program: impl Into<String>) -> Self {
        self.pytest_program = program.into();
        self
    }

    /// Add an environment variable for children.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Run children in `dir`.
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }
}

/// Launches backends as child processes.
pub struct ProcessLauncher {
    config: LauncherConfig,
}

impl ProcessLauncher {
    /// Create a new launcher.
    pub fn new(config: LauncherConfig) -> Self {
        Self { config }
    }

    /// The argv used for `entry`.
    pub fn command_for(&self, entry: &PlanEntry) -> Result<Vec<String>, LaunchError> {
        let artifact = entry.case.artifact.display().to_string();
        let backend = entry.backend.as_str();
        let capability = entry.backend.capability();

        let mut argv = match entry.case.requires {
            Requirement::DirectExec => vec![artifact],
            Requirement::Any if capability.exec => vec![artifact],
            Requirement::Pytest => vec![
                self.config.pytest_program.clone(),
                artifact,
                format!("--device-type={backend}"),
            ],
            Requirement::Any => {
                if self.config.runner_template.is_empty() {
                    return Err(LaunchError::Fatal(format!("no runner configured for backend '{backend}'")));
                }
                self.config
                    .runner_template
                    .iter()
                    .map(|part| part.replace("{backend}", backend).replace("{artifact}", &artifact))
                    .collect()
            }
        };

        argv.extend(entry.case.args.iter().cloned());
        Ok(argv)
    }

    fn tail(&self, stdout: &[u8], stderr: &[u8]) -> String {
        let text = if stderr.is_empty() { stdout } else { stderr };
        let text = String::from_utf8_lossy(text);
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(self.config.detail_lines);
        lines[start..].join("\n")
    }
}

impl Default for ProcessLauncher {
    fn default() -> Self {
        Self::new(LauncherConfig::default())
    }
}

#[async_trait]
impl BackendLauncher for ProcessLauncher {
    fn name(&self) -> &str {
        "process"
    }

    async fn launch(&self, entry: &PlanEntry) -> Result<Completion, LaunchError> {
        let argv = self.command_for(entry)?;
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| LaunchError::Fatal("empty command".to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        if let Some(base) = &self.config.base_dir {
            cmd.env(BASE_DIR_VAR, base.raw());
        }
        for (k, v) in &self.config.env {
            cmd.env(k, v);
        }
        if let Some(dir) = &self.config.work_dir {
            cmd.current_dir(dir);
        }

        debug!("Launching {} on {}: {:?}", entry.case.name, entry.backend, argv);

        let child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                LaunchError::Fatal(format!("{program}: {e}"))
            }
            _ => LaunchError::Transient(format!("{program}: {e}")),
        })?;
        #[cfg(unix)]
        let _group = ProcessGroup::new(child.id());

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| LaunchError::Transient(format!("{program}: {e}")))?;

        match output.status.code() {
            Some(0) => Ok(Completion::Passed),
            Some(code) => Ok(Completion::Failed {
                exit_code: Some(code),
                detail: self.tail(&output.stdout, &output.stderr),
            }),
            None => Err(LaunchError::Transient(format!(
                "{} terminated by signal",
                entry.case.name
            ))),
        }
    }
}

/// Kills a child's whole process group when dropped.
///
/// Runners like `west` start the simulator as a grandchild, which
/// `kill_on_drop` alone would leave running after a timeout.
#[cfg(unix)]
struct ProcessGroup(Option<libc::pid_t>);

#[cfg(unix)]
impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self(pid.and_then(|pid| libc::pid_t::try_from(pid).ok()))
    }
}

#[cfg(unix)]
impl Drop for ProcessGroup {
    fn drop(&mut self) {
        if let Some(pgid) = self.0 {
            // SAFETY: killpg takes plain integers; a group that is already gone yields ESRCH.
            let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
            if rc == 0 {
                debug!("Killed process group {}", pgid);
            }
        }
    }
}
