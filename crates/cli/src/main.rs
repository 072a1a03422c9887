//! simrun CLI - run test cases on simulator and emulator backends.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use simrun_core::{BackendRegistry, BaseDir, TestCase};
use simrun_execution::{
    Budget, CancellationToken, EngineConfig, ExecutionEngine, LauncherConfig, ProcessLauncher, RetryPolicy, RunReport,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "simrun")]
#[command(about = "Backend-aware test execution scheduler", long_about = None)]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported backends and their capabilities
    Backends,
    /// Validate a backend name
    Check {
        /// Backend name
        backend: String,
    },
    /// Run the cases of a manifest on a backend
    Run {
        /// Backend name
        #[arg(long)]
        backend: String,
        /// JSON manifest listing the test cases
        #[arg(long)]
        manifest: PathBuf,
        /// Max concurrently running cases (default: CPU count)
        #[arg(long)]
        jobs: Option<usize>,
        /// Per-attempt timeout in seconds
        #[arg(long, default_value = "60", value_parser = clap::value_parser!(u64).range(1..))]
        timeout: u64,
        /// Retries for transient backend errors
        #[arg(long, default_value = "2")]
        retries: u32,
        /// Also retry timed-out attempts
        #[arg(long)]
        retry_timeouts: bool,
        /// Command for backends without direct execution ({backend}, {artifact})
        #[arg(long)]
        runner: Option<String>,
        /// Write the JSON run report here
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = run(cli).await;
    if let Err(e) = &result {
        eprintln!("error: {e:#}");
    }
    ExitCode::from(exit_status(&result))
}

/// 0 when everything passed, 1 when a run finished with problems, 2 when
/// configuration or validation failed.
fn exit_status(result: &Result<bool>) -> u8 {
    match result {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(_) => 2,
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// Execute a command. `Ok(false)` means a run finished with problems.
async fn run(cli: Cli) -> Result<bool> {
    // Fail fast before touching any backend.
    let base = BaseDir::from_env()?;
    info!("Base directory: {}", base.raw().display());

    let registry = BackendRegistry::builtin();

    match cli.command {
        Commands::Backends => {
            println!("Backends ({})", registry.len());
            for (name, cap) in registry.backends() {
                println!("  {:<10} {}", name, cap);
            }
        }
        Commands::Check { backend } => {
            let id = registry.validate(&backend)?;
            println!("{}: {}", id, id.capability());
        }
        Commands::Run {
            backend,
            manifest,
            jobs,
            timeout,
            retries,
            retry_timeouts,
            runner,
            report,
        } => {
            let cases = load_manifest(&manifest)?;
            for case in &cases {
                if !base.contains(&case.artifact) {
                    debug!("{}: artifact {} is outside the base directory", case.name, case.artifact.display());
                }
            }

            let mut launcher = LauncherConfig::default().with_base_dir(base.clone());
            if let Some(template) = runner {
                launcher = launcher.with_runner_template(template.split_whitespace().map(String::from).collect());
            }

            let mut budget = Budget::new().with_timeout(Duration::from_secs(timeout));
            if let Some(jobs) = jobs {
                budget = budget.with_jobs(jobs);
            }
            let config = EngineConfig {
                budget,
                retry: RetryPolicy::default()
                    .with_max_retries(retries)
                    .with_retry_timeouts(retry_timeouts),
            };

            let engine = ExecutionEngine::new(registry, Arc::new(ProcessLauncher::new(launcher))).with_config(config);

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                warn!("Interrupted, cancelling remaining cases (Ctrl-C again to quit now)");
                on_signal.cancel();

                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted again, exiting");
                    std::process::exit(130);
                }
            });

            let result = engine.run(cases, &backend, cancel).await?;
            print_report(&result);

            if let Some(path) = report {
                result.write_json(&path).await?;
                info!("Report written to {}", path.display());
            }

            return Ok(result.summary.success());
        }
    }

    Ok(true)
}

fn load_manifest(path: &Path) -> Result<Vec<TestCase>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading manifest {}", path.display()))?;
    let cases: Vec<TestCase> =
        serde_json::from_str(&text).with_context(|| format!("parsing manifest {}", path.display()))?;

    let mut seen = std::collections::HashSet::new();
    for case in &cases {
        if !seen.insert(case.name.as_str()) {
            anyhow::bail!("duplicate case name '{}' in {}", case.name, path.display());
        }
    }
    Ok(cases)
}

fn print_report(report: &RunReport) {
    let summary = &report.summary;

    println!("Run {} on {}", report.run_id, report.backend);
    for problem in summary.problems() {
        println!(
            "  {:<9} {} ({} attempt{})",
            problem.outcome.to_string().to_uppercase(),
            problem.case,
            problem.attempts.len(),
            if problem.attempts.len() == 1 { "" } else { "s" }
        );
        if let Some(detail) = problem.last_detail() {
            for line in detail.lines() {
                println!("            {}", line);
            }
        }
    }

    let c = &summary.counts;
    println!(
        "{} cases: {} passed, {} failed, {} timed out, {} errored, {} cancelled ({} retries)",
        summary.entries.len(),
        c.passed,
        c.failed,
        c.timed_out,
        c.errored,
        c.cancelled,
        summary.retries
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cases.json");
        std::fs::write(
            &path,
            r#"[{"name": "a", "artifact": "out/a"}, {"name": "b", "artifact": "out/b", "requires": "direct_exec"}]"#,
        )
        .unwrap();

        let cases = load_manifest(&path).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[1].requires, simrun_core::Requirement::DirectExec);
    }

    #[test]
    fn test_duplicate_case_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cases.json");
        std::fs::write(&path, r#"[{"name": "a", "artifact": "x"}, {"name": "a", "artifact": "y"}]"#).unwrap();

        let err = load_manifest(&path).unwrap_err();
        assert!(err.to_string().contains("duplicate case name 'a'"));
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "simrun", "run", "--backend", "qemu", "--manifest", "cases.json", "--jobs", "4", "--retry-timeouts",
        ])
        .unwrap();

        match cli.command {
            Commands::Run { backend, jobs, retry_timeouts, timeout, .. } => {
                assert_eq!(backend, "qemu");
                assert_eq!(jobs, Some(4));
                assert!(retry_timeouts);
                assert_eq!(timeout, 60);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let parsed = Cli::try_parse_from([
            "simrun", "run", "--backend", "qemu", "--manifest", "cases.json", "--timeout", "0",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_exit_status() {
        assert_eq!(exit_status(&Ok(true)), 0);
        assert_eq!(exit_status(&Ok(false)), 1);

        let unsupported = BackendRegistry::builtin().validate("bogus").unwrap_err();
        assert_eq!(exit_status(&Err(unsupported.into())), 2);
        assert_eq!(exit_status(&Err(anyhow::anyhow!("reading manifest"))), 2);
    }
}
