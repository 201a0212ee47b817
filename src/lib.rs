// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod fault;
pub mod fs;
pub mod handler;
pub mod logging;
pub mod pipeline;
pub mod pool;
pub mod report;
pub mod retry;
pub mod validation;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::ConfigFile;
use crate::errors::WardenError;
use crate::exec::ShellRunner;
use crate::fault::FaultBoundary;
use crate::fs::{FileSystem, RealFileSystem};
use crate::pipeline::{BuildPipeline, WorkspacePlan};
use crate::report::{ErrorLog, Reporter};
use crate::retry::{Retrier, TransientClassifier};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and target selection
/// - the error log, retrier and reporter shared by the build
/// - the fault boundary (panics, Ctrl-C / SIGTERM)
/// - the build pipeline itself
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    let root = config_root_dir(&config_path);

    let plan = select_workspace(&cfg, &args.target, &root)?;
    let logs_dir = rebase(&root, &cfg.report.logs_dir);

    if args.dry_run {
        print_dry_run(&plan, &cfg, &logs_dir);
        return Ok(());
    }

    let classifier = TransientClassifier::with_patterns(&cfg.transient_patterns)
        .map_err(|e| WardenError::ConfigError(format!("[retry].transient_patterns: {e}")))?;

    let log = ErrorLog::new();
    let cancel = CancellationToken::new();
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let reporter = Reporter::new(&plan.name, &logs_dir, log.clone(), fs.clone());

    let boundary = FaultBoundary::new();
    boundary.install_panic_hook();
    {
        let reporter = reporter.clone();
        boundary.on_fatal(move |_err| {
            reporter.generate_report();
        });
    }

    let watcher = {
        let boundary = boundary.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { boundary.watch_signals(cancel).await })
    };

    let pipeline = BuildPipeline::new(plan, ShellRunner)
        .with_retrier(Retrier::new(log, cancel.clone()))
        .with_classifier(Arc::new(classifier))
        .with_fs(fs);

    let result = pipeline.build_with_monitoring().await;

    // Stops the signal watcher if no signal arrived.
    cancel.cancel();
    let signalled = watcher.await.ok().flatten();

    let reporter =
        reporter.with_runtime_version(pipeline.runtime_version().map(|v| v.to_string()));

    if let Some(err) = signalled {
        // The fatal handler has already written the report.
        return Err(WardenError::Structured(err).into());
    }

    match result {
        Ok(outcome) => {
            info!(
                target = %pipeline.plan().name,
                rebuilt = outcome.rebuilt,
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                "build finished"
            );
            if cfg.report.always {
                reporter.generate_report();
            }
            Ok(())
        }
        Err(err) => {
            let report = reporter.generate_report();
            error!(
                target = %pipeline.plan().name,
                code = %err.code(),
                report = ?report,
                "build failed"
            );
            let context = match report {
                Some(path) => format!("build failed; report written to {}", path.display()),
                None => "build failed; no report could be written".to_string(),
            };
            Err(anyhow::Error::new(err).context(context))
        }
    }
}

fn select_workspace(cfg: &ConfigFile, target: &str, root: &Path) -> Result<WorkspacePlan> {
    let Some(plan) = cfg.workspace(target) else {
        return Err(WardenError::ConfigError(format!(
            "unknown target '{target}'; known workspaces: {}",
            cfg.workspace_names().join(", ")
        ))
        .into());
    };

    let mut plan = plan.clone();
    plan.cwd = rebase(root, &plan.cwd);
    Ok(plan)
}

/// Figure out the directory relative paths in the config are resolved
/// against.
///
/// - If the config path has a non-empty parent (e.g. "configs/Buildwarden.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Buildwarden.toml" (parent = ""),
///   we fall back to the current working directory "."
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

fn rebase(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Print the resolved plan for one workspace.
fn print_dry_run(plan: &WorkspacePlan, cfg: &ConfigFile, logs_dir: &Path) {
    println!("buildwarden dry-run");
    println!("  workspace: {}", plan.name);
    println!("  app_type: {}", plan.app_type);
    println!("  cwd: {}", plan.cwd.display());
    println!("  timeout: {:?}", plan.timeout);
    if let Some(limit) = plan.memory_limit_mb {
        println!("  memory_limit_mb: {limit}");
    }
    println!();

    println!("install strategies:");
    println!(
        "  1. {} ({} attempts)",
        plan.install,
        plan.install_policy.effective_attempts()
    );
    if let Some(ref clean) = plan.cache_clean {
        println!("  2. {clean} && {}", plan.install);
    }
    if let Some(ref reduced) = plan.install_reduced {
        println!("  3. {reduced}");
    }

    println!("build:");
    println!(
        "  {} ({} attempts)",
        plan.build,
        plan.build_policy.effective_attempts()
    );
    if let Some(ref clean) = plan.clean {
        println!("  clean: {clean}");
    }
    if !plan.cache_dirs.is_empty() {
        println!("  cache_dirs: {:?}", plan.cache_dirs);
    }
    if !plan.expected_outputs.is_empty() {
        println!("  expected_outputs: {:?}", plan.expected_outputs);
    }
    if !plan.required_env.is_empty() {
        println!("  required_env: {:?}", plan.required_env);
    }
    if let Some(ref runtime) = plan.runtime {
        match runtime.min_version {
            Some(min) => println!("  runtime: `{}` >= {min}", runtime.version_command),
            None => println!("  runtime: `{}`", runtime.version_command),
        }
    }
    println!();
    println!("report: {} (always = {})", logs_dir.display(), cfg.report.always);

    debug!("dry-run complete (no execution)");
}
