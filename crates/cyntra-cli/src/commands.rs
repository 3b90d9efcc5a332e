// SPDX-License-Identifier: MIT OR Apache-2.0
//! Command implementations for the `cyntra` binary.

use crate::format;
use anyhow::{Context, Result};
use cyntra_adapters::build_registry;
use cyntra_beads::{BeadStore, BeadStoreError, FileBeadStore};
use cyntra_config::{KernelConfig, KernelPaths, ENV_CONFIG, ENV_REPO_ROOT};
use cyntra_control::Controller;
use cyntra_core::{Issue, IssueStatus, PatchProof};
use cyntra_hooks::{builtin, HookRegistry, HookRunner};
use cyntra_kernel::{Dispatcher, Runner, Scheduler};
use cyntra_paths::StagingRules;
use cyntra_planner::build_planner;
use cyntra_verify::Verifier;
use cyntra_workcell::WorkcellManager;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// What a command concluded, mapped onto exit codes by `main`.
pub enum Outcome {
    /// Everything the command touched is fine.
    Success,
    /// At least one issue ended partial or failed.
    IssuesFailed,
}

/// Resolve the config file path: flag, then `CYNTRA_CONFIG`, then
/// `<repo>/.cyntra/config.yaml` with the repo root from
/// `CYNTRA_REPO_ROOT` or the working directory.
fn resolve_config_path(flag: Option<&Path>) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var(ENV_CONFIG) {
        return PathBuf::from(path);
    }
    let root = std::env::var(ENV_REPO_ROOT)
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    root.join(".cyntra").join("config.yaml")
}

fn load_config(flag: Option<&Path>) -> Result<KernelConfig> {
    let path = resolve_config_path(flag);
    let config = KernelConfig::load(&path)
        .with_context(|| format!("loading config from {}", path.display()))?;
    for warning in config.validate().unwrap_or_default() {
        warn!(target: "cyntra.cli", "{warning}");
    }
    Ok(config)
}

const CONFIG_TEMPLATE: &str = "\
# Cyntra kernel configuration. Every key is optional.
max_concurrent_workcells: 3
max_concurrent_tokens: 200000
starvation_threshold_hours: 4.0
default_branch: main
toolchain_priority: [codex, claude, crush]
toolchains:
  claude:
    enabled: true
    model: opus
    timeout_seconds: 1800
  codex:
    enabled: true
    timeout_seconds: 1800
gates:
  test_command: pytest
  typecheck_command: mypy .
  lint_command: ruff check .
  timeout_seconds: 300
  retry_flaky: 2
speculation:
  enabled: true
  default_parallelism: 2
  max_parallelism: 3
";

/// `cyntra init`: create the kernel layout.
pub fn init(config_flag: Option<&Path>) -> Result<Outcome> {
    let config_path = resolve_config_path(config_flag);
    let paths = KernelPaths::for_config(&config_path);

    for dir in [
        &paths.kernel_dir,
        &paths.logs_dir,
        &paths.archives_dir,
        &paths.state_dir,
        &paths.runs_dir,
        &paths.workcells_dir,
        &paths.beads_dir,
    ] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating {}", dir.display()))?;
    }

    if config_path.exists() {
        println!("config already present at {}", config_path.display());
    } else {
        std::fs::write(&config_path, CONFIG_TEMPLATE)
            .with_context(|| format!("writing {}", config_path.display()))?;
        println!("initialized {}", config_path.display());
    }

    // Fail early on an invalid pre-existing config.
    load_config(Some(&config_path))?;
    Ok(Outcome::Success)
}

/// Arguments for `cyntra run`.
pub struct RunArgs {
    /// Config flag.
    pub config: Option<PathBuf>,
    /// Poll the bead store instead of a single pass.
    pub watch: bool,
    /// Process only this issue.
    pub issue: Option<String>,
    /// Override `max_concurrent_workcells`.
    pub max_concurrent: Option<u32>,
    /// Force speculate mode.
    pub speculate: bool,
    /// Plan without dispatching.
    pub dry_run: bool,
}

/// Bead store wrapper that narrows `list_ready` to one issue.
struct SingleIssueStore {
    inner: Arc<dyn BeadStore>,
    issue_id: String,
}

impl BeadStore for SingleIssueStore {
    fn list_ready(&self) -> Result<Vec<Issue>, BeadStoreError> {
        Ok(self
            .inner
            .list_ready()?
            .into_iter()
            .filter(|i| i.id == self.issue_id)
            .collect())
    }

    fn list_in_progress(&self) -> Result<Vec<Issue>, BeadStoreError> {
        self.inner.list_in_progress()
    }

    fn get(&self, id: &str) -> Result<Issue, BeadStoreError> {
        self.inner.get(id)
    }

    fn update_status(
        &self,
        id: &str,
        new_status: IssueStatus,
        reason: Option<&str>,
    ) -> Result<(), BeadStoreError> {
        self.inner.update_status(id, new_status, reason)
    }
}

/// `cyntra run`: wire the kernel and drive the loop.
pub fn run(args: RunArgs) -> Result<Outcome> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(n) = args.max_concurrent {
        config.max_concurrent_workcells = n;
    }
    config.force_speculate |= args.speculate;
    config.dry_run |= args.dry_run;
    config.watch_mode = args.watch;
    let config = Arc::new(config);

    // Bad staging globs are a config error; fail before any dispatch.
    let staging = StagingRules::compile(&config.staging.include, &config.staging.exclude)
        .context("compiling staging globs")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    runtime.block_on(async {
        let adapters = Arc::new(build_registry(&config));
        info!(target: "cyntra.cli", adapters = ?adapters.names(), "adapter registry ready");

        // Hooks register explicitly at startup; nothing registers on import.
        let hook_registry = Arc::new(HookRegistry::new());
        builtin::install_default_hooks(&hook_registry, &config.post_execution_hooks);
        let hooks = Arc::new(HookRunner::new(
            Arc::clone(&hook_registry),
            config.post_execution_hooks.clone(),
        ));

        let mut store: Arc<dyn BeadStore> =
            Arc::new(FileBeadStore::new(&config.paths.beads_dir));
        if let Some(issue_id) = &args.issue {
            store = Arc::new(SingleIssueStore {
                inner: store,
                issue_id: issue_id.clone(),
            });
        }

        let workcells = Arc::new(
            WorkcellManager::new(
                config.paths.repo_root.clone(),
                config.paths.workcells_dir.clone(),
                config.paths.archives_dir.clone(),
                config.default_branch.clone(),
            )
            .with_staging(staging),
        );
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&config),
            adapters,
            Arc::clone(&hooks),
        ));
        let verifier = Arc::new(Verifier::new(config.gates.clone(), Arc::clone(&hooks)));
        let controller = Arc::new(Controller::new(config.control.clone()));
        let planner = build_planner(&config.planner);
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&config),
            Arc::clone(&controller),
            planner,
        ));

        let runner = Runner::new(
            Arc::clone(&config),
            store,
            workcells,
            dispatcher,
            verifier,
            controller,
            scheduler,
        );

        // Graceful shutdown: no new dispatches after ctrl-c, in-flight
        // runs complete.
        let shutdown = runner.shutdown_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!(target: "cyntra.cli", "interrupt received; shutting down");
                shutdown.cancel();
            }
        });

        let report = runner.run().await?;
        format::print_run_report(&report);

        if report.failed.is_empty() {
            Ok(Outcome::Success)
        } else {
            Ok(Outcome::IssuesFailed)
        }
    })
}

/// `cyntra status`.
pub fn status(config_flag: Option<&Path>, json: bool, verbose: bool) -> Result<Outcome> {
    let config = load_config(config_flag)?;
    let store = FileBeadStore::new(&config.paths.beads_dir);
    let workcells = WorkcellManager::new(
        config.paths.repo_root.clone(),
        config.paths.workcells_dir.clone(),
        config.paths.archives_dir.clone(),
        config.default_branch.clone(),
    );

    let ready = store.list_ready().unwrap_or_default();
    let in_progress = store.list_in_progress().unwrap_or_default();
    let active = workcells.list_active();

    format::print_status(&ready, &in_progress, &active, json, verbose)?;
    Ok(Outcome::Success)
}

/// `cyntra workcells`.
pub fn workcells(config_flag: Option<&Path>, all: bool, json: bool) -> Result<Outcome> {
    let config = load_config(config_flag)?;
    let manager = WorkcellManager::new(
        config.paths.repo_root.clone(),
        config.paths.workcells_dir.clone(),
        config.paths.archives_dir.clone(),
        config.default_branch.clone(),
    );

    let active = manager.list_active();
    let archived = if all {
        list_dirs(&config.paths.archives_dir)
    } else {
        Vec::new()
    };

    format::print_workcells(&active, &archived, json)?;
    Ok(Outcome::Success)
}

/// `cyntra history`.
pub fn history(
    config_flag: Option<&Path>,
    run_id: Option<String>,
    issue_id: Option<String>,
    limit: usize,
    json: bool,
) -> Result<Outcome> {
    let config = load_config(config_flag)?;
    let mut runs = load_runs(&config.paths.runs_dir);

    if let Some(run_id) = &run_id {
        runs.retain(|(id, _)| id == run_id);
    }
    if let Some(issue_id) = &issue_id {
        runs.retain(|(_, proof)| &proof.issue_id == issue_id);
    }

    // Newest first; run ids embed creation order only loosely, so sort by
    // completion time from the proof.
    runs.sort_by(|a, b| b.1.metadata.completed_at.cmp(&a.1.metadata.completed_at));
    runs.truncate(limit);

    format::print_history(&runs, json)?;
    Ok(Outcome::Success)
}

/// `cyntra stats`.
pub fn stats(
    config_flag: Option<&Path>,
    cost: bool,
    success_rate: bool,
    time: bool,
) -> Result<Outcome> {
    let config = load_config(config_flag)?;
    let runs = load_runs(&config.paths.runs_dir);
    let proofs: Vec<PatchProof> = runs.into_iter().map(|(_, p)| p).collect();

    // With no selector flags, print everything.
    let all = !(cost || success_rate || time);
    format::print_stats(
        &proofs,
        cost || all,
        success_rate || all,
        time || all,
    );
    Ok(Outcome::Success)
}

fn list_dirs(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(std::result::Result::ok)
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    names.sort();
    names
}

/// Load `(run_id, proof)` pairs from the runs directory, skipping
/// records that no longer parse.
fn load_runs(runs_dir: &Path) -> Vec<(String, PatchProof)> {
    let mut runs = Vec::new();
    let Ok(entries) = std::fs::read_dir(runs_dir) else {
        return runs;
    };
    for entry in entries.filter_map(std::result::Result::ok) {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        let proof_path = entry.path().join("proof.json");
        let Ok(raw) = std::fs::read_to_string(&proof_path) else {
            continue;
        };
        match PatchProof::from_json(&raw) {
            Ok(proof) => runs.push((name, proof)),
            Err(e) => warn!(target: "cyntra.cli", path = %proof_path.display(), error = %e, "skipping unreadable proof"),
        }
    }
    runs
}
