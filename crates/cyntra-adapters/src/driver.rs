// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared subprocess driver for CLI-backed adapters.
//!
//! One place owns the hard parts: spawning, line-granular output streaming
//! into telemetry, the wall-clock deadline with TERM → grace → KILL
//! escalation, log capture, and mapping an outcome onto a proof.

use crate::patch;
use cyntra_core::{
    CommandRecord, Manifest, PatchProof, ProofBuilder, ProofStatus, RiskLevel, Verification,
    Workcell,
};
use cyntra_telemetry::{TelemetryContext, TelemetryEventKind, TelemetryWriter, kernel_events_path};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

/// How long a timed-out child gets between SIGTERM and SIGKILL.
pub const GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Error string recorded on timeout proofs.
pub const TIMEOUT_ERROR: &str = "Execution timed out";

/// Longest stdout/stderr capture kept in memory per stream (bytes). Full
/// output always lands in the log files.
const MAX_CAPTURE_BYTES: usize = 4 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Spec and outcome
// ---------------------------------------------------------------------------

/// A subprocess invocation: program, arguments, working dir, environment
/// overlay, and optional stdin payload.
#[derive(Debug, Clone)]
pub struct SubprocessSpec {
    /// Executable to spawn.
    pub program: String,
    /// Arguments, already split.
    pub args: Vec<String>,
    /// Working directory (the workcell root).
    pub cwd: PathBuf,
    /// Environment overlay on top of the kernel's environment.
    pub env: BTreeMap<String, String>,
    /// Data written to the child's stdin before it is closed.
    pub stdin_data: Option<String>,
}

/// What happened when a subprocess ran.
#[derive(Debug, Clone, Default)]
pub struct ExecOutcome {
    /// Accumulated stdout (possibly truncated; see `MAX_CAPTURE_BYTES`).
    pub stdout: String,
    /// Accumulated stderr.
    pub stderr: String,
    /// Exit code, absent when the process was killed or never spawned.
    pub exit_code: Option<i32>,
    /// The wall-clock deadline elapsed.
    pub timed_out: bool,
    /// The process could not be spawned at all.
    pub spawn_error: Option<String>,
    /// Wall-clock duration of the attempt.
    pub duration_ms: u64,
}

/// Spawn the subprocess and stream its output until exit or deadline.
///
/// Each stdout line is emitted as a `response_chunk` telemetry event as it
/// arrives. On deadline the child is sent a termination signal, given
/// [`GRACE_PERIOD`] to exit, then killed and reaped; the partial output
/// collected so far is returned with `timed_out` set.
pub async fn run_streaming(
    spec: &SubprocessSpec,
    deadline: Duration,
    telemetry: Option<&TelemetryWriter>,
) -> ExecOutcome {
    let started = Instant::now();

    let mut cmd = tokio::process::Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(&spec.cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if spec.stdin_data.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .kill_on_drop(true);
    for (k, v) in &spec.env {
        cmd.env(k, v);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return ExecOutcome {
                spawn_error: Some(format!("{}: {e}", spec.program)),
                duration_ms: started.elapsed().as_millis() as u64,
                ..ExecOutcome::default()
            };
        }
    };

    if let Some(data) = &spec.stdin_data {
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(data.as_bytes()).await;
            // Dropping closes the pipe so the child sees EOF.
        }
    }

    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();

    let mut stdout_buf = String::new();
    let mut stderr_buf = String::new();
    let mut lines_seen: u64 = 0;

    let wait_result = tokio::time::timeout(deadline, async {
        let out_fut = async {
            if let Some(out) = stdout_pipe {
                let mut lines = BufReader::new(out).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if let Some(t) = telemetry {
                        t.emit(TelemetryEventKind::ResponseChunk {
                            content: line.clone(),
                        });
                    }
                    lines_seen += 1;
                    if stdout_buf.len() < MAX_CAPTURE_BYTES {
                        stdout_buf.push_str(&line);
                        stdout_buf.push('\n');
                    }
                }
            }
        };
        let err_fut = async {
            if let Some(err) = stderr_pipe {
                let mut lines = BufReader::new(err).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if stderr_buf.len() < MAX_CAPTURE_BYTES {
                        stderr_buf.push_str(&line);
                        stderr_buf.push('\n');
                    }
                }
            }
        };
        let (_, _, status) = tokio::join!(out_fut, err_fut, child.wait());
        status
    })
    .await;

    let (exit_code, timed_out) = match wait_result {
        Ok(Ok(status)) => (status.code(), false),
        Ok(Err(e)) => {
            warn!(target: "cyntra.adapter", error = %e, "waiting on subprocess failed");
            (None, false)
        }
        Err(_elapsed) => {
            terminate(&mut child).await;
            (None, true)
        }
    };

    if let Some(t) = telemetry {
        t.emit(TelemetryEventKind::ResponseComplete { lines: lines_seen });
    }

    ExecOutcome {
        stdout: stdout_buf,
        stderr: stderr_buf,
        exit_code,
        timed_out,
        spawn_error: None,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

/// TERM, grace period, KILL, reap. Shells out to `kill(1)` for the
/// termination signal; the kernel forbids unsafe code, so no raw syscalls.
async fn terminate(child: &mut tokio::process::Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        let _ = tokio::process::Command::new("kill")
            .args(["-TERM", &pid.to_string()])
            .status()
            .await;

        let waited = Instant::now();
        while waited.elapsed() < GRACE_PERIOD {
            if let Ok(Some(_)) = child.try_wait() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    // kill() sends the hard signal and reaps the child.
    if let Err(e) = child.kill().await {
        debug!(target: "cyntra.adapter", error = %e, "kill after grace period failed");
    }
    let _ = child.wait().await;
}

// ---------------------------------------------------------------------------
// Structured output tail
// ---------------------------------------------------------------------------

/// Extract the proof-overriding JSON object from subprocess stdout.
///
/// Rule: the last line that parses as a JSON object **with a `status`
/// key**; failing that, the last line that parses as a JSON object;
/// failing that, none.
#[must_use]
pub fn structured_tail(stdout: &str) -> Option<serde_json::Value> {
    let mut last_object: Option<serde_json::Value> = None;
    for line in stdout.lines().rev() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) else {
            continue;
        };
        if !value.is_object() {
            continue;
        }
        if value.get("status").is_some() {
            return Some(value);
        }
        if last_object.is_none() {
            last_object = Some(value);
        }
    }
    last_object
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// Write captured output to `<logs>/<name>-std{out,err}.log`, returning
/// the paths that were written.
pub fn save_logs(
    logs_dir: &Path,
    name: &str,
    stdout: &str,
    stderr: &str,
) -> (Option<PathBuf>, Option<PathBuf>) {
    let _ = std::fs::create_dir_all(logs_dir);

    let mut write = |suffix: &str, content: &str| -> Option<PathBuf> {
        if content.is_empty() {
            return None;
        }
        let path = logs_dir.join(format!("{name}-{suffix}.log"));
        match std::fs::write(&path, content) {
            Ok(()) => Some(path),
            Err(e) => {
                warn!(target: "cyntra.adapter", path = %path.display(), error = %e, "failed to save log");
                None
            }
        }
    };

    (write("stdout", stdout), write("stderr", stderr))
}

/// Persist `proof.json` into the workcell root. Logs on failure rather
/// than raising; a proof that exists only in memory still flows onward.
pub fn write_proof(workcell: &Workcell, proof: &PatchProof) {
    let path = workcell.path.join("proof.json");
    let result = proof
        .to_json()
        .map_err(|e| e.to_string())
        .and_then(|json| std::fs::write(&path, json).map_err(|e| e.to_string()));
    if let Err(e) = result {
        warn!(target: "cyntra.adapter", path = %path.display(), error = %e, "failed to write proof.json");
    }
}

/// Locate the kernel-wide mirrored events file for a workcell.
///
/// Workcells live at `<repo>/.workcells/<id>`, so the kernel dir is two
/// levels up.
#[must_use]
pub fn resolve_kernel_events_path(workcell_path: &Path) -> Option<PathBuf> {
    let repo_root = workcell_path.parent()?.parent()?;
    let kernel_dir = repo_root.join(".cyntra");
    if kernel_dir.exists() {
        Some(kernel_events_path(&kernel_dir.join("logs")))
    } else {
        None
    }
}

/// Open the per-workcell telemetry writer with the kernel mirror attached.
#[must_use]
pub fn open_telemetry(
    toolchain: &str,
    model: Option<&str>,
    manifest: &Manifest,
    workcell: &Workcell,
) -> Option<TelemetryWriter> {
    let context = TelemetryContext {
        issue_id: Some(manifest.issue.id.clone()),
        workcell_id: Some(workcell.workcell_id.clone()),
        toolchain: Some(toolchain.to_string()),
        model: model.map(str::to_string),
    };
    let mirror = resolve_kernel_events_path(&workcell.path);
    match TelemetryWriter::open_with_mirror(
        &workcell.path.join("telemetry.jsonl"),
        context,
        mirror.as_deref(),
        cyntra_telemetry::DEFAULT_MIRROR_TYPES,
    ) {
        Ok(writer) => Some(writer),
        Err(e) => {
            warn!(target: "cyntra.adapter", error = %e, "telemetry unavailable for run");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Executable lookup
// ---------------------------------------------------------------------------

/// Whether `executable` resolves: explicit paths must exist, bare names
/// are searched on `PATH`.
#[must_use]
pub fn executable_available(executable: &str) -> bool {
    if executable.contains('/') {
        return Path::new(executable).exists();
    }
    let Some(path_var) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path_var).any(|dir| dir.join(executable).is_file())
}

/// Run `<executable> --version` and report whether it exited 0.
pub async fn version_check(executable: &str) -> bool {
    match tokio::process::Command::new(executable)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await
    {
        Ok(out) => out.status.success(),
        Err(_) => false,
    }
}

// ---------------------------------------------------------------------------
// Proof assembly
// ---------------------------------------------------------------------------

/// Proof for a run that hit its wall-clock deadline.
#[must_use]
pub fn timeout_proof(
    toolchain: &str,
    manifest: &Manifest,
    started_at: DateTime<Utc>,
) -> PatchProof {
    ProofBuilder::new(toolchain, &manifest.workcell_id, &manifest.issue.id)
        .status(ProofStatus::Timeout)
        .started_at(started_at)
        .completed_at(Utc::now())
        .error(TIMEOUT_ERROR)
        .verification(Verification {
            blocking_failures: vec!["timeout".into()],
            ..Verification::default()
        })
        .risk_classification(RiskLevel::High)
        .build()
}

/// Proof for a run that failed before producing a meaningful exit.
#[must_use]
pub fn error_proof(
    toolchain: &str,
    manifest: &Manifest,
    started_at: DateTime<Utc>,
    error: &str,
) -> PatchProof {
    ProofBuilder::new(toolchain, &manifest.workcell_id, &manifest.issue.id)
        .status(ProofStatus::Error)
        .started_at(started_at)
        .completed_at(Utc::now())
        .error(error)
        .verification(Verification {
            blocking_failures: vec!["error".into()],
            ..Verification::default()
        })
        .risk_classification(RiskLevel::High)
        .build()
}

/// Assemble the proof for a finished CLI run: structured tail overrides,
/// patch interrogation, risk classification, command record.
#[must_use]
pub fn proof_from_outcome(
    toolchain: &str,
    model: &str,
    manifest: &Manifest,
    workcell: &Workcell,
    outcome: &ExecOutcome,
    started_at: DateTime<Utc>,
    logs: (Option<PathBuf>, Option<PathBuf>),
) -> PatchProof {
    let completed_at = Utc::now();
    let tail = structured_tail(&outcome.stdout);

    let exit_code = outcome.exit_code.unwrap_or(-1);
    let mut status = ProofStatus::from_exit_code(exit_code);
    if let Some(s) = tail
        .as_ref()
        .and_then(|t| t.get("status"))
        .and_then(|s| s.as_str())
    {
        // Subprocesses may refine success/partial/failed; the kernel owns
        // timeout and error.
        match s {
            "success" => status = ProofStatus::Success,
            "partial" => status = ProofStatus::Partial,
            "failed" => status = ProofStatus::Failed,
            _ => {}
        }
    }

    let patch = patch::collect_patch_info(workcell, manifest);
    let risk = patch.classify_risk();

    let mut builder = ProofBuilder::new(toolchain, &manifest.workcell_id, &manifest.issue.id)
        .status(status)
        .patch(patch)
        .started_at(started_at)
        .completed_at(completed_at)
        .exit_code(exit_code)
        .model(model)
        .risk_classification(risk)
        .add_command(CommandRecord {
            command: toolchain.to_string(),
            exit_code: Some(exit_code),
            duration_ms: outcome.duration_ms,
            stdout_path: logs.0.map(|p| p.display().to_string()),
            stderr_path: logs.1.map(|p| p.display().to_string()),
        });

    if let Some(genome) = &manifest.toolchain_config.prompt_genome_id {
        builder = builder.prompt_genome_id(genome);
    }
    if let Some(sampling) = manifest.toolchain_config.sampling {
        builder = builder.sampling(sampling);
    }

    if let Some(tail) = tail {
        if let Some(confidence) = tail.get("confidence").and_then(serde_json::Value::as_f64) {
            builder = builder.confidence(confidence);
        }
        if let Some(tokens) = tail.get("tokens_used").and_then(serde_json::Value::as_u64) {
            builder = builder.tokens_used(tokens);
        }
        if let Some(cost) = tail.get("cost").and_then(serde_json::Value::as_f64) {
            builder = builder.cost_usd(cost);
        }
        if let Some(version) = tail.get("version").and_then(|v| v.as_str()) {
            builder = builder.toolchain_version(version);
        }
    }

    builder.build()
}

// ---------------------------------------------------------------------------
// Shared CLI execution flow
// ---------------------------------------------------------------------------

/// A fully-built CLI invocation, ready to run inside a workcell.
#[derive(Debug, Clone)]
pub struct CliCommand {
    /// Executable to spawn.
    pub program: String,
    /// Arguments, already split.
    pub args: Vec<String>,
    /// Environment overlay.
    pub env: BTreeMap<String, String>,
    /// Prompt fed on stdin instead of via flags, for binaries that read it
    /// there.
    pub stdin_data: Option<String>,
}

/// The execution flow shared by every CLI-backed adapter: write the
/// prompt, stream the subprocess under a deadline, and map the outcome to
/// a proof (written to `proof.json` before returning).
pub async fn execute_cli(
    toolchain: &str,
    model: &str,
    command: CliCommand,
    prompt: &str,
    manifest: &Manifest,
    workcell: &Workcell,
    timeout: Duration,
) -> PatchProof {
    let started_at = Utc::now();

    let _ = std::fs::create_dir_all(&workcell.logs_dir);
    if let Err(e) = std::fs::write(workcell.path.join("prompt.md"), prompt) {
        warn!(target: "cyntra.adapter", error = %e, "failed to write prompt.md");
    }

    let telemetry = open_telemetry(toolchain, Some(model), manifest, workcell);
    if let Some(t) = &telemetry {
        t.emit(TelemetryEventKind::Started {
            prompt_genome_id: manifest.toolchain_config.prompt_genome_id.clone(),
            sampling: manifest
                .toolchain_config
                .sampling
                .and_then(|s| serde_json::to_value(s).ok()),
        });
        t.emit(TelemetryEventKind::PromptSent {
            prompt: prompt.to_string(),
        });
    }

    debug!(
        target: "cyntra.adapter",
        toolchain = %toolchain,
        workcell_id = %workcell.workcell_id,
        issue_id = %manifest.issue.id,
        model = %model,
        "executing adapter"
    );

    let spec = SubprocessSpec {
        program: command.program,
        args: command.args,
        cwd: workcell.path.clone(),
        env: command.env,
        stdin_data: command.stdin_data,
    };
    let outcome = run_streaming(&spec, timeout, telemetry.as_ref()).await;

    let proof = if let Some(err) = outcome.spawn_error.clone() {
        if let Some(t) = &telemetry {
            t.emit(TelemetryEventKind::Error {
                message: err.clone(),
            });
        }
        error_proof(toolchain, manifest, started_at, &err)
    } else if outcome.timed_out {
        if let Some(t) = &telemetry {
            t.emit(TelemetryEventKind::Error {
                message: TIMEOUT_ERROR.to_string(),
            });
        }
        timeout_proof(toolchain, manifest, started_at)
    } else {
        let logs = save_logs(
            &workcell.logs_dir,
            toolchain,
            &outcome.stdout,
            &outcome.stderr,
        );
        let proof =
            proof_from_outcome(toolchain, model, manifest, workcell, &outcome, started_at, logs);
        if let Some(t) = &telemetry {
            t.emit(TelemetryEventKind::Completed {
                status: proof.status.as_str().to_string(),
                exit_code: outcome.exit_code,
                duration_ms: proof.metadata.duration_ms,
            });
        }
        proof
    };

    write_proof(workcell, &proof);
    proof
}
