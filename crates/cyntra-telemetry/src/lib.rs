// SPDX-License-Identifier: MIT OR Apache-2.0
//! cyntra-telemetry
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Append-only JSONL telemetry for kernel runs.
//!
//! Each workcell gets its own `telemetry.jsonl`; a configurable subset of
//! event types is mirrored into a kernel-wide events file. Within one
//! writer, timestamps never go backwards and lines are never rewritten.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Event types mirrored into the kernel-wide events file by default.
pub const DEFAULT_MIRROR_TYPES: &[&str] = &[
    "started",
    "prompt_sent",
    "response_chunk",
    "response_complete",
    "tool_call",
    "tool_result",
    "completed",
    "error",
];

/// Errors from telemetry persistence.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The telemetry file could not be opened or written.
    #[error("telemetry I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// An event could not be serialized.
    #[error("telemetry serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Identity fields stamped onto every event from one writer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct TelemetryContext {
    /// Issue the run is for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_id: Option<String>,
    /// Workcell the run executes in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workcell_id: Option<String>,
    /// Toolchain driving the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolchain: Option<String>,
    /// Model in use, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// One telemetry record. Serialized field order is `ts`, `type`,
/// type-specific payload, then the context fields.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TelemetryEvent {
    /// Emission timestamp (non-decreasing per writer).
    pub ts: DateTime<Utc>,
    /// The event payload, discriminated by `type`.
    #[serde(flatten)]
    pub kind: TelemetryEventKind,
    /// Writer identity.
    #[serde(flatten)]
    pub context: TelemetryContext,
}

/// The payload discriminator for [`TelemetryEvent`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEventKind {
    /// An adapter run has started.
    Started {
        /// Prompt genome used for prompt assembly, when any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prompt_genome_id: Option<String>,
        /// Sampling parameters for the run.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sampling: Option<serde_json::Value>,
    },
    /// The assembled prompt was handed to the subprocess.
    PromptSent {
        /// Full prompt text.
        prompt: String,
    },
    /// One line of subprocess stdout.
    ResponseChunk {
        /// The line, without its trailing newline.
        content: String,
    },
    /// The subprocess finished producing output.
    ResponseComplete {
        /// Total stdout lines observed.
        lines: u64,
    },
    /// The agent invoked a tool (reported by the subprocess).
    ToolCall {
        /// Tool name.
        name: String,
        /// JSON input passed to the tool.
        input: serde_json::Value,
    },
    /// A tool returned (reported by the subprocess).
    ToolResult {
        /// Tool name.
        name: String,
        /// JSON output from the tool.
        output: serde_json::Value,
    },
    /// The adapter run completed.
    Completed {
        /// Final proof status.
        status: String,
        /// Subprocess exit code, when one exists.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        /// Wall-clock duration in milliseconds.
        duration_ms: u64,
    },
    /// A cost estimate was recorded before dispatch.
    CostEstimated {
        /// Estimated tokens for the run.
        estimated_tokens: u64,
        /// Estimated cost in USD.
        estimated_cost_usd: f64,
    },
    /// A quality gate started.
    GateStarted {
        /// Gate name.
        gate: String,
        /// Command being run.
        command: String,
    },
    /// A quality gate finished.
    GateCompleted {
        /// Gate name.
        gate: String,
        /// Whether the gate passed.
        passed: bool,
        /// Gate duration in milliseconds.
        duration_ms: u64,
        /// Flaky retries consumed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retries_used: Option<u32>,
    },
    /// The planner produced a prediction.
    PlannerPrediction {
        /// Predicted action, as an opaque JSON object.
        action: serde_json::Value,
        /// Prediction confidence.
        confidence: f64,
        /// Whether the prediction was enforced or only logged.
        enforced: bool,
    },
    /// A speculate group was decided.
    VoteResult {
        /// Workcell of the winning proof, absent when no proof existed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        winner_workcell_id: Option<String>,
        /// Number of candidate proofs voted on.
        candidates: u64,
    },
    /// An issue status transition was written to the bead store.
    StatusChange {
        /// Previous status, when known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        /// New status.
        to: String,
        /// Human-readable reason.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// A non-fatal problem.
    Warning {
        /// Warning text.
        message: String,
    },
    /// A fatal problem for this run.
    Error {
        /// Error text.
        message: String,
    },
}

impl TelemetryEventKind {
    /// Wire name of this event type (the `type` field).
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::PromptSent { .. } => "prompt_sent",
            Self::ResponseChunk { .. } => "response_chunk",
            Self::ResponseComplete { .. } => "response_complete",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Completed { .. } => "completed",
            Self::CostEstimated { .. } => "cost_estimated",
            Self::GateStarted { .. } => "gate_started",
            Self::GateCompleted { .. } => "gate_completed",
            Self::PlannerPrediction { .. } => "planner_prediction",
            Self::VoteResult { .. } => "vote_result",
            Self::StatusChange { .. } => "status_change",
            Self::Warning { .. } => "warning",
            Self::Error { .. } => "error",
        }
    }
}

/// Path of the kernel-wide mirrored events file under the kernel logs dir.
#[must_use]
pub fn kernel_events_path(logs_dir: &Path) -> PathBuf {
    logs_dir.join("events.jsonl")
}

struct WriterInner {
    file: File,
    mirror: Option<File>,
    last_ts: DateTime<Utc>,
}

/// Append-only JSONL telemetry writer for one workcell.
///
/// Safe to share across threads; writes are serialized internally and each
/// event is written as one complete line.
pub struct TelemetryWriter {
    path: PathBuf,
    context: TelemetryContext,
    mirror_types: BTreeSet<String>,
    inner: Mutex<WriterInner>,
}

impl std::fmt::Debug for TelemetryWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryWriter")
            .field("path", &self.path)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl TelemetryWriter {
    /// Open (or create) the telemetry file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Io`] when the file cannot be opened.
    pub fn open(path: &Path, context: TelemetryContext) -> Result<Self, TelemetryError> {
        Self::open_with_mirror(path, context, None, DEFAULT_MIRROR_TYPES)
    }

    /// Open a writer that additionally mirrors a subset of event types
    /// into `mirror_path`.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Io`] when either file cannot be opened.
    pub fn open_with_mirror(
        path: &Path,
        context: TelemetryContext,
        mirror_path: Option<&Path>,
        mirror_types: &[&str],
    ) -> Result<Self, TelemetryError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        let mirror = match mirror_path {
            Some(mp) => {
                if let Some(parent) = mp.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                Some(OpenOptions::new().create(true).append(true).open(mp)?)
            }
            None => None,
        };

        Ok(Self {
            path: path.to_path_buf(),
            context,
            mirror_types: mirror_types.iter().map(|s| s.to_string()).collect(),
            inner: Mutex::new(WriterInner {
                file,
                mirror,
                last_ts: DateTime::<Utc>::MIN_UTC,
            }),
        })
    }

    /// Path of the telemetry file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Emit an event, logging (never raising) on I/O failure.
    pub fn emit(&self, kind: TelemetryEventKind) {
        if let Err(e) = self.try_emit(kind) {
            warn!(target: "cyntra.telemetry", path = %self.path.display(), error = %e, "telemetry write failed");
        }
    }

    /// Emit an event, surfacing any failure.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError`] when serialization or the append fails.
    pub fn try_emit(&self, kind: TelemetryEventKind) -> Result<(), TelemetryError> {
        let mut inner = self.inner.lock().expect("telemetry lock poisoned");

        // Clamp so ts never decreases within one writer.
        let now = Utc::now().max(inner.last_ts);
        inner.last_ts = now;

        let mirrored = self.mirror_types.contains(kind.type_name());
        let event = TelemetryEvent {
            ts: now,
            kind,
            context: self.context.clone(),
        };
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');

        inner.file.write_all(line.as_bytes())?;
        if mirrored {
            if let Some(mirror) = inner.mirror.as_mut() {
                mirror.write_all(line.as_bytes())?;
            }
        }
        Ok(())
    }
}

/// Read all events back from a JSONL telemetry file. Intended for the CLI
/// (`history`) and tests; malformed lines are skipped.
///
/// # Errors
///
/// Returns [`TelemetryError::Io`] when the file cannot be read.
pub fn read_events(path: &Path) -> Result<Vec<TelemetryEvent>, TelemetryError> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect())
}
