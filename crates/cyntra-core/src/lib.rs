// SPDX-License-Identifier: MIT OR Apache-2.0
//! cyntra-core
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The stable contract for the Cyntra kernel.
//!
//! Every other crate in the workspace speaks these types: issues read from
//! the bead store, workcell sandboxes, the manifest handed to a toolchain
//! adapter, and the patch proof that comes back.

/// Workcell and run identifier helpers.
pub mod ids;
/// Deterministic deep merge for JSON-shaped data.
pub mod merge;
/// The patch proof: the outcome record of a single dispatch.
pub mod proof;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

pub use proof::{
    CommandRecord, DiffStats, GateResult, Patch, PatchProof, ProofBuilder, ProofMetadata,
    ProofStatus, Review, Sampling, Verification, canonical_json, proof_hash, sha256_hex,
};

/// Schema version embedded in every manifest and proof.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Errors from contract-level operations (serialization, hashing).
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    /// JSON serialization or deserialization failed.
    #[error("failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Issues
// ---------------------------------------------------------------------------

/// Lifecycle status of an issue in the bead store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    /// All blockers resolved; eligible for scheduling.
    Ready,
    /// A workcell is currently dispatched for this issue.
    InProgress,
    /// A verified proof was accepted.
    Completed,
    /// The last attempt failed and the retry budget is exhausted.
    Failed,
    /// At least one `blocked_by` issue is not completed.
    Blocked,
    /// Removed from scheduling without resolution.
    Archived,
}

/// Declared or classified risk of a change.
///
/// Variant order is the severity order, so `RiskLevel` can be compared
/// directly when ranking issues.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Small, localized change.
    #[default]
    Low,
    /// Non-trivial change (100+ changed lines).
    Medium,
    /// Large change or one touching sensitive paths.
    High,
    /// Forbidden paths were modified; requires human review.
    Critical,
}

impl RiskLevel {
    /// Parse a lowercase risk name, returning `None` for unknown input.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Lowercase name as it appears on the wire.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

fn default_retry_budget() -> u32 {
    2
}

/// A single engineering issue (a "bead") read from the bead store.
///
/// The kernel treats issues as read-mostly: only status transitions and
/// retry accounting are written back, and only by the runner.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Issue {
    /// Stable identifier assigned by the bead store.
    pub id: String,

    /// One-line summary.
    pub title: String,

    /// Full problem statement handed to the agent.
    #[serde(default)]
    pub description: String,

    /// Unordered labels used for routing and hook filtering.
    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Ordered acceptance criteria included in the prompt.
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,

    /// Path patterns the agent must not modify.
    ///
    /// A trailing `/` matches everything under the directory, a trailing `*`
    /// is a prefix match, and a bare path matches the file itself or
    /// anything under it as a directory.
    #[serde(default)]
    pub forbidden_paths: Vec<String>,

    /// Non-binding token estimate used for budget reservations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dk_estimated_tokens: Option<u64>,

    /// Declared risk level (distinct from the classified risk on a proof).
    #[serde(default)]
    pub risk_level: RiskLevel,

    /// Issues that must be completed before this one is ready.
    #[serde(default)]
    pub blocked_by: BTreeSet<String>,

    /// Current lifecycle status.
    pub status: IssueStatus,

    /// When the issue last became ready; drives starvation and FIFO order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_since: Option<DateTime<Utc>>,

    /// How many failed attempts may be retried before the issue is failed.
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,

    /// Failed attempts so far (kernel-maintained).
    #[serde(default)]
    pub retry_count: u32,
}

impl Issue {
    /// Minimal ready issue for construction in code and tests.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            tags: BTreeSet::new(),
            acceptance_criteria: Vec::new(),
            forbidden_paths: Vec::new(),
            dk_estimated_tokens: None,
            risk_level: RiskLevel::Low,
            blocked_by: BTreeSet::new(),
            status: IssueStatus::Ready,
            ready_since: None,
            retry_budget: default_retry_budget(),
            retry_count: 0,
        }
    }

    /// Token estimate used for admission, falling back to `default` when the
    /// bead carries no hint.
    #[must_use]
    pub fn estimated_tokens(&self, default: u64) -> u64 {
        self.dk_estimated_tokens.unwrap_or(default)
    }
}

// ---------------------------------------------------------------------------
// Workcells
// ---------------------------------------------------------------------------

/// An isolated sandbox checkout where a single dispatch edits files.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Workcell {
    /// Globally unique id, `wc-<issue_id>[-<tag>]-<suffix>`.
    pub workcell_id: String,

    /// The issue this sandbox was allocated for.
    pub issue_id: String,

    /// Absolute path of the sandbox root.
    pub path: PathBuf,

    /// Branch the sandbox has checked out: `wc/<issue_id>/<workcell_id>`.
    pub branch_name: String,

    /// Commit the sandbox was created from.
    pub base_commit: String,

    /// Directory for captured subprocess logs (inside the sandbox).
    pub logs_dir: PathBuf,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Manifests
// ---------------------------------------------------------------------------

/// One quality gate command to run during verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GateCommand {
    /// Gate name (`test`, `typecheck`, `lint`, `build`, or custom).
    pub name: String,
    /// Shell command executed in the workcell directory.
    pub command: String,
    /// Per-gate timeout in seconds.
    pub timeout_seconds: u64,
}

/// Toolchain selection and sampling knobs for a single run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ToolchainRun {
    /// Registered adapter name (`claude`, `codex`, ...).
    pub toolchain: String,

    /// Model override for this run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Sampling parameters chosen by the controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling: Option<Sampling>,

    /// Identifier of the prompt genome used to assemble the prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_genome_id: Option<String>,
}

/// The read-only instruction packet handed to a toolchain adapter.
///
/// Serialized exactly once per run (to `manifest.json`) before the adapter
/// is invoked, and never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Manifest {
    /// Contract version.
    pub schema_version: String,

    /// Workcell this manifest targets.
    pub workcell_id: String,

    /// Branch the adapter works on.
    pub branch_name: String,

    /// Embedded copy of the issue at dispatch time.
    pub issue: Issue,

    /// Gates that will be run by the verifier after execution.
    #[serde(default)]
    pub quality_gates: Vec<GateCommand>,

    /// Toolchain selection and sampling for this run.
    pub toolchain_config: ToolchainRun,

    /// Opaque planner bundle, present when the planner is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planner: Option<serde_json::Value>,

    /// Keys introduced by `manifest_overrides` that have no typed field.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Manifest {
    /// Serialize to a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::Json`] if serialization fails.
    pub fn to_value(&self) -> Result<serde_json::Value, ContractError> {
        Ok(serde_json::to_value(self)?)
    }
}
