// SPDX-License-Identifier: MIT OR Apache-2.0
//! The patch proof: the structured outcome record of a single dispatch.
//!
//! A proof is created by a toolchain adapter, extended by hooks, and
//! finalized by the verifier. It is persisted at `<workcell>/proof.json`
//! and mirrored into the run directory.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::{ContractError, RiskLevel, SCHEMA_VERSION};

/// Path fragments that mark a modified file as high-risk.
pub const HIGH_RISK_PATH_MARKERS: &[&str] = &[
    "auth",
    "security",
    "password",
    "secret",
    "key",
    "migration",
    "schema",
    "database",
    "payment",
    "billing",
];

/// Outcome status of an adapter execution.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ProofStatus {
    /// Subprocess exited 0.
    Success,
    /// Subprocess exited 1: work happened but the agent reports it incomplete.
    Partial,
    /// Subprocess exited with a code above 1.
    Failed,
    /// Spawn or I/O failure before a meaningful exit.
    Error,
    /// The wall-clock deadline elapsed.
    Timeout,
}

impl ProofStatus {
    /// Map a subprocess exit code to a status.
    #[must_use]
    pub fn from_exit_code(code: i32) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::Partial,
            _ => Self::Failed,
        }
    }

    /// Default confidence for this status when the subprocess did not
    /// report one itself.
    #[must_use]
    pub fn default_confidence(&self) -> f64 {
        match self {
            Self::Success => 0.8,
            Self::Partial => 0.5,
            Self::Failed => 0.2,
            Self::Error | Self::Timeout => 0.0,
        }
    }

    /// Lowercase wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::Error => "error",
            Self::Timeout => "timeout",
        }
    }
}

/// Summary counters parsed from `git diff --stat`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub struct DiffStats {
    /// Number of files changed.
    pub files_changed: u64,
    /// Lines inserted.
    pub insertions: u64,
    /// Lines deleted.
    pub deletions: u64,
}

impl DiffStats {
    /// Total line delta (insertions + deletions).
    #[must_use]
    pub fn total_changes(&self) -> u64 {
        self.insertions + self.deletions
    }
}

/// What the sandbox's VCS says about the attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Patch {
    /// Branch the adapter worked on.
    pub branch: String,
    /// Merge-base of the branch with the repository default branch.
    pub base_commit: String,
    /// Tip of the branch after execution.
    pub head_commit: String,
    /// Parsed diff summary.
    pub diff_stats: DiffStats,
    /// Paths modified relative to the sandbox root.
    pub files_modified: Vec<String>,
    /// Modified paths that matched a forbidden pattern.
    pub forbidden_path_violations: Vec<String>,
}

impl Patch {
    /// Classify the risk of this patch.
    ///
    /// Forbidden-path violations are always `critical`. Otherwise a path
    /// containing any [`HIGH_RISK_PATH_MARKERS`] fragment, or a line delta
    /// above 500, is `high`; a delta above 100 is `medium`; everything else
    /// is `low`.
    #[must_use]
    pub fn classify_risk(&self) -> RiskLevel {
        if !self.forbidden_path_violations.is_empty() {
            return RiskLevel::Critical;
        }

        for file in &self.files_modified {
            let lower = file.to_lowercase();
            if HIGH_RISK_PATH_MARKERS.iter().any(|m| lower.contains(m)) {
                return RiskLevel::High;
            }
        }

        match self.diff_stats.total_changes() {
            n if n > 500 => RiskLevel::High,
            n if n > 100 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }
}

/// Result of a single quality gate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GateResult {
    /// Whether the gate command exited 0.
    pub passed: bool,
    /// Truncated stdout capture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    /// Truncated stderr capture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    /// Gate wall-clock duration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Flaky-retry attempts consumed before the recorded outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries_used: Option<u32>,
}

/// Aggregated verification outcome across all configured gates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Verification {
    /// Per-gate results, keyed by gate name.
    #[serde(default)]
    pub gates: BTreeMap<String, GateResult>,
    /// AND over all configured gates (false until verification ran).
    #[serde(default)]
    pub all_passed: bool,
    /// Failed gate names in configured order, plus `forbidden_paths` when
    /// the patch violated one.
    #[serde(default)]
    pub blocking_failures: Vec<String>,
    /// Outputs merged from `ON_GATE_FAILURE` hooks, keyed by hook name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub debug_analysis: BTreeMap<String, serde_json::Value>,
}

/// Timing, identity, and usage metadata for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProofMetadata {
    /// Adapter that executed the run.
    pub toolchain: String,
    /// Version reported by the external binary, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolchain_version: Option<String>,
    /// Model used for the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Prompt genome used to assemble the prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_genome_id: Option<String>,
    /// Sampling parameters used for the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling: Option<Sampling>,
    /// When the adapter started its clock (before spawn).
    pub started_at: DateTime<Utc>,
    /// When the adapter stopped its clock (on return).
    pub completed_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Subprocess exit code, absent on spawn failure or timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Tokens consumed as reported by the subprocess, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
    /// Cost in USD as reported by the subprocess, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    /// Error description for `error` / `timeout` outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Sampling parameters for an LLM-backed run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Sampling {
    /// Sampling temperature.
    pub temperature: f64,
    /// Nucleus sampling cutoff.
    pub top_p: f64,
}

/// One subprocess invocation recorded in the proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CommandRecord {
    /// Command that was run.
    pub command: String,
    /// Exit code, absent when the process never exited cleanly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Path to the captured stdout log, when one was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout_path: Option<String>,
    /// Path to the captured stderr log, when one was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr_path: Option<String>,
}

/// Hook-contributed review data attached after execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Review {
    /// Names of hooks that ran, in execution order.
    #[serde(default)]
    pub hooks_executed: Vec<String>,
    /// Free-form recommendations extracted from hook outputs.
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// Raw hook outputs, keyed by hook name.
    #[serde(default)]
    pub hook_outputs: BTreeMap<String, serde_json::Value>,
}

/// The outcome record of a single dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PatchProof {
    /// Contract version.
    pub schema_version: String,
    /// Workcell the run executed in.
    pub workcell_id: String,
    /// Issue the run attempted.
    pub issue_id: String,
    /// Outcome status.
    pub status: ProofStatus,
    /// VCS-derived change description.
    pub patch: Patch,
    /// Gate results, finalized by the verifier.
    pub verification: Verification,
    /// Timing and usage metadata.
    pub metadata: ProofMetadata,
    /// Subprocesses executed during the run, in order.
    #[serde(default)]
    pub commands_executed: Vec<CommandRecord>,
    /// Adapter confidence in the attempt, in `[0, 1]`.
    pub confidence: f64,
    /// Classified risk of the patch.
    pub risk_classification: RiskLevel,
    /// Hook-contributed review, when post-execution hooks ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<Review>,
    /// Adapter-specific opaque artifacts (e.g. generation-server outputs).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub artifacts: BTreeMap<String, serde_json::Value>,
    /// Canonical SHA-256 of the proof (filled in by `with_hash`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_sha256: Option<String>,
}

impl PatchProof {
    /// Serialize to pretty JSON for persistence.
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::Json`] if the proof cannot be serialized.
    pub fn to_json(&self) -> Result<String, ContractError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize a proof from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::Json`] on malformed input.
    pub fn from_json(json: &str) -> Result<Self, ContractError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Compute and attach the canonical hash, returning the updated proof.
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::Json`] if the proof cannot be serialized.
    pub fn with_hash(mut self) -> Result<Self, ContractError> {
        let h = proof_hash(&self)?;
        self.proof_sha256 = Some(h);
        Ok(self)
    }
}

/// Produce a deterministic JSON string for hashing and tie-breaking.
///
/// Keys are sorted (the `Value` object map orders them), there is no
/// whitespace, and the output is UTF-8: the properties the voter relies
/// on for cross-implementation determinism.
///
/// # Errors
///
/// Returns [`ContractError::Json`] if the value cannot be serialized.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, ContractError> {
    let v = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&v)?)
}

/// Compute the hex-encoded SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Compute the canonical hash of a proof.
///
/// `proof_sha256` is forced to `null` before hashing so the stored hash
/// never feeds back into itself.
///
/// # Errors
///
/// Returns [`ContractError::Json`] if the proof cannot be serialized.
pub fn proof_hash(proof: &PatchProof) -> Result<String, ContractError> {
    let mut v = serde_json::to_value(proof)?;
    if let serde_json::Value::Object(map) = &mut v {
        map.insert("proof_sha256".to_string(), serde_json::Value::Null);
    }
    let json = serde_json::to_string(&v)?;
    Ok(sha256_hex(json.as_bytes()))
}

/// Builder for constructing [`PatchProof`]s ergonomically.
///
/// # Examples
///
/// ```
/// use cyntra_core::{ProofBuilder, ProofStatus};
///
/// let proof = ProofBuilder::new("claude", "wc-42-abcd1234", "42")
///     .status(ProofStatus::Success)
///     .build();
///
/// assert_eq!(proof.metadata.toolchain, "claude");
/// assert_eq!(proof.status, ProofStatus::Success);
/// assert_eq!(proof.confidence, 0.8);
/// ```
#[derive(Debug)]
pub struct ProofBuilder {
    toolchain: String,
    workcell_id: String,
    issue_id: String,
    status: ProofStatus,
    patch: Patch,
    verification: Verification,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    exit_code: Option<i32>,
    model: Option<String>,
    toolchain_version: Option<String>,
    prompt_genome_id: Option<String>,
    sampling: Option<Sampling>,
    tokens_used: Option<u64>,
    cost_usd: Option<f64>,
    error: Option<String>,
    commands_executed: Vec<CommandRecord>,
    confidence: Option<f64>,
    risk_classification: Option<RiskLevel>,
    artifacts: BTreeMap<String, serde_json::Value>,
}

impl ProofBuilder {
    /// Start a builder for the given toolchain, workcell, and issue.
    #[must_use]
    pub fn new(
        toolchain: impl Into<String>,
        workcell_id: impl Into<String>,
        issue_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            toolchain: toolchain.into(),
            workcell_id: workcell_id.into(),
            issue_id: issue_id.into(),
            status: ProofStatus::Error,
            patch: Patch::default(),
            verification: Verification::default(),
            started_at: now,
            completed_at: now,
            exit_code: None,
            model: None,
            toolchain_version: None,
            prompt_genome_id: None,
            sampling: None,
            tokens_used: None,
            cost_usd: None,
            error: None,
            commands_executed: Vec::new(),
            confidence: None,
            risk_classification: None,
            artifacts: BTreeMap::new(),
        }
    }

    /// Set the outcome status.
    #[must_use]
    pub fn status(mut self, status: ProofStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the patch description; also drives the default risk classification.
    #[must_use]
    pub fn patch(mut self, patch: Patch) -> Self {
        self.patch = patch;
        self
    }

    /// Set the verification block (normally left default for the verifier).
    #[must_use]
    pub fn verification(mut self, verification: Verification) -> Self {
        self.verification = verification;
        self
    }

    /// Set the run start timestamp.
    #[must_use]
    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = at;
        self
    }

    /// Set the run completion timestamp.
    #[must_use]
    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = at;
        self
    }

    /// Set the subprocess exit code.
    #[must_use]
    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Set the model used.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the version reported by the external binary.
    #[must_use]
    pub fn toolchain_version(mut self, version: impl Into<String>) -> Self {
        self.toolchain_version = Some(version.into());
        self
    }

    /// Set the prompt genome id.
    #[must_use]
    pub fn prompt_genome_id(mut self, id: impl Into<String>) -> Self {
        self.prompt_genome_id = Some(id.into());
        self
    }

    /// Set the sampling parameters.
    #[must_use]
    pub fn sampling(mut self, sampling: Sampling) -> Self {
        self.sampling = Some(sampling);
        self
    }

    /// Set reported token usage.
    #[must_use]
    pub fn tokens_used(mut self, tokens: u64) -> Self {
        self.tokens_used = Some(tokens);
        self
    }

    /// Set reported cost.
    #[must_use]
    pub fn cost_usd(mut self, cost: f64) -> Self {
        self.cost_usd = Some(cost);
        self
    }

    /// Set the error description.
    #[must_use]
    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Append an executed-command record.
    #[must_use]
    pub fn add_command(mut self, record: CommandRecord) -> Self {
        self.commands_executed.push(record);
        self
    }

    /// Override the confidence (defaults by status).
    #[must_use]
    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    /// Override the risk classification (defaults from the patch).
    #[must_use]
    pub fn risk_classification(mut self, risk: RiskLevel) -> Self {
        self.risk_classification = Some(risk);
        self
    }

    /// Attach an opaque artifact reference.
    #[must_use]
    pub fn add_artifact(mut self, kind: impl Into<String>, value: serde_json::Value) -> Self {
        self.artifacts.insert(kind.into(), value);
        self
    }

    /// Consume the builder and produce a [`PatchProof`].
    #[must_use]
    pub fn build(self) -> PatchProof {
        let duration_ms = (self.completed_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64;
        let risk = self
            .risk_classification
            .unwrap_or_else(|| self.patch.classify_risk());
        let confidence = self
            .confidence
            .unwrap_or_else(|| self.status.default_confidence());

        PatchProof {
            schema_version: SCHEMA_VERSION.to_string(),
            workcell_id: self.workcell_id,
            issue_id: self.issue_id,
            status: self.status,
            patch: self.patch,
            verification: self.verification,
            metadata: ProofMetadata {
                toolchain: self.toolchain,
                toolchain_version: self.toolchain_version,
                model: self.model,
                prompt_genome_id: self.prompt_genome_id,
                sampling: self.sampling,
                started_at: self.started_at,
                completed_at: self.completed_at,
                duration_ms,
                exit_code: self.exit_code,
                tokens_used: self.tokens_used,
                cost_usd: self.cost_usd,
                error: self.error,
            },
            commands_executed: self.commands_executed,
            confidence,
            risk_classification: risk,
            review: None,
            artifacts: self.artifacts,
            proof_sha256: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch_with(files: &[&str], insertions: u64, deletions: u64) -> Patch {
        Patch {
            branch: "wc/42/wc-42-abcd1234".into(),
            base_commit: "aaaa".into(),
            head_commit: "bbbb".into(),
            diff_stats: DiffStats {
                files_changed: files.len() as u64,
                insertions,
                deletions,
            },
            files_modified: files.iter().map(|f| f.to_string()).collect(),
            forbidden_path_violations: Vec::new(),
        }
    }

    #[test]
    fn exit_code_mapping() {
        assert_eq!(ProofStatus::from_exit_code(0), ProofStatus::Success);
        assert_eq!(ProofStatus::from_exit_code(1), ProofStatus::Partial);
        assert_eq!(ProofStatus::from_exit_code(2), ProofStatus::Failed);
        assert_eq!(ProofStatus::from_exit_code(127), ProofStatus::Failed);
    }

    #[test]
    fn default_confidence_by_status() {
        assert_eq!(ProofStatus::Success.default_confidence(), 0.8);
        assert_eq!(ProofStatus::Partial.default_confidence(), 0.5);
        assert_eq!(ProofStatus::Failed.default_confidence(), 0.2);
        assert_eq!(ProofStatus::Timeout.default_confidence(), 0.0);
        assert_eq!(ProofStatus::Error.default_confidence(), 0.0);
    }

    #[test]
    fn risk_forbidden_paths_are_critical() {
        let mut patch = patch_with(&["src/lib.rs"], 10, 2);
        patch.forbidden_path_violations = vec![".github/workflows/ci.yml".into()];
        assert_eq!(patch.classify_risk(), RiskLevel::Critical);
    }

    #[test]
    fn risk_sensitive_path_markers() {
        let patch = patch_with(&["src/auth/session.rs"], 5, 1);
        assert_eq!(patch.classify_risk(), RiskLevel::High);

        let patch = patch_with(&["migrations/0042_add_column.sql"], 5, 1);
        assert_eq!(patch.classify_risk(), RiskLevel::High);
    }

    #[test]
    fn risk_by_line_delta() {
        assert_eq!(patch_with(&["src/a.rs"], 40, 20).classify_risk(), RiskLevel::Low);
        assert_eq!(
            patch_with(&["src/a.rs"], 90, 20).classify_risk(),
            RiskLevel::Medium
        );
        assert_eq!(
            patch_with(&["src/a.rs"], 400, 200).classify_risk(),
            RiskLevel::High
        );
    }

    #[test]
    fn risk_boundary_values() {
        // Exactly 100 is still low; exactly 500 is still medium.
        assert_eq!(patch_with(&["src/a.rs"], 100, 0).classify_risk(), RiskLevel::Low);
        assert_eq!(
            patch_with(&["src/a.rs"], 500, 0).classify_risk(),
            RiskLevel::Medium
        );
    }

    #[test]
    fn empty_diff_is_low_risk() {
        let patch = Patch::default();
        assert_eq!(patch.classify_risk(), RiskLevel::Low);
        assert_eq!(patch.diff_stats, DiffStats::default());
    }

    #[test]
    fn builder_defaults_confidence_and_risk() {
        let proof = ProofBuilder::new("claude", "wc-42-abcd1234", "42")
            .status(ProofStatus::Success)
            .patch(patch_with(&["src/a.rs", "src/b.rs", "src/c.rs"], 30, 5))
            .exit_code(0)
            .build();

        assert_eq!(proof.schema_version, SCHEMA_VERSION);
        assert_eq!(proof.confidence, 0.8);
        assert_eq!(proof.risk_classification, RiskLevel::Low);
        assert_eq!(proof.metadata.exit_code, Some(0));
        assert!(!proof.verification.all_passed);
    }

    #[test]
    fn builder_confidence_is_clamped() {
        let proof = ProofBuilder::new("codex", "wc-1-x", "1")
            .status(ProofStatus::Success)
            .confidence(3.0)
            .build();
        assert_eq!(proof.confidence, 1.0);
    }

    #[test]
    fn json_roundtrip_preserves_proof() {
        let proof = ProofBuilder::new("claude", "wc-42-abcd1234", "42")
            .status(ProofStatus::Partial)
            .patch(patch_with(&["src/billing/invoice.rs"], 600, 10))
            .exit_code(1)
            .tokens_used(12_345)
            .cost_usd(0.42)
            .build();

        let json = proof.to_json().unwrap();
        let back = PatchProof::from_json(&json).unwrap();
        assert_eq!(back, proof);
    }

    #[test]
    fn hash_ignores_stored_hash() {
        let proof = ProofBuilder::new("claude", "wc-42-abcd1234", "42")
            .status(ProofStatus::Success)
            .build();

        let bare = proof_hash(&proof).unwrap();
        let hashed = proof.with_hash().unwrap();
        assert_eq!(hashed.proof_sha256.as_deref(), Some(bare.as_str()));
        // Hashing again after the hash was attached is stable.
        assert_eq!(proof_hash(&hashed).unwrap(), bare);
    }

    #[test]
    fn canonical_json_has_no_whitespace_and_sorted_keys() {
        let value = serde_json::json!({"b": 1, "a": {"z": true, "y": [1, 2]}});
        let canon = canonical_json(&value).unwrap();
        assert_eq!(canon, r#"{"a":{"y":[1,2],"z":true},"b":1}"#);
    }

    #[test]
    fn sha256_matches_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
