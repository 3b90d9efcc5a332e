// SPDX-License-Identifier: MIT OR Apache-2.0
//! Deterministic in-process adapter for tests and dry runs.

use crate::driver;
use crate::{CostEstimate, DEFAULT_TOKEN_ESTIMATE, ToolchainAdapter};
use async_trait::async_trait;
use chrono::Utc;
use cyntra_config::ToolchainConfig;
use cyntra_core::{
    DiffStats, Manifest, Patch, PatchProof, ProofBuilder, ProofStatus, Workcell,
};
use cyntra_paths::ForbiddenPaths;
use std::time::Duration;

/// What the mock pretends happened.
#[derive(Debug, Clone)]
pub struct MockBehavior {
    /// Outcome status (timeout/error produce the matching proof shapes).
    pub status: ProofStatus,
    /// Confidence override; defaults from the status.
    pub confidence: Option<f64>,
    /// Simulated execution time before returning.
    pub sleep: Duration,
    /// Files the fake patch claims to modify.
    pub files_modified: Vec<String>,
    /// Fake diff counters.
    pub insertions: u64,
    /// Fake diff counters.
    pub deletions: u64,
    /// Overrides the measured duration in the proof metadata.
    pub duration_ms: Option<u64>,
    /// Reported cost.
    pub cost_usd: Option<f64>,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            status: ProofStatus::Success,
            confidence: None,
            sleep: Duration::ZERO,
            files_modified: vec!["src/lib.rs".into()],
            insertions: 10,
            deletions: 2,
            duration_ms: None,
            cost_usd: None,
        }
    }
}

/// Adapter that fabricates proofs without spawning anything.
pub struct MockAdapter {
    name: String,
    behavior: MockBehavior,
}

impl MockAdapter {
    /// Mock registered under `mock` with the given behavior.
    #[must_use]
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            name: "mock".into(),
            behavior,
        }
    }

    /// Succeeding mock with default behavior.
    #[must_use]
    pub fn succeeding() -> Self {
        Self::new(MockBehavior::default())
    }

    /// Mock that reports the given status.
    #[must_use]
    pub fn with_status(status: ProofStatus) -> Self {
        Self::new(MockBehavior {
            status,
            ..MockBehavior::default()
        })
    }

    /// Mock registered under an arbitrary name (to impersonate `claude`
    /// or `codex` in kernel tests).
    #[must_use]
    pub fn named(name: impl Into<String>, behavior: MockBehavior) -> Self {
        Self {
            name: name.into(),
            behavior,
        }
    }

    /// Build from toolchain config (`config.status`, `config.sleep_ms`).
    #[must_use]
    pub fn from_config(tc: &ToolchainConfig) -> Self {
        let status = tc
            .config
            .get("status")
            .and_then(|v| v.as_str())
            .and_then(|s| match s {
                "success" => Some(ProofStatus::Success),
                "partial" => Some(ProofStatus::Partial),
                "failed" => Some(ProofStatus::Failed),
                "error" => Some(ProofStatus::Error),
                "timeout" => Some(ProofStatus::Timeout),
                _ => None,
            })
            .unwrap_or(ProofStatus::Success);
        let sleep_ms = tc
            .config
            .get("sleep_ms")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0);
        Self::new(MockBehavior {
            status,
            sleep: Duration::from_millis(sleep_ms),
            ..MockBehavior::default()
        })
    }
}

#[async_trait]
impl ToolchainAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn available(&self) -> bool {
        true
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn estimate_cost(&self, manifest: &Manifest) -> CostEstimate {
        CostEstimate {
            estimated_tokens: manifest.issue.estimated_tokens(DEFAULT_TOKEN_ESTIMATE),
            estimated_cost_usd: 0.0,
            model: "mock".into(),
        }
    }

    async fn execute(
        &self,
        manifest: &Manifest,
        workcell: &Workcell,
        timeout: Duration,
    ) -> PatchProof {
        let started_at = Utc::now();
        if !self.behavior.sleep.is_zero() {
            // A sleep longer than the deadline behaves like a real timeout.
            if self.behavior.sleep >= timeout {
                tokio::time::sleep(timeout).await;
                let proof = driver::timeout_proof(self.name(), manifest, started_at);
                driver::write_proof(workcell, &proof);
                return proof;
            }
            tokio::time::sleep(self.behavior.sleep).await;
        }

        let proof = match self.behavior.status {
            ProofStatus::Timeout => driver::timeout_proof(self.name(), manifest, started_at),
            ProofStatus::Error => {
                driver::error_proof(self.name(), manifest, started_at, "mock error")
            }
            status => {
                let forbidden = ForbiddenPaths::new(&manifest.issue.forbidden_paths);
                let violations = forbidden
                    .violations(self.behavior.files_modified.iter().map(String::as_str));
                let patch = Patch {
                    branch: manifest.branch_name.clone(),
                    base_commit: workcell.base_commit.clone(),
                    head_commit: workcell.base_commit.clone(),
                    diff_stats: DiffStats {
                        files_changed: self.behavior.files_modified.len() as u64,
                        insertions: self.behavior.insertions,
                        deletions: self.behavior.deletions,
                    },
                    files_modified: self.behavior.files_modified.clone(),
                    forbidden_path_violations: violations,
                };

                let mut completed_at = Utc::now();
                if let Some(ms) = self.behavior.duration_ms {
                    completed_at = started_at + chrono::Duration::milliseconds(ms as i64);
                }

                let mut builder =
                    ProofBuilder::new(self.name(), &manifest.workcell_id, &manifest.issue.id)
                        .status(status)
                        .patch(patch)
                        .started_at(started_at)
                        .completed_at(completed_at)
                        .exit_code(match status {
                            ProofStatus::Success => 0,
                            ProofStatus::Partial => 1,
                            _ => 2,
                        });
                if let Some(c) = self.behavior.confidence {
                    builder = builder.confidence(c);
                }
                if let Some(cost) = self.behavior.cost_usd {
                    builder = builder.cost_usd(cost);
                }
                builder.build()
            }
        };

        driver::write_proof(workcell, &proof);
        proof
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyntra_core::{Issue, RiskLevel, ToolchainRun, SCHEMA_VERSION};
    use std::collections::BTreeMap;

    fn fixture(forbidden: &[&str]) -> (Manifest, Workcell, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut issue = Issue::new("42", "t");
        issue.forbidden_paths = forbidden.iter().map(|s| s.to_string()).collect();
        let manifest = Manifest {
            schema_version: SCHEMA_VERSION.into(),
            workcell_id: "wc-42-abcd1234".into(),
            branch_name: "wc/42/wc-42-abcd1234".into(),
            issue,
            quality_gates: Vec::new(),
            toolchain_config: ToolchainRun {
                toolchain: "mock".into(),
                ..ToolchainRun::default()
            },
            planner: None,
            extra: BTreeMap::new(),
        };
        let workcell = Workcell {
            workcell_id: "wc-42-abcd1234".into(),
            issue_id: "42".into(),
            path: dir.path().to_path_buf(),
            branch_name: "wc/42/wc-42-abcd1234".into(),
            base_commit: "abc123".into(),
            logs_dir: dir.path().join("logs"),
            created_at: Utc::now(),
        };
        (manifest, workcell, dir)
    }

    #[tokio::test]
    async fn success_writes_proof_json() {
        let (manifest, workcell, _dir) = fixture(&[]);
        let adapter = MockAdapter::succeeding();
        let proof = adapter
            .execute(&manifest, &workcell, Duration::from_secs(5))
            .await;

        assert_eq!(proof.status, ProofStatus::Success);
        assert_eq!(proof.confidence, 0.8);
        assert!(workcell.path.join("proof.json").exists());

        let written =
            PatchProof::from_json(&std::fs::read_to_string(workcell.path.join("proof.json")).unwrap())
                .unwrap();
        assert_eq!(written.workcell_id, proof.workcell_id);
    }

    #[tokio::test]
    async fn forbidden_paths_flow_through_mock() {
        let (manifest, workcell, _dir) = fixture(&["src/"]);
        let adapter = MockAdapter::succeeding();
        let proof = adapter
            .execute(&manifest, &workcell, Duration::from_secs(5))
            .await;

        assert_eq!(proof.patch.forbidden_path_violations, vec!["src/lib.rs"]);
        assert_eq!(proof.risk_classification, RiskLevel::Critical);
    }

    #[tokio::test]
    async fn timeout_behavior_produces_timeout_proof() {
        let (manifest, workcell, _dir) = fixture(&[]);
        let adapter = MockAdapter::new(MockBehavior {
            sleep: Duration::from_secs(60),
            ..MockBehavior::default()
        });
        let proof = adapter
            .execute(&manifest, &workcell, Duration::from_millis(10))
            .await;
        assert_eq!(proof.status, ProofStatus::Timeout);
        assert_eq!(proof.confidence, 0.0);
        assert_eq!(proof.metadata.error.as_deref(), Some(driver::TIMEOUT_ERROR));
    }

    #[tokio::test]
    async fn duration_override_lands_in_metadata() {
        let (manifest, workcell, _dir) = fixture(&[]);
        let adapter = MockAdapter::new(MockBehavior {
            duration_ms: Some(30_000),
            ..MockBehavior::default()
        });
        let proof = adapter
            .execute(&manifest, &workcell, Duration::from_secs(5))
            .await;
        assert_eq!(proof.metadata.duration_ms, 30_000);
    }
}
