// SPDX-License-Identifier: MIT OR Apache-2.0
//! Non-LLM adapter: submits a workflow to an external generation server
//! and polls for completion.
//!
//! The server speaks a small HTTP surface: `POST /prompt` to enqueue,
//! `GET /history/{job}` to poll, `GET /system_stats` as the health probe.

use crate::driver;
use crate::{CostEstimate, ToolchainAdapter};
use async_trait::async_trait;
use chrono::Utc;
use cyntra_config::ToolchainConfig;
use cyntra_core::{CommandRecord, Manifest, PatchProof, ProofBuilder, ProofStatus, Workcell};
use cyntra_telemetry::TelemetryEventKind;
use std::time::{Duration, Instant};
use tracing::debug;

const DEFAULT_PORT: u64 = 8188;
const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
const DEFAULT_WORKFLOW_FILE: &str = "workflow.json";

/// Adapter that drives a generation server instead of a local subprocess.
pub struct WorkflowAdapter {
    base_url: String,
    client: reqwest::Client,
    poll_interval: Duration,
    workflow_file: String,
}

impl WorkflowAdapter {
    /// Build the adapter from its toolchain configuration.
    ///
    /// Recognised `config` keys: `host` (default `localhost`), `port`
    /// (default 8188), `poll_interval_ms` (default 2000), `workflow_file`
    /// (default `workflow.json`, resolved inside the workcell).
    #[must_use]
    pub fn new(tc: &ToolchainConfig) -> Self {
        let cfg = &tc.config;
        let host = cfg
            .get("host")
            .and_then(|v| v.as_str())
            .unwrap_or("localhost")
            .to_string();
        let port = cfg
            .get("port")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(DEFAULT_PORT);
        let poll_interval_ms = cfg
            .get("poll_interval_ms")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);

        Self {
            base_url: format!("http://{host}:{port}"),
            client: reqwest::Client::new(),
            poll_interval: Duration::from_millis(poll_interval_ms.max(100)),
            workflow_file: cfg
                .get("workflow_file")
                .and_then(|v| v.as_str())
                .unwrap_or(DEFAULT_WORKFLOW_FILE)
                .to_string(),
        }
    }

    fn workflow_path(&self, manifest: &Manifest, workcell: &Workcell) -> std::path::PathBuf {
        let file = manifest
            .extra
            .get("workflow_path")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.workflow_file);
        workcell.path.join(file)
    }

    async fn submit(&self, workflow: &serde_json::Value, client_id: &str) -> Result<String, String> {
        let body = serde_json::json!({ "prompt": workflow, "client_id": client_id });
        let resp = self
            .client
            .post(format!("{}/prompt", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("submit failed: {e}"))?;
        if !resp.status().is_success() {
            return Err(format!("submit rejected: HTTP {}", resp.status()));
        }
        let value: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| format!("submit response unreadable: {e}"))?;
        value
            .get("prompt_id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| "submit response missing prompt_id".to_string())
    }

    /// Poll history until the job shows outputs. `None` means the deadline
    /// elapsed first.
    async fn poll(&self, job_id: &str, deadline: Duration) -> Option<serde_json::Value> {
        let started = Instant::now();
        loop {
            if started.elapsed() >= deadline {
                return None;
            }

            if let Ok(resp) = self
                .client
                .get(format!("{}/history/{}", self.base_url, job_id))
                .send()
                .await
            {
                if let Ok(value) = resp.json::<serde_json::Value>().await {
                    if let Some(entry) = value.get(job_id) {
                        if let Some(outputs) = entry.get("outputs") {
                            return Some(outputs.clone());
                        }
                    }
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl ToolchainAdapter for WorkflowAdapter {
    fn name(&self) -> &str {
        "workflow"
    }

    fn available(&self) -> bool {
        // Reachability is a property of the server, checked actively.
        true
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(format!("{}/system_stats", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn estimate_cost(&self, _manifest: &Manifest) -> CostEstimate {
        // Generation-server runs consume no LLM tokens from the kernel's
        // budget; the server accounts for its own compute.
        CostEstimate {
            estimated_tokens: 0,
            estimated_cost_usd: 0.0,
            model: "workflow".into(),
        }
    }

    async fn execute(
        &self,
        manifest: &Manifest,
        workcell: &Workcell,
        timeout: Duration,
    ) -> PatchProof {
        let started_at = Utc::now();
        let started = Instant::now();
        let telemetry = driver::open_telemetry(self.name(), None, manifest, workcell);

        let proof = 'run: {
            if !self.health_check().await {
                break 'run driver::error_proof(
                    self.name(),
                    manifest,
                    started_at,
                    "generation server not available",
                );
            }

            let workflow_path = self.workflow_path(manifest, workcell);
            let workflow: serde_json::Value = match std::fs::read_to_string(&workflow_path)
                .map_err(|e| e.to_string())
                .and_then(|raw| serde_json::from_str(&raw).map_err(|e| e.to_string()))
            {
                Ok(w) => w,
                Err(e) => {
                    break 'run driver::error_proof(
                        self.name(),
                        manifest,
                        started_at,
                        &format!("workflow unreadable at {}: {e}", workflow_path.display()),
                    );
                }
            };

            if let Some(t) = &telemetry {
                t.emit(TelemetryEventKind::Started {
                    prompt_genome_id: None,
                    sampling: None,
                });
            }

            let job_id = match self.submit(&workflow, &workcell.workcell_id).await {
                Ok(id) => id,
                Err(e) => break 'run driver::error_proof(self.name(), manifest, started_at, &e),
            };
            debug!(target: "cyntra.adapter", job_id = %job_id, "workflow submitted");

            let Some(outputs) = self.poll(&job_id, timeout).await else {
                break 'run driver::timeout_proof(self.name(), manifest, started_at);
            };

            ProofBuilder::new(self.name(), &manifest.workcell_id, &manifest.issue.id)
                .status(ProofStatus::Success)
                .started_at(started_at)
                .completed_at(Utc::now())
                .confidence(0.9)
                .add_artifact("job_id", serde_json::json!(job_id))
                .add_artifact("outputs", outputs)
                .add_command(CommandRecord {
                    command: format!("POST {}/prompt", self.base_url),
                    exit_code: None,
                    duration_ms: started.elapsed().as_millis() as u64,
                    stdout_path: None,
                    stderr_path: None,
                })
                .build()
        };

        if let Some(t) = &telemetry {
            t.emit(TelemetryEventKind::Completed {
                status: proof.status.as_str().to_string(),
                exit_code: None,
                duration_ms: proof.metadata.duration_ms,
            });
        }
        driver::write_proof(workcell, &proof);
        proof
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_from_config() {
        let mut tc = ToolchainConfig::default();
        tc.config.insert("host".into(), serde_json::json!("gpu-box"));
        tc.config.insert("port".into(), serde_json::json!(9999));
        let adapter = WorkflowAdapter::new(&tc);
        assert_eq!(adapter.base_url, "http://gpu-box:9999");
    }

    #[test]
    fn cost_estimate_is_free() {
        let adapter = WorkflowAdapter::new(&ToolchainConfig::default());
        let manifest = cyntra_core::Manifest {
            schema_version: cyntra_core::SCHEMA_VERSION.into(),
            workcell_id: "wc-1-x".into(),
            branch_name: "wc/1/wc-1-x".into(),
            issue: cyntra_core::Issue::new("1", "t"),
            quality_gates: Vec::new(),
            toolchain_config: cyntra_core::ToolchainRun {
                toolchain: "workflow".into(),
                ..cyntra_core::ToolchainRun::default()
            },
            planner: None,
            extra: std::collections::BTreeMap::new(),
        };
        let est = adapter.estimate_cost(&manifest);
        assert_eq!(est.estimated_tokens, 0);
        assert_eq!(est.estimated_cost_usd, 0.0);
    }

    #[test]
    fn poll_interval_has_floor() {
        let mut tc = ToolchainConfig::default();
        tc.config
            .insert("poll_interval_ms".into(), serde_json::json!(1));
        let adapter = WorkflowAdapter::new(&tc);
        assert!(adapter.poll_interval >= Duration::from_millis(100));
    }
}
