// SPDX-License-Identifier: MIT OR Apache-2.0
//! cyntra-verify
#![deny(unsafe_code)]
//!
//! Runs the configured quality gates against a workcell, aggregates the
//! results into the proof's `verification` block, and selects winners
//! among concurrent speculate candidates.

/// Winner selection among concurrent proofs.
pub mod vote;

pub use vote::vote;

use cyntra_config::GatesConfig;
use cyntra_core::{GateCommand, GateResult, Manifest, PatchProof, Workcell};
use cyntra_hooks::{HookContext, HookRunner, HookTrigger};
use cyntra_telemetry::{TelemetryEventKind, TelemetryWriter};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Longest gate output kept in the proof, per stream.
const MAX_GATE_CAPTURE: usize = 10_000;

/// Runs quality gates and finalizes proof verification.
pub struct Verifier {
    gates: GatesConfig,
    hooks: Arc<HookRunner>,
}

impl Verifier {
    /// Create a verifier over the given gate configuration and hook runner.
    #[must_use]
    pub fn new(gates: GatesConfig, hooks: Arc<HookRunner>) -> Self {
        Self { gates, hooks }
    }

    /// Run every gate from the manifest in the workcell, fill in
    /// `proof.verification`, fire `ON_GATE_FAILURE` hooks when anything
    /// failed, and return `all_passed`.
    ///
    /// A forbidden-path violation forces `all_passed = false` regardless
    /// of gate outcomes.
    pub async fn verify(
        &self,
        proof: &mut PatchProof,
        workcell: &Workcell,
        manifest: &Manifest,
        telemetry: Option<&TelemetryWriter>,
    ) -> bool {
        let gates = if manifest.quality_gates.is_empty() {
            self.gates.gate_commands()
        } else {
            manifest.quality_gates.clone()
        };

        let mut failed: Vec<String> = Vec::new();
        for gate in &gates {
            if let Some(t) = telemetry {
                t.emit(TelemetryEventKind::GateStarted {
                    gate: gate.name.clone(),
                    command: gate.command.clone(),
                });
            }

            let result = self.run_gate_with_retries(gate, workcell).await;

            if let Some(t) = telemetry {
                t.emit(TelemetryEventKind::GateCompleted {
                    gate: gate.name.clone(),
                    passed: result.passed,
                    duration_ms: result.duration_ms.unwrap_or(0),
                    retries_used: result.retries_used,
                });
            }

            if !result.passed {
                failed.push(gate.name.clone());
            }
            proof.verification.gates.insert(gate.name.clone(), result);
        }

        let violations = !proof.patch.forbidden_path_violations.is_empty();
        let mut blocking = failed.clone();
        if violations {
            blocking.push("forbidden_paths".into());
        }

        proof.verification.all_passed = failed.is_empty() && !violations;
        proof.verification.blocking_failures = blocking;

        if !failed.is_empty() {
            self.fire_gate_failure_hooks(proof, workcell, manifest, &failed)
                .await;
        }

        info!(
            target: "cyntra.verify",
            workcell_id = %workcell.workcell_id,
            all_passed = proof.verification.all_passed,
            failed = ?failed,
            "verification complete"
        );

        proof.verification.all_passed
    }

    /// Flaky-test policy: the `test` gate is re-run up to `retry_flaky`
    /// times before its failure sticks. Other gates get one shot.
    async fn run_gate_with_retries(&self, gate: &GateCommand, workcell: &Workcell) -> GateResult {
        let retries = if gate.name == "test" {
            self.gates.retry_flaky
        } else {
            0
        };

        let mut result = self.run_gate(gate, workcell).await;
        let mut used: u32 = 0;
        while !result.passed && used < retries {
            used += 1;
            debug!(
                target: "cyntra.verify",
                gate = %gate.name,
                attempt = used,
                "re-running flaky gate"
            );
            result = self.run_gate(gate, workcell).await;
        }
        if used > 0 {
            result.retries_used = Some(used);
        }
        result
    }

    async fn run_gate(&self, gate: &GateCommand, workcell: &Workcell) -> GateResult {
        let started = Instant::now();
        let timeout = Duration::from_secs(gate.timeout_seconds.max(1));

        let output = tokio::time::timeout(
            timeout,
            tokio::process::Command::new("sh")
                .args(["-c", &gate.command])
                .current_dir(&workcell.path)
                .stdin(Stdio::null())
                .output(),
        )
        .await;

        let duration_ms = started.elapsed().as_millis() as u64;
        match output {
            Ok(Ok(out)) => GateResult {
                passed: out.status.success(),
                stdout: capture(&out.stdout),
                stderr: capture(&out.stderr),
                duration_ms: Some(duration_ms),
                retries_used: None,
            },
            Ok(Err(e)) => GateResult {
                passed: false,
                stdout: None,
                stderr: Some(format!("gate spawn failed: {e}")),
                duration_ms: Some(duration_ms),
                retries_used: None,
            },
            Err(_elapsed) => GateResult {
                passed: false,
                stdout: None,
                stderr: Some(format!(
                    "gate timed out after {}s",
                    gate.timeout_seconds
                )),
                duration_ms: Some(duration_ms),
                retries_used: None,
            },
        }
    }

    async fn fire_gate_failure_hooks(
        &self,
        proof: &mut PatchProof,
        workcell: &Workcell,
        manifest: &Manifest,
        failed: &[String],
    ) {
        let mut ctx = HookContext::new(
            workcell.path.clone(),
            proof.clone(),
            manifest.clone(),
        );
        ctx.gate_failures = failed.to_vec();

        self.hooks
            .run_hooks_async(HookTrigger::OnGateFailure, &mut ctx)
            .await;

        for (name, output) in ctx.hook_outputs {
            proof.verification.debug_analysis.insert(name, output);
        }
    }
}

fn capture(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    let mut text = String::from_utf8_lossy(bytes).to_string();
    if text.len() > MAX_GATE_CAPTURE {
        // Truncate on a char boundary.
        let mut cut = MAX_GATE_CAPTURE;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("\n[truncated]");
    }
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyntra_config::PostExecutionHooksConfig;
    use cyntra_core::{
        Issue, Manifest, ProofBuilder, ProofStatus, ToolchainRun, SCHEMA_VERSION,
    };
    use cyntra_hooks::{HookDefinition, HookRegistry, HookResult};
    use std::collections::BTreeMap;

    fn fixture(gates: Vec<GateCommand>) -> (Manifest, Workcell, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest {
            schema_version: SCHEMA_VERSION.into(),
            workcell_id: "wc-42-abcd1234".into(),
            branch_name: "wc/42/wc-42-abcd1234".into(),
            issue: Issue::new("42", "t"),
            quality_gates: gates,
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
            base_commit: String::new(),
            logs_dir: dir.path().join("logs"),
            created_at: chrono::Utc::now(),
        };
        (manifest, workcell, dir)
    }

    fn gate(name: &str, command: &str) -> GateCommand {
        GateCommand {
            name: name.into(),
            command: command.into(),
            timeout_seconds: 30,
        }
    }

    fn verifier() -> Verifier {
        let registry = Arc::new(HookRegistry::new());
        let hooks = Arc::new(HookRunner::new(registry, PostExecutionHooksConfig::default()));
        Verifier::new(GatesConfig::default(), hooks)
    }

    fn proof() -> PatchProof {
        ProofBuilder::new("mock", "wc-42-abcd1234", "42")
            .status(ProofStatus::Success)
            .build()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn all_gates_passing_sets_all_passed() {
        let (manifest, workcell, _dir) =
            fixture(vec![gate("test", "true"), gate("lint", "true")]);
        let mut p = proof();
        let passed = verifier().verify(&mut p, &workcell, &manifest, None).await;

        assert!(passed);
        assert!(p.verification.all_passed);
        assert!(p.verification.blocking_failures.is_empty());
        assert!(p.verification.gates["test"].passed);
        assert!(p.verification.gates["lint"].passed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failing_gate_blocks_and_captures_output() {
        let (manifest, workcell, _dir) = fixture(vec![
            gate("test", "echo boom >&2; false"),
            gate("lint", "true"),
        ]);
        let mut p = proof();
        let passed = verifier().verify(&mut p, &workcell, &manifest, None).await;

        assert!(!passed);
        assert!(!p.verification.all_passed);
        assert_eq!(p.verification.blocking_failures, vec!["test"]);
        let test_gate = &p.verification.gates["test"];
        assert!(!test_gate.passed);
        assert!(test_gate.stderr.as_deref().unwrap().contains("boom"));
        // Flaky retries were consumed before the failure stuck.
        assert_eq!(test_gate.retries_used, Some(2));
        // The lint gate still ran and passed.
        assert!(p.verification.gates["lint"].passed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn flaky_test_passes_on_retry() {
        let (manifest, workcell, dir) = fixture(vec![gate(
            "test",
            // Fails on the first run, passes once the marker file exists.
            "test -f marker || { touch marker; false; }",
        )]);
        let mut p = proof();
        let passed = verifier().verify(&mut p, &workcell, &manifest, None).await;

        assert!(passed);
        assert_eq!(p.verification.gates["test"].retries_used, Some(1));
        drop(dir);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn non_test_gates_are_not_retried() {
        let (manifest, workcell, _dir) = fixture(vec![gate("lint", "false")]);
        let mut p = proof();
        verifier().verify(&mut p, &workcell, &manifest, None).await;
        assert_eq!(p.verification.gates["lint"].retries_used, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn gate_timeout_fails_the_gate() {
        let (manifest, workcell, _dir) = fixture(vec![GateCommand {
            name: "test".into(),
            command: "sleep 30".into(),
            timeout_seconds: 1,
        }]);
        let registry = Arc::new(HookRegistry::new());
        let hooks = Arc::new(HookRunner::new(registry, PostExecutionHooksConfig::default()));
        let verifier = Verifier::new(
            GatesConfig {
                retry_flaky: 0,
                ..GatesConfig::default()
            },
            hooks,
        );

        let mut p = proof();
        let passed = verifier.verify(&mut p, &workcell, &manifest, None).await;
        assert!(!passed);
        assert!(
            p.verification.gates["test"]
                .stderr
                .as_deref()
                .unwrap()
                .contains("timed out")
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn forbidden_paths_force_failure_even_with_green_gates() {
        let (manifest, workcell, _dir) = fixture(vec![gate("test", "true")]);
        let mut p = proof();
        p.patch.forbidden_path_violations = vec![".github/workflows/ci.yml".into()];

        let passed = verifier().verify(&mut p, &workcell, &manifest, None).await;
        assert!(!passed);
        assert_eq!(p.verification.blocking_failures, vec!["forbidden_paths"]);
        assert!(p.verification.gates["test"].passed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn gate_failure_hooks_populate_debug_analysis() {
        let (manifest, workcell, _dir) = fixture(vec![gate("test", "false")]);

        let registry = Arc::new(HookRegistry::new());
        registry.register(HookDefinition::sync(
            "debug",
            HookTrigger::OnGateFailure,
            |ctx| {
                assert_eq!(ctx.gate_failures, vec!["test"]);
                HookResult::ok_with("debug", serde_json::json!({"diagnosis": "X"}))
            },
        ));
        let hooks = Arc::new(HookRunner::new(registry, PostExecutionHooksConfig::default()));
        let verifier = Verifier::new(
            GatesConfig {
                retry_flaky: 0,
                ..GatesConfig::default()
            },
            hooks,
        );

        let mut p = proof();
        verifier.verify(&mut p, &workcell, &manifest, None).await;
        assert_eq!(p.verification.debug_analysis["debug"]["diagnosis"], "X");
    }

    #[test]
    fn capture_truncates_on_char_boundary() {
        let long = "é".repeat(MAX_GATE_CAPTURE);
        let captured = capture(long.as_bytes()).unwrap();
        assert!(captured.ends_with("[truncated]"));
        assert!(captured.len() <= MAX_GATE_CAPTURE + 20);
    }
}
