// SPDX-License-Identifier: MIT OR Apache-2.0
//! Routing an issue to a toolchain and invoking its adapter.

use crate::KernelError;
use cyntra_adapters::{AdapterRegistry, CostEstimate, driver};
use cyntra_config::KernelConfig;
use cyntra_core::merge::deep_merge;
use cyntra_core::{
    Issue, Manifest, PatchProof, ProofBuilder, ProofStatus, Review, Sampling, ToolchainRun,
    Workcell, SCHEMA_VERSION,
};
use cyntra_hooks::{HookContext, HookRunner, HookTrigger};
use cyntra_telemetry::TelemetryEventKind;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Outcome of a single dispatch.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    /// Workcell the run executed in.
    pub workcell_id: String,
    /// The proof the adapter produced (verification still pending).
    pub proof: PatchProof,
    /// Cost estimate recorded before execution.
    pub estimate: CostEstimate,
}

/// Routes issues to toolchains and drives adapter execution for one run.
pub struct Dispatcher {
    config: Arc<KernelConfig>,
    adapters: Arc<AdapterRegistry>,
    hooks: Arc<HookRunner>,
}

impl Dispatcher {
    /// Create a dispatcher over the given registry and hook runner.
    #[must_use]
    pub fn new(
        config: Arc<KernelConfig>,
        adapters: Arc<AdapterRegistry>,
        hooks: Arc<HookRunner>,
    ) -> Self {
        Self {
            config,
            adapters,
            hooks,
        }
    }

    /// Resolve the toolchain for an issue: routing rules first (in order,
    /// honoring fallbacks), then the configured priority list. A
    /// toolchain is usable when it is registered and its executable (or
    /// server) is available.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::NoToolchainAvailable`] when nothing routes.
    pub async fn resolve_toolchain(&self, issue: &Issue) -> Result<String, KernelError> {
        for rule in &self.config.routing.rules {
            if !rule.matches_issue(&issue.tags, issue.risk_level) {
                continue;
            }
            for name in &rule.use_toolchains {
                if let Some(found) = self.first_usable(name).await {
                    return Ok(found);
                }
            }
        }

        for name in &self.config.toolchain_priority {
            if let Some(found) = self.first_usable(name).await {
                return Ok(found);
            }
        }

        Err(KernelError::NoToolchainAvailable {
            issue_id: issue.id.clone(),
        })
    }

    /// The named toolchain if usable, else the first usable entry of its
    /// fallback chain.
    async fn first_usable(&self, name: &str) -> Option<String> {
        if self.usable(name).await {
            return Some(name.to_string());
        }
        let fallbacks = self.config.routing.fallbacks.get(name)?;
        for fallback in fallbacks {
            if self.usable(fallback).await {
                warn!(
                    target: "cyntra.dispatch",
                    requested = %name,
                    using = %fallback,
                    "toolchain unavailable; using fallback"
                );
                return Some(fallback.clone());
            }
        }
        None
    }

    async fn usable(&self, name: &str) -> bool {
        match self.adapters.get(name) {
            Some(adapter) => adapter.available(),
            None => false,
        }
    }

    /// Build the manifest for a run: issue fields, routed toolchain
    /// config, and deep-merged overrides (maps merge, lists and scalars
    /// replace). The manifest is serialized once, before the adapter is
    /// invoked, and never mutated afterward.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::Config`] when an override produces a value
    /// that no longer parses as a manifest.
    pub fn build_manifest(
        &self,
        issue: &Issue,
        workcell: &Workcell,
        toolchain: &str,
        sampling: Option<Sampling>,
        manifest_overrides: Option<serde_json::Value>,
    ) -> Result<Manifest, KernelError> {
        let tc = self.config.toolchains.get(toolchain);
        let manifest = Manifest {
            schema_version: SCHEMA_VERSION.to_string(),
            workcell_id: workcell.workcell_id.clone(),
            branch_name: workcell.branch_name.clone(),
            issue: issue.clone(),
            quality_gates: self.config.gates.gate_commands(),
            toolchain_config: ToolchainRun {
                toolchain: toolchain.to_string(),
                model: tc.and_then(|t| t.model.clone()),
                sampling,
                prompt_genome_id: None,
            },
            planner: None,
            extra: BTreeMap::new(),
        };

        let Some(overrides) = manifest_overrides else {
            return Ok(manifest);
        };

        let base = manifest
            .to_value()
            .map_err(|e| config_error(e.to_string()))?;
        let merged = deep_merge(base, overrides);
        serde_json::from_value(merged).map_err(|e| config_error(e.to_string()))
    }

    /// Dispatch one run: route, build the manifest, fire hooks around the
    /// adapter, and return the proof.
    ///
    /// Adapter-level failures (timeout, spawn error) come back as proof
    /// statuses, not errors; only routing and manifest problems error.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when no toolchain routes or the manifest
    /// cannot be built.
    pub async fn dispatch(
        &self,
        issue: &Issue,
        workcell: &Workcell,
        toolchain_override: Option<&str>,
        speculate_tag: Option<&str>,
        manifest_overrides: Option<serde_json::Value>,
        sampling: Option<Sampling>,
    ) -> Result<DispatchResult, KernelError> {
        let toolchain = match toolchain_override {
            Some(name) => name.to_string(),
            None => self.resolve_toolchain(issue).await?,
        };
        let adapter =
            self.adapters
                .get(&toolchain)
                .ok_or_else(|| KernelError::UnknownToolchain {
                    name: toolchain.clone(),
                })?;

        let manifest =
            self.build_manifest(issue, workcell, &toolchain, sampling, manifest_overrides)?;

        // The one serialization of the manifest for this run.
        if let Ok(json) = serde_json::to_string_pretty(&manifest) {
            if let Err(e) = std::fs::write(workcell.path.join("manifest.json"), json) {
                warn!(target: "cyntra.dispatch", error = %e, "failed to persist manifest");
            }
        }

        info!(
            target: "cyntra.dispatch",
            issue_id = %issue.id,
            workcell_id = %workcell.workcell_id,
            toolchain = %toolchain,
            speculate_tag = speculate_tag.unwrap_or(""),
            "dispatching"
        );

        // Pre-execution hooks may abort the dispatch.
        let mut pre_ctx = HookContext::pre_execution(workcell.path.clone(), manifest.clone());
        let pre_results = self
            .hooks
            .run_hooks_async(HookTrigger::PreExecution, &mut pre_ctx)
            .await;
        if let Some(abort) = pre_results.iter().find(|r| !r.success && r.abort) {
            let proof = abort_proof(&toolchain, &manifest, abort.error.as_deref());
            driver::write_proof(workcell, &proof);
            return Ok(DispatchResult {
                workcell_id: workcell.workcell_id.clone(),
                proof,
                estimate: adapter.estimate_cost(&manifest),
            });
        }

        let estimate = adapter.estimate_cost(&manifest);
        if let Some(telemetry) = driver::open_telemetry(
            &toolchain,
            estimate_model(&estimate),
            &manifest,
            workcell,
        ) {
            telemetry.emit(TelemetryEventKind::CostEstimated {
                estimated_tokens: estimate.estimated_tokens,
                estimated_cost_usd: estimate.estimated_cost_usd,
            });
        }

        let timeout = self
            .config
            .toolchains
            .get(&toolchain)
            .map_or(1800, cyntra_config::ToolchainConfig::effective_timeout_seconds);
        let mut proof = adapter
            .execute(&manifest, workcell, Duration::from_secs(timeout))
            .await;

        self.run_post_hooks(&mut proof, workcell, &manifest).await;
        driver::write_proof(workcell, &proof);

        Ok(DispatchResult {
            workcell_id: workcell.workcell_id.clone(),
            proof,
            estimate,
        })
    }

    /// Fire `POST_EXECUTION`, attach the review block, then fire
    /// `ON_SUCCESS` or `ON_FAILURE` and fold their outputs in as well.
    async fn run_post_hooks(
        &self,
        proof: &mut PatchProof,
        workcell: &Workcell,
        manifest: &Manifest,
    ) {
        let mut ctx = HookContext::new(workcell.path.clone(), proof.clone(), manifest.clone());
        let post_results = self
            .hooks
            .run_hooks_async(HookTrigger::PostExecution, &mut ctx)
            .await;

        let outcome_trigger = if proof.status == ProofStatus::Success {
            HookTrigger::OnSuccess
        } else {
            HookTrigger::OnFailure
        };
        let outcome_results = self.hooks.run_hooks_async(outcome_trigger, &mut ctx).await;

        let mut hooks_executed: Vec<String> = Vec::new();
        let mut recommendations: Vec<String> = Vec::new();
        for result in post_results.iter().chain(outcome_results.iter()) {
            hooks_executed.push(result.hook_name.clone());
            if let Some(recs) = result
                .output
                .as_ref()
                .and_then(|o| o.get("recommendations"))
                .and_then(|r| r.as_array())
            {
                recommendations.extend(recs.iter().filter_map(|r| r.as_str()).map(str::to_string));
            }
        }

        if !hooks_executed.is_empty() {
            proof.review = Some(Review {
                hooks_executed,
                recommendations,
                hook_outputs: ctx.hook_outputs,
            });
        }
    }
}

fn estimate_model(estimate: &CostEstimate) -> Option<&str> {
    if estimate.model.is_empty() {
        None
    } else {
        Some(&estimate.model)
    }
}

fn abort_proof(toolchain: &str, manifest: &Manifest, reason: Option<&str>) -> PatchProof {
    ProofBuilder::new(toolchain, &manifest.workcell_id, &manifest.issue.id)
        .status(ProofStatus::Error)
        .error(format!(
            "dispatch aborted by pre-execution hook: {}",
            reason.unwrap_or("no reason given")
        ))
        .build()
}

fn config_error(reason: String) -> KernelError {
    KernelError::Config(cyntra_config::ConfigError::ParseError { reason })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyntra_adapters::ToolchainAdapter;
    use cyntra_adapters::mock::{MockAdapter, MockBehavior};
    use cyntra_config::{PostExecutionHooksConfig, RoutingRule};
    use cyntra_hooks::{HookDefinition, HookRegistry, HookResult};
    use chrono::Utc;

    fn workcell(dir: &tempfile::TempDir) -> Workcell {
        Workcell {
            workcell_id: "wc-42-abcd1234".into(),
            issue_id: "42".into(),
            path: dir.path().to_path_buf(),
            branch_name: "wc/42/wc-42-abcd1234".into(),
            base_commit: "abc".into(),
            logs_dir: dir.path().join("logs"),
            created_at: Utc::now(),
        }
    }

    fn dispatcher_with(
        config: KernelConfig,
        adapters: Vec<Arc<dyn ToolchainAdapter>>,
        registry: Arc<HookRegistry>,
    ) -> Dispatcher {
        let mut reg = AdapterRegistry::new();
        for a in adapters {
            reg.register(a);
        }
        let hooks = Arc::new(HookRunner::new(
            registry,
            PostExecutionHooksConfig::default(),
        ));
        Dispatcher::new(Arc::new(config), Arc::new(reg), hooks)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn routing_rule_wins_over_priority() {
        let mut config = KernelConfig::default();
        config.routing.rules.push(RoutingRule {
            matches: [("tag".to_string(), "fab".to_string())].into(),
            use_toolchains: vec!["mock".into()],
            ..RoutingRule::default()
        });

        let dispatcher = dispatcher_with(
            config,
            vec![Arc::new(MockAdapter::succeeding())],
            Arc::new(HookRegistry::new()),
        );

        let mut issue = Issue::new("42", "t");
        issue.tags.insert("fab".into());
        assert_eq!(dispatcher.resolve_toolchain(&issue).await.unwrap(), "mock");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn priority_order_used_without_rules() {
        let mut config = KernelConfig::default();
        config.toolchain_priority = vec!["missing".into(), "mock".into()];
        let dispatcher = dispatcher_with(
            config,
            vec![Arc::new(MockAdapter::succeeding())],
            Arc::new(HookRegistry::new()),
        );
        let issue = Issue::new("42", "t");
        assert_eq!(dispatcher.resolve_toolchain(&issue).await.unwrap(), "mock");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn no_usable_toolchain_errors() {
        let config = KernelConfig::default();
        let dispatcher =
            dispatcher_with(config, vec![], Arc::new(HookRegistry::new()));
        let issue = Issue::new("42", "t");
        assert!(matches!(
            dispatcher.resolve_toolchain(&issue).await,
            Err(KernelError::NoToolchainAvailable { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dispatch_produces_proof_and_manifest() {
        let mut config = KernelConfig::default();
        config.toolchain_priority = vec!["mock".into()];
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher_with(
            config,
            vec![Arc::new(MockAdapter::succeeding())],
            Arc::new(HookRegistry::new()),
        );

        let issue = Issue::new("42", "t");
        let wc = workcell(&dir);
        let result = dispatcher
            .dispatch(&issue, &wc, None, None, None, None)
            .await
            .unwrap();

        assert_eq!(result.proof.status, ProofStatus::Success);
        assert_eq!(result.workcell_id, wc.workcell_id);
        assert!(wc.path.join("manifest.json").exists());
        assert!(wc.path.join("proof.json").exists());

        let manifest: Manifest = serde_json::from_str(
            &std::fs::read_to_string(wc.path.join("manifest.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(manifest.workcell_id, wc.workcell_id);
        assert_eq!(manifest.toolchain_config.toolchain, "mock");
        // Gates from config are embedded for the verifier.
        assert!(manifest.quality_gates.iter().any(|g| g.name == "test"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn manifest_overrides_deep_merge() {
        let mut config = KernelConfig::default();
        config.toolchain_priority = vec!["mock".into()];
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher_with(
            config,
            vec![Arc::new(MockAdapter::succeeding())],
            Arc::new(HookRegistry::new()),
        );

        let issue = Issue::new("42", "t");
        let wc = workcell(&dir);
        let overrides = serde_json::json!({
            "toolchain_config": {"model": "overridden"},
            "experiment": {"cohort": "b"}
        });
        let manifest = dispatcher
            .build_manifest(&issue, &wc, "mock", None, Some(overrides))
            .unwrap();

        assert_eq!(manifest.toolchain_config.model.as_deref(), Some("overridden"));
        // Toolchain name survives the merge untouched.
        assert_eq!(manifest.toolchain_config.toolchain, "mock");
        assert_eq!(manifest.extra["experiment"]["cohort"], "b");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn aborting_pre_hook_stops_dispatch() {
        let mut config = KernelConfig::default();
        config.toolchain_priority = vec!["mock".into()];
        let dir = tempfile::tempdir().unwrap();

        let registry = Arc::new(HookRegistry::new());
        registry.register(HookDefinition::sync(
            "gatekeeper",
            HookTrigger::PreExecution,
            |_| HookResult::abort("gatekeeper", "issue not allowed"),
        ));

        let dispatcher = dispatcher_with(
            config,
            vec![Arc::new(MockAdapter::succeeding())],
            registry,
        );

        let issue = Issue::new("42", "t");
        let wc = workcell(&dir);
        let result = dispatcher
            .dispatch(&issue, &wc, None, None, None, None)
            .await
            .unwrap();

        assert_eq!(result.proof.status, ProofStatus::Error);
        assert!(
            result
                .proof
                .metadata
                .error
                .as_deref()
                .unwrap()
                .contains("issue not allowed")
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failing_non_abort_pre_hook_does_not_stop_dispatch() {
        let mut config = KernelConfig::default();
        config.toolchain_priority = vec!["mock".into()];
        let dir = tempfile::tempdir().unwrap();

        let registry = Arc::new(HookRegistry::new());
        registry.register(HookDefinition::sync(
            "observer",
            HookTrigger::PreExecution,
            |_| HookResult::failed("observer", "flaky check"),
        ));

        let dispatcher = dispatcher_with(
            config,
            vec![Arc::new(MockAdapter::succeeding())],
            registry,
        );

        let issue = Issue::new("42", "t");
        let wc = workcell(&dir);
        let result = dispatcher
            .dispatch(&issue, &wc, None, None, None, None)
            .await
            .unwrap();
        assert_eq!(result.proof.status, ProofStatus::Success);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn post_hooks_attach_review() {
        let mut config = KernelConfig::default();
        config.toolchain_priority = vec!["mock".into()];
        let dir = tempfile::tempdir().unwrap();

        let registry = Arc::new(HookRegistry::new());
        registry.register(HookDefinition::sync(
            "advisor",
            HookTrigger::PostExecution,
            |_| {
                HookResult::ok_with(
                    "advisor",
                    serde_json::json!({"recommendations": ["add a regression test"]}),
                )
            },
        ));
        registry.register(HookDefinition::sync(
            "celebrant",
            HookTrigger::OnSuccess,
            |_| HookResult::ok("celebrant"),
        ));

        let dispatcher = dispatcher_with(
            config,
            vec![Arc::new(MockAdapter::succeeding())],
            registry,
        );

        let issue = Issue::new("42", "t");
        let wc = workcell(&dir);
        let result = dispatcher
            .dispatch(&issue, &wc, None, None, None, None)
            .await
            .unwrap();

        let review = result.proof.review.unwrap();
        assert_eq!(review.hooks_executed, vec!["advisor", "celebrant"]);
        assert_eq!(review.recommendations, vec!["add a regression test"]);
        assert!(review.hook_outputs.contains_key("advisor"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn on_failure_fires_for_failed_proofs() {
        let mut config = KernelConfig::default();
        config.toolchain_priority = vec!["mock".into()];
        let dir = tempfile::tempdir().unwrap();

        let registry = Arc::new(HookRegistry::new());
        registry.register(HookDefinition::sync(
            "mourner",
            HookTrigger::OnFailure,
            |_| HookResult::ok("mourner"),
        ));

        let dispatcher = dispatcher_with(
            config,
            vec![Arc::new(MockAdapter::with_status(ProofStatus::Failed))],
            registry,
        );

        let issue = Issue::new("42", "t");
        let wc = workcell(&dir);
        let result = dispatcher
            .dispatch(&issue, &wc, None, None, None, None)
            .await
            .unwrap();
        let review = result.proof.review.unwrap();
        assert_eq!(review.hooks_executed, vec!["mourner"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn explicit_override_skips_routing() {
        let mut config = KernelConfig::default();
        // Priority would pick nothing; override names the mock directly.
        config.toolchain_priority = vec![];
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher_with(
            config,
            vec![Arc::new(MockAdapter::new(MockBehavior::default()))],
            Arc::new(HookRegistry::new()),
        );

        let issue = Issue::new("42", "t");
        let wc = workcell(&dir);
        let result = dispatcher
            .dispatch(&issue, &wc, Some("mock"), None, None, None)
            .await
            .unwrap();
        assert_eq!(result.proof.metadata.toolchain, "mock");
    }
}
