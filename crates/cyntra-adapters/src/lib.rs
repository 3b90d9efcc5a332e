// SPDX-License-Identifier: MIT OR Apache-2.0
//! cyntra-adapters
#![deny(unsafe_code)]
//!
//! Toolchain adapters: the boundary between the trusted kernel and
//! untrusted external agent subprocesses.
//!
//! An adapter runs one external agent inside a workcell and emits a
//! [`PatchProof`]. CLI-backed adapters (`claude`, `codex`, `crush`) wrap
//! distinct binaries with their own flag surfaces; the `workflow` adapter
//! submits jobs to a generation server and polls for completion; the
//! `mock` adapter backs tests and dry runs.

/// The `claude` CLI adapter.
pub mod claude;
/// The `codex` CLI adapter.
pub mod codex;
/// The `crush` CLI adapter.
pub mod crush;
/// Shared subprocess driver: streaming, deadlines, log capture.
pub mod driver;
/// Deterministic in-process adapter for tests and dry runs.
pub mod mock;
/// Git interrogation of a workcell after execution.
pub mod patch;
/// Prompt assembly from a manifest.
pub mod prompt;
/// Generation-server workflow adapter.
pub mod workflow;

use async_trait::async_trait;
use cyntra_config::{KernelConfig, ToolchainConfig};
use cyntra_core::{Manifest, PatchProof, Workcell};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Token estimate used when an issue carries no hint.
pub const DEFAULT_TOKEN_ESTIMATE: u64 = 50_000;

/// A cost prediction for one run. Pure function of the manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct CostEstimate {
    /// Predicted token consumption.
    pub estimated_tokens: u64,
    /// Predicted cost in USD.
    pub estimated_cost_usd: f64,
    /// Model the estimate was computed for.
    pub model: String,
}

/// Capability set every toolchain adapter exposes.
#[async_trait]
pub trait ToolchainAdapter: Send + Sync {
    /// Registry name (`claude`, `codex`, ...).
    fn name(&self) -> &str;

    /// Cheap availability check (executable present, server configured).
    fn available(&self) -> bool;

    /// Active health check (e.g. `<binary> --version`, server ping).
    async fn health_check(&self) -> bool;

    /// Estimate cost for a manifest. Must not touch the network; the
    /// per-model rate tables are compiled in.
    fn estimate_cost(&self, manifest: &Manifest) -> CostEstimate;

    /// Run the agent inside the workcell with a wall-clock deadline.
    ///
    /// Never returns an error: every failure mode maps to a proof status
    /// (`timeout`, `error`, ...). The proof is written to
    /// `<workcell>/proof.json` before returning.
    async fn execute(
        &self,
        manifest: &Manifest,
        workcell: &Workcell,
        timeout: Duration,
    ) -> PatchProof;

    /// Blocking variant of [`execute`](Self::execute) for callers without
    /// an ambient runtime. Must not be called from async context.
    fn execute_sync(
        &self,
        manifest: &Manifest,
        workcell: &Workcell,
        timeout_seconds: u64,
    ) -> PatchProof {
        match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt.block_on(self.execute(
                manifest,
                workcell,
                Duration::from_secs(timeout_seconds),
            )),
            Err(e) => driver::error_proof(
                self.name(),
                manifest,
                chrono::Utc::now(),
                &format!("failed to build runtime: {e}"),
            ),
        }
    }
}

/// Name → adapter registry.
///
/// Adapters are discovered by the string in `toolchain_config.toolchain`;
/// registering under an existing name replaces the prior adapter.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<String, Arc<dyn ToolchainAdapter>>,
}

impl AdapterRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own name.
    pub fn register(&mut self, adapter: Arc<dyn ToolchainAdapter>) {
        self.adapters.insert(adapter.name().to_string(), adapter);
    }

    /// Look up an adapter by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolchainAdapter>> {
        self.adapters.get(name).map(Arc::clone)
    }

    /// Whether an adapter is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.adapters.contains_key(name)
    }

    /// Sorted adapter names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }

    /// Number of registered adapters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Build the adapter registry from kernel configuration.
///
/// Every configured, enabled toolchain whose name the kernel knows gets an
/// adapter. With no `toolchains:` section at all, the three stock CLI
/// adapters are registered with defaults so a bare config still routes.
#[must_use]
pub fn build_registry(config: &KernelConfig) -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();

    if config.toolchains.is_empty() {
        let default = ToolchainConfig::default();
        registry.register(Arc::new(claude::ClaudeAdapter::new(&default)));
        registry.register(Arc::new(codex::CodexAdapter::new(&default)));
        registry.register(Arc::new(crush::CrushAdapter::new(&default)));
        return registry;
    }

    for (name, tc) in &config.toolchains {
        if !tc.enabled {
            continue;
        }
        match name.as_str() {
            "claude" => registry.register(Arc::new(claude::ClaudeAdapter::new(tc))),
            "codex" => registry.register(Arc::new(codex::CodexAdapter::new(tc))),
            "crush" => registry.register(Arc::new(crush::CrushAdapter::new(tc))),
            "workflow" => registry.register(Arc::new(workflow::WorkflowAdapter::new(tc))),
            "mock" => registry.register(Arc::new(mock::MockAdapter::from_config(tc))),
            other => {
                warn!(target: "cyntra.adapter", toolchain = %other, "unknown toolchain in config; skipping");
            }
        }
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_registers_stock_cli_adapters() {
        let config = KernelConfig::default();
        let registry = build_registry(&config);
        assert_eq!(registry.names(), vec!["claude", "codex", "crush"]);
    }

    #[test]
    fn disabled_toolchains_are_skipped() {
        let mut config = KernelConfig::default();
        config.toolchains.insert(
            "claude".into(),
            ToolchainConfig {
                enabled: false,
                ..ToolchainConfig::default()
            },
        );
        config
            .toolchains
            .insert("codex".into(), ToolchainConfig::default());

        let registry = build_registry(&config);
        assert!(!registry.contains("claude"));
        assert!(registry.contains("codex"));
    }

    #[test]
    fn unknown_toolchain_names_are_ignored() {
        let mut config = KernelConfig::default();
        config
            .toolchains
            .insert("quantum".into(), ToolchainConfig::default());
        let registry = build_registry(&config);
        assert!(registry.is_empty());
    }

    #[test]
    fn register_replaces_by_name() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(mock::MockAdapter::succeeding()));
        registry.register(Arc::new(mock::MockAdapter::succeeding()));
        assert_eq!(registry.len(), 1);
    }
}
