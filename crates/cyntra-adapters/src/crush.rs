// SPDX-License-Identifier: MIT OR Apache-2.0
//! Adapter for the Crush CLI.

use crate::driver::{self, CliCommand};
use crate::prompt::build_prompt;
use crate::{CostEstimate, DEFAULT_TOKEN_ESTIMATE, ToolchainAdapter};
use async_trait::async_trait;
use cyntra_config::ToolchainConfig;
use cyntra_core::{Manifest, PatchProof, Workcell};
use std::collections::BTreeMap;
use std::time::Duration;

const DEFAULT_MODEL: &str = "sonnet";

// Crush routes to provider models; a flat blended rate keeps the estimate
// deterministic without mirroring every provider table.
const FLAT_COST_PER_1M: f64 = 6.0;

/// Adapter for the `crush` binary.
pub struct CrushAdapter {
    executable: String,
    env: BTreeMap<String, String>,
    default_model: String,
    auto_approve: bool,
    extra_args: Vec<String>,
}

impl CrushAdapter {
    /// Build the adapter from its toolchain configuration.
    #[must_use]
    pub fn new(tc: &ToolchainConfig) -> Self {
        Self {
            executable: tc.executable("crush").to_string(),
            env: tc.env.clone(),
            default_model: tc
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            auto_approve: tc
                .config
                .get("auto_approve")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(true),
            extra_args: tc
                .config
                .get("extra_args")
                .and_then(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|i| i.as_str())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    fn model_for(&self, manifest: &Manifest) -> String {
        manifest
            .toolchain_config
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone())
    }

    fn build_command(&self, model: &str) -> CliCommand {
        let mut args = vec!["run".to_string(), "-q".to_string()];
        if self.auto_approve {
            args.push("-y".into());
        }
        if !model.is_empty() {
            args.push("--model".into());
            args.push(model.to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args.push("@prompt.md".into());

        CliCommand {
            program: self.executable.clone(),
            args,
            env: self.env.clone(),
            stdin_data: None,
        }
    }
}

#[async_trait]
impl ToolchainAdapter for CrushAdapter {
    fn name(&self) -> &str {
        "crush"
    }

    fn available(&self) -> bool {
        driver::executable_available(&self.executable)
    }

    async fn health_check(&self) -> bool {
        self.available() && driver::version_check(&self.executable).await
    }

    fn estimate_cost(&self, manifest: &Manifest) -> CostEstimate {
        let tokens = manifest.issue.estimated_tokens(DEFAULT_TOKEN_ESTIMATE);
        CostEstimate {
            estimated_tokens: tokens,
            estimated_cost_usd: (tokens as f64 / 1_000_000.0) * FLAT_COST_PER_1M,
            model: self.model_for(manifest),
        }
    }

    async fn execute(
        &self,
        manifest: &Manifest,
        workcell: &Workcell,
        timeout: Duration,
    ) -> PatchProof {
        let model = self.model_for(manifest);
        let prompt = build_prompt(manifest);
        let command = self.build_command(&model);
        driver::execute_cli(
            self.name(),
            &model,
            command,
            &prompt,
            manifest,
            workcell,
            timeout,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_command_shape() {
        let adapter = CrushAdapter::new(&ToolchainConfig::default());
        let cmd = adapter.build_command("sonnet");
        assert_eq!(cmd.program, "crush");
        assert_eq!(cmd.args[0], "run");
        assert!(cmd.args.contains(&"-y".to_string()));
        assert_eq!(cmd.args.last().map(String::as_str), Some("@prompt.md"));
    }

    #[test]
    fn auto_approve_can_be_disabled() {
        let mut tc = ToolchainConfig::default();
        tc.config
            .insert("auto_approve".into(), serde_json::json!(false));
        let adapter = CrushAdapter::new(&tc);
        assert!(!adapter.build_command("sonnet").args.contains(&"-y".to_string()));
    }
}
