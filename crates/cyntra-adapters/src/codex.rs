// SPDX-License-Identifier: MIT OR Apache-2.0
//! Adapter for the OpenAI Codex CLI.
//!
//! Codex reads its prompt from stdin (`exec -`) and sandboxes its own
//! file access; the kernel still runs it inside a workcell so nothing
//! escapes the sandbox contract.

use crate::driver::{self, CliCommand};
use crate::prompt::build_prompt;
use crate::{CostEstimate, DEFAULT_TOKEN_ESTIMATE, ToolchainAdapter};
use async_trait::async_trait;
use cyntra_config::ToolchainConfig;
use cyntra_core::{Manifest, PatchProof, Workcell};
use std::collections::BTreeMap;
use std::time::Duration;

const DEFAULT_MODEL: &str = "gpt-5.2";

/// USD per million tokens (approximate, varies by model).
fn cost_per_1m(model: &str) -> f64 {
    match model {
        "o3" => 20.0,
        "o3-mini" => 5.0,
        "o1" => 15.0,
        "o1-mini" => 3.0,
        "gpt-4o" => 5.0,
        "gpt-4" => 10.0,
        _ => 10.0,
    }
}

/// Adapter for the `codex` binary.
pub struct CodexAdapter {
    executable: String,
    env: BTreeMap<String, String>,
    default_model: String,
    sandbox_mode: String,
    ask_for_approval: String,
    reasoning_effort: Option<String>,
    extra_args: Vec<String>,
}

impl CodexAdapter {
    /// Build the adapter from its toolchain configuration.
    #[must_use]
    pub fn new(tc: &ToolchainConfig) -> Self {
        let cfg = &tc.config;
        let get_str = |key: &str| cfg.get(key).and_then(|v| v.as_str()).map(str::to_string);

        // `approval_mode` is a backward-compatible alias; the CLI itself
        // dropped --ask-for-approval in v0.77.
        let approval_mode = get_str("approval_mode").unwrap_or_else(|| "full-auto".into());
        let ask_for_approval = get_str("ask_for_approval").unwrap_or_else(|| {
            if approval_mode == "ask" {
                "on-request".into()
            } else {
                "never".into()
            }
        });

        Self {
            executable: tc.executable("codex").to_string(),
            env: tc.env.clone(),
            default_model: tc
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            sandbox_mode: get_str("sandbox").unwrap_or_else(|| "workspace-write".into()),
            ask_for_approval,
            reasoning_effort: get_str("model_reasoning_effort")
                .or_else(|| get_str("reasoning_effort")),
            extra_args: cfg
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

    fn build_command(&self, model: &str, manifest: &Manifest, prompt: String) -> CliCommand {
        let mut args = vec![
            "exec".to_string(),
            "-".to_string(),
            "--sandbox".to_string(),
            self.sandbox_mode.clone(),
        ];

        if self.ask_for_approval == "never" {
            if self.sandbox_mode == "danger-full-access" {
                args.push("--dangerously-bypass-approvals-and-sandbox".into());
            } else {
                args.push("--full-auto".into());
            }
        }

        let effort = self.reasoning_effort.clone().or_else(|| {
            model.starts_with("gpt-5").then(|| "xhigh".to_string())
        });
        if let Some(effort) = effort {
            args.push("--config".into());
            args.push(format!("model_reasoning_effort=\"{effort}\""));
        }

        if !model.is_empty() {
            args.push("--model".into());
            args.push(model.to_string());
        }

        if let Some(sampling) = manifest.toolchain_config.sampling {
            args.push("--config".into());
            args.push(format!("temperature={}", sampling.temperature));
            args.push("--config".into());
            args.push(format!("top_p={}", sampling.top_p));
        }

        args.extend(self.extra_args.iter().cloned());

        CliCommand {
            program: self.executable.clone(),
            args,
            env: self.env.clone(),
            stdin_data: Some(prompt),
        }
    }
}

#[async_trait]
impl ToolchainAdapter for CodexAdapter {
    fn name(&self) -> &str {
        "codex"
    }

    fn available(&self) -> bool {
        driver::executable_available(&self.executable)
    }

    async fn health_check(&self) -> bool {
        self.available() && driver::version_check(&self.executable).await
    }

    fn estimate_cost(&self, manifest: &Manifest) -> CostEstimate {
        let model = self.model_for(manifest);
        let tokens = manifest.issue.estimated_tokens(DEFAULT_TOKEN_ESTIMATE);
        CostEstimate {
            estimated_tokens: tokens,
            estimated_cost_usd: (tokens as f64 / 1_000_000.0) * cost_per_1m(&model),
            model,
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
        let command = self.build_command(&model, manifest, prompt.clone());
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
    use cyntra_core::{Issue, Sampling, ToolchainRun, SCHEMA_VERSION};

    fn manifest(model: Option<&str>, sampling: Option<Sampling>) -> Manifest {
        Manifest {
            schema_version: SCHEMA_VERSION.into(),
            workcell_id: "wc-1-x".into(),
            branch_name: "wc/1/wc-1-x".into(),
            issue: Issue::new("1", "t"),
            quality_gates: Vec::new(),
            toolchain_config: ToolchainRun {
                toolchain: "codex".into(),
                model: model.map(str::to_string),
                sampling,
                ..ToolchainRun::default()
            },
            planner: None,
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn prompt_travels_on_stdin() {
        let adapter = CodexAdapter::new(&ToolchainConfig::default());
        let cmd = adapter.build_command("gpt-4o", &manifest(None, None), "PROMPT".into());
        assert_eq!(cmd.args[..2], ["exec".to_string(), "-".to_string()]);
        assert_eq!(cmd.stdin_data.as_deref(), Some("PROMPT"));
    }

    #[test]
    fn default_command_uses_workspace_sandbox() {
        let adapter = CodexAdapter::new(&ToolchainConfig::default());
        let cmd = adapter.build_command("gpt-4o", &manifest(None, None), String::new());
        assert!(cmd.args.contains(&"--sandbox".to_string()));
        assert!(cmd.args.contains(&"workspace-write".to_string()));
        assert!(cmd.args.contains(&"--full-auto".to_string()));
        assert!(!cmd
            .args
            .contains(&"--dangerously-bypass-approvals-and-sandbox".to_string()));
    }

    #[test]
    fn full_access_sandbox_bypasses_approvals() {
        let mut tc = ToolchainConfig::default();
        tc.config
            .insert("sandbox".into(), serde_json::json!("danger-full-access"));
        let adapter = CodexAdapter::new(&tc);
        let cmd = adapter.build_command("gpt-4o", &manifest(None, None), String::new());
        assert!(cmd
            .args
            .contains(&"--dangerously-bypass-approvals-and-sandbox".to_string()));
        assert!(!cmd.args.contains(&"--full-auto".to_string()));
    }

    #[test]
    fn gpt5_models_default_to_xhigh_effort() {
        let adapter = CodexAdapter::new(&ToolchainConfig::default());
        let cmd = adapter.build_command("gpt-5.2", &manifest(None, None), String::new());
        assert!(cmd
            .args
            .contains(&"model_reasoning_effort=\"xhigh\"".to_string()));

        let cmd = adapter.build_command("gpt-4o", &manifest(None, None), String::new());
        assert!(!cmd.args.iter().any(|a| a.contains("model_reasoning_effort")));
    }

    #[test]
    fn sampling_becomes_config_flags() {
        let adapter = CodexAdapter::new(&ToolchainConfig::default());
        let m = manifest(
            None,
            Some(Sampling {
                temperature: 0.3,
                top_p: 0.95,
            }),
        );
        let cmd = adapter.build_command("gpt-4o", &m, String::new());
        assert!(cmd.args.contains(&"temperature=0.3".to_string()));
        assert!(cmd.args.contains(&"top_p=0.95".to_string()));
    }

    #[test]
    fn cost_table_rates() {
        let adapter = CodexAdapter::new(&ToolchainConfig::default());
        let est = adapter.estimate_cost(&manifest(Some("o3"), None));
        assert!((est.estimated_cost_usd - (50_000.0 / 1_000_000.0) * 20.0).abs() < 1e-9);

        let est = adapter.estimate_cost(&manifest(Some("unknown-model"), None));
        assert!((est.estimated_cost_usd - 0.5).abs() < 1e-9);
    }
}
