// SPDX-License-Identifier: MIT OR Apache-2.0
//! Adapter for the Claude Code CLI.
//!
//! Claude Code is an agentic coding tool: it navigates the codebase,
//! edits files across the tree, and runs commands to verify its changes.

use crate::driver::{self, CliCommand};
use crate::prompt::build_prompt;
use crate::{CostEstimate, DEFAULT_TOKEN_ESTIMATE, ToolchainAdapter};
use async_trait::async_trait;
use cyntra_config::ToolchainConfig;
use cyntra_core::{Manifest, PatchProof, Workcell};
use std::collections::BTreeMap;
use std::time::Duration;

/// Pinned model ids for the cost table.
pub const CLAUDE_SONNET_4_5: &str = "claude-sonnet-4-5-20250929";
/// Opus 4.5 pinned id.
pub const CLAUDE_OPUS_4_5: &str = "claude-opus-4-5-20251101";
/// Haiku 4.5 pinned id.
pub const CLAUDE_HAIKU_4_5: &str = "claude-haiku-4-5-20251001";

const DEFAULT_MODEL: &str = "opus";

/// USD per million tokens (input + output combined estimate).
fn cost_per_1m(model: &str) -> f64 {
    match model {
        // CLI aliases.
        "sonnet" | "claude-sonnet-4-5" => 9.0,
        "opus" | "claude-opus-4-5" => 45.0,
        "haiku" | "claude-haiku-4-5" => 0.75,
        // Pinned ids.
        m if m == CLAUDE_SONNET_4_5 => 9.0,
        m if m == CLAUDE_OPUS_4_5 => 45.0,
        m if m == CLAUDE_HAIKU_4_5 => 0.75,
        "claude-sonnet-4-20250514" | "claude-3-5-sonnet-20241022" | "claude-3-sonnet-20240229" => {
            9.0
        }
        "claude-opus-4-20250514" | "claude-3-opus-20240229" => 45.0,
        "claude-3-haiku-20240307" => 0.75,
        _ => 9.0,
    }
}

/// Adapter for the `claude` binary.
pub struct ClaudeAdapter {
    executable: String,
    env: BTreeMap<String, String>,
    default_model: String,
    ultrathink: bool,
    skip_permissions: bool,
    output_format: Option<String>,
    allowed_tools: Vec<String>,
    extra_args: Vec<String>,
}

impl ClaudeAdapter {
    /// Build the adapter from its toolchain configuration.
    #[must_use]
    pub fn new(tc: &ToolchainConfig) -> Self {
        let cfg = &tc.config;
        // `ultrathink` wins over the older `extended_thinking` spelling.
        let ultrathink = cfg
            .get("ultrathink")
            .or_else(|| cfg.get("extended_thinking"))
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(true);

        Self {
            executable: tc.executable("claude").to_string(),
            env: tc.env.clone(),
            default_model: tc
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            ultrathink,
            skip_permissions: cfg
                .get("skip_permissions")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(true),
            output_format: cfg
                .get("output_format")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            allowed_tools: string_list(cfg.get("allowed_tools")),
            extra_args: string_list(cfg.get("extra_args")),
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
        let mut args = vec!["--print".to_string(), "@prompt.md".to_string()];
        if !model.is_empty() {
            args.push("--model".into());
            args.push(model.to_string());
        }
        if let Some(format) = &self.output_format {
            args.push("--output-format".into());
            args.push(format.clone());
        }
        if !self.allowed_tools.is_empty() {
            args.push("--allowedTools".into());
            args.extend(self.allowed_tools.iter().cloned());
        }
        if self.skip_permissions {
            args.push("--dangerously-skip-permissions".into());
        }
        args.extend(self.extra_args.iter().cloned());

        CliCommand {
            program: self.executable.clone(),
            args,
            env: self.env.clone(),
            stdin_data: None,
        }
    }

    fn build_prompt(&self, manifest: &Manifest) -> String {
        let body = build_prompt(manifest);
        if self.ultrathink && !body.contains("ultrathink") {
            format!("ultrathink\n\n{body}")
        } else {
            body
        }
    }
}

#[async_trait]
impl ToolchainAdapter for ClaudeAdapter {
    fn name(&self) -> &str {
        "claude"
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
        let prompt = self.build_prompt(manifest);
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

fn string_list(value: Option<&serde_json::Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
