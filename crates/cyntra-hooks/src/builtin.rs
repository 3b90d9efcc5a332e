// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in hooks wired from the post-execution hook configuration.
//!
//! Both produce structured summaries from data already in the context; the
//! heavyweight model-backed variants live outside the kernel and replace
//! these by re-registering under the same names.

use crate::{HookDefinition, HookResult, HookTrigger, HookRegistry};
use cyntra_config::PostExecutionHooksConfig;
use cyntra_core::ProofStatus;
use serde_json::json;

/// Name of the built-in code-reviewer hook.
pub const CODE_REVIEWER: &str = "code-reviewer";

/// Name of the built-in debug-specialist hook.
pub const DEBUG_SPECIALIST: &str = "debug-specialist";

/// Register the built-in hooks according to configuration.
pub fn install_default_hooks(registry: &HookRegistry, config: &PostExecutionHooksConfig) {
    registry.register(code_reviewer_hook(config));
    registry.register(debug_specialist_hook(config));
}

/// Post-execution review summary: change shape, risk, and anything that
/// deserves a second look.
#[must_use]
pub fn code_reviewer_hook(config: &PostExecutionHooksConfig) -> HookDefinition {
    let reviewer = config.code_reviewer.clone();
    let statuses: Vec<ProofStatus> = reviewer
        .trigger_on
        .iter()
        .filter_map(|s| match s.as_str() {
            "success" => Some(ProofStatus::Success),
            "partial" => Some(ProofStatus::Partial),
            "failed" => Some(ProofStatus::Failed),
            _ => None,
        })
        .collect();

    let mut hook = HookDefinition::sync(CODE_REVIEWER, HookTrigger::PostExecution, move |ctx| {
        let Some(proof) = &ctx.proof else {
            return HookResult::failed(CODE_REVIEWER, "no proof in context");
        };
        let patch = &proof.patch;
        let total = patch.diff_stats.total_changes();
        let summarized = total > reviewer.max_diff_lines;

        let mut recommendations: Vec<String> = Vec::new();
        if summarized {
            recommendations.push(format!(
                "diff has {total} changed lines (over {}); review in summary form",
                reviewer.max_diff_lines
            ));
        }
        if !patch.forbidden_path_violations.is_empty() {
            recommendations.push(format!(
                "forbidden paths touched: {}",
                patch.forbidden_path_violations.join(", ")
            ));
        }

        HookResult::ok_with(
            CODE_REVIEWER,
            json!({
                "review_depth": reviewer.review_depth,
                "model": reviewer.model,
                "files_reviewed": patch.files_modified.len(),
                "summarized": summarized,
                "recommendations": recommendations,
            }),
        )
    });
    hook = hook.with_match_status(statuses);
    hook.enabled = config.code_reviewer.enabled;
    hook
}

/// Gate-failure diagnosis: names the failing gates and pulls the error tail
/// out of their captured output.
#[must_use]
pub fn debug_specialist_hook(config: &PostExecutionHooksConfig) -> HookDefinition {
    let specialist = config.debug_specialist.clone();

    let mut hook =
        HookDefinition::sync(DEBUG_SPECIALIST, HookTrigger::OnGateFailure, move |ctx| {
            let Some(proof) = &ctx.proof else {
                return HookResult::failed(DEBUG_SPECIALIST, "no proof in context");
            };
            let max_lines = specialist.max_error_context_lines as usize;
            let mut failures = serde_json::Map::new();

            for gate in &ctx.gate_failures {
                let context = proof
                    .verification
                    .gates
                    .get(gate)
                    .and_then(|g| g.stderr.clone().or_else(|| g.stdout.clone()))
                    .map(|out| tail_lines(&out, max_lines))
                    .unwrap_or_default();
                failures.insert(gate.clone(), json!({ "context": context }));
            }

            HookResult::ok_with(
                DEBUG_SPECIALIST,
                json!({
                    "diagnosis": format!("gates failed: {}", ctx.gate_failures.join(", ")),
                    "failures": failures,
                    "auto_fix_attempted": false,
                }),
            )
        });
    hook.enabled = config.debug_specialist.enabled && specialist.trigger_on_gate_failure;
    hook
}

fn tail_lines(text: &str, max: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(max);
    lines[start..].join("\n")
}
