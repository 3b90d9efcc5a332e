// SPDX-License-Identifier: MIT OR Apache-2.0
//! Prompt assembly from a manifest.

use cyntra_core::Manifest;
use std::fmt::Write;

/// Build the task prompt handed to an external agent.
///
/// Every CLI adapter uses the same body; adapter-specific prefixes (like
/// claude's `ultrathink`) are layered on top by the adapter itself.
#[must_use]
pub fn build_prompt(manifest: &Manifest) -> String {
    let issue = &manifest.issue;
    let mut prompt = String::new();

    let _ = writeln!(prompt, "# Task: {}", issue.title);
    let _ = writeln!(prompt);
    if !issue.description.trim().is_empty() {
        let _ = writeln!(prompt, "{}", issue.description.trim());
        let _ = writeln!(prompt);
    }

    if !issue.acceptance_criteria.is_empty() {
        let _ = writeln!(prompt, "## Acceptance criteria");
        for (i, criterion) in issue.acceptance_criteria.iter().enumerate() {
            let _ = writeln!(prompt, "{}. {criterion}", i + 1);
        }
        let _ = writeln!(prompt);
    }

    if !issue.forbidden_paths.is_empty() {
        let _ = writeln!(prompt, "## Do not modify");
        for path in &issue.forbidden_paths {
            let _ = writeln!(prompt, "- {path}");
        }
        let _ = writeln!(prompt);
    }

    if !manifest.quality_gates.is_empty() {
        let _ = writeln!(
            prompt,
            "## Quality gates (run after execution; your change must pass)"
        );
        for gate in &manifest.quality_gates {
            let _ = writeln!(prompt, "- {}: `{}`", gate.name, gate.command);
        }
        let _ = writeln!(prompt);
    }

    let _ = writeln!(prompt, "## Rules");
    let _ = writeln!(
        prompt,
        "- Work only inside this directory; you are on branch `{}`.",
        manifest.branch_name
    );
    let _ = writeln!(prompt, "- Commit your changes to the current branch when done.");
    let _ = writeln!(
        prompt,
        "- Do not push, do not switch branches, do not touch paths listed above."
    );

    prompt
}
