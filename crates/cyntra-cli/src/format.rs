// SPDX-License-Identifier: MIT OR Apache-2.0
//! Human and JSON output for the `cyntra` binary.

use anyhow::Result;
use cyntra_core::{Issue, PatchProof, ProofStatus};
use cyntra_kernel::RunReport;
use std::collections::BTreeMap;

/// Summarize a finished run loop.
pub fn print_run_report(report: &RunReport) {
    println!(
        "dispatched {} workcell(s): {} completed, {} failed, {} retried",
        report.dispatched,
        report.completed.len(),
        report.failed.len(),
        report.retried.len()
    );
    for id in &report.completed {
        println!("  ✓ {id}");
    }
    for id in &report.failed {
        println!("  ✗ {id}");
    }
}

/// `cyntra status` output.
pub fn print_status(
    ready: &[Issue],
    in_progress: &[Issue],
    active_workcells: &[String],
    json: bool,
    verbose: bool,
) -> Result<()> {
    if json {
        let value = serde_json::json!({
            "ready": ready.len(),
            "in_progress": in_progress.len(),
            "active_workcells": active_workcells,
            "issues": if verbose {
                serde_json::to_value(ready)?
            } else {
                serde_json::Value::Null
            },
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("ready:            {}", ready.len());
    println!("in progress:      {}", in_progress.len());
    println!("active workcells: {}", active_workcells.len());
    if verbose {
        for issue in ready {
            println!(
                "  [{}] {} ({})",
                issue.id,
                issue.title,
                issue.risk_level.as_str()
            );
        }
        for wc in active_workcells {
            println!("  workcell {wc}");
        }
    }
    Ok(())
}

/// `cyntra workcells` output.
pub fn print_workcells(active: &[String], archived: &[String], json: bool) -> Result<()> {
    if json {
        let value = serde_json::json!({ "active": active, "archived": archived });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if active.is_empty() {
        println!("no active workcells");
    }
    for wc in active {
        println!("{wc}");
    }
    for wc in archived {
        println!("{wc} (archived)");
    }
    Ok(())
}

/// `cyntra history` output.
pub fn print_history(runs: &[(String, PatchProof)], json: bool) -> Result<()> {
    if json {
        let value: Vec<serde_json::Value> = runs
            .iter()
            .map(|(id, proof)| {
                serde_json::json!({
                    "run_id": id,
                    "issue_id": proof.issue_id,
                    "workcell_id": proof.workcell_id,
                    "toolchain": proof.metadata.toolchain,
                    "status": proof.status.as_str(),
                    "all_passed": proof.verification.all_passed,
                    "duration_ms": proof.metadata.duration_ms,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("no recorded runs");
    }
    for (id, proof) in runs {
        println!(
            "{id}  issue {}  {}  {}  {}ms  gates {}",
            proof.issue_id,
            proof.metadata.toolchain,
            proof.status.as_str(),
            proof.metadata.duration_ms,
            if proof.verification.all_passed {
                "passed"
            } else {
                "failed"
            }
        );
    }
    Ok(())
}

/// `cyntra stats` output.
pub fn print_stats(proofs: &[PatchProof], cost: bool, success_rate: bool, time: bool) {
    println!("runs recorded: {}", proofs.len());
    if proofs.is_empty() {
        return;
    }

    if success_rate {
        let mut per_toolchain: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        for proof in proofs {
            let entry = per_toolchain
                .entry(proof.metadata.toolchain.as_str())
                .or_default();
            entry.1 += 1;
            if proof.status == ProofStatus::Success && proof.verification.all_passed {
                entry.0 += 1;
            }
        }
        println!("success rate:");
        for (toolchain, (ok, total)) in &per_toolchain {
            println!(
                "  {toolchain}: {}/{} ({:.0}%)",
                ok,
                total,
                *ok as f64 / *total as f64 * 100.0
            );
        }
    }

    if cost {
        let total: f64 = proofs.iter().filter_map(|p| p.metadata.cost_usd).sum();
        let tokens: u64 = proofs.iter().filter_map(|p| p.metadata.tokens_used).sum();
        println!("total cost: ${total:.4} ({tokens} tokens reported)");
    }

    if time {
        let mut durations: Vec<u64> = proofs.iter().map(|p| p.metadata.duration_ms).collect();
        durations.sort_unstable();
        let total: u64 = durations.iter().sum();
        let mean = total as f64 / durations.len() as f64;
        let p50 = durations[durations.len() / 2];
        let max = durations.last().copied().unwrap_or(0);
        println!("timing: mean {mean:.0}ms, p50 {p50}ms, max {max}ms");
    }
}
