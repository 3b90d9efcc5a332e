// SPDX-License-Identifier: MIT OR Apache-2.0
//! Winner selection among concurrent speculate proofs.
//!
//! The ordering is total and deterministic so that re-running a vote on
//! the same proofs (in any order) picks the same winner.

use cyntra_core::{PatchProof, canonical_json};
use std::cmp::Ordering;

/// Select the winner among concurrent proofs for one issue.
///
/// Verified proofs (those whose `verification.all_passed` is set) always
/// beat unverified ones. Within a pool, faster wins, then cheaper
/// (missing cost sorts last), then the canonical action signature breaks
/// remaining ties.
///
/// Returns `None` only for empty input.
#[must_use]
pub fn vote(proofs: &[PatchProof]) -> Option<&PatchProof> {
    let any_verified = proofs.iter().any(|p| p.verification.all_passed);
    let pool: Vec<&PatchProof> = if any_verified {
        proofs.iter().filter(|p| p.verification.all_passed).collect()
    } else {
        proofs.iter().collect()
    };

    pool.into_iter().min_by(|a, b| compare(a, b))
}

fn compare(a: &PatchProof, b: &PatchProof) -> Ordering {
    a.metadata
        .duration_ms
        .cmp(&b.metadata.duration_ms)
        .then_with(|| cost_ordering(a.metadata.cost_usd, b.metadata.cost_usd))
        .then_with(|| action_signature(a).cmp(&action_signature(b)))
}

fn cost_ordering(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Canonical JSON (sorted keys, no whitespace, UTF-8) of the action tuple,
/// compared as a byte string. Fixed here for cross-implementation
/// determinism.
#[must_use]
pub fn action_signature(proof: &PatchProof) -> String {
    canonical_json(&serde_json::json!({
        "issue": proof.issue_id,
        "toolchain": proof.metadata.toolchain,
        "workcell": proof.workcell_id,
    }))
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cyntra_core::{ProofBuilder, ProofStatus};

    fn proof(
        toolchain: &str,
        workcell: &str,
        duration_ms: u64,
        cost: Option<f64>,
        verified: bool,
    ) -> PatchProof {
        let started = Utc::now();
        let mut builder = ProofBuilder::new(toolchain, workcell, "99")
            .status(ProofStatus::Success)
            .started_at(started)
            .completed_at(started + chrono::Duration::milliseconds(duration_ms as i64));
        if let Some(c) = cost {
            builder = builder.cost_usd(c);
        }
        let mut p = builder.build();
        p.verification.all_passed = verified;
        p
    }

    #[test]
    fn empty_input_yields_none() {
        assert!(vote(&[]).is_none());
    }

    #[test]
    fn single_proof_wins() {
        let proofs = vec![proof("claude", "wc-99-a", 100, None, false)];
        assert_eq!(vote(&proofs).unwrap().workcell_id, "wc-99-a");
    }

    #[test]
    fn faster_verified_proof_wins() {
        // The documented speculate scenario: both verified, claude faster.
        let proofs = vec![
            proof("claude", "wc-99-spec1-a", 30_000, None, true),
            proof("codex", "wc-99-spec2-b", 42_000, None, true),
        ];
        let winner = vote(&proofs).unwrap();
        assert_eq!(winner.metadata.toolchain, "claude");
    }

    #[test]
    fn verified_beats_faster_unverified() {
        let proofs = vec![
            proof("claude", "wc-99-a", 10, None, false),
            proof("codex", "wc-99-b", 99_000, None, true),
        ];
        assert_eq!(vote(&proofs).unwrap().metadata.toolchain, "codex");
    }

    #[test]
    fn all_unverified_still_selects() {
        let proofs = vec![
            proof("claude", "wc-99-a", 500, None, false),
            proof("codex", "wc-99-b", 100, None, false),
        ];
        assert_eq!(vote(&proofs).unwrap().metadata.toolchain, "codex");
    }

    #[test]
    fn cheaper_wins_on_equal_duration() {
        let proofs = vec![
            proof("claude", "wc-99-a", 100, Some(2.0), true),
            proof("codex", "wc-99-b", 100, Some(0.5), true),
        ];
        assert_eq!(vote(&proofs).unwrap().metadata.toolchain, "codex");
    }

    #[test]
    fn known_cost_beats_missing_cost() {
        let proofs = vec![
            proof("claude", "wc-99-a", 100, None, true),
            proof("codex", "wc-99-b", 100, Some(9.9), true),
        ];
        assert_eq!(vote(&proofs).unwrap().metadata.toolchain, "codex");
    }

    #[test]
    fn signature_breaks_full_ties_deterministically() {
        let a = proof("claude", "wc-99-aaaa", 100, Some(1.0), true);
        let b = proof("claude", "wc-99-bbbb", 100, Some(1.0), true);

        let forward = vote(&[a.clone(), b.clone()]).unwrap().workcell_id.clone();
        let reverse = vote(&[b, a]).unwrap().workcell_id.clone();
        assert_eq!(forward, reverse);
        assert_eq!(forward, "wc-99-aaaa");
    }

    #[test]
    fn vote_result_is_a_member_of_input() {
        let proofs = vec![
            proof("claude", "wc-99-a", 300, None, false),
            proof("codex", "wc-99-b", 200, Some(1.0), true),
            proof("crush", "wc-99-c", 100, None, true),
        ];
        let winner = vote(&proofs).unwrap();
        assert!(proofs.iter().any(|p| p.workcell_id == winner.workcell_id));
    }

    #[test]
    fn vote_is_idempotent_under_permutation() {
        let a = proof("claude", "wc-99-a", 300, Some(0.4), true);
        let b = proof("codex", "wc-99-b", 200, None, true);
        let c = proof("crush", "wc-99-c", 200, Some(3.0), false);

        let mut permutations = vec![
            vec![a.clone(), b.clone(), c.clone()],
            vec![b.clone(), c.clone(), a.clone()],
            vec![c.clone(), a.clone(), b.clone()],
            vec![c, b, a],
        ];
        let winners: Vec<String> = permutations
            .drain(..)
            .map(|p| vote(&p).unwrap().workcell_id.clone())
            .collect();
        assert!(winners.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn action_signature_is_canonical() {
        let p = proof("claude", "wc-99-a", 1, None, true);
        assert_eq!(
            action_signature(&p),
            r#"{"issue":"99","toolchain":"claude","workcell":"wc-99-a"}"#
        );
    }
}
