// SPDX-License-Identifier: MIT OR Apache-2.0
//! Post-execution interrogation of the workcell's VCS.

use cyntra_core::{DiffStats, Manifest, Patch, Workcell};
use cyntra_paths::ForbiddenPaths;
use cyntra_workcell::run_git;

/// Inspect the workcell after execution and describe what changed.
///
/// The diff base is the commit the workcell was created from (which is by
/// construction the merge-base of the work branch with the default
/// branch). A run that committed nothing reports an empty diff.
#[must_use]
pub fn collect_patch_info(workcell: &Workcell, manifest: &Manifest) -> Patch {
    let base = workcell.base_commit.clone();
    let head = run_git(&workcell.path, &["rev-parse", "HEAD"])
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    let (diff_stats, files_modified) = if base.is_empty() || head.is_empty() || base == head {
        (DiffStats::default(), Vec::new())
    } else {
        let stat = run_git(&workcell.path, &["diff", "--stat", &base, "HEAD"])
            .unwrap_or_default();
        let names = run_git(&workcell.path, &["diff", "--name-only", &base, "HEAD"])
            .unwrap_or_default();
        let files: Vec<String> = names
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        (parse_diff_stats(&stat), files)
    };

    let forbidden = ForbiddenPaths::new(&manifest.issue.forbidden_paths);
    let violations = forbidden.violations(files_modified.iter().map(String::as_str));

    Patch {
        branch: workcell.branch_name.clone(),
        base_commit: base,
        head_commit: head,
        diff_stats,
        files_modified,
        forbidden_path_violations: violations,
    }
}

/// Parse the summary line of `git diff --stat`:
/// `N files changed, M insertions(+), K deletions(-)`.
///
/// Absent segments (e.g. a deletion-only diff) read as zero.
#[must_use]
pub fn parse_diff_stats(stat_output: &str) -> DiffStats {
    let Some(summary) = stat_output
        .lines()
        .rev()
        .find(|l| l.contains("changed"))
    else {
        return DiffStats::default();
    };

    let mut stats = DiffStats::default();
    for segment in summary.split(',') {
        let segment = segment.trim();
        let Some(number) = segment
            .split_whitespace()
            .next()
            .and_then(|n| n.parse::<u64>().ok())
        else {
            continue;
        };
        if segment.contains("file") {
            stats.files_changed = number;
        } else if segment.contains("insertion") {
            stats.insertions = number;
        } else if segment.contains("deletion") {
            stats.deletions = number;
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_summary() {
        let stats =
            parse_diff_stats(" 3 files changed, 120 insertions(+), 42 deletions(-)\n");
        assert_eq!(
            stats,
            DiffStats {
                files_changed: 3,
                insertions: 120,
                deletions: 42
            }
        );
    }

    #[test]
    fn parses_singular_forms() {
        let stats = parse_diff_stats(" 1 file changed, 1 insertion(+), 1 deletion(-)\n");
        assert_eq!(
            stats,
            DiffStats {
                files_changed: 1,
                insertions: 1,
                deletions: 1
            }
        );
    }

    #[test]
    fn missing_segments_read_zero() {
        let stats = parse_diff_stats(" 2 files changed, 10 deletions(-)\n");
        assert_eq!(stats.files_changed, 2);
        assert_eq!(stats.insertions, 0);
        assert_eq!(stats.deletions, 10);
    }

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(parse_diff_stats(""), DiffStats::default());
        assert_eq!(parse_diff_stats("no summary here\n"), DiffStats::default());
    }

    #[test]
    fn summary_line_found_below_per_file_lines() {
        let out = " src/lib.rs | 10 +++++-----\n tests/it.rs | 4 ++--\n 2 files changed, 7 insertions(+), 7 deletions(-)\n";
        let stats = parse_diff_stats(out);
        assert_eq!(stats.files_changed, 2);
        assert_eq!(stats.insertions, 7);
    }
}
