// SPDX-License-Identifier: MIT OR Apache-2.0
//! cyntra-paths
#![deny(unsafe_code)]
//!
//! Path matching for the kernel: forbidden-path rules checked against a
//! patch's modified files, and the staging filter applied when a workcell
//! is built as a copy instead of a worktree.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;

/// Errors from compiling path rules.
#[derive(Debug, thiserror::Error)]
pub enum PathRuleError {
    /// A configured pattern is not a valid glob.
    #[error("invalid staging glob '{pattern}': {source}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// The underlying glob parse error.
        source: globset::Error,
    },
}

// ---------------------------------------------------------------------------
// Forbidden paths
// ---------------------------------------------------------------------------

/// Compiled forbidden-path rules for an issue.
///
/// Three pattern shapes are recognised:
/// - trailing `/`: everything strictly under the directory
///   (`docs/` matches `docs/foo.md`, not `docs` itself);
/// - trailing `*`: plain prefix match (`src/gen*` matches `src/generated.rs`);
/// - bare path: the exact file, or anything under it as a directory
///   (`Cargo.lock` matches `Cargo.lock`; `vendor` matches `vendor/x.rs`).
#[derive(Debug, Clone, Default)]
pub struct ForbiddenPaths {
    patterns: Vec<String>,
}

impl ForbiddenPaths {
    /// Compile a pattern list. Empty input means nothing is forbidden.
    #[must_use]
    pub fn new(patterns: &[String]) -> Self {
        Self {
            patterns: patterns.to_vec(),
        }
    }

    /// Whether no patterns are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Returns `true` if `path` matches any forbidden pattern.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| pattern_matches(p, path))
    }

    /// Filter a list of modified paths down to the violating ones,
    /// preserving input order.
    #[must_use]
    pub fn violations<'a, I>(&self, files: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        files
            .into_iter()
            .filter(|f| self.matches(f))
            .map(str::to_string)
            .collect()
    }
}

fn pattern_matches(pattern: &str, path: &str) -> bool {
    if let Some(dir) = pattern.strip_suffix('/') {
        // Directory rule: only contents, not the bare name.
        path.strip_prefix(dir)
            .is_some_and(|rest| rest.starts_with('/') && rest.len() > 1)
    } else if let Some(prefix) = pattern.strip_suffix('*') {
        path.starts_with(prefix)
    } else {
        path == pattern || path.starts_with(&format!("{pattern}/"))
    }
}

// ---------------------------------------------------------------------------
// Staging rules
// ---------------------------------------------------------------------------

/// Glob filter applied to every path copied into a staged workcell.
///
/// Excludes win over includes; an empty include list means everything not
/// excluded is copied. Compiled once per workcell manager and reused for
/// every staged allocation.
#[derive(Debug, Clone, Default)]
pub struct StagingRules {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl StagingRules {
    /// Rules that copy everything.
    #[must_use]
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Compile include and exclude pattern lists.
    ///
    /// # Errors
    ///
    /// Returns [`PathRuleError::InvalidPattern`] naming the first pattern
    /// that fails to parse as a glob.
    pub fn compile(include: &[String], exclude: &[String]) -> Result<Self, PathRuleError> {
        Ok(Self {
            include: compile_set(include)?,
            exclude: compile_set(exclude)?,
        })
    }

    /// Whether no patterns are configured at all.
    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        self.include.is_none() && self.exclude.is_none()
    }

    /// Whether a workcell-relative path should be copied into the sandbox.
    #[must_use]
    pub fn allows(&self, candidate: &Path) -> bool {
        if self.exclude.as_ref().is_some_and(|set| set.is_match(candidate)) {
            return false;
        }
        match &self.include {
            Some(set) => set.is_match(candidate),
            None => true,
        }
    }

    /// [`allows`](Self::allows) for string paths.
    #[must_use]
    pub fn allows_str(&self, candidate: &str) -> bool {
        self.allows(Path::new(candidate))
    }
}

fn compile_set(patterns: &[String]) -> Result<Option<GlobSet>, PathRuleError> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| PathRuleError::InvalidPattern {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    let set = builder
        .build()
        .map_err(|source| PathRuleError::InvalidPattern {
            pattern: patterns.join(", "),
            source,
        })?;
    Ok(Some(set))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|x| x.to_string()).collect()
    }

    // --- ForbiddenPaths ---

    #[test]
    fn directory_rule_matches_contents_only() {
        let rules = ForbiddenPaths::new(&patterns(&["docs/"]));
        assert!(rules.matches("docs/foo.md"));
        assert!(rules.matches("docs/subdir/bar"));
        assert!(!rules.matches("docs"));
        assert!(!rules.matches("mydocs/foo"));
    }

    #[test]
    fn star_rule_is_prefix_match() {
        let rules = ForbiddenPaths::new(&patterns(&["src/gen*"]));
        assert!(rules.matches("src/generated.rs"));
        assert!(rules.matches("src/gen"));
        assert!(!rules.matches("src/main.rs"));
    }

    #[test]
    fn bare_rule_matches_file_or_directory() {
        let rules = ForbiddenPaths::new(&patterns(&["Cargo.lock"]));
        assert!(rules.matches("Cargo.lock"));
        assert!(rules.matches("Cargo.lock/weird"));
        assert!(!rules.matches("Cargo.lock.bak"));
    }

    #[test]
    fn workflow_directory_violation() {
        let rules = ForbiddenPaths::new(&patterns(&[".github/workflows/"]));
        let violations = rules.violations(["src/lib.rs", ".github/workflows/ci.yml"]);
        assert_eq!(violations, vec![".github/workflows/ci.yml".to_string()]);
    }

    #[test]
    fn violations_preserve_input_order() {
        let rules = ForbiddenPaths::new(&patterns(&["docs/"]));
        let violations = rules.violations(["docs/b.md", "src/x.rs", "docs/a.md"]);
        assert_eq!(violations, vec!["docs/b.md".to_string(), "docs/a.md".to_string()]);
    }

    #[test]
    fn empty_rules_match_nothing() {
        let rules = ForbiddenPaths::default();
        assert!(rules.is_empty());
        assert!(!rules.matches("anything"));
        assert!(rules.violations(["a", "b"]).is_empty());
    }

    #[test]
    fn directory_rule_does_not_match_trailing_slash_only() {
        let rules = ForbiddenPaths::new(&patterns(&["docs/"]));
        assert!(!rules.matches("docs/"));
    }

    // --- StagingRules ---

    #[test]
    fn allow_all_copies_everything() {
        let rules = StagingRules::allow_all();
        assert!(rules.is_unrestricted());
        assert!(rules.allows_str("src/lib.rs"));
        assert!(rules.allows_str("target/debug/bin"));
    }

    #[test]
    fn excludes_win_over_includes() {
        let rules = StagingRules::compile(
            &patterns(&["src/**"]),
            &patterns(&["src/generated/**"]),
        )
        .expect("compile rules");
        assert!(rules.allows_str("src/lib.rs"));
        assert!(!rules.allows_str("src/generated/out.rs"));
    }

    #[test]
    fn include_list_gates_copies() {
        let rules =
            StagingRules::compile(&patterns(&["src/**", "tests/**"]), &[]).expect("compile rules");
        assert!(rules.allows_str("src/lib.rs"));
        assert!(rules.allows_str("tests/it.rs"));
        assert!(!rules.allows_str("README.md"));
    }

    #[test]
    fn exclude_only_rules_pass_the_rest() {
        let rules = StagingRules::compile(&[], &patterns(&["target/**", "*.log"]))
            .expect("compile rules");
        assert!(!rules.allows_str("target/debug/bin"));
        assert!(!rules.allows_str("build.log"));
        assert!(rules.allows_str("src/main.rs"));
    }

    #[test]
    fn invalid_pattern_names_the_culprit() {
        let err = StagingRules::compile(&patterns(&["["]), &[]).expect_err("invalid glob");
        match err {
            PathRuleError::InvalidPattern { pattern, .. } => assert_eq!(pattern, "["),
        }
    }

    #[test]
    fn path_and_str_forms_agree() {
        let rules = StagingRules::compile(&patterns(&["src/**"]), &patterns(&["src/gen/**"]))
            .expect("compile rules");
        for case in ["src/lib.rs", "src/gen/out.rs", "README.md"] {
            assert_eq!(rules.allows_str(case), rules.allows(Path::new(case)));
        }
    }
}
