// SPDX-License-Identifier: MIT OR Apache-2.0
//! cyntra-workcell
#![deny(unsafe_code)]
//!
//! Workcell sandbox management.
//!
//! A workcell is a logically independent checkout of the repository where a
//! single dispatch edits files. When the repository root is a git repo the
//! manager uses `git worktree add` (cheap, real branches); otherwise it
//! stages a filtered copy and initializes a synthetic repo so diffs and
//! branches still work.

use chrono::Utc;
use cyntra_core::{Workcell, ids};
use cyntra_paths::StagingRules;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Directories never copied into a staged workcell.
const STAGING_SKIP_DIRS: &[&str] = &[".git", ".workcells", ".cyntra", ".beads"];

/// Errors from workcell allocation.
#[derive(Debug, thiserror::Error)]
pub enum WorkcellError {
    /// The sandbox could not be created.
    #[error("workcell allocation failed: {0}")]
    Allocation(String),

    /// A filesystem operation failed.
    #[error("workcell I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Creates and destroys workcell sandboxes.
///
/// Safe to call concurrently for distinct workcell ids; operations on the
/// same id are serialized through per-id locks.
pub struct WorkcellManager {
    repo_root: PathBuf,
    workcells_dir: PathBuf,
    archives_dir: PathBuf,
    default_branch: String,
    staging: StagingRules,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    // git serializes worktree bookkeeping through repo-level lock files;
    // taking our own lock avoids spurious "could not lock" failures when
    // speculate candidates allocate at the same instant.
    git_lock: Mutex<()>,
}

impl WorkcellManager {
    /// Create a manager for the given repository layout.
    #[must_use]
    pub fn new(
        repo_root: impl Into<PathBuf>,
        workcells_dir: impl Into<PathBuf>,
        archives_dir: impl Into<PathBuf>,
        default_branch: impl Into<String>,
    ) -> Self {
        Self {
            repo_root: repo_root.into(),
            workcells_dir: workcells_dir.into(),
            archives_dir: archives_dir.into(),
            default_branch: default_branch.into(),
            staging: StagingRules::allow_all(),
            locks: Mutex::new(HashMap::new()),
            git_lock: Mutex::new(()),
        }
    }

    /// Apply the configured staged-copy filter. Worktree allocations are
    /// unaffected; the filter only gates what a copy-based sandbox gets.
    #[must_use]
    pub fn with_staging(mut self, staging: StagingRules) -> Self {
        self.staging = staging;
        self
    }

    /// The branch new workcells are based on.
    #[must_use]
    pub fn default_branch(&self) -> &str {
        &self.default_branch
    }

    fn lock_for(&self, workcell_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("workcell lock map poisoned");
        Arc::clone(
            locks
                .entry(workcell_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Allocate a sandbox for `issue_id`, optionally tagged for speculate
    /// mode.
    ///
    /// # Errors
    ///
    /// Returns [`WorkcellError::Allocation`] when the sandbox or its branch
    /// cannot be created.
    pub fn create(
        &self,
        issue_id: &str,
        speculate_tag: Option<&str>,
    ) -> Result<Workcell, WorkcellError> {
        let workcell_id = ids::workcell_id(issue_id, speculate_tag);
        let branch = ids::branch_name(issue_id, &workcell_id);
        let path = self.workcells_dir.join(&workcell_id);

        let id_lock = self.lock_for(&workcell_id);
        let _guard = id_lock.lock().expect("workcell id lock poisoned");

        fs::create_dir_all(&self.workcells_dir)?;

        let base_commit = if self.repo_root.join(".git").exists() {
            self.create_worktree(&path, &branch)?
        } else {
            self.create_staged_copy(&path, &branch)?
        };

        let logs_dir = path.join("logs");
        fs::create_dir_all(&logs_dir)?;

        debug!(
            target: "cyntra.workcell",
            workcell_id = %workcell_id,
            issue_id = %issue_id,
            branch = %branch,
            base_commit = %base_commit,
            "workcell created"
        );

        Ok(Workcell {
            workcell_id,
            issue_id: issue_id.to_string(),
            path,
            branch_name: branch,
            base_commit,
            logs_dir,
            created_at: Utc::now(),
        })
    }

    /// Remove a sandbox. With `keep_logs`, the logs directory is moved to
    /// `<archives_dir>/<workcell_id>/` first.
    ///
    /// Never raises: removal failures are reported as warnings and the
    /// manager moves on.
    pub fn cleanup(&self, workcell: &Workcell, keep_logs: bool) {
        let id_lock = self.lock_for(&workcell.workcell_id);
        let _guard = id_lock.lock().expect("workcell id lock poisoned");

        if keep_logs {
            self.archive_logs(workcell);
        }

        if self.repo_root.join(".git").exists() {
            // Detach the worktree first so git forgets the path; the branch
            // (and any commits on it) stays in the main repository.
            let _git = self.git_lock.lock().expect("git lock poisoned");
            if let Err(e) = run_git(
                &self.repo_root,
                &[
                    "worktree",
                    "remove",
                    "--force",
                    &workcell.path.display().to_string(),
                ],
            ) {
                debug!(
                    target: "cyntra.workcell",
                    workcell_id = %workcell.workcell_id,
                    error = %e,
                    "git worktree remove failed; falling back to directory removal"
                );
            }
        }

        if workcell.path.exists() {
            if let Err(e) = fs::remove_dir_all(&workcell.path) {
                warn!(
                    target: "cyntra.workcell",
                    workcell_id = %workcell.workcell_id,
                    path = %workcell.path.display(),
                    error = %e,
                    "failed to remove workcell directory"
                );
            }
        }
    }

    /// Ids of sandboxes currently present under the workcells directory.
    #[must_use]
    pub fn list_active(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.workcells_dir) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        ids.sort();
        ids
    }

    fn archive_logs(&self, workcell: &Workcell) {
        if !workcell.logs_dir.exists() {
            return;
        }
        let dest = self.archives_dir.join(&workcell.workcell_id);
        let result = fs::create_dir_all(&self.archives_dir)
            .and_then(|()| move_dir(&workcell.logs_dir, &dest));
        if let Err(e) = result {
            warn!(
                target: "cyntra.workcell",
                workcell_id = %workcell.workcell_id,
                error = %e,
                "failed to archive workcell logs"
            );
        }
    }

    fn create_worktree(&self, path: &Path, branch: &str) -> Result<String, WorkcellError> {
        let _git = self.git_lock.lock().expect("git lock poisoned");

        // Base on the configured default branch when it resolves, else HEAD
        // (fresh repos and detached fixtures).
        let base_ref = if run_git(&self.repo_root, &["rev-parse", "--verify", &self.default_branch])
            .is_ok()
        {
            self.default_branch.clone()
        } else {
            "HEAD".to_string()
        };

        run_git(
            &self.repo_root,
            &[
                "worktree",
                "add",
                "-b",
                branch,
                &path.display().to_string(),
                &base_ref,
            ],
        )
        .map_err(WorkcellError::Allocation)?;

        let base_commit = run_git(path, &["rev-parse", "HEAD"])
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        Ok(base_commit)
    }

    fn create_staged_copy(&self, path: &Path, branch: &str) -> Result<String, WorkcellError> {
        copy_tree(&self.repo_root, path, &self.staging)?;
        init_baseline_repo(path);

        let _ = run_git(path, &["checkout", "-qb", branch]);
        let base_commit = run_git(path, &["rev-parse", "HEAD"])
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        Ok(base_commit)
    }
}

/// Copy a source tree into `dest`, skipping kernel-owned directories and
/// anything the staging rules deny.
fn copy_tree(
    src_root: &Path,
    dest_root: &Path,
    rules: &StagingRules,
) -> Result<(), WorkcellError> {
    debug!(
        target: "cyntra.workcell",
        "staging copy from {} to {}",
        src_root.display(),
        dest_root.display()
    );

    let walker = WalkDir::new(src_root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            !STAGING_SKIP_DIRS.contains(&name.as_ref())
        });

    for entry in walker {
        let entry = entry.map_err(|e| WorkcellError::Allocation(e.to_string()))?;
        let path = entry.path();

        let rel = path.strip_prefix(src_root).unwrap_or(path);
        if rel.as_os_str().is_empty() {
            continue;
        }
        if !rules.allows(rel) {
            continue;
        }

        let dest_path = dest_root.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest_path)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(path, &dest_path)?;
        }
    }

    Ok(())
}

/// Initialize a git repo with a baseline commit so diffs are meaningful.
/// Best-effort: a missing `git` binary leaves a bare directory behind.
fn init_baseline_repo(path: &Path) {
    if path.join(".git").exists() {
        return;
    }

    let _ = Command::new("git")
        .args(["init", "-q"])
        .current_dir(path)
        .status();
    let _ = Command::new("git")
        .args(["add", "-A"])
        .current_dir(path)
        .status();
    let _ = Command::new("git")
        .args([
            "-c",
            "user.name=cyntra",
            "-c",
            "user.email=cyntra@local",
            "commit",
            "-qm",
            "baseline",
            "--allow-empty",
        ])
        .current_dir(path)
        .status();
}

/// Move a directory, falling back to copy+remove across filesystems.
fn move_dir(src: &Path, dest: &Path) -> std::io::Result<()> {
    if fs::rename(src, dest).is_ok() {
        return Ok(());
    }
    fs::create_dir_all(dest)?;
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(std::io::Error::other)?;
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        if rel.as_os_str().is_empty() {
            continue;
        }
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    fs::remove_dir_all(src)
}

/// Run a git command in `dir`, returning stdout on success.
///
/// # Errors
///
/// Returns the combined failure description when the command cannot be
/// spawned or exits non-zero.
pub fn run_git(dir: &Path, args: &[&str]) -> Result<String, String> {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| format!("run git {args:?}: {e}"))?;

    if !out.status.success() {
        return Err(format!(
            "git {:?} failed (code={:?}): {}",
            args,
            out.status.code(),
            String::from_utf8_lossy(&out.stderr).trim()
        ));
    }

    Ok(String::from_utf8_lossy(&out.stdout).to_string())
}
