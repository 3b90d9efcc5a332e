// SPDX-License-Identifier: MIT OR Apache-2.0
//! cyntra-beads
#![deny(unsafe_code)]
//!
//! Client interface to the bead store (the external issue database).
//!
//! The kernel depends only on the [`BeadStore`] trait. Two implementations
//! ship here: [`FileBeadStore`] reads the JSONL issue file the bead tooling
//! maintains under `.beads/`, and [`MemoryBeadStore`] backs tests and
//! dry runs.

use chrono::Utc;
use cyntra_core::{Issue, IssueStatus};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Issue file maintained by the bead tooling inside `.beads/`.
pub const ISSUES_FILE: &str = "issues.jsonl";

/// Errors from bead-store access.
#[derive(Debug, thiserror::Error)]
pub enum BeadStoreError {
    /// The store's backing data could not be read or written.
    #[error("bead store unavailable: {0}")]
    Unavailable(String),

    /// A malformed record was encountered.
    #[error("bead store record invalid: {0}")]
    InvalidRecord(String),

    /// The requested issue does not exist.
    #[error("unknown issue: {id}")]
    UnknownIssue {
        /// The id that was looked up.
        id: String,
    },
}

/// Read/update access to the bead store.
///
/// Reads may happen from any thread; status updates follow a single-writer
/// discipline enforced by the runner.
pub trait BeadStore: Send + Sync {
    /// Issues whose status is `ready` and whose blockers are all completed.
    ///
    /// # Errors
    ///
    /// Returns [`BeadStoreError::Unavailable`] when the store cannot be read.
    fn list_ready(&self) -> Result<Vec<Issue>, BeadStoreError>;

    /// Issues currently marked `in_progress`.
    ///
    /// # Errors
    ///
    /// Returns [`BeadStoreError::Unavailable`] when the store cannot be read.
    fn list_in_progress(&self) -> Result<Vec<Issue>, BeadStoreError>;

    /// Fetch a single issue by id.
    ///
    /// # Errors
    ///
    /// Returns [`BeadStoreError::UnknownIssue`] when the id does not exist.
    fn get(&self, id: &str) -> Result<Issue, BeadStoreError>;

    /// Transition an issue's status, optionally recording a reason.
    ///
    /// Transitioning back to `ready` refreshes `ready_since` and bumps
    /// `retry_count`; other transitions leave retry accounting alone.
    ///
    /// # Errors
    ///
    /// Returns [`BeadStoreError::UnknownIssue`] for missing ids or
    /// [`BeadStoreError::Unavailable`] when the write fails.
    fn update_status(
        &self,
        id: &str,
        new_status: IssueStatus,
        reason: Option<&str>,
    ) -> Result<(), BeadStoreError>;
}

fn apply_transition(issue: &mut Issue, new_status: IssueStatus) {
    if new_status == IssueStatus::Ready && issue.status != IssueStatus::Ready {
        issue.ready_since = Some(Utc::now());
        issue.retry_count = issue.retry_count.saturating_add(1);
    }
    issue.status = new_status;
}

fn ready_with_blockers_done(issues: &BTreeMap<String, Issue>) -> Vec<Issue> {
    issues
        .values()
        .filter(|issue| issue.status == IssueStatus::Ready)
        .filter(|issue| {
            issue.blocked_by.iter().all(|dep| {
                issues
                    .get(dep)
                    .is_some_and(|d| d.status == IssueStatus::Completed)
            })
        })
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// File-backed store
// ---------------------------------------------------------------------------

/// Bead store backed by a JSONL file, one issue per line.
///
/// Writes rewrite the file atomically (temp file + rename) so a crashed
/// kernel never leaves a half-written issue list behind.
pub struct FileBeadStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileBeadStore {
    /// Open the store rooted at a `.beads/` directory.
    #[must_use]
    pub fn new(beads_dir: &Path) -> Self {
        Self {
            path: beads_dir.join(ISSUES_FILE),
            lock: Mutex::new(()),
        }
    }

    /// Path of the backing issues file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, Issue>, BeadStoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(BeadStoreError::Unavailable(e.to_string())),
        };

        let mut issues = BTreeMap::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let issue: Issue = serde_json::from_str(line).map_err(|e| {
                BeadStoreError::InvalidRecord(format!(
                    "{}:{}: {e}",
                    self.path.display(),
                    lineno + 1
                ))
            })?;
            issues.insert(issue.id.clone(), issue);
        }
        Ok(issues)
    }

    fn write_all(&self, issues: &BTreeMap<String, Issue>) -> Result<(), BeadStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BeadStoreError::Unavailable(e.to_string()))?;
        }

        let mut out = String::new();
        for issue in issues.values() {
            let line = serde_json::to_string(issue)
                .map_err(|e| BeadStoreError::InvalidRecord(e.to_string()))?;
            out.push_str(&line);
            out.push('\n');
        }

        let tmp = self.path.with_extension("jsonl.tmp");
        std::fs::write(&tmp, out).map_err(|e| BeadStoreError::Unavailable(e.to_string()))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| BeadStoreError::Unavailable(e.to_string()))?;
        Ok(())
    }
}

impl BeadStore for FileBeadStore {
    fn list_ready(&self) -> Result<Vec<Issue>, BeadStoreError> {
        let _guard = self.lock.lock().expect("bead store lock poisoned");
        Ok(ready_with_blockers_done(&self.read_all()?))
    }

    fn list_in_progress(&self) -> Result<Vec<Issue>, BeadStoreError> {
        let _guard = self.lock.lock().expect("bead store lock poisoned");
        Ok(self
            .read_all()?
            .into_values()
            .filter(|i| i.status == IssueStatus::InProgress)
            .collect())
    }

    fn get(&self, id: &str) -> Result<Issue, BeadStoreError> {
        let _guard = self.lock.lock().expect("bead store lock poisoned");
        self.read_all()?
            .remove(id)
            .ok_or_else(|| BeadStoreError::UnknownIssue { id: id.to_string() })
    }

    fn update_status(
        &self,
        id: &str,
        new_status: IssueStatus,
        reason: Option<&str>,
    ) -> Result<(), BeadStoreError> {
        let _guard = self.lock.lock().expect("bead store lock poisoned");
        let mut issues = self.read_all()?;
        let issue = issues
            .get_mut(id)
            .ok_or_else(|| BeadStoreError::UnknownIssue { id: id.to_string() })?;

        let from = issue.status;
        apply_transition(issue, new_status);
        debug!(
            target: "cyntra.beads",
            issue_id = %id,
            from = ?from,
            to = ?new_status,
            reason = reason.unwrap_or(""),
            "issue status updated"
        );

        self.write_all(&issues)
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// In-memory bead store for tests and dry runs.
#[derive(Default)]
pub struct MemoryBeadStore {
    issues: Mutex<BTreeMap<String, Issue>>,
}

impl MemoryBeadStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with the given issues.
    #[must_use]
    pub fn with_issues(issues: impl IntoIterator<Item = Issue>) -> Self {
        let store = Self::new();
        store.seed(issues);
        store
    }

    /// Insert or replace issues.
    pub fn seed(&self, issues: impl IntoIterator<Item = Issue>) {
        let mut map = self.issues.lock().expect("bead store lock poisoned");
        for issue in issues {
            map.insert(issue.id.clone(), issue);
        }
    }

    /// Snapshot every issue, for assertions.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Issue> {
        self.issues
            .lock()
            .expect("bead store lock poisoned")
            .values()
            .cloned()
            .collect()
    }
}

impl BeadStore for MemoryBeadStore {
    fn list_ready(&self) -> Result<Vec<Issue>, BeadStoreError> {
        let map = self.issues.lock().expect("bead store lock poisoned");
        Ok(ready_with_blockers_done(&map))
    }

    fn list_in_progress(&self) -> Result<Vec<Issue>, BeadStoreError> {
        let map = self.issues.lock().expect("bead store lock poisoned");
        Ok(map
            .values()
            .filter(|i| i.status == IssueStatus::InProgress)
            .cloned()
            .collect())
    }

    fn get(&self, id: &str) -> Result<Issue, BeadStoreError> {
        let map = self.issues.lock().expect("bead store lock poisoned");
        map.get(id)
            .cloned()
            .ok_or_else(|| BeadStoreError::UnknownIssue { id: id.to_string() })
    }

    fn update_status(
        &self,
        id: &str,
        new_status: IssueStatus,
        _reason: Option<&str>,
    ) -> Result<(), BeadStoreError> {
        let mut map = self.issues.lock().expect("bead store lock poisoned");
        let issue = map
            .get_mut(id)
            .ok_or_else(|| BeadStoreError::UnknownIssue { id: id.to_string() })?;
        apply_transition(issue, new_status);
        Ok(())
    }
}
