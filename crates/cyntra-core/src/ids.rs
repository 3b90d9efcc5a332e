// SPDX-License-Identifier: MIT OR Apache-2.0
//! Workcell and run identifier helpers.

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

/// Length of the random suffix appended to workcell ids.
const SUFFIX_LEN: usize = 8;

/// Generate a random 8-character lowercase hex suffix.
#[must_use]
pub fn short_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..SUFFIX_LEN].to_string()
}

/// Build a workcell id: `wc-<issue_id>-<suffix>`, or
/// `wc-<issue_id>-<tag>-<suffix>` for speculate candidates.
///
/// # Examples
///
/// ```
/// let id = cyntra_core::ids::workcell_id("42", None);
/// assert!(id.starts_with("wc-42-"));
///
/// let id = cyntra_core::ids::workcell_id("42", Some("spec1"));
/// assert!(id.starts_with("wc-42-spec1-"));
/// ```
#[must_use]
pub fn workcell_id(issue_id: &str, speculate_tag: Option<&str>) -> String {
    match speculate_tag {
        Some(tag) => format!("wc-{issue_id}-{tag}-{}", short_suffix()),
        None => format!("wc-{issue_id}-{}", short_suffix()),
    }
}

/// Build the branch name for a workcell: `wc/<issue_id>/<workcell_id>`.
#[must_use]
pub fn branch_name(issue_id: &str, workcell_id: &str) -> String {
    format!("wc/{issue_id}/{workcell_id}")
}

/// Generate a run id for the per-run artifact directory.
#[must_use]
pub fn run_id() -> String {
    format!("run-{}", Uuid::new_v4().simple())
}

/// Format a timestamp as RFC3339 with a `Z` suffix and millisecond precision.
#[must_use]
pub fn rfc3339_z(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
