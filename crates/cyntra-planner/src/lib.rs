// SPDX-License-Identifier: MIT OR Apache-2.0
//! cyntra-planner
#![deny(unsafe_code)]
//!
//! Narrow inference interface to the swarm planner.
//!
//! The planner itself is trained and compiled elsewhere; the kernel only
//! consumes a prediction: how wide to speculate and how long to let a
//! swarm run. In `log` mode predictions are recorded and the baseline
//! executes; in `enforce` mode confident predictions override defaults.

use cyntra_config::{PlannerConfig, PlannerMode};
use cyntra_core::{Manifest, RiskLevel};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Errors from planner inference.
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    /// The compiled bundle could not be loaded.
    #[error("planner bundle unavailable: {0}")]
    BundleUnavailable(String),

    /// Inference produced no usable action.
    #[error("planner inference failed: {0}")]
    InferenceFailed(String),
}

/// A predicted swarm action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedAction {
    /// Identifier of the swarm configuration to use.
    pub swarm_id: String,
    /// How many speculate candidates to race.
    pub max_candidates: u32,
    /// Wall-clock budget for the swarm, in minutes.
    pub max_minutes: u32,
    /// Iteration cap for the swarm.
    pub max_iterations: u32,
    /// Model confidence in this action.
    pub confidence: f64,
}

/// Summary of a past outcome, part of the inference input bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeSummary {
    /// Issue the attempt was for.
    pub issue_id: String,
    /// Final proof status.
    pub status: String,
    /// Attempt duration.
    pub duration_ms: u64,
}

/// The planner inference seam.
pub trait PlannerClient: Send + Sync {
    /// Predict an action for the manifest given recent history.
    ///
    /// # Errors
    ///
    /// Returns [`PlannerError`] when the bundle is unavailable or
    /// inference fails; callers fall back to the baseline.
    fn predict(
        &self,
        manifest: &Manifest,
        history: &[OutcomeSummary],
    ) -> Result<PlannedAction, PlannerError>;
}

/// Build the planner client for a configuration. `off` mode yields `None`.
#[must_use]
pub fn build_planner(config: &PlannerConfig) -> Option<Box<dyn PlannerClient>> {
    if config.mode == PlannerMode::Off {
        return None;
    }
    config
        .bundle_dir
        .as_deref()
        .map(|dir| Box::new(BundlePlanner::new(dir)) as Box<dyn PlannerClient>)
}

/// Planner backed by a compiled policy table shipped in the bundle
/// directory (`policy.json`).
///
/// The table maps risk levels to actions. This is the inference surface
/// the training stack exports; anything heavier (an ONNX session, a
/// remote endpoint) plugs in behind the same trait.
pub struct BundlePlanner {
    policy: serde_json::Value,
}

impl BundlePlanner {
    /// Load the policy table from `<bundle_dir>/policy.json`.
    ///
    /// A missing or malformed bundle is remembered and surfaces as
    /// [`PlannerError::BundleUnavailable`] on every predict call.
    #[must_use]
    pub fn new(bundle_dir: &Path) -> Self {
        let path = bundle_dir.join("policy.json");
        let policy = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or(serde_json::Value::Null);
        Self { policy }
    }

    fn entry_for(&self, risk: RiskLevel) -> Option<&serde_json::Value> {
        self.policy
            .get("by_risk")
            .and_then(|m| m.get(risk.as_str()))
            .or_else(|| self.policy.get("default"))
    }
}

impl PlannerClient for BundlePlanner {
    fn predict(
        &self,
        manifest: &Manifest,
        history: &[OutcomeSummary],
    ) -> Result<PlannedAction, PlannerError> {
        if self.policy.is_null() {
            return Err(PlannerError::BundleUnavailable(
                "policy.json missing or malformed".into(),
            ));
        }

        let entry = self
            .entry_for(manifest.issue.risk_level)
            .ok_or_else(|| PlannerError::InferenceFailed("no policy entry for risk".into()))?;

        let action: PlannedAction = serde_json::from_value(entry.clone())
            .map_err(|e| PlannerError::InferenceFailed(e.to_string()))?;

        // Recent failures on the same issue dampen confidence; the policy
        // table was fit on first attempts.
        let failures = history
            .iter()
            .filter(|h| h.issue_id == manifest.issue.id && h.status != "success")
            .count() as f64;
        let confidence = (action.confidence * 0.8_f64.powf(failures)).max(0.0);

        debug!(
            target: "cyntra.planner",
            issue_id = %manifest.issue.id,
            swarm_id = %action.swarm_id,
            confidence,
            "planner prediction"
        );

        Ok(PlannedAction {
            confidence,
            ..action
        })
    }
}
