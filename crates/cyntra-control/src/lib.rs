// SPDX-License-Identifier: MIT OR Apache-2.0
//! cyntra-control
#![deny(unsafe_code)]
//!
//! Closed-loop exploration control.
//!
//! The controller watches per-issue outcomes and widens the search after
//! repeated failures: more speculate candidates, hotter sampling. A clean
//! success walks both back toward the baseline. The update law is
//! monotone in the failure count and bounded by the configured limits.

use cyntra_config::ControlConfig;
use cyntra_core::{Issue, Sampling};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Outcome history the controller keeps per issue.
#[derive(Debug, Clone, Copy, Default)]
struct IssueControlState {
    consecutive_failures: u32,
    successes: u32,
}

/// Tracks per-issue exploration state.
pub struct Controller {
    config: ControlConfig,
    state: Mutex<BTreeMap<String, IssueControlState>>,
}

impl Controller {
    /// Create a controller with the given bounds.
    #[must_use]
    pub fn new(config: ControlConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BTreeMap::new()),
        }
    }

    /// Record the outcome of an attempt. Success resets the failure
    /// streak; failure extends it.
    pub fn record_outcome(&self, issue_id: &str, success: bool) {
        let mut state = self.state.lock().expect("controller state poisoned");
        let entry = state.entry(issue_id.to_string()).or_default();
        if success {
            entry.consecutive_failures = 0;
            entry.successes = entry.successes.saturating_add(1);
        } else {
            entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
        }
    }

    /// Failure streak for an issue (0 when unseen).
    #[must_use]
    pub fn failure_streak(&self, issue_id: &str) -> u32 {
        self.state
            .lock()
            .expect("controller state poisoned")
            .get(issue_id)
            .map_or(0, |s| s.consecutive_failures)
    }

    /// Recommended speculate parallelism: the default widened by one
    /// `parallelism_step` per recorded failure, capped at `max`.
    #[must_use]
    pub fn speculate_parallelism(&self, issue: &Issue, default: u32, max: u32) -> u32 {
        if !self.config.enabled {
            return default.min(max).max(1);
        }
        let failures = self.failure_streak(&issue.id);
        let widened = default.saturating_add(failures.saturating_mul(self.config.parallelism_step));
        widened.min(max).max(1)
    }

    /// Sampling for the next attempt: base temperature plus one step per
    /// failure, clamped to the configured band.
    #[must_use]
    pub fn sampling_for(&self, issue: &Issue) -> Sampling {
        let failures = if self.config.enabled {
            self.failure_streak(&issue.id)
        } else {
            0
        };
        let temperature = (self.config.temperature_base
            + f64::from(failures) * self.config.temperature_step)
            .clamp(self.config.temperature_min, self.config.temperature_max);
        Sampling {
            temperature,
            top_p: 0.95,
        }
    }

    /// Planner action scalar derived from the failure streak, scaled into
    /// `[action_low, action_high]`.
    #[must_use]
    pub fn action_for(&self, issue: &Issue) -> f64 {
        let failures = f64::from(self.failure_streak(&issue.id));
        // Saturates after a handful of failures.
        let pressure = (failures / 4.0).min(1.0);
        self.config.action_low + pressure * (self.config.action_high - self.config.action_low)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue() -> Issue {
        Issue::new("42", "t")
    }

    #[test]
    fn fresh_issue_uses_baseline() {
        let c = Controller::new(ControlConfig::default());
        let i = issue();
        assert_eq!(c.speculate_parallelism(&i, 2, 3), 2);
        let s = c.sampling_for(&i);
        assert!((s.temperature - 0.2).abs() < 1e-9);
    }

    #[test]
    fn failures_widen_parallelism_up_to_cap() {
        let c = Controller::new(ControlConfig::default());
        let i = issue();

        c.record_outcome("42", false);
        assert_eq!(c.speculate_parallelism(&i, 2, 3), 3);

        // Cap holds no matter how many failures accumulate.
        for _ in 0..10 {
            c.record_outcome("42", false);
        }
        assert_eq!(c.speculate_parallelism(&i, 2, 3), 3);
    }

    #[test]
    fn failures_heat_sampling_up_to_max() {
        let c = Controller::new(ControlConfig::default());
        let i = issue();

        c.record_outcome("42", false);
        c.record_outcome("42", false);
        let s = c.sampling_for(&i);
        assert!((s.temperature - 0.4).abs() < 1e-9);

        for _ in 0..10 {
            c.record_outcome("42", false);
        }
        assert!((c.sampling_for(&i).temperature - 0.6).abs() < 1e-9);
    }

    #[test]
    fn escalation_is_monotone_in_failures() {
        let c = Controller::new(ControlConfig::default());
        let i = issue();
        let mut last_temp = 0.0;
        let mut last_par = 0;
        for _ in 0..8 {
            c.record_outcome("42", false);
            let temp = c.sampling_for(&i).temperature;
            let par = c.speculate_parallelism(&i, 1, 10);
            assert!(temp >= last_temp);
            assert!(par >= last_par);
            last_temp = temp;
            last_par = par;
        }
    }

    #[test]
    fn success_resets_the_streak() {
        let c = Controller::new(ControlConfig::default());
        let i = issue();
        c.record_outcome("42", false);
        c.record_outcome("42", false);
        c.record_outcome("42", true);

        assert_eq!(c.failure_streak("42"), 0);
        assert_eq!(c.speculate_parallelism(&i, 2, 3), 2);
        assert!((c.sampling_for(&i).temperature - 0.2).abs() < 1e-9);
    }

    #[test]
    fn disabled_controller_keeps_baseline() {
        let c = Controller::new(ControlConfig {
            enabled: false,
            ..ControlConfig::default()
        });
        let i = issue();
        c.record_outcome("42", false);
        c.record_outcome("42", false);
        assert_eq!(c.speculate_parallelism(&i, 2, 3), 2);
        assert!((c.sampling_for(&i).temperature - 0.2).abs() < 1e-9);
    }

    #[test]
    fn action_stays_in_band() {
        let config = ControlConfig::default();
        let c = Controller::new(config.clone());
        let i = issue();
        for _ in 0..10 {
            let a = c.action_for(&i);
            assert!(a >= config.action_low && a <= config.action_high);
            c.record_outcome("42", false);
        }
    }

    #[test]
    fn issues_are_tracked_independently() {
        let c = Controller::new(ControlConfig::default());
        c.record_outcome("42", false);
        assert_eq!(c.failure_streak("42"), 1);
        assert_eq!(c.failure_streak("43"), 0);
    }
}
