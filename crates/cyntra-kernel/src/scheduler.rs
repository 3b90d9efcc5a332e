// SPDX-License-Identifier: MIT OR Apache-2.0
//! Admission control: which issues run next, how wide, under which
//! budgets.
//!
//! `tick` is pure with respect to its inputs: it consults the config,
//! controller state, and planner, and returns intents. The runner owns
//! applying them (and the in-flight bookkeeping that feeds the next
//! tick).

use chrono::{DateTime, Utc};
use cyntra_adapters::DEFAULT_TOKEN_ESTIMATE;
use cyntra_config::{KernelConfig, PlannerMode, RoutingRule};
use cyntra_control::Controller;
use cyntra_core::{Issue, Manifest, Sampling, ToolchainRun, SCHEMA_VERSION};
use cyntra_planner::{OutcomeSummary, PlannedAction, PlannerClient};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// One speculate candidate (or the single candidate of a normal run).
#[derive(Debug, Clone)]
pub struct CandidateRun {
    /// Distinct tag for speculate candidates (`spec1`, `spec2`, ...).
    pub speculate_tag: Option<String>,
    /// Toolchain override from the matched routing rule, when any.
    pub toolchain: Option<String>,
    /// Sampling for this candidate.
    pub sampling: Sampling,
}

/// An admission intent for one issue.
#[derive(Debug, Clone)]
pub struct PlannedRun {
    /// The issue to run.
    pub issue: Issue,
    /// Whether this is a speculate group.
    pub speculate: bool,
    /// Candidates; length 1 unless speculating.
    pub candidates: Vec<CandidateRun>,
    /// Tokens reserved for the whole group.
    pub reserved_tokens: u64,
    /// Planner prediction, when one was made.
    pub planner_action: Option<PlannedAction>,
    /// Whether the prediction was enforced (vs logged).
    pub planner_enforced: bool,
}

/// Snapshot of the world a tick decides against.
#[derive(Debug, Clone)]
pub struct SchedulerInputs {
    /// Ready issues (blockers resolved), as read from the bead store.
    pub ready: Vec<Issue>,
    /// Currently in-flight workcells.
    pub in_flight: usize,
    /// Tokens currently reserved by in-flight runs.
    pub reserved_tokens: u64,
    /// The tick's notion of now.
    pub now: DateTime<Utc>,
}

/// The admission scheduler.
pub struct Scheduler {
    config: Arc<KernelConfig>,
    controller: Arc<Controller>,
    planner: Option<Box<dyn PlannerClient>>,
    history: Mutex<Vec<OutcomeSummary>>,
}

impl Scheduler {
    /// Create a scheduler. Pass `None` for the planner in `off` mode.
    #[must_use]
    pub fn new(
        config: Arc<KernelConfig>,
        controller: Arc<Controller>,
        planner: Option<Box<dyn PlannerClient>>,
    ) -> Self {
        Self {
            config,
            controller,
            planner,
            history: Mutex::new(Vec::new()),
        }
    }

    /// Record a finished attempt for planner history.
    pub fn push_history(&self, summary: OutcomeSummary) {
        let mut history = self.history.lock().expect("scheduler history poisoned");
        history.push(summary);
        // Only the recent tail matters for inference.
        let len = history.len();
        if len > 256 {
            history.drain(..len - 256);
        }
    }

    /// Decide what to admit now.
    ///
    /// Ranking: starving issues first, then declared risk (critical
    /// down to low), then FIFO by `ready_since`, with the issue id as
    /// the deterministic last resort. Admission respects both budgets;
    /// speculate groups that would blow the token budget are downgraded
    /// to lower parallelism, never below one.
    #[must_use]
    pub fn tick(&self, inputs: &SchedulerInputs) -> Vec<PlannedRun> {
        let mut slots = (self.config.max_concurrent_workcells as usize)
            .saturating_sub(inputs.in_flight);
        let mut tokens_left = self
            .config
            .max_concurrent_tokens
            .saturating_sub(inputs.reserved_tokens);

        if slots == 0 || tokens_left == 0 {
            return Vec::new();
        }

        let ranked = self.rank(&inputs.ready, inputs.now);
        let mut plan = Vec::new();

        for issue in ranked {
            if slots == 0 {
                break;
            }

            let per_run_tokens = issue.estimated_tokens(DEFAULT_TOKEN_ESTIMATE);
            if per_run_tokens > tokens_left {
                debug!(
                    target: "cyntra.scheduler",
                    issue_id = %issue.id,
                    needed = per_run_tokens,
                    available = tokens_left,
                    "token budget exhausted for issue; deferring"
                );
                continue;
            }

            let rule = self.matching_rule(&issue);
            let (planner_action, planner_enforced) = self.consult_planner(&issue);
            let speculate = self.should_speculate(&issue, rule);

            let mut parallelism = if speculate {
                self.target_parallelism(&issue, rule, planner_action.as_ref(), planner_enforced)
            } else {
                1
            };

            // Downgrade to what the budgets can actually hold.
            let token_fit =
                (tokens_left / per_run_tokens.max(1)).min(u64::from(u32::MAX)) as u32;
            parallelism = parallelism
                .min(slots as u32)
                .min(token_fit)
                .max(1);

            let reserved = per_run_tokens * u64::from(parallelism);
            slots -= parallelism as usize;
            tokens_left -= reserved;

            let candidates = self.candidates(&issue, rule, speculate, parallelism);
            plan.push(PlannedRun {
                speculate: speculate && parallelism > 1,
                issue,
                candidates,
                reserved_tokens: reserved,
                planner_action,
                planner_enforced,
            });
        }

        plan
    }

    /// Deterministic ranking of ready issues.
    fn rank(&self, ready: &[Issue], now: DateTime<Utc>) -> Vec<Issue> {
        let threshold =
            chrono::Duration::seconds((self.config.starvation_threshold_hours * 3600.0) as i64);

        let mut ranked: Vec<Issue> = ready.to_vec();
        ranked.sort_by(|a, b| {
            let a_since = a.ready_since.unwrap_or(now);
            let b_since = b.ready_since.unwrap_or(now);
            let a_starving = now - a_since > threshold;
            let b_starving = now - b_since > threshold;

            // Starving first, then highest risk, then oldest, then id.
            b_starving
                .cmp(&a_starving)
                .then_with(|| b.risk_level.cmp(&a.risk_level))
                .then_with(|| a_since.cmp(&b_since))
                .then_with(|| a.id.cmp(&b.id))
        });
        ranked
    }

    fn matching_rule(&self, issue: &Issue) -> Option<&RoutingRule> {
        self.config
            .routing
            .rules
            .iter()
            .find(|rule| rule.matches_issue(&issue.tags, issue.risk_level))
    }

    fn should_speculate(&self, issue: &Issue, rule: Option<&RoutingRule>) -> bool {
        if self.config.force_speculate {
            return true;
        }
        if !self.config.speculation.enabled {
            return false;
        }
        if rule.is_some_and(|r| r.speculate) {
            return true;
        }
        if self.config.speculation.auto_trigger_on_critical_path
            && self
                .config
                .speculation
                .auto_trigger_risk_levels
                .contains(&issue.risk_level)
        {
            return true;
        }
        // Repeated failures make the controller recommend racing.
        self.controller
            .speculate_parallelism(issue, 1, self.config.speculation.max_parallelism)
            > 1
    }

    fn target_parallelism(
        &self,
        issue: &Issue,
        rule: Option<&RoutingRule>,
        planner_action: Option<&PlannedAction>,
        planner_enforced: bool,
    ) -> u32 {
        let max = self.config.speculation.max_parallelism;

        if planner_enforced {
            if let Some(action) = planner_action {
                return action.max_candidates.clamp(1, max);
            }
        }
        if let Some(p) = rule.and_then(|r| r.parallelism) {
            return p.clamp(1, max);
        }
        self.controller
            .speculate_parallelism(issue, self.config.speculation.default_parallelism, max)
    }

    fn candidates(
        &self,
        issue: &Issue,
        rule: Option<&RoutingRule>,
        speculate: bool,
        parallelism: u32,
    ) -> Vec<CandidateRun> {
        let base = self.controller.sampling_for(issue);
        let step = self.config.control.temperature_step;
        let max_temp = self.config.control.temperature_max;
        let routed: Vec<String> = rule.map(|r| r.use_toolchains.clone()).unwrap_or_default();

        if !speculate || parallelism <= 1 {
            return vec![CandidateRun {
                speculate_tag: None,
                toolchain: routed.first().cloned(),
                sampling: base,
            }];
        }

        (0..parallelism)
            .map(|i| CandidateRun {
                speculate_tag: Some(format!("spec{}", i + 1)),
                // Cycle through routed toolchains so candidates diversify.
                toolchain: if routed.is_empty() {
                    None
                } else {
                    Some(routed[i as usize % routed.len()].clone())
                },
                sampling: Sampling {
                    temperature: (base.temperature + f64::from(i) * step).min(max_temp),
                    top_p: base.top_p,
                },
            })
            .collect()
    }

    /// Consult the planner per its mode. `log` records the prediction but
    /// keeps the baseline; `enforce` applies it when confident.
    fn consult_planner(&self, issue: &Issue) -> (Option<PlannedAction>, bool) {
        let Some(planner) = &self.planner else {
            return (None, false);
        };
        let mode = self.config.planner.mode;
        if mode == PlannerMode::Off {
            return (None, false);
        }

        let manifest = inference_manifest(issue);
        let history = self.history.lock().expect("scheduler history poisoned");
        match planner.predict(&manifest, &history) {
            Ok(action) => {
                let confident = action.confidence >= self.config.planner.confidence_threshold;
                let enforced = mode == PlannerMode::Enforce && confident;
                if !confident {
                    debug!(
                        target: "cyntra.scheduler",
                        issue_id = %issue.id,
                        confidence = action.confidence,
                        "planner prediction below threshold; baseline executes"
                    );
                }
                (Some(action), enforced)
            }
            Err(e) => {
                debug!(target: "cyntra.scheduler", issue_id = %issue.id, error = %e, "planner unavailable");
                (None, false)
            }
        }
    }
}

/// Thin manifest used only as planner inference input; no workcell
/// exists yet at scheduling time.
fn inference_manifest(issue: &Issue) -> Manifest {
    Manifest {
        schema_version: SCHEMA_VERSION.to_string(),
        workcell_id: String::new(),
        branch_name: String::new(),
        issue: issue.clone(),
        quality_gates: Vec::new(),
        toolchain_config: ToolchainRun::default(),
        planner: None,
        extra: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyntra_config::{ControlConfig, SpeculationConfig};
    use cyntra_core::RiskLevel;

    fn issue(id: &str, risk: RiskLevel, ready_for_hours: f64) -> Issue {
        let mut i = Issue::new(id, format!("issue {id}"));
        i.risk_level = risk;
        i.ready_since =
            Some(Utc::now() - chrono::Duration::seconds((ready_for_hours * 3600.0) as i64));
        i
    }

    fn scheduler(config: KernelConfig) -> Scheduler {
        let controller = Arc::new(Controller::new(config.control.clone()));
        Scheduler::new(Arc::new(config), controller, None)
    }

    fn inputs(ready: Vec<Issue>) -> SchedulerInputs {
        SchedulerInputs {
            ready,
            in_flight: 0,
            reserved_tokens: 0,
            now: Utc::now(),
        }
    }

    fn no_spec_config() -> KernelConfig {
        KernelConfig {
            speculation: SpeculationConfig {
                enabled: false,
                ..SpeculationConfig::default()
            },
            ..KernelConfig::default()
        }
    }

    #[test]
    fn empty_ready_set_plans_nothing() {
        let s = scheduler(KernelConfig::default());
        assert!(s.tick(&inputs(vec![])).is_empty());
    }

    #[test]
    fn workcell_budget_bounds_admissions() {
        // Scenario: 5 ready issues at 60k tokens, 2 workcell slots,
        // 200k token budget: exactly 2 admitted, bound by slots.
        let mut config = no_spec_config();
        config.max_concurrent_workcells = 2;
        config.max_concurrent_tokens = 200_000;
        let s = scheduler(config);

        let ready: Vec<Issue> = (1..=5)
            .map(|i| {
                let mut issue = issue(&i.to_string(), RiskLevel::Low, 0.0);
                issue.dk_estimated_tokens = Some(60_000);
                issue
            })
            .collect();

        let plan = s.tick(&inputs(ready));
        assert_eq!(plan.len(), 2);
        assert!(plan.iter().all(|p| p.reserved_tokens == 60_000));
    }

    #[test]
    fn token_budget_bounds_admissions() {
        let mut config = no_spec_config();
        config.max_concurrent_workcells = 10;
        config.max_concurrent_tokens = 100_000;
        let s = scheduler(config);

        let ready: Vec<Issue> = (1..=5)
            .map(|i| {
                let mut issue = issue(&i.to_string(), RiskLevel::Low, 0.0);
                issue.dk_estimated_tokens = Some(60_000);
                issue
            })
            .collect();

        // Only one 60k run fits into 100k.
        let plan = s.tick(&inputs(ready));
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn in_flight_reservations_count_against_budgets() {
        let mut config = no_spec_config();
        config.max_concurrent_workcells = 3;
        let s = scheduler(config);

        let mut i = inputs(vec![issue("1", RiskLevel::Low, 0.0)]);
        i.in_flight = 3;
        assert!(s.tick(&i).is_empty());

        let mut i = inputs(vec![issue("1", RiskLevel::Low, 0.0)]);
        i.reserved_tokens = 200_000;
        assert!(s.tick(&i).is_empty());
    }

    #[test]
    fn risk_ranks_above_fifo() {
        let s = scheduler(no_spec_config());
        let ready = vec![
            issue("old-low", RiskLevel::Low, 2.0),
            issue("new-critical", RiskLevel::Critical, 0.1),
        ];
        let plan = s.tick(&inputs(ready));
        assert_eq!(plan[0].issue.id, "new-critical");
    }

    #[test]
    fn starvation_beats_risk() {
        let mut config = no_spec_config();
        config.starvation_threshold_hours = 4.0;
        let s = scheduler(config);
        let ready = vec![
            issue("fresh-critical", RiskLevel::Critical, 0.1),
            issue("starving-low", RiskLevel::Low, 5.0),
        ];
        let plan = s.tick(&inputs(ready));
        assert_eq!(plan[0].issue.id, "starving-low");
    }

    #[test]
    fn ties_break_by_id() {
        let s = scheduler(no_spec_config());
        let now = Utc::now();
        let mut a = issue("b-issue", RiskLevel::Low, 1.0);
        let mut b = issue("a-issue", RiskLevel::Low, 1.0);
        let since = now - chrono::Duration::hours(1);
        a.ready_since = Some(since);
        b.ready_since = Some(since);

        let plan = s.tick(&SchedulerInputs {
            ready: vec![a, b],
            in_flight: 0,
            reserved_tokens: 0,
            now,
        });
        assert_eq!(plan[0].issue.id, "a-issue");
    }

    #[test]
    fn tick_is_deterministic() {
        let now = Utc::now();
        let mk = || {
            vec![
                issue("3", RiskLevel::Medium, 1.0),
                issue("1", RiskLevel::High, 0.5),
                issue("2", RiskLevel::Medium, 1.0),
            ]
        };
        let s = scheduler(no_spec_config());
        let plan_a: Vec<String> = s
            .tick(&SchedulerInputs {
                ready: mk(),
                in_flight: 0,
                reserved_tokens: 0,
                now,
            })
            .into_iter()
            .map(|p| p.issue.id)
            .collect();
        let plan_b: Vec<String> = s
            .tick(&SchedulerInputs {
                ready: mk(),
                in_flight: 0,
                reserved_tokens: 0,
                now,
            })
            .into_iter()
            .map(|p| p.issue.id)
            .collect();
        assert_eq!(plan_a, plan_b);
    }

    #[test]
    fn high_risk_auto_triggers_speculation() {
        let config = KernelConfig::default();
        let s = scheduler(config);
        let plan = s.tick(&inputs(vec![issue("99", RiskLevel::High, 0.0)]));

        assert_eq!(plan.len(), 1);
        assert!(plan[0].speculate);
        assert_eq!(plan[0].candidates.len(), 2);
        let tags: Vec<&str> = plan[0]
            .candidates
            .iter()
            .map(|c| c.speculate_tag.as_deref().unwrap())
            .collect();
        assert_eq!(tags, vec!["spec1", "spec2"]);
    }

    #[test]
    fn low_risk_does_not_speculate() {
        let s = scheduler(KernelConfig::default());
        let plan = s.tick(&inputs(vec![issue("1", RiskLevel::Low, 0.0)]));
        assert!(!plan[0].speculate);
        assert_eq!(plan[0].candidates.len(), 1);
        assert!(plan[0].candidates[0].speculate_tag.is_none());
    }

    #[test]
    fn force_speculate_overrides_everything() {
        let mut config = no_spec_config();
        config.force_speculate = true;
        let s = scheduler(config);
        let plan = s.tick(&inputs(vec![issue("1", RiskLevel::Low, 0.0)]));
        assert!(plan[0].speculate);
    }

    #[test]
    fn speculation_downgrades_under_token_pressure() {
        let mut config = KernelConfig::default();
        config.max_concurrent_workcells = 5;
        config.max_concurrent_tokens = 70_000;
        let s = scheduler(config);

        let mut i = issue("99", RiskLevel::High, 0.0);
        i.dk_estimated_tokens = Some(60_000);
        let plan = s.tick(&inputs(vec![i]));

        // Two candidates would need 120k; only one fits, never below one.
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].candidates.len(), 1);
        assert!(!plan[0].speculate);
    }

    #[test]
    fn speculate_candidates_get_distinct_sampling() {
        let mut config = KernelConfig::default();
        config.control = ControlConfig::default();
        let s = scheduler(config);
        let plan = s.tick(&inputs(vec![issue("99", RiskLevel::Critical, 0.0)]));

        let temps: Vec<f64> = plan[0]
            .candidates
            .iter()
            .map(|c| c.sampling.temperature)
            .collect();
        assert!(temps[0] < temps[1]);
    }

    #[test]
    fn routed_toolchains_cycle_across_candidates() {
        let mut config = KernelConfig::default();
        config.routing.rules.push(RoutingRule {
            matches: [("risk".to_string(), "high".to_string())].into(),
            use_toolchains: vec!["claude".into(), "codex".into()],
            speculate: true,
            parallelism: Some(2),
        });
        let s = scheduler(config);
        let plan = s.tick(&inputs(vec![issue("99", RiskLevel::High, 0.0)]));

        let toolchains: Vec<&str> = plan[0]
            .candidates
            .iter()
            .map(|c| c.toolchain.as_deref().unwrap())
            .collect();
        assert_eq!(toolchains, vec!["claude", "codex"]);
    }

    #[test]
    fn oversized_issue_defers_but_does_not_block_smaller() {
        let mut config = no_spec_config();
        config.max_concurrent_tokens = 100_000;
        let s = scheduler(config);

        let mut big = issue("big", RiskLevel::Critical, 0.0);
        big.dk_estimated_tokens = Some(500_000);
        let mut small = issue("small", RiskLevel::Low, 0.0);
        small.dk_estimated_tokens = Some(10_000);

        let plan = s.tick(&inputs(vec![big, small]));
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].issue.id, "small");
    }
}
