// SPDX-License-Identifier: MIT OR Apache-2.0
//! Kernel configuration: the [`KernelConfig`] record, a layered YAML
//! loader with `include:` composition and cycle detection, `CYNTRA_*`
//! environment overrides, and advisory [`ConfigWarning`]s.
//!
//! Unknown keys are errors everywhere except `toolchains.<name>.config`,
//! which passes through to the adapter untouched.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use cyntra_core::merge::deep_merge;
use cyntra_core::{GateCommand, RiskLevel};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Environment variable prefix for config overrides.
pub const ENV_PREFIX: &str = "CYNTRA_";

/// Environment variable naming the repository root.
pub const ENV_REPO_ROOT: &str = "CYNTRA_REPO_ROOT";

/// Environment variable naming the config file.
pub const ENV_CONFIG: &str = "CYNTRA_CONFIG";

// ---------------------------------------------------------------------------
// Errors and warnings
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file could not be read.
    #[error("config file not readable: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as YAML mapping to the config schema.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// An `include:` chain revisited a file.
    #[error("config include cycle detected at {path}")]
    IncludeCycle {
        /// Path where the cycle closed.
        path: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

/// Advisory-level issues that do not prevent operation but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A toolchain timeout is unusually large.
    LargeTimeout {
        /// Toolchain name.
        toolchain: String,
        /// Timeout value in seconds.
        secs: u64,
    },
    /// `toolchain_priority` names a toolchain with no configuration entry.
    UnknownPriorityEntry {
        /// The unmatched name.
        name: String,
    },
    /// A routing rule routes to a toolchain with no configuration entry.
    UnknownRoutedToolchain {
        /// The unmatched name.
        name: String,
    },
    /// An environment override did not match any config key.
    UnmatchedEnvOverride {
        /// The full variable name.
        variable: String,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::LargeTimeout { toolchain, secs } => {
                write!(f, "toolchain '{toolchain}' has a large timeout ({secs}s)")
            }
            ConfigWarning::UnknownPriorityEntry { name } => {
                write!(f, "toolchain_priority entry '{name}' has no toolchain config")
            }
            ConfigWarning::UnknownRoutedToolchain { name } => {
                write!(f, "routing rule uses '{name}' which has no toolchain config")
            }
            ConfigWarning::UnmatchedEnvOverride { variable } => {
                write!(f, "environment override '{variable}' matched no config key")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

/// Configuration for a single toolchain adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ToolchainConfig {
    /// Whether this toolchain participates in routing.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Executable path; empty means "use the toolchain name".
    #[serde(default)]
    pub path: String,

    /// Default model for this toolchain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Per-run wall-clock timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    /// Alternative spelling accepted for compatibility.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_minutes: Option<u64>,

    /// Token cap used for budget reservations.
    #[serde(default = "ToolchainConfig::default_max_tokens")]
    pub max_tokens: u64,

    /// Environment overlay applied to the subprocess.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Adapter-specific passthrough; the only place unknown keys are legal.
    #[serde(default)]
    pub config: BTreeMap<String, serde_json::Value>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: String::new(),
            model: None,
            timeout_seconds: None,
            timeout_minutes: None,
            max_tokens: Self::default_max_tokens(),
            env: BTreeMap::new(),
            config: BTreeMap::new(),
        }
    }
}

impl ToolchainConfig {
    fn default_max_tokens() -> u64 {
        100_000
    }

    /// Effective timeout: `timeout_seconds` wins, then `timeout_minutes`,
    /// then 30 minutes.
    #[must_use]
    pub fn effective_timeout_seconds(&self) -> u64 {
        self.timeout_seconds
            .or(self.timeout_minutes.map(|m| m * 60))
            .unwrap_or(1800)
    }

    /// Executable to invoke, defaulting to the toolchain name.
    #[must_use]
    pub fn executable<'a>(&'a self, name: &'a str) -> &'a str {
        if self.path.is_empty() { name } else { &self.path }
    }
}

/// Quality gate commands run by the verifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GatesConfig {
    /// Test suite command.
    #[serde(default = "GatesConfig::default_test")]
    pub test_command: String,
    /// Typecheck command.
    #[serde(default = "GatesConfig::default_typecheck")]
    pub typecheck_command: String,
    /// Lint command.
    #[serde(default = "GatesConfig::default_lint")]
    pub lint_command: String,
    /// Optional build command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_command: Option<String>,
    /// Per-gate timeout in seconds.
    #[serde(default = "GatesConfig::default_timeout")]
    pub timeout_seconds: u64,
    /// How many times the test gate is re-run before a failure sticks.
    #[serde(default = "GatesConfig::default_retry_flaky")]
    pub retry_flaky: u32,
}

impl Default for GatesConfig {
    fn default() -> Self {
        Self {
            test_command: Self::default_test(),
            typecheck_command: Self::default_typecheck(),
            lint_command: Self::default_lint(),
            build_command: None,
            timeout_seconds: Self::default_timeout(),
            retry_flaky: Self::default_retry_flaky(),
        }
    }
}

impl GatesConfig {
    fn default_test() -> String {
        "pytest".into()
    }
    fn default_typecheck() -> String {
        "mypy .".into()
    }
    fn default_lint() -> String {
        "ruff check .".into()
    }
    fn default_timeout() -> u64 {
        300
    }
    fn default_retry_flaky() -> u32 {
        2
    }

    /// The ordered gate list for a manifest: test, typecheck, lint, and
    /// build when configured. Empty commands are skipped.
    #[must_use]
    pub fn gate_commands(&self) -> Vec<GateCommand> {
        let mut gates = Vec::new();
        let mut push = |name: &str, command: &str| {
            if !command.trim().is_empty() {
                gates.push(GateCommand {
                    name: name.to_string(),
                    command: command.to_string(),
                    timeout_seconds: self.timeout_seconds,
                });
            }
        };
        push("test", &self.test_command);
        push("typecheck", &self.typecheck_command);
        push("lint", &self.lint_command);
        if let Some(build) = &self.build_command {
            push("build", build);
        }
        gates
    }
}

/// Path filter for staged (copy-based) workcells.
///
/// Worktree-backed workcells share the repository's object store and are
/// unaffected; the filter applies when the sandbox has to be a copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct StagingConfig {
    /// Copy only paths matching these globs (empty = everything).
    #[serde(default)]
    pub include: Vec<String>,
    /// Never copy paths matching these globs.
    #[serde(default = "StagingConfig::default_exclude")]
    pub exclude: Vec<String>,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Self::default_exclude(),
        }
    }
}

impl StagingConfig {
    fn default_exclude() -> Vec<String> {
        vec![
            "target/**".into(),
            "node_modules/**".into(),
            "__pycache__/**".into(),
        ]
    }
}

/// Nested `auto_trigger:` spelling accepted for compatibility.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AutoTriggerCompat {
    /// Maps to `auto_trigger_on_critical_path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_critical_path: Option<bool>,
    /// Maps to `auto_trigger_risk_levels`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_levels: Option<Vec<RiskLevel>>,
}

/// Configuration for speculate+vote mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SpeculationConfig {
    /// Master switch for speculation.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Parallelism used when speculation triggers without a rule override.
    #[serde(default = "SpeculationConfig::default_parallelism_value")]
    pub default_parallelism: u32,
    /// Hard cap on candidates per issue.
    #[serde(default = "SpeculationConfig::default_max_parallelism")]
    pub max_parallelism: u32,
    /// Minimum confidence a winning proof should carry.
    #[serde(default = "SpeculationConfig::default_vote_threshold")]
    pub vote_threshold: f64,
    /// Speculate automatically on risky issues.
    #[serde(default = "default_true")]
    pub auto_trigger_on_critical_path: bool,
    /// Risk levels that auto-trigger speculation.
    #[serde(default = "SpeculationConfig::default_risk_levels")]
    pub auto_trigger_risk_levels: Vec<RiskLevel>,
    /// Nested compatibility spelling, folded in during normalization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_trigger: Option<AutoTriggerCompat>,
}

impl Default for SpeculationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_parallelism: Self::default_parallelism_value(),
            max_parallelism: Self::default_max_parallelism(),
            vote_threshold: Self::default_vote_threshold(),
            auto_trigger_on_critical_path: true,
            auto_trigger_risk_levels: Self::default_risk_levels(),
            auto_trigger: None,
        }
    }
}

impl SpeculationConfig {
    fn default_parallelism_value() -> u32 {
        2
    }
    fn default_max_parallelism() -> u32 {
        3
    }
    fn default_vote_threshold() -> f64 {
        0.7
    }
    fn default_risk_levels() -> Vec<RiskLevel> {
        vec![RiskLevel::High, RiskLevel::Critical]
    }

    fn normalize(&mut self) {
        if let Some(compat) = self.auto_trigger.take() {
            if let Some(v) = compat.on_critical_path {
                self.auto_trigger_on_critical_path = v;
            }
            if let Some(v) = compat.risk_levels {
                self.auto_trigger_risk_levels = v;
            }
        }
    }
}

/// Closed-loop exploration control bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ControlConfig {
    /// Master switch for the controller.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Lower bound of the planner action range.
    #[serde(default = "ControlConfig::d_action_low")]
    pub action_low: f64,
    /// Upper bound of the planner action range.
    #[serde(default = "ControlConfig::d_action_high")]
    pub action_high: f64,
    /// Temperature for a fresh issue.
    #[serde(default = "ControlConfig::d_temperature_base")]
    pub temperature_base: f64,
    /// Temperature floor.
    #[serde(default = "ControlConfig::d_temperature_min")]
    pub temperature_min: f64,
    /// Temperature ceiling.
    #[serde(default = "ControlConfig::d_temperature_max")]
    pub temperature_max: f64,
    /// Temperature increment per recorded failure.
    #[serde(default = "ControlConfig::d_temperature_step")]
    pub temperature_step: f64,
    /// Parallelism increment per recorded failure.
    #[serde(default = "ControlConfig::d_parallelism_step")]
    pub parallelism_step: u32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            action_low: Self::d_action_low(),
            action_high: Self::d_action_high(),
            temperature_base: Self::d_temperature_base(),
            temperature_min: Self::d_temperature_min(),
            temperature_max: Self::d_temperature_max(),
            temperature_step: Self::d_temperature_step(),
            parallelism_step: Self::d_parallelism_step(),
        }
    }
}

impl ControlConfig {
    fn d_action_low() -> f64 {
        0.1
    }
    fn d_action_high() -> f64 {
        0.5
    }
    fn d_temperature_base() -> f64 {
        0.2
    }
    fn d_temperature_min() -> f64 {
        0.1
    }
    fn d_temperature_max() -> f64 {
        0.6
    }
    fn d_temperature_step() -> f64 {
        0.1
    }
    fn d_parallelism_step() -> u32 {
        1
    }
}

/// Planner integration mode.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum PlannerMode {
    /// Skip inference entirely.
    #[default]
    Off,
    /// Run inference, record the prediction, execute the baseline.
    Log,
    /// Run inference and execute confident predictions.
    Enforce,
}

/// Swarm planner integration configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PlannerConfig {
    /// Integration mode.
    #[serde(default)]
    pub mode: PlannerMode,
    /// Directory containing the compiled planner bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_dir: Option<PathBuf>,
    /// Predictions below this confidence fall back to the baseline.
    #[serde(default = "PlannerConfig::default_confidence_threshold")]
    pub confidence_threshold: f64,
}

impl PlannerConfig {
    fn default_confidence_threshold() -> f64 {
        0.2
    }
}

/// A single routing rule, evaluated in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RoutingRule {
    /// Match conditions; all keys must hold. Recognised keys: `tag`, `risk`.
    #[serde(default, rename = "match")]
    pub matches: BTreeMap<String, String>,
    /// Toolchains to use when the rule matches, in preference order.
    #[serde(default, rename = "use")]
    pub use_toolchains: Vec<String>,
    /// Whether a matching issue runs in speculate mode.
    #[serde(default)]
    pub speculate: bool,
    /// Parallelism override for speculate mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<u32>,
}

impl RoutingRule {
    /// Whether this rule matches the given issue attributes.
    ///
    /// Unrecognised match keys never match, so a rule written for a newer
    /// kernel fails closed.
    #[must_use]
    pub fn matches_issue(&self, tags: &BTreeSet<String>, risk: RiskLevel) -> bool {
        self.matches.iter().all(|(key, value)| match key.as_str() {
            "tag" => tags.contains(value),
            "risk" => RiskLevel::parse(value) == Some(risk),
            _ => false,
        })
    }
}

/// Toolchain routing configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RoutingConfig {
    /// Ordered rules; first match wins.
    #[serde(default)]
    pub rules: Vec<RoutingRule>,
    /// Fallback chains consulted when a toolchain is unavailable.
    #[serde(default)]
    pub fallbacks: BTreeMap<String, Vec<String>>,
}

/// Configuration for the code-reviewer post-execution hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CodeReviewerHookConfig {
    /// Whether the hook is installed.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Model used for reviews (fast/cheap by default).
    #[serde(default = "CodeReviewerHookConfig::default_model")]
    pub model: String,
    /// Proof statuses that trigger a review.
    #[serde(default = "CodeReviewerHookConfig::default_trigger_on")]
    pub trigger_on: Vec<String>,
    /// Review depth: `quick`, `standard`, or `deep`.
    #[serde(default = "CodeReviewerHookConfig::default_depth")]
    pub review_depth: String,
    /// Diffs larger than this are reviewed in summary form.
    #[serde(default = "CodeReviewerHookConfig::default_max_diff_lines")]
    pub max_diff_lines: u64,
}

impl Default for CodeReviewerHookConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: Self::default_model(),
            trigger_on: Self::default_trigger_on(),
            review_depth: Self::default_depth(),
            max_diff_lines: Self::default_max_diff_lines(),
        }
    }
}

impl CodeReviewerHookConfig {
    fn default_model() -> String {
        "haiku".into()
    }
    fn default_trigger_on() -> Vec<String> {
        vec!["success".into(), "partial".into()]
    }
    fn default_depth() -> String {
        "standard".into()
    }
    fn default_max_diff_lines() -> u64 {
        500
    }
}

/// Configuration for the debug-specialist hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DebugSpecialistHookConfig {
    /// Whether the hook is installed.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Run on gate failures.
    #[serde(default = "default_true")]
    pub trigger_on_gate_failure: bool,
    /// Run when the proof status is `failed`.
    #[serde(default = "default_true")]
    pub trigger_on_status_failed: bool,
    /// Error context captured per failing gate.
    #[serde(default = "DebugSpecialistHookConfig::default_context_lines")]
    pub max_error_context_lines: u64,
    /// Whether the hook may attempt an automatic fix (off by default).
    #[serde(default)]
    pub auto_fix_attempt: bool,
}

impl Default for DebugSpecialistHookConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trigger_on_gate_failure: true,
            trigger_on_status_failed: true,
            max_error_context_lines: Self::default_context_lines(),
            auto_fix_attempt: false,
        }
    }
}

impl DebugSpecialistHookConfig {
    fn default_context_lines() -> u64 {
        100
    }
}

/// Configuration for post-execution hooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PostExecutionHooksConfig {
    /// Global switch: disables every registered hook when false.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Per-hook timeout in seconds.
    #[serde(default = "PostExecutionHooksConfig::default_timeout")]
    pub timeout_seconds: u64,
    /// Code-reviewer hook settings.
    #[serde(default)]
    pub code_reviewer: CodeReviewerHookConfig,
    /// Debug-specialist hook settings.
    #[serde(default)]
    pub debug_specialist: DebugSpecialistHookConfig,
}

impl Default for PostExecutionHooksConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_seconds: Self::default_timeout(),
            code_reviewer: CodeReviewerHookConfig::default(),
            debug_specialist: DebugSpecialistHookConfig::default(),
        }
    }
}

impl PostExecutionHooksConfig {
    fn default_timeout() -> u64 {
        120
    }
}

/// Nested `scheduling:` spelling accepted for compatibility with older
/// config files; folded into the flat keys during normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SchedulingCompat {
    /// Maps to the flat `max_concurrent_workcells`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_workcells: Option<u32>,
    /// Maps to the flat `max_concurrent_tokens`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_tokens: Option<u64>,
    /// Maps to the flat `starvation_threshold_hours`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starvation_threshold_hours: Option<f64>,
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// Filesystem layout derived from the repository root and config location.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KernelPaths {
    /// Repository root the kernel operates on.
    pub repo_root: PathBuf,
    /// `.cyntra/` directory.
    pub kernel_dir: PathBuf,
    /// Process-wide logs.
    pub logs_dir: PathBuf,
    /// Preserved logs from cleaned-up workcells.
    pub archives_dir: PathBuf,
    /// Scheduler persistence.
    pub state_dir: PathBuf,
    /// Per-run artifacts.
    pub runs_dir: PathBuf,
    /// Active sandboxes.
    pub workcells_dir: PathBuf,
    /// Bead-store data.
    pub beads_dir: PathBuf,
    /// The config file this layout was derived from.
    pub config_path: PathBuf,
}

impl KernelPaths {
    /// Standard layout for a repository root.
    #[must_use]
    pub fn for_repo(repo_root: &Path) -> Self {
        let kernel_dir = repo_root.join(".cyntra");
        Self {
            repo_root: repo_root.to_path_buf(),
            logs_dir: kernel_dir.join("logs"),
            archives_dir: kernel_dir.join("archives"),
            state_dir: kernel_dir.join("state"),
            runs_dir: kernel_dir.join("runs"),
            workcells_dir: repo_root.join(".workcells"),
            beads_dir: repo_root.join(".beads"),
            config_path: kernel_dir.join("config.yaml"),
            kernel_dir,
        }
    }

    /// Layout derived from an explicit config file location: the config's
    /// parent is the kernel dir and its grandparent the repo root.
    #[must_use]
    pub fn for_config(config_path: &Path) -> Self {
        let kernel_dir = config_path
            .parent()
            .map_or_else(|| PathBuf::from(".cyntra"), Path::to_path_buf);
        let repo_root = kernel_dir
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let mut paths = Self::for_repo(&repo_root);
        paths.kernel_dir = kernel_dir.clone();
        paths.logs_dir = kernel_dir.join("logs");
        paths.archives_dir = kernel_dir.join("archives");
        paths.state_dir = kernel_dir.join("state");
        paths.runs_dir = kernel_dir.join("runs");
        paths.config_path = config_path.to_path_buf();
        paths
    }
}

// ---------------------------------------------------------------------------
// KernelConfig
// ---------------------------------------------------------------------------

/// Main kernel configuration.
///
/// Every key is optional in the file; defaults match the documented
/// `config.yaml` surface. Unknown keys are errors except inside
/// `toolchains.<name>.config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct KernelConfig {
    /// Maximum concurrently active workcells.
    #[serde(default = "KernelConfig::d_max_workcells")]
    pub max_concurrent_workcells: u32,

    /// Maximum reserved tokens across in-flight runs.
    #[serde(default = "KernelConfig::d_max_tokens")]
    pub max_concurrent_tokens: u64,

    /// Issues ready longer than this jump the queue.
    #[serde(default = "KernelConfig::d_starvation_hours")]
    pub starvation_threshold_hours: f64,

    /// Branch used as merge-base and worktree base.
    #[serde(default = "KernelConfig::d_default_branch")]
    pub default_branch: String,

    /// Routing order when no rule matches.
    #[serde(default = "KernelConfig::d_priority")]
    pub toolchain_priority: Vec<String>,

    /// Named toolchain definitions.
    #[serde(default)]
    pub toolchains: BTreeMap<String, ToolchainConfig>,

    /// Quality gate commands.
    #[serde(default)]
    pub gates: GatesConfig,

    /// Staged-copy path filter.
    #[serde(default)]
    pub staging: StagingConfig,

    /// Speculate+vote settings.
    #[serde(default)]
    pub speculation: SpeculationConfig,

    /// Toolchain routing rules and fallbacks.
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Exploration control bounds.
    #[serde(default)]
    pub control: ControlConfig,

    /// Planner integration.
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Post-execution hook settings.
    #[serde(default)]
    pub post_execution_hooks: PostExecutionHooksConfig,

    /// Nested scheduling spelling, folded in during normalization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduling: Option<SchedulingCompat>,

    /// Force speculate mode for every issue (CLI override).
    #[serde(skip)]
    pub force_speculate: bool,

    /// Plan and log without dispatching (CLI override).
    #[serde(skip)]
    pub dry_run: bool,

    /// Keep polling the bead store instead of a single pass (CLI override).
    #[serde(skip)]
    pub watch_mode: bool,

    /// Derived filesystem layout; not part of the serialized config.
    #[serde(skip)]
    pub paths: KernelPaths,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_concurrent_workcells: Self::d_max_workcells(),
            max_concurrent_tokens: Self::d_max_tokens(),
            starvation_threshold_hours: Self::d_starvation_hours(),
            default_branch: Self::d_default_branch(),
            toolchain_priority: Self::d_priority(),
            toolchains: BTreeMap::new(),
            gates: GatesConfig::default(),
            staging: StagingConfig::default(),
            speculation: SpeculationConfig::default(),
            routing: RoutingConfig::default(),
            control: ControlConfig::default(),
            planner: PlannerConfig::default(),
            post_execution_hooks: PostExecutionHooksConfig::default(),
            scheduling: None,
            force_speculate: false,
            dry_run: false,
            watch_mode: false,
            paths: KernelPaths::default(),
        }
    }
}

impl KernelConfig {
    fn d_max_workcells() -> u32 {
        3
    }
    fn d_max_tokens() -> u64 {
        200_000
    }
    fn d_starvation_hours() -> f64 {
        4.0
    }
    fn d_default_branch() -> String {
        "main".into()
    }
    fn d_priority() -> Vec<String> {
        vec!["codex".into(), "claude".into(), "crush".into()]
    }

    /// Load configuration from a YAML file, following `include:` chains,
    /// applying `CYNTRA_*` environment overrides, and validating.
    ///
    /// A missing file yields the defaults (with env overrides applied).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on unreadable includes, malformed YAML,
    /// include cycles, unknown keys, or failed validation.
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        let env: Vec<(String, String)> = std::env::vars()
            .filter(|(k, _)| k.starts_with(ENV_PREFIX))
            .collect();
        Self::load_with_env(config_path, &env)
    }

    /// [`load`](Self::load) with an explicit environment, for tests.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub fn load_with_env(
        config_path: &Path,
        env: &[(String, String)],
    ) -> Result<Self, ConfigError> {
        let file_value = if config_path.exists() {
            let mut seen = BTreeSet::new();
            load_with_includes(config_path, &mut seen)?
        } else {
            serde_json::json!({})
        };

        let defaults = serde_json::to_value(Self::default()).map_err(|e| {
            ConfigError::ParseError {
                reason: e.to_string(),
            }
        })?;
        let mut merged = deep_merge(defaults, file_value);

        for (key, value) in env {
            if key == ENV_REPO_ROOT || key == ENV_CONFIG {
                continue;
            }
            if let Some(path) = key.strip_prefix(ENV_PREFIX) {
                // Unmatched overrides surface later through validate().
                let _ = apply_env_override(&mut merged, path, value);
            }
        }

        let mut config: Self =
            serde_json::from_value(merged).map_err(|e| ConfigError::ParseError {
                reason: e.to_string(),
            })?;
        config.normalize();
        config.paths = KernelPaths::for_config(config_path);
        config.validate()?;
        Ok(config)
    }

    /// Fold compatibility spellings into their canonical keys.
    pub fn normalize(&mut self) {
        self.speculation.normalize();
        if let Some(compat) = self.scheduling.take() {
            if let Some(v) = compat.max_concurrent_workcells {
                self.max_concurrent_workcells = v;
            }
            if let Some(v) = compat.max_concurrent_tokens {
                self.max_concurrent_tokens = v;
            }
            if let Some(v) = compat.starvation_threshold_hours {
                self.starvation_threshold_hours = v;
            }
        }
    }

    /// Serialize to a JSON value (the `to_dict` direction of the
    /// round-trip law).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ParseError`] if serialization fails.
    pub fn to_value(&self) -> Result<serde_json::Value, ConfigError> {
        serde_json::to_value(self).map_err(|e| ConfigError::ParseError {
            reason: e.to_string(),
        })
    }

    /// Deserialize from a JSON value and normalize.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ParseError`] on schema mismatch.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let mut config: Self =
            serde_json::from_value(value).map_err(|e| ConfigError::ParseError {
                reason: e.to_string(),
            })?;
        config.normalize();
        Ok(config)
    }

    /// Validate the configuration, returning advisory warnings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] listing every hard problem.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        let mut errors: Vec<String> = Vec::new();
        let mut warnings: Vec<ConfigWarning> = Vec::new();

        if self.max_concurrent_workcells == 0 {
            errors.push("max_concurrent_workcells must be at least 1".into());
        }
        if self.max_concurrent_tokens == 0 {
            errors.push("max_concurrent_tokens must be at least 1".into());
        }
        if self.starvation_threshold_hours < 0.0 {
            errors.push("starvation_threshold_hours must not be negative".into());
        }

        if self.speculation.default_parallelism == 0 {
            errors.push("speculation.default_parallelism must be at least 1".into());
        }
        if self.speculation.default_parallelism > self.speculation.max_parallelism {
            errors.push(format!(
                "speculation.default_parallelism ({}) exceeds max_parallelism ({})",
                self.speculation.default_parallelism, self.speculation.max_parallelism
            ));
        }
        if !(0.0..=1.0).contains(&self.speculation.vote_threshold) {
            errors.push("speculation.vote_threshold must be within [0, 1]".into());
        }

        if self.control.temperature_min > self.control.temperature_max {
            errors.push("control.temperature_min exceeds temperature_max".into());
        }
        if !(self.control.temperature_min..=self.control.temperature_max)
            .contains(&self.control.temperature_base)
        {
            errors.push("control.temperature_base outside [temperature_min, temperature_max]".into());
        }
        if self.control.action_low > self.control.action_high {
            errors.push("control.action_low exceeds action_high".into());
        }

        if !(0.0..=1.0).contains(&self.planner.confidence_threshold) {
            errors.push("planner.confidence_threshold must be within [0, 1]".into());
        }
        if self.planner.mode != PlannerMode::Off && self.planner.bundle_dir.is_none() {
            errors.push("planner.bundle_dir is required when planner.mode is not 'off'".into());
        }

        if self.gates.timeout_seconds == 0 {
            errors.push("gates.timeout_seconds must be at least 1".into());
        }

        for (name, tc) in &self.toolchains {
            let timeout = tc.effective_timeout_seconds();
            if timeout == 0 {
                errors.push(format!("toolchains.{name}: timeout must be at least 1 second"));
            } else if timeout > 86_400 {
                errors.push(format!(
                    "toolchains.{name}: timeout {timeout}s exceeds 24 hours"
                ));
            } else if timeout > 3_600 {
                warnings.push(ConfigWarning::LargeTimeout {
                    toolchain: name.clone(),
                    secs: timeout,
                });
            }
            if tc.max_tokens == 0 {
                errors.push(format!("toolchains.{name}: max_tokens must be at least 1"));
            }
        }

        for name in &self.toolchain_priority {
            if !self.toolchains.is_empty() && !self.toolchains.contains_key(name) {
                warnings.push(ConfigWarning::UnknownPriorityEntry { name: name.clone() });
            }
        }

        for rule in &self.routing.rules {
            if rule.use_toolchains.is_empty() {
                errors.push("routing rule with empty 'use' list".into());
            }
            for name in &rule.use_toolchains {
                if !self.toolchains.is_empty() && !self.toolchains.contains_key(name) {
                    warnings.push(ConfigWarning::UnknownRoutedToolchain { name: name.clone() });
                }
            }
        }

        if errors.is_empty() {
            Ok(warnings)
        } else {
            Err(ConfigError::ValidationError { reasons: errors })
        }
    }
}

// ---------------------------------------------------------------------------
// Include composition
// ---------------------------------------------------------------------------

fn load_yaml_value(path: &Path) -> Result<serde_json::Value, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.display().to_string(),
    })?;
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            reason: format!("{}: {e}", path.display()),
        })?;
    if yaml.is_null() {
        return Ok(serde_json::json!({}));
    }
    serde_json::to_value(&yaml).map_err(|e| ConfigError::ParseError {
        reason: format!("{}: {e}", path.display()),
    })
}

/// Load a config file that may `include:` one or more base files.
///
/// Later files deep-merge over earlier ones; the child merges over all of
/// its includes. Cycles are an error.
fn load_with_includes(
    path: &Path,
    seen: &mut BTreeSet<PathBuf>,
) -> Result<serde_json::Value, ConfigError> {
    let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !seen.insert(resolved.clone()) {
        return Err(ConfigError::IncludeCycle {
            path: resolved.display().to_string(),
        });
    }

    let mut data = load_yaml_value(path)?;

    let includes: Vec<String> = match data.get("include") {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };
    if let Some(obj) = data.as_object_mut() {
        obj.remove("include");
    }

    let mut base = serde_json::json!({});
    for include in includes {
        let include_path = PathBuf::from(&include);
        let include_path = if include_path.is_absolute() {
            include_path
        } else {
            path.parent()
                .map_or_else(|| include_path.clone(), |p| p.join(&include_path))
        };
        let include_value = load_with_includes(&include_path, seen)?;
        base = deep_merge(base, include_value);
    }

    Ok(deep_merge(base, data))
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

/// Apply one `CYNTRA_*` override (prefix already stripped) to a config
/// value tree. Returns `true` when a key was matched and set.
///
/// Path segments are matched case-insensitively against existing keys at
/// each nesting level, preferring the longest key match, so
/// `GATES_TEST_COMMAND` resolves to `gates.test_command` rather than a
/// hypothetical `gates.test.command`.
pub fn apply_env_override(value: &mut serde_json::Value, path: &str, raw: &str) -> bool {
    let Some(map) = value.as_object_mut() else {
        return false;
    };

    // Longest keys first so multi-underscore keys win over nested prefixes.
    let mut keys: Vec<String> = map.keys().cloned().collect();
    keys.sort_by_key(|k| std::cmp::Reverse(k.len()));

    for key in keys {
        let norm = key.to_uppercase().replace(['.', '-'], "_");
        if path == norm {
            map.insert(key, parse_env_scalar(raw));
            return true;
        }
        if let Some(rest) = path.strip_prefix(&format!("{norm}_")) {
            if let Some(child) = map.get_mut(&key) {
                if apply_env_override(child, rest, raw) {
                    return true;
                }
            }
        }
    }
    false
}

fn parse_env_scalar(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn defaults_match_documented_surface() {
        let config = KernelConfig::default();
        assert_eq!(config.max_concurrent_workcells, 3);
        assert_eq!(config.max_concurrent_tokens, 200_000);
        assert_eq!(config.starvation_threshold_hours, 4.0);
        assert_eq!(config.default_branch, "main");
        assert_eq!(config.toolchain_priority, vec!["codex", "claude", "crush"]);
        assert_eq!(config.gates.test_command, "pytest");
        assert_eq!(config.gates.retry_flaky, 2);
        assert_eq!(config.speculation.default_parallelism, 2);
        assert_eq!(config.planner.mode, PlannerMode::Off);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            KernelConfig::load_with_env(&dir.path().join("nope/config.yaml"), &[]).unwrap();
        assert_eq!(config.max_concurrent_workcells, 3);
    }

    #[test]
    fn value_roundtrip_is_identity() {
        let mut config = KernelConfig::default();
        config.toolchains.insert(
            "claude".into(),
            ToolchainConfig {
                model: Some("opus".into()),
                timeout_seconds: Some(900),
                ..ToolchainConfig::default()
            },
        );
        config.routing.rules.push(RoutingRule {
            matches: [("tag".to_string(), "fab".to_string())].into(),
            use_toolchains: vec!["workflow".into()],
            speculate: true,
            parallelism: Some(2),
        });

        let value = config.to_value().unwrap();
        let back = KernelConfig::from_value(value).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn parse_basic_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "config.yaml",
            r"
max_concurrent_workcells: 5
toolchains:
  claude:
    model: opus
    timeout_minutes: 30
    config:
      ultrathink: false
gates:
  test_command: cargo test
",
        );
        let config = KernelConfig::load_with_env(&path, &[]).unwrap();
        assert_eq!(config.max_concurrent_workcells, 5);
        let claude = &config.toolchains["claude"];
        assert_eq!(claude.model.as_deref(), Some("opus"));
        assert_eq!(claude.effective_timeout_seconds(), 1800);
        assert_eq!(claude.config["ultrathink"], serde_json::json!(false));
        assert_eq!(config.gates.test_command, "cargo test");
    }

    #[test]
    fn unknown_top_level_key_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "config.yaml", "max_workcells: 5\n");
        let err = KernelConfig::load_with_env(&path, &[]).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }), "{err:?}");
    }

    #[test]
    fn unknown_adapter_config_keys_are_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "config.yaml",
            "toolchains:\n  codex:\n    config:\n      anything_goes: [1, 2]\n",
        );
        let config = KernelConfig::load_with_env(&path, &[]).unwrap();
        assert!(config.toolchains["codex"].config.contains_key("anything_goes"));
    }

    #[test]
    fn includes_merge_with_child_priority() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "base.yaml",
            "max_concurrent_workcells: 9\ngates:\n  test_command: pytest -x\n  retry_flaky: 5\n",
        );
        let path = write(
            dir.path(),
            "config.yaml",
            "include: base.yaml\ngates:\n  test_command: cargo test\n",
        );
        let config = KernelConfig::load_with_env(&path, &[]).unwrap();
        assert_eq!(config.max_concurrent_workcells, 9);
        assert_eq!(config.gates.test_command, "cargo test");
        assert_eq!(config.gates.retry_flaky, 5);
    }

    #[test]
    fn include_list_merges_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.yaml", "max_concurrent_workcells: 1\nmax_concurrent_tokens: 111\n");
        write(dir.path(), "b.yaml", "max_concurrent_workcells: 2\n");
        let path = write(dir.path(), "config.yaml", "include: [a.yaml, b.yaml]\n");
        let config = KernelConfig::load_with_env(&path, &[]).unwrap();
        // Later include wins, earlier include's other keys survive.
        assert_eq!(config.max_concurrent_workcells, 2);
        assert_eq!(config.max_concurrent_tokens, 111);
    }

    #[test]
    fn include_cycle_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.yaml", "include: b.yaml\n");
        write(dir.path(), "b.yaml", "include: a.yaml\n");
        let err =
            KernelConfig::load_with_env(&dir.path().join("a.yaml"), &[]).unwrap_err();
        assert!(matches!(err, ConfigError::IncludeCycle { .. }), "{err:?}");
    }

    #[test]
    fn env_overrides_scalar_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "config.yaml", "max_concurrent_workcells: 3\n");
        let env = vec![
            ("CYNTRA_MAX_CONCURRENT_WORKCELLS".to_string(), "7".to_string()),
            ("CYNTRA_GATES_TEST_COMMAND".to_string(), "cargo test".to_string()),
        ];
        let config = KernelConfig::load_with_env(&path, &env).unwrap();
        assert_eq!(config.max_concurrent_workcells, 7);
        assert_eq!(config.gates.test_command, "cargo test");
    }

    #[test]
    fn env_override_prefers_longest_key() {
        let mut value = serde_json::json!({
            "gates": {"test_command": "pytest"},
        });
        assert!(apply_env_override(&mut value, "GATES_TEST_COMMAND", "make test"));
        assert_eq!(value["gates"]["test_command"], "make test");
    }

    #[test]
    fn env_override_reports_unmatched() {
        let mut value = serde_json::json!({"gates": {}});
        assert!(!apply_env_override(&mut value, "GATES_NOPE", "x"));
    }

    #[test]
    fn scheduling_compat_block_folds_into_flat_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "config.yaml",
            "scheduling:\n  max_concurrent_workcells: 8\n",
        );
        let config = KernelConfig::load_with_env(&path, &[]).unwrap();
        assert_eq!(config.max_concurrent_workcells, 8);
        assert!(config.scheduling.is_none());
    }

    #[test]
    fn auto_trigger_compat_folds() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "config.yaml",
            "speculation:\n  auto_trigger:\n    on_critical_path: false\n    risk_levels: [critical]\n",
        );
        let config = KernelConfig::load_with_env(&path, &[]).unwrap();
        assert!(!config.speculation.auto_trigger_on_critical_path);
        assert_eq!(
            config.speculation.auto_trigger_risk_levels,
            vec![RiskLevel::Critical]
        );
    }

    #[test]
    fn validation_rejects_zero_budgets() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "config.yaml", "max_concurrent_workcells: 0\n");
        let err = KernelConfig::load_with_env(&path, &[]).unwrap_err();
        match err {
            ConfigError::ValidationError { reasons } => {
                assert!(reasons.iter().any(|r| r.contains("max_concurrent_workcells")));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn validation_warns_on_large_timeout() {
        let mut config = KernelConfig::default();
        config.toolchains.insert(
            "claude".into(),
            ToolchainConfig {
                timeout_seconds: Some(7200),
                ..ToolchainConfig::default()
            },
        );
        let warnings = config.validate().unwrap();
        assert!(warnings.iter().any(|w| matches!(
            w,
            ConfigWarning::LargeTimeout { toolchain, secs: 7200 } if toolchain == "claude"
        )));
    }

    #[test]
    fn validation_rejects_planner_without_bundle() {
        let mut config = KernelConfig::default();
        config.planner.mode = PlannerMode::Enforce;
        assert!(config.validate().is_err());
    }

    #[test]
    fn gates_produce_ordered_commands() {
        let mut gates = GatesConfig::default();
        gates.build_command = Some("cargo build".into());
        let commands = gates.gate_commands();
        let names: Vec<&str> = commands.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["test", "typecheck", "lint", "build"]);
        assert!(commands.iter().all(|g| g.timeout_seconds == 300));
    }

    #[test]
    fn empty_gate_commands_are_skipped() {
        let gates = GatesConfig {
            typecheck_command: String::new(),
            ..GatesConfig::default()
        };
        let names: Vec<String> = gates.gate_commands().into_iter().map(|g| g.name).collect();
        assert_eq!(names, vec!["test", "lint"]);
    }

    #[test]
    fn staging_defaults_exclude_build_trees() {
        let config = KernelConfig::default();
        assert!(config.staging.include.is_empty());
        assert!(config.staging.exclude.contains(&"target/**".to_string()));
    }

    #[test]
    fn staging_key_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "config.yaml",
            "staging:\n  include: [src/**]\n  exclude: [src/vendor/**]\n",
        );
        let config = KernelConfig::load_with_env(&path, &[]).unwrap();
        assert_eq!(config.staging.include, vec!["src/**"]);
        assert_eq!(config.staging.exclude, vec!["src/vendor/**"]);
    }

    #[test]
    fn routing_rule_matching() {
        let rule = RoutingRule {
            matches: [
                ("tag".to_string(), "fab".to_string()),
                ("risk".to_string(), "high".to_string()),
            ]
            .into(),
            use_toolchains: vec!["workflow".into()],
            ..RoutingRule::default()
        };

        let tags: BTreeSet<String> = ["fab".to_string()].into();
        assert!(rule.matches_issue(&tags, RiskLevel::High));
        assert!(!rule.matches_issue(&tags, RiskLevel::Low));
        assert!(!rule.matches_issue(&BTreeSet::new(), RiskLevel::High));
    }

    #[test]
    fn routing_rule_unknown_match_key_fails_closed() {
        let rule = RoutingRule {
            matches: [("planet".to_string(), "mars".to_string())].into(),
            use_toolchains: vec!["claude".into()],
            ..RoutingRule::default()
        };
        assert!(!rule.matches_issue(&BTreeSet::new(), RiskLevel::Low));
    }

    #[test]
    fn paths_for_config_derive_repo_root() {
        let paths = KernelPaths::for_config(Path::new("/repo/.cyntra/config.yaml"));
        assert_eq!(paths.repo_root, Path::new("/repo"));
        assert_eq!(paths.kernel_dir, Path::new("/repo/.cyntra"));
        assert_eq!(paths.workcells_dir, Path::new("/repo/.workcells"));
        assert_eq!(paths.beads_dir, Path::new("/repo/.beads"));
        assert_eq!(paths.archives_dir, Path::new("/repo/.cyntra/archives"));
    }
}
