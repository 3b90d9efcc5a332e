// SPDX-License-Identifier: MIT OR Apache-2.0
//! cyntra-hooks
#![deny(unsafe_code)]
//!
//! Pluggable hooks keyed by lifecycle trigger.
//!
//! Hooks run inside the kernel process, sequenced by priority (then
//! registration order) even in async mode, so the shared `hook_outputs`
//! map stays deterministic. A failing hook never aborts the chain; only a
//! `PRE_EXECUTION` hook returning `success: false` with `abort: true`
//! stops a dispatch.
//!
//! There is no global registry: hooks register explicitly at startup on a
//! [`HookRegistry`] instance, and tests install a fresh one per test.

/// Built-in hooks driven by the post-execution hook config.
pub mod builtin;

use cyntra_core::{Manifest, PatchProof, ProofStatus};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Vocabulary
// ---------------------------------------------------------------------------

/// When a hook fires.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HookTrigger {
    /// Before the adapter is invoked; may abort the dispatch.
    PreExecution,
    /// After the adapter returns, regardless of status.
    PostExecution,
    /// After `POST_EXECUTION`, when the proof status is `success`.
    OnSuccess,
    /// After `POST_EXECUTION`, for any non-success status.
    OnFailure,
    /// During verification, when at least one gate failed.
    OnGateFailure,
}

/// Execution order within a trigger. `Early` runs first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HookPriority {
    /// Runs before normal hooks.
    Early,
    /// Default position.
    #[default]
    Normal,
    /// Runs after normal hooks.
    Late,
}

// ---------------------------------------------------------------------------
// Context and results
// ---------------------------------------------------------------------------

/// Everything a hook can see (and, for `hook_outputs`, mutate).
#[derive(Debug, Clone)]
pub struct HookContext {
    /// Sandbox root of the run.
    pub workcell_path: PathBuf,
    /// Workcell id.
    pub workcell_id: String,
    /// Issue id.
    pub issue_id: String,
    /// The proof as it stands at this trigger; absent for
    /// `PRE_EXECUTION`, where no attempt has run yet.
    pub proof: Option<PatchProof>,
    /// The manifest for the run.
    pub manifest: Manifest,
    /// Failed gate names, populated only for `ON_GATE_FAILURE`.
    pub gate_failures: Vec<String>,
    /// Outputs of hooks that already ran in this trigger invocation,
    /// keyed by hook name.
    pub hook_outputs: BTreeMap<String, serde_json::Value>,
}

impl HookContext {
    /// Build a context for a proof/manifest pair.
    #[must_use]
    pub fn new(workcell_path: PathBuf, proof: PatchProof, manifest: Manifest) -> Self {
        Self {
            workcell_path,
            workcell_id: proof.workcell_id.clone(),
            issue_id: proof.issue_id.clone(),
            proof: Some(proof),
            manifest,
            gate_failures: Vec::new(),
            hook_outputs: BTreeMap::new(),
        }
    }

    /// Build a context for `PRE_EXECUTION`, before any proof exists.
    #[must_use]
    pub fn pre_execution(workcell_path: PathBuf, manifest: Manifest) -> Self {
        Self {
            workcell_path,
            workcell_id: manifest.workcell_id.clone(),
            issue_id: manifest.issue.id.clone(),
            proof: None,
            manifest,
            gate_failures: Vec::new(),
            hook_outputs: BTreeMap::new(),
        }
    }
}

/// Outcome of one hook invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookResult {
    /// Name of the hook that produced this result.
    pub hook_name: String,
    /// Whether the hook completed without error.
    pub success: bool,
    /// Structured output merged into the context for later hooks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    /// Error description for failed hooks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Request to abort the dispatch (honored only on `PRE_EXECUTION`).
    #[serde(default)]
    pub abort: bool,
    /// Handler wall-clock duration.
    #[serde(default)]
    pub duration_ms: u64,
}

impl HookResult {
    /// Successful result with no output.
    #[must_use]
    pub fn ok(hook_name: impl Into<String>) -> Self {
        Self {
            hook_name: hook_name.into(),
            success: true,
            output: None,
            error: None,
            abort: false,
            duration_ms: 0,
        }
    }

    /// Successful result carrying structured output.
    #[must_use]
    pub fn ok_with(hook_name: impl Into<String>, output: serde_json::Value) -> Self {
        Self {
            output: Some(output),
            ..Self::ok(hook_name)
        }
    }

    /// Failed result with an error description.
    #[must_use]
    pub fn failed(hook_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::ok(hook_name)
        }
    }

    /// Failed result that also requests a dispatch abort.
    #[must_use]
    pub fn abort(hook_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            abort: true,
            ..Self::failed(hook_name, error)
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers and definitions
// ---------------------------------------------------------------------------

/// Synchronous hook handler.
pub type SyncHandler = Arc<dyn Fn(&mut HookContext) -> HookResult + Send + Sync>;

/// Asynchronous hook handler.
pub type AsyncHandler =
    Arc<dyn for<'a> Fn(&'a mut HookContext) -> BoxFuture<'a, HookResult> + Send + Sync>;

/// A hook's executable body.
#[derive(Clone)]
pub enum HookHandler {
    /// Plain function; runs on the calling thread.
    Sync(SyncHandler),
    /// Future-returning function; runs on the ambient scheduler.
    Async(AsyncHandler),
}

impl std::fmt::Debug for HookHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("HookHandler::Sync"),
            Self::Async(_) => f.write_str("HookHandler::Async"),
        }
    }
}

/// A registered hook.
#[derive(Debug, Clone)]
pub struct HookDefinition {
    /// Unique name within a trigger; re-registration replaces.
    pub name: String,
    /// When the hook fires.
    pub trigger: HookTrigger,
    /// The handler body.
    pub handler: HookHandler,
    /// Ordering within the trigger.
    pub priority: HookPriority,
    /// Run only when the issue carries at least one of these tags.
    pub match_tags: Vec<String>,
    /// Skip when the issue carries any of these tags.
    pub exclude_tags: Vec<String>,
    /// Run only for these proof statuses (empty = all).
    pub match_status: Vec<ProofStatus>,
    /// Individually disabled hooks are skipped.
    pub enabled: bool,
}

impl HookDefinition {
    /// Define a synchronous hook with default filters.
    pub fn sync<F>(name: impl Into<String>, trigger: HookTrigger, handler: F) -> Self
    where
        F: Fn(&mut HookContext) -> HookResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            trigger,
            handler: HookHandler::Sync(Arc::new(handler)),
            priority: HookPriority::Normal,
            match_tags: Vec::new(),
            exclude_tags: Vec::new(),
            match_status: Vec::new(),
            enabled: true,
        }
    }

    /// Define an asynchronous hook with default filters.
    pub fn asynchronous<F>(name: impl Into<String>, trigger: HookTrigger, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut HookContext) -> BoxFuture<'a, HookResult> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            trigger,
            handler: HookHandler::Async(Arc::new(handler)),
            priority: HookPriority::Normal,
            match_tags: Vec::new(),
            exclude_tags: Vec::new(),
            match_status: Vec::new(),
            enabled: true,
        }
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: HookPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Require at least one of these tags on the issue.
    #[must_use]
    pub fn with_match_tags(mut self, tags: Vec<String>) -> Self {
        self.match_tags = tags;
        self
    }

    /// Skip when the issue carries any of these tags.
    #[must_use]
    pub fn with_exclude_tags(mut self, tags: Vec<String>) -> Self {
        self.exclude_tags = tags;
        self
    }

    /// Run only for these proof statuses.
    #[must_use]
    pub fn with_match_status(mut self, statuses: Vec<ProofStatus>) -> Self {
        self.match_status = statuses;
        self
    }

    /// Mark the hook disabled.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    fn applies_to(&self, ctx: &HookContext) -> bool {
        if !self.enabled {
            return false;
        }
        let tags = &ctx.manifest.issue.tags;
        if !self.match_tags.is_empty() && !self.match_tags.iter().any(|t| tags.contains(t)) {
            return false;
        }
        if self.exclude_tags.iter().any(|t| tags.contains(t)) {
            return false;
        }
        if !self.match_status.is_empty() {
            // No proof yet means no status to match against.
            match &ctx.proof {
                Some(proof) if self.match_status.contains(&proof.status) => {}
                _ => return false,
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Mutable store mapping trigger → ordered hooks.
///
/// Registration is serialized; `hooks_for` takes a snapshot so readers
/// never observe a half-applied registration.
#[derive(Debug, Default)]
pub struct HookRegistry {
    hooks: Mutex<BTreeMap<HookTrigger, Vec<HookDefinition>>>,
}

impl HookRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook. A hook with the same name under the same trigger
    /// is replaced (the replacement takes the tail of its priority band).
    pub fn register(&self, hook: HookDefinition) {
        let mut map = self.hooks.lock().expect("hook registry poisoned");
        let entry = map.entry(hook.trigger).or_default();
        entry.retain(|h| h.name != hook.name);
        entry.push(hook);
    }

    /// Remove a hook by name, optionally constrained to one trigger.
    /// Returns whether anything was removed.
    pub fn unregister(&self, name: &str, trigger: Option<HookTrigger>) -> bool {
        let mut map = self.hooks.lock().expect("hook registry poisoned");
        let mut removed = false;
        for (t, hooks) in map.iter_mut() {
            if trigger.is_some_and(|only| only != *t) {
                continue;
            }
            let before = hooks.len();
            hooks.retain(|h| h.name != name);
            removed |= hooks.len() != before;
        }
        removed
    }

    /// Snapshot the hooks for a trigger, sorted by priority with
    /// registration order breaking ties.
    #[must_use]
    pub fn hooks_for(&self, trigger: HookTrigger) -> Vec<HookDefinition> {
        let map = self.hooks.lock().expect("hook registry poisoned");
        let mut hooks = map.get(&trigger).cloned().unwrap_or_default();
        hooks.sort_by_key(|h| h.priority);
        hooks
    }

    /// Total number of registered hooks across all triggers.
    #[must_use]
    pub fn hook_count(&self) -> usize {
        let map = self.hooks.lock().expect("hook registry poisoned");
        map.values().map(Vec::len).sum()
    }

    /// Remove every hook.
    pub fn clear(&self) {
        self.hooks.lock().expect("hook registry poisoned").clear();
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Executes hook chains against a registry snapshot.
pub struct HookRunner {
    registry: Arc<HookRegistry>,
    config: cyntra_config::PostExecutionHooksConfig,
}

impl HookRunner {
    /// Create a runner over a registry with the given hook configuration.
    #[must_use]
    pub fn new(
        registry: Arc<HookRegistry>,
        config: cyntra_config::PostExecutionHooksConfig,
    ) -> Self {
        Self { registry, config }
    }

    /// The registry this runner reads from.
    #[must_use]
    pub fn registry(&self) -> &Arc<HookRegistry> {
        &self.registry
    }

    fn config_enabled(&self, name: &str) -> bool {
        match name {
            builtin::CODE_REVIEWER => self.config.code_reviewer.enabled,
            builtin::DEBUG_SPECIALIST => self.config.debug_specialist.enabled,
            _ => true,
        }
    }

    fn runnable(&self, trigger: HookTrigger, ctx: &HookContext) -> Vec<HookDefinition> {
        if !self.config.enabled {
            return Vec::new();
        }
        self.registry
            .hooks_for(trigger)
            .into_iter()
            .filter(|h| h.applies_to(ctx))
            .filter(|h| self.config_enabled(&h.name))
            .collect()
    }

    /// Run the hook chain synchronously.
    ///
    /// Async handlers are driven to completion on the calling thread, so
    /// ordering is identical to [`run_hooks_async`](Self::run_hooks_async).
    pub fn run_hooks(&self, trigger: HookTrigger, ctx: &mut HookContext) -> Vec<HookResult> {
        let mut results = Vec::new();
        for hook in self.runnable(trigger, ctx) {
            let started = Instant::now();
            let mut result = match &hook.handler {
                HookHandler::Sync(f) => catch_sync(&hook.name, || f(ctx)),
                HookHandler::Async(f) => {
                    catch_sync(&hook.name, || futures::executor::block_on(f(ctx)))
                }
            };
            finish(&hook, &mut result, started, ctx, &mut results);
        }
        results
    }

    /// Run the hook chain cooperatively.
    ///
    /// Hooks are still sequenced one at a time in priority order; async
    /// handlers run on the ambient scheduler bounded by the configured
    /// per-hook timeout, sync handlers run inline (via `block_in_place`
    /// on a multi-threaded runtime).
    pub async fn run_hooks_async(
        &self,
        trigger: HookTrigger,
        ctx: &mut HookContext,
    ) -> Vec<HookResult> {
        let timeout = Duration::from_secs(self.config.timeout_seconds.max(1));
        let mut results = Vec::new();

        for hook in self.runnable(trigger, ctx) {
            let started = Instant::now();
            let mut result = match &hook.handler {
                HookHandler::Async(f) => {
                    match tokio::time::timeout(
                        timeout,
                        AssertUnwindSafe(f(ctx)).catch_unwind(),
                    )
                    .await
                    {
                        Ok(Ok(result)) => result,
                        Ok(Err(panic)) => {
                            HookResult::failed(&hook.name, panic_message(&panic))
                        }
                        Err(_) => HookResult::failed(
                            &hook.name,
                            format!("hook timed out after {}s", timeout.as_secs()),
                        ),
                    }
                }
                HookHandler::Sync(f) => run_sync_inline(&hook.name, f, ctx),
            };
            finish(&hook, &mut result, started, ctx, &mut results);
        }
        results
    }
}

fn run_sync_inline(name: &str, f: &SyncHandler, ctx: &mut HookContext) -> HookResult {
    let handle = tokio::runtime::Handle::try_current();
    let multi_thread = handle
        .map(|h| h.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread)
        .unwrap_or(false);
    if multi_thread {
        tokio::task::block_in_place(|| catch_sync(name, || f(ctx)))
    } else {
        catch_sync(name, || f(ctx))
    }
}

fn catch_sync(name: &str, f: impl FnOnce() -> HookResult) -> HookResult {
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(panic) => HookResult::failed(name, panic_message(&panic)),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "hook panicked".to_string()
    }
}

fn finish(
    hook: &HookDefinition,
    result: &mut HookResult,
    started: Instant,
    ctx: &mut HookContext,
    results: &mut Vec<HookResult>,
) {
    result.duration_ms = started.elapsed().as_millis() as u64;
    result.hook_name = hook.name.clone();

    if let Some(output) = &result.output {
        ctx.hook_outputs.insert(hook.name.clone(), output.clone());
    }

    if result.success {
        debug!(
            target: "cyntra.hooks",
            hook = %hook.name,
            duration_ms = result.duration_ms,
            "hook completed"
        );
    } else {
        warn!(
            target: "cyntra.hooks",
            hook = %hook.name,
            error = result.error.as_deref().unwrap_or("unknown"),
            "hook failed; chain continues"
        );
    }

    results.push(result.clone());
}
