// SPDX-License-Identifier: MIT OR Apache-2.0
//! The top-level kernel loop.
//!
//! Poll the bead store, tick the scheduler, dispatch planned runs into
//! workcells on independent tasks, verify proofs, vote on speculate
//! groups, record outcomes, and update issue statuses. The runner is the
//! single writer of bead-store status transitions.

use crate::dispatch::Dispatcher;
use crate::scheduler::{CandidateRun, PlannedRun, Scheduler, SchedulerInputs};
use crate::KernelError;
use chrono::Utc;
use cyntra_beads::{BeadStore, BeadStoreError};
use cyntra_config::KernelConfig;
use cyntra_control::Controller;
use cyntra_core::{ids, Issue, IssueStatus, Manifest, PatchProof, ProofStatus, Workcell};
use cyntra_planner::OutcomeSummary;
use cyntra_telemetry::{
    kernel_events_path, TelemetryContext, TelemetryEventKind, TelemetryWriter,
};
use cyntra_verify::{vote, Verifier};
use cyntra_workcell::WorkcellManager;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Sleep between ticks when budgets are saturated or the store is idle.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Consecutive bead-store failures tolerated in single-pass mode.
const MAX_STORE_RETRIES: u32 = 3;

/// Backoff after a bead-store read failure.
const STORE_BACKOFF: Duration = Duration::from_secs(5);

/// Summary of a runner invocation, for the CLI.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Workcells dispatched (speculate candidates count individually).
    pub dispatched: usize,
    /// Issues that ended `completed`.
    pub completed: Vec<String>,
    /// Issues that ended `failed`.
    pub failed: Vec<String>,
    /// Issues returned to `ready` for another attempt.
    pub retried: Vec<String>,
}

impl RunReport {
    /// Whether every processed issue completed.
    #[must_use]
    pub fn all_completed(&self) -> bool {
        self.failed.is_empty() && self.retried.is_empty()
    }
}

struct InFlight {
    count: usize,
    tokens: u64,
}

struct Shared {
    config: Arc<KernelConfig>,
    store: Arc<dyn BeadStore>,
    workcells: Arc<WorkcellManager>,
    dispatcher: Arc<Dispatcher>,
    verifier: Arc<Verifier>,
    controller: Arc<Controller>,
    in_flight: Mutex<InFlight>,
    events: Option<TelemetryWriter>,
}

impl Shared {
    fn reserve(&self, candidates: usize, tokens: u64) {
        let mut guard = self.in_flight.lock().expect("in-flight lock poisoned");
        guard.count += candidates;
        guard.tokens += tokens;
    }

    fn release(&self, candidates: usize, tokens: u64) {
        let mut guard = self.in_flight.lock().expect("in-flight lock poisoned");
        guard.count = guard.count.saturating_sub(candidates);
        guard.tokens = guard.tokens.saturating_sub(tokens);
    }

    fn snapshot(&self) -> (usize, u64) {
        let guard = self.in_flight.lock().expect("in-flight lock poisoned");
        (guard.count, guard.tokens)
    }

    fn emit(&self, kind: TelemetryEventKind) {
        if let Some(events) = &self.events {
            events.emit(kind);
        }
    }
}

/// Releases a budget reservation when the run task ends, panicked or not.
struct Reservation {
    shared: Arc<Shared>,
    candidates: usize,
    tokens: u64,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.shared.release(self.candidates, self.tokens);
    }
}

/// Outcome of one planned run after verification and voting.
struct RunOutcome {
    issue_id: String,
    final_status: IssueStatus,
    dispatched: usize,
}

/// The top-level kernel runner.
pub struct Runner {
    shared: Arc<Shared>,
    scheduler: Arc<Scheduler>,
    shutdown: CancellationToken,
}

impl Runner {
    /// Wire a runner from its components.
    #[must_use]
    pub fn new(
        config: Arc<KernelConfig>,
        store: Arc<dyn BeadStore>,
        workcells: Arc<WorkcellManager>,
        dispatcher: Arc<Dispatcher>,
        verifier: Arc<Verifier>,
        controller: Arc<Controller>,
        scheduler: Arc<Scheduler>,
    ) -> Self {
        let events = TelemetryWriter::open(
            &kernel_events_path(&config.paths.logs_dir),
            TelemetryContext::default(),
        )
        .map_err(|e| {
            warn!(target: "cyntra.runner", error = %e, "kernel events file unavailable");
        })
        .ok();

        Self {
            shared: Arc::new(Shared {
                config,
                store,
                workcells,
                dispatcher,
                verifier,
                controller,
                in_flight: Mutex::new(InFlight {
                    count: 0,
                    tokens: 0,
                }),
                events,
            }),
            scheduler,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops new admissions when cancelled; in-flight runs
    /// complete.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the loop.
    ///
    /// In watch mode the loop polls the bead store until cancelled. In
    /// single-pass mode it drains the ready queue (including retries it
    /// generates itself) and returns.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::BeadStore`] when the store stays
    /// unreachable past the retry budget (single-pass mode only).
    pub async fn run(&self) -> Result<RunReport, KernelError> {
        let mut report = RunReport::default();
        let mut tasks: JoinSet<RunOutcome> = JoinSet::new();
        let mut store_failures: u32 = 0;

        loop {
            if self.shutdown.is_cancelled() {
                info!(target: "cyntra.runner", "shutdown requested; draining in-flight runs");
                break;
            }

            let ready = match self.shared.store.list_ready() {
                Ok(ready) => {
                    store_failures = 0;
                    ready
                }
                Err(e) => {
                    store_failures += 1;
                    warn!(target: "cyntra.runner", error = %e, attempt = store_failures, "bead store unavailable; backing off");
                    if !self.shared.config.watch_mode && store_failures >= MAX_STORE_RETRIES {
                        // Let already-spawned runs finish before bailing.
                        drain(&mut tasks, &mut report).await;
                        return Err(KernelError::BeadStore(BeadStoreError::Unavailable(
                            e.to_string(),
                        )));
                    }
                    tokio::time::sleep(STORE_BACKOFF).await;
                    continue;
                }
            };

            let (in_flight, reserved_tokens) = self.shared.snapshot();
            let plan = self.scheduler.tick(&SchedulerInputs {
                ready,
                in_flight,
                reserved_tokens,
                now: Utc::now(),
            });

            if plan.is_empty() && tasks.is_empty() {
                if self.shared.config.watch_mode {
                    tokio::time::sleep(POLL_INTERVAL).await;
                    continue;
                }
                break;
            }

            for planned in plan {
                if self.shared.config.dry_run {
                    info!(
                        target: "cyntra.runner",
                        issue_id = %planned.issue.id,
                        speculate = planned.speculate,
                        candidates = planned.candidates.len(),
                        "dry run: would dispatch"
                    );
                    report.dispatched += planned.candidates.len();
                    continue;
                }

                let candidates = planned.candidates.len();
                let tokens = planned.reserved_tokens;
                self.shared.reserve(candidates, tokens);

                let shared = Arc::clone(&self.shared);
                let scheduler = Arc::clone(&self.scheduler);
                tasks.spawn(async move {
                    let _reservation = Reservation {
                        shared: Arc::clone(&shared),
                        candidates,
                        tokens,
                    };
                    process_planned(&shared, &scheduler, planned).await
                });
            }

            if self.shared.config.dry_run && tasks.is_empty() {
                break;
            }

            // Wait for progress: a completion unblocks budget; the poll
            // interval bounds the wait so watch mode keeps polling.
            if !tasks.is_empty() {
                tokio::select! {
                    joined = tasks.join_next() => {
                        record(joined, &mut report);
                    }
                    () = tokio::time::sleep(POLL_INTERVAL) => {}
                }
            }
        }

        drain(&mut tasks, &mut report).await;
        Ok(report)
    }
}

fn record(
    joined: Option<Result<RunOutcome, tokio::task::JoinError>>,
    report: &mut RunReport,
) {
    match joined {
        Some(Ok(outcome)) => {
            report.dispatched += outcome.dispatched;
            match outcome.final_status {
                IssueStatus::Completed => report.completed.push(outcome.issue_id),
                IssueStatus::Ready => report.retried.push(outcome.issue_id),
                _ => report.failed.push(outcome.issue_id),
            }
        }
        Some(Err(e)) => {
            // A panicked run loses only that run.
            error!(target: "cyntra.runner", error = %e, "run task panicked");
        }
        None => {}
    }
}

async fn drain(tasks: &mut JoinSet<RunOutcome>, report: &mut RunReport) {
    while let Some(joined) = tasks.join_next().await {
        record(Some(joined), report);
    }
}

/// Process one planned run end to end: workcells, dispatch, verify,
/// vote, record, cleanup, status update.
async fn process_planned(
    shared: &Arc<Shared>,
    scheduler: &Arc<Scheduler>,
    planned: PlannedRun,
) -> RunOutcome {
    let issue = planned.issue.clone();
    update_status(shared, &issue.id, IssueStatus::InProgress, None);

    if let Some(action) = &planned.planner_action {
        shared.emit(TelemetryEventKind::PlannerPrediction {
            action: serde_json::to_value(action).unwrap_or(serde_json::Value::Null),
            confidence: action.confidence,
            enforced: planned.planner_enforced,
        });
    }

    // A planner action rides into the manifest through the override
    // merge, so adapters can see what the swarm was asked to do.
    let overrides = planned.planner_action.as_ref().map(|action| {
        serde_json::json!({
            "planner": {
                "action": action,
                "enforced": planned.planner_enforced,
            }
        })
    });

    // Dispatch every candidate concurrently; they share nothing but the
    // issue identity.
    let mut candidate_tasks: JoinSet<Option<(Workcell, PatchProof)>> = JoinSet::new();
    for candidate in planned.candidates.clone() {
        let shared = Arc::clone(shared);
        let issue = issue.clone();
        let overrides = overrides.clone();
        candidate_tasks
            .spawn(async move { run_candidate(&shared, &issue, candidate, overrides).await });
    }

    let mut results: Vec<(Workcell, PatchProof)> = Vec::new();
    let mut dispatched = 0;
    while let Some(joined) = candidate_tasks.join_next().await {
        match joined {
            Ok(Some(result)) => {
                dispatched += 1;
                results.push(result);
            }
            Ok(None) => dispatched += 1,
            Err(e) => {
                error!(target: "cyntra.runner", issue_id = %issue.id, error = %e, "candidate task panicked");
            }
        }
    }

    if results.is_empty() {
        // Allocation or dispatch failed everywhere; the issue goes back.
        let final_status = retry_or_fail(&issue, false);
        update_status(shared, &issue.id, final_status, Some("no attempt produced a proof"));
        return RunOutcome {
            issue_id: issue.id,
            final_status,
            dispatched,
        };
    }

    let proofs: Vec<PatchProof> = results.iter().map(|(_, p)| p.clone()).collect();
    let winner = vote(&proofs).cloned();

    if planned.speculate {
        shared.emit(TelemetryEventKind::VoteResult {
            winner_workcell_id: winner.as_ref().map(|w| w.workcell_id.clone()),
            candidates: proofs.len() as u64,
        });
    }

    // The winner drives the status update.
    let (final_status, reason) = match &winner {
        Some(proof) => decide_status(&issue, proof),
        None => (retry_or_fail(&issue, false), "no winner".to_string()),
    };

    let success = final_status == IssueStatus::Completed;
    shared.controller.record_outcome(&issue.id, success);
    if let Some(proof) = &winner {
        scheduler.push_history(OutcomeSummary {
            issue_id: issue.id.clone(),
            status: proof.status.as_str().to_string(),
            duration_ms: proof.metadata.duration_ms,
        });
    }

    for (workcell, proof) in &results {
        persist_run_records(shared, &issue, workcell, proof);
        let run_succeeded =
            proof.status == ProofStatus::Success && proof.verification.all_passed;
        shared.workcells.cleanup(workcell, !run_succeeded);
    }

    update_status(shared, &issue.id, final_status, Some(&reason));
    info!(
        target: "cyntra.runner",
        issue_id = %issue.id,
        status = ?final_status,
        winner = winner.as_ref().map_or("", |w| w.workcell_id.as_str()),
        "run recorded"
    );

    RunOutcome {
        issue_id: issue.id,
        final_status,
        dispatched,
    }
}

/// Allocate a workcell, dispatch, verify. `None` means allocation or
/// dispatch failed before a proof existed; that run is lost, not the
/// kernel.
async fn run_candidate(
    shared: &Arc<Shared>,
    issue: &Issue,
    candidate: CandidateRun,
    manifest_overrides: Option<serde_json::Value>,
) -> Option<(Workcell, PatchProof)> {
    let workcell = match shared
        .workcells
        .create(&issue.id, candidate.speculate_tag.as_deref())
    {
        Ok(wc) => wc,
        Err(e) => {
            warn!(target: "cyntra.runner", issue_id = %issue.id, error = %e, "workcell allocation failed");
            return None;
        }
    };

    let dispatched = shared
        .dispatcher
        .dispatch(
            issue,
            &workcell,
            candidate.toolchain.as_deref(),
            candidate.speculate_tag.as_deref(),
            manifest_overrides,
            Some(candidate.sampling),
        )
        .await;

    match dispatched {
        Ok(result) => {
            let mut proof = result.proof;
            let manifest_path = workcell.path.join("manifest.json");
            let manifest: Option<Manifest> = std::fs::read_to_string(&manifest_path)
                .ok()
                .and_then(|raw| serde_json::from_str(&raw).ok());
            if let Some(manifest) = manifest {
                shared
                    .verifier
                    .verify(&mut proof, &workcell, &manifest, None)
                    .await;
            } else {
                warn!(target: "cyntra.runner", workcell_id = %workcell.workcell_id, "manifest missing; verification skipped");
            }
            Some((workcell, proof))
        }
        Err(e) => {
            warn!(target: "cyntra.runner", issue_id = %issue.id, error = %e, "dispatch failed");
            shared.workcells.cleanup(&workcell, true);
            None
        }
    }
}

/// Status transition for a decided proof.
fn decide_status(issue: &Issue, proof: &PatchProof) -> (IssueStatus, String) {
    if proof.status == ProofStatus::Success && proof.verification.all_passed {
        return (IssueStatus::Completed, format!("verified on {}", proof.patch.branch));
    }

    let violation = !proof.patch.forbidden_path_violations.is_empty();
    if violation {
        // Human review; never retried automatically.
        return (
            IssueStatus::Failed,
            format!(
                "forbidden paths modified: {}",
                proof.patch.forbidden_path_violations.join(", ")
            ),
        );
    }

    let status = retry_or_fail(issue, violation);
    let reason = match proof.status {
        ProofStatus::Success => {
            format!("gates failed: {}", proof.verification.blocking_failures.join(", "))
        }
        other => format!("attempt ended {}", other.as_str()),
    };
    (status, reason)
}

/// Back to `ready` while the retry budget lasts, else `failed`.
fn retry_or_fail(issue: &Issue, violation: bool) -> IssueStatus {
    if !violation && issue.retry_count < issue.retry_budget {
        IssueStatus::Ready
    } else {
        IssueStatus::Failed
    }
}

/// Wire name of a status (`in_progress`, not `InProgress`).
fn status_name(status: IssueStatus) -> String {
    serde_json::to_value(status)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

fn update_status(shared: &Arc<Shared>, issue_id: &str, status: IssueStatus, reason: Option<&str>) {
    let from = shared.store.get(issue_id).map(|i| i.status).ok();
    if let Err(e) = shared.store.update_status(issue_id, status, reason) {
        error!(target: "cyntra.runner", issue_id = %issue_id, error = %e, "status update failed");
        return;
    }
    shared.emit(TelemetryEventKind::StatusChange {
        from: from.map(status_name),
        to: status_name(status),
        reason: reason.map(str::to_string),
    });
}

/// Persist per-run artifacts under `.cyntra/runs/<run-id>/`: the
/// manifest, the final proof, and a gate verdict for fab-tagged runs.
fn persist_run_records(
    shared: &Arc<Shared>,
    issue: &Issue,
    workcell: &Workcell,
    proof: &PatchProof,
) {
    let run_dir = shared.config.paths.runs_dir.join(ids::run_id());
    if let Err(e) = std::fs::create_dir_all(&run_dir) {
        warn!(target: "cyntra.runner", error = %e, "failed to create run dir");
        return;
    }

    if let Ok(manifest) = std::fs::read(workcell.path.join("manifest.json")) {
        let _ = std::fs::write(run_dir.join("manifest.json"), manifest);
    }
    if let Ok(json) = proof.to_json() {
        let _ = std::fs::write(run_dir.join("proof.json"), json);
    }

    if issue.tags.contains("fab") {
        let verdict_dir = run_dir.join("verdict");
        let _ = std::fs::create_dir_all(&verdict_dir);
        let verdict = serde_json::json!({
            "verdict": if proof.verification.all_passed { "pass" } else { "fail" },
            "scores": { "overall": proof.confidence },
            "timing": { "duration_ms": proof.metadata.duration_ms },
            "failures": {
                "hard": proof.verification.blocking_failures,
                "soft": [],
            },
        });
        let _ = std::fs::write(
            verdict_dir.join("gate_verdict.json"),
            serde_json::to_string_pretty(&verdict).unwrap_or_default(),
        );
    }
}
