// SPDX-License-Identifier: MIT OR Apache-2.0
//! cyntra-kernel
#![deny(unsafe_code)]
//!
//! The kernel core: admission scheduling, dispatch routing, and the
//! top-level run loop that drives issues from the bead store through
//! workcells, adapters, verification, and voting.

/// Routing and adapter invocation for a single run.
pub mod dispatch;
/// Top-level poll → schedule → dispatch → verify → vote → record loop.
pub mod runner;
/// Admission control under concurrency and token budgets.
pub mod scheduler;

/// Shutdown signal shared between the runner and its caller. No new
/// dispatches start after cancellation; in-flight runs complete.
pub use tokio_util::sync::CancellationToken;

pub use dispatch::{DispatchResult, Dispatcher};
pub use runner::{RunReport, Runner};
pub use scheduler::{CandidateRun, PlannedRun, Scheduler, SchedulerInputs};

/// Errors crossing the kernel's component boundaries.
///
/// Recoverable conditions (gate failures, timeouts, hook failures) never
/// surface here; they live in proof and telemetry fields. These are the
/// conditions a caller must handle.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// Configuration failed to load or validate.
    #[error(transparent)]
    Config(#[from] cyntra_config::ConfigError),

    /// The bead store could not be reached or read.
    #[error(transparent)]
    BeadStore(#[from] cyntra_beads::BeadStoreError),

    /// A workcell sandbox could not be allocated.
    #[error(transparent)]
    Workcell(#[from] cyntra_workcell::WorkcellError),

    /// No registered, available toolchain could serve the issue.
    #[error("no available toolchain for issue {issue_id}")]
    NoToolchainAvailable {
        /// Issue that could not be routed.
        issue_id: String,
    },

    /// The named toolchain is not in the registry.
    #[error("unknown toolchain: {name}")]
    UnknownToolchain {
        /// The name that was looked up.
        name: String,
    },
}
