// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `cyntra` binary.
#![deny(unsafe_code)]

mod commands;
mod format;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Exit code when at least one issue ended partial or failed.
const EXIT_ISSUE_FAILED: u8 = 1;
/// Exit code for configuration errors.
const EXIT_CONFIG_ERROR: u8 = 2;
/// Exit code for usage errors.
const EXIT_USAGE_ERROR: u8 = 64;

#[derive(Parser, Debug)]
#[command(name = "cyntra", version, about = "Local-first autonomous orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to <repo>/.cyntra/config.yaml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize the kernel layout in the current repository.
    Init,

    /// Run the kernel loop over ready issues.
    Run {
        /// Single pass: drain the ready queue and exit (the default).
        #[arg(long)]
        once: bool,

        /// Keep polling the bead store for new issues.
        #[arg(long, conflicts_with = "once")]
        watch: bool,

        /// Process only this issue.
        #[arg(long)]
        issue: Option<String>,

        /// Override max_concurrent_workcells.
        #[arg(long)]
        max_concurrent: Option<u32>,

        /// Force speculate mode for every dispatched issue.
        #[arg(long)]
        speculate: bool,

        /// Plan and log without dispatching anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show issue counts and active workcells.
    Status {
        /// Print JSON instead of the human summary.
        #[arg(long)]
        json: bool,

        /// List individual issues as well.
        #[arg(long)]
        verbose: bool,
    },

    /// List workcell sandboxes.
    Workcells {
        /// Include archived workcells.
        #[arg(long)]
        all: bool,

        /// Print JSON instead of the human listing.
        #[arg(long)]
        json: bool,
    },

    /// Show recorded runs.
    History {
        /// Show a single run by id.
        #[arg(long, conflicts_with = "issue")]
        run: Option<String>,

        /// Show runs for one issue.
        #[arg(long)]
        issue: Option<String>,

        /// Most recent N runs (default 20).
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Print JSON instead of the human listing.
        #[arg(long)]
        json: bool,
    },

    /// Aggregate statistics over recorded runs.
    Stats {
        /// Include cost totals.
        #[arg(long)]
        cost: bool,

        /// Include success rates per toolchain.
        #[arg(long)]
        success_rate: bool,

        /// Include timing percentiles.
        #[arg(long)]
        time: bool,
    },
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            use clap::error::ErrorKind;
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => EXIT_USAGE_ERROR,
            };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    init_logging(cli.debug);

    let result = match cli.command {
        Commands::Init => commands::init(cli.config.as_deref()),
        Commands::Run {
            once: _,
            watch,
            issue,
            max_concurrent,
            speculate,
            dry_run,
        } => commands::run(commands::RunArgs {
            config: cli.config.clone(),
            watch,
            issue,
            max_concurrent,
            speculate,
            dry_run,
        }),
        Commands::Status { json, verbose } => commands::status(cli.config.as_deref(), json, verbose),
        Commands::Workcells { all, json } => commands::workcells(cli.config.as_deref(), all, json),
        Commands::History {
            run,
            issue,
            limit,
            json,
        } => commands::history(cli.config.as_deref(), run, issue, limit, json),
        Commands::Stats {
            cost,
            success_rate,
            time,
        } => commands::stats(cli.config.as_deref(), cost, success_rate, time),
    };

    match result {
        Ok(commands::Outcome::Success) => ExitCode::SUCCESS,
        Ok(commands::Outcome::IssuesFailed) => ExitCode::from(EXIT_ISSUE_FAILED),
        Err(e) => {
            eprintln!("cyntra: {e}");
            ExitCode::from(EXIT_CONFIG_ERROR)
        }
    }
}
