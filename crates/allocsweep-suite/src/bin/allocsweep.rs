//! Runs the allocation-failure suite for allocsweep-tree.
//!
//! Prints one line per failed test and a summary line; the exit status is
//! the number of failed tests, capped at 255.

use std::path::PathBuf;
use std::process::ExitCode;

use allocsweep_harness::config::{self, ReplayPolicy};
use allocsweep_harness::structured_log::LogEmitter;
use allocsweep_harness::{Driver, HarnessConfig};
use allocsweep_suite::TreeHost;
use clap::Parser;

/// Allocation fault-injection suite for allocsweep-tree.
#[derive(Debug, Parser)]
#[command(name = "allocsweep")]
#[command(about = "Run every registered test under a tracked, fault-injecting allocator")]
struct Cli {
    /// Only run tests whose name contains this text.
    #[arg(long)]
    filter: Option<String>,
    /// Write a JSONL structured log of the run to this path.
    #[arg(long)]
    log: Option<PathBuf>,
    /// Skip the replay with the unwinding allocator.
    #[arg(long)]
    no_replay: bool,
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut harness_config = HarnessConfig::from_env();
    if cli.filter.is_some() {
        harness_config.filter = cli.filter;
    }
    if cli.log.is_some() {
        harness_config.log_path = cli.log;
    }
    if cli.no_replay {
        harness_config.replay = ReplayPolicy::Off;
    }
    if let Some(argv0) = std::env::args_os().next() {
        harness_config.scratch_dir = config::scratch_dir_from_invocation(&argv0);
    }
    config::set_scratch_dir(harness_config.scratch_dir.clone());

    let registry = allocsweep_suite::registry()?;
    let host = TreeHost;
    let mut driver = Driver::new(&host, &harness_config);
    if let Some(path) = &harness_config.log_path {
        let run_id = format!("pid{}", std::process::id());
        driver = driver.with_log(LogEmitter::to_file(path, "allocsweep", &run_id)?);
    }

    let mut stdout = std::io::stdout().lock();
    let summary = driver.run(&registry, &mut stdout)?;
    Ok(ExitCode::from(summary.exit_code()))
}
