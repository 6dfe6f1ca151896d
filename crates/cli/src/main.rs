//! lockprobe CLI: run a lock-contention scenario and report what happened.
//!
//! - `lockprobe [flags]`: run the scenario once (or `--repeat N` times)
//! - `lockprobe init-config FILE`: write the default scenario file
//!
//! Exit codes: 0 when a result is produced, 1 on configuration errors,
//! 2 when any session failed for a non-conflict reason.

mod commands;
mod format;
mod tracing_setup;

use std::path::Path;
use std::process;
use std::sync::Arc;

use tracing::info;

use lockprobe_concurrency::ConflictOrchestrator;
use lockprobe_core::{HarnessResult, ScenarioConfig};
use lockprobe_storage::LockTableStore;

use commands::{build_cli, resolve_scenario};
use format::{format_error, format_result, format_summary, OutputMode};
use tracing_setup::{init_subscriber, Verbosity};

const EXIT_CONFIG_ERROR: i32 = 1;
const EXIT_SESSION_FAILED: i32 = 2;

/// Value every declared row holds before the first session runs
const INITIAL_ROW_VALUE: &str = "initial";

fn main() {
    let matches = build_cli().get_matches();

    init_subscriber(Verbosity::from_flags(
        matches.get_flag("verbose"),
        matches.get_flag("quiet"),
    ));

    let mode = if matches.get_flag("json") {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    if let Some(("init-config", sub)) = matches.subcommand() {
        let path = sub
            .get_one::<String>("file")
            .map(String::as_str)
            .unwrap_or(lockprobe_core::CONFIG_FILE_NAME);
        match ScenarioConfig::write_default_if_missing(Path::new(path)) {
            Ok(()) => println!("{}", path),
            Err(e) => {
                eprintln!("{}", format_error(&e, mode));
                process::exit(EXIT_CONFIG_ERROR);
            }
        }
        return;
    }

    let config = match resolve_scenario(&matches) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", format_error(&e, mode));
            process::exit(EXIT_CONFIG_ERROR);
        }
    };
    let repeat = matches.get_one::<u64>("repeat").copied().unwrap_or(1) as usize;

    match run(&config, repeat, mode) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("{}", format_error(&e, mode));
            process::exit(EXIT_CONFIG_ERROR);
        }
    }
}

/// Run the resolved scenario, print the result, and return the exit code.
fn run(config: &ScenarioConfig, repeat: usize, mode: OutputMode) -> HarnessResult<i32> {
    let store = Arc::new(
        LockTableStore::from_config(&config.store).seeded(&config.resources, INITIAL_ROW_VALUE),
    );
    let orchestrator = ConflictOrchestrator::from_config(Arc::clone(&store), config);

    info!(
        sessions = config.sessions.len(),
        delay_ms = config.inter_lock_delay_ms,
        repeat,
        "Running scenario"
    );

    if repeat > 1 {
        let summary =
            orchestrator.run_repeated(&config.resources, &config.sessions, repeat)?;
        println!("{}", format_summary(&summary, mode));
        return Ok(if summary.failed_runs > 0 {
            EXIT_SESSION_FAILED
        } else {
            0
        });
    }

    let result =
        orchestrator.run_with_policy(&config.resources, &config.sessions, config.retry.as_ref())?;
    println!("{}", format_result(&result, &store.stats(), mode));
    Ok(if result.any_failed {
        EXIT_SESSION_FAILED
    } else {
        0
    })
}
