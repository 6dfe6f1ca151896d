//! Clap command tree and scenario resolution.
//!
//! The scenario comes from `--config FILE` when given, otherwise from the
//! canonical two-session deadlock. Individual flags override either source.

use std::path::Path;
use std::time::Duration;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};

use lockprobe_core::{HarnessResult, RetryPolicy, ScenarioConfig};

/// Inter-lock delay of the canonical scenario when no config is given
pub const CANONICAL_DELAY: Duration = Duration::from_millis(500);

/// Build the complete CLI command tree.
pub fn build_cli() -> Command {
    Command::new("lockprobe")
        .about("Provoke and observe lock conflicts between concurrent transactions")
        .subcommand_required(false)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .help("Scenario file (default: canonical R1/R2 deadlock)"),
        )
        .arg(
            Arg::new("delay-ms")
                .long("delay-ms")
                .value_name("N")
                .value_parser(value_parser!(u64))
                .help("Pause between lock acquisitions in milliseconds"),
        )
        .arg(
            Arg::new("lock-timeout-ms")
                .long("lock-timeout-ms")
                .value_name("N")
                .value_parser(value_parser!(u64))
                .help("Upper bound on a single lock wait in milliseconds"),
        )
        .arg(
            Arg::new("retries")
                .long("retries")
                .value_name("N")
                .value_parser(value_parser!(usize))
                .help("Re-run conflicted sessions up to N times"),
        )
        .arg(
            Arg::new("retry-delay-ms")
                .long("retry-delay-ms")
                .value_name("N")
                .value_parser(value_parser!(u64))
                .help("Delay before each retry round in milliseconds"),
        )
        .arg(
            Arg::new("repeat")
                .long("repeat")
                .value_name("N")
                .value_parser(value_parser!(u64).range(1..))
                .default_value("1")
                .help("Run the scenario N times and print a summary"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("JSON output mode")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Debug-level logs on stderr")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .short('q')
                .help("Only log errors")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(build_init_config())
}

fn build_init_config() -> Command {
    Command::new("init-config")
        .about("Write the default scenario file (kept if it already exists)")
        .arg(
            Arg::new("file")
                .required(true)
                .value_name("FILE")
                .help("Path to write"),
        )
}

/// Resolve the scenario to run from parsed flags.
///
/// # Errors
///
/// Returns the config file's read, parse, or validation error.
pub fn resolve_scenario(matches: &ArgMatches) -> HarnessResult<ScenarioConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => ScenarioConfig::from_file(Path::new(path))?,
        None => ScenarioConfig::canonical(CANONICAL_DELAY),
    };

    if let Some(&delay) = matches.get_one::<u64>("delay-ms") {
        config.inter_lock_delay_ms = delay;
    }
    if let Some(&timeout) = matches.get_one::<u64>("lock-timeout-ms") {
        config.store.lock_timeout_ms = timeout;
    }
    if let Some(&retries) = matches.get_one::<usize>("retries") {
        let policy = config.retry.take().unwrap_or_default();
        config.retry = Some(policy.with_max_attempts(retries));
    }
    if let Some(&delay) = matches.get_one::<u64>("retry-delay-ms") {
        let policy = config.retry.take().unwrap_or_else(RetryPolicy::new);
        config.retry = Some(policy.with_retry_delay(Duration::from_millis(delay)));
    }

    config.validate()?;
    Ok(config)
}
