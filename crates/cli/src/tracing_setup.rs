//! Tracing subscriber initialization for the lockprobe binary.
//!
//! # Priority (highest to lowest)
//!
//! 1. `LOCKPROBE_LOG` env var (per-target directives, e.g. `lockprobe::store=trace`)
//! 2. `RUST_LOG` env var
//! 3. CLI flags (`-v` -> debug, `-q` -> error)
//! 4. Default level: `warn`

use tracing::Level;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Project-specific filter variable
pub const LOG_ENV_VAR: &str = "LOCKPROBE_LOG";

/// Verbosity level derived from CLI flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// `--quiet` / `-q`: only errors.
    Quiet,
    /// Default: warnings and above.
    Normal,
    /// `--verbose` / `-v`: debug-level output.
    Verbose,
}

impl Verbosity {
    /// Determine verbosity from the parsed CLI flags; verbose wins.
    pub const fn from_flags(verbose: bool, quiet: bool) -> Self {
        if verbose {
            Self::Verbose
        } else if quiet {
            Self::Quiet
        } else {
            Self::Normal
        }
    }

    /// Map to a default `tracing::Level`.
    pub const fn default_level(self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::WARN,
            Self::Verbose => Level::DEBUG,
        }
    }
}

/// Install the global subscriber writing to stderr.
///
/// Call once, before the scenario is resolved.
pub fn init_subscriber(verbosity: Verbosity) {
    let use_ansi = std::io::IsTerminal::is_terminal(&std::io::stderr());

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(use_ansi)
        .with_target(true)
        .with_level(true);

    // Session threads are named, which is what matters when reading a
    // deadlock trace.
    if verbosity == Verbosity::Verbose {
        tracing_subscriber::registry()
            .with(build_env_filter(verbosity))
            .with(fmt_layer.with_thread_names(true).with_timer(fmt::time::uptime()))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(build_env_filter(verbosity))
            .with(fmt_layer.without_time().compact())
            .init();
    }
}

fn build_env_filter(verbosity: Verbosity) -> EnvFilter {
    if let Ok(directives) = std::env::var(LOG_ENV_VAR) {
        if let Ok(filter) = EnvFilter::try_new(&directives) {
            return filter;
        }
    }

    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let level = verbosity.default_level();
    EnvFilter::try_new(level.as_str()).unwrap_or_else(|_| EnvFilter::new("warn"))
}
