// src/logging.rs

//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! The filter comes from, in order:
//! 1. the `--log-level` CLI flag, applied to every target;
//! 2. `REPOVISOR_LOG`, either a bare level (`debug`, `warning`) or a full
//!    `EnvFilter` directive list such as `repovisor::registry=debug,info`;
//! 3. `info`.
//!
//! Logs go to STDERR so that console replies on stdout stay readable. Child
//! output is logged under the `repovisor::registry::monitor` target, so it
//! can be silenced on its own with `repovisor::registry::monitor=warn`.

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

/// Environment variable consulted when no CLI level is given.
pub const LOG_ENV_VAR: &str = "REPOVISOR_LOG";

const DEFAULT_DIRECTIVES: &str = "info";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env_value = std::env::var(LOG_ENV_VAR).ok();
    let directives = filter_directives(cli_level, env_value.as_deref());

    let filter = match EnvFilter::try_new(&directives) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("ignoring invalid {LOG_ENV_VAR} value '{directives}': {e}");
            EnvFilter::new(DEFAULT_DIRECTIVES)
        }
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

/// Filter directive string for the given CLI level and `REPOVISOR_LOG` value.
pub fn filter_directives(cli_level: Option<LogLevel>, env_value: Option<&str>) -> String {
    if let Some(lvl) = cli_level {
        return level_directive(lvl.into());
    }
    match env_value.map(str::trim) {
        Some(raw) if !raw.is_empty() => match parse_level_str(raw) {
            Some(level) => level_directive(level),
            None => raw.to_string(),
        },
        _ => DEFAULT_DIRECTIVES.to_string(),
    }
}

fn level_directive(level: tracing::Level) -> String {
    level.to_string().to_lowercase()
}

/// Lenient level parsing for values typed by hand.
pub fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}
