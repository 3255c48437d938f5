// src/logging.rs

//! Logging setup for `ghostctl` using `tracing` + `tracing-subscriber`.
//!
//! Diagnostics go to stderr; stdout is reserved for operator output and the
//! streamed output of compose commands.
//!
//! The filter comes from the `--log-level` flag if given, otherwise from
//! `GHOSTCTL_LOG`, which takes the same directive syntax as `RUST_LOG`
//! (`info`, `ghostctl=debug,reqwest=warn`). Anything else means `warn`.

use anyhow::Result;
use clap::ValueEnum;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "GHOSTCTL_LOG";

const DEFAULT_LEVEL: LevelFilter = LevelFilter::WARN;

/// Initialise global logging subscriber.
///
/// Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = resolve_filter(cli_level, std::env::var(LOG_ENV_VAR).ok().as_deref());

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok(())
}

fn resolve_filter(cli_level: Option<LogLevel>, env_value: Option<&str>) -> EnvFilter {
    let directives = match cli_level {
        // Flag values are the lowercase level names.
        Some(level) => level.to_possible_value().map(|v| v.get_name().to_string()),
        None => env_value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string),
    };

    directives
        .and_then(|d| {
            EnvFilter::builder()
                .with_default_directive(DEFAULT_LEVEL.into())
                .parse(&d)
                .ok()
        })
        .unwrap_or_else(|| {
            EnvFilter::builder()
                .with_default_directive(DEFAULT_LEVEL.into())
                .parse_lossy("")
        })
}
