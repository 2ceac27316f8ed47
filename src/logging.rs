//! Logging set-up.
//!
//! Components log through `tracing` macros only; this module installs the subscriber once
//! per process. The filter is resolved in this order:
//!
//! 1. `RUST_LOG`, when set
//! 2. the level requested on the command line (`-v` / `-q`)
//! 3. `Logging:Level` from the configuration
//! 4. `info`
//!
//! `Logging:File` adds a second formatting layer that appends plain text (no ANSI) to the
//! given file.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Pick the filter directive from the candidates, first one wins.
pub fn resolve_filter(
    rust_log: Option<&str>,
    cli_level: Option<&str>,
    configured: Option<&str>,
) -> String {
    [rust_log, cli_level, configured]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .unwrap_or("info")
        .to_string()
}

/// Install the global subscriber.
///
/// Calling it a second time is a no-op (the first subscriber stays installed).
pub fn init(filter: &str, file: Option<&Path>) -> Result<()> {
    let env_filter = EnvFilter::try_new(filter)
        .with_context(|| format!("Invalid log filter '{filter}'"))?;

    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let file_layer = match file {
        Some(path) => {
            let log_file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(log_file))
                    .with_ansi(false),
            )
        }
        None => None,
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file_layer)
        .try_init();

    Ok(())
}
