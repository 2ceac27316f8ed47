//! Plain-text runtime report shared by `GET /infos` and `hothost infos`.

use crate::config::ConfigReader;
use crate::constants::keys;
use crate::update::detect_mode;
use std::fmt::Write;

/// Render the diagnostics report.
pub fn infos(config: &dyn ConfigReader) -> String {
    let mode = match detect_mode() {
        Ok(mode) => mode.to_string(),
        Err(err) => err.to_string(),
    };

    let mut out = String::new();
    let mut line = |label: &str, value: &str| {
        let _ = writeln!(out, "{label:<20}{value}");
    };
    line("Application:", &config.get_or_empty(keys::APP_NAME));
    line("Version:", &config.get_or_empty(keys::VERSION));
    line("Executable:", &config.get_or_empty(keys::EXECUTABLE_FULL_NAME));
    line("Environment:", &config.get_or_empty(keys::ENVIRONMENT));
    line("Service name:", &config.get_or_empty(keys::SERVICE_NAME));
    line(
        "Platform:",
        &format!("{} ({})", std::env::consts::OS, std::env::consts::ARCH),
    );
    line("Deployment mode:", &mode);
    line("Process id:", &std::process::id().to_string());
    line(
        "Library:",
        &format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
    );

    out.push_str("\nConfiguration sources (later entries win):\n");
    for source in config.search_path() {
        out.push_str(&source);
        out.push('\n');
    }
    out
}
