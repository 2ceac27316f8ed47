//! Command-line interface for hothost.
//!
//! # Available Commands
//!
//! - `serve` - run the HTTP host with the built-in endpoints until Ctrl-C / SIGTERM
//! - `autoupdate` - push this build to the instance at `Update:URL`
//! - `version` - print the version document served on `/version`
//! - `infos` - print the diagnostics report served on `/infos`
//! - `helpconfig` - list configuration sources and keys
//!
//! # Global Options
//!
//! - `--set KEY=VALUE` - override a configuration key (repeatable, before the subcommand)
//! - `--config FILE` - apply an extra TOML file after the discovered ones
//! - `--verbose` / `--quiet` - log level
//!
//! `serve` follows edits to the configuration files while it runs.
//!
//! ```bash
//! hothost --set Http:Listen=0.0.0.0:9000 serve --daemon
//! HOT_UPDATE__URL=http://10.1.0.7:8080 hothost autoupdate
//! hothost helpconfig
//! ```

mod autoupdate;
mod info;
mod serve;

use crate::config::{ConfigReader, ReloadingSettings, Settings, SettingsBuilder};
use crate::constants::keys;
use crate::logging;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

pub use autoupdate::AutoupdateCommand;
pub use info::{HelpconfigCommand, InfosCommand, VersionCommand};
pub use serve::ServeCommand;

/// Options derived from the global flags, applied before any command runs.
///
/// Kept separate from [`Cli`] so tests and embedding applications can build settings
/// without parsing a command line.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Log filter requested on the command line (`None` defers to configuration).
    pub log_level: Option<String>,
    /// Extra configuration file from `--config`.
    pub config_path: Option<PathBuf>,
    /// `--set` overrides in command-line order.
    pub overrides: Vec<(String, String)>,
}

impl CliConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer sources for this invocation.
    pub fn settings_builder(&self) -> SettingsBuilder {
        Settings::builder()
            .config_file(self.config_path.clone())
            .overrides(self.overrides.clone())
    }

    /// Resolve the layered settings for this invocation.
    pub fn load_settings(&self) -> Result<ReloadingSettings> {
        ReloadingSettings::new(self.settings_builder())
    }

    /// Install logging according to `RUST_LOG`, the CLI level and `Logging:*`.
    pub fn init_logging(&self, settings: &dyn ConfigReader) -> Result<()> {
        let rust_log = std::env::var("RUST_LOG").ok();
        let configured = settings.get(keys::LOGGING_LEVEL);
        let filter = logging::resolve_filter(
            rust_log.as_deref(),
            self.log_level.as_deref(),
            configured.as_deref(),
        );
        let file = settings
            .get(keys::LOGGING_FILE)
            .filter(|f| !f.trim().is_empty())
            .map(PathBuf::from);
        logging::init(&filter, file.as_deref())
    }
}

/// Self-hosting toolkit for long-running services.
#[derive(Parser)]
#[command(
    name = "hothost",
    about = "Self-hosting toolkit: layered configuration, HTTP host and in-place self-update",
    version,
    author,
    long_about = "hothost runs a small HTTP host exposing /version, /infos and /autoupdate, and \
                  can push its own executable to a running instance which then replaces itself."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging. Mutually exclusive with `--quiet`.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Extra TOML configuration file applied after the discovered ones.
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override a configuration key, e.g. `--set Update:URL=http://10.1.0.7:8080`.
    ///
    /// Overrides win over files and `HOT_*` environment variables. Repeatable; every
    /// occurrence goes before the subcommand.
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_override)]
    overrides: Vec<(String, String)>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Serve /version, /infos and /autoupdate until interrupted.
    Serve(ServeCommand),
    /// Push this executable to the instance configured in `Update:URL`.
    Autoupdate(AutoupdateCommand),
    /// Print the version document.
    Version(VersionCommand),
    /// Print the diagnostics report.
    Infos(InfosCommand),
    /// Show which configuration sources are read and the keys hothost understands.
    Helpconfig(HelpconfigCommand),
}

impl Cli {
    /// Parse global flags, load settings, initialise logging and run the command.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    /// Translate the global flags into a [`CliConfig`].
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            Some("error".to_string())
        } else {
            None
        };

        CliConfig {
            log_level,
            config_path: self.config.clone(),
            overrides: self.overrides.clone(),
        }
    }

    /// Run with an explicit [`CliConfig`].
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        let settings = Arc::new(config.load_settings()?);
        config.init_logging(settings.as_ref())?;

        match self.command {
            Commands::Serve(cmd) => cmd.execute(settings).await,
            Commands::Autoupdate(cmd) => cmd.execute(settings).await,
            Commands::Version(cmd) => cmd.execute(settings.as_ref()),
            Commands::Infos(cmd) => cmd.execute(settings.as_ref()),
            Commands::Helpconfig(cmd) => cmd.execute(settings.as_ref()),
        }
    }
}

fn parse_override(raw: &str) -> Result<(String, String), String> {
    crate::config::parse_override(raw).map_err(|e| e.to_string())
}
