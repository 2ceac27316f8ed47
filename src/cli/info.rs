//! Read-only commands: `version`, `infos`, `helpconfig`.

use crate::config::ConfigReader;
use crate::constants::{ENV_PREFIX, keys};
use crate::diagnostics;
use crate::update::{VersionIdentity, version_document};
use anyhow::Result;
use clap::Args;
use colored::Colorize;

/// Print the version document.
#[derive(Args, Debug)]
pub struct VersionCommand {}

impl VersionCommand {
    pub fn execute(self, settings: &dyn ConfigReader) -> Result<()> {
        let document = version_document(&VersionIdentity::from_config(settings));
        for line in document.lines() {
            println!("{}", line.trim_end_matches('\r'));
        }
        Ok(())
    }
}

/// Print the diagnostics report.
#[derive(Args, Debug)]
pub struct InfosCommand {}

impl InfosCommand {
    pub fn execute(self, settings: &dyn ConfigReader) -> Result<()> {
        print!("{}", diagnostics::infos(settings));
        Ok(())
    }
}

/// List configuration sources and known keys.
#[derive(Args, Debug)]
pub struct HelpconfigCommand {}

const KNOWN_KEYS: &[(&str, &str)] = &[
    (keys::APP_NAME, "application name in /version (default: executable name)"),
    (keys::ENVIRONMENT, "selects appsettings.<Environment>.toml (default: Production)"),
    (keys::SERVICE_NAME, "service name for sc / systemctl (default: AppName)"),
    (keys::UPDATE_URL, "base URL of the instance `autoupdate` pushes to"),
    (keys::UPDATE_SECRET, "shared secret sent in the UpdateSecret header"),
    (keys::UPDATE_ACCEPT_FROM, "allowed networks for /infos and /autoupdate, e.g. 10.0.0.0/8;::1"),
    (keys::HTTP_LISTEN, "listen addresses separated by ';' (default: 127.0.0.1:8080)"),
    (keys::HTTP_IGNORE_PREFIX, "path prefix added by a reverse proxy"),
    (keys::LOGGING_LEVEL, "log filter when RUST_LOG and -v/-q are absent (default: info)"),
    (keys::LOGGING_FILE, "append logs to this file as well"),
];

impl HelpconfigCommand {
    pub fn execute(self, settings: &dyn ConfigReader) -> Result<()> {
        println!("{}", "Configuration sources (later entries win):".bold());
        for source in settings.search_path() {
            println!("{source}");
        }

        println!();
        println!("{}", "Keys:".bold());
        for (key, description) in KNOWN_KEYS {
            let current = settings.get_or_empty(key);
            let shown = if *key == keys::UPDATE_SECRET && !current.is_empty() {
                "********".to_string()
            } else {
                current
            };
            println!("  {:<20} {}", key.cyan(), description);
            if !shown.is_empty() {
                println!("  {:<20} current: {}", "", shown);
            }
        }

        println!();
        println!(
            "Environment variables use the {ENV_PREFIX} prefix with '__' between sections, \
             e.g. {ENV_PREFIX}UPDATE__URL. Command-line overrides: --set Update:URL=..."
        );
        Ok(())
    }
}
