use crate::config::{ConfigReader, ReloadingSettings};
use crate::constants::keys;
use crate::server::{HttpHost, listen_addresses};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::sync::Arc;
use tracing::info;

/// Run the HTTP host.
#[derive(Args, Debug)]
pub struct ServeCommand {
    /// Run unattended: no console banner, logs only (use under systemd or a Windows service).
    #[arg(long)]
    pub daemon: bool,
}

impl ServeCommand {
    pub async fn execute(self, settings: Arc<ReloadingSettings>) -> Result<()> {
        let app = settings.get_or_empty(keys::APP_NAME);
        let version = settings.get_or_empty(keys::VERSION);

        if !self.daemon {
            println!("{} {} {}", "Starting".green().bold(), app, version);
            for addr in listen_addresses(&settings.get_or_empty(keys::HTTP_LISTEN)) {
                println!("  {} http://{}", "listening on".dimmed(), addr);
            }
            println!("  {}", "press Ctrl-C to stop".dimmed());
        }

        info!("Starting {} {}", app, version);
        let _watcher = settings.watch()?;
        HttpHost::new(settings).serve().await?;
        info!("Stopped {} {}", app, version);
        Ok(())
    }
}
