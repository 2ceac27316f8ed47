use crate::config::ConfigReader;
use crate::update::{HttpTransport, UpdateOrchestrator};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::sync::Arc;

/// Push this executable to the instance configured in `Update:URL`.
///
/// The remote must run the same application (`AppName`) at an older version. After the
/// upload the remote's `/version` is polled until it reports this build.
#[derive(Args, Debug)]
pub struct AutoupdateCommand {}

impl AutoupdateCommand {
    pub async fn execute(self, settings: Arc<dyn ConfigReader>) -> Result<()> {
        let transport = HttpTransport::new()?;
        let report = UpdateOrchestrator::new(settings, transport).run_self_update().await?;

        if report.confirmed {
            println!(
                "{} {} {} -> {} (confirmed after {} poll(s))",
                "Updated".green().bold(),
                report.local.app_name,
                report.remote_before.version,
                report.local.version,
                report.polls
            );
        } else {
            println!(
                "{} {} was uploaded but the remote did not report {} yet",
                "warning:".yellow().bold(),
                report.local.app_name,
                report.local.version
            );
        }
        Ok(())
    }
}
