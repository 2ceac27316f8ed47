//! hothost CLI entry point
//!
//! Parses the command line, runs the command and renders failures with a suggestion
//! before exiting with status 1.

use anyhow::Result;
use clap::Parser;
use hothost::cli;
use hothost::core::error::{is_fatal_error, user_friendly_error};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            if is_fatal_error(&e) {
                tracing::error!("{:#}", e);
            } else {
                tracing::warn!("{:#}", e);
            }
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            std::process::exit(1);
        }
    }
}
