//! hothost - self-hosting infrastructure for long-running services
//!
//! A small library (and companion `hothost` binary) that gives a background service the
//! plumbing it needs to run unattended on Windows and Linux hosts:
//!
//! - layered configuration with a recorded search path
//! - `tracing` based logging to the console and, optionally, a file
//! - an HTTP listener with `/version`, `/infos` and `/autoupdate`
//! - in-place self-update: a newer build pushes itself to a running instance, which swaps
//!   its executable through a generated hand-off script and restarts
//!
//! # Modules
//!
//! - [`config`] - `ConfigReader` trait, layered `Settings`, in-memory configuration
//! - [`core`] - error taxonomy and operator-facing error rendering
//! - [`update`] - version identity, allow-list, upload receiver, hand-off, orchestrator
//! - [`server`] - axum host with the built-in endpoints
//! - [`diagnostics`] - the `/infos` report
//! - [`logging`] - subscriber set-up
//! - [`cli`] - the `hothost` command line
//!
//! # Embedding
//!
//! ```rust,no_run
//! use axum::{Router, routing::get};
//! use hothost::config::{ConfigReader, Settings};
//! use hothost::server::HttpHost;
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let settings: Arc<dyn ConfigReader> = Arc::new(Settings::builder().build()?);
//! let app = Router::new().route("/hello", get(|| async { "hello" }));
//!
//! HttpHost::new(settings).with_routes(app).serve().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! ```toml
//! AppName = "billing"
//!
//! [Update]
//! URL = "http://10.1.0.7:8080"
//! Secret = "change-me"
//! AcceptFrom = ["10.0.0.0/8", "127.0.0.1"]
//!
//! [Http]
//! Listen = "0.0.0.0:8080"
//! ```
//!
//! Every key can also be set through `HOT_SECTION__KEY` environment variables or
//! `--set Section:Key=value` on the command line.

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod diagnostics;
pub mod logging;
pub mod server;
pub mod update;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
