//! Integration test suite for hothost
//!
//! End-to-end tests that run the HTTP host on an ephemeral loopback port, talk to it with
//! `reqwest`, and drive the `hothost` binary with `assert_cmd`.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **server**: built-in endpoints, allow-list, prefix handling, application routes
//! - **self_update**: orchestrator against a live host, upload and confirmation
//! - **cli**: command-line behaviour, configuration layering, error rendering
//!
//! Uploads are handed to a recording sink so no test ever replaces its own executable.

mod cli;
mod self_update;
mod server;

use hothost::config::MemoryConfig;
use hothost::server::{HttpHost, UpdateSink};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;

/// A host running in the background; dropping it stops the listener.
pub struct RunningHost {
    pub addr: SocketAddr,
    _stop: oneshot::Sender<()>,
}

impl RunningHost {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start a host for `config` on 127.0.0.1 with an ephemeral port.
pub async fn start_host(config: Arc<MemoryConfig>, sink: Arc<dyn UpdateSink>) -> RunningHost {
    hothost::test_utils::init_test_logging(None);

    config.set("Http:Listen", "127.0.0.1:0");
    let bound = HttpHost::new(config).with_update_sink(sink).bind().await.unwrap();
    let addr = bound.local_addrs()[0];

    let (stop, stopped) = oneshot::channel::<()>();
    tokio::spawn(bound.run_until(async move {
        let _ = stopped.await;
    }));

    RunningHost { addr, _stop: stop }
}
