//! Client side of a self-update: push this build to a remote instance.
//!
//! ```text
//! GET  <base>/version      remote identity, must be the same app and strictly older
//! PUT  <base>/autoupdate   this executable, with the UpdateSecret header
//! GET  <base>/version      polled until it reports our version (bounded)
//! ```
//!
//! The remote restarts while we poll, so an unreachable remote is expected after the
//! upload. [`Fetch`] keeps "could not connect" apart from "got an answer" and the poll loop
//! simply tries again.

use super::version::{VersionIdentity, compare_versions};
use crate::config::ConfigReader;
use crate::constants::{
    CONFIRM_POLL_ATTEMPTS, UPDATE_SECRET_HEADER, VERSION_REQUEST_TIMEOUT, confirm_poll_interval,
    keys,
};
use crate::core::HotError;
use std::cmp::Ordering;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tracing::{debug, info, warn};

/// Answer of one HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetch {
    /// No response: connection refused, reset, timed out.
    Unreachable(String),
    /// Any HTTP response.
    Success { status: u16, body: String },
}

impl Fetch {
    fn body_if_ok(&self) -> Option<&str> {
        match self {
            Self::Success { status, body } if (200..300).contains(status) => Some(body),
            _ => None,
        }
    }
}

/// HTTP operations the orchestrator needs.
pub trait UpdateTransport: Send + Sync {
    fn get(&self, url: &str) -> impl Future<Output = Fetch> + Send;

    /// Upload `file` as the request body with the update secret header.
    fn put_file(&self, url: &str, secret: &str, file: File) -> impl Future<Output = Fetch> + Send;
}

/// Waits between confirmation polls.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// [`Sleeper`] backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// [`UpdateTransport`] over `reqwest`.
///
/// `GET` requests are bounded by [`VERSION_REQUEST_TIMEOUT`]; the upload is not, since a
/// large executable on a slow link may legitimately take minutes.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new() -> Result<Self, HotError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HotError::Other {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            request_timeout: VERSION_REQUEST_TIMEOUT,
        })
    }

    /// Override the bound on `GET` requests.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    async fn finish(response: Result<reqwest::Response, reqwest::Error>) -> Fetch {
        let response = match response {
            Ok(response) => response,
            Err(e) => return Fetch::Unreachable(e.to_string()),
        };
        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => Fetch::Success { status, body },
            Err(e) => Fetch::Unreachable(e.to_string()),
        }
    }
}

impl UpdateTransport for HttpTransport {
    async fn get(&self, url: &str) -> Fetch {
        let request = self.client.get(url).timeout(self.request_timeout);
        Self::finish(request.send().await).await
    }

    async fn put_file(&self, url: &str, secret: &str, file: File) -> Fetch {
        let request = self
            .client
            .put(url)
            .header(UPDATE_SECRET_HEADER, secret)
            .body(reqwest::Body::from(file));
        Self::finish(request.send().await).await
    }
}

/// What a completed orchestration observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub local: VersionIdentity,
    pub remote_before: VersionIdentity,
    /// The remote reported the local version before the poll budget ran out.
    pub confirmed: bool,
    /// Number of confirmation polls issued.
    pub polls: u32,
}

/// Drives the push of this build to the instance at `Update:URL`.
pub struct UpdateOrchestrator<T, S = TokioSleeper> {
    config: Arc<dyn ConfigReader>,
    transport: T,
    sleeper: S,
    attempts: u32,
    interval: Duration,
}

impl<T: UpdateTransport> UpdateOrchestrator<T, TokioSleeper> {
    pub fn new(config: Arc<dyn ConfigReader>, transport: T) -> Self {
        Self {
            config,
            transport,
            sleeper: TokioSleeper,
            attempts: CONFIRM_POLL_ATTEMPTS,
            interval: confirm_poll_interval(),
        }
    }
}

impl<T: UpdateTransport, S: Sleeper> UpdateOrchestrator<T, S> {
    /// Replace the sleeper used between polls.
    pub fn with_sleeper<S2: Sleeper>(self, sleeper: S2) -> UpdateOrchestrator<T, S2> {
        UpdateOrchestrator {
            config: self.config,
            transport: self.transport,
            sleeper,
            attempts: self.attempts,
            interval: self.interval,
        }
    }

    /// Override the confirmation poll budget.
    pub fn with_polling(mut self, attempts: u32, interval: Duration) -> Self {
        self.attempts = attempts;
        self.interval = interval;
        self
    }

    /// Run the whole flow once.
    pub async fn run_self_update(&self) -> Result<UpdateReport, HotError> {
        let base = self.config.require(keys::UPDATE_URL)?;
        let base = base.trim().trim_end_matches('/');
        let secret = self.config.require(keys::UPDATE_SECRET)?;
        let executable = self.config.require(keys::EXECUTABLE_FULL_NAME)?;
        let local = VersionIdentity::from_config(self.config.as_ref());

        let version_url = format!("{base}/version");
        let update_url = format!("{base}/autoupdate");

        let remote = self.fetch_remote_identity(&version_url).await?;
        info!("Remote {} runs {} {}", base, remote.app_name, remote.version);

        if remote.app_name != local.app_name {
            return Err(HotError::VersionMismatch {
                reason: format!(
                    "remote application is '{}', this one is '{}'",
                    remote.app_name, local.app_name
                ),
            });
        }

        match compare_versions(Some(local.version.as_str()), Some(remote.version.as_str())) {
            Ordering::Equal => {
                return Err(HotError::VersionMismatch {
                    reason: format!("versions are equal ({})", local.version),
                });
            }
            Ordering::Less => {
                return Err(HotError::VersionMismatch {
                    reason: format!(
                        "remote is newer ({} > {})",
                        remote.version, local.version
                    ),
                });
            }
            Ordering::Greater => {}
        }

        let file = File::open(&executable)
            .await
            .map_err(|e| HotError::io("open executable", &executable, &e))?;
        info!("Uploading {} {} to {}", local.app_name, local.version, update_url);
        match self.transport.put_file(&update_url, &secret, file).await {
            Fetch::Unreachable(reason) => {
                // The remote may drop the connection while it restarts.
                warn!("Upload connection ended without a response: {}", reason);
            }
            Fetch::Success { status: 401, .. } => {
                return Err(HotError::Unauthorized {
                    source_ip: format!("this host (rejected by {base})"),
                });
            }
            Fetch::Success { status, body } if !(200..300).contains(&status) => {
                warn!("Upload answered with HTTP {}: {}", status, body.trim());
            }
            Fetch::Success { body, .. } => debug!("Upload accepted: {}", body.trim()),
        }

        let mut polls = 0;
        while polls < self.attempts {
            self.sleeper.sleep(self.interval).await;
            polls += 1;

            let fetch = self.transport.get(&version_url).await;
            let reported = fetch.body_if_ok().and_then(VersionIdentity::parse_document);
            match reported {
                Some(identity) if identity.version == local.version => {
                    info!("Remote now runs {} {}", identity.app_name, identity.version);
                    return Ok(UpdateReport {
                        local,
                        remote_before: remote,
                        confirmed: true,
                        polls,
                    });
                }
                Some(identity) => debug!("Poll {}: remote still reports {}", polls, identity.version),
                None => debug!("Poll {}: no version answer", polls),
            }
        }

        warn!(
            "Remote did not report version {} after {} polls; check it manually",
            local.version, polls
        );
        Ok(UpdateReport {
            local,
            remote_before: remote,
            confirmed: false,
            polls,
        })
    }

    async fn fetch_remote_identity(&self, url: &str) -> Result<VersionIdentity, HotError> {
        let network = |reason: String| HotError::Network {
            url: url.to_string(),
            reason,
        };

        match self.transport.get(url).await {
            Fetch::Unreachable(reason) => Err(network(reason)),
            Fetch::Success { status, .. } if !(200..300).contains(&status) => {
                Err(network(format!("unexpected HTTP status {status}")))
            }
            Fetch::Success { body, .. } if body.trim().is_empty() => {
                Err(network("empty version document".to_string()))
            }
            Fetch::Success { body, .. } => VersionIdentity::parse_document(&body)
                .ok_or_else(|| network(format!("malformed version document '{}'", body.trim()))),
        }
    }
}
