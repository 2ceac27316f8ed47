//! Global constants used throughout the hothost codebase.
//!
//! Configuration keys, HTTP header names and the timing parameters of the update
//! hand-off live here so the magic values are discoverable in one place.

use std::time::Duration;

/// Header carrying the shared update secret on `PUT /autoupdate`.
pub const UPDATE_SECRET_HEADER: &str = "UpdateSecret";

/// Header consulted before the transport peer address to find the caller's IP.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Number of `/version` polls after uploading a new build.
pub const CONFIRM_POLL_ATTEMPTS: u32 = 10;

/// Delay between two confirmation polls (500ms).
pub fn confirm_poll_interval() -> Duration {
    Duration::from_millis(500)
}

/// Pause the Linux command-line script takes before and after the swap.
///
/// Gives the in-flight HTTP response time to finish writing before the old process
/// disappears.
pub const SCRIPT_SETTLE_DELAY: Duration = Duration::from_millis(300);

/// Upper bound for one `/version` request made by the orchestrator.
pub const VERSION_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Quiet period after a configuration file event before the files are re-read.
pub const RELOAD_DEBOUNCE: Duration = Duration::from_millis(250);

/// Delay between sending the upload confirmation and starting the applier.
pub const RESPONSE_FLUSH_DELAY: Duration = Duration::from_millis(200);

/// Timestamp format appended to archived executables (`yyyy-MM-dd-HHmmss`).
pub const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H%M%S";

/// Default listen address when `Http:Listen` is not configured.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:8080";

/// Prefix of environment variables read by the layered configuration.
pub const ENV_PREFIX: &str = "HOT_";

/// Configuration keys understood by the library.
pub mod keys {
    /// Remote base URL the orchestrator pushes to.
    pub const UPDATE_URL: &str = "Update:URL";
    /// Shared secret for `PUT /autoupdate`.
    pub const UPDATE_SECRET: &str = "Update:Secret";
    /// CIDR allow-list for `/infos` and `/autoupdate`.
    pub const UPDATE_ACCEPT_FROM: &str = "Update:AcceptFrom";
    /// Application name in the identity line.
    pub const APP_NAME: &str = "AppName";
    /// Application version in the identity line.
    pub const VERSION: &str = "Version";
    /// Full path of the running executable.
    pub const EXECUTABLE_FULL_NAME: &str = "ExecutableFullName";
    /// Service name used by `sc` / `systemctl`.
    pub const SERVICE_NAME: &str = "ServiceName";
    /// Environment name (`Production`, `Development`, ...).
    pub const ENVIRONMENT: &str = "Environment";
    /// `;`-separated socket addresses to listen on.
    pub const HTTP_LISTEN: &str = "Http:Listen";
    /// Path prefix stripped by a reverse proxy.
    pub const HTTP_IGNORE_PREFIX: &str = "Http:IgnorePrefix";
    /// Default log filter.
    pub const LOGGING_LEVEL: &str = "Logging:Level";
    /// Optional log file appended to in addition to stderr.
    pub const LOGGING_FILE: &str = "Logging:File";
}
