//! Test utilities for hothost
//!
//! Helpers shared by unit tests and the integration suite:
//! - one-time tracing set-up for tests
//! - a staged application directory with a fake executable and configuration
//! - an [`UpdateSink`] that records deliveries instead of replacing the test binary
//!
//! # Example
//!
//! ```rust,no_run
//! use hothost::test_utils::{TestApp, init_test_logging};
//!
//! init_test_logging(None);
//! let app = TestApp::new("MyApp", "1.0.0").unwrap();
//! let config = app.config();
//! ```

use crate::config::MemoryConfig;
use crate::constants::keys;
use crate::server::UpdateSink;
use crate::update::TempExecutable;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once};
use tempfile::TempDir;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, else `RUST_LOG`, else stays silent. Safe to call from every
/// test.
///
/// ```bash
/// RUST_LOG=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

/// A temporary directory holding a fake application executable.
pub struct TestApp {
    pub dir: TempDir,
    pub executable: PathBuf,
    pub app_name: String,
    pub version: String,
}

impl TestApp {
    /// Create `<tmp>/<app_name>` containing placeholder bytes.
    pub fn new(app_name: &str, version: &str) -> std::io::Result<Self> {
        let dir = TempDir::new()?;
        let executable = dir.path().join(app_name);
        std::fs::write(&executable, format!("{app_name} {version} build"))?;
        Ok(Self {
            dir,
            executable,
            app_name: app_name.to_string(),
            version: version.to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Configuration for this app with a secret and a loopback allow-list.
    pub fn config(&self) -> Arc<MemoryConfig> {
        Arc::new(MemoryConfig::from_pairs([
            (keys::APP_NAME, self.app_name.clone()),
            (keys::VERSION, self.version.clone()),
            (keys::EXECUTABLE_FULL_NAME, self.executable.display().to_string()),
            (keys::SERVICE_NAME, self.app_name.clone()),
            (keys::ENVIRONMENT, "Test".to_string()),
            (keys::UPDATE_SECRET, "test-secret".to_string()),
            (keys::UPDATE_ACCEPT_FROM, "127.0.0.1/32;::1".to_string()),
            (keys::HTTP_LISTEN, "127.0.0.1:0".to_string()),
        ]))
    }

    /// Number of entries in the application directory.
    pub fn file_count(&self) -> usize {
        std::fs::read_dir(self.dir.path()).map(|d| d.count()).unwrap_or(0)
    }
}

/// [`UpdateSink`] that only records what it was handed.
#[derive(Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<TempExecutable>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn delivered(&self) -> Vec<TempExecutable> {
        self.delivered.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

impl UpdateSink for RecordingSink {
    fn deliver(&self, staged: TempExecutable) {
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.push(staged);
        }
    }
}
