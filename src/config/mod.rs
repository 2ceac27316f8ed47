//! Configuration for hothost components.
//!
//! Components never reach for a global configuration object. Each one receives an
//! `Arc<dyn ConfigReader>` at construction and looks keys up through it. Two readers
//! ship with the crate:
//!
//! - [`Settings`]: the layered configuration assembled at start-up by
//!   [`SettingsBuilder`] (defaults, TOML files, `HOT_` environment variables and
//!   `--set` overrides).
//! - [`ReloadingSettings`]: the same layers, rebuilt when one of the files changes.
//! - [`MemoryConfig`]: a plain in-memory map for embedding applications and tests.
//!
//! Keys are `Section:Key` strings and are matched case-insensitively. Readers whose values
//! can change at runtime hand out a change counter through [`ConfigReader::changes`].

mod layered;
mod parser;
mod reload;

pub use layered::{Settings, SettingsBuilder};
pub(crate) use layered::parse_override;
pub use parser::{parse_layer, parse_layer_str};
pub use reload::{ConfigWatcher, ReloadingSettings};

use crate::core::HotError;
use std::collections::BTreeMap;
use std::sync::RwLock;
use tokio::sync::watch;

/// Read access to configuration values.
pub trait ConfigReader: Send + Sync {
    /// Raw lookup. `None` when no layer defines the key.
    fn get(&self, key: &str) -> Option<String>;

    /// Value or an empty string.
    fn get_or_empty(&self, key: &str) -> String {
        self.get(key).unwrap_or_default()
    }

    /// Non-blank value or a [`HotError::Configuration`] naming the key.
    fn require(&self, key: &str) -> Result<String, HotError> {
        match self.get(key) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(HotError::missing_key(key)),
        }
    }

    /// Human readable list of the sources consulted, most general first.
    fn search_path(&self) -> Vec<String> {
        Vec::new()
    }

    /// Counter bumped whenever values change. `None` for readers that never change.
    fn changes(&self) -> Option<watch::Receiver<u64>> {
        None
    }
}

/// In-memory configuration.
///
/// ```rust
/// use hothost::config::{ConfigReader, MemoryConfig};
///
/// let config = MemoryConfig::from_pairs([("Update:URL", "http://10.0.0.2:8080")]);
/// assert_eq!(config.get("update:url").as_deref(), Some("http://10.0.0.2:8080"));
/// ```
#[derive(Debug)]
pub struct MemoryConfig {
    values: RwLock<BTreeMap<String, String>>,
    changes: watch::Sender<u64>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self::from_pairs(Vec::<(String, String)>::new())
    }
}

impl MemoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let values = pairs.into_iter().map(|(k, v)| (normalize_key(k.as_ref()), v.into())).collect();
        Self {
            values: RwLock::new(values),
            changes: watch::channel(0).0,
        }
    }

    /// Insert or replace a value and notify [`ConfigReader::changes`] subscribers.
    pub fn set(&self, key: &str, value: impl Into<String>) {
        if let Ok(mut values) = self.values.write() {
            values.insert(normalize_key(key), value.into());
        }
        self.changes.send_modify(|generation| *generation += 1);
    }
}

impl ConfigReader for MemoryConfig {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().ok()?.get(&normalize_key(key)).cloned()
    }

    fn search_path(&self) -> Vec<String> {
        vec!["- in-memory configuration".to_string()]
    }

    fn changes(&self) -> Option<watch::Receiver<u64>> {
        Some(self.changes.subscribe())
    }
}

pub(crate) fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_lowercase()
}
