//! Configuration that follows its files.
//!
//! [`ReloadingSettings`] keeps the [`SettingsBuilder`] it was created from and rebuilds
//! every layer when asked. [`ReloadingSettings::watch`] asks whenever a `.toml` file changes
//! in one of the directories consulted at start-up. A rebuild that fails (half-written file,
//! syntax error) keeps the previous values.
//!
//! Readers see a consistent snapshot: values are swapped under a write lock, then the change
//! counter returned by [`ConfigReader::changes`] is bumped.

use super::{ConfigReader, Settings, SettingsBuilder};
use crate::constants::RELOAD_DEBOUNCE;
use anyhow::{Result, anyhow};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Layered settings rebuilt from their sources on demand.
#[derive(Debug)]
pub struct ReloadingSettings {
    builder: SettingsBuilder,
    current: RwLock<Settings>,
    changes: watch::Sender<u64>,
}

impl ReloadingSettings {
    /// Resolve `builder` once; later reloads replay it.
    pub fn new(builder: SettingsBuilder) -> Result<Self> {
        let current = builder.clone().build()?;
        Ok(Self {
            builder,
            current: RwLock::new(current),
            changes: watch::channel(0).0,
        })
    }

    /// Rebuild every layer. Returns whether any value changed.
    pub fn reload(&self) -> Result<bool> {
        let fresh = self.builder.clone().build()?;
        let mut current = self
            .current
            .write()
            .map_err(|_| anyhow!("configuration lock poisoned"))?;
        let changed = !current.same_values(&fresh);
        *current = fresh;
        drop(current);

        if changed {
            self.changes.send_modify(|generation| *generation += 1);
        }
        Ok(changed)
    }

    /// Configuration files consulted by the current snapshot.
    pub fn files(&self) -> Vec<PathBuf> {
        self.current
            .read()
            .map(|settings| settings.files().to_vec())
            .unwrap_or_default()
    }

    /// Reload whenever a `.toml` file changes next to one of [`Self::files`].
    ///
    /// Must be called inside a tokio runtime. Watching stops when the returned
    /// [`ConfigWatcher`] is dropped.
    pub fn watch(self: &Arc<Self>) -> Result<ConfigWatcher> {
        let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if matches!(event.kind, EventKind::Access(_)) {
                    return;
                }
                for path in event.paths {
                    if path.extension().is_some_and(|ext| ext == "toml") {
                        let _ = tx.send(path);
                    }
                }
            }
            Err(e) => warn!("Configuration watch error: {}", e),
        })?;

        let directories: BTreeSet<PathBuf> = self
            .files()
            .iter()
            .filter_map(|file| file.parent().map(PathBuf::from))
            .filter(|dir| dir.is_dir())
            .collect();
        for dir in &directories {
            match watcher.watch(dir, RecursiveMode::NonRecursive) {
                Ok(()) => debug!("Watching {} for configuration changes", dir.display()),
                Err(e) => warn!("Cannot watch {}: {}", dir.display(), e),
            }
        }

        let settings = Arc::clone(self);
        let task = tokio::spawn(async move {
            while let Some(path) = rx.recv().await {
                // Editors save in several steps; settle before reading.
                tokio::time::sleep(RELOAD_DEBOUNCE).await;
                while rx.try_recv().is_ok() {}

                match settings.reload() {
                    Ok(true) => info!("Configuration reloaded after change to {}", path.display()),
                    Ok(false) => debug!("{} changed without affecting any value", path.display()),
                    Err(e) => warn!("Keeping previous configuration: {:#}", e),
                }
            }
        });

        Ok(ConfigWatcher {
            _watcher: watcher,
            task,
        })
    }
}

impl ConfigReader for ReloadingSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.current.read().ok()?.get(key)
    }

    fn search_path(&self) -> Vec<String> {
        self.current
            .read()
            .map(|settings| settings.search_path())
            .unwrap_or_default()
    }

    fn changes(&self) -> Option<watch::Receiver<u64>> {
        Some(self.changes.subscribe())
    }
}

/// Keeps a file watcher alive.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}
