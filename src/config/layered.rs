//! Layered configuration resolution.
//!
//! Layers are applied in order; a later layer overrides keys of an earlier one:
//!
//! 1. built-in defaults (`AppName` from the executable stem, `Environment`, `Http:Listen`)
//! 2. system files: `/etc/<app>.toml` (Unix) and `<user config dir>/<app>/config.toml`
//! 3. `<exe_dir>/<exe_stem>.toml`
//! 4. `appsettings.toml` in the current directory
//! 5. `appsettings.<Environment>.toml` in the current directory
//! 6. an explicit file given with `--config`
//! 7. environment variables prefixed `HOT_` (`HOT_UPDATE__URL` → `Update:URL`)
//! 8. `--set KEY=VALUE` overrides
//!
//! `Version` and `ExecutableFullName` are facts about the running binary and are set
//! after layering. `ServiceName` falls back to `AppName`.

use super::{ConfigReader, normalize_key, parser::parse_layer};
use crate::constants::{DEFAULT_LISTEN, ENV_PREFIX, keys};
use anyhow::{Context, Result, bail};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resolved configuration with the list of sources it was assembled from.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    values: BTreeMap<String, String>,
    search_path: Vec<String>,
    files: Vec<PathBuf>,
}

impl Settings {
    /// Start building layered settings for the running process.
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    /// Insert or replace a value after resolution.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(normalize_key(key), value.into());
    }

    /// Every configuration file consulted, whether it existed or not.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Whether both resolve every key to the same value.
    pub fn same_values(&self, other: &Settings) -> bool {
        self.values == other.values
    }

    fn merge(&mut self, source: String, pairs: BTreeMap<String, String>) {
        debug!("Merging {} key(s) from {}", pairs.len(), source);
        for (key, value) in pairs {
            self.values.insert(normalize_key(&key), value);
        }
    }
}

impl ConfigReader for Settings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(&normalize_key(key)).cloned()
    }

    fn search_path(&self) -> Vec<String> {
        self.search_path.clone()
    }
}

/// Builder for [`Settings`].
///
/// Everything that would otherwise be read from the process (executable path, current
/// directory, environment) can be injected, which keeps tests hermetic.
#[derive(Debug, Clone, Default)]
pub struct SettingsBuilder {
    executable: Option<PathBuf>,
    current_dir: Option<PathBuf>,
    version: Option<String>,
    explicit_file: Option<PathBuf>,
    env_vars: Option<Vec<(String, String)>>,
    overrides: Vec<(String, String)>,
    skip_system_files: bool,
}

impl SettingsBuilder {
    /// Path of the executable (defaults to `std::env::current_exe()`).
    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    /// Directory searched for `appsettings*.toml` (defaults to the process cwd).
    pub fn current_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(path.into());
        self
    }

    /// Application version reported on `/version` (defaults to this crate's version).
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Additional file applied after the discovered ones; it must exist.
    pub fn config_file(mut self, path: Option<PathBuf>) -> Self {
        self.explicit_file = path;
        self
    }

    /// Use these variables instead of the process environment.
    pub fn env_vars<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env_vars = Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    /// `KEY=VALUE` overrides, usually from the command line.
    pub fn overrides(mut self, pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        self.overrides.extend(pairs);
        self
    }

    /// Do not consult `/etc` or the user configuration directory.
    pub fn skip_system_files(mut self, skip: bool) -> Self {
        self.skip_system_files = skip;
        self
    }

    /// Resolve all layers.
    pub fn build(self) -> Result<Settings> {
        let executable = match self.executable {
            Some(path) => path,
            None => std::env::current_exe().context("Failed to determine current executable")?,
        };
        let current_dir = match self.current_dir {
            Some(dir) => dir,
            None => std::env::current_dir().context("Failed to determine current directory")?,
        };
        let exe_stem = executable
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let exe_dir = executable.parent().map(Path::to_path_buf).unwrap_or_default();

        let env_pairs = env_layer(self.env_vars.unwrap_or_else(|| std::env::vars().collect()));
        let override_pairs: BTreeMap<String, String> = self.overrides.into_iter().collect();

        let mut settings = Settings::default();

        // 1. defaults
        let mut defaults = BTreeMap::new();
        defaults.insert(keys::APP_NAME.to_string(), exe_stem.clone());
        defaults.insert(keys::ENVIRONMENT.to_string(), "Production".to_string());
        defaults.insert(keys::HTTP_LISTEN.to_string(), DEFAULT_LISTEN.to_string());
        settings.merge("defaults".to_string(), defaults);
        settings.search_path.push("- built-in defaults".to_string());

        // 2-6. files
        let mut files = Vec::new();
        if !self.skip_system_files {
            #[cfg(unix)]
            files.push(PathBuf::from(format!("/etc/{exe_stem}.toml")));
            if let Some(dir) = dirs::config_dir() {
                files.push(dir.join(&exe_stem).join("config.toml"));
            }
        }
        files.push(exe_dir.join(format!("{exe_stem}.toml")));
        files.push(current_dir.join("appsettings.toml"));

        for file in &files {
            apply_file(&mut settings, file)?;
        }

        // The environment-specific file depends on a value that may itself come from the
        // environment or the command line, so peek at the later layers first.
        let environment = override_pairs
            .iter()
            .chain(env_pairs.iter())
            .find(|(k, _)| normalize_key(k) == normalize_key(keys::ENVIRONMENT))
            .map(|(_, v)| v.clone())
            .or_else(|| settings.get(keys::ENVIRONMENT))
            .unwrap_or_else(|| "Production".to_string());
        apply_file(&mut settings, &current_dir.join(format!("appsettings.{environment}.toml")))?;

        if let Some(explicit) = self.explicit_file {
            let explicit = current_dir.join(explicit);
            if !explicit.is_file() {
                bail!("Configuration file not found: {}", explicit.display());
            }
            apply_file(&mut settings, &explicit)?;
        }

        // 7. environment
        settings.search_path.push(format!("- environment variables started with {ENV_PREFIX}"));
        settings.merge("environment".to_string(), env_pairs);

        // 8. command line
        settings.search_path.push("- command line --set KEY=VALUE".to_string());
        settings.merge("command line".to_string(), override_pairs);

        // Facts about the running binary
        settings.set(
            keys::VERSION,
            self.version.unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
        );
        settings.set(keys::EXECUTABLE_FULL_NAME, executable.display().to_string());
        if settings.get(keys::SERVICE_NAME).is_none_or(|s| s.trim().is_empty()) {
            let app_name = settings.get_or_empty(keys::APP_NAME);
            settings.set(keys::SERVICE_NAME, app_name);
        }

        Ok(settings)
    }
}

fn apply_file(settings: &mut Settings, path: &Path) -> Result<()> {
    settings.files.push(path.to_path_buf());
    match parse_layer(path)? {
        Some(pairs) => {
            settings.search_path.push(format!("- {} (loaded)", path.display()));
            settings.merge(path.display().to_string(), pairs);
        }
        None => settings.search_path.push(format!("- {}", path.display())),
    }
    Ok(())
}

/// Map `HOT_SECTION__KEY=value` to `Section:Key` (case-insensitive downstream).
fn env_layer(vars: Vec<(String, String)>) -> BTreeMap<String, String> {
    vars.into_iter()
        .filter_map(|(name, value)| {
            let stripped = name.strip_prefix(ENV_PREFIX)?;
            if stripped.is_empty() {
                return None;
            }
            Some((stripped.replace("__", ":"), value))
        })
        .collect()
}

/// Parse a `KEY=VALUE` command-line override.
pub(crate) fn parse_override(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => bail!("Invalid override '{raw}', expected KEY=VALUE"),
    }
}
