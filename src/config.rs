//! Layered configuration.
//!
//! Sources, later ones winning:
//! - Default values
//! - TOML configuration file (`.subwatch/settings.toml`)
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `SUBWATCH_` and use double
//! underscores to separate nested levels:
//! - `SUBWATCH_WATCHER__RESCAN_INTERVAL_MS=1000` sets `watcher.rescan_interval_ms`
//! - `SUBWATCH_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::watcher::WatchError;

/// Directory searched for in the current directory and its ancestors.
pub const CONFIG_DIR: &str = ".subwatch";
const CONFIG_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "SUBWATCH_";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Registry and backend behaviour
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Log levels
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WatcherConfig {
    /// How often missing paths are retried, in milliseconds. 0 disables
    /// background rescanning.
    #[serde(default = "default_rescan_interval_ms")]
    pub rescan_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Level for everything not listed in `modules`
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `subwatch = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_version() -> u32 {
    1
}
fn default_rescan_interval_ms() -> u64 {
    4000
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            watcher: WatcherConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            rescan_interval_ms: default_rescan_interval_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl WatcherConfig {
    /// Rescan interval, `None` when background rescanning is off.
    pub fn rescan_interval(&self) -> Option<Duration> {
        (self.rescan_interval_ms > 0).then(|| Duration::from_millis(self.rescan_interval_ms))
    }
}

impl Settings {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, WatchError> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, plus environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, WatchError> {
        let settings = Self::figment(path.as_ref()).extract()?;
        Ok(settings)
    }

    fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            // Double underscore separates nested levels; single underscores
            // stay part of the field name.
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Find `.subwatch/settings.toml` from the current directory upwards.
    pub fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join(CONFIG_FILE));
            }
        }

        None
    }

    /// Save current configuration to file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.watcher.rescan_interval_ms, 4000);
        assert_eq!(
            settings.watcher.rescan_interval(),
            Some(Duration::from_millis(4000))
        );
        assert_eq!(settings.logging.default, "warn");
    }

    #[test]
    fn test_zero_interval_disables_rescan() {
        let config = WatcherConfig {
            rescan_interval_ms: 0,
        };
        assert_eq!(config.rescan_interval(), None);
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(
            &path,
            r#"
[watcher]
rescan_interval_ms = 250

[logging]
default = "info"

[logging.modules]
subwatch = "debug"
"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.watcher.rescan_interval_ms, 250);
        assert_eq!(settings.logging.default, "info");
        assert_eq!(
            settings.logging.modules.get("subwatch").map(String::as_str),
            Some("debug")
        );
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load_from(dir.path().join("nope.toml")).unwrap();
        assert_eq!(settings.watcher, WatcherConfig::default());
    }

    #[test]
    fn test_save_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".subwatch/settings.toml");

        let mut settings = Settings::default();
        settings.watcher.rescan_interval_ms = 1234;
        settings.save(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.watcher.rescan_interval_ms, 1234);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "[watcher]\nrescan_interval_ms = \"soon\"\n").unwrap();

        let err = Settings::load_from(&path).unwrap_err();
        assert!(matches!(err, WatchError::Config { .. }));
    }
}
