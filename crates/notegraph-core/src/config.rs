//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/notegraph/config.toml)
//! 3. Environment variables (NOTEGRAPH_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::{CacheOptions, DEFAULT_SUBSCRIBER_BUFFER};
use crate::storage::DEFAULT_SNAPSHOT_INTERVAL;

/// Environment variable prefix
const ENV_PREFIX: &str = "NOTEGRAPH";

/// Snapshot file name inside the data directory
const SNAPSHOT_FILE: &str = "graph.snapshot";

/// Keys accepted by `Config::set`
pub const CONFIG_KEYS: &[&str] = &[
    "data_dir",
    "snapshot_interval_secs",
    "subscriber_buffer",
    "coalesce_renames",
    "log_file",
];

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the graph snapshot
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Seconds between snapshot writes
    #[serde(default = "default_snapshot_interval_secs")]
    pub snapshot_interval_secs: u64,

    /// Live events buffered per subscriber
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,

    /// Report placeholder swaps as a single rename event
    #[serde(default)]
    pub coalesce_renames: bool,

    /// Write logs here instead of stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            snapshot_interval_secs: default_snapshot_interval_secs(),
            subscriber_buffer: default_subscriber_buffer(),
            coalesce_renames: false,
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (NOTEGRAPH_DATA_DIR, NOTEGRAPH_SUBSCRIBER_BUFFER, ...)
    /// 2. Config file (~/.config/notegraph/config.toml or NOTEGRAPH_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load from an explicit path when one is given, else the default location
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Values that do not parse are ignored.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_SNAPSHOT_INTERVAL_SECS", ENV_PREFIX)) {
            if let Ok(secs) = val.trim().parse() {
                self.snapshot_interval_secs = secs;
            }
        }

        if let Ok(val) = std::env::var(format!("{}_SUBSCRIBER_BUFFER", ENV_PREFIX)) {
            if let Ok(size) = val.trim().parse() {
                self.subscriber_buffer = size;
            }
        }

        if let Ok(val) = std::env::var(format!("{}_COALESCE_RENAMES", ENV_PREFIX)) {
            self.coalesce_renames = val.eq_ignore_ascii_case("true") || val == "1";
        }

        if let Ok(val) = std::env::var(format!("{}_LOG_FILE", ENV_PREFIX)) {
            self.log_file = if val.is_empty() {
                None
            } else {
                Some(PathBuf::from(val))
            };
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Set a value by key, parsing it as the field's type
    ///
    /// `none` or an empty string clears optional values.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "data_dir" => self.data_dir = PathBuf::from(value),
            "snapshot_interval_secs" => {
                self.snapshot_interval_secs = value
                    .parse()
                    .context("Invalid value for snapshot_interval_secs. Use a number of seconds.")?;
            }
            "subscriber_buffer" => {
                let size: usize = value
                    .parse()
                    .context("Invalid value for subscriber_buffer. Use a positive number.")?;
                if size == 0 {
                    bail!("subscriber_buffer must be at least 1");
                }
                self.subscriber_buffer = size;
            }
            "coalesce_renames" => {
                self.coalesce_renames = value
                    .parse()
                    .context("Invalid value for coalesce_renames. Use 'true' or 'false'.")?;
            }
            "log_file" => {
                self.log_file = if value.is_empty() || value == "none" {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            _ => bail!(
                "Unknown configuration key: '{}'\nValid keys: {}",
                key,
                CONFIG_KEYS.join(", ")
            ),
        }
        Ok(())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with NOTEGRAPH_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("notegraph")
            .join("config.toml")
    }

    /// Get the path to the graph snapshot
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOT_FILE)
    }

    /// Time between snapshot writes
    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs)
    }

    /// Cache tuning derived from this configuration
    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions::from(self)
    }
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("notegraph")
}

fn default_snapshot_interval_secs() -> u64 {
    DEFAULT_SNAPSHOT_INTERVAL.as_secs()
}

fn default_subscriber_buffer() -> usize {
    DEFAULT_SUBSCRIBER_BUFFER
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "NOTEGRAPH_DATA_DIR",
        "NOTEGRAPH_SNAPSHOT_INTERVAL_SECS",
        "NOTEGRAPH_SUBSCRIBER_BUFFER",
        "NOTEGRAPH_COALESCE_RENAMES",
        "NOTEGRAPH_LOG_FILE",
        "NOTEGRAPH_CONFIG",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.data_dir.ends_with("notegraph"));
        assert_eq!(config.snapshot_interval_secs, 30);
        assert_eq!(config.subscriber_buffer, 256);
        assert!(!config.coalesce_renames);
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_file_paths() {
        let config = Config::default();
        assert!(config.snapshot_path().ends_with("graph.snapshot"));
        assert_eq!(config.snapshot_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_cache_options() {
        let config = Config {
            subscriber_buffer: 8,
            coalesce_renames: true,
            ..Config::default()
        };
        let options = config.cache_options();
        assert_eq!(options.subscriber_buffer, 8);
        assert!(options.coalesce_renames);
    }

    #[test]
    fn test_env_override_data_dir() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("NOTEGRAPH_DATA_DIR", "/tmp/notegraph-test");
        config.apply_env_overrides();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/notegraph-test"));
    }

    #[test]
    fn test_env_override_numbers() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("NOTEGRAPH_SNAPSHOT_INTERVAL_SECS", "5");
        env::set_var("NOTEGRAPH_SUBSCRIBER_BUFFER", "64");
        config.apply_env_overrides();
        assert_eq!(config.snapshot_interval_secs, 5);
        assert_eq!(config.subscriber_buffer, 64);

        // Garbage is ignored
        env::set_var("NOTEGRAPH_SUBSCRIBER_BUFFER", "lots");
        config.apply_env_overrides();
        assert_eq!(config.subscriber_buffer, 64);
    }

    #[test]
    fn test_env_override_coalesce_renames() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("NOTEGRAPH_COALESCE_RENAMES", "true");
        config.apply_env_overrides();
        assert!(config.coalesce_renames);

        env::set_var("NOTEGRAPH_COALESCE_RENAMES", "1");
        config.coalesce_renames = false;
        config.apply_env_overrides();
        assert!(config.coalesce_renames);

        env::set_var("NOTEGRAPH_COALESCE_RENAMES", "false");
        config.apply_env_overrides();
        assert!(!config.coalesce_renames);
    }

    #[test]
    fn test_env_override_log_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("NOTEGRAPH_LOG_FILE", "/tmp/notegraph.log");
        config.apply_env_overrides();
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/notegraph.log")));

        // Empty string clears it
        env::set_var("NOTEGRAPH_LOG_FILE", "");
        config.apply_env_overrides();
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_serialization() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = Config {
            data_dir: PathBuf::from("/data/notegraph"),
            snapshot_interval_secs: 10,
            subscriber_buffer: 32,
            coalesce_renames: true,
            log_file: Some(PathBuf::from("/var/log/notegraph.log")),
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("data_dir"));
        assert!(toml_str.contains("subscriber_buffer"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            data_dir = "/custom/data"
            subscriber_buffer = 16
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.subscriber_buffer, 16);
        assert_eq!(config.snapshot_interval_secs, 30);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().join("data");
        env::set_var("NOTEGRAPH_DATA_DIR", &data_dir);

        let config = Config::load_from_path(&temp_dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.data_dir, data_dir);
        assert!(data_dir.exists());
        assert_eq!(config.subscriber_buffer, 256);
    }

    #[test]
    fn test_set_and_save() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let mut config = Config {
            data_dir: temp_dir.path().join("data"),
            ..Config::default()
        };
        config.set("subscriber_buffer", "12").unwrap();
        config.set("coalesce_renames", "true").unwrap();
        config.set("log_file", "/tmp/ng.log").unwrap();
        config.set("log_file", "none").unwrap();
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_with_cli_override(Some(&path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_set_rejects_bad_values() {
        let mut config = Config::default();
        assert!(config.set("subscriber_buffer", "0").is_err());
        assert!(config.set("subscriber_buffer", "many").is_err());
        assert!(config.set("coalesce_renames", "maybe").is_err());

        let err = config.set("sync_url", "ws://x").unwrap_err();
        assert!(err.to_string().contains("Valid keys"));
    }
}
