//! # casefs-config
//!
//! Configuration management for casefs.
//!
//! Loads configuration from:
//! 1. `~/.casefs/config.toml` (global)
//! 2. `.casefs/config.toml` (project-local, overrides global key by key)
//! 3. Environment variables (highest priority short of command-line flags)

pub mod logging;
pub mod path;
pub mod testing;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub use logging::{init_logging, Component, LogLevel};

/// Environment variable overriding `report.path`.
pub const ENV_REPORT_FILE: &str = "CASEFS_REPORT_FILE";
/// Environment variable overriding `log.file`.
pub const ENV_LOG_FILE: &str = "CASEFS_LOG_FILE";
/// Environment variable overriding `log.level`.
pub const ENV_LOG_LEVEL: &str = "CASEFS_LOG_LEVEL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mount: MountConfig,
    pub report: ReportConfig,
    pub log: LogConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let global = Self::global_config_path();
        let mut config = Self::load_from(global.as_deref(), Some(Path::new(Self::PROJECT_PATH)))?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Project-local config path, relative to the working directory.
    pub const PROJECT_PATH: &'static str = ".casefs/config.toml";

    /// Global config path: ~/.casefs/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".casefs/config.toml"))
    }

    /// Layer the given files over the defaults. Missing files are skipped.
    pub fn load_from(global: Option<&Path>, project: Option<&Path>) -> Result<Self, ConfigError> {
        let mut merged = toml::Table::new();
        for path in [global, project].into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            debug!("Loading config from {:?}", path);
            let contents = std::fs::read_to_string(path)?;
            let layer: toml::Table = toml::from_str(&contents)?;
            merge_tables(&mut merged, layer);
        }
        Ok(toml::Value::Table(merged).try_into()?)
    }

    /// Read a single config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Apply environment variable overrides through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(ENV_REPORT_FILE).filter(|v| !v.is_empty()) {
            self.report.path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup(ENV_LOG_FILE).filter(|v| !v.is_empty()) {
            self.log.file = Some(PathBuf::from(path));
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            if level.parse::<LogLevel>().is_ok() {
                self.log.level = level;
            }
        }
    }

    /// Configured log level, falling back to `info` for unknown names.
    pub fn log_level(&self) -> LogLevel {
        self.log.level.parse().unwrap_or(LogLevel::Info)
    }

    /// Generate default config TOML string
    pub fn default_toml() -> Result<String, ConfigError> {
        Config::default().to_toml()
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn merge_tables(base: &mut toml::Table, layer: toml::Table) {
    for (key, value) in layer {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming)
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Mount options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Filesystem name shown in the mount table
    pub fsname: String,
    /// Let users other than the mounting user access the filesystem
    pub allow_other: bool,
    /// Ask the kernel to unmount when the process exits
    pub auto_unmount: bool,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            fsname: "casefs".to_string(),
            allow_other: false,
            auto_unmount: false,
        }
    }
}

/// Match report output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Where to write the report at shutdown (None = reporting disabled)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Indent the JSON output
    pub pretty: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path: None,
            pretty: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// error, warn, info, debug or trace
    pub level: String,
    /// Append log lines here instead of stderr
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}
