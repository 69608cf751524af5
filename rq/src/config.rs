//! Configuration for requeue

use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::runtime::RuntimeConfig;
use crate::scheduler::Settings;
use crate::transport::HttpConfig;

/// Project-local config file name
pub const LOCAL_CONFIG: &str = ".requeue.yml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Global scheduler settings
    #[serde(default)]
    pub scheduler: Settings,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub http: HttpConfig,
}

impl Config {
    /// Load config from an explicit path, else the first default location found,
    /// else defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        debug!(?path, "Config::load: called");
        if let Some(config_path) = path {
            debug!("Config::load: explicit path");
            return Self::load_file(config_path);
        }

        for candidate in Self::default_paths() {
            if candidate.exists() {
                debug!(path = %candidate.display(), "Config::load: found default config");
                return Self::load_file(&candidate);
            }
        }

        debug!("Config::load: no config file, using defaults");
        Ok(Self::default())
    }

    /// Read just the log level, ignoring any error
    ///
    /// Runs before logging is set up, so failures are silent; the full load
    /// reports them afterwards.
    pub fn load_log_level(path: Option<&PathBuf>) -> Option<String> {
        Self::load(path).ok().and_then(|c| c.log_level)
    }

    /// Default config locations, in lookup order
    pub fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("requeue").join("requeue.yml"));
        }
        paths
    }

    fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .context(format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config")
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_yaml()?).context(format!("Failed to write config file: {}", path.display()))
    }
}
