//! Configuration management for mend.
//!
//! Loads settings from a TOML file or uses defaults. Lookup order:
//! explicit path, `$MEND_CONFIG`, then built-in defaults.
//! `$MEND_DATA_DIR` overrides `data_dir` wherever the config came from.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{MendError, Result};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "MEND_CONFIG";

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "MEND_DATA_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MendConfig {
    /// Directory holding the knowledge store and the stats snapshot
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Knowledge store file name, relative to data_dir
    #[serde(default = "default_db_file")]
    pub db_file: String,

    /// Statistics snapshot file name, relative to data_dir
    #[serde(default = "default_stats_file")]
    pub stats_file: String,

    /// Calls slower than this log a performance warning
    #[serde(default = "default_slow_call_threshold")]
    pub slow_call_threshold_secs: f64,

    /// Occurrence count at which a fault is reported critical
    #[serde(default = "default_critical_threshold")]
    pub critical_threshold: u64,

    /// tracing filter used when $MEND_LOG is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".mend")
}

fn default_db_file() -> String {
    "knowledge.db".to_string()
}

fn default_stats_file() -> String {
    "fault_stats.json".to_string()
}

fn default_slow_call_threshold() -> f64 {
    1.0
}

fn default_critical_threshold() -> u64 {
    5
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for MendConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            db_file: default_db_file(),
            stats_file: default_stats_file(),
            slow_call_threshold_secs: default_slow_call_threshold(),
            critical_threshold: default_critical_threshold(),
            log_filter: default_log_filter(),
        }
    }
}

impl MendConfig {
    /// Defaults rooted at `data_dir`
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Resolve configuration from an optional explicit path and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::from_file(&path)?,
            None => {
                debug!("No config file given, using defaults");
                Self::default()
            }
        };

        if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
            config.data_dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| MendError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config = Self::from_toml(&content)
            .map_err(|e| MendError::Config(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| MendError::Config(e.to_string()))
    }

    fn validate(&self) -> Result<()> {
        if !self.slow_call_threshold_secs.is_finite() || self.slow_call_threshold_secs < 0.0 {
            return Err(MendError::Config(format!(
                "slow_call_threshold_secs must be a non-negative number, got {}",
                self.slow_call_threshold_secs
            )));
        }
        if self.critical_threshold == 0 {
            return Err(MendError::Config(
                "critical_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file)
    }

    pub fn stats_path(&self) -> PathBuf {
        self.data_dir.join(&self.stats_file)
    }

    pub fn slow_call_threshold(&self) -> Duration {
        Duration::from_secs_f64(self.slow_call_threshold_secs)
    }
}
