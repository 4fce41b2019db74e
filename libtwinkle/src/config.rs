//! Configuration management for Twinklecast

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub tokens: TokenConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Whole-file JSON catalog of product entries
    pub catalog_path: String,
    /// Directory holding quotes.json, texts.json, symbols.json,
    /// deals.json and the pictures/ subdirectory
    pub fragments_dir: String,
    /// Append-oriented JSON-lines job ledger
    pub ledger_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum execution attempts per job. 1 means no automatic retry.
    pub max_attempts: u32,
    /// Delay before a transient failure is retried, in seconds
    pub retry_backoff_secs: u64,
    /// Hard timeout on a single publisher call, in seconds
    pub publish_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            retry_backoff_secs: 300,
            publish_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Long-lived token lifetime before it is considered expired, in seconds
    pub ttl_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        // Graph-style long-lived tokens last about 60 days
        Self {
            ttl_secs: 60 * 24 * 3600,
        }
    }
}

impl Config {
    /// Load configuration from the default location. A missing file
    /// yields the default configuration.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        if !config_path.exists() {
            return Ok(Self::default_config());
        }
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            storage: StorageConfig {
                catalog_path: "~/.local/share/twinklecast/catalog.json".to_string(),
                fragments_dir: "~/.local/share/twinklecast/fragments".to_string(),
                ledger_path: "~/.local/share/twinklecast/jobs.jsonl".to_string(),
            },
            scheduler: SchedulerConfig::default(),
            tokens: TokenConfig::default(),
        }
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("TWINKLE_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("twinklecast").join("config.toml"))
}

/// Expand `~` in a configured path.
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

/// Resolve the data directory path following XDG Base Directory spec
pub fn resolve_data_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

    Ok(data_dir.join("twinklecast"))
}
