//! Configuration management for RosterCore.
//!
//! This module handles loading and saving configuration to/from a JSON file.
//! The config directory can be customized.
//!
//! Includes sync-related configuration:
//! - api: backend base URL and request timeout
//! - sync: on/off switch, conflict strategies, retry ceiling and backoff,
//!   reload timing

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::conflicts::{ConflictPolicy, ResolutionStrategy};
use crate::error::{RosterError, RosterResult};
use crate::models::EntityKind;

/// Backend connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Sync configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// When off, sync operations and reloads make no network calls
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Strategy for kinds without an entry in `strategies`
    #[serde(default)]
    pub default_strategy: ResolutionStrategy,
    #[serde(default)]
    pub strategies: HashMap<EntityKind, ResolutionStrategy>,
    /// Failed pushes per record before automatic retries stop
    #[serde(default = "default_max_retry_count")]
    pub max_retry_count: u32,
    /// Wait after the first failed push; doubles with every further failure
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
    #[serde(default = "default_reload_debounce_secs")]
    pub reload_debounce_secs: u64,
    /// Longest time the loading indicator stays on for one reload
    #[serde(default = "default_loading_timeout_secs")]
    pub loading_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_max_retry_count() -> u32 {
    5
}

fn default_retry_backoff_secs() -> u64 {
    2
}

fn default_reload_debounce_secs() -> u64 {
    5
}

fn default_loading_timeout_secs() -> u64 {
    10
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_strategy: ResolutionStrategy::default(),
            strategies: HashMap::new(),
            max_retry_count: default_max_retry_count(),
            retry_backoff_secs: default_retry_backoff_secs(),
            reload_debounce_secs: default_reload_debounce_secs(),
            loading_timeout_secs: default_loading_timeout_secs(),
        }
    }
}

impl SyncConfig {
    pub fn conflict_policy(&self) -> ConflictPolicy {
        ConflictPolicy {
            default: self.default_strategy,
            overrides: self.strategies.clone(),
        }
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }

    pub fn reload_debounce(&self) -> Duration {
        Duration::from_secs(self.reload_debounce_secs)
    }

    pub fn loading_timeout(&self) -> Duration {
        Duration::from_secs(self.loading_timeout_secs)
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigData {
    /// Path to the database file
    #[serde(default)]
    pub database_file: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

impl ConfigData {
    fn with_database_in(config_dir: &Path) -> Self {
        Self {
            database_file: config_dir.join("roster.db").to_string_lossy().to_string(),
            api: ApiConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> RosterResult<T> {
    value
        .parse()
        .map_err(|_| RosterError::Config(format!("Invalid value for {}: {}", key, value)))
}

fn parse_strategy(key: &str, value: &str) -> RosterResult<ResolutionStrategy> {
    ResolutionStrategy::from_str(value)
        .ok_or_else(|| RosterError::Config(format!("Invalid value for {}: {}", key, value)))
}

/// Configuration manager
pub struct Config {
    config_dir: PathBuf,
    config_file: PathBuf,
    data: ConfigData,
}

impl Config {
    /// Create a new configuration manager
    ///
    /// On mobile platforms (without the `desktop` feature), `config_dir` is required.
    pub fn new(config_dir: Option<PathBuf>) -> RosterResult<Self> {
        let config_dir = match config_dir {
            Some(dir) => dir,
            None => {
                #[cfg(feature = "desktop")]
                {
                    dirs::config_dir()
                        .unwrap_or_else(|| PathBuf::from("."))
                        .join("rostercore")
                }
                #[cfg(not(feature = "desktop"))]
                {
                    return Err(RosterError::Config(
                        "config_dir is required on mobile platforms".to_string(),
                    ));
                }
            }
        };

        fs::create_dir_all(&config_dir)?;
        let config_file = config_dir.join("config.json");
        let existed = config_file.exists();

        let data = if existed {
            let content = fs::read_to_string(&config_file)?;
            serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(
                    "Unreadable config {}, using defaults: {}",
                    config_file.display(),
                    e
                );
                ConfigData::with_database_in(&config_dir)
            })
        } else {
            ConfigData::with_database_in(&config_dir)
        };

        let config = Self {
            config_dir,
            config_file,
            data,
        };

        // Save default config if it doesn't exist
        if !existed {
            config.save()?;
        }

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> RosterResult<()> {
        let content = serde_json::to_string_pretty(&self.data)?;
        fs::write(&self.config_file, content)?;
        Ok(())
    }

    /// Get the configuration directory path
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn data(&self) -> &ConfigData {
        &self.data
    }

    /// Get the database file path
    pub fn database_file(&self) -> &str {
        &self.data.database_file
    }

    pub fn api_config(&self) -> &ApiConfig {
        &self.data.api
    }

    pub fn base_url(&self) -> &str {
        &self.data.api.base_url
    }

    pub fn set_base_url(&mut self, url: &str) -> RosterResult<()> {
        self.data.api.base_url = url.trim_end_matches('/').to_string();
        self.save()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.data.api.request_timeout_secs)
    }

    /// Get sync configuration
    pub fn sync_config(&self) -> &SyncConfig {
        &self.data.sync
    }

    pub fn is_sync_enabled(&self) -> bool {
        self.data.sync.enabled
    }

    pub fn set_sync_enabled(&mut self, enabled: bool) -> RosterResult<()> {
        self.data.sync.enabled = enabled;
        self.save()
    }

    pub fn conflict_policy(&self) -> ConflictPolicy {
        self.data.sync.conflict_policy()
    }

    /// Override the conflict strategy for one entity kind
    pub fn set_strategy(
        &mut self,
        kind: EntityKind,
        strategy: ResolutionStrategy,
    ) -> RosterResult<()> {
        self.data.sync.strategies.insert(kind, strategy);
        self.save()
    }

    pub fn max_retry_count(&self) -> u32 {
        self.data.sync.max_retry_count
    }

    /// Get a config value by key
    ///
    /// Nested keys use dots (`api.base_url`); per-kind strategies are
    /// `sync.strategy.<kind>`.
    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(kind) = key.strip_prefix("sync.strategy.") {
            let kind = EntityKind::from_str(kind)?;
            return self
                .data
                .sync
                .strategies
                .get(&kind)
                .map(|s| s.as_str().to_string());
        }

        match key {
            "database_file" => Some(self.data.database_file.clone()),
            "api.base_url" => Some(self.data.api.base_url.clone()),
            "api.request_timeout_secs" => Some(self.data.api.request_timeout_secs.to_string()),
            "sync.enabled" => Some(self.data.sync.enabled.to_string()),
            "sync.default_strategy" => Some(self.data.sync.default_strategy.as_str().to_string()),
            "sync.max_retry_count" => Some(self.data.sync.max_retry_count.to_string()),
            "sync.retry_backoff_secs" => Some(self.data.sync.retry_backoff_secs.to_string()),
            "sync.reload_debounce_secs" => Some(self.data.sync.reload_debounce_secs.to_string()),
            "sync.loading_timeout_secs" => Some(self.data.sync.loading_timeout_secs.to_string()),
            _ => None,
        }
    }

    /// Set a config value by key and save
    pub fn set(&mut self, key: &str, value: &str) -> RosterResult<()> {
        if let Some(kind_name) = key.strip_prefix("sync.strategy.") {
            let kind = EntityKind::from_str(kind_name)
                .ok_or_else(|| RosterError::Config(format!("Unknown entity kind: {}", kind_name)))?;
            let strategy = parse_strategy(key, value)?;
            self.data.sync.strategies.insert(kind, strategy);
            return self.save();
        }

        match key {
            "database_file" => self.data.database_file = value.to_string(),
            "api.base_url" => self.data.api.base_url = value.trim_end_matches('/').to_string(),
            "api.request_timeout_secs" => {
                self.data.api.request_timeout_secs = parse_value(key, value)?
            }
            "sync.enabled" => self.data.sync.enabled = parse_value(key, value)?,
            "sync.default_strategy" => {
                self.data.sync.default_strategy = parse_strategy(key, value)?
            }
            "sync.max_retry_count" => self.data.sync.max_retry_count = parse_value(key, value)?,
            "sync.retry_backoff_secs" => {
                self.data.sync.retry_backoff_secs = parse_value(key, value)?
            }
            "sync.reload_debounce_secs" => {
                self.data.sync.reload_debounce_secs = parse_value(key, value)?
            }
            "sync.loading_timeout_secs" => {
                self.data.sync.loading_timeout_secs = parse_value(key, value)?
            }
            _ => return Err(RosterError::Config(format!("Unknown config key: {}", key))),
        }
        self.save()
    }
}
