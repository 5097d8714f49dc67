//! Configuration management
//!
//! Stores configuration in `~/.config/quarry/config.yaml`. Per-plugin
//! configuration is an opaque key-value map scoped by plugin name.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CoreError, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarryConfig {
    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub proxy: ProxySettings,

    #[serde(default)]
    pub events: EventBusSettings,

    /// Per-plugin opaque configuration: plugin name -> key-value map
    #[serde(default)]
    pub plugins: HashMap<String, HashMap<String, String>>,
}

impl QuarryConfig {
    /// Load configuration from default location
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default configuration path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| CoreError::InvalidConfig {
            message: "Could not determine config directory".to_string(),
        })?;
        Ok(config_dir.join("quarry").join("config.yaml"))
    }

    /// Scoped configuration for a plugin (empty map if absent)
    pub fn plugin_config(&self, name: &str) -> HashMap<String, String> {
        self.plugins.get(name).cloned().unwrap_or_default()
    }
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSettings {
    /// Storage plugin used when a repository does not name one
    #[serde(default = "default_storage_plugin")]
    pub default_plugin: String,

    /// Base path for the file storage plugin
    #[serde(default)]
    pub base_path: Option<PathBuf>,

    /// Deadline for a single storage plugin call
    #[serde(default = "default_storage_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_storage_plugin() -> String {
    "memory".to_string()
}

fn default_storage_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            default_plugin: default_storage_plugin(),
            base_path: None,
            timeout: default_storage_timeout(),
        }
    }
}

/// Proxy cache and upstream settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxySettings {
    /// Age at which a cache entry expires
    #[serde(default = "default_cache_ttl", with = "humantime_serde")]
    pub cache_ttl: Duration,

    /// Total cached bytes before LRU eviction kicks in
    #[serde(default = "default_cache_max_bytes")]
    pub cache_max_bytes: usize,

    /// Deadline for a single upstream fetch
    #[serde(default = "default_upstream_timeout", with = "humantime_serde")]
    pub upstream_timeout: Duration,
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_cache_max_bytes() -> usize {
    256 * 1024 * 1024
}

fn default_upstream_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            cache_ttl: default_cache_ttl(),
            cache_max_bytes: default_cache_max_bytes(),
            upstream_timeout: default_upstream_timeout(),
        }
    }
}

/// Event bus settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBusSettings {
    /// Bounded queue capacity; the newest event is dropped (with a logged
    /// warning) when the queue is full
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Deadline for a single plugin shutdown call
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for EventBusSettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}
