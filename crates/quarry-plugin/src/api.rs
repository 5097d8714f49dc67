//! Plugin contract traits
//!
//! Implementations must be Send + Sync for use across async tasks. Format
//! plugin operations are pure and synchronous; storage and integration
//! operations are async.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use quarry_core::{Artifact, ArtifactEvent, ArtifactMetadata, GroupKey, RepositoryEvent};

use crate::error::Result;

/// Opaque per-plugin configuration
pub type PluginConfig = HashMap<String, String>;

/// The closed set of plugin kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    Format,
    Storage,
    Integration,
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginKind::Format => write!(f, "format"),
            PluginKind::Storage => write!(f, "storage"),
            PluginKind::Integration => write!(f, "integration"),
        }
    }
}

/// Base plugin contract
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Unique plugin name within its kind
    fn name(&self) -> &str;

    /// Plugin version
    fn version(&self) -> &str;

    /// Called once at startup with the plugin's scoped configuration
    async fn initialize(&self, config: &PluginConfig) -> Result<()>;

    /// Called once at teardown; bounded by a registry-level timeout
    async fn shutdown(&self) -> Result<()>;
}

/// Format handler: path layout, metadata parsing, index generation
pub trait FormatPlugin: Plugin {
    /// Format name this plugin handles (the capability key)
    fn format(&self) -> &str;

    /// Validate that a path matches the format's layout
    fn validate_path(&self, path: &str) -> Result<()>;

    /// Parse format-specific metadata out of an uploaded payload
    fn parse_metadata(&self, data: &[u8]) -> Result<ArtifactMetadata>;

    /// Generate the index document for a set of artifacts sharing a group key
    fn generate_metadata(&self, artifacts: &[Artifact]) -> Result<Vec<u8>>;

    /// The identity under which an artifact's versions are aggregated
    fn group_key(&self, artifact: &Artifact) -> GroupKey;

    /// Storage path of the index document for a group key
    fn index_path(&self, key: &GroupKey) -> String;

    /// Best-effort artifact version derived from the path layout
    fn version_from_path(&self, path: &str) -> Option<String>;
}

/// Byte-level object storage backend
#[async_trait]
pub trait StoragePlugin: Plugin {
    /// Store an object; atomic relative to readers
    async fn upload(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Fetch an object's bytes
    async fn download(&self, path: &str) -> Result<Vec<u8>>;

    /// Remove an object; `ObjectNotFound` if absent
    async fn delete(&self, path: &str) -> Result<()>;

    /// List object paths under a prefix
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Check whether an object exists
    async fn exists(&self, path: &str) -> Result<bool>;
}

/// Downstream integration notified of lifecycle events
#[async_trait]
pub trait IntegrationPlugin: Plugin {
    async fn on_artifact_uploaded(&self, event: &ArtifactEvent) -> Result<()>;

    async fn on_artifact_deleted(&self, event: &ArtifactEvent) -> Result<()>;

    async fn on_repository_created(&self, event: &RepositoryEvent) -> Result<()>;
}
