//! Error types for plugin operations

use thiserror::Error;

use crate::api::PluginKind;

/// Plugin operation errors
#[derive(Debug, Error)]
pub enum PluginError {
    // ============ Registry Errors ============
    #[error("Plugin name collision: {kind} plugin '{name}' is already registered")]
    PluginNameCollision { kind: PluginKind, name: String },

    #[error("Plugin not found: {kind} plugin '{name}'")]
    PluginNotFound { kind: PluginKind, name: String },

    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    // ============ Lifecycle Errors ============
    #[error("Plugin '{name}' failed to initialize: {message}")]
    InitializationFailed { name: String, message: String },

    #[error("Plugin '{name}' failed to shut down: {message}")]
    ShutdownFailed { name: String, message: String },

    // ============ Format Errors ============
    #[error("Invalid path '{path}': {reason}")]
    PathInvalid { path: String, reason: String },

    #[error("Invalid metadata: {message}")]
    InvalidMetadata { message: String },

    // ============ Storage Errors ============
    #[error("Object not found: {path}")]
    ObjectNotFound { path: String },

    #[error("Storage failure: {message}")]
    StorageFailure { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for plugin operations
pub type Result<T> = std::result::Result<T, PluginError>;

impl From<serde_json::Error> for PluginError {
    fn from(e: serde_json::Error) -> Self {
        PluginError::Serialization(e.to_string())
    }
}
