//! Error types for pipeline operations

use thiserror::Error;

/// Artifact pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    // ============ Pipeline Errors ============
    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Artifact not found: {path} in repository {repository}")]
    ArtifactNotFound { repository: String, path: String },

    /// A write left storage and records inconsistent; carries enough
    /// identifying data for out-of-band reconciliation
    #[error("Storage failure for {path} in repository {repository}: {message}")]
    StorageFailure {
        repository: String,
        path: String,
        message: String,
    },

    #[error("Metadata regeneration failed for {group} in repository {repository}: {message}")]
    MetadataRegenerationFailure {
        repository: String,
        group: String,
        message: String,
    },

    // ============ Record Store Errors ============
    #[error("Record store error: {message}")]
    RecordStore { message: String },

    // ============ Wrapped ============
    #[error(transparent)]
    Resolve(#[from] quarry_repo::ResolveError),

    #[error(transparent)]
    Plugin(#[from] quarry_plugin::PluginError),

    #[error(transparent)]
    Core(#[from] quarry_core::CoreError),
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

impl From<rusqlite::Error> for PipelineError {
    fn from(e: rusqlite::Error) -> Self {
        PipelineError::RecordStore {
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::RecordStore {
            message: e.to_string(),
        }
    }
}
