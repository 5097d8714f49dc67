//! Error types for repository resolution

use thiserror::Error;

use quarry_core::RepositoryType;

/// Repository resolution errors
#[derive(Debug, Error)]
pub enum ResolveError {
    // ============ Catalog Errors ============
    #[error("Repository not found: {id}")]
    RepositoryNotFound { id: String },

    #[error("Repository already exists: {name}")]
    RepositoryExists { name: String },

    #[error("Repository is inactive: {name}")]
    RepositoryInactive { name: String },

    #[error("Group '{group}' references unknown member repository: {member}")]
    UnknownMember { group: String, member: String },

    #[error("Group membership cycle detected: {cycle}")]
    GroupCycleDetected { cycle: String },

    // ============ Dispatch Errors ============
    #[error("Operation '{operation}' is not supported on {repo_type} repository '{repository}'")]
    OperationNotSupported {
        operation: String,
        repository: String,
        repo_type: RepositoryType,
    },

    // ============ Content Errors ============
    #[error("Artifact not found: {path} in repository {repository}")]
    ArtifactNotFound { repository: String, path: String },

    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    // ============ Upstream Errors ============
    #[error("Upstream unavailable: {url} - {message}")]
    UpstreamUnavailable { url: String, message: String },

    // ============ Storage Errors ============
    #[error("Storage failure: {message}")]
    StorageFailure { message: String },

    // ============ Wrapped ============
    #[error(transparent)]
    Core(#[from] quarry_core::CoreError),

    #[error(transparent)]
    Plugin(#[from] quarry_plugin::PluginError),

    #[error("{0}")]
    Other(String),
}

/// Result type for resolution operations
pub type Result<T> = std::result::Result<T, ResolveError>;

impl ResolveError {
    /// Whether the caller may retry the same request
    pub fn is_retryable(&self) -> bool {
        matches!(self, ResolveError::UpstreamUnavailable { .. })
    }
}
