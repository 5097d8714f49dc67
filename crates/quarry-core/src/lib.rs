//! Quarry Core - Core types and utilities for the artifact repository manager
//!
//! This crate provides the foundational types used throughout quarry:
//! - `Repository`: A hosted, proxy, or group repository definition
//! - `Artifact`: A versioned binary stored inside a repository
//! - `ArtifactMetadata` / `GroupKey`: Format-specific index identity
//! - `ArtifactEvent` / `RepositoryEvent`: Lifecycle events for integrations
//! - `QuarryConfig`: Configuration loading and defaults

pub mod checksum;
pub mod config;
pub mod error;
pub mod event;
pub mod model;

pub use checksum::{compute_digest, digest_matches};
pub use config::{EventBusSettings, ProxySettings, QuarryConfig, StorageSettings};
pub use error::{CoreError, Result};
pub use event::{ArtifactEvent, ArtifactEventKind, RepositoryEvent, RepositoryEventKind};
pub use model::{
    Artifact, ArtifactMetadata, GroupKey, Repository, RepositoryStatus, RepositoryType, new_id,
};
