//! Quarry Artifact Pipeline
//!
//! Orchestrates artifact transactions on top of the resolver and the plugin
//! registry:
//!
//! - **ArtifactPipeline**: upload/download/delete with per-key write
//!   serialization, checksum verification, and compensation on partial failure
//! - **MetadataGenerator**: coalesced per-group index regeneration
//! - **EventBus**: bounded, isolated async fan-out to integration plugins
//! - **ArtifactStore**: record persistence (in-memory and SQLite)
//! - **RepositoryService**: repository lifecycle over the catalog
//!
//! Everything is wired together through an explicitly constructed `Quarry`
//! context; there are no process-wide globals.

pub mod context;
pub mod error;
pub mod events;
pub mod metadata;
pub mod pipeline;
pub mod service;
pub mod sqlite;
pub mod store;

pub use context::{Quarry, QuarryBuilder};
pub use error::{PipelineError, Result};
pub use events::{Event, EventBus};
pub use metadata::MetadataGenerator;
pub use pipeline::{ArtifactPipeline, DownloadedContent, UploadRequest};
pub use service::RepositoryService;
pub use sqlite::SqliteArtifactStore;
pub use store::{ArtifactStore, MemoryArtifactStore};
