//! Quarry Plugin System
//!
//! This crate defines the plugin contract consumed by the resolver and the
//! artifact pipeline, plus the registry that owns plugin lifecycle:
//!
//! - **FormatPlugin**: path validation, metadata parsing, index generation
//! - **StoragePlugin**: byte-level object storage (upload/download/delete/list)
//! - **IntegrationPlugin**: lifecycle event callbacks
//!
//! Plugins are a closed set of kind-tagged variants resolved through an
//! explicit capability map; unknown lookups are typed errors. A plugin that
//! fails initialization is marked unusable and excluded from dispatch for the
//! process lifetime.

pub mod api;
pub mod error;
pub mod format;
pub mod integration;
pub mod registry;
pub mod storage;

pub use api::{
    FormatPlugin, IntegrationPlugin, Plugin, PluginConfig, PluginKind, StoragePlugin,
};
pub use error::{PluginError, Result};
pub use format::{MavenFormat, RawFormat};
pub use integration::LogIntegration;
pub use registry::{PluginDescriptor, PluginHandle, PluginRegistry};
pub use storage::{FileStorage, MemoryStorage, StorageCounts};
