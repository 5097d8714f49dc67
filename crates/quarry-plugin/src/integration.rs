//! Built-in integration plugins

use async_trait::async_trait;

use quarry_core::{ArtifactEvent, RepositoryEvent};

use crate::api::{IntegrationPlugin, Plugin, PluginConfig};
use crate::error::Result;

/// Integration that records lifecycle events to the structured log
#[derive(Debug, Default)]
pub struct LogIntegration;

impl LogIntegration {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Plugin for LogIntegration {
    fn name(&self) -> &str {
        "log"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    async fn initialize(&self, _config: &PluginConfig) -> Result<()> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl IntegrationPlugin for LogIntegration {
    async fn on_artifact_uploaded(&self, event: &ArtifactEvent) -> Result<()> {
        tracing::info!(
            repository = %event.repository,
            path = %event.artifact.path,
            size = event.artifact.size,
            "artifact uploaded"
        );
        Ok(())
    }

    async fn on_artifact_deleted(&self, event: &ArtifactEvent) -> Result<()> {
        tracing::info!(
            repository = %event.repository,
            path = %event.artifact.path,
            "artifact deleted"
        );
        Ok(())
    }

    async fn on_repository_created(&self, event: &RepositoryEvent) -> Result<()> {
        tracing::info!(
            repository = %event.repository.name,
            kind = %event.repository.repo_type,
            "repository created"
        );
        Ok(())
    }
}
