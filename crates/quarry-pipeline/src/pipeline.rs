//! Artifact pipeline
//!
//! Orchestrates upload, download, and delete transactions. Writes to the
//! same (repository, path) key are serialized through a per-key lock held
//! across validate, checksum, store, and persist, so concurrent uploads to
//! one path never interleave; the result is last-committed-wins. Metadata
//! regeneration and event publication happen after the write commits and
//! never fail it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use quarry_core::{
    compute_digest, digest_matches, new_id, Artifact, ArtifactEvent, ArtifactEventKind,
};
use quarry_plugin::{FormatPlugin, PluginError, PluginRegistry, StoragePlugin};
use quarry_repo::RepositoryResolver;

use crate::error::{PipelineError, Result};
use crate::events::{Event, EventBus};
use crate::metadata::MetadataGenerator;
use crate::store::ArtifactStore;

/// An upload transaction
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub repository_id: String,
    pub path: String,
    pub payload: Vec<u8>,

    /// Caller-declared digest; the upload fails if it does not match
    pub expected_checksum: Option<String>,

    pub content_type: Option<String>,
    pub properties: HashMap<String, String>,

    /// Actor recorded on the published event
    pub uploader: Option<String>,
}

impl UploadRequest {
    pub fn new(
        repository_id: impl Into<String>,
        path: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            repository_id: repository_id.into(),
            path: path.into(),
            payload,
            expected_checksum: None,
            content_type: None,
            properties: HashMap::new(),
            uploader: None,
        }
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.expected_checksum = Some(checksum.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_uploader(mut self, uploader: impl Into<String>) -> Self {
        self.uploader = Some(uploader.into());
        self
    }
}

/// Bytes resolved for a download, plus the record when one exists
#[derive(Debug, Clone)]
pub struct DownloadedContent {
    pub data: Vec<u8>,
    pub checksum: String,

    /// Repository that served the bytes (a group resolves to the member)
    pub origin: String,

    /// The artifact record, absent for proxy content without one
    pub record: Option<Artifact>,
}

type WriteKey = (String, String);

/// Upload/download/delete orchestration
pub struct ArtifactPipeline {
    resolver: Arc<RepositoryResolver>,
    plugins: Arc<PluginRegistry>,
    store: Arc<dyn ArtifactStore>,
    metadata: Arc<MetadataGenerator>,
    bus: Arc<EventBus>,
    write_locks: Mutex<HashMap<WriteKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl ArtifactPipeline {
    pub fn new(
        resolver: Arc<RepositoryResolver>,
        plugins: Arc<PluginRegistry>,
        store: Arc<dyn ArtifactStore>,
        metadata: Arc<MetadataGenerator>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            resolver,
            plugins,
            store,
            metadata,
            bus,
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Upload an artifact to a hosted repository
    pub async fn upload(&self, request: UploadRequest) -> Result<Artifact> {
        let repo = self.resolver.repository(&request.repository_id)?;
        self.resolver.ensure_writable(&repo, "upload")?;
        let format = self.plugins.lookup_format(&repo.format)?;

        let lock = self.write_lock(&repo.id, &request.path);
        let guard = lock.lock().await;

        format.validate_path(&request.path)?;

        let checksum = compute_digest(&request.payload);
        if let Some(expected) = &request.expected_checksum {
            if !digest_matches(expected, &checksum) {
                return Err(PipelineError::ChecksumMismatch {
                    path: request.path.clone(),
                    expected: expected.clone(),
                    actual: checksum,
                });
            }
        }

        let storage = self.resolver.storage_for(&repo)?;
        storage.upload(&request.path, &request.payload).await?;

        let parsed = format.parse_metadata(&request.payload).ok();
        let existing = self.store.find(&repo.id, &request.path).await?;
        let now = Utc::now();
        let artifact = Artifact {
            id: existing
                .as_ref()
                .map(|a| a.id.clone())
                .unwrap_or_else(new_id),
            repository_id: repo.id.clone(),
            path: request.path.clone(),
            name: request
                .path
                .rsplit('/')
                .next()
                .unwrap_or(&request.path)
                .to_string(),
            version: parsed
                .as_ref()
                .map(|m| m.version.clone())
                .filter(|v| !v.is_empty())
                .or_else(|| format.version_from_path(&request.path))
                .or_else(|| request.properties.get("version").cloned())
                .unwrap_or_default(),
            format: repo.format.clone(),
            size: request.payload.len() as u64,
            checksum: checksum.clone(),
            content_type: request.content_type.clone(),
            metadata: parsed,
            properties: request.properties.clone(),
            download_count: existing.as_ref().map(|a| a.download_count).unwrap_or(0),
            created_at: existing.as_ref().map(|a| a.created_at).unwrap_or(now),
            updated_at: now,
        };

        if let Err(save_error) = self.store.save(&artifact).await {
            // Compensate the already-stored object. If that also fails, the
            // object is orphaned; surface it with identifying data instead
            // of dropping it silently.
            if let Err(delete_error) = storage.delete(&request.path).await {
                return Err(PipelineError::StorageFailure {
                    repository: repo.name.clone(),
                    path: request.path.clone(),
                    message: format!(
                        "record save failed ({save_error}); compensating delete failed \
                         ({delete_error}); stored object is orphaned"
                    ),
                });
            }
            return Err(save_error);
        }
        drop(guard);

        let key = format.group_key(&artifact);
        if let Err(e) = self
            .metadata
            .regenerate(&repo, &format, &storage, key)
            .await
        {
            tracing::warn!(repository = %repo.name, error = %e, "metadata regeneration failed");
        }

        self.bus.publish(Event::Artifact(ArtifactEvent::new(
            ArtifactEventKind::Uploaded,
            artifact.clone(),
            repo.name.clone(),
            request.uploader.clone(),
        )));

        Ok(artifact)
    }

    /// Download an artifact through the resolver
    pub async fn download(&self, repository_id: &str, path: &str) -> Result<DownloadedContent> {
        let resolved = self.resolver.download(repository_id, path).await?;

        // Download counting is best-effort; a failure here never fails the
        // download itself
        let record = match self.store.find(&resolved.origin, path).await {
            Ok(record) => record,
            Err(e) => {
                tracing::debug!(error = %e, "failed to load artifact record");
                None
            }
        };
        if record.is_some() {
            if let Err(e) = self
                .store
                .increment_download_count(&resolved.origin, path)
                .await
            {
                tracing::debug!(error = %e, "failed to increment download count");
            }
        }

        Ok(DownloadedContent {
            data: resolved.data,
            checksum: resolved.checksum,
            origin: resolved.origin,
            record,
        })
    }

    /// Delete an artifact from a hosted repository
    ///
    /// Deleting a nonexistent path is an error, not a silent no-op.
    pub async fn delete(
        &self,
        repository_id: &str,
        path: &str,
        actor: Option<String>,
    ) -> Result<Artifact> {
        let repo = self.resolver.repository(repository_id)?;
        self.resolver.ensure_writable(&repo, "delete")?;
        let format = self.plugins.lookup_format(&repo.format)?;

        let lock = self.write_lock(&repo.id, path);
        let guard = lock.lock().await;

        let existing = self
            .store
            .find(&repo.id, path)
            .await?
            .ok_or_else(|| PipelineError::ArtifactNotFound {
                repository: repo.name.clone(),
                path: path.to_string(),
            })?;

        let storage = self.resolver.storage_for(&repo)?;
        match storage.delete(path).await {
            Ok(()) => {}
            Err(PluginError::ObjectNotFound { .. }) => {
                // The record is authoritative; a missing object is already gone
                tracing::warn!(
                    repository = %repo.name,
                    path,
                    "stored object missing during delete"
                );
            }
            Err(e) => return Err(e.into()),
        }

        let removed = self
            .store
            .delete(&repo.id, path)
            .await?
            .unwrap_or(existing);
        drop(guard);

        let key = format.group_key(&removed);
        if let Err(e) = self
            .metadata
            .regenerate(&repo, &format, &storage, key)
            .await
        {
            tracing::warn!(repository = %repo.name, error = %e, "metadata regeneration failed");
        }

        self.bus.publish(Event::Artifact(ArtifactEvent::new(
            ArtifactEventKind::Deleted,
            removed.clone(),
            repo.name.clone(),
            actor,
        )));

        Ok(removed)
    }

    /// Artifact records of a repository
    pub async fn list_artifacts(&self, repository_id: &str) -> Result<Vec<Artifact>> {
        // Resolve first so an unknown repository is a typed error
        self.resolver.repository(repository_id)?;
        self.store.list(repository_id).await
    }

    /// Paths visible through a repository (group members merged in order)
    pub async fn list_paths(&self, repository_id: &str, prefix: &str) -> Result<Vec<String>> {
        Ok(self.resolver.list(repository_id, prefix).await?)
    }

    fn write_lock(&self, repository_id: &str, path: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.write_locks.lock().unwrap();
        // Drop locks nobody is holding before adding another
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry((repository_id.to_string(), path.to_string()))
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}
