//! Artifact record persistence
//!
//! The pipeline persists an `Artifact` record per stored object. The trait is
//! the narrow save/find/delete interface the pipeline depends on; the
//! in-memory implementation backs tests and embedded use, the SQLite one
//! (see `sqlite`) backs real deployments.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use quarry_core::Artifact;

use crate::error::{PipelineError, Result};

/// Persistence for artifact records
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Insert or replace the record for (repository, path)
    async fn save(&self, artifact: &Artifact) -> Result<()>;

    /// Find the record for (repository, path)
    async fn find(&self, repository_id: &str, path: &str) -> Result<Option<Artifact>>;

    /// Remove and return the record for (repository, path)
    async fn delete(&self, repository_id: &str, path: &str) -> Result<Option<Artifact>>;

    /// All records in a repository, sorted by path
    async fn list(&self, repository_id: &str) -> Result<Vec<Artifact>>;

    /// Remove and return every record in a repository
    async fn delete_all(&self, repository_id: &str) -> Result<Vec<Artifact>>;

    /// Bump the download counter; a missing record is a no-op
    async fn increment_download_count(&self, repository_id: &str, path: &str) -> Result<()>;
}

/// In-memory artifact record store
#[derive(Default)]
pub struct MemoryArtifactStore {
    /// repository id -> path -> record
    records: RwLock<HashMap<String, HashMap<String, Artifact>>>,
    fail_next_save: AtomicBool,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `save` fail, for exercising compensation paths
    pub fn fail_next_save(&self) {
        self.fail_next_save.store(true, Ordering::SeqCst);
    }

    /// Total record count across repositories
    pub fn record_count(&self) -> usize {
        let records = self.records.read().unwrap();
        records.values().map(|m| m.len()).sum()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn save(&self, artifact: &Artifact) -> Result<()> {
        if self.fail_next_save.swap(false, Ordering::SeqCst) {
            return Err(PipelineError::RecordStore {
                message: "injected save failure".to_string(),
            });
        }

        let mut records = self.records.write().unwrap();
        records
            .entry(artifact.repository_id.clone())
            .or_default()
            .insert(artifact.path.clone(), artifact.clone());
        Ok(())
    }

    async fn find(&self, repository_id: &str, path: &str) -> Result<Option<Artifact>> {
        let records = self.records.read().unwrap();
        Ok(records
            .get(repository_id)
            .and_then(|m| m.get(path))
            .cloned())
    }

    async fn delete(&self, repository_id: &str, path: &str) -> Result<Option<Artifact>> {
        let mut records = self.records.write().unwrap();
        Ok(records
            .get_mut(repository_id)
            .and_then(|m| m.remove(path)))
    }

    async fn list(&self, repository_id: &str) -> Result<Vec<Artifact>> {
        let records = self.records.read().unwrap();
        let mut artifacts: Vec<Artifact> = records
            .get(repository_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        artifacts.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(artifacts)
    }

    async fn delete_all(&self, repository_id: &str) -> Result<Vec<Artifact>> {
        let mut records = self.records.write().unwrap();
        let mut artifacts: Vec<Artifact> = records
            .remove(repository_id)
            .map(|m| m.into_values().collect())
            .unwrap_or_default();
        artifacts.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(artifacts)
    }

    async fn increment_download_count(&self, repository_id: &str, path: &str) -> Result<()> {
        let mut records = self.records.write().unwrap();
        if let Some(artifact) = records.get_mut(repository_id).and_then(|m| m.get_mut(path)) {
            artifact.download_count += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use quarry_core::new_id;

    fn sample(repository_id: &str, path: &str) -> Artifact {
        Artifact {
            id: new_id(),
            repository_id: repository_id.to_string(),
            path: path.to_string(),
            name: path.rsplit('/').next().unwrap().to_string(),
            version: "1.0.0".to_string(),
            format: "raw".to_string(),
            size: 3,
            checksum: "sha256:00".to_string(),
            content_type: None,
            metadata: None,
            properties: HashMap::new(),
            download_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_save_and_find() {
        let store = MemoryArtifactStore::new();
        store.save(&sample("r1", "a/b.txt")).await.unwrap();

        let found = store.find("r1", "a/b.txt").await.unwrap().unwrap();
        assert_eq!(found.path, "a/b.txt");
        assert!(store.find("r1", "other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_replaces_by_path() {
        let store = MemoryArtifactStore::new();
        let mut artifact = sample("r1", "a");
        store.save(&artifact).await.unwrap();

        artifact.version = "2.0.0".to_string();
        store.save(&artifact).await.unwrap();

        assert_eq!(store.record_count(), 1);
        let found = store.find("r1", "a").await.unwrap().unwrap();
        assert_eq!(found.version, "2.0.0");
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryArtifactStore::new();
        store.save(&sample("r1", "a")).await.unwrap();

        assert!(store.delete("r1", "a").await.unwrap().is_some());
        assert!(store.delete("r1", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_sorted() {
        let store = MemoryArtifactStore::new();
        store.save(&sample("r1", "b")).await.unwrap();
        store.save(&sample("r1", "a")).await.unwrap();
        store.save(&sample("r2", "c")).await.unwrap();

        let paths: Vec<String> = store
            .list("r1")
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.path)
            .collect();
        assert_eq!(paths, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_delete_all() {
        let store = MemoryArtifactStore::new();
        store.save(&sample("r1", "a")).await.unwrap();
        store.save(&sample("r1", "b")).await.unwrap();

        let removed = store.delete_all("r1").await.unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn test_increment_download_count() {
        let store = MemoryArtifactStore::new();
        store.save(&sample("r1", "a")).await.unwrap();

        store.increment_download_count("r1", "a").await.unwrap();
        store.increment_download_count("r1", "a").await.unwrap();
        // Missing records are a no-op, not an error
        store.increment_download_count("r1", "ghost").await.unwrap();

        let found = store.find("r1", "a").await.unwrap().unwrap();
        assert_eq!(found.download_count, 2);
    }

    #[tokio::test]
    async fn test_fail_next_save() {
        let store = MemoryArtifactStore::new();
        store.fail_next_save();

        assert!(store.save(&sample("r1", "a")).await.is_err());
        // Only the next save fails
        assert!(store.save(&sample("r1", "a")).await.is_ok());
    }
}
