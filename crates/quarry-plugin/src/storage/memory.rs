//! In-memory storage plugin
//!
//! Stores objects in a process-local map. Writes replace the whole object
//! under a write lock, so readers never observe a partially written object.
//! Operation counters are exposed for test assertions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::api::{Plugin, PluginConfig, StoragePlugin};
use crate::error::{PluginError, Result};

/// Counts of operations performed, for testing assertions
#[derive(Debug, Default, Clone)]
pub struct StorageCounts {
    pub uploads: usize,
    pub downloads: usize,
    pub deletes: usize,
    pub lists: usize,
}

/// In-memory storage plugin
#[derive(Clone)]
pub struct MemoryStorage {
    name: String,
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    operations: Arc<RwLock<StorageCounts>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::named("memory")
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// An independent instance registered under a distinct plugin name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: Arc::new(RwLock::new(HashMap::new())),
            operations: Arc::new(RwLock::new(StorageCounts::default())),
        }
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> StorageCounts {
        self.operations.read().unwrap().clone()
    }

    /// Reset operation counts
    pub fn reset_counts(&self) {
        let mut ops = self.operations.write().unwrap();
        *ops = StorageCounts::default();
    }

    /// Number of stored objects
    pub fn object_count(&self) -> usize {
        self.objects.read().unwrap().len()
    }

    /// Peek at a stored object without counting a download
    pub fn peek(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.read().unwrap().get(path).cloned()
    }
}

#[async_trait]
impl Plugin for MemoryStorage {
    fn name(&self) -> &str {
        &self.name
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
impl StoragePlugin for MemoryStorage {
    async fn upload(&self, path: &str, data: &[u8]) -> Result<()> {
        {
            let mut ops = self.operations.write().unwrap();
            ops.uploads += 1;
        }

        let mut objects = self.objects.write().unwrap();
        objects.insert(path.to_string(), data.to_vec());
        Ok(())
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        {
            let mut ops = self.operations.write().unwrap();
            ops.downloads += 1;
        }

        let objects = self.objects.read().unwrap();
        objects
            .get(path)
            .cloned()
            .ok_or_else(|| PluginError::ObjectNotFound {
                path: path.to_string(),
            })
    }

    async fn delete(&self, path: &str) -> Result<()> {
        {
            let mut ops = self.operations.write().unwrap();
            ops.deletes += 1;
        }

        let mut objects = self.objects.write().unwrap();
        objects
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| PluginError::ObjectNotFound {
                path: path.to_string(),
            })
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        {
            let mut ops = self.operations.write().unwrap();
            ops.lists += 1;
        }

        let objects = self.objects.read().unwrap();
        let mut paths: Vec<String> = objects
            .keys()
            .filter(|p| p.starts_with(prefix))
            .cloned()
            .collect();
        paths.sort();
        Ok(paths)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let objects = self.objects.read().unwrap();
        Ok(objects.contains_key(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_and_download() {
        let storage = MemoryStorage::new();
        storage.upload("a/b.txt", b"hello").await.unwrap();

        let data = storage.download("a/b.txt").await.unwrap();
        assert_eq!(data, b"hello");

        let counts = storage.operation_counts();
        assert_eq!(counts.uploads, 1);
        assert_eq!(counts.downloads, 1);
    }

    #[tokio::test]
    async fn test_download_missing() {
        let storage = MemoryStorage::new();
        let result = storage.download("missing").await;
        assert!(matches!(result, Err(PluginError::ObjectNotFound { .. })));
    }

    #[tokio::test]
    async fn test_delete_missing() {
        let storage = MemoryStorage::new();
        let result = storage.delete("missing").await;
        assert!(matches!(result, Err(PluginError::ObjectNotFound { .. })));
    }

    #[tokio::test]
    async fn test_overwrite_replaces_whole_object() {
        let storage = MemoryStorage::new();
        storage.upload("a", b"first").await.unwrap();
        storage.upload("a", b"second").await.unwrap();

        assert_eq!(storage.download("a").await.unwrap(), b"second");
        assert_eq!(storage.object_count(), 1);
    }

    #[tokio::test]
    async fn test_list_by_prefix() {
        let storage = MemoryStorage::new();
        storage.upload("docs/a.txt", b"a").await.unwrap();
        storage.upload("docs/b.txt", b"b").await.unwrap();
        storage.upload("bin/c.bin", b"c").await.unwrap();

        let docs = storage.list("docs/").await.unwrap();
        assert_eq!(docs, vec!["docs/a.txt", "docs/b.txt"]);

        let all = storage.list("").await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_exists() {
        let storage = MemoryStorage::new();
        assert!(!storage.exists("a").await.unwrap());
        storage.upload("a", b"x").await.unwrap();
        assert!(storage.exists("a").await.unwrap());
    }
}
