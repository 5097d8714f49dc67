//! Local filesystem storage plugin
//!
//! Objects live under a base directory. Uploads write to a temporary file in
//! the target directory and rename it into place, so a concurrent reader
//! sees either the previous object or the new one, never a partial write.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::api::{Plugin, PluginConfig, StoragePlugin};
use crate::error::{PluginError, Result};

/// Filesystem storage plugin rooted at a base path
pub struct FileStorage {
    root: RwLock<PathBuf>,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: RwLock::new(root.into()),
        }
    }

    fn root(&self) -> PathBuf {
        self.root.read().unwrap().clone()
    }

    /// Resolve a logical path under the root, rejecting traversal
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        if path.is_empty() || path.starts_with('/') {
            return Err(PluginError::StorageFailure {
                message: format!("invalid object path: '{path}'"),
            });
        }
        if Path::new(path)
            .components()
            .any(|c| !matches!(c, std::path::Component::Normal(_)))
        {
            return Err(PluginError::StorageFailure {
                message: format!("path traversal rejected: '{path}'"),
            });
        }
        Ok(self.root().join(path))
    }
}

#[async_trait]
impl Plugin for FileStorage {
    fn name(&self) -> &str {
        "file"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    async fn initialize(&self, config: &PluginConfig) -> Result<()> {
        if let Some(root) = config.get("root") {
            *self.root.write().unwrap() = PathBuf::from(root);
        }
        let root = self.root();
        std::fs::create_dir_all(&root)?;
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl StoragePlugin for FileStorage {
    async fn upload(&self, path: &str, data: &[u8]) -> Result<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Write-then-rename keeps the object atomic relative to readers
        let tmp = target.with_extension("part");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &target)?;
        Ok(())
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        let target = self.resolve(path)?;
        match std::fs::read(&target) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PluginError::ObjectNotFound {
                    path: path.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let target = self.resolve(path)?;
        match std::fs::remove_file(&target) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PluginError::ObjectNotFound {
                    path: path.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let root = self.root();
        if !root.exists() {
            return Ok(vec![]);
        }

        let mut paths = Vec::new();
        for entry in walkdir::WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&root)
                .map_err(|e| PluginError::StorageFailure {
                    message: e.to_string(),
                })?
                .to_string_lossy()
                .replace('\\', "/");
            if relative.starts_with(prefix) {
                paths.push(relative);
            }
        }
        paths.sort();
        Ok(paths)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let target = self.resolve(path)?;
        Ok(target.is_file())
    }
}
