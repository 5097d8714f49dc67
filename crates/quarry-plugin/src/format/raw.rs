//! Raw format plugin
//!
//! Permissive fallback for opaque blobs. Artifacts are grouped by directory,
//! and the index document for a file lists its stored revisions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quarry_core::{Artifact, ArtifactMetadata, GroupKey};

use crate::api::{FormatPlugin, Plugin, PluginConfig};
use crate::error::{PluginError, Result};

/// Directory used for grouping artifacts stored at the repository root
const ROOT_GROUP: &str = "_root";

/// Opaque blob format handler
#[derive(Debug, Default)]
pub struct RawFormat;

impl RawFormat {
    pub fn new() -> Self {
        Self
    }

    fn split(path: &str) -> (String, String) {
        match path.rsplit_once('/') {
            Some((dir, file)) => (dir.to_string(), file.to_string()),
            None => (ROOT_GROUP.to_string(), path.to_string()),
        }
    }
}

#[async_trait]
impl Plugin for RawFormat {
    fn name(&self) -> &str {
        "raw"
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

impl FormatPlugin for RawFormat {
    fn format(&self) -> &str {
        "raw"
    }

    fn validate_path(&self, path: &str) -> Result<()> {
        let invalid = |reason: &str| PluginError::PathInvalid {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        if path.is_empty() {
            return Err(invalid("path must not be empty"));
        }
        if path.starts_with('/') || path.ends_with('/') {
            return Err(invalid("path must not start or end with '/'"));
        }
        if path.split('/').any(|s| s.is_empty() || s == "." || s == "..") {
            return Err(invalid("empty or dot segments are not allowed"));
        }
        Ok(())
    }

    fn parse_metadata(&self, data: &[u8]) -> Result<ArtifactMetadata> {
        // Raw blobs carry no layout-derived metadata; a JSON descriptor
        // payload is the only recognized shape.
        let metadata: ArtifactMetadata =
            serde_json::from_slice(data).map_err(|e| PluginError::InvalidMetadata {
                message: e.to_string(),
            })?;
        if metadata.group_id.is_empty() || metadata.artifact_id.is_empty() {
            return Err(PluginError::InvalidMetadata {
                message: "groupId and artifactId are required".to_string(),
            });
        }
        Ok(metadata)
    }

    fn generate_metadata(&self, artifacts: &[Artifact]) -> Result<Vec<u8>> {
        let key = artifacts
            .first()
            .map(|a| self.group_key(a))
            .ok_or_else(|| PluginError::InvalidMetadata {
                message: "cannot generate metadata for an empty artifact set".to_string(),
            })?;

        let mut entries: Vec<RawIndexEntry> = artifacts
            .iter()
            .map(|a| RawIndexEntry {
                path: a.path.clone(),
                version: a.version.clone(),
                size: a.size,
                checksum: a.checksum.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        let index = RawIndex {
            directory: key.group_id,
            name: key.artifact_id,
            entries,
            generated: Utc::now(),
        };
        Ok(serde_json::to_vec_pretty(&index)?)
    }

    fn group_key(&self, artifact: &Artifact) -> GroupKey {
        let (dir, file) = Self::split(&artifact.path);
        GroupKey::new(dir, file)
    }

    fn index_path(&self, key: &GroupKey) -> String {
        if key.group_id == ROOT_GROUP {
            format!(".meta/{}.json", key.artifact_id)
        } else {
            format!("{}/.meta/{}.json", key.group_id, key.artifact_id)
        }
    }

    fn version_from_path(&self, _path: &str) -> Option<String> {
        None
    }
}

/// Index document for a raw artifact
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIndex {
    directory: String,
    name: String,
    entries: Vec<RawIndexEntry>,
    generated: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIndexEntry {
    path: String,
    version: String,
    size: u64,
    checksum: String,
}
