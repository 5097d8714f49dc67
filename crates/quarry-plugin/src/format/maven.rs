//! Maven format plugin
//!
//! Paths follow the Maven 2 repository layout:
//! `group/segments/artifact-id/version/file`. Index documents are JSON
//! renditions of maven-metadata, one per (group-id, artifact-id).

use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use quarry_core::{Artifact, ArtifactMetadata, GroupKey};

use crate::api::{FormatPlugin, Plugin, PluginConfig};
use crate::error::{PluginError, Result};
use crate::format::compare_versions;

static PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+(/[A-Za-z0-9._-]+){3,}$").unwrap());

/// Maven 2 layout format handler
#[derive(Debug, Default)]
pub struct MavenFormat;

impl MavenFormat {
    pub fn new() -> Self {
        Self
    }

    /// Split a layout path into (group-id, artifact-id, version)
    fn coordinates(path: &str) -> Option<(String, String, String)> {
        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() < 4 {
            return None;
        }
        let version = segments[segments.len() - 2].to_string();
        let artifact_id = segments[segments.len() - 3].to_string();
        let group_id = segments[..segments.len() - 3].join(".");
        Some((group_id, artifact_id, version))
    }
}

#[async_trait]
impl Plugin for MavenFormat {
    fn name(&self) -> &str {
        "maven"
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

impl FormatPlugin for MavenFormat {
    fn format(&self) -> &str {
        "maven"
    }

    fn validate_path(&self, path: &str) -> Result<()> {
        if !PATH_RE.is_match(path) {
            return Err(PluginError::PathInvalid {
                path: path.to_string(),
                reason: "expected group/artifact/version/file layout".to_string(),
            });
        }
        if path.split('/').any(|s| s == "." || s == "..") {
            return Err(PluginError::PathInvalid {
                path: path.to_string(),
                reason: "dot segments are not allowed".to_string(),
            });
        }
        Ok(())
    }

    fn parse_metadata(&self, data: &[u8]) -> Result<ArtifactMetadata> {
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

        let mut versions: Vec<String> = artifacts.iter().map(|a| a.version.clone()).collect();
        versions.sort_by(|a, b| compare_versions(a, b));
        versions.dedup();

        let latest = versions.last().cloned().unwrap_or_default();
        let release = versions
            .iter()
            .rev()
            .find(|v| !v.ends_with("-SNAPSHOT"))
            .cloned();

        let index = MavenIndex {
            group_id: key.group_id,
            artifact_id: key.artifact_id,
            latest,
            release,
            versions,
            last_updated: Utc::now().format("%Y%m%d%H%M%S").to_string(),
        };
        Ok(serde_json::to_vec_pretty(&index)?)
    }

    fn group_key(&self, artifact: &Artifact) -> GroupKey {
        if let Some(metadata) = &artifact.metadata {
            return GroupKey::new(metadata.group_id.clone(), metadata.artifact_id.clone());
        }
        match Self::coordinates(&artifact.path) {
            Some((group_id, artifact_id, _)) => GroupKey::new(group_id, artifact_id),
            None => GroupKey::new("", artifact.name.clone()),
        }
    }

    fn index_path(&self, key: &GroupKey) -> String {
        format!(
            "{}/{}/maven-metadata.json",
            key.group_id.replace('.', "/"),
            key.artifact_id
        )
    }

    fn version_from_path(&self, path: &str) -> Option<String> {
        Self::coordinates(path).map(|(_, _, version)| version)
    }
}

/// JSON rendition of maven-metadata for a (group-id, artifact-id)
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MavenIndex {
    group_id: String,
    artifact_id: String,
    latest: String,
    release: Option<String>,
    versions: Vec<String>,
    last_updated: String,
}
