//! Repository and artifact data model
//!
//! A `Repository` is one of three topologies:
//! - **hosted**: stores artifacts directly, read/write allowed
//! - **proxy**: read-through cache in front of a remote upstream
//! - **group**: ordered virtual aggregation of member repositories, read-only

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{CoreError, Result};

/// Repository topology
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryType {
    /// Stores artifacts directly; all operations allowed
    #[default]
    Hosted,

    /// Read-through cache for a remote upstream; no direct writes
    Proxy,

    /// Ordered aggregation of member repositories; read-only
    Group,
}

impl fmt::Display for RepositoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryType::Hosted => write!(f, "hosted"),
            RepositoryType::Proxy => write!(f, "proxy"),
            RepositoryType::Group => write!(f, "group"),
        }
    }
}

/// Repository status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryStatus {
    #[default]
    Active,
    Inactive,
}

/// Repository definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    /// Unique id (stable across renames)
    pub id: String,

    /// Unique human-facing name
    pub name: String,

    /// Repository topology
    #[serde(rename = "type")]
    pub repo_type: RepositoryType,

    /// Artifact format handled by this repository (maven, npm, raw, ...)
    pub format: String,

    /// Upstream URL (proxy repositories only)
    #[serde(default)]
    pub url: Option<String>,

    /// Ordered member repository ids (group repositories only)
    #[serde(default)]
    pub members: Vec<String>,

    /// Opaque per-repository configuration
    #[serde(default)]
    pub config: HashMap<String, String>,

    #[serde(default)]
    pub status: RepositoryStatus,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Repository {
    /// Create a hosted repository
    pub fn hosted(name: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            repo_type: RepositoryType::Hosted,
            format: format.into(),
            url: None,
            members: Vec::new(),
            config: HashMap::new(),
            status: RepositoryStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    /// Create a proxy repository in front of `url`
    pub fn proxy(
        name: impl Into<String>,
        format: impl Into<String>,
        url: impl Into<String>,
    ) -> Result<Self> {
        let url = url.into();
        url::Url::parse(&url).map_err(|e| CoreError::InvalidUrl {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            id: new_id(),
            name: name.into(),
            repo_type: RepositoryType::Proxy,
            format: format.into(),
            url: Some(url),
            members: Vec::new(),
            config: HashMap::new(),
            status: RepositoryStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
    }

    /// Create a group repository over ordered member ids
    pub fn group(
        name: impl Into<String>,
        format: impl Into<String>,
        members: Vec<String>,
    ) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            repo_type: RepositoryType::Group,
            format: format.into(),
            url: None,
            members,
            config: HashMap::new(),
            status: RepositoryStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    /// Validate shape invariants for the repository's topology
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(CoreError::InvalidRepository {
                name: self.id.clone(),
                reason: "name must not be empty".to_string(),
            });
        }
        if self.format.is_empty() {
            return Err(CoreError::InvalidRepository {
                name: self.name.clone(),
                reason: "format must not be empty".to_string(),
            });
        }

        match self.repo_type {
            RepositoryType::Hosted => {
                if self.url.is_some() {
                    return Err(self.invalid("hosted repositories must not have an upstream url"));
                }
                if !self.members.is_empty() {
                    return Err(self.invalid("hosted repositories must not have members"));
                }
            }
            RepositoryType::Proxy => {
                match &self.url {
                    None => {
                        return Err(self.invalid("proxy repositories require an upstream url"));
                    }
                    Some(url) => {
                        url::Url::parse(url).map_err(|e| CoreError::InvalidUrl {
                            url: url.clone(),
                            reason: e.to_string(),
                        })?;
                    }
                }
                if !self.members.is_empty() {
                    return Err(self.invalid("proxy repositories must not have members"));
                }
            }
            RepositoryType::Group => {
                if self.url.is_some() {
                    return Err(self.invalid("group repositories must not have an upstream url"));
                }
                if self.members.is_empty() {
                    return Err(self.invalid("group repositories require at least one member"));
                }
            }
        }

        Ok(())
    }

    /// Whether writes and deletes are permitted
    pub fn allows_writes(&self) -> bool {
        matches!(self.repo_type, RepositoryType::Hosted)
    }

    pub fn is_active(&self) -> bool {
        self.status == RepositoryStatus::Active
    }

    /// Storage plugin name configured for this repository, if any
    pub fn storage_plugin(&self) -> Option<&str> {
        self.config.get("storage").map(String::as_str)
    }

    fn invalid(&self, reason: &str) -> CoreError {
        CoreError::InvalidRepository {
            name: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

/// A versioned binary stored inside a repository
///
/// Owned exclusively by its repository; destroyed when the repository is
/// deleted or the artifact is explicitly removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: String,
    pub repository_id: String,

    /// Path unique within the repository
    pub path: String,

    pub name: String,
    pub version: String,
    pub format: String,
    pub size: u64,

    /// `sha256:`-prefixed hex digest of the content
    pub checksum: String,

    #[serde(default)]
    pub content_type: Option<String>,

    /// Format-specific metadata parsed from the payload, when recognized
    #[serde(default)]
    pub metadata: Option<ArtifactMetadata>,

    /// Free-form properties attached by the uploader
    #[serde(default)]
    pub properties: HashMap<String, String>,

    /// Incremented only on successful download
    #[serde(default)]
    pub download_count: u64,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Artifact {
    /// File name component of the artifact path
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Format-specific metadata for an artifact
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMetadata {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub packaging: Option<String>,

    #[serde(default)]
    pub keywords: Vec<String>,

    /// Declared dependencies: coordinate -> version constraint
    #[serde(default)]
    pub dependencies: HashMap<String, String>,

    #[serde(default)]
    pub properties: HashMap<String, String>,
}

/// Identity under which artifact versions and metadata are aggregated
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub group_id: String,
    pub artifact_id: String,
}

impl GroupKey {
    pub fn new(group_id: impl Into<String>, artifact_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group_id, self.artifact_id)
    }
}

/// Generate a new random record id (32 hex chars)
pub fn new_id() -> String {
    use rand::Rng;
    let bytes: [u8; 16] = rand::rng().random();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hosted_shape() {
        let repo = Repository::hosted("releases", "maven");
        assert!(repo.validate().is_ok());
        assert!(repo.allows_writes());
        assert!(repo.is_active());
    }

    #[test]
    fn test_proxy_requires_url() {
        let repo = Repository::proxy("central", "maven", "https://repo1.maven.org/maven2").unwrap();
        assert!(repo.validate().is_ok());
        assert!(!repo.allows_writes());

        let mut broken = repo.clone();
        broken.url = None;
        assert!(broken.validate().is_err());
    }

    #[test]
    fn test_proxy_rejects_invalid_url() {
        let result = Repository::proxy("central", "maven", "not a url");
        assert!(matches!(result, Err(CoreError::InvalidUrl { .. })));
    }

    #[test]
    fn test_group_requires_members() {
        let repo = Repository::group("all", "maven", vec!["r1".to_string()]);
        assert!(repo.validate().is_ok());
        assert!(!repo.allows_writes());

        let empty = Repository::group("empty", "maven", vec![]);
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_hosted_rejects_members_and_url() {
        let mut repo = Repository::hosted("releases", "maven");
        repo.members = vec!["other".to_string()];
        assert!(repo.validate().is_err());

        let mut repo = Repository::hosted("releases", "maven");
        repo.url = Some("https://example.com".to_string());
        assert!(repo.validate().is_err());
    }

    #[test]
    fn test_storage_plugin_from_config() {
        let mut repo = Repository::hosted("releases", "maven");
        assert_eq!(repo.storage_plugin(), None);

        repo.config.insert("storage".to_string(), "file".to_string());
        assert_eq!(repo.storage_plugin(), Some("file"));
    }

    #[test]
    fn test_artifact_file_name() {
        let artifact = Artifact {
            id: new_id(),
            repository_id: "r1".to_string(),
            path: "com/acme/app/1.0.0/app-1.0.0.jar".to_string(),
            name: "app".to_string(),
            version: "1.0.0".to_string(),
            format: "maven".to_string(),
            size: 0,
            checksum: String::new(),
            content_type: None,
            metadata: None,
            properties: HashMap::new(),
            download_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(artifact.file_name(), "app-1.0.0.jar");
    }

    #[test]
    fn test_new_id_unique() {
        let a = new_id();
        let b = new_id();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_repository_serialization() {
        let repo = Repository::proxy("central", "maven", "https://repo1.maven.org/maven2").unwrap();
        let yaml = serde_yaml::to_string(&repo).unwrap();
        assert!(yaml.contains("type: proxy"));

        let parsed: Repository = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.repo_type, RepositoryType::Proxy);
        assert_eq!(parsed.url.as_deref(), Some("https://repo1.maven.org/maven2"));
    }
}
