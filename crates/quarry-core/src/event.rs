//! Lifecycle events delivered to integration plugins
//!
//! Events are immutable, JSON-serializable, and consumed once per subscriber.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::{Artifact, Repository};

/// What happened to an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactEventKind {
    Uploaded,
    Deleted,
    Updated,
}

/// What happened to a repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryEventKind {
    Created,
    Updated,
    Deleted,
}

/// An artifact lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactEvent {
    #[serde(rename = "type")]
    pub kind: ArtifactEventKind,
    pub artifact: Artifact,

    /// Name of the repository the artifact belongs to
    pub repository: String,

    /// Actor that triggered the event, when known
    #[serde(default)]
    pub user: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl ArtifactEvent {
    pub fn new(
        kind: ArtifactEventKind,
        artifact: Artifact,
        repository: impl Into<String>,
        user: Option<String>,
    ) -> Self {
        Self {
            kind,
            artifact,
            repository: repository.into(),
            user,
            timestamp: Utc::now(),
        }
    }
}

/// A repository lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryEvent {
    #[serde(rename = "type")]
    pub kind: RepositoryEventKind,
    pub repository: Repository,

    #[serde(default)]
    pub user: Option<String>,

    /// Changed fields: name -> new value
    #[serde(default)]
    pub changes: HashMap<String, serde_json::Value>,

    pub timestamp: DateTime<Utc>,
}

impl RepositoryEvent {
    pub fn new(kind: RepositoryEventKind, repository: Repository, user: Option<String>) -> Self {
        Self {
            kind,
            repository,
            user,
            changes: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_changes(mut self, changes: HashMap<String, serde_json::Value>) -> Self {
        self.changes = changes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{new_id, Repository};

    fn sample_artifact() -> Artifact {
        Artifact {
            id: new_id(),
            repository_id: "r1".to_string(),
            path: "com/acme/app/1.0.0/app-1.0.0.jar".to_string(),
            name: "app".to_string(),
            version: "1.0.0".to_string(),
            format: "maven".to_string(),
            size: 42,
            checksum: "sha256:00".to_string(),
            content_type: None,
            metadata: None,
            properties: HashMap::new(),
            download_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_artifact_event_json() {
        let event = ArtifactEvent::new(
            ArtifactEventKind::Uploaded,
            sample_artifact(),
            "releases",
            Some("alice".to_string()),
        );

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"uploaded\""));
        assert!(json.contains("\"repository\":\"releases\""));

        let parsed: ArtifactEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.kind, ArtifactEventKind::Uploaded);
        assert_eq!(parsed.user.as_deref(), Some("alice"));
    }

    #[test]
    fn test_repository_event_changes() {
        let repo = Repository::hosted("releases", "maven");
        let mut changes = HashMap::new();
        changes.insert("status".to_string(), serde_json::json!("inactive"));

        let event = RepositoryEvent::new(RepositoryEventKind::Updated, repo, None)
            .with_changes(changes);

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"updated\""));
        assert!(json.contains("\"status\":\"inactive\""));
    }
}
