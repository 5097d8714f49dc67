//! Repository lifecycle service
//!
//! CRUD over repository definitions against the catalog, with lifecycle
//! events published for integrations. Artifacts are owned by their
//! repository: deleting a repository purges its records and best-effort
//! deletes the stored objects.

use std::collections::HashMap;
use std::sync::Arc;

use quarry_core::{Repository, RepositoryEvent, RepositoryEventKind};
use quarry_plugin::{PluginRegistry, StoragePlugin};
use quarry_repo::{RepositoryCatalog, RepositoryResolver};

use crate::error::Result;
use crate::events::{Event, EventBus};
use crate::store::ArtifactStore;

/// Repository CRUD over the catalog
pub struct RepositoryService {
    catalog: Arc<RepositoryCatalog>,
    resolver: Arc<RepositoryResolver>,
    plugins: Arc<PluginRegistry>,
    store: Arc<dyn ArtifactStore>,
    bus: Arc<EventBus>,
}

impl RepositoryService {
    pub fn new(
        catalog: Arc<RepositoryCatalog>,
        resolver: Arc<RepositoryResolver>,
        plugins: Arc<PluginRegistry>,
        store: Arc<dyn ArtifactStore>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            catalog,
            resolver,
            plugins,
            store,
            bus,
        }
    }

    /// Register a repository and publish a `created` event
    pub async fn create(&self, repo: Repository, actor: Option<String>) -> Result<Repository> {
        // The repository's format must have a registered handler
        self.plugins.lookup_format(&repo.format)?;
        self.catalog.register(repo.clone())?;

        self.bus.publish(Event::Repository(RepositoryEvent::new(
            RepositoryEventKind::Created,
            repo.clone(),
            actor,
        )));
        Ok(repo)
    }

    /// Replace a repository definition and publish an `updated` event
    pub async fn update(&self, repo: Repository, actor: Option<String>) -> Result<Repository> {
        self.plugins.lookup_format(&repo.format)?;
        let previous = self.catalog.update(repo.clone())?;

        let changes = diff(&previous, &repo);
        self.bus.publish(Event::Repository(
            RepositoryEvent::new(RepositoryEventKind::Updated, repo.clone(), actor)
                .with_changes(changes),
        ));
        Ok(repo)
    }

    /// Remove a repository, purge its artifacts, publish a `deleted` event
    pub async fn delete(&self, id: &str, actor: Option<String>) -> Result<Repository> {
        let repo = self.catalog.remove(id)?;

        // Artifacts are owned by their repository
        let removed = match self.store.delete_all(id).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(repository = %repo.name, error = %e, "failed to purge artifact records");
                Vec::new()
            }
        };

        // Object cleanup is best-effort; records are already gone
        if let Ok(storage) = self.resolver.storage_for(&repo) {
            for artifact in &removed {
                if let Err(e) = storage.delete(&artifact.path).await {
                    tracing::debug!(
                        repository = %repo.name,
                        path = %artifact.path,
                        error = %e,
                        "failed to delete stored object during repository purge"
                    );
                }
            }
        }

        self.bus.publish(Event::Repository(RepositoryEvent::new(
            RepositoryEventKind::Deleted,
            repo.clone(),
            actor,
        )));
        Ok(repo)
    }

    /// Look up a repository by id
    pub fn get(&self, id: &str) -> Result<Repository> {
        Ok(self.catalog.get(id)?)
    }

    /// Look up a repository by name
    pub fn get_by_name(&self, name: &str) -> Option<Repository> {
        self.catalog.get_by_name(name)
    }

    /// All repositories, sorted by name
    pub fn list(&self) -> Vec<Repository> {
        self.catalog.list()
    }
}

/// Changed fields between two definitions, for the event payload
fn diff(previous: &Repository, current: &Repository) -> HashMap<String, serde_json::Value> {
    let mut changes = HashMap::new();
    if previous.name != current.name {
        changes.insert("name".to_string(), serde_json::json!(current.name));
    }
    if previous.status != current.status {
        changes.insert("status".to_string(), serde_json::json!(current.status));
    }
    if previous.url != current.url {
        changes.insert("url".to_string(), serde_json::json!(current.url));
    }
    if previous.members != current.members {
        changes.insert("members".to_string(), serde_json::json!(current.members));
    }
    if previous.config != current.config {
        changes.insert("config".to_string(), serde_json::json!(current.config));
    }
    changes
}
