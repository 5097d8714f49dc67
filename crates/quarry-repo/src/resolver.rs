//! Repository resolver
//!
//! Translates a logical (repository-id, path, operation) into concrete
//! storage actions:
//!
//! - **hosted**: pass through to the repository's configured storage plugin
//! - **proxy**: read through the single-flight cache, verifying any
//!   upstream-advertised checksum before the cache is populated
//! - **group**: iterate members in configured order; first member that has
//!   the path wins, list results merge first-listed-wins
//!
//! Writes and deletes against proxy and group repositories are rejected
//! with `OperationNotSupported`.

use futures::future::BoxFuture;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use quarry_core::{compute_digest, digest_matches, Repository, RepositoryType};
use quarry_plugin::{PluginError, PluginRegistry, StoragePlugin};

use crate::cache::{CacheKey, CachedObject, FetchFailure, FetchOutcome, ProxyCache};
use crate::catalog::RepositoryCatalog;
use crate::error::{ResolveError, Result};
use crate::upstream::{UpstreamFetcher, UpstreamResponse};

/// Content resolved for a download
#[derive(Debug, Clone)]
pub struct ResolvedContent {
    pub data: Vec<u8>,

    /// `sha256:`-prefixed digest of `data`
    pub checksum: String,

    /// Id of the repository that actually served the bytes (a group
    /// resolves to the serving member)
    pub origin: String,
}

/// Maps (repository-id, path) requests onto storage plugins and upstreams
pub struct RepositoryResolver {
    catalog: Arc<RepositoryCatalog>,
    plugins: Arc<PluginRegistry>,
    cache: ProxyCache,
    upstream: Arc<dyn UpstreamFetcher>,
    default_storage: String,
    storage_timeout: Duration,
}

impl RepositoryResolver {
    pub fn new(
        catalog: Arc<RepositoryCatalog>,
        plugins: Arc<PluginRegistry>,
        cache: ProxyCache,
        upstream: Arc<dyn UpstreamFetcher>,
        default_storage: impl Into<String>,
        storage_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            plugins,
            cache,
            upstream,
            default_storage: default_storage.into(),
            storage_timeout,
        }
    }

    /// Look up a repository definition
    pub fn repository(&self, id: &str) -> Result<Repository> {
        self.catalog.get(id)
    }

    /// Reject the operation unless the repository is active and writable
    pub fn ensure_writable(&self, repo: &Repository, operation: &str) -> Result<()> {
        if !repo.is_active() {
            return Err(ResolveError::RepositoryInactive {
                name: repo.name.clone(),
            });
        }
        if !repo.allows_writes() {
            return Err(ResolveError::OperationNotSupported {
                operation: operation.to_string(),
                repository: repo.name.clone(),
                repo_type: repo.repo_type,
            });
        }
        Ok(())
    }

    /// The storage plugin serving a repository
    pub fn storage_for(&self, repo: &Repository) -> Result<Arc<dyn StoragePlugin>> {
        let name = repo.storage_plugin().unwrap_or(&self.default_storage);
        Ok(self.plugins.lookup_storage(name)?)
    }

    /// Resolve a download against a repository
    pub async fn download(&self, repository_id: &str, path: &str) -> Result<ResolvedContent> {
        let repo = self.catalog.get(repository_id)?;
        self.download_from(&repo, path).await
    }

    /// Resolve a listing against a repository
    pub async fn list(&self, repository_id: &str, prefix: &str) -> Result<Vec<String>> {
        let repo = self.catalog.get(repository_id)?;
        self.list_from(&repo, prefix).await
    }

    fn download_from<'a>(
        &'a self,
        repo: &'a Repository,
        path: &'a str,
    ) -> BoxFuture<'a, Result<ResolvedContent>> {
        Box::pin(async move {
            if !repo.is_active() {
                return Err(ResolveError::RepositoryInactive {
                    name: repo.name.clone(),
                });
            }

            match repo.repo_type {
                RepositoryType::Hosted => self.download_hosted(repo, path).await,
                RepositoryType::Proxy => self.download_proxy(repo, path).await,
                RepositoryType::Group => {
                    let mut last_failure = None;
                    for member_id in &repo.members {
                        let member = match self.catalog.get(member_id) {
                            Ok(member) => member,
                            Err(e) => {
                                tracing::warn!(
                                    group = %repo.name,
                                    member = %member_id,
                                    error = %e,
                                    "skipping unresolvable group member"
                                );
                                continue;
                            }
                        };

                        match self.download_from(&member, path).await {
                            Ok(content) => return Ok(content),
                            Err(ResolveError::ArtifactNotFound { .. }) => continue,
                            Err(e) => {
                                tracing::warn!(
                                    group = %repo.name,
                                    member = %member.name,
                                    error = %e,
                                    "group member failed, trying next"
                                );
                                last_failure = Some(e);
                            }
                        }
                    }

                    match last_failure {
                        Some(e) => Err(e),
                        None => Err(ResolveError::ArtifactNotFound {
                            repository: repo.name.clone(),
                            path: path.to_string(),
                        }),
                    }
                }
            }
        })
    }

    async fn download_hosted(&self, repo: &Repository, path: &str) -> Result<ResolvedContent> {
        let storage = self.storage_for(repo)?;
        let data = self
            .with_storage_deadline(storage.download(path))
            .await
            .map_err(|e| match e {
                ResolveError::Plugin(PluginError::ObjectNotFound { .. }) => {
                    ResolveError::ArtifactNotFound {
                        repository: repo.name.clone(),
                        path: path.to_string(),
                    }
                }
                other => other,
            })?;

        let checksum = compute_digest(&data);
        Ok(ResolvedContent {
            data,
            checksum,
            origin: repo.id.clone(),
        })
    }

    async fn download_proxy(&self, repo: &Repository, path: &str) -> Result<ResolvedContent> {
        let base = repo
            .url
            .clone()
            .ok_or_else(|| ResolveError::Other(format!("proxy '{}' has no url", repo.name)))?;

        let key = CacheKey::new(repo.id.clone(), path);
        let upstream = self.upstream.clone();
        let fetch_base = base.clone();
        let fetch_path = path.to_string();

        let outcome = self
            .cache
            .get_or_fetch(key, move || async move {
                match upstream.fetch(&fetch_base, &fetch_path).await {
                    Ok(UpstreamResponse::Found { data, checksum }) => {
                        let digest = compute_digest(&data);
                        if let Some(expected) = checksum {
                            if !digest_matches(&expected, &digest) {
                                return Err(FetchFailure::ChecksumMismatch {
                                    expected,
                                    actual: digest,
                                });
                            }
                        }
                        Ok(Some(CachedObject {
                            content: data,
                            checksum: digest,
                        }))
                    }
                    Ok(UpstreamResponse::Missing) => Ok(None),
                    Err(e) => Err(FetchFailure::Upstream {
                        message: e.to_string(),
                    }),
                }
            })
            .await;

        match outcome {
            FetchOutcome::Found(object) => Ok(ResolvedContent {
                data: object.content.clone(),
                checksum: object.checksum.clone(),
                origin: repo.id.clone(),
            }),
            FetchOutcome::Missing => Err(ResolveError::ArtifactNotFound {
                repository: repo.name.clone(),
                path: path.to_string(),
            }),
            FetchOutcome::Failed(FetchFailure::ChecksumMismatch { expected, actual }) => {
                Err(ResolveError::ChecksumMismatch {
                    path: path.to_string(),
                    expected,
                    actual,
                })
            }
            FetchOutcome::Failed(FetchFailure::TimedOut { seconds }) => {
                Err(ResolveError::UpstreamUnavailable {
                    url: base,
                    message: format!("fetch timed out after {seconds}s"),
                })
            }
            FetchOutcome::Failed(FetchFailure::Upstream { message }) => {
                Err(ResolveError::UpstreamUnavailable { url: base, message })
            }
        }
    }

    fn list_from<'a>(
        &'a self,
        repo: &'a Repository,
        prefix: &'a str,
    ) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            if !repo.is_active() {
                return Err(ResolveError::RepositoryInactive {
                    name: repo.name.clone(),
                });
            }

            match repo.repo_type {
                RepositoryType::Hosted => {
                    let storage = self.storage_for(repo)?;
                    self.with_storage_deadline(storage.list(prefix)).await
                }
                // A proxy only knows what it has cached
                RepositoryType::Proxy => Ok(self.cache.cached_paths(&repo.id, prefix)),
                RepositoryType::Group => {
                    let mut seen = HashSet::new();
                    let mut merged = Vec::new();
                    for member_id in &repo.members {
                        let member = match self.catalog.get(member_id) {
                            Ok(member) => member,
                            Err(_) => continue,
                        };
                        match self.list_from(&member, prefix).await {
                            Ok(paths) => {
                                for path in paths {
                                    // First-listed member wins on duplicates
                                    if seen.insert(path.clone()) {
                                        merged.push(path);
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::warn!(
                                    group = %repo.name,
                                    member = %member.name,
                                    error = %e,
                                    "group member listing failed, continuing"
                                );
                            }
                        }
                    }
                    Ok(merged)
                }
            }
        })
    }

    async fn with_storage_deadline<T>(
        &self,
        fut: impl std::future::Future<Output = quarry_plugin::Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.storage_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ResolveError::StorageFailure {
                message: format!(
                    "storage call timed out after {}s",
                    self.storage_timeout.as_secs()
                ),
            }),
        }
    }
}
