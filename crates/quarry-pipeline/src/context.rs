//! Explicit application context
//!
//! Everything is wired through a constructed `Quarry` value that owns the
//! registry, catalog, resolver, pipeline, and bus; components receive what
//! they need as `Arc`s instead of reaching for process-wide globals.

use std::sync::Arc;

use quarry_core::QuarryConfig;
use quarry_plugin::{
    FileStorage, MavenFormat, MemoryStorage, PluginHandle, PluginRegistry, RawFormat,
};
use quarry_repo::{
    HttpUpstream, ProxyCache, RepositoryCatalog, RepositoryResolver, UpstreamFetcher,
};

use crate::error::Result;
use crate::events::EventBus;
use crate::metadata::MetadataGenerator;
use crate::pipeline::ArtifactPipeline;
use crate::service::RepositoryService;
use crate::store::{ArtifactStore, MemoryArtifactStore};

/// Builder for a fully wired `Quarry` context
pub struct QuarryBuilder {
    config: QuarryConfig,
    registry: PluginRegistry,
    store: Option<Arc<dyn ArtifactStore>>,
    upstream: Option<Arc<dyn UpstreamFetcher>>,
}

impl QuarryBuilder {
    pub fn new(config: QuarryConfig) -> Self {
        Self {
            config,
            registry: PluginRegistry::new(),
            store: None,
            upstream: None,
        }
    }

    /// Builder preloaded with the built-in plugins: maven and raw formats,
    /// memory storage, and file storage when a base path is configured
    pub fn with_defaults(config: QuarryConfig) -> Result<Self> {
        let builder = Self::new(config);
        builder.registry.register(PluginHandle::Format(Arc::new(MavenFormat::new())))?;
        builder.registry.register(PluginHandle::Format(Arc::new(RawFormat::new())))?;
        builder.registry.register(PluginHandle::Storage(Arc::new(MemoryStorage::new())))?;
        if let Some(base_path) = &builder.config.storage.base_path {
            builder
                .registry
                .register(PluginHandle::Storage(Arc::new(FileStorage::new(base_path))))?;
        }
        Ok(builder)
    }

    /// Register an additional plugin
    pub fn register(self, handle: PluginHandle) -> Result<Self> {
        self.registry.register(handle)?;
        Ok(self)
    }

    /// Use a specific artifact record store (defaults to in-memory)
    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a specific upstream fetcher (defaults to the HTTP client)
    pub fn with_upstream(mut self, upstream: Arc<dyn UpstreamFetcher>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    /// Initialize plugins and wire the context together
    pub async fn build(self) -> Result<Quarry> {
        self.registry.initialize_all(&self.config.plugins).await;
        let registry = Arc::new(self.registry);

        let upstream: Arc<dyn UpstreamFetcher> = match self.upstream {
            Some(upstream) => upstream,
            None => Arc::new(HttpUpstream::new(self.config.proxy.upstream_timeout)?),
        };

        let catalog = Arc::new(RepositoryCatalog::new());
        let cache = ProxyCache::new(
            self.config.proxy.cache_ttl,
            self.config.proxy.cache_max_bytes,
            self.config.proxy.upstream_timeout,
        );
        let resolver = Arc::new(RepositoryResolver::new(
            catalog.clone(),
            registry.clone(),
            cache,
            upstream,
            self.config.storage.default_plugin.clone(),
            self.config.storage.timeout,
        ));

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryArtifactStore::new()));
        let metadata = Arc::new(MetadataGenerator::new(store.clone()));
        let bus = Arc::new(EventBus::start(
            self.config.events.queue_capacity,
            registry.integrations(),
        ));

        let pipeline = Arc::new(ArtifactPipeline::new(
            resolver.clone(),
            registry.clone(),
            store.clone(),
            metadata,
            bus.clone(),
        ));
        let repositories = Arc::new(RepositoryService::new(
            catalog.clone(),
            resolver.clone(),
            registry.clone(),
            store.clone(),
            bus.clone(),
        ));

        Ok(Quarry {
            config: self.config,
            registry,
            catalog,
            resolver,
            pipeline,
            repositories,
            bus,
        })
    }
}

/// A fully wired artifact repository core
pub struct Quarry {
    config: QuarryConfig,
    registry: Arc<PluginRegistry>,
    catalog: Arc<RepositoryCatalog>,
    resolver: Arc<RepositoryResolver>,
    pipeline: Arc<ArtifactPipeline>,
    repositories: Arc<RepositoryService>,
    bus: Arc<EventBus>,
}

impl Quarry {
    pub fn config(&self) -> &QuarryConfig {
        &self.config
    }

    pub fn plugins(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn catalog(&self) -> &Arc<RepositoryCatalog> {
        &self.catalog
    }

    pub fn resolver(&self) -> &Arc<RepositoryResolver> {
        &self.resolver
    }

    pub fn pipeline(&self) -> &Arc<ArtifactPipeline> {
        &self.pipeline
    }

    pub fn repositories(&self) -> &Arc<RepositoryService> {
        &self.repositories
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Drain the event bus, then shut plugins down in reverse registration
    /// order (best-effort, each bounded by the configured timeout)
    pub async fn shutdown(&self) {
        self.bus.shutdown().await;
        self.registry
            .shutdown_all(self.config.events.shutdown_timeout)
            .await;
    }
}
