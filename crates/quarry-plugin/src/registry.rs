//! Plugin registry and lifecycle
//!
//! Plugins are registered at startup, initialized once, and shut down once in
//! reverse registration order. Lookups go through explicit capability maps;
//! a plugin that failed to initialize is excluded from dispatch.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::api::{
    FormatPlugin, IntegrationPlugin, Plugin, PluginConfig, PluginKind, StoragePlugin,
};
use crate::error::{PluginError, Result};

/// A registered plugin, tagged by kind
#[derive(Clone)]
pub enum PluginHandle {
    Format(Arc<dyn FormatPlugin>),
    Storage(Arc<dyn StoragePlugin>),
    Integration(Arc<dyn IntegrationPlugin>),
}

impl PluginHandle {
    pub fn kind(&self) -> PluginKind {
        match self {
            PluginHandle::Format(_) => PluginKind::Format,
            PluginHandle::Storage(_) => PluginKind::Storage,
            PluginHandle::Integration(_) => PluginKind::Integration,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            PluginHandle::Format(p) => p.name(),
            PluginHandle::Storage(p) => p.name(),
            PluginHandle::Integration(p) => p.name(),
        }
    }

    pub fn version(&self) -> &str {
        match self {
            PluginHandle::Format(p) => p.version(),
            PluginHandle::Storage(p) => p.version(),
            PluginHandle::Integration(p) => p.version(),
        }
    }

    async fn initialize(&self, config: &PluginConfig) -> Result<()> {
        match self {
            PluginHandle::Format(p) => p.initialize(config).await,
            PluginHandle::Storage(p) => p.initialize(config).await,
            PluginHandle::Integration(p) => p.initialize(config).await,
        }
    }

    async fn shutdown(&self) -> Result<()> {
        match self {
            PluginHandle::Format(p) => p.shutdown().await,
            PluginHandle::Storage(p) => p.shutdown().await,
            PluginHandle::Integration(p) => p.shutdown().await,
        }
    }
}

/// Registration-time metadata and lifecycle state for a plugin
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    pub name: String,
    pub version: String,
    pub kind: PluginKind,
    pub initialized: bool,

    /// Cleared when initialization fails; an unusable plugin is excluded
    /// from dispatch for the process lifetime
    pub usable: bool,
}

struct Entry {
    descriptor: PluginDescriptor,
    handle: PluginHandle,
}

#[derive(Default)]
struct Inner {
    /// All registrations, in registration order
    entries: Vec<Entry>,
    /// (kind, name) -> entry index
    by_name: HashMap<(PluginKind, String), usize>,
    /// format key -> entry index
    by_format: HashMap<String, usize>,
}

/// Registry of format, storage, and integration plugins
#[derive(Default)]
pub struct PluginRegistry {
    inner: RwLock<Inner>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin; fails if a plugin of the same kind and name exists
    pub fn register(&self, handle: PluginHandle) -> Result<()> {
        let mut inner = self.inner.write().unwrap();

        let kind = handle.kind();
        let name = handle.name().to_string();
        if inner.by_name.contains_key(&(kind, name.clone())) {
            return Err(PluginError::PluginNameCollision { kind, name });
        }

        if let PluginHandle::Format(format) = &handle {
            let key = format.format().to_string();
            if inner.by_format.contains_key(&key) {
                return Err(PluginError::PluginNameCollision { kind, name });
            }
            let idx = inner.entries.len();
            inner.by_format.insert(key, idx);
        }

        let idx = inner.entries.len();
        let descriptor = PluginDescriptor {
            name: name.clone(),
            version: handle.version().to_string(),
            kind,
            initialized: false,
            usable: true,
        };
        inner.entries.push(Entry { descriptor, handle });
        inner.by_name.insert((kind, name), idx);
        Ok(())
    }

    /// Initialize every registered plugin with its scoped configuration
    ///
    /// A failing initializer marks that plugin unusable and does not abort
    /// initialization of the remaining plugins.
    pub async fn initialize_all(&self, configs: &HashMap<String, PluginConfig>) {
        let pending: Vec<(usize, PluginHandle, PluginConfig)> = {
            let inner = self.inner.read().unwrap();
            inner
                .entries
                .iter()
                .enumerate()
                .filter(|(_, e)| e.descriptor.usable && !e.descriptor.initialized)
                .map(|(i, e)| {
                    let config = configs.get(&e.descriptor.name).cloned().unwrap_or_default();
                    (i, e.handle.clone(), config)
                })
                .collect()
        };

        for (idx, handle, config) in pending {
            let result = handle.initialize(&config).await;
            let mut inner = self.inner.write().unwrap();
            let descriptor = &mut inner.entries[idx].descriptor;
            match result {
                Ok(()) => descriptor.initialized = true,
                Err(e) => {
                    tracing::warn!(
                        plugin = %descriptor.name,
                        kind = %descriptor.kind,
                        error = %e,
                        "plugin initialization failed, marking unusable"
                    );
                    descriptor.usable = false;
                }
            }
        }
    }

    /// Shut down initialized plugins in reverse registration order
    ///
    /// Each call is bounded by `timeout`; failures are recorded and returned
    /// but do not block subsequent shutdowns.
    pub async fn shutdown_all(&self, timeout: Duration) -> Vec<(String, PluginError)> {
        let initialized: Vec<(usize, String, PluginHandle)> = {
            let inner = self.inner.read().unwrap();
            inner
                .entries
                .iter()
                .enumerate()
                .rev()
                .filter(|(_, e)| e.descriptor.initialized)
                .map(|(i, e)| (i, e.descriptor.name.clone(), e.handle.clone()))
                .collect()
        };

        let mut failures = Vec::new();
        for (idx, name, handle) in initialized {
            let result = match tokio::time::timeout(timeout, handle.shutdown()).await {
                Ok(result) => result,
                Err(_) => Err(PluginError::ShutdownFailed {
                    name: name.clone(),
                    message: format!("timed out after {}s", timeout.as_secs()),
                }),
            };

            if let Err(e) = result {
                tracing::warn!(plugin = %name, error = %e, "plugin shutdown failed");
                failures.push((name, e));
            }

            let mut inner = self.inner.write().unwrap();
            inner.entries[idx].descriptor.initialized = false;
        }
        failures
    }

    /// Look up the format plugin handling `format`
    pub fn lookup_format(&self, format: &str) -> Result<Arc<dyn FormatPlugin>> {
        let inner = self.inner.read().unwrap();
        inner
            .by_format
            .get(format)
            .map(|&idx| &inner.entries[idx])
            .filter(|e| e.descriptor.usable)
            .and_then(|e| match &e.handle {
                PluginHandle::Format(p) => Some(p.clone()),
                _ => None,
            })
            .ok_or_else(|| PluginError::UnsupportedFormat {
                format: format.to_string(),
            })
    }

    /// Look up a storage plugin by name
    pub fn lookup_storage(&self, name: &str) -> Result<Arc<dyn StoragePlugin>> {
        let inner = self.inner.read().unwrap();
        inner
            .by_name
            .get(&(PluginKind::Storage, name.to_string()))
            .map(|&idx| &inner.entries[idx])
            .filter(|e| e.descriptor.usable)
            .and_then(|e| match &e.handle {
                PluginHandle::Storage(p) => Some(p.clone()),
                _ => None,
            })
            .ok_or_else(|| PluginError::PluginNotFound {
                kind: PluginKind::Storage,
                name: name.to_string(),
            })
    }

    /// All usable integration plugins, in registration order
    pub fn integrations(&self) -> Vec<Arc<dyn IntegrationPlugin>> {
        let inner = self.inner.read().unwrap();
        inner
            .entries
            .iter()
            .filter(|e| e.descriptor.usable)
            .filter_map(|e| match &e.handle {
                PluginHandle::Integration(p) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }

    /// Descriptors of all registered plugins, in registration order
    pub fn descriptors(&self) -> Vec<PluginDescriptor> {
        let inner = self.inner.read().unwrap();
        inner.entries.iter().map(|e| e.descriptor.clone()).collect()
    }
}
