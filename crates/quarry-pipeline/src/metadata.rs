//! Coalesced metadata regeneration
//!
//! The index document for a (repository, group-key) pair is rebuilt from the
//! current artifact record set whenever that set changes. Regeneration for
//! the same key is serialized; triggers arriving while a pass is running
//! coalesce into a single follow-up pass that reflects the latest state, so
//! an index is never built from a partially-overlapping read.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use quarry_core::{GroupKey, Repository};
use quarry_plugin::{FormatPlugin, PluginError, StoragePlugin};

use crate::error::{PipelineError, Result};
use crate::store::ArtifactStore;

#[derive(Default)]
struct KeyState {
    running: bool,
    pending: bool,
}

/// Produces per-group index documents through the format plugin
pub struct MetadataGenerator {
    store: Arc<dyn ArtifactStore>,
    states: Mutex<HashMap<(String, GroupKey), KeyState>>,
}

impl MetadataGenerator {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            store,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Rebuild the index document for `key` in `repo`
    ///
    /// If a pass for the same key is already running, this trigger is folded
    /// into a follow-up pass and returns immediately. Failures are reported
    /// as `MetadataRegenerationFailure`; the caller treats them as non-fatal
    /// because the triggering write has already committed.
    pub async fn regenerate(
        &self,
        repo: &Repository,
        format: &Arc<dyn FormatPlugin>,
        storage: &Arc<dyn StoragePlugin>,
        key: GroupKey,
    ) -> Result<()> {
        let state_key = (repo.id.clone(), key.clone());
        {
            let mut states = self.states.lock().unwrap();
            let state = states.entry(state_key.clone()).or_default();
            if state.running {
                state.pending = true;
                return Ok(());
            }
            state.running = true;
        }

        loop {
            let result = self.run_once(repo, format, storage, &key).await;

            let mut states = self.states.lock().unwrap();
            if let Some(state) = states.get_mut(&state_key) {
                if state.pending {
                    // Another trigger arrived mid-pass; run again against
                    // the latest record set
                    state.pending = false;
                    drop(states);
                    continue;
                }
            }
            states.remove(&state_key);

            return result.map_err(|e| PipelineError::MetadataRegenerationFailure {
                repository: repo.name.clone(),
                group: key.to_string(),
                message: e.to_string(),
            });
        }
    }

    async fn run_once(
        &self,
        repo: &Repository,
        format: &Arc<dyn FormatPlugin>,
        storage: &Arc<dyn StoragePlugin>,
        key: &GroupKey,
    ) -> Result<()> {
        let artifacts: Vec<_> = self
            .store
            .list(&repo.id)
            .await?
            .into_iter()
            .filter(|a| format.group_key(a) == *key)
            .collect();

        let index_path = format.index_path(key);
        if artifacts.is_empty() {
            // The last artifact of the group is gone; drop the index document
            match storage.delete(&index_path).await {
                Ok(()) | Err(PluginError::ObjectNotFound { .. }) => Ok(()),
                Err(e) => Err(e.into()),
            }
        } else {
            let document = format.generate_metadata(&artifacts)?;
            storage.upload(&index_path, &document).await?;
            Ok(())
        }
    }
}
