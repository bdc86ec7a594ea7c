//! Typed access to the slots the sync engine persists.
//!
//! Reads never fail: a missing slot, a store error or a payload that does not
//! parse all come back as the empty/absent value, so a corrupt slot heals the
//! next time it is written. Writes propagate store errors.

use serde::Serialize;
use serde::de::DeserializeOwned;

use tabsync_core::{DraftOverlay, MutationRecord, Project, ProjectId, SyncSignal, VersionStamp};

use crate::error::StorageError;
use crate::slots::StoreKeys;
use crate::traits::KeyValueStore;

pub struct ProjectStore<S> {
    store: S,
    keys: StoreKeys,
}

impl<S: KeyValueStore> ProjectStore<S> {
    pub fn new(store: S, keys: StoreKeys) -> Self {
        Self { store, keys }
    }

    pub fn keys(&self) -> &StoreKeys {
        &self.keys
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    fn read_raw(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("store read of {key} failed, treating as absent: {e}");
                None
            }
        }
    }

    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.read_raw(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("malformed payload in {key}, treating as absent: {e}");
                None
            }
        }
    }

    fn write_json<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)?;
        self.store.set(key, &raw)
    }

    // ------------------------------------------------------------------
    // Projects collection
    // ------------------------------------------------------------------

    pub fn read_projects(&self) -> Vec<Project> {
        self.read_json(&self.keys.projects()).unwrap_or_default()
    }

    pub fn write_projects(&mut self, projects: &[Project]) -> Result<(), StorageError> {
        let key = self.keys.projects();
        self.write_json(&key, projects)
    }

    // ------------------------------------------------------------------
    // Version stamp
    // ------------------------------------------------------------------

    pub fn read_version(&self) -> Option<VersionStamp> {
        let key = self.keys.version();
        let raw = self.read_raw(&key)?;
        match raw.parse() {
            Ok(stamp) => Some(stamp),
            Err(e) => {
                log::warn!("malformed version stamp in {key}, treating as absent: {e}");
                None
            }
        }
    }

    pub fn write_version(&mut self, version: &VersionStamp) -> Result<(), StorageError> {
        let key = self.keys.version();
        self.store.set(&key, &version.to_string())
    }

    // ------------------------------------------------------------------
    // Draft overlays
    // ------------------------------------------------------------------

    pub fn read_draft(&self, project_id: &ProjectId) -> Option<DraftOverlay> {
        self.read_json(&self.keys.draft(project_id))
    }

    pub fn write_draft(&mut self, project_id: &ProjectId, draft: &DraftOverlay) -> Result<(), StorageError> {
        let key = self.keys.draft(project_id);
        self.write_json(&key, draft)
    }

    pub fn clear_draft(&mut self, project_id: &ProjectId) -> Result<(), StorageError> {
        let key = self.keys.draft(project_id);
        self.store.remove(&key)
    }

    /// Whether a draft slot exists at all, parseable or not.
    pub fn has_draft_slot(&self, project_id: &ProjectId) -> bool {
        self.read_raw(&self.keys.draft(project_id)).is_some()
    }

    /// Ids of every project with a draft slot.
    pub fn draft_project_ids(&self) -> Vec<ProjectId> {
        let prefix = self.keys.draft_prefix();
        match self.store.keys_with_prefix(&prefix) {
            Ok(keys) => keys
                .into_iter()
                .map(|k| ProjectId::new(&k[prefix.len()..]))
                .collect(),
            Err(e) => {
                log::warn!("listing draft slots failed: {e}");
                Vec::new()
            }
        }
    }

    // ------------------------------------------------------------------
    // Sync queue
    // ------------------------------------------------------------------

    pub fn read_queue(&self) -> Vec<MutationRecord> {
        self.read_json(&self.keys.queue()).unwrap_or_default()
    }

    pub fn write_queue(&mut self, queue: &[MutationRecord]) -> Result<(), StorageError> {
        let key = self.keys.queue();
        self.write_json(&key, queue)
    }

    // ------------------------------------------------------------------
    // Sync signal
    // ------------------------------------------------------------------

    pub fn read_signal(&self) -> Option<SyncSignal> {
        self.read_json(&self.keys.signal())
    }

    pub fn write_signal(&mut self, signal: &SyncSignal) -> Result<(), StorageError> {
        let key = self.keys.signal();
        self.write_json(&key, signal)
    }
}

/// Order-independent content digest of a project collection.
pub fn collection_digest(projects: &[Project]) -> Result<String, StorageError> {
    let mut sorted: Vec<&Project> = projects.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));
    let bytes = serde_json::to_vec(&sorted)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}
