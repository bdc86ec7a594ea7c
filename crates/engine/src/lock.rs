use tabsync_core::{LockStatus, ProjectId, lock::resource_key};
use tabsync_storage::KeyValueStore;
use thiserror::Error;

use crate::Engine;
use crate::remote::{RemoteError, Transport};

#[derive(Debug, Error)]
pub enum LockStatusError {
    #[error("session is no longer valid")]
    AuthInvalid,

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl<S: KeyValueStore, T: Transport> Engine<S, T> {
    /// Current edit-lock state of a project, straight from the server. No
    /// caching, no retries, no local writes.
    pub fn get_project_lock_status(&self, project_id: &ProjectId) -> Result<LockStatus, LockStatusError> {
        if self.auth_invalid() {
            return Err(LockStatusError::AuthInvalid);
        }
        let key = resource_key(project_id, &self.config.lock_action);
        Ok(self.remote.lock_status(&key)?)
    }
}
