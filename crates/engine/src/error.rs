use tabsync_core::{CoreError, ProjectId};
use tabsync_storage::StorageError;
use thiserror::Error;

use crate::remote::RemoteError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),

    #[error("project already exists: {0}")]
    ProjectExists(ProjectId),

    #[error("session is no longer valid")]
    AuthInvalid,
}
