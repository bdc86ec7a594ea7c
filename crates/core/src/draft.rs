use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::session::SessionScope;

/// A persisted, single-use snapshot of an optimistic edit the tab believes it
/// made but has not seen the server accept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftOverlay {
    #[serde(default)]
    pub pending: bool,
    pub session_scope: SessionScope,
    /// Server version of the record the edit was forked from.
    #[serde(default)]
    pub base_version: Option<String>,
    #[serde(default)]
    pub project: Map<String, Value>,
}

impl DraftOverlay {
    pub fn pending(
        session_scope: SessionScope,
        base_version: Option<String>,
        project: Map<String, Value>,
    ) -> Self {
        Self {
            pending: true,
            session_scope,
            base_version,
            project,
        }
    }
}
