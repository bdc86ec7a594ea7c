use serde::{Deserialize, Serialize};

use crate::ids::ProjectId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOwner {
    pub user_id: i64,
    pub display: String,
}

/// Edit-lock state of a resource at the moment the server answered.
/// Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStatus {
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub is_owner: bool,
    #[serde(default)]
    pub owner: Option<LockOwner>,
    #[serde(default)]
    pub expires_at: Option<String>,
}

/// Lock resource key for an action on a project: `project:<id>:<action>`.
pub fn resource_key(project_id: &ProjectId, action: &str) -> String {
    format!("project:{}:{}", project_id, action)
}
