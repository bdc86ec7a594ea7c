use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ids::{ContextId, ProjectId};

/// What a mutation did. Written into both sync signals and queue records.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MutationKind {
    UpdateProject,
    AddProject,
    DeleteProject,
    ResetProjects,
    /// A kind written by some other client version; kept verbatim.
    Other(String),
}

impl MutationKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::UpdateProject => "update_project",
            Self::AddProject => "add_project",
            Self::DeleteProject => "delete_project",
            Self::ResetProjects => "reset_projects",
            Self::Other(s) => s,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "update_project" => Self::UpdateProject,
            "add_project" => Self::AddProject,
            "delete_project" => Self::DeleteProject,
            "reset_projects" => Self::ResetProjects,
            other => Self::Other(other.to_string()),
        }
    }
}

impl Default for MutationKind {
    fn default() -> Self {
        Self::Other("mutation".to_string())
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MutationKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MutationKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

/// Broadcast token written to the signal slot on every mutation. Only the
/// latest value and the fact that it changed matter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSignal {
    #[serde(alias = "tab")]
    pub origin: ContextId,
    pub at: u64,
    #[serde(rename = "type")]
    pub kind: MutationKind,
}

/// One not-yet-confirmed mutation in the sync queue.
///
/// Every field defaults so that records written by older clients (which may
/// carry nothing but a timestamp) still count towards queue length.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MutationRecord {
    #[serde(default)]
    pub action: MutationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    #[serde(default)]
    pub at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<ContextId>,
}

impl MutationRecord {
    pub fn new(action: MutationKind, project_id: ProjectId, at: u64, origin: ContextId) -> Self {
        Self {
            action,
            project_id: Some(project_id),
            at,
            origin: Some(origin),
        }
    }
}
