use tabsync_core::ProjectId;

/// Slot names in the shared store. Every key carries the namespace so that
/// several applications can share one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreKeys {
    namespace: String,
}

impl StoreKeys {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn projects(&self) -> String {
        format!("{}_projects_v1", self.namespace)
    }

    pub fn version(&self) -> String {
        format!("{}_projects_version_v1", self.namespace)
    }

    pub fn signal(&self) -> String {
        format!("{}_sync_signal_v1", self.namespace)
    }

    pub fn queue(&self) -> String {
        format!("{}_sync_queue_v1", self.namespace)
    }

    pub fn draft_prefix(&self) -> String {
        format!("{}_project_draft_v1_", self.namespace)
    }

    pub fn draft(&self, project_id: &ProjectId) -> String {
        format!("{}{}", self.draft_prefix(), project_id)
    }
}

impl Default for StoreKeys {
    fn default() -> Self {
        Self::new("tabsync")
    }
}
