use tabsync_core::{DraftOverlay, Item, MutationRecord, Project, ProjectId};
use tabsync_storage::{MemoryStore, ProjectStore, StorageError, StoreKeys};

pub const SCOPE: &str = "u1:user:company:buyer";
pub const OTHER_SCOPE: &str = "u2:user:company:viewer";

/// Server version the sample projects start at.
pub const SERVER_VERSION: &str = "2026-02-16T11:00:00Z";
pub const OLDER_VERSION: &str = "2026-02-16T10:00:00Z";

/// A one-item project with its quantity in `qty_1`.
pub fn quote_project(id: &str, name: &str, qty: i64) -> Project {
    Project::new(id, name)
        .with_item(Item::new("i1").with_field("qty_1", qty))
        .with_server_version(SERVER_VERSION)
}

/// `quote_project` as served by a backend that reports its version only
/// through `updated_at`.
pub fn unversioned_quote_project(id: &str, name: &str, qty: i64) -> Project {
    let mut project = quote_project(id, name, qty);
    project.server_updated_at = None;
    project
}

/// Draft overlay as another tab would have left it: a full snapshot of
/// `project` with its quantity changed to `qty`.
pub fn draft_with_qty(
    project: &Project,
    scope: &str,
    base_version: Option<&str>,
    qty: i64,
) -> Result<DraftOverlay, StorageError> {
    let mut edited = project.clone();
    if let Some(item) = edited.item_mut("i1") {
        item.fields.insert("qty_1".into(), qty.into());
    }
    Ok(DraftOverlay::pending(
        scope.into(),
        base_version.map(str::to_string),
        edited.to_snapshot()?,
    ))
}

/// A store left behind by an earlier session: a local collection, optional
/// drafts keyed by project id, and a queue.
pub fn stale_store(
    projects: &[Project],
    drafts: &[(&str, DraftOverlay)],
    queue: &[MutationRecord],
) -> Result<MemoryStore, StorageError> {
    let mut store = ProjectStore::new(MemoryStore::new(), StoreKeys::default());
    store.write_projects(projects)?;
    for (id, draft) in drafts {
        store.write_draft(&ProjectId::from(*id), draft)?;
    }
    store.write_queue(queue)?;
    Ok(store.inner().clone())
}
