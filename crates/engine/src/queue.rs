//! The sync queue: mutations this store has made that the server has not
//! confirmed. Shared by every tab on the store. A non-empty queue is what
//! lets a draft overlay survive a bootstrap.

use std::collections::BTreeMap;

use tabsync_core::{MutationKind, MutationRecord, Project, ProjectId};
use tabsync_storage::{KeyValueStore, ProjectStore, StorageError};

use crate::remote::{BulkEntry, BulkRequest};

/// Append a record. Returns the queue length afterwards.
pub fn enqueue<S: KeyValueStore>(
    store: &mut ProjectStore<S>,
    record: MutationRecord,
) -> Result<usize, StorageError> {
    let mut queue = store.read_queue();
    queue.push(record);
    store.write_queue(&queue)?;
    Ok(queue.len())
}

pub fn is_pending<S: KeyValueStore>(store: &ProjectStore<S>) -> bool {
    !store.read_queue().is_empty()
}

/// Remove each of `flushed` from the queue once, leaving anything appended
/// since (possibly by another tab) in place. Returns how many were removed.
pub fn remove_flushed<S: KeyValueStore>(
    store: &mut ProjectStore<S>,
    flushed: &[MutationRecord],
) -> Result<usize, StorageError> {
    let mut queue = store.read_queue();
    let before = queue.len();
    for record in flushed {
        if let Some(pos) = queue.iter().position(|r| r == record) {
            queue.remove(pos);
        }
    }
    store.write_queue(&queue)?;
    Ok(before - queue.len())
}

/// Drop every record for one project. Returns how many were removed.
pub fn remove_project<S: KeyValueStore>(
    store: &mut ProjectStore<S>,
    project_id: &ProjectId,
) -> Result<usize, StorageError> {
    let mut queue = store.read_queue();
    let before = queue.len();
    queue.retain(|r| r.project_id.as_ref() != Some(project_id));
    store.write_queue(&queue)?;
    Ok(before - queue.len())
}

pub fn clear<S: KeyValueStore>(store: &mut ProjectStore<S>) -> Result<(), StorageError> {
    store.write_queue(&[])
}

/// Collapse queued records into one bulk request: the latest local copy of
/// every touched project, or a delete when the last record for it was one.
/// Records without a project id contribute nothing.
pub fn collapse(queue: &[MutationRecord], local: &[Project]) -> BulkRequest {
    let mut last: BTreeMap<&ProjectId, &MutationKind> = BTreeMap::new();
    for record in queue {
        if let Some(id) = record.project_id.as_ref() {
            last.insert(id, &record.action);
        }
    }

    let mut request = BulkRequest {
        projects: Vec::new(),
        deleted: Vec::new(),
    };
    for (id, action) in last {
        if *action == MutationKind::DeleteProject {
            request.deleted.push(id.clone());
            continue;
        }
        match local.iter().find(|p| &p.id == id) {
            Some(project) => request.projects.push(BulkEntry {
                project: project.clone(),
                base_version: project.server_updated_at.clone(),
            }),
            None => log::debug!("queued {action} for {id} has no local record, skipping"),
        }
    }
    request
}
