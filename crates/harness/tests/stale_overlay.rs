use std::cell::Cell;
use std::rc::Rc;

use tabsync_core::{MutationRecord, ProjectId};
use tabsync_engine::{BootstrapOutcome, GuardFailure};
use tabsync_harness::TestNetwork;
use tabsync_harness::fixtures::{
    OLDER_VERSION, OTHER_SCOPE, SCOPE, SERVER_VERSION, draft_with_qty, quote_project, stale_store,
    unversioned_quote_project,
};
use tabsync_storage::{KeyValueStore, MemoryStore, StorageError, StoreKeys};

fn p1() -> ProjectId {
    ProjectId::from("p1")
}

// ============================================================================
// Strict guard: negative
// ============================================================================

#[test]
fn stale_drafts_in_two_tabs_converge_to_server() -> Result<(), Box<dyn std::error::Error>> {
    let server = quote_project("p1", "Quote", 2);
    let mut net = TestNetwork::new(vec![server.clone()]);

    // Two browser profiles with different stale caches, each holding a
    // draft forked from an older server version, and nothing queued.
    let stale_a = quote_project("p1", "Quote", 5).with_server_version(OLDER_VERSION);
    let stale_b = quote_project("p1", "Quote (old)", 3).with_server_version(OLDER_VERSION);
    let store_a = stale_store(
        &[stale_a.clone()],
        &[("p1", draft_with_qty(&stale_a, SCOPE, Some(OLDER_VERSION), 7)?)],
        &[],
    )?;
    let store_b = stale_store(
        &[stale_b.clone()],
        &[("p1", draft_with_qty(&stale_b, SCOPE, Some(OLDER_VERSION), 8)?)],
        &[],
    )?;
    let a = net.add_tab_with_store(SCOPE, Box::new(store_a))?;
    let b = net.add_tab_with_store(SCOPE, Box::new(store_b))?;

    for tab in [a, b] {
        let outcome = net.tab_mut(tab).engine.bootstrap_from_server();
        let report = outcome.report().ok_or("bootstrap did not commit")?;
        assert_eq!(
            report.overlays_discarded,
            vec![(p1(), GuardFailure::BaseVersionMismatch)]
        );
        assert_eq!(net.tab(tab).item_field("p1", "i1", "qty_1"), Some(2.into()));
        assert!(!net.tab(tab).engine.store().has_draft_slot(&p1()));
    }
    assert_eq!(net.tab(a).engine.get_projects(), net.tab(b).engine.get_projects());
    assert_eq!(net.tab(a).project("p1"), Some(server));

    // A second round changes nothing.
    for tab in [a, b] {
        let version = net.tab(tab).engine.version();
        let projects = net.tab(tab).engine.get_projects();
        let outcome = net.tab_mut(tab).engine.bootstrap_from_server();
        let report = outcome.report().ok_or("bootstrap did not commit")?;
        assert!(!report.changed);
        assert_eq!(net.tab(tab).engine.version(), version);
        assert_eq!(net.tab(tab).engine.get_projects(), projects);
    }
    Ok(())
}

#[test]
fn matching_draft_with_empty_queue_is_discarded() -> Result<(), Box<dyn std::error::Error>> {
    let server = quote_project("p1", "Quote", 2);
    let mut net = TestNetwork::new(vec![server.clone()]);
    let store = stale_store(
        &[server.clone()],
        &[("p1", draft_with_qty(&server, SCOPE, Some(SERVER_VERSION), 9)?)],
        &[],
    )?;
    let tab = net.add_tab_with_store(SCOPE, Box::new(store))?;

    let outcome = net.tab_mut(tab).engine.bootstrap_from_server();
    let report = outcome.report().ok_or("bootstrap did not commit")?;
    assert_eq!(report.overlays_discarded, vec![(p1(), GuardFailure::QueueEmpty)]);
    assert_eq!(net.tab(tab).item_field("p1", "i1", "qty_1"), Some(2.into()));
    assert!(!net.tab(tab).engine.store().has_draft_slot(&p1()));
    Ok(())
}

#[test]
fn draft_from_another_session_is_discarded() -> Result<(), Box<dyn std::error::Error>> {
    let server = quote_project("p1", "Quote", 2);
    let mut net = TestNetwork::new(vec![server.clone()]);
    let store = stale_store(
        &[server.clone()],
        &[("p1", draft_with_qty(&server, OTHER_SCOPE, Some(SERVER_VERSION), 9)?)],
        &[MutationRecord::default()],
    )?;
    let tab = net.add_tab_with_store(SCOPE, Box::new(store))?;

    let outcome = net.tab_mut(tab).engine.bootstrap_from_server();
    let report = outcome.report().ok_or("bootstrap did not commit")?;
    assert_eq!(report.overlays_discarded, vec![(p1(), GuardFailure::SessionMismatch)]);
    assert_eq!(net.tab(tab).item_field("p1", "i1", "qty_1"), Some(2.into()));
    assert!(!net.tab(tab).engine.store().has_draft_slot(&p1()));
    // Discarding a draft never drains the queue.
    assert_eq!(net.tab(tab).engine.pending_mutations().len(), 1);
    Ok(())
}

#[test]
fn draft_without_base_version_is_discarded() -> Result<(), Box<dyn std::error::Error>> {
    let server = quote_project("p1", "Quote", 2);
    let mut net = TestNetwork::new(vec![server.clone()]);
    let store = stale_store(
        &[server.clone()],
        &[("p1", draft_with_qty(&server, SCOPE, None, 9)?)],
        &[MutationRecord::default()],
    )?;
    let tab = net.add_tab_with_store(SCOPE, Box::new(store))?;

    let outcome = net.tab_mut(tab).engine.bootstrap_from_server();
    let report = outcome.report().ok_or("bootstrap did not commit")?;
    assert_eq!(report.overlays_discarded, vec![(p1(), GuardFailure::BaseVersionMismatch)]);
    assert_eq!(net.tab(tab).item_field("p1", "i1", "qty_1"), Some(2.into()));
    Ok(())
}

#[test]
fn non_pending_draft_is_cleared() -> Result<(), Box<dyn std::error::Error>> {
    let server = quote_project("p1", "Quote", 2);
    let mut net = TestNetwork::new(vec![server.clone()]);
    let mut draft = draft_with_qty(&server, SCOPE, Some(SERVER_VERSION), 9)?;
    draft.pending = false;
    let store = stale_store(&[server.clone()], &[("p1", draft)], &[MutationRecord::default()])?;
    let tab = net.add_tab_with_store(SCOPE, Box::new(store))?;

    let outcome = net.tab_mut(tab).engine.bootstrap_from_server();
    let report = outcome.report().ok_or("bootstrap did not commit")?;
    assert_eq!(report.overlays_discarded, vec![(p1(), GuardFailure::NotPending)]);
    assert_eq!(net.tab(tab).item_field("p1", "i1", "qty_1"), Some(2.into()));
    assert!(!net.tab(tab).engine.store().has_draft_slot(&p1()));
    Ok(())
}

#[test]
fn malformed_draft_slot_is_treated_as_absent_and_removed() -> Result<(), Box<dyn std::error::Error>> {
    let server = quote_project("p1", "Quote", 2);
    let mut net = TestNetwork::new(vec![server.clone()]);
    let store = stale_store(&[server.clone()], &[], &[MutationRecord::default()])?;
    let mut raw = store.clone();
    tabsync_storage::KeyValueStore::set(&mut raw, "tabsync_project_draft_v1_p1", "{broken")?;
    let tab = net.add_tab_with_store(SCOPE, Box::new(store))?;

    let outcome = net.tab_mut(tab).engine.bootstrap_from_server();
    let report = outcome.report().ok_or("bootstrap did not commit")?;
    assert!(report.overlays_discarded.is_empty());
    assert_eq!(net.tab(tab).item_field("p1", "i1", "qty_1"), Some(2.into()));
    assert!(!net.tab(tab).engine.store().has_draft_slot(&p1()));
    Ok(())
}

// ============================================================================
// Strict guard: positive
// ============================================================================

#[test]
fn matching_draft_with_pending_queue_overrides_server() -> Result<(), Box<dyn std::error::Error>> {
    let server = quote_project("p1", "Quote", 2);
    let mut net = TestNetwork::new(vec![server.clone()]);
    let queue: Vec<MutationRecord> = serde_json::from_str(r#"[{"at":1771239600000}]"#)?;
    let store = stale_store(
        &[quote_project("p1", "Quote", 2)],
        &[("p1", draft_with_qty(&server, SCOPE, Some(SERVER_VERSION), 9)?)],
        &queue,
    )?;
    let tab = net.add_tab_with_store(SCOPE, Box::new(store))?;

    let outcome = net.tab_mut(tab).engine.bootstrap_from_server();
    let report = outcome.report().ok_or("bootstrap did not commit")?;
    assert_eq!(report.overlays_applied, vec![p1()]);
    assert_eq!(net.tab(tab).item_field("p1", "i1", "qty_1"), Some(9.into()));
    assert!(!net.tab(tab).engine.store().has_draft_slot(&p1()));

    // The server's version survives the overlay.
    let merged = net.tab(tab).project("p1").ok_or("p1 missing")?;
    assert_eq!(merged.server_updated_at.as_deref(), Some(SERVER_VERSION));
    Ok(())
}

#[test]
fn unflushed_edit_survives_bootstrap_in_sibling_tab() -> Result<(), Box<dyn std::error::Error>> {
    let mut net = TestNetwork::new(vec![quote_project("p1", "Quote", 2)]);
    let a = net.add_tab(SCOPE)?;
    let b = net.add_tab(SCOPE)?;
    net.tab_mut(a).engine.bootstrap_from_server();

    net.tab_mut(a).set_item_field("p1", "i1", "qty_1", 4)?;
    let fired = net.advance(250);
    assert_eq!(fired.len(), 1);
    let report = fired[0].1.report().ok_or("bootstrap did not commit")?;
    assert_eq!(report.overlays_applied, vec![p1()]);

    // The edit is still visible in both tabs and still queued.
    assert_eq!(net.tab(a).item_field("p1", "i1", "qty_1"), Some(4.into()));
    assert_eq!(net.tab(b).item_field("p1", "i1", "qty_1"), Some(4.into()));
    assert_eq!(net.tab(b).engine.pending_mutations().len(), 1);
    assert!(!net.tab(b).engine.store().has_draft_slot(&p1()));
    Ok(())
}

#[test]
fn edit_survives_sibling_bootstrap_when_server_reports_only_updated_at()
-> Result<(), Box<dyn std::error::Error>> {
    let mut net = TestNetwork::new(vec![unversioned_quote_project("p1", "Quote", 2)]);
    let a = net.add_tab(SCOPE)?;
    let b = net.add_tab(SCOPE)?;
    net.tab_mut(a).engine.bootstrap_from_server();

    net.tab_mut(a).set_item_field("p1", "i1", "qty_1", 4)?;
    let draft = net.tab(a).engine.store().read_draft(&p1()).ok_or("no draft written")?;
    assert_eq!(draft.base_version.as_deref(), Some(SERVER_VERSION));

    let fired = net.advance(250);
    let report = fired[0].1.report().ok_or("bootstrap did not commit")?;
    assert_eq!(report.overlays_applied, vec![p1()]);
    assert!(report.overlays_discarded.is_empty());
    assert_eq!(net.tab(b).item_field("p1", "i1", "qty_1"), Some(4.into()));
    assert_eq!(net.tab(b).engine.pending_mutations().len(), 1);
    Ok(())
}

#[test]
fn sibling_tab_in_another_session_drops_the_draft() -> Result<(), Box<dyn std::error::Error>> {
    let mut net = TestNetwork::new(vec![quote_project("p1", "Quote", 2)]);
    let a = net.add_tab(SCOPE)?;
    let b = net.add_tab(OTHER_SCOPE)?;
    net.tab_mut(a).engine.bootstrap_from_server();

    net.tab_mut(a).set_item_field("p1", "i1", "qty_1", 4)?;
    let fired = net.advance(250);
    let report = fired[0].1.report().ok_or("bootstrap did not commit")?;
    assert_eq!(report.overlays_discarded, vec![(p1(), GuardFailure::SessionMismatch)]);
    assert_eq!(net.tab(b).item_field("p1", "i1", "qty_1"), Some(2.into()));
    Ok(())
}

// ============================================================================
// Overlapping bootstraps
// ============================================================================

#[test]
fn interleaved_bootstraps_on_one_store_agree() -> Result<(), Box<dyn std::error::Error>> {
    let server = quote_project("p1", "Quote", 2);
    let mut net = TestNetwork::new(vec![server.clone(), quote_project("p2", "Other", 1)]);
    let a = net.add_tab(SCOPE)?;
    let b = net.add_tab(SCOPE)?;
    net.tab_mut(a).engine.bootstrap_from_server();
    net.tab_mut(a).set_item_field("p1", "i1", "qty_1", 6)?;

    // Initial load in one tab racing a signal-triggered cycle in another.
    net.tab_mut(b).engine.bootstrap_from_server();
    let after_first = net.tab(b).engine.get_projects();
    net.tab_mut(a).engine.bootstrap_from_server();
    net.tab_mut(b).engine.bootstrap_from_server();

    assert_eq!(net.tab(a).item_field("p1", "i1", "qty_1"), Some(2.into()));
    assert_eq!(after_first.len(), 2);
    assert_eq!(net.tab(a).engine.get_projects(), net.server.projects());
    assert_eq!(net.tab(b).engine.get_projects(), net.server.projects());
    Ok(())
}

#[test]
fn draft_for_project_missing_upstream_is_left_alone() -> Result<(), Box<dyn std::error::Error>> {
    let mut net = TestNetwork::new(vec![quote_project("p1", "Quote", 2)]);
    let orphan = quote_project("p9", "Local only", 1);
    let store = stale_store(
        &[orphan.clone()],
        &[("p9", draft_with_qty(&orphan, SCOPE, Some(SERVER_VERSION), 3)?)],
        &[MutationRecord::default()],
    )?;
    let tab = net.add_tab_with_store(SCOPE, Box::new(store))?;

    net.tab_mut(tab).engine.bootstrap_from_server();
    assert!(net.tab(tab).project("p9").is_none());
    assert!(net.tab(tab).engine.store().has_draft_slot(&ProjectId::from("p9")));
    Ok(())
}

// ============================================================================
// Commit failure
// ============================================================================

/// Memory store whose writes to one slot fail while `broken` is set.
struct BrokenSlot {
    inner: MemoryStore,
    key: String,
    broken: Rc<Cell<bool>>,
}

impl KeyValueStore for BrokenSlot {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.broken.get() && key == self.key {
            return Err(std::io::Error::other("disk full").into());
        }
        self.inner.set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.inner.keys_with_prefix(prefix)
    }
}

#[test]
fn failed_commit_keeps_the_draft_for_the_next_bootstrap() -> Result<(), Box<dyn std::error::Error>> {
    let server = quote_project("p1", "Quote", 2);
    let mut net = TestNetwork::new(vec![server.clone()]);
    let store = stale_store(
        &[server.clone()],
        &[("p1", draft_with_qty(&server, SCOPE, Some(SERVER_VERSION), 9)?)],
        &[MutationRecord::default()],
    )?;
    let broken = Rc::new(Cell::new(true));
    let tab = net.add_tab_with_store(
        SCOPE,
        Box::new(BrokenSlot {
            inner: store,
            key: StoreKeys::default().projects(),
            broken: Rc::clone(&broken),
        }),
    )?;

    let outcome = net.tab_mut(tab).engine.bootstrap_from_server();
    assert!(matches!(outcome, BootstrapOutcome::CommitFailed(_)));
    assert!(net.tab(tab).engine.store().has_draft_slot(&p1()));
    assert_eq!(net.tab(tab).item_field("p1", "i1", "qty_1"), Some(2.into()));

    broken.set(false);
    let outcome = net.tab_mut(tab).engine.bootstrap_from_server();
    let report = outcome.report().ok_or("bootstrap did not commit")?;
    assert_eq!(report.overlays_applied, vec![p1()]);
    assert_eq!(net.tab(tab).item_field("p1", "i1", "qty_1"), Some(9.into()));
    assert!(!net.tab(tab).engine.store().has_draft_slot(&p1()));
    Ok(())
}
