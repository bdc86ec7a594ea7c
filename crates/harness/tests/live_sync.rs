use tabsync_core::{MutationKind, Project, ProjectId};
use tabsync_harness::TestNetwork;
use tabsync_harness::fixtures::{SCOPE, quote_project, stale_store};
use tabsync_storage::StoreKeys;

// ============================================================================
// Bootstrap and mutation path
// ============================================================================

#[test]
fn bootstrap_adopts_server_collection() -> Result<(), Box<dyn std::error::Error>> {
    let mut net = TestNetwork::new(vec![quote_project("p1", "Server", 2)]);
    let stale = stale_store(
        &[quote_project("p1", "Local", 5), quote_project("gone", "Deleted upstream", 1)],
        &[],
        &[],
    )?;
    let tab = net.add_tab_with_store(SCOPE, Box::new(stale))?;

    let outcome = net.tab_mut(tab).engine.bootstrap_from_server();
    let report = outcome.report().ok_or("bootstrap did not commit")?;
    assert_eq!(report.projects, 1);
    assert!(report.changed);

    // Server is authoritative for membership and for every field.
    let local = net.tab(tab).engine.get_projects();
    assert_eq!(local, net.server.projects());
    assert_eq!(net.tab(tab).project_name("p1").as_deref(), Some("Server"));
    assert!(net.tab(tab).project("gone").is_none());
    Ok(())
}

#[test]
fn update_is_visible_stamped_and_signalled() -> Result<(), Box<dyn std::error::Error>> {
    let mut net = TestNetwork::new(vec![quote_project("p1", "Server", 2)]);
    let tab = net.add_tab(SCOPE)?;
    net.tab_mut(tab).engine.bootstrap_from_server();
    let before = net.tab(tab).engine.version().ok_or("no version after bootstrap")?;

    net.clock.advance(10);
    let after = net.tab_mut(tab).rename("p1", "Renamed locally")?;

    assert!(after > before);
    assert_eq!(net.tab(tab).engine.version(), Some(after));
    assert_eq!(net.tab(tab).project_name("p1").as_deref(), Some("Renamed locally"));

    let signal = net.tab(tab).engine.last_signal().ok_or("no signal written")?;
    assert_eq!(signal.kind, MutationKind::UpdateProject);
    assert_eq!(signal.kind.as_str(), "update_project");
    assert_eq!(signal.origin, net.tab(tab).engine.context_id());

    let queue = net.tab(tab).engine.pending_mutations();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].project_id, Some(ProjectId::from("p1")));

    // server_updated_at is never touched by a local edit
    let local = net.tab(tab).project("p1").ok_or("p1 missing")?;
    assert_eq!(local.server_updated_at.as_deref(), Some("2026-02-16T11:00:00Z"));
    assert_ne!(local.updated_at, local.server_updated_at);

    // No network traffic on the mutation path.
    assert_eq!(net.server.requests().len(), 1);
    Ok(())
}

#[test]
fn every_mutation_advances_the_version() -> Result<(), Box<dyn std::error::Error>> {
    let mut net = TestNetwork::new(vec![quote_project("p1", "Server", 2)]);
    let tab = net.add_tab(SCOPE)?;
    net.tab_mut(tab).engine.bootstrap_from_server();

    // Same clock reading for all three: the counter carries the order.
    let a = net.tab_mut(tab).set_item_field("p1", "i1", "qty_1", 3)?;
    let b = net.tab_mut(tab).engine.add_project(Project::new("p2", "Added"))?;
    let c = net.tab_mut(tab).engine.delete_project(&ProjectId::from("p2"))?;
    assert!(a < b && b < c);

    let kinds: Vec<_> = net
        .tab(tab)
        .engine
        .pending_mutations()
        .into_iter()
        .map(|r| r.action)
        .collect();
    assert_eq!(
        kinds,
        vec![
            MutationKind::UpdateProject,
            MutationKind::AddProject,
            MutationKind::DeleteProject
        ]
    );
    assert_eq!(
        net.tab(tab).engine.last_signal().map(|s| s.kind),
        Some(MutationKind::DeleteProject)
    );
    Ok(())
}

#[test]
fn add_existing_and_delete_missing_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let mut net = TestNetwork::new(vec![quote_project("p1", "Server", 2)]);
    let tab = net.add_tab(SCOPE)?;
    net.tab_mut(tab).engine.bootstrap_from_server();
    let version = net.tab(tab).engine.version();

    assert!(net.tab_mut(tab).engine.add_project(Project::new("p1", "Dup")).is_err());
    assert!(net.tab_mut(tab).engine.delete_project(&ProjectId::from("nope")).is_err());

    assert_eq!(net.tab(tab).engine.version(), version);
    assert!(net.tab(tab).engine.pending_mutations().is_empty());
    Ok(())
}

// ============================================================================
// Cross-tab broadcast
// ============================================================================

#[test]
fn foreign_signal_triggers_debounced_bootstrap() -> Result<(), Box<dyn std::error::Error>> {
    let mut net = TestNetwork::new(vec![quote_project("p1", "Server", 2)]);
    let a = net.add_tab(SCOPE)?;
    let b = net.add_tab(SCOPE)?;
    net.tab_mut(a).engine.bootstrap_from_server();

    net.tab_mut(a).rename("p1", "Tab A edit")?;
    // Meanwhile the server moved on under a newer version.
    net.server.set_projects(vec![
        quote_project("p1", "RemoteTabEdit", 2).with_server_version("2026-02-16T11:05:00Z"),
    ]);

    assert!(net.advance(100).is_empty());
    assert!(net.tab(b).engine.listener().debouncer().is_armed());

    let fired = net.advance(160);
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].0, b);
    assert!(fired[0].1.is_committed());

    assert_eq!(net.tab(b).project_name("p1").as_deref(), Some("RemoteTabEdit"));
    assert_eq!(net.tab(b).engine.get_projects(), net.server.projects());
    Ok(())
}

#[test]
fn own_signals_do_not_trigger_bootstrap() -> Result<(), Box<dyn std::error::Error>> {
    let mut net = TestNetwork::new(vec![quote_project("p1", "Server", 2)]);
    let a = net.add_tab(SCOPE)?;
    net.tab_mut(a).engine.bootstrap_from_server();
    let fetches = net.server.requests().len();

    net.tab_mut(a).rename("p1", "Solo edit")?;
    assert!(net.advance(1_000).is_empty());
    assert_eq!(net.server.requests().len(), fetches);
    assert_eq!(net.tab(a).project_name("p1").as_deref(), Some("Solo edit"));
    Ok(())
}

#[test]
fn burst_of_signals_coalesces_into_one_bootstrap() -> Result<(), Box<dyn std::error::Error>> {
    let mut net = TestNetwork::new(vec![quote_project("p1", "Server", 2)]);
    let a = net.add_tab(SCOPE)?;
    let b = net.add_tab(SCOPE)?;
    net.tab_mut(a).engine.bootstrap_from_server();

    let mut fired = Vec::new();
    for qty in 3..6 {
        net.tab_mut(a).set_item_field("p1", "i1", "qty_1", qty)?;
        fired.extend(net.advance(100));
    }
    // Each signal pushed the deadline out again.
    assert!(fired.is_empty());
    fired.extend(net.advance(100));
    assert!(fired.is_empty());

    fired.extend(net.advance(60));
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].0, b);
    assert!(net.advance(1_000).is_empty());
    Ok(())
}

#[test]
fn raw_store_event_from_another_tab_schedules_bootstrap() -> Result<(), Box<dyn std::error::Error>> {
    let mut net = TestNetwork::new(vec![quote_project("p1", "Server", 2)]);
    let a = net.add_tab(SCOPE)?;
    net.tab_mut(a).engine.bootstrap_from_server();
    net.server.set_projects(vec![quote_project("p1", "RemoteTabEdit", 2)]);

    let keys = StoreKeys::default();
    let unrelated = net.tab_mut(a).engine.on_store_event(&keys.projects(), Some("[]"));
    assert!(!unrelated);

    let payload = r#"{"tab":"another-tab","at":1771243200000,"type":"mutation"}"#;
    assert!(net.tab_mut(a).engine.on_store_event(&keys.signal(), Some(payload)));

    assert!(net.advance(200).is_empty());
    let fired = net.advance(60);
    assert_eq!(fired.len(), 1);
    assert_eq!(net.tab(a).project_name("p1").as_deref(), Some("RemoteTabEdit"));
    Ok(())
}

#[test]
fn raw_store_event_echoing_own_signal_is_ignored() -> Result<(), Box<dyn std::error::Error>> {
    let mut net = TestNetwork::new(vec![quote_project("p1", "Server", 2)]);
    let a = net.add_tab(SCOPE)?;
    net.tab_mut(a).engine.bootstrap_from_server();
    net.tab_mut(a).rename("p1", "Edit")?;

    let raw = serde_json::to_string(&net.tab(a).engine.last_signal().ok_or("no signal")?)?;
    let signal_key = StoreKeys::default().signal();
    assert!(!net.tab_mut(a).engine.on_store_event(&signal_key, Some(&raw)));
    assert!(net.advance(500).is_empty());
    Ok(())
}

#[test]
fn edit_flushed_by_one_tab_converges_in_another() -> Result<(), Box<dyn std::error::Error>> {
    let mut net = TestNetwork::new(vec![quote_project("p1", "Server", 2)]);
    let a = net.add_tab(SCOPE)?;
    let b = net.add_tab(SCOPE)?;
    net.tab_mut(a).engine.bootstrap_from_server();

    net.tab_mut(a).set_item_field("p1", "i1", "qty_1", 7)?;
    net.tab_mut(a).engine.flush_queue();
    assert_eq!(net.server.project("p1").and_then(|p| p.item("i1")?.field("qty_1").cloned()), Some(7.into()));

    net.advance(250);
    assert_eq!(net.tab(b).item_field("p1", "i1", "qty_1"), Some(7.into()));
    assert_eq!(net.tab(b).engine.get_projects(), net.server.projects());
    Ok(())
}
