use std::path::PathBuf;
use std::rc::Rc;

use tabsync_core::Project;
use tabsync_engine::{BootstrapOutcome, EngineConfig, EngineError, SignalChannel};
use tabsync_storage::{KeyValueStore, MemoryStore, SqliteStore, StorageError};
use tempfile::TempDir;

use crate::{FakeServer, ManualClock, START_MS, TestTab};

/// Where the tabs of a network keep their state.
enum SharedStore {
    Memory(MemoryStore),
    Sqlite { _dir: TempDir, path: PathBuf },
}

/// Several tabs of one browser profile: one store, one signal channel, one
/// clock, all talking to the same server.
pub struct TestNetwork {
    pub server: Rc<FakeServer>,
    pub clock: ManualClock,
    channel: SignalChannel,
    // Tabs drop before the store so SQLite connections close before the
    // temp dir goes away.
    tabs: Vec<TestTab>,
    store: SharedStore,
}

impl TestNetwork {
    pub fn new(server_projects: Vec<Project>) -> Self {
        Self::with_store(server_projects, SharedStore::Memory(MemoryStore::new()))
    }

    /// Tabs open their own connection to one SQLite file in a temp dir.
    pub fn with_sqlite(server_projects: Vec<Project>) -> Result<Self, StorageError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("tabs.db");
        Ok(Self::with_store(
            server_projects,
            SharedStore::Sqlite { _dir: dir, path },
        ))
    }

    fn with_store(server_projects: Vec<Project>, store: SharedStore) -> Self {
        Self {
            server: Rc::new(FakeServer::with_projects(server_projects)),
            clock: ManualClock::starting_at(START_MS),
            channel: EngineConfig::default().signal_channel(),
            tabs: Vec::new(),
            store,
        }
    }

    fn open_store(&self) -> Result<Box<dyn KeyValueStore>, StorageError> {
        let store: Box<dyn KeyValueStore> = match &self.store {
            SharedStore::Memory(store) => Box::new(store.clone()),
            SharedStore::Sqlite { path, .. } => {
                Box::new(SqliteStore::open(&path.to_string_lossy())?)
            }
        };
        Ok(store)
    }

    /// Open a tab on the shared store.
    pub fn add_tab(&mut self, scope: &str) -> Result<usize, EngineError> {
        let store = self.open_store()?;
        self.add_tab_with_store(scope, store)
    }

    /// Open a tab on a store of its own (another browser profile) that still
    /// hears the shared channel.
    pub fn add_tab_with_store(
        &mut self,
        scope: &str,
        store: Box<dyn KeyValueStore>,
    ) -> Result<usize, EngineError> {
        let tab = TestTab::new(
            scope,
            store,
            Rc::clone(&self.server),
            self.channel.clone(),
            self.clock.clone(),
        )?;
        let index = self.tabs.len();
        self.tabs.push(tab);
        Ok(index)
    }

    pub fn tab(&self, index: usize) -> &TestTab {
        &self.tabs[index]
    }

    pub fn tab_mut(&mut self, index: usize) -> &mut TestTab {
        &mut self.tabs[index]
    }

    /// Move the clock forward and let every tab run its event loop once.
    /// Returns the bootstraps that fired, by tab index.
    pub fn advance(&mut self, ms: u64) -> Vec<(usize, BootstrapOutcome)> {
        self.clock.advance(ms);
        self.poll_all()
    }

    pub fn poll_all(&mut self) -> Vec<(usize, BootstrapOutcome)> {
        self.tabs
            .iter_mut()
            .enumerate()
            .filter_map(|(i, tab)| tab.engine.poll().map(|outcome| (i, outcome)))
            .collect()
    }
}
