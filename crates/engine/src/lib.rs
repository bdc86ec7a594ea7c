pub mod broadcast;
pub mod config;
pub mod error;
pub mod flush;
pub mod lock;
pub mod overlay;
pub mod queue;
pub mod reconcile;
pub mod remote;

pub use broadcast::{Debouncer, SignalChannel, SignalListener};
pub use config::EngineConfig;
pub use error::EngineError;
pub use flush::FlushOutcome;
pub use lock::LockStatusError;
pub use overlay::{GuardFailure, OverlayDecision, OverlayManager, OverlayOutcome};
pub use reconcile::{BootstrapOutcome, BootstrapReport};
pub use remote::{
    BulkEntry, BulkRequest, ConflictBody, Method, RemoteClient, RemoteError, Request, Response,
    Transport, TransportError,
};

use tabsync_core::{
    Clock, ContextId, MutationKind, MutationRecord, Project, ProjectId, SessionContext,
    SyncSignal, VersionStamp, clock::ms_to_rfc3339,
};
use tabsync_storage::{KeyValueStore, ProjectStore, StoreKeys};

/// One execution context (tab) of the sync engine.
///
/// Owns its handle on the shared store, its end of the signal channel and its
/// view of the session. All methods run to completion before returning; the
/// only suspension points are the transport calls.
pub struct Engine<S, T> {
    context_id: ContextId,
    session: SessionContext,
    store: ProjectStore<S>,
    remote: RemoteClient<T>,
    overlay_manager: OverlayManager,
    channel: SignalChannel,
    listener: SignalListener,
    clock: Box<dyn Clock>,
    config: EngineConfig,
}

impl<S: KeyValueStore, T: Transport> Engine<S, T> {
    pub fn new(
        config: EngineConfig,
        session: SessionContext,
        store: S,
        transport: T,
        channel: SignalChannel,
        clock: Box<dyn Clock>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let context_id = ContextId::new();
        let listener = SignalListener::new(context_id, &channel, config.debounce_ms);
        Ok(Self {
            context_id,
            overlay_manager: OverlayManager::new(session.scope.clone()),
            store: ProjectStore::new(store, StoreKeys::new(config.namespace.clone())),
            remote: RemoteClient::new(transport),
            session,
            channel,
            listener,
            clock,
            config,
        })
    }

    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    pub fn store(&self) -> &ProjectStore<S> {
        &self.store
    }

    pub fn listener(&self) -> &SignalListener {
        &self.listener
    }

    fn auth_invalid(&self) -> bool {
        self.session.auth.is_invalid()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn get_projects(&self) -> Vec<Project> {
        self.store.read_projects()
    }

    pub fn get_project(&self, project_id: &ProjectId) -> Option<Project> {
        self.store
            .read_projects()
            .into_iter()
            .find(|p| &p.id == project_id)
    }

    pub fn version(&self) -> Option<VersionStamp> {
        self.store.read_version()
    }

    /// Mutations not yet confirmed by the server, oldest first.
    pub fn pending_mutations(&self) -> Vec<MutationRecord> {
        self.store.read_queue()
    }

    pub fn last_signal(&self) -> Option<SyncSignal> {
        self.store.read_signal()
    }

    // ========================================================================
    // Mutation Path
    // ========================================================================

    /// Upsert a project. The record is visible to `get_projects` immediately;
    /// reaching the server is left to [`Engine::flush_queue`].
    pub fn update_project(&mut self, project: Project) -> Result<VersionStamp, EngineError> {
        self.upsert(project, MutationKind::UpdateProject)
    }

    /// Insert a project that must not already exist locally.
    pub fn add_project(&mut self, project: Project) -> Result<VersionStamp, EngineError> {
        if self.get_project(&project.id).is_some() {
            return Err(EngineError::ProjectExists(project.id));
        }
        self.upsert(project, MutationKind::AddProject)
    }

    pub fn delete_project(&mut self, project_id: &ProjectId) -> Result<VersionStamp, EngineError> {
        let now = self.clock.now_ms();
        let mut projects = self.store.read_projects();
        let before = projects.len();
        projects.retain(|p| &p.id != project_id);
        if projects.len() == before {
            return Err(EngineError::ProjectNotFound(project_id.clone()));
        }

        self.store.write_projects(&projects)?;
        let version = self.advance_version(now)?;
        queue::enqueue(
            &mut self.store,
            MutationRecord::new(MutationKind::DeleteProject, project_id.clone(), now, self.context_id),
        )?;
        // Nothing left for a draft to overlay.
        self.store.clear_draft(project_id)?;
        self.emit_signal(MutationKind::DeleteProject, now)?;
        log::debug!("deleted {project_id}, version {version}");
        Ok(version)
    }

    fn upsert(&mut self, mut project: Project, kind: MutationKind) -> Result<VersionStamp, EngineError> {
        let now = self.clock.now_ms();
        let mut projects = self.store.read_projects();

        // server_updated_at only ever comes from the server, pinned on adoption.
        let existing = projects.iter().position(|p| p.id == project.id);
        project.server_updated_at = existing.and_then(|i| projects[i].server_updated_at.clone());
        project.updated_at = Some(ms_to_rfc3339(now));

        match existing {
            Some(i) => projects[i] = project.clone(),
            None => projects.push(project.clone()),
        }
        self.store.write_projects(&projects)?;

        let version = self.advance_version(now)?;
        let queued = queue::enqueue(
            &mut self.store,
            MutationRecord::new(kind.clone(), project.id.clone(), now, self.context_id),
        )?;
        let draft = self.overlay_manager.draft_for(&project)?;
        self.store.write_draft(&project.id, &draft)?;
        self.emit_signal(kind.clone(), now)?;

        if self.auth_invalid() {
            log::warn!("{kind} on {} kept locally while the session is invalid", project.id);
        }
        log::debug!("{kind} on {}, version {version}, {queued} queued", project.id);
        Ok(version)
    }

    fn advance_version(&mut self, now_ms: u64) -> Result<VersionStamp, EngineError> {
        let prev = self.store.read_version();
        let next = VersionStamp::next_after(prev.as_ref(), now_ms);
        self.store.write_version(&next)?;
        Ok(next)
    }

    /// Persist the signal, then tell the other tabs. The slot write comes
    /// last among the mutation's writes so observers never see a signal
    /// ahead of the state it announces.
    fn emit_signal(&mut self, kind: MutationKind, now_ms: u64) -> Result<(), EngineError> {
        let signal = SyncSignal {
            origin: self.context_id,
            at: now_ms,
            kind,
        };
        self.store.write_signal(&signal)?;
        self.channel.publish(&signal);
        Ok(())
    }

    // ========================================================================
    // Broadcast handling
    // ========================================================================

    /// Drain pending signals and run a bootstrap if the debounce window has
    /// elapsed since the last foreign one. Call this from the tab's event loop.
    pub fn poll(&mut self) -> Option<BootstrapOutcome> {
        let now = self.clock.now_ms();
        self.listener.pump(now);
        if self.listener.take_due(now) {
            Some(self.bootstrap_from_server())
        } else {
            None
        }
    }

    /// Feed a raw store change event. Only the sync-signal slot matters.
    pub fn on_store_event(&mut self, key: &str, new_value: Option<&str>) -> bool {
        if key != self.store.keys().signal() {
            return false;
        }
        let now = self.clock.now_ms();
        self.listener.on_raw_signal(new_value, now)
    }

    // ========================================================================
    // Administrative reset
    // ========================================================================

    /// Ask the server to reset the collection, drop every unconfirmed local
    /// edit, and rebuild from the server.
    pub fn reset_projects(&mut self) -> Result<BootstrapOutcome, EngineError> {
        if self.auth_invalid() {
            return Err(EngineError::AuthInvalid);
        }
        self.remote.reset_projects()?;

        queue::clear(&mut self.store)?;
        for project_id in self.store.draft_project_ids() {
            self.store.clear_draft(&project_id)?;
        }
        let now = self.clock.now_ms();
        self.emit_signal(MutationKind::ResetProjects, now)?;
        log::info!("projects reset on server, local queue and drafts cleared");
        Ok(self.bootstrap_from_server())
    }
}
