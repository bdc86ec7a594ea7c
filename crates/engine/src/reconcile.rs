//! Bootstrap-from-server: fetch the canonical collection, fold in drafts that
//! pass the strict guard, commit, then clear every consumed draft.
//!
//! The cycle is a deterministic function of the server response, the
//! persisted drafts and whether the queue is empty, so running it again (or
//! from two tabs) lands on the same committed collection.

use tabsync_core::{ProjectId, VersionStamp};
use tabsync_storage::{KeyValueStore, collection_digest};

use crate::overlay::{GuardFailure, OverlayOutcome};
use crate::remote::{RemoteError, Transport};
use crate::{Engine, EngineError, queue};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Number of projects committed.
    pub projects: usize,
    pub overlays_applied: Vec<ProjectId>,
    pub overlays_discarded: Vec<(ProjectId, GuardFailure)>,
    /// Version stamp after the commit.
    pub version: Option<VersionStamp>,
    /// Whether the committed collection differs from the local one it replaced.
    pub changed: bool,
}

#[derive(Debug)]
pub enum BootstrapOutcome {
    Committed(BootstrapReport),
    /// The session is known dead; no request was made.
    SkippedAuthInvalid,
    /// The server could not be reached or refused; local state is untouched.
    FetchFailed(RemoteError),
    /// The fetch succeeded but the commit could not be written. Drafts are
    /// cleared only after the collection write, so a failed write keeps them.
    CommitFailed(EngineError),
}

impl BootstrapOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }

    pub fn report(&self) -> Option<&BootstrapReport> {
        match self {
            Self::Committed(report) => Some(report),
            _ => None,
        }
    }
}

impl<S: KeyValueStore, T: Transport> Engine<S, T> {
    /// Rebuild the local collection from the server. Never returns an error:
    /// every failure is reported in the outcome and leaves the local cache as
    /// the best available view.
    pub fn bootstrap_from_server(&mut self) -> BootstrapOutcome {
        if self.auth_invalid() {
            log::debug!("bootstrap skipped: session invalid");
            return BootstrapOutcome::SkippedAuthInvalid;
        }

        let server_projects = match self.remote.fetch_projects() {
            Ok(projects) => projects,
            Err(e) => {
                log::warn!("bootstrap fetch failed, keeping local cache: {e}");
                return BootstrapOutcome::FetchFailed(e);
            }
        };

        match self.commit_bootstrap(server_projects) {
            Ok(report) => {
                log::info!(
                    "bootstrap committed {} projects ({} drafts applied, {} discarded, changed: {})",
                    report.projects,
                    report.overlays_applied.len(),
                    report.overlays_discarded.len(),
                    report.changed
                );
                BootstrapOutcome::Committed(report)
            }
            Err(e) => {
                log::warn!("bootstrap commit failed: {e}");
                BootstrapOutcome::CommitFailed(e)
            }
        }
    }

    fn commit_bootstrap(
        &mut self,
        server_projects: Vec<tabsync_core::Project>,
    ) -> Result<BootstrapReport, EngineError> {
        let queue_pending = queue::is_pending(&self.store);
        let previous = collection_digest(&self.store.read_projects())?;
        let mut report = BootstrapReport::default();
        let mut merged = Vec::with_capacity(server_projects.len());
        let mut consumed = Vec::new();

        for mut server in server_projects {
            server.pin_server_version();
            let project_id = server.id.clone();
            let draft = self.store.read_draft(&project_id);
            let decision = self
                .overlay_manager
                .resolve(server, draft.as_ref(), queue_pending);

            match decision.outcome {
                OverlayOutcome::NoDraft => {}
                OverlayOutcome::Applied => report.overlays_applied.push(project_id.clone()),
                OverlayOutcome::Discarded(reason) => {
                    report.overlays_discarded.push((project_id.clone(), reason))
                }
            }

            consumed.push(project_id);
            merged.push(decision.project);
        }

        self.store.write_projects(&merged)?;
        report.projects = merged.len();

        // Single use: cleared whether applied or rejected, but only once the
        // collection holds whatever an applied draft contributed.
        for project_id in &consumed {
            self.store.clear_draft(project_id)?;
        }

        // Only a commit that changes the collection moves the stamp, so a
        // repeated bootstrap is a fixed point.
        if collection_digest(&merged)? != previous {
            let now = self.clock.now_ms();
            let prev = self.store.read_version();
            let next = VersionStamp::next_after(prev.as_ref(), now);
            self.store.write_version(&next)?;
            report.changed = true;
        }
        report.version = self.store.read_version();
        Ok(report)
    }
}
