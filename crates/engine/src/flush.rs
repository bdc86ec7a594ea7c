//! Draining the sync queue to the bulk endpoint.
//!
//! Draining is its own operation: a bootstrap never removes queue records.
//! A successful flush adopts the server's confirmed copies, so the next edit
//! is based on the version the server now holds.

use tabsync_core::{Project, ProjectId};
use tabsync_storage::KeyValueStore;

use crate::remote::{RemoteError, Transport};
use crate::{Engine, EngineError, queue};

#[derive(Debug)]
pub enum FlushOutcome {
    /// Nothing was queued.
    Idle,
    /// The session is known dead; the queue is kept.
    SkippedAuthInvalid,
    /// The server accepted the batch; `records` queue entries were removed
    /// and `confirmed` local records replaced by the server's copies.
    Flushed { records: usize, confirmed: usize },
    /// The server refused one project and returned its canonical copy, which
    /// replaced the local record. That project's queue records were dropped;
    /// the rest stay queued for the next flush.
    Conflict { project_id: ProjectId, code: String },
    /// The server rejected the session. The queue is kept; setting the
    /// auth-invalid flag is the application's call.
    Unauthorized,
    /// Transport failure, unexpected response, or a local write failure.
    Failed(EngineError),
}

impl<S: KeyValueStore, T: Transport> Engine<S, T> {
    pub fn flush_queue(&mut self) -> FlushOutcome {
        if self.auth_invalid() {
            return FlushOutcome::SkippedAuthInvalid;
        }

        let snapshot = self.store.read_queue();
        if snapshot.is_empty() {
            return FlushOutcome::Idle;
        }

        let batch = queue::collapse(&snapshot, &self.store.read_projects());
        let confirmed = if batch.is_empty() {
            Vec::new()
        } else {
            match self.remote.push_bulk(&batch) {
                Ok(confirmed) => confirmed,
                Err(e) => return self.flush_failed(e),
            }
        };

        let trimmed = queue::remove_flushed(&mut self.store, &snapshot)
            .map_err(EngineError::from)
            .and_then(|records| Ok((records, self.adopt_confirmed(confirmed)?)));
        match trimmed {
            Ok((records, confirmed)) => {
                log::info!(
                    "flushed {} projects, {} deletes ({records} queue records, {confirmed} confirmed)",
                    batch.projects.len(),
                    batch.deleted.len()
                );
                FlushOutcome::Flushed { records, confirmed }
            }
            Err(e) => {
                log::warn!("bulk push accepted but local state could not be updated: {e}");
                FlushOutcome::Failed(e)
            }
        }
    }

    fn flush_failed(&mut self, error: RemoteError) -> FlushOutcome {
        match error {
            RemoteError::Unauthorized => {
                log::warn!("bulk push rejected: session invalid");
                FlushOutcome::Unauthorized
            }
            RemoteError::Conflict(body) => {
                let body = *body;
                log::warn!("bulk push refused: {body}");
                if let Err(e) = self.adopt_canonical(&body.project_id, body.project) {
                    log::warn!("could not adopt canonical {}: {e}", body.project_id);
                }
                FlushOutcome::Conflict {
                    project_id: body.project_id,
                    code: body.code,
                }
            }
            other => {
                log::warn!("bulk push failed, queue kept: {other}");
                FlushOutcome::Failed(other.into())
            }
        }
    }

    fn adopt_canonical(
        &mut self,
        project_id: &ProjectId,
        canonical: Option<Project>,
    ) -> Result<(), EngineError> {
        queue::remove_project(&mut self.store, project_id)?;
        let Some(mut canonical) = canonical else {
            return Ok(());
        };
        canonical.pin_server_version();
        let mut projects = self.store.read_projects();
        match projects.iter_mut().find(|p| &p.id == project_id) {
            Some(slot) => *slot = canonical,
            None => projects.push(canonical),
        }
        self.store.write_projects(&projects)?;
        self.advance_version(self.clock.now_ms())?;
        Ok(())
    }

    /// Replace local records with the copies the server just accepted and
    /// drop their drafts, whose base version is now stale.
    fn adopt_confirmed(&mut self, confirmed: Vec<Project>) -> Result<usize, EngineError> {
        if confirmed.is_empty() {
            return Ok(0);
        }
        let mut projects = self.store.read_projects();
        let mut adopted = Vec::new();
        for mut project in confirmed {
            if let Some(slot) = projects.iter_mut().find(|p| p.id == project.id) {
                project.pin_server_version();
                adopted.push(project.id.clone());
                *slot = project;
            }
        }
        if adopted.is_empty() {
            return Ok(0);
        }
        self.store.write_projects(&projects)?;
        for project_id in &adopted {
            self.store.clear_draft(project_id)?;
        }
        self.advance_version(self.clock.now_ms())?;
        Ok(adopted.len())
    }
}
