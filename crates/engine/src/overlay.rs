use tabsync_core::{CoreError, DraftOverlay, Project, SessionScope};

/// Why a persisted draft was not allowed to override the server's record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardFailure {
    NotPending,
    SessionMismatch,
    BaseVersionMismatch,
    QueueEmpty,
    /// The snapshot could not be laid over the server record.
    UnusableSnapshot,
}

impl GuardFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotPending => "not_pending",
            Self::SessionMismatch => "session_mismatch",
            Self::BaseVersionMismatch => "base_version_mismatch",
            Self::QueueEmpty => "queue_empty",
            Self::UnusableSnapshot => "unusable_snapshot",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayOutcome {
    NoDraft,
    Applied,
    Discarded(GuardFailure),
}

#[derive(Debug, Clone)]
pub struct OverlayDecision {
    pub project: Project,
    pub outcome: OverlayOutcome,
}

/// Creates drafts on the mutation path and decides, during a bootstrap,
/// whether a draft may stand in for the server's copy of a project.
pub struct OverlayManager {
    session_scope: SessionScope,
}

impl OverlayManager {
    pub fn new(session_scope: SessionScope) -> Self {
        Self { session_scope }
    }

    /// Draft for a project just edited locally. The base version is the
    /// server version the local record was last refreshed from, not the
    /// local version stamp.
    pub fn draft_for(&self, project: &Project) -> Result<DraftOverlay, CoreError> {
        Ok(DraftOverlay::pending(
            self.session_scope.clone(),
            project.server_updated_at.clone(),
            project.to_snapshot()?,
        ))
    }

    /// The strict guard. All three must hold for the draft to win:
    /// same session scope, base version equal to the version the server
    /// reports now, and at least one unconfirmed mutation queued.
    pub fn check(
        &self,
        draft: &DraftOverlay,
        server: &Project,
        queue_pending: bool,
    ) -> Result<(), GuardFailure> {
        if !draft.pending {
            return Err(GuardFailure::NotPending);
        }
        if draft.session_scope != self.session_scope {
            return Err(GuardFailure::SessionMismatch);
        }
        match (draft.base_version.as_deref(), server.server_version()) {
            (Some(base), Some(current)) if base == current => {}
            _ => return Err(GuardFailure::BaseVersionMismatch),
        }
        if !queue_pending {
            return Err(GuardFailure::QueueEmpty);
        }
        Ok(())
    }

    /// Final value of one server record given whatever draft was persisted
    /// for it. The caller clears the draft slot afterwards whatever the outcome.
    pub fn resolve(
        &self,
        server: Project,
        draft: Option<&DraftOverlay>,
        queue_pending: bool,
    ) -> OverlayDecision {
        let Some(draft) = draft else {
            return OverlayDecision {
                project: server,
                outcome: OverlayOutcome::NoDraft,
            };
        };

        if let Err(failure) = self.check(draft, &server, queue_pending) {
            log::debug!(
                "discarding draft for {}: {}",
                server.id,
                failure.as_str()
            );
            return OverlayDecision {
                project: server,
                outcome: OverlayOutcome::Discarded(failure),
            };
        }

        match server.overlaid_with(&draft.project) {
            Ok(merged) => OverlayDecision {
                project: merged,
                outcome: OverlayOutcome::Applied,
            },
            Err(e) => {
                log::warn!("draft for {} passed the guard but cannot be applied: {e}", server.id);
                OverlayDecision {
                    project: server,
                    outcome: OverlayOutcome::Discarded(GuardFailure::UnusableSnapshot),
                }
            }
        }
    }
}
