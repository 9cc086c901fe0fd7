//! Pure state transitions of the visible objective collection.
//!
//! The reducer never performs I/O and never looks at pending status; every
//! decision about online and offline paths lives in the engine.

use crate::models::{Objective, ObjectiveId};

/// Collection state observed by clients
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectivesState {
    pub objectives: Vec<Objective>,
    /// Server copy held aside while the user resolves a conflict
    pub conflict: Option<Objective>,
    pub fetching: bool,
    pub fetch_error: Option<String>,
    pub saving: bool,
    pub save_error: Option<String>,
    pub deleting: bool,
    pub delete_error: Option<String>,
}

impl ObjectivesState {
    pub fn find(&self, id: &ObjectiveId) -> Option<&Objective> {
        self.objectives
            .iter()
            .find(|objective| objective.id.as_ref() == Some(id))
    }
}

/// Event fed to [`reduce`]
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    FetchStarted,
    FetchSucceeded(Vec<Objective>),
    /// Degraded fetch served from the local store
    FetchFailed {
        objectives: Vec<Objective>,
        error: Option<String>,
    },
    SaveStarted,
    SaveSucceeded(Objective),
    SaveSucceededOffline(Objective),
    SaveFailed(String),
    ConflictDetected(Objective),
    ConflictResolved,
    DeleteStarted,
    DeleteSucceeded(Objective),
    DeleteFailed(String),
}

impl SyncEvent {
    /// Short name for logs
    pub const fn name(&self) -> &'static str {
        match self {
            Self::FetchStarted => "fetch_started",
            Self::FetchSucceeded(_) => "fetch_succeeded",
            Self::FetchFailed { .. } => "fetch_failed",
            Self::SaveStarted => "save_started",
            Self::SaveSucceeded(_) => "save_succeeded",
            Self::SaveSucceededOffline(_) => "save_succeeded_offline",
            Self::SaveFailed(_) => "save_failed",
            Self::ConflictDetected(_) => "conflict_detected",
            Self::ConflictResolved => "conflict_resolved",
            Self::DeleteStarted => "delete_started",
            Self::DeleteSucceeded(_) => "delete_succeeded",
            Self::DeleteFailed(_) => "delete_failed",
        }
    }
}

/// Apply one event to the state
#[must_use]
pub fn reduce(mut state: ObjectivesState, event: SyncEvent) -> ObjectivesState {
    match event {
        SyncEvent::FetchStarted => {
            state.fetching = true;
            state.fetch_error = None;
        }
        SyncEvent::FetchSucceeded(objectives) => {
            state.objectives = objectives;
            state.fetching = false;
        }
        SyncEvent::FetchFailed { objectives, error } => {
            state.objectives = objectives;
            state.fetching = false;
            state.fetch_error = error;
        }
        SyncEvent::SaveStarted => {
            state.saving = true;
            state.save_error = None;
        }
        SyncEvent::SaveSucceeded(objective) | SyncEvent::SaveSucceededOffline(objective) => {
            upsert(&mut state.objectives, objective);
            state.saving = false;
        }
        SyncEvent::SaveFailed(error) => {
            state.save_error = Some(error);
            state.saving = false;
        }
        SyncEvent::ConflictDetected(server) => {
            state.conflict = Some(server);
        }
        SyncEvent::ConflictResolved => {
            state.conflict = None;
        }
        SyncEvent::DeleteStarted => {
            state.deleting = true;
            state.delete_error = None;
        }
        SyncEvent::DeleteSucceeded(objective) => {
            state
                .objectives
                .retain(|existing| existing.id.is_none() || existing.id != objective.id);
            state.deleting = false;
        }
        SyncEvent::DeleteFailed(error) => {
            state.delete_error = Some(error);
            state.deleting = false;
        }
    }
    state
}

/// Replace the record with the same identity in place, or insert at the head
fn upsert(objectives: &mut Vec<Objective>, objective: Objective) {
    let position = objective.id.as_ref().and_then(|id| {
        objectives
            .iter()
            .position(|existing| existing.id.as_ref() == Some(id))
    });
    match position {
        Some(index) => objectives[index] = objective,
        None => objectives.insert(0, objective),
    }
}
