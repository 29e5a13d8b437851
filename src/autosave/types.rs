use std::fmt;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::errors::RepositoryError;
use crate::project::ProjectId;
use crate::scene::{SceneFingerprint, SceneGraph};

/// Identifies one outbound save: which project, which activation of that
/// project, and which save within the activation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SaveTicket {
    pub project_id: ProjectId,
    pub generation: u64,
    pub sequence: u64,
}

impl fmt::Display for SaveTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}.{}", self.project_id, self.generation, self.sequence)
    }
}

/// Why an exit flush was requested
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushReason {
    PageUnload,
    ProjectSwitch,
    Unmount,
}

impl fmt::Display for FlushReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FlushReason::PageUnload => "page unload",
            FlushReason::ProjectSwitch => "project switch",
            FlushReason::Unmount => "unmount",
        };
        f.write_str(label)
    }
}

/// Result of asking for an exit flush.
///
/// The flush itself runs detached; awaiting the handle is optional and
/// yields whether the save went through.
#[derive(Debug)]
pub enum FlushDispatch {
    /// Nothing unsaved, no request sent
    Clean,
    Dispatched(JoinHandle<bool>),
}

impl FlushDispatch {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, FlushDispatch::Dispatched(_))
    }

    /// Wait for a dispatched flush; `Clean` counts as success.
    pub async fn completion(self) -> bool {
        match self {
            FlushDispatch::Clean => true,
            FlushDispatch::Dispatched(handle) => handle.await.unwrap_or(false),
        }
    }
}

/// What `set_active_project` did
#[derive(Debug)]
pub struct Activation {
    pub outcome: ActivationOutcome,
    /// Flush of the project being switched away from
    pub flush: FlushDispatch,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// Same project as before: nothing reloaded
    Unchanged,
    Loading(ProjectId),
    Deactivated,
}

/// Where the lifecycle of the active project stands
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Inactive,
    /// Load in flight; store updates are absorbed
    Loading(ProjectId),
    /// Scene populated; waiting for that update to reach the subscriber
    Settling(ProjectId),
    Ready(ProjectId),
}

impl LifecycleState {
    pub fn project_id(&self) -> Option<&ProjectId> {
        match self {
            LifecycleState::Inactive => None,
            LifecycleState::Loading(id)
            | LifecycleState::Settling(id)
            | LifecycleState::Ready(id) => Some(id),
        }
    }

    pub fn is_suppressing(&self) -> bool {
        matches!(
            self,
            LifecycleState::Loading(_) | LifecycleState::Settling(_)
        )
    }
}

/// Coarse view of the coordinator state machine, for status reports
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AutosavePhaseKind {
    Idle,
    Scheduled,
    Saving,
    PendingQueued,
}

/// Snapshot published by the scene-sync actor after every event it handles
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncStatus {
    pub lifecycle: LifecycleState,
    pub autosave: Option<AutosavePhaseKind>,
    pub dirty: bool,
    /// Saves and flushes whose repository call has not returned
    pub in_flight_saves: usize,
    pub successful_saves: u64,
    pub failed_saves: u64,
}

impl SyncStatus {
    pub fn inactive() -> Self {
        Self {
            lifecycle: LifecycleState::Inactive,
            autosave: None,
            dirty: false,
            in_flight_saves: 0,
            successful_saves: 0,
            failed_saves: 0,
        }
    }

    pub fn active_project(&self) -> Option<&ProjectId> {
        self.lifecycle.project_id()
    }

    /// Loaded and no longer suppressing edits (or nothing active)
    pub fn is_settled(&self) -> bool {
        !self.lifecycle.is_suppressing()
    }
}

/// Commands sent to the scene-sync actor
pub enum SyncCommand {
    SetActiveProject {
        project_id: Option<ProjectId>,
        response: oneshot::Sender<Activation>,
    },
    PageUnload {
        response: oneshot::Sender<FlushDispatch>,
    },
    Unmount {
        response: oneshot::Sender<FlushDispatch>,
    },
}

/// Completions reported back by spawned load/save/flush tasks
pub(crate) enum TaskEvent {
    LoadFinished {
        project_id: ProjectId,
        generation: u64,
        outcome: Result<Option<SceneGraph>, RepositoryError>,
    },
    SaveFinished {
        ticket: SaveTicket,
        outcome: Result<(), RepositoryError>,
    },
    FlushFinished {
        ticket: SaveTicket,
        fingerprint: Option<SceneFingerprint>,
        success: bool,
    },
}

/// A save or flush whose request may still reach the repository.
///
/// `done` flips to `true` once the repository call has returned, which is
/// what a flush for the same project waits on before sending its own state.
pub(crate) struct InFlightSave {
    pub ticket: SaveTicket,
    pub done: watch::Receiver<bool>,
}
