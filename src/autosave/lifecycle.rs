use crate::project::ProjectId;
use crate::scene::StoreRevision;

use super::types::LifecycleState;

/// What a request to change the active project turned into
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    Switch { project_id: ProjectId, generation: u64 },
    Deactivate,
}

/// Tracks which project is active and whether store updates are currently
/// load echoes rather than user edits.
///
/// Suppression starts when a switch begins and lasts past the populate
/// itself: it only lifts once the subscriber has observed the revision the
/// populate produced, so the store's own notification is never read as an
/// edit.
#[derive(Debug)]
pub struct LifecycleController {
    state: LifecycleState,
    generation: u64,
    settle_at: Option<StoreRevision>,
}

impl Default for LifecycleController {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleController {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Inactive,
            generation: 0,
            settle_at: None,
        }
    }

    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn active_project(&self) -> Option<&ProjectId> {
        self.state.project_id()
    }

    pub fn is_suppressing(&self) -> bool {
        self.state.is_suppressing()
    }

    /// Requests for the project already loaded or loading are no-ops.
    pub fn request(&mut self, target: Option<ProjectId>) -> Transition {
        if target.as_ref() == self.active_project() {
            return Transition::Unchanged;
        }

        // Any load still running for the previous target becomes stale.
        self.generation += 1;
        self.settle_at = None;

        match target {
            Some(project_id) => {
                self.state = LifecycleState::Loading(project_id.clone());
                Transition::Switch {
                    project_id,
                    generation: self.generation,
                }
            }
            None => {
                self.state = LifecycleState::Inactive;
                Transition::Deactivate
            }
        }
    }

    /// Whether a finished load is still the one being waited for.
    pub fn accepts_load(&self, project_id: &ProjectId, generation: u64) -> bool {
        generation == self.generation
            && matches!(&self.state, LifecycleState::Loading(loading) if loading == project_id)
    }

    /// The store has been populated (or cleared) for the loading project.
    pub fn populated(&mut self, revision: StoreRevision) {
        if let LifecycleState::Loading(project_id) = &self.state {
            self.state = LifecycleState::Settling(project_id.clone());
            self.settle_at = Some(revision);
        }
    }

    /// Called after the subscriber handled a store update. Returns `true`
    /// when this lifts suppression.
    pub fn observed(&mut self, revision: StoreRevision) -> bool {
        let LifecycleState::Settling(project_id) = &self.state else {
            return false;
        };
        if self.settle_at.is_some_and(|settle_at| revision >= settle_at) {
            self.state = LifecycleState::Ready(project_id.clone());
            self.settle_at = None;
            return true;
        }
        false
    }
}
