//! Project lifecycle and debounced autosave for the scene store.
//!
//! [`SceneSync::mount`] spawns one actor per host. It watches the
//! [`SceneStore`](crate::scene::SceneStore), loads a project's scene when the
//! active project changes, and saves edits back through a
//! [`ModelRepository`](crate::repository::ModelRepository) after a quiet
//! period. Saves for one project never overlap; edits made while a save is
//! running produce exactly one follow-up save.
//!
//! The decision logic lives in two plain state machines,
//! [`AutosaveCoordinator`] and [`LifecycleController`], which the actor
//! drives.

mod config;
mod coordinator;
mod exit_flush;
mod lifecycle;
mod session;
mod types;

pub use config::{AutosaveConfig, SavePolicy};
pub use coordinator::{AutosaveCoordinator, AutosavePhase, Observation, SaveFollowUp};
pub use lifecycle::{LifecycleController, Transition};
pub use session::{SceneSync, SceneSyncHandle};
pub use types::{
    Activation, ActivationOutcome, AutosavePhaseKind, FlushDispatch, FlushReason,
    LifecycleState, SaveTicket, SyncStatus,
};
