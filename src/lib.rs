pub mod autosave;
pub mod database;
pub mod errors;
pub mod project;
pub mod repository;
pub mod scene;
pub mod view_state;

pub use autosave::{AutosaveConfig, SceneSync, SceneSyncHandle};
pub use project::ProjectId;
