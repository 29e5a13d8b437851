//! Domain-specific error types for scene-sync
//!
//! # Error Categories
//!
//! - **SceneError**: Scene store editing actions (nodes, parents, cycles)
//! - **RepositoryError**: Remote model repository load/save failures
//! - **SyncError**: The autosave runtime itself (configuration, actor availability)
//!
//! Repository errors never cross the [`SceneSyncHandle`](crate::SceneSyncHandle)
//! boundary: the autosave runtime converts them to success/failure and logs them.
//!
//! ```rust
//! use scene_sync::errors::{RepositoryError, SceneError};
//!
//! let err = SceneError::NodeNotFound("wall_1".into());
//! assert!(err.to_string().contains("wall_1"));
//!
//! assert!(RepositoryError::Transient("timeout".to_string()).is_retryable());
//! assert!(!RepositoryError::Unauthorized("not owner".to_string()).is_retryable());
//! ```

pub mod repository;
pub mod scene;
pub mod sync;

pub use repository::RepositoryError;
pub use scene::SceneError;
pub use sync::SyncError;

/// Result type alias for scene store editing actions
pub type SceneResult<T> = Result<T, SceneError>;

/// Result type alias for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Result type alias for the autosave runtime
pub type SyncResult<T> = Result<T, SyncError>;
