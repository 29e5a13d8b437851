//! Remote model repository: where scene graphs are loaded from and saved to.
//!
//! Authorization and ownership checks belong to the implementation; the
//! autosave core only sees success or failure.

mod database;
mod memory;

pub use database::DatabaseModelRepository;
pub use memory::InMemoryModelRepository;

use async_trait::async_trait;

use crate::errors::RepositoryResult;
use crate::project::ProjectId;
use crate::scene::SceneGraph;

#[async_trait]
pub trait ModelRepository: Send + Sync {
    /// Load the saved scene for a project; `None` when nothing was saved yet.
    async fn load(&self, project_id: &ProjectId) -> RepositoryResult<Option<SceneGraph>>;

    /// Persist the full scene for a project, replacing what was there.
    async fn save(&self, project_id: &ProjectId, graph: &SceneGraph) -> RepositoryResult<()>;
}
