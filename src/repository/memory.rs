use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::ModelRepository;
use crate::errors::RepositoryResult;
use crate::project::ProjectId;
use crate::scene::SceneGraph;

/// Process-local repository, used by tests and demos.
#[derive(Default)]
pub struct InMemoryModelRepository {
    models: RwLock<HashMap<ProjectId, SceneGraph>>,
}

impl InMemoryModelRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, project_id: ProjectId, graph: SceneGraph) {
        self.models.write().await.insert(project_id, graph);
    }

    pub async fn get(&self, project_id: &ProjectId) -> Option<SceneGraph> {
        self.models.read().await.get(project_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.models.read().await.len()
    }
}

#[async_trait]
impl ModelRepository for InMemoryModelRepository {
    async fn load(&self, project_id: &ProjectId) -> RepositoryResult<Option<SceneGraph>> {
        Ok(self.get(project_id).await)
    }

    async fn save(&self, project_id: &ProjectId, graph: &SceneGraph) -> RepositoryResult<()> {
        self.insert(project_id.clone(), graph.clone()).await;
        Ok(())
    }
}
