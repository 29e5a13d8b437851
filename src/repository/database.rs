use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, EntityTrait, Set};
use tracing::debug;

use super::ModelRepository;
use crate::database::entities::scene_models;
use crate::errors::RepositoryResult;
use crate::project::ProjectId;
use crate::scene::SceneGraph;

/// Repository backed by the `scene_models` table, one row per project.
#[derive(Clone)]
pub struct DatabaseModelRepository {
    db: DatabaseConnection,
}

impl DatabaseModelRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Row metadata without decoding the scene
    pub async fn find_model(&self, project_id: &ProjectId) -> RepositoryResult<Option<scene_models::Model>> {
        let model = scene_models::Entity::find_by_id(project_id.as_str().to_string())
            .one(&self.db)
            .await?;
        Ok(model)
    }
}

#[async_trait]
impl ModelRepository for DatabaseModelRepository {
    async fn load(&self, project_id: &ProjectId) -> RepositoryResult<Option<SceneGraph>> {
        let Some(model) = self.find_model(project_id).await? else {
            return Ok(None);
        };

        let graph: SceneGraph = serde_json::from_str(&model.scene_graph)?;
        debug!(
            "Loaded scene for project {} ({} nodes, saved {})",
            project_id, model.node_count, model.updated_at
        );
        Ok(Some(graph))
    }

    async fn save(&self, project_id: &ProjectId, graph: &SceneGraph) -> RepositoryResult<()> {
        let payload = serde_json::to_string(graph)?;
        let node_count = i32::try_from(graph.len()).unwrap_or(i32::MAX);

        // Upsert in one statement: two saves of a new project may race.
        let mut active = scene_models::ActiveModel::new(project_id.as_str().to_string());
        active.scene_graph = Set(payload);
        active.node_count = Set(node_count);
        scene_models::Entity::insert(active)
            .on_conflict(
                OnConflict::column(scene_models::Column::ProjectId)
                    .update_columns([
                        scene_models::Column::SceneGraph,
                        scene_models::Column::NodeCount,
                        scene_models::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        debug!("Saved scene for project {} ({} nodes)", project_id, node_count);
        Ok(())
    }
}
