use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

/// Latest saved scene graph of one project.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "scene_models")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub project_id: String,
    #[sea_orm(column_type = "Text")]
    pub scene_graph: String, // SceneGraph JSON
    pub node_count: i32,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    pub fn new(project_id: String) -> Self {
        let now = chrono::Utc::now();
        Self {
            project_id: Set(project_id),
            scene_graph: Set("{}".to_string()),
            node_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
    }
}
