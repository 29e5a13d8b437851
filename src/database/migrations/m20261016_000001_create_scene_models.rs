use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SceneModels::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SceneModels::ProjectId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SceneModels::SceneGraph)
                            .text()
                            .not_null()
                            .default("{}"),
                    )
                    .col(
                        ColumnDef::new(SceneModels::NodeCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(SceneModels::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(SceneModels::UpdatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SceneModels::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum SceneModels {
    Table,
    ProjectId,
    SceneGraph,
    NodeCount,
    CreatedAt,
    UpdatedAt,
}
