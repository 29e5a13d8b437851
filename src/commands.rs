use anyhow::{bail, Context, Result};
use clap::Subcommand;
use sea_orm_migration::MigratorTrait;
use std::fmt;
use std::fs;
use tracing::{info, warn};

use scene_sync::database::{establish_connection, get_database_url, migrations::Migrator};
use scene_sync::repository::{DatabaseModelRepository, ModelRepository};
use scene_sync::scene::{DanglingReference, NodeKind, SceneGraph};
use scene_sync::{AutosaveConfig, ProjectId};

#[derive(Subcommand, Debug)]
pub enum MigrateDirection {
    Up,
    Down,
    Fresh,
}

pub async fn migrate_database(database_path: &str, direction: MigrateDirection) -> Result<()> {
    let database_url = get_database_url(Some(database_path));
    let db = establish_connection(&database_url).await?;

    match direction {
        MigrateDirection::Up => {
            info!("Running migrations up");
            Migrator::up(&db, None).await?;
        }
        MigrateDirection::Down => {
            info!("Running migrations down");
            Migrator::down(&db, None).await?;
        }
        MigrateDirection::Fresh => {
            info!("Running fresh migrations (down then up)");
            Migrator::down(&db, None).await?;
            Migrator::up(&db, None).await?;
        }
    }

    info!("Database migration completed");
    Ok(())
}

async fn open_repository(database_path: &str) -> Result<DatabaseModelRepository> {
    let database_url = get_database_url(Some(database_path));
    let db = establish_connection(&database_url).await?;
    Migrator::up(&db, None).await?;
    Ok(DatabaseModelRepository::new(db))
}

pub async fn import_scene(database_path: &str, project: &str, file: &str) -> Result<()> {
    let raw = fs::read_to_string(file).with_context(|| format!("Failed to read {}", file))?;
    let graph: SceneGraph =
        serde_json::from_str(&raw).with_context(|| format!("{} is not a scene graph", file))?;

    for reference in graph.dangling_references() {
        warn!("Imported scene has a dangling reference: {}", reference);
    }

    let repository = open_repository(database_path).await?;
    repository.save(&ProjectId::from(project), &graph).await?;
    info!("Imported {} nodes into project {}", graph.len(), project);
    Ok(())
}

pub async fn export_scene(database_path: &str, project: &str, file: Option<&str>) -> Result<()> {
    let repository = open_repository(database_path).await?;
    let Some(graph) = repository.load(&ProjectId::from(project)).await? else {
        bail!("No saved scene for project {}", project);
    };

    let json = serde_json::to_string_pretty(&graph)?;
    match file {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("Failed to write {}", path))?;
            info!("Exported {} nodes to {}", graph.len(), path);
        }
        None => println!("{}", json),
    }
    Ok(())
}

/// Summary of one saved model
#[derive(Debug)]
pub struct SceneReport {
    pub project_id: ProjectId,
    pub updated_at: String,
    pub node_count: usize,
    pub roots: usize,
    pub kinds: Vec<(NodeKind, usize)>,
    pub dangling: Vec<DanglingReference>,
}

impl fmt::Display for SceneReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Project:  {}", self.project_id)?;
        writeln!(f, "Saved:    {}", self.updated_at)?;
        writeln!(f, "Nodes:    {} ({} roots)", self.node_count, self.roots)?;
        for (kind, count) in &self.kinds {
            writeln!(f, "  {:<10} {}", kind, count)?;
        }
        if self.dangling.is_empty() {
            write!(f, "No dangling references")
        } else {
            write!(f, "Dangling references:")?;
            for reference in &self.dangling {
                write!(f, "\n  {}", reference)?;
            }
            Ok(())
        }
    }
}

pub async fn inspect_scene(database_path: &str, project: &str) -> Result<SceneReport> {
    let repository = open_repository(database_path).await?;
    let project_id = ProjectId::from(project);

    let Some(model) = repository.find_model(&project_id).await? else {
        bail!("No saved scene for project {}", project);
    };
    let graph: SceneGraph = serde_json::from_str(&model.scene_graph)
        .with_context(|| format!("Saved scene for {} is corrupt", project))?;

    Ok(SceneReport {
        project_id,
        updated_at: model.updated_at.to_rfc3339(),
        node_count: graph.len(),
        roots: graph.root_node_ids.len(),
        kinds: graph.count_by_kind().into_iter().collect(),
        dangling: graph.dangling_references(),
    })
}

pub fn check_config(file: &str) -> Result<String> {
    let config = AutosaveConfig::from_file(file)?;
    Ok(toml::to_string(&config)?)
}
