mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    #[clap(short, long, global = true)]
    log_level: Option<String>,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Db {
        #[clap(subcommand)]
        command: DbCommands,
    },
    /// Store a scene graph JSON file as a project's saved model
    Import {
        #[clap(short, long)]
        project: String,
        #[clap(short, long)]
        file: String,
        #[clap(short, long, default_value = "scene-sync.db")]
        database: String,
    },
    /// Write a project's saved model as JSON (stdout without --file)
    Export {
        #[clap(short, long)]
        project: String,
        #[clap(short, long)]
        file: Option<String>,
        #[clap(short, long, default_value = "scene-sync.db")]
        database: String,
    },
    /// Summarise a project's saved model
    Inspect {
        #[clap(short, long)]
        project: String,
        #[clap(short, long, default_value = "scene-sync.db")]
        database: String,
    },
    Config {
        #[clap(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum DbCommands {
    Init {
        #[clap(short, long, default_value = "scene-sync.db")]
        database: String,
    },
    Migrate {
        #[clap(subcommand)]
        direction: commands::MigrateDirection,
        #[clap(short, long, default_value = "scene-sync.db")]
        database: String,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Validate an autosave config file and print the effective settings
    Check { file: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    setup_logging(&args.log_level);

    match args.command {
        Commands::Db { command } => match command {
            DbCommands::Init { database } => {
                info!("Initializing database: {}", database);
                commands::migrate_database(&database, commands::MigrateDirection::Up).await?;
            }
            DbCommands::Migrate {
                direction,
                database,
            } => {
                info!("Running database migration: {:?}", direction);
                commands::migrate_database(&database, direction).await?;
            }
        },
        Commands::Import {
            project,
            file,
            database,
        } => {
            info!("Importing {} into project {}", file, project);
            commands::import_scene(&database, &project, &file).await?;
        }
        Commands::Export {
            project,
            file,
            database,
        } => {
            commands::export_scene(&database, &project, file.as_deref()).await?;
        }
        Commands::Inspect { project, database } => {
            let report = commands::inspect_scene(&database, &project).await?;
            println!("{}", report);
        }
        Commands::Config { command } => match command {
            ConfigCommands::Check { file } => {
                let effective = commands::check_config(&file)?;
                println!("{}", effective);
            }
        },
    }

    Ok(())
}

fn setup_logging(log_level: &Option<String>) {
    let log_level = match log_level
        .as_ref()
        .unwrap_or(&"info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(format!("sqlx=warn,{}", log_level)))
        .without_time()
        .init();
}
