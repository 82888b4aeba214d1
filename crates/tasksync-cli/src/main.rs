//! tasksync CLI - manage tasks offline and sync them through a shared remote
//!
//! Every command works against the local database; `sync` reconciles it with
//! the file-backed remote.

mod cli;
mod commands;
mod error;
mod file_remote;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, SyncCommands};
use crate::commands::common::{load_sync_config, Paths};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tasksync=info,tasksync_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let paths = Paths::resolve(cli.db_path, cli.remote);

    match cli.command {
        Commands::Add { title, description } => {
            commands::add::run_add(&title, description.as_deref(), &paths.db_path).await?;
        }
        Commands::List { all, json } => {
            commands::list::run_list(all, json, &paths.db_path).await?;
        }
        Commands::Show { id, json } => {
            commands::show::run_show(&id, json, &paths.db_path).await?;
        }
        Commands::Edit {
            id,
            title,
            description,
        } => {
            commands::edit::run_edit(
                &id,
                title.as_deref(),
                description.as_deref(),
                &paths.db_path,
            )
            .await?;
        }
        Commands::Done { id, undo } => {
            commands::edit::run_done(&id, !undo, &paths.db_path).await?;
        }
        Commands::Delete { id } => commands::delete::run_delete(&id, &paths.db_path).await?,
        Commands::Sync { command } => {
            let config = load_sync_config(&paths.config_path)?;
            match command {
                None => {
                    commands::sync::run_sync(&paths, config).await?;
                }
                Some(SyncCommands::Status { json }) => {
                    commands::sync::run_sync_status(&paths, config, json).await?;
                }
                Some(SyncCommands::Conflicts { limit, json }) => {
                    commands::sync::run_sync_conflicts(&paths, config, limit, json).await?;
                }
                Some(SyncCommands::Reset { id }) => {
                    commands::sync::run_sync_reset(&paths, config, &id).await?;
                }
                Some(SyncCommands::Watch { interval }) => {
                    commands::sync::run_sync_watch(&paths, config, interval).await?;
                }
            }
        }
    }

    Ok(())
}
