use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tasksync")]
#[command(about = "Manage tasks locally and sync them when a remote is reachable")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the file-backed remote
    #[arg(long, global = true, value_name = "PATH")]
    pub remote: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new task
    #[command(alias = "new")]
    Add {
        /// Task title (read from piped stdin when omitted)
        title: Vec<String>,
        /// Task description
        #[arg(short, long)]
        description: Option<String>,
    },
    /// List tasks
    #[command(alias = "ls")]
    List {
        /// Include completed tasks
        #[arg(short, long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one task with its sync details
    Show {
        /// Task ID or unique ID prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit a task (opens $EDITOR on the title when no field is given)
    Edit {
        /// Task ID or unique ID prefix
        id: String,
        /// New title
        #[arg(short, long)]
        title: Option<String>,
        /// New description
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Mark a task completed
    Done {
        /// Task ID or unique ID prefix
        id: String,
        /// Mark the task not completed instead
        #[arg(long)]
        undo: bool,
    },
    /// Delete a task
    #[command(alias = "rm")]
    Delete {
        /// Task ID or unique ID prefix
        id: String,
    },
    /// Run one sync cycle, or inspect sync state
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Show the sync queue and watermark
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recently resolved sync conflicts
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear a parked entry so the task is pushed again
    Reset {
        /// Task ID or unique ID prefix
        id: String,
    },
    /// Keep syncing in the background until interrupted
    Watch {
        /// Seconds between scheduled cycles (defaults to the configured interval)
        #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,
    },
}
