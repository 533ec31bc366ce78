use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "taskflow")]
#[command(version, about = "Kanban board client for the taskflow tracker API")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// API base URL. Overrides TASKFLOW_API_BASE and taskflow.toml
    #[arg(long, global = true)]
    pub api_base: Option<String>,

    /// Bearer token. Overrides TASKFLOW_TOKEN and taskflow.toml
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Queue board mutations one at a time
    #[arg(long, global = true)]
    pub serialize_mutations: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show a project's board, column by column in rank order
    Board {
        project: i64,
        /// Print the board as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a task in a column
    Create {
        project: i64,
        status: i64,
        title: String,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long)]
        assignee: Option<i64>,
    },
    /// Update a task's fields
    Update {
        task: i64,
        #[arg(long)]
        title: Option<String>,
        /// Move to another status column
        #[arg(long)]
        status: Option<i64>,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Delete a task
    Delete { task: i64 },
    /// Move a task to a position in a column
    Move {
        project: i64,
        task: i64,
        /// Column the task is in now
        #[arg(long)]
        from: i64,
        /// Destination column
        #[arg(long)]
        to: i64,
        /// Drop position in the destination (appends when omitted)
        #[arg(long)]
        index: Option<usize>,
    },
    /// List a project's statuses
    Statuses { project: i64 },
    /// List a project's members
    Users {
        project: i64,
        /// Include the "No Assignee" picker entry
        #[arg(long)]
        picker: bool,
    },
    /// List a project's sprints, newest first
    Sprints { project: i64 },
    /// List the projects visible to this token
    Projects,
    /// List a project's wiki pages
    Wiki {
        project: i64,
        /// Print this page in full instead of listing
        #[arg(long)]
        page: Option<i64>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default taskflow.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let config = cmd::load_config(&cli, &project_dir)?;
    let _log_guard = cmd::init_logging(&cli, &config)?;

    match &cli.command {
        Commands::Board { project, json } => cmd::cmd_board(&config, *project, *json).await?,
        Commands::Create {
            project,
            status,
            title,
            description,
            assignee,
        } => {
            cmd::cmd_create(
                &config,
                *project,
                *status,
                title,
                description.as_deref(),
                *assignee,
            )
            .await?
        }
        Commands::Update {
            task,
            title,
            status,
            description,
        } => {
            cmd::cmd_update(
                &config,
                *task,
                title.as_deref(),
                *status,
                description.as_deref(),
            )
            .await?
        }
        Commands::Delete { task } => cmd::cmd_delete(&config, *task).await?,
        Commands::Move {
            project,
            task,
            from,
            to,
            index,
        } => cmd::cmd_move(&config, *project, *task, *from, *to, *index).await?,
        Commands::Statuses { project } => cmd::cmd_statuses(&config, *project).await?,
        Commands::Users { project, picker } => cmd::cmd_users(&config, *project, *picker).await?,
        Commands::Sprints { project } => cmd::cmd_sprints(&config, *project).await?,
        Commands::Projects => cmd::cmd_projects(&config).await?,
        Commands::Wiki { project, page } => cmd::cmd_wiki(&config, *project, *page).await?,
        Commands::Config { command } => cmd::cmd_config(&config, command.clone())?,
    }

    Ok(())
}
