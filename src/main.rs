use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use teamboard::config::BoardConfig;

mod cmd;

#[derive(Parser)]
#[command(name = "teamboard")]
#[command(version, about = "Team kanban board server with transactional card ordering")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to teamboard.toml (defaults to .teamboard/teamboard.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database path. Overrides [database] path and TEAMBOARD_DB.
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP and WebSocket server
    Serve {
        /// Port to serve on
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Enable dev mode (permissive CORS for a local front-end dev server)
        #[arg(long)]
        dev: bool,
    },
    /// Create the database and run migrations
    Init,
    /// Print a project's columns and cards in board order
    Board {
        project_id: i64,
    },
    /// Report columns whose card positions are not 0..n
    Check {
        /// Only check this project's columns
        project_id: Option<i64>,
    },
    /// Renumber a column's cards to 0..n, keeping their order
    Reindex {
        column_id: i64,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default teamboard.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let mut config = BoardConfig::resolve(cli.config.as_deref())?;
    if let Some(path) = &cli.db_path {
        config.database.path = path.clone();
    }
    let _log_guard = teamboard::logging::init_logging(&config.logging, cli.verbose)?;

    match &cli.command {
        Commands::Serve { port, host, dev } => {
            cmd::cmd_serve(&config, *port, host.clone(), *dev).await?;
        }
        Commands::Init => cmd::cmd_init(&config.database.path)?,
        Commands::Board { project_id } => cmd::cmd_board(&config, *project_id)?,
        Commands::Check { project_id } => cmd::cmd_check(&config, *project_id)?,
        Commands::Reindex { column_id } => cmd::cmd_reindex(&config, *column_id)?,
        Commands::Config { command } => {
            cmd::cmd_config(&config, cli.config.as_deref(), command.clone())?
        }
    }

    Ok(())
}
