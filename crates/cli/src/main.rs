//! FerroAgent CLI: the main entry point.
//!
//! Commands:
//! - `chat`: Interactive conversation with the agent
//! - `run`: Single message, optionally streaming lifecycle events
//! - `history`: Print a saved conversation or its statistics
//! - `repair-json`: Extract a JSON value from sloppy model output
//! - `config`: Show the config path and the default configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "ferroagent",
    about = "FerroAgent: tool-calling conversation engine",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent interactively
    Chat {
        /// Load the conversation from this file and save it after every reply
        #[arg(long)]
        history_file: Option<PathBuf>,
    },

    /// Send a single message and print the answer
    Run {
        /// The user message
        #[arg(short, long)]
        message: String,

        /// Print every lifecycle event as a JSON line
        #[arg(long)]
        stream: bool,
    },

    /// Print a saved conversation
    History {
        /// JSON file holding an array of messages
        file: PathBuf,

        /// Print per-role statistics instead of the transcript
        #[arg(long)]
        stats: bool,
    },

    /// Extract a JSON value from text (a file, or stdin when omitted)
    RepairJson { file: Option<PathBuf> },

    /// Show the config path and the default configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Chat { history_file } => commands::chat::run(history_file, cli.verbose).await?,
        Commands::Run { message, stream } => {
            commands::run::run(&message, stream, cli.verbose).await?
        }
        Commands::History { file, stats } => commands::history::run(&file, stats)?,
        Commands::RepairJson { file } => commands::repair::run(file).await?,
        Commands::Config => commands::config_cmd::run()?,
    }

    Ok(())
}
