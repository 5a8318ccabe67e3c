//! graphsync CLI
//!
//! Command-line runner for synchronization runs.
//!
//! # Commands
//!
//! - `run` - Execute a synchronization run and display the terminal job record
//! - `version` - Show version information

mod commands;
mod http;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// graphsync command-line tools.
#[derive(Parser)]
#[command(name = "graphsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a synchronization run against the remote API
    Run {
        /// Integration instance to run
        #[arg(long)]
        instance_id: String,

        /// Base URL of the synchronization API
        #[arg(long, default_value = "https://api.graphsync.dev")]
        api_base_url: String,

        /// API key; falls back to the GRAPHSYNC_API_KEY environment variable
        #[arg(long)]
        api_key: Option<String>,

        /// Directory containing entities.json / relationships.json datasets
        #[arg(long, default_value = ".")]
        input: PathBuf,

        /// Maximum graph objects per upload request
        #[arg(long, default_value = "250")]
        batch_size: usize,
    },

    /// Show version information
    Version,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run {
            instance_id,
            api_base_url,
            api_key,
            input,
            batch_size,
        } => {
            let options = commands::run::RunOptions {
                instance_id,
                api_base_url,
                api_key,
                input,
                batch_size,
            };
            match commands::run::run(options) {
                Ok(result) => std::process::exit(commands::run::exit_code(&result)),
                Err(err) => {
                    eprintln!("error: {err}");
                    std::process::exit(2);
                }
            }
        }
        Commands::Version => {
            println!("graphsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }
}
