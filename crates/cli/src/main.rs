//! CaseDraft CLI: the main entry point.
//!
//! Commands:
//! - `init`: Write a default config file
//! - `budget`: Show the active token budget and quotas
//! - `draft`: Generate a draft from an evidence file
//! - `gateway`: Start the HTTP API server

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "casedraft",
    about = "CaseDraft: budgeted context assembly and staged drafting",
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
    /// Create the config directory and a default config.toml
    Init,

    /// Show the token budget, selection limits and rate limits
    Budget,

    /// Generate a draft from a JSON request + evidence file
    Draft {
        /// Path to the request/evidence JSON
        #[arg(short, long)]
        input: PathBuf,

        /// Use the single-call pipeline instead of the staged one
        #[arg(long)]
        direct: bool,

        /// Print the full run record as JSON instead of the artifact
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP gateway server
    Gateway {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },
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
        Commands::Init => commands::init::run().await?,
        Commands::Budget => commands::budget::run().await?,
        Commands::Draft {
            input,
            direct,
            json,
        } => commands::draft::run(input, direct, json).await?,
        Commands::Gateway { port } => commands::gateway::run(port).await?,
    }

    Ok(())
}
