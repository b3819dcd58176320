use clap::{Parser, Subcommand};
use firestore_mcp::Result;
use firestore_mcp::commands::{check_store, serve_mcp, show_config};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "firestore-mcp")]
#[command(about = "MCP server exposing Cloud Firestore collections and documents")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file (default: ~/.firestore-mcp/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP server on stdio
    Serve {
        /// Serve from an empty in-memory store instead of Firestore
        #[arg(long)]
        in_memory: bool,
    },
    /// Show the effective configuration with secrets masked
    Config,
    /// Check that Firestore is reachable with the current configuration
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Stdout is the protocol channel; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command.unwrap_or(Commands::Serve { in_memory: false }) {
        Commands::Serve { in_memory } => {
            serve_mcp(config_path, in_memory).await?;
        }
        Commands::Config => {
            show_config(config_path)?;
        }
        Commands::Check => {
            check_store(config_path).await?;
        }
    }

    Ok(())
}
