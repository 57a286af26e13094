//! Ragstore CLI
//!
//! Main entry point for the ragstore command-line tool: ingest documents
//! into an owner's index, delete files, and search.

mod commands;

use clap::{Parser, Subcommand};
use commands::{
    DeleteCommand, ExplainCommand, IngestCommand, LoadedCommand, SearchCommand, StatsCommand,
};
use ragstore_core::{logging, AppConfig};
use ragstore_index::IndexManager;
use std::path::PathBuf;

/// Ragstore - owner-partitioned vector search over your documents
#[derive(Parser, Debug)]
#[command(name = "ragstore")]
#[command(about = "Owner-partitioned vector search over your documents", long_about = None)]
#[command(version)]
struct Cli {
    /// Root directory for indexes and the chunk database (default: current directory)
    #[arg(short, long, global = true, env = "RAGSTORE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "RAGSTORE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Chunk a text file and add it to an owner's index
    Ingest(IngestCommand),

    /// Delete a file's chunks and rebuild the owner's index
    Delete(DeleteCommand),

    /// Search an owner's index
    Search(SearchCommand),

    /// Search and print every step taken
    Explain(ExplainCommand),

    /// Show an owner's store diagnostics
    Stats(StatsCommand),

    /// List owners with a loaded index
    Loaded(LoadedCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Load base configuration from file and environment, then apply CLI overrides
    let config = AppConfig::load()?.with_overrides(
        cli.data_dir,
        cli.config,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    )?;

    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("Ragstore CLI starting");
    tracing::debug!("Data dir: {:?}", config.data_dir);
    tracing::debug!(
        "Embedding: {} / {} ({} dims)",
        config.embedding.provider,
        config.embedding.model,
        config.embedding.dimensions
    );

    let command_name = match &cli.command {
        Commands::Ingest(_) => "ingest",
        Commands::Delete(_) => "delete",
        Commands::Search(_) => "search",
        Commands::Explain(_) => "explain",
        Commands::Stats(_) => "stats",
        Commands::Loaded(_) => "loaded",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let manager = IndexManager::open(&config).await?;

    let result = match cli.command {
        Commands::Ingest(cmd) => cmd.execute(&manager).await,
        Commands::Delete(cmd) => cmd.execute(&manager).await,
        Commands::Search(cmd) => cmd.execute(&manager).await,
        Commands::Explain(cmd) => cmd.execute(&manager).await,
        Commands::Stats(cmd) => cmd.execute(&manager),
        Commands::Loaded(cmd) => cmd.execute(&manager),
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {:#}", e),
    }

    result
}
