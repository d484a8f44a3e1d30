//! Migration Scout - watches pump.fun migrations and flags the coins worth a look

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

// Use the library crate
use migration_scout::cli::commands;
use migration_scout::config::Config;

/// Migration Scout - pump.fun migrated-token discovery
#[derive(Parser)]
#[command(name = "scout")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml", env = "SCOUT_CONFIG")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start polling the migration feed
    Start,

    /// Show current configuration (secrets masked)
    Config,

    /// Look for anomalous trading patterns in stored trades
    Analyze,

    /// Dry-run one raw feed record (JSON file) through the gates
    Check {
        /// Path to a JSON file holding one feed record
        file: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::from_default_env().add_directive("migration_scout=info".parse()?);
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .init();
    }

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Start => commands::start(&config).await,
        Commands::Config => commands::show_config(&config),
        Commands::Analyze => commands::analyze(&config).await,
        Commands::Check { file } => commands::check(&config, &file).await,
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
