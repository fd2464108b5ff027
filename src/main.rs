//! Aegis Guardian - automated rescue of a compromised account's funds
//!
//! # WARNING
//! - Once started, the guardian moves funds without asking. Check the
//!   safe destination address twice.
//! - Polling is best-effort. A drain that completes between two polls
//!   leaves nothing to rescue.
//! - Rescues only work while the permission grants are valid and unspent.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

use aegis_guardian::cli::commands;
use aegis_guardian::config::Config;

/// Aegis Guardian - monitor a wallet and sweep funds to safety on compromise
#[derive(Parser)]
#[command(name = "aegis")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "aegis.toml")]
    config: String,

    /// Emit logs as JSON
    #[arg(long, env = "AEGIS_JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start monitoring and rescuing
    Start {
        /// Log rescues instead of submitting them
        #[arg(long)]
        dry_run: bool,

        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Show balances of the protected account and the safe destination
    Balances,

    /// Show loaded permission grants
    Grants,

    /// Show current configuration (secrets masked)
    Config,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("aegis_guardian=info"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(false)
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
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    init_tracing(cli.json_logs);

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
        Commands::Start { dry_run, force } => commands::start(&config, dry_run, force).await,
        Commands::Balances => commands::balances(&config).await,
        Commands::Grants => commands::grants(&config).await,
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
