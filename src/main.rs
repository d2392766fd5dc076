//! sniperd - keyless sniper backend daemon
//!
//! Hosts the opportunity-detection and per-session action pipeline. The
//! HTTP/SSE edge mounts on top of `Backend`; this binary brings the core up
//! and keeps it alive.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use keyless_sniper::{AppConfig, Backend};

/// Keyless sniper backend daemon
#[derive(Parser)]
#[command(name = "sniperd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the backend core and run until interrupted
    Start,

    /// Show current configuration (secrets masked)
    Config,

    /// Check system health (RPC endpoints)
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("keyless_sniper=info".parse().unwrap()),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let config = match AppConfig::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Start => start(config).await,
        Commands::Config => {
            println!("{}", config.masked_display());
            Ok(())
        }
        Commands::Health => health(config).await,
    }
}

async fn start(config: AppConfig) -> Result<()> {
    info!("starting sniperd");
    println!("{}", config.masked_display());

    let backend = Backend::new(config)?;

    if let Err(e) = backend.health_check().await {
        error!("Startup checks failed: {}", e);
        std::process::exit(1);
    }

    info!("core ready; sessions are driven by the edge");
    tokio::signal::ctrl_c().await?;

    info!("interrupt received, shutting down");
    backend.shutdown().await;
    Ok(())
}

async fn health(config: AppConfig) -> Result<()> {
    let backend = Backend::new(config)?;
    match backend.health_check().await {
        Ok(()) => {
            println!("OK: RPC endpoints reachable");
            Ok(())
        }
        Err(e) => {
            error!("health check failed: {}", e);
            std::process::exit(1);
        }
    }
}
