//! Grid Hunter - Unified CLI
//!
//! Store relay and terminal game client modes of operation.

use std::sync::Arc;

use anyhow::{Result, bail};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gridhunt::cli::{Cli, Command};
use gridhunt::session::GridConfig;
use gridhunt::store::RemoteStore;
use gridhunt::{Relay, tui};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind } => run_serve(bind).await,
        Command::Play {
            server,
            name,
            grid_size,
        } => run_play(server, name, grid_size).await,
    }
}

/// Run the store relay.
async fn run_serve(bind: String) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting gridhunt relay");
    let relay = Relay::bind(&bind).await?;
    relay.run().await
}

/// Run the TUI game client.
async fn run_play(server: String, name: Option<String>, grid_size: u8) -> Result<()> {
    if !(2..=9).contains(&grid_size) {
        bail!("grid size must be between 2 and 9, got {grid_size}");
    }

    // Log to a file so tracing output does not tear up the TUI.
    let log_file = std::fs::File::create("gridhunt.log")?;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::sync::Arc::new(log_file))
        .with_ansi(false)
        .try_init();

    info!(server = %server, "Starting gridhunt client");
    let store = RemoteStore::connect(&server).await?;
    tui::run(Arc::new(store), GridConfig::new(grid_size), name).await
}
