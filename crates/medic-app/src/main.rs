//! Medic application binary - composition root.
//!
//! 1. Parse CLI flags and resolve configuration (flags > env > file > defaults)
//! 2. Initialise tracing
//! 3. Build the coordination engine and start its scheduler loop
//! 4. Serve the REST API until Ctrl-C, then stop the scheduler

mod cli;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use medic_action::Coordinator;
use medic_api::{routes, AppState};

use cli::CliArgs;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let config_file = args.resolve_config_path();
    let config = args.load_config();

    // RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.general.log_level))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting Medic v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");
    config.validate()?;

    let coordinator = Arc::new(Coordinator::new(config.clone())?);
    coordinator.start_scheduler()?;
    tracing::info!(
        tick_interval_secs = config.scheduler.tick_interval_secs,
        max_concurrent = config.scheduler.max_concurrent_executions,
        "Scheduler started"
    );

    let state = AppState::new(Arc::clone(&coordinator));
    let served = routes::start_server(&config, state, shutdown_signal()).await;

    // Stop the loop even when the server failed to bind.
    coordinator.stop_scheduler().await?;
    tracing::info!("Scheduler stopped");

    served?;
    Ok(())
}
