//! Headless XAU/USD trading daemon.
//!
//! Loads configuration from the environment, opens the SQLite store,
//! wires the paper broker and AI validator, and runs the supervisor
//! loop until interrupted.

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;
use xautrade::application::bootstrap::bootstrap;
use xautrade::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("xautrade {} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env().context("loading configuration from the environment")?;
    info!(
        trading_mode = ?config.broker.trading_mode,
        timeframe = ?config.strategy.timeframe,
        "configuration loaded"
    );

    let supervisor = bootstrap(&config).await.context("bootstrapping supervisor")?;
    let cancel = supervisor.cancellation_token();

    let run = tokio::spawn(supervisor.start());

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown signal received, stopping supervisor");
    cancel.cancel();

    run.await.context("supervisor task panicked")??;
    info!("xautrade stopped cleanly");
    Ok(())
}
