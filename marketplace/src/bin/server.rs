//! Marketplace server binary
//!
//! Usage: `marketplace-server [config.toml]`. `MARKET_*` environment
//! variables override the file.

use anyhow::Context;
use marketplace::{Config, Marketplace};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))
        .context("Invalid log filter")?;
    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        service = %config.service_name,
        data_dir = ?config.store.data_dir,
        "Starting marketplace server"
    );

    let market = Marketplace::open(config)
        .await
        .context("Failed to open marketplace")?;

    let stats = market.store_stats().context("Failed to read store statistics")?;
    tracing::info!(
        users = stats.users,
        items = stats.items,
        listings = stats.listings,
        transactions = stats.transactions,
        "Store ready"
    );

    let reports = market
        .verify_all_chains()
        .context("Failed to verify ownership history")?;
    let broken = reports.iter().filter(|report| !report.is_valid()).count();
    if broken > 0 {
        tracing::warn!(items = reports.len(), broken, "Ownership history has broken chains");
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    tracing::info!("Shutting down marketplace server");
    market.shutdown().await.context("Failed to shut down")?;
    Ok(())
}
