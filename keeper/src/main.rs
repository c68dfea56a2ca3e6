//! Ballast Liquidation Keeper
//!
//! Service that loads the ledger snapshot on every tick, prices it from the
//! price file, and liquidates undercollateralized vessels of every asset.

mod config;
mod feed;
mod health;
mod priority_queue;
mod store;
mod sweep;
#[cfg(test)]
mod testutil;

use anyhow::{Context, Result};
use ballast_engine::{AssetId, LedgerConfig};
use config::Config;
use feed::FilePriceFeed;
use priority_queue::HealthQueue;
use std::time::Duration;
use store::Snapshot;
use tokio::time;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting Ballast Liquidation Keeper");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({:#}), using default local config", e);
        let config = Config::default_local();
        if let Err(e) = Config::write_default("keeper-config.toml") {
            log::warn!("{:#}", e);
        }
        config
    });

    log::info!("Ledger snapshot: {}", config.snapshot_path().display());
    log::info!("Price file: {}", config.price_file().display());
    log::info!("Liquidator account: {}", config.liquidator);

    ensure_snapshot(&config)?;

    let mut queue = HealthQueue::new();

    log::info!("Keeper service started. Monitoring for liquidations...");

    // Main event loop
    let mut interval = time::interval(Duration::from_secs(config.poll_interval_secs.max(1)));

    loop {
        interval.tick().await;

        if let Err(e) = process_liquidations(&mut queue, &config) {
            log::error!("Error processing liquidations: {:#}", e);
        }

        // Log queue status
        if !queue.is_empty() {
            log::debug!("Health queue size: {}", queue.len());

            if let Some(worst) = queue.peek() {
                log::debug!(
                    "Worst vessel: {} on {} at icr {} (coll {}, debt {})",
                    worst.owner,
                    worst.asset,
                    worst.icr,
                    worst.coll,
                    worst.debt
                );
            }
        }
    }
}

/// Create the snapshot from the ledger config if it does not exist yet
fn ensure_snapshot(config: &Config) -> Result<()> {
    let path = config.snapshot_path();
    if path.exists() {
        return Ok(());
    }
    let Some(ledger_path) = config.ledger_config() else {
        anyhow::bail!("No snapshot at {} and no ledger_config to create one", path.display());
    };
    let ledger = LedgerConfig::load(&ledger_path)
        .context(format!("Failed to load ledger config {}", ledger_path.display()))?;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).context(format!("Failed to create {}", dir.display()))?;
    }
    Snapshot::from_config(ledger)?.save(&path)?;
    log::info!("Created empty ledger snapshot at {}", path.display());
    Ok(())
}

/// One pass over every asset of the snapshot
fn process_liquidations(queue: &mut HealthQueue, config: &Config) -> Result<()> {
    let prices = FilePriceFeed::load(&config.price_file(), config.max_price_age_secs)?;
    log::debug!("Loaded {} price quotes", prices.assets().count());
    let snapshot_path = config.snapshot_path();
    let mut engine = Snapshot::load(&snapshot_path)?.into_engine(prices);
    let now = feed::unix_now();

    let assets: Vec<AssetId> = engine.asset_ids().collect();
    let mut liquidated = 0usize;
    for asset in assets {
        match sweep::sweep_asset(&mut engine, queue, asset, config, now) {
            Ok(report) => {
                if report.watching > 0 {
                    log::info!("{}: {} vessels close to the threshold", asset, report.watching);
                }
                if !report.liquidated.is_empty() {
                    log::info!(
                        "{}: liquidated {} of {} candidates (offset {}, redistributed {})",
                        asset,
                        report.liquidated.len(),
                        report.candidates,
                        report.debt_offset,
                        report.debt_redistributed
                    );
                    liquidated += report.liquidated.len();
                }
            }
            Err(e) => {
                // a failed sweep leaves that asset untouched
                log::error!("Sweep of {} failed: {:#}", asset, e);
            }
        }
    }

    if liquidated == 0 {
        log::debug!("No vessels needed liquidation");
        return Ok(());
    }

    let (snapshot, _feed) = Snapshot::from_engine(engine);
    snapshot.save(&snapshot_path)?;
    log::info!("Saved snapshot after {} liquidations", liquidated);
    Ok(())
}
