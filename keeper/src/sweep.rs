//! One liquidation pass over one asset

use anyhow::{Context, Result};
use ballast_engine::{AccountId, AssetId, LedgerError, PriceFeed};

use crate::config::Config;
use crate::health::{liquidation_threshold, scan_asset, KeeperEngine};
use crate::priority_queue::HealthQueue;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub candidates: usize,
    /// Healthy vessels within the watch margin of the threshold
    pub watching: usize,
    pub liquidated: Vec<AccountId>,
    pub debt_offset: u128,
    pub debt_redistributed: u128,
}

/// Rescan `asset` and liquidate the worst vessels below the threshold
///
/// Candidates are taken worst first, capped by the keeper batch size and
/// the engine's own limit. A batch that would close the last vessel is
/// retried without its healthiest member.
pub fn sweep_asset<P: PriceFeed>(
    engine: &mut KeeperEngine<P>,
    queue: &mut HealthQueue,
    asset: AssetId,
    config: &Config,
    now: u64,
) -> Result<SweepReport> {
    let mut report = SweepReport {
        scanned: scan_asset(engine, asset, queue, now)?,
        ..SweepReport::default()
    };
    let threshold = liquidation_threshold(engine, asset)?;
    report.watching = queue.get_watchlist(asset, threshold, config.watch_margin as u128).len();

    let candidates = queue.get_liquidatable(asset, threshold);
    report.candidates = candidates.len();
    if candidates.is_empty() {
        log::debug!("{}: no vessels below {}", asset, threshold);
        return Ok(report);
    }

    let batch = config.max_liquidations_per_batch.min(engine.config().max_batch_size);
    let mut ids: Vec<AccountId> = candidates.iter().take(batch).map(|vh| vh.owner).collect();
    log::info!("{}: {} vessels below {}, liquidating {}", asset, candidates.len(), threshold, ids.len());

    while !ids.is_empty() {
        match engine.liquidate_set(asset, &ids, config.liquidator) {
            Ok(outcome) => {
                for owner in &outcome.liquidated {
                    queue.remove(asset, *owner);
                }
                report.debt_offset = outcome.totals.debt_offset;
                report.debt_redistributed = outcome.totals.debt_redistributed;
                report.liquidated = outcome.liquidated;
                break;
            }
            Err(LedgerError::LastVessel(_)) => {
                let dropped = ids.pop();
                log::warn!("{}: batch would close the last vessel, dropping {:?}", asset, dropped);
            }
            Err(LedgerError::NothingToLiquidate) => {
                log::debug!("{}: every candidate was skipped", asset);
                break;
            }
            Err(e) => return Err(e).context(format!("Liquidation on {} failed", asset)),
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;

    fn keeper_config() -> Config {
        Config { liquidator: KEEPER, ..Config::default_local() }
    }

    #[test]
    fn test_sweep_liquidates_below_mcr() {
        let mut e = engine(100 * DP);
        open(&mut e, 9, 100, 2_000);
        e.provide_to_pool(ETH, AccountId(9), 1_500 * DP).unwrap();
        open(&mut e, 1, 10, 500);
        open(&mut e, 2, 10, 600);
        open(&mut e, 3, 20, 500);

        // vessel 1 at 100%, vessel 2 at 83%, TCR 194%
        set_price(&mut e, 50 * DP);
        let mut queue = HealthQueue::new();
        let report = sweep_asset(&mut e, &mut queue, ETH, &keeper_config(), 0).unwrap();
        assert_eq!(report.scanned, 4);
        assert_eq!(report.candidates, 2);
        assert_eq!(report.liquidated, vec![AccountId(2), AccountId(1)]);
        assert_eq!(report.debt_offset, 1_100 * DP);
        assert_eq!(report.debt_redistributed, 0);
        assert_eq!(queue.len(), 2);
        assert_eq!(e.vessel_count(ETH).unwrap(), 2);
        assert_eq!(e.total_deposits(ETH).unwrap(), 400 * DP);
    }

    #[test]
    fn test_sweep_respects_batch_size() {
        let mut e = engine(100 * DP);
        open(&mut e, 9, 200, 2_000);
        e.provide_to_pool(ETH, AccountId(9), 2_000 * DP).unwrap();
        for i in 1..=3 {
            open(&mut e, i, 10, 500 + 10 * i as u128);
        }

        set_price(&mut e, 50 * DP);
        let config = Config { max_liquidations_per_batch: 2, ..keeper_config() };
        let mut queue = HealthQueue::new();
        let report = sweep_asset(&mut e, &mut queue, ETH, &config, 0).unwrap();
        assert_eq!(report.candidates, 3);
        assert_eq!(report.liquidated, vec![AccountId(3), AccountId(2)]);

        let report = sweep_asset(&mut e, &mut queue, ETH, &config, 1).unwrap();
        assert_eq!(report.liquidated, vec![AccountId(1)]);
    }

    #[test]
    fn test_sweep_keeps_last_vessel() {
        let mut e = engine(100 * DP);
        open(&mut e, 1, 10, 500);
        open(&mut e, 2, 10, 600);

        set_price(&mut e, 50 * DP);
        let mut queue = HealthQueue::new();
        let report = sweep_asset(&mut e, &mut queue, ETH, &keeper_config(), 0).unwrap();
        assert_eq!(report.liquidated, vec![AccountId(2)]);
        assert_eq!(report.debt_redistributed, 600 * DP);
        assert_eq!(e.vessel_count(ETH).unwrap(), 1);
    }

    #[test]
    fn test_sweep_healthy_book_is_noop() {
        let mut e = engine(100 * DP);
        open(&mut e, 1, 20, 500);
        open(&mut e, 2, 10, 850);

        let mut queue = HealthQueue::new();
        let report = sweep_asset(&mut e, &mut queue, ETH, &keeper_config(), 0).unwrap();
        assert_eq!(report.candidates, 0);
        // vessel 2 at 117.6%, inside the default 10% margin
        assert_eq!(report.watching, 1);
        assert!(report.liquidated.is_empty());
    }

    #[test]
    fn test_sweep_stops_on_stale_price() {
        let mut e = engine(100 * DP);
        open(&mut e, 1, 10, 500);
        open(&mut e, 2, 10, 600);
        e.feed_mut().set_now(1_000);
        let stale = std::mem::take(e.feed_mut()).with_max_age(60);
        *e.feed_mut() = stale;

        let mut queue = HealthQueue::new();
        assert!(sweep_asset(&mut e, &mut queue, ETH, &keeper_config(), 0).is_err());
        assert_eq!(e.vessel_count(ETH).unwrap(), 2);
    }
}
