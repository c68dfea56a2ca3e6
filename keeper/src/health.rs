//! Health scan over the vessels of one asset

use anyhow::{Context, Result};
use ballast_engine::{AssetId, CappedUpperBound, Custody, DebtToken, Engine, PriceFeed};

use crate::priority_queue::{HealthQueue, VesselHealth};

pub type KeeperEngine<P> = Engine<P, DebtToken, Custody>;

/// ICR below which a vessel of `asset` can be liquidated right now
///
/// Normal mode: MCR. Recovery mode also reaches healthy-looking vessels
/// up to the system ratio or CCR, whichever bound the ledger is set to.
pub fn liquidation_threshold<P: PriceFeed>(engine: &KeeperEngine<P>, asset: AssetId) -> Result<u128> {
    let ledger = engine.asset(asset)?;
    let mcr = ledger.params.mcr;
    if !engine.is_recovery_mode(asset)? {
        return Ok(mcr);
    }
    let upper = match engine.config().recovery_capped_upper {
        CappedUpperBound::SystemRatio => engine.system_ratio(asset)?,
        CappedUpperBound::CriticalRatio => ledger.params.ccr,
    };
    Ok(upper.max(mcr))
}

/// Replace the queue entries of `asset` with a fresh scan
///
/// Returns the number of vessels scanned.
pub fn scan_asset<P: PriceFeed>(
    engine: &KeeperEngine<P>,
    asset: AssetId,
    queue: &mut HealthQueue,
    now: u64,
) -> Result<usize> {
    let ledger = engine.asset(asset)?;
    let mut scanned = Vec::with_capacity(ledger.vessel_count());
    for owner in ledger.sorted().iter() {
        let icr = engine
            .get_vessel_health_ratio(asset, owner)
            .context(format!("Failed to price {} on {}", owner, asset))?;
        let entire = engine.entire_debt_and_coll(asset, owner)?;
        scanned.push(VesselHealth {
            asset,
            owner,
            icr,
            coll: entire.coll,
            debt: entire.debt + entire.reserve,
            last_update: now,
        });
    }

    queue.clear_asset(asset);
    let count = scanned.len();
    for vh in scanned {
        queue.push(vh);
    }
    Ok(count)
}
