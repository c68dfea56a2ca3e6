//! Redistribution accumulator
//!
//! Debt and collateral the stability pool could not absorb are spread over
//! every open vessel in proportion to stake. Nothing iterates vessels: the
//! per-stake totals `L_coll`/`L_debt` grow, and each vessel pulls
//! `stake * (L - snapshot) / 1e18` the next time it is touched.
//!
//! The pull is forced through [`SyncedVessel`]. It can only be built by
//! [`RewardState::sync`], and every health check and mutation takes one.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};
use crate::math::{self, compute_cr, compute_nominal_cr, mul_add_div_rem, mul_div, Rounding, DECIMAL_PRECISION};
use crate::types::{AccountId, RewardSnapshot, Vessel};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardState {
    /// Collateral redistributed per unit staked, 1e18-scaled
    pub l_coll: u128,
    /// Debt redistributed per unit staked, 1e18-scaled
    pub l_debt: u128,
    /// Division remainders carried into the next redistribution
    last_coll_error: u128,
    last_debt_error: u128,
    pub total_stakes: u128,
    /// `total_stakes` after the last liquidation
    pub total_stakes_snapshot: u128,
    /// Active plus pending collateral after the last liquidation
    pub total_collateral_snapshot: u128,
}

/// Precomputed result of a redistribution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedistributionUpdate {
    pub coll: u128,
    pub debt: u128,
    l_coll: u128,
    l_debt: u128,
    last_coll_error: u128,
    last_debt_error: u128,
}

impl RewardState {
    pub fn current(&self) -> RewardSnapshot {
        RewardSnapshot { l_coll: self.l_coll, l_debt: self.l_debt }
    }

    /// Rewards accrued to `vessel` since its snapshot
    pub fn pending_rewards(&self, vessel: &Vessel) -> LedgerResult<(u128, u128)> {
        if !vessel.is_active() || vessel.stake == 0 {
            return Ok((0, 0));
        }
        let d_coll = math::sub(self.l_coll, vessel.snapshot.l_coll, "L_coll snapshot")?;
        let d_debt = math::sub(self.l_debt, vessel.snapshot.l_debt, "L_debt snapshot")?;
        let coll = mul_div(vessel.stake, d_coll, DECIMAL_PRECISION, Rounding::Down)?;
        let debt = mul_div(vessel.stake, d_debt, DECIMAL_PRECISION, Rounding::Down)?;
        Ok((coll, debt))
    }

    /// Fold pending rewards into a view of the vessel
    pub fn sync(&self, owner: AccountId, vessel: &Vessel) -> LedgerResult<SyncedVessel> {
        let (pending_coll, pending_debt) = self.pending_rewards(vessel)?;
        if pending_coll > 0 || pending_debt > 0 {
            debug!("{} pulls {} coll / {} debt of redistribution", owner, pending_coll, pending_debt);
        }
        Ok(SyncedVessel {
            owner,
            coll: math::add(vessel.coll, pending_coll, "synced coll")?,
            debt: math::add(vessel.debt, pending_debt, "synced debt")?,
            pending_coll,
            pending_debt,
            stake: vessel.stake,
            reserve: vessel.reserve,
            snapshot: self.current(),
            _seal: (),
        })
    }

    /// Stake for a vessel holding `coll`
    ///
    /// Scaled by the stake/collateral ratio of the last liquidation so that
    /// vessels opened after a redistribution do not share in it.
    pub fn compute_stake(&self, coll: u128) -> LedgerResult<u128> {
        if self.total_collateral_snapshot == 0 {
            return Ok(coll);
        }
        mul_div(coll, self.total_stakes_snapshot, self.total_collateral_snapshot, Rounding::Down)
    }

    /// `total_stakes` after replacing `old_stake` by `new_stake`
    pub fn restaked_total(&self, old_stake: u128, new_stake: u128) -> LedgerResult<u128> {
        let without = math::sub(self.total_stakes, old_stake, "total stakes")?;
        math::add(without, new_stake, "total stakes")
    }

    /// Per-stake increments for spreading `coll`/`debt` over `stakes`
    pub fn plan_redistribution(&self, coll: u128, debt: u128, stakes: u128) -> LedgerResult<RedistributionUpdate> {
        if stakes == 0 {
            return Err(LedgerError::NoStakes);
        }
        let (coll_per_stake, last_coll_error) = mul_add_div_rem(coll, DECIMAL_PRECISION, self.last_coll_error, stakes)?;
        let (debt_per_stake, last_debt_error) = mul_add_div_rem(debt, DECIMAL_PRECISION, self.last_debt_error, stakes)?;
        Ok(RedistributionUpdate {
            coll,
            debt,
            l_coll: math::add(self.l_coll, coll_per_stake, "L_coll")?,
            l_debt: math::add(self.l_debt, debt_per_stake, "L_debt")?,
            last_coll_error,
            last_debt_error,
        })
    }

    pub fn apply_redistribution(&mut self, update: RedistributionUpdate) {
        debug!(
            "redistributed {} coll / {} debt, L_coll {} -> {}, L_debt {} -> {}",
            update.coll, update.debt, self.l_coll, update.l_coll, self.l_debt, update.l_debt
        );
        self.l_coll = update.l_coll;
        self.l_debt = update.l_debt;
        self.last_coll_error = update.last_coll_error;
        self.last_debt_error = update.last_debt_error;
    }

    /// Spread `coll`/`debt` over the current total stake
    pub fn redistribute(&mut self, coll: u128, debt: u128) -> LedgerResult<()> {
        let update = self.plan_redistribution(coll, debt, self.total_stakes)?;
        self.apply_redistribution(update);
        Ok(())
    }

    pub fn update_system_snapshots(&mut self, total_collateral: u128) {
        self.total_stakes_snapshot = self.total_stakes;
        self.total_collateral_snapshot = total_collateral;
        debug!(
            "system snapshots: stakes {}, collateral {}",
            self.total_stakes_snapshot, self.total_collateral_snapshot
        );
    }
}

/// A vessel with its pending redistribution folded in
///
/// Only [`RewardState::sync`] constructs it, so holding one proves the
/// balances include every redistribution so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedVessel {
    owner: AccountId,
    coll: u128,
    debt: u128,
    pending_coll: u128,
    pending_debt: u128,
    stake: u128,
    reserve: u128,
    snapshot: RewardSnapshot,
    _seal: (),
}

impl SyncedVessel {
    pub fn owner(&self) -> AccountId {
        self.owner
    }

    /// Live collateral
    pub fn coll(&self) -> u128 {
        self.coll
    }

    /// Live debt, reserve excluded
    pub fn debt(&self) -> u128 {
        self.debt
    }

    pub fn pending_coll(&self) -> u128 {
        self.pending_coll
    }

    pub fn pending_debt(&self) -> u128 {
        self.pending_debt
    }

    pub fn stake(&self) -> u128 {
        self.stake
    }

    pub fn reserve(&self) -> u128 {
        self.reserve
    }

    /// Accumulator values the balances were synced to
    pub fn snapshot(&self) -> RewardSnapshot {
        self.snapshot
    }

    /// Debt plus reserve
    pub fn composite_debt(&self) -> LedgerResult<u128> {
        math::add(self.debt, self.reserve, "composite debt")
    }

    pub fn icr(&self, price: u128) -> LedgerResult<u128> {
        compute_cr(self.coll, self.composite_debt()?, price)
    }

    pub fn nicr(&self) -> LedgerResult<u128> {
        compute_nominal_cr(self.coll, self.composite_debt()?)
    }
}
