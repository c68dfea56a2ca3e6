//! Per-collateral-type state
//!
//! Everything one collateral type owns: its vessels, the sorted registry,
//! the redistribution accumulator, the stability pool, and the pool counters
//! that mirror the custody buckets.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::config::RiskParams;
use crate::error::{LedgerError, LedgerResult};
use crate::math::{self, compute_system_cr};
use crate::rewards::{RewardState, SyncedVessel};
use crate::sorted_vessels::SortedVessels;
use crate::stability_pool::StabilityPool;
use crate::types::{AccountId, AssetId, Vessel};

/// Protocol-side balances of one collateral type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolCounters {
    /// Collateral of active vessels as last stored
    pub active_coll: u128,
    /// Debt of active vessels as last stored, reserves included
    pub active_debt: u128,
    /// Redistributed collateral not yet pulled into vessels
    pub default_coll: u128,
    /// Redistributed debt not yet pulled into vessels
    pub default_debt: u128,
    /// Collateral owed to owners of liquidated or redeemed vessels
    pub surplus_coll: u128,
}

impl PoolCounters {
    /// Move a vessel's pending rewards from the default to the active side
    pub fn pull_pending(&mut self, coll: u128, debt: u128) -> LedgerResult<()> {
        self.default_coll = math::sub(self.default_coll, coll, "default collateral")?;
        self.default_debt = math::sub(self.default_debt, debt, "default debt")?;
        self.active_coll = math::add(self.active_coll, coll, "active collateral")?;
        self.active_debt = math::add(self.active_debt, debt, "active debt")?;
        Ok(())
    }

    /// Take a closed vessel's balances off the active side
    pub fn remove_vessel(&mut self, coll: u128, composite_debt: u128) -> LedgerResult<()> {
        self.active_coll = math::sub(self.active_coll, coll, "active collateral")?;
        self.active_debt = math::sub(self.active_debt, composite_debt, "active debt")?;
        Ok(())
    }

    pub fn system_coll(&self) -> LedgerResult<u128> {
        math::add(self.active_coll, self.default_coll, "system collateral")
    }

    pub fn system_debt(&self) -> LedgerResult<u128> {
        math::add(self.active_debt, self.default_debt, "system debt")
    }
}

/// State of one collateral type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetLedger {
    pub id: AssetId,
    pub params: RiskParams,
    pub(crate) vessels: HashMap<AccountId, Vessel>,
    pub(crate) sorted: SortedVessels,
    pub(crate) rewards: RewardState,
    pub(crate) pool: StabilityPool,
    pub(crate) counters: PoolCounters,
    /// Claimable collateral per former vessel owner
    pub(crate) surplus: BTreeMap<AccountId, u128>,
}

impl AssetLedger {
    pub fn new(id: AssetId, params: RiskParams) -> Self {
        let sorted = SortedVessels::new(params.max_vessels);
        Self {
            id,
            params,
            vessels: HashMap::new(),
            sorted,
            rewards: RewardState::default(),
            pool: StabilityPool::new(),
            counters: PoolCounters::default(),
            surplus: BTreeMap::new(),
        }
    }

    pub fn vessel(&self, owner: AccountId) -> Option<&Vessel> {
        self.vessels.get(&owner)
    }

    pub fn vessels(&self) -> impl Iterator<Item = (AccountId, &Vessel)> + '_ {
        self.vessels.iter().map(|(k, v)| (*k, v))
    }

    pub fn sorted(&self) -> &SortedVessels {
        &self.sorted
    }

    pub fn rewards(&self) -> &RewardState {
        &self.rewards
    }

    pub fn pool(&self) -> &StabilityPool {
        &self.pool
    }

    pub fn counters(&self) -> PoolCounters {
        self.counters
    }

    pub fn surplus_of(&self, owner: AccountId) -> u128 {
        self.surplus.get(&owner).copied().unwrap_or(0)
    }

    /// Number of open vessels
    pub fn vessel_count(&self) -> usize {
        self.sorted.len()
    }

    pub fn active_vessel(&self, owner: AccountId) -> LedgerResult<&Vessel> {
        self.vessels
            .get(&owner)
            .filter(|v| v.is_active())
            .ok_or(LedgerError::VesselNotActive { asset: self.id, owner })
    }

    /// Active vessel with its pending redistribution folded in
    pub fn sync(&self, owner: AccountId) -> LedgerResult<SyncedVessel> {
        let vessel = self.active_vessel(owner)?;
        self.rewards.sync(owner, vessel)
    }

    /// Total collateral ratio
    pub fn tcr(&self, price: u128) -> LedgerResult<u128> {
        compute_system_cr(self.counters.system_coll()?, self.counters.system_debt()?, price)
    }

    pub fn is_recovery_mode(&self, price: u128) -> LedgerResult<bool> {
        Ok(self.tcr(price)? < self.params.ccr)
    }

    /// Stored record for a synced vessel, with counters after the pull
    ///
    /// The record keeps the vessel's stake; callers that change collateral
    /// restake on top of this.
    pub fn materialized(&self, synced: &SyncedVessel, counters: &mut PoolCounters) -> LedgerResult<Vessel> {
        counters.pull_pending(synced.pending_coll(), synced.pending_debt())?;
        let mut vessel = self.active_vessel(synced.owner())?.clone();
        vessel.coll = synced.coll();
        vessel.debt = synced.debt();
        vessel.snapshot = synced.snapshot();
        Ok(vessel)
    }
}
