//! Identifiers and the per-vessel record

use core::fmt;

use serde::{Deserialize, Serialize};

/// Owner of vessels, deposits and token balances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "acct#{}", self.0)
    }
}

/// Collateral type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub u32);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "asset#{}", self.0)
    }
}

/// Vessel lifecycle. Closing is a status transition, the record stays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VesselStatus {
    #[default]
    NonExistent,
    Active,
    ClosedByOwner,
    ClosedByLiquidation,
    /// Fully redeemed against debt units
    ClosedByExternalSettlement,
}

/// Accumulator values observed the last time a vessel was touched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RewardSnapshot {
    pub l_coll: u128,
    pub l_debt: u128,
}

/// One owner's position for one collateral type
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Vessel {
    /// Collateral as of last touch (pending rewards excluded)
    pub coll: u128,
    /// Debt that takes part in offset/redistribution
    pub debt: u128,
    /// Liquidation reserve held in the gas pool for this vessel
    pub reserve: u128,
    /// Redistribution weight
    pub stake: u128,
    pub status: VesselStatus,
    pub snapshot: RewardSnapshot,
}

impl Vessel {
    pub fn is_active(&self) -> bool {
        self.status == VesselStatus::Active
    }

    /// Reset balances on close; the status records why
    pub(crate) fn close(&mut self, status: VesselStatus) {
        self.coll = 0;
        self.debt = 0;
        self.reserve = 0;
        self.stake = 0;
        self.snapshot = RewardSnapshot::default();
        self.status = status;
    }
}

/// Holder of debt units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DebtHolder {
    Account(AccountId),
    /// Stability pool deposits
    StabilityPool,
    /// Liquidation reserves
    GasPool,
}

/// Collateral custody bucket inside the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Bucket {
    /// Backing for active vessels
    Active,
    /// Redistributed collateral not yet pulled by its vessels
    PendingRedistribution,
    /// Collateral gains owed to pool depositors
    StabilityPool,
    /// Leftovers from capped liquidations and full redemptions
    Surplus,
}
