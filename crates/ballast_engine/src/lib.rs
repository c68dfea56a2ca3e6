//! Collateralized debt ledger with liquidation, redistribution and a
//! compounding stability pool
//! No I/O and no panics on accounting paths; every mutation plans before it commits

pub mod math;
pub mod types;
pub mod error;
pub mod config;
pub mod interfaces;
pub mod ledger;
pub mod sorted_vessels;
pub mod rewards;
pub mod stability_pool;
pub mod asset;
pub mod engine;
pub mod borrower;
pub mod liquidation;
pub mod redemption;

// Re-export commonly used types
pub use asset::{AssetLedger, PoolCounters};
pub use borrower::{DebtChange, VesselAdjustment};
pub use config::{AssetConfig, CappedUpperBound, ConfigError, EngineConfig, LedgerConfig, RiskParams, MAX_LIQUIDATION_BATCH};
pub use engine::{Engine, EntireDebtAndColl, LedgerState, PoolBalances, PoolReceipt};
pub use error::{ErrorKind, LedgerError, LedgerResult};
pub use interfaces::{CollateralCustody, DebtTokenLedger, PriceError, PriceFeed, PriceQuote};
pub use ledger::{Custody, DebtToken, StaticPriceFeed};
pub use liquidation::{LiquidationKind, LiquidationOutcome, LiquidationTotals, SingleLiquidation};
pub use redemption::RedemptionOutcome;
pub use rewards::SyncedVessel;
pub use sorted_vessels::{ApproxHint, Hint};
pub use types::{AccountId, AssetId, Bucket, DebtHolder, Vessel, VesselStatus};
