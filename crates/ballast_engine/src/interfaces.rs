//! Collaborator boundaries: price source, debt-unit ledger, collateral custody
//!
//! The engine validates every balance it is about to move during planning,
//! so the mutating methods here are infallible by contract. An implementation
//! that cannot honour a call it was handed has diverged from the engine's
//! view of balances, which is a bug rather than a recoverable condition.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{AccountId, AssetId, Bucket, DebtHolder};

/// Why a price could not be produced
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriceError {
    #[error("no price available")]
    Missing,
    #[error("price is {age_secs}s old, limit {max_age_secs}s")]
    Stale { age_secs: u64, max_age_secs: u64 },
    #[error("price is zero")]
    Zero,
}

/// A 1e18-scaled price with the time it was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub price: u128,
    pub timestamp: u64,
}

pub trait PriceFeed {
    /// Current price of one unit of `asset` in debt units
    fn fetch_price(&self, asset: AssetId) -> Result<PriceQuote, PriceError>;
}

pub trait DebtTokenLedger {
    fn balance_of(&self, holder: DebtHolder) -> u128;
    fn mint(&mut self, to: DebtHolder, amount: u128);
    fn burn(&mut self, from: DebtHolder, amount: u128);
    fn transfer(&mut self, from: DebtHolder, to: DebtHolder, amount: u128);
}

pub trait CollateralCustody {
    fn balance_of(&self, asset: AssetId, bucket: Bucket) -> u128;
    /// Collateral held by an account outside the protocol
    fn account_balance(&self, asset: AssetId, account: AccountId) -> u128;
    /// Account -> active bucket
    fn transfer_in(&mut self, asset: AssetId, from: AccountId, amount: u128);
    /// Bucket -> account
    fn transfer_out(&mut self, asset: AssetId, from: Bucket, to: AccountId, amount: u128);
    /// Bucket -> bucket
    fn transfer(&mut self, asset: AssetId, from: Bucket, to: Bucket, amount: u128);
}

impl<T: PriceFeed + ?Sized> PriceFeed for &T {
    fn fetch_price(&self, asset: AssetId) -> Result<PriceQuote, PriceError> {
        (**self).fetch_price(asset)
    }
}
