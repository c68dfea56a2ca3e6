//! In-memory collaborators
//!
//! Used by tests and by the keeper, which persists them with the rest of the
//! ledger snapshot.

use std::collections::{BTreeMap, HashMap};

use log::error;
use serde::{Deserialize, Serialize};

use crate::interfaces::{CollateralCustody, DebtTokenLedger, PriceError, PriceFeed, PriceQuote};
use crate::types::{AccountId, AssetId, Bucket, DebtHolder};

/// Callers check balances while planning; a shortfall here clamps to zero and is logged
fn debit(balance: &mut u128, amount: u128, what: &str) {
    match balance.checked_sub(amount) {
        Some(rest) => *balance = rest,
        None => {
            debug_assert!(false, "{what} debited {amount} with only {balance}");
            error!("{} debited {} with only {}, clamping to zero", what, amount, balance);
            *balance = 0;
        }
    }
}

/// Debt-unit balances
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtToken {
    accounts: BTreeMap<AccountId, u128>,
    stability_pool: u128,
    gas_pool: u128,
    total_supply: u128,
}

impl DebtToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    fn slot(&mut self, holder: DebtHolder) -> &mut u128 {
        match holder {
            DebtHolder::Account(id) => self.accounts.entry(id).or_insert(0),
            DebtHolder::StabilityPool => &mut self.stability_pool,
            DebtHolder::GasPool => &mut self.gas_pool,
        }
    }
}

impl DebtTokenLedger for DebtToken {
    fn balance_of(&self, holder: DebtHolder) -> u128 {
        match holder {
            DebtHolder::Account(id) => self.accounts.get(&id).copied().unwrap_or(0),
            DebtHolder::StabilityPool => self.stability_pool,
            DebtHolder::GasPool => self.gas_pool,
        }
    }

    fn mint(&mut self, to: DebtHolder, amount: u128) {
        *self.slot(to) += amount;
        self.total_supply += amount;
    }

    fn burn(&mut self, from: DebtHolder, amount: u128) {
        debit(self.slot(from), amount, "debt balance");
        debit(&mut self.total_supply, amount, "debt supply");
    }

    fn transfer(&mut self, from: DebtHolder, to: DebtHolder, amount: u128) {
        debit(self.slot(from), amount, "debt balance");
        *self.slot(to) += amount;
    }
}

/// Collateral of one asset held inside and outside the protocol
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetCustody {
    pub active: u128,
    pub pending_redistribution: u128,
    pub stability_pool: u128,
    pub surplus: u128,
    pub accounts: BTreeMap<AccountId, u128>,
}

impl AssetCustody {
    fn bucket(&mut self, bucket: Bucket) -> &mut u128 {
        match bucket {
            Bucket::Active => &mut self.active,
            Bucket::PendingRedistribution => &mut self.pending_redistribution,
            Bucket::StabilityPool => &mut self.stability_pool,
            Bucket::Surplus => &mut self.surplus,
        }
    }

    /// Sum of every protocol bucket
    pub fn held(&self) -> u128 {
        self.active + self.pending_redistribution + self.stability_pool + self.surplus
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Custody {
    assets: BTreeMap<AssetId, AssetCustody>,
}

impl Custody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit collateral to an account from outside the system
    pub fn fund(&mut self, asset: AssetId, account: AccountId, amount: u128) {
        *self.assets.entry(asset).or_default().accounts.entry(account).or_insert(0) += amount;
    }

    pub fn asset(&self, asset: AssetId) -> Option<&AssetCustody> {
        self.assets.get(&asset)
    }

    fn entry(&mut self, asset: AssetId) -> &mut AssetCustody {
        self.assets.entry(asset).or_default()
    }
}

impl CollateralCustody for Custody {
    fn balance_of(&self, asset: AssetId, bucket: Bucket) -> u128 {
        self.assets.get(&asset).map_or(0, |a| match bucket {
            Bucket::Active => a.active,
            Bucket::PendingRedistribution => a.pending_redistribution,
            Bucket::StabilityPool => a.stability_pool,
            Bucket::Surplus => a.surplus,
        })
    }

    fn account_balance(&self, asset: AssetId, account: AccountId) -> u128 {
        self.assets
            .get(&asset)
            .and_then(|a| a.accounts.get(&account).copied())
            .unwrap_or(0)
    }

    fn transfer_in(&mut self, asset: AssetId, from: AccountId, amount: u128) {
        let custody = self.entry(asset);
        debit(custody.accounts.entry(from).or_insert(0), amount, "account collateral");
        custody.active += amount;
    }

    fn transfer_out(&mut self, asset: AssetId, from: Bucket, to: AccountId, amount: u128) {
        let custody = self.entry(asset);
        debit(custody.bucket(from), amount, "custody bucket");
        *custody.accounts.entry(to).or_insert(0) += amount;
    }

    fn transfer(&mut self, asset: AssetId, from: Bucket, to: Bucket, amount: u128) {
        let custody = self.entry(asset);
        debit(custody.bucket(from), amount, "custody bucket");
        *custody.bucket(to) += amount;
    }
}

/// Fixed prices with a settable clock
#[derive(Debug, Clone, Default)]
pub struct StaticPriceFeed {
    prices: HashMap<AssetId, PriceQuote>,
    now: u64,
    max_age_secs: Option<u64>,
}

impl StaticPriceFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject quotes older than `secs`
    pub fn with_max_age(mut self, secs: u64) -> Self {
        self.max_age_secs = Some(secs);
        self
    }

    /// Set a price observed at the current clock
    pub fn set_price(&mut self, asset: AssetId, price: u128) {
        self.prices.insert(asset, PriceQuote { price, timestamp: self.now });
    }

    pub fn set_quote(&mut self, asset: AssetId, quote: PriceQuote) {
        self.prices.insert(asset, quote);
    }

    pub fn set_now(&mut self, now: u64) {
        self.now = now;
    }

    pub fn advance(&mut self, secs: u64) {
        self.now = self.now.saturating_add(secs);
    }
}

impl PriceFeed for StaticPriceFeed {
    fn fetch_price(&self, asset: AssetId) -> Result<PriceQuote, PriceError> {
        let quote = self.prices.get(&asset).copied().ok_or(PriceError::Missing)?;
        if quote.price == 0 {
            return Err(PriceError::Zero);
        }
        if let Some(max_age_secs) = self.max_age_secs {
            let age_secs = self.now.saturating_sub(quote.timestamp);
            if age_secs > max_age_secs {
                return Err(PriceError::Stale { age_secs, max_age_secs });
            }
        }
        Ok(quote)
    }
}
