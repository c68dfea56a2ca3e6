//! Engine facade
//!
//! Owns the per-asset state and the collaborators. Every public operation
//! plans first against `&self`, with all checks and checked arithmetic, and
//! only then commits by assignment. A returned error means nothing changed.

use std::collections::BTreeMap;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::asset::AssetLedger;
use crate::config::{EngineConfig, LedgerConfig, RiskParams};
use crate::error::{LedgerError, LedgerResult};
use crate::interfaces::{CollateralCustody, DebtTokenLedger, PriceError, PriceFeed};
use crate::rewards::SyncedVessel;
use crate::sorted_vessels::{ApproxHint, Hint};
use crate::stability_pool::DepositUpdate;
use crate::types::{AccountId, AssetId, Bucket, DebtHolder, Vessel, VesselStatus};

/// Persistent engine state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    pub config: EngineConfig,
    pub assets: BTreeMap<AssetId, AssetLedger>,
}

impl LedgerState {
    pub fn new(config: EngineConfig) -> Self {
        Self { config, assets: BTreeMap::new() }
    }
}

/// A vessel's balances including pending redistribution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntireDebtAndColl {
    pub coll: u128,
    /// Debt excluding the reserve
    pub debt: u128,
    pub reserve: u128,
    pub pending_coll: u128,
    pub pending_debt: u128,
}

/// Protocol-side balances of one collateral type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolBalances {
    pub active_coll: u128,
    pub active_debt: u128,
    pub default_coll: u128,
    pub default_debt: u128,
    pub stability_coll: u128,
    pub stability_deposits: u128,
    pub surplus_coll: u128,
}

/// Result of a stability pool deposit, withdrawal or claim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolReceipt {
    pub collateral_gain: u128,
    pub debt_withdrawn: u128,
    /// Compounded deposit after the call
    pub deposit: u128,
}

pub struct Engine<P, D, C> {
    pub(crate) state: LedgerState,
    pub(crate) feed: P,
    pub(crate) debt: D,
    pub(crate) custody: C,
}

impl<P: PriceFeed, D: DebtTokenLedger, C: CollateralCustody> Engine<P, D, C> {
    /// Engine with every asset of `config` registered
    pub fn new(config: LedgerConfig, feed: P, debt: D, custody: C) -> LedgerResult<Self> {
        config.engine.validate().map_err(|e| LedgerError::InvalidConfig(e.to_string()))?;
        let mut engine = Self::from_parts(LedgerState::new(config.engine), feed, debt, custody);
        for asset in config.assets {
            engine.add_asset(asset.id, asset.params)?;
        }
        Ok(engine)
    }

    pub fn from_parts(state: LedgerState, feed: P, debt: D, custody: C) -> Self {
        Self { state, feed, debt, custody }
    }

    pub fn into_parts(self) -> (LedgerState, P, D, C) {
        (self.state, self.feed, self.debt, self.custody)
    }

    pub fn add_asset(&mut self, id: AssetId, params: RiskParams) -> LedgerResult<()> {
        if self.state.assets.contains_key(&id) {
            return Err(LedgerError::AssetAlreadyRegistered(id));
        }
        params.validate().map_err(|e| LedgerError::InvalidConfig(format!("{id}: {e}")))?;
        info!("registered {} (mcr {}, ccr {})", id, params.mcr, params.ccr);
        self.state.assets.insert(id, AssetLedger::new(id, params));
        Ok(())
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.state.config
    }

    pub fn feed(&self) -> &P {
        &self.feed
    }

    pub fn feed_mut(&mut self) -> &mut P {
        &mut self.feed
    }

    pub fn debt_token(&self) -> &D {
        &self.debt
    }

    pub fn debt_token_mut(&mut self) -> &mut D {
        &mut self.debt
    }

    pub fn custody(&self) -> &C {
        &self.custody
    }

    pub fn custody_mut(&mut self) -> &mut C {
        &mut self.custody
    }

    pub fn asset_ids(&self) -> impl Iterator<Item = AssetId> + '_ {
        self.state.assets.keys().copied()
    }

    pub fn asset(&self, asset: AssetId) -> LedgerResult<&AssetLedger> {
        self.state.assets.get(&asset).ok_or(LedgerError::UnknownAsset(asset))
    }

    pub(crate) fn asset_mut(&mut self, asset: AssetId) -> LedgerResult<&mut AssetLedger> {
        self.state.assets.get_mut(&asset).ok_or(LedgerError::UnknownAsset(asset))
    }

    /// Fresh, non-zero price or `StalePrice`
    pub fn price(&self, asset: AssetId) -> LedgerResult<u128> {
        let quote = self
            .feed
            .fetch_price(asset)
            .map_err(|reason| LedgerError::StalePrice { asset, reason })?;
        if quote.price == 0 {
            return Err(LedgerError::StalePrice { asset, reason: PriceError::Zero });
        }
        Ok(quote.price)
    }

    // --- views ---

    pub fn vessel(&self, asset: AssetId, owner: AccountId) -> LedgerResult<Option<&Vessel>> {
        Ok(self.asset(asset)?.vessel(owner))
    }

    pub fn vessel_status(&self, asset: AssetId, owner: AccountId) -> LedgerResult<VesselStatus> {
        Ok(self.asset(asset)?.vessel(owner).map_or(VesselStatus::NonExistent, |v| v.status))
    }

    pub fn vessel_count(&self, asset: AssetId) -> LedgerResult<usize> {
        Ok(self.asset(asset)?.vessel_count())
    }

    pub fn entire_debt_and_coll(&self, asset: AssetId, owner: AccountId) -> LedgerResult<EntireDebtAndColl> {
        let synced = self.asset(asset)?.sync(owner)?;
        Ok(EntireDebtAndColl {
            coll: synced.coll(),
            debt: synced.debt(),
            reserve: synced.reserve(),
            pending_coll: synced.pending_coll(),
            pending_debt: synced.pending_debt(),
        })
    }

    /// Collateral ratio at the current price, pending rewards included
    pub fn get_vessel_health_ratio(&self, asset: AssetId, owner: AccountId) -> LedgerResult<u128> {
        let synced = self.asset(asset)?.sync(owner)?;
        synced.icr(self.price(asset)?)
    }

    pub fn nominal_ratio(&self, asset: AssetId, owner: AccountId) -> LedgerResult<u128> {
        self.asset(asset)?.sync(owner)?.nicr()
    }

    pub fn system_ratio(&self, asset: AssetId) -> LedgerResult<u128> {
        self.asset(asset)?.tcr(self.price(asset)?)
    }

    pub fn is_recovery_mode(&self, asset: AssetId) -> LedgerResult<bool> {
        self.asset(asset)?.is_recovery_mode(self.price(asset)?)
    }

    pub fn pending_rewards(&self, asset: AssetId, owner: AccountId) -> LedgerResult<(u128, u128)> {
        let ledger = self.asset(asset)?;
        let vessel = ledger.active_vessel(owner)?;
        ledger.rewards().pending_rewards(vessel)
    }

    pub fn compounded_deposit(&self, asset: AssetId, depositor: AccountId) -> LedgerResult<u128> {
        self.asset(asset)?.pool().compounded_deposit(depositor)
    }

    pub fn pending_collateral_gain(&self, asset: AssetId, depositor: AccountId) -> LedgerResult<u128> {
        self.asset(asset)?.pool().pending_collateral_gain(depositor)
    }

    pub fn total_deposits(&self, asset: AssetId) -> LedgerResult<u128> {
        Ok(self.asset(asset)?.pool().total_deposits())
    }

    pub fn surplus_of(&self, asset: AssetId, owner: AccountId) -> LedgerResult<u128> {
        Ok(self.asset(asset)?.surplus_of(owner))
    }

    pub fn pool_balances(&self, asset: AssetId) -> LedgerResult<PoolBalances> {
        let ledger = self.asset(asset)?;
        let c = ledger.counters();
        Ok(PoolBalances {
            active_coll: c.active_coll,
            active_debt: c.active_debt,
            default_coll: c.default_coll,
            default_debt: c.default_debt,
            stability_coll: ledger.pool().coll_balance(),
            stability_deposits: ledger.pool().total_deposits(),
            surplus_coll: c.surplus_coll,
        })
    }

    /// Randomized starting point for an insert hint
    pub fn approx_hint(&self, asset: AssetId, nicr: u128, trials: usize, seed: u64) -> LedgerResult<ApproxHint> {
        Ok(self.asset(asset)?.sorted().approx_hint(nicr, trials, seed))
    }

    /// Exact neighbours for `nicr`, walking from `hint`
    pub fn find_insert_position(&self, asset: AssetId, nicr: u128, hint: Hint) -> LedgerResult<(Option<AccountId>, Option<AccountId>)> {
        Ok(self.asset(asset)?.sorted().find_insert_position(nicr, hint))
    }

    // --- shared commit helpers ---

    pub(crate) fn require_debt_balance(&self, holder: DebtHolder, needed: u128) -> LedgerResult<()> {
        let available = self.debt.balance_of(holder);
        if available < needed {
            return Err(LedgerError::InsufficientDebtBalance { needed, available });
        }
        Ok(())
    }

    pub(crate) fn require_coll_balance(&self, asset: AssetId, account: AccountId, needed: u128) -> LedgerResult<()> {
        let available = self.custody.account_balance(asset, account);
        if available < needed {
            return Err(LedgerError::InsufficientCollateralBalance { needed, available });
        }
        Ok(())
    }

    pub(crate) fn move_coll(&mut self, asset: AssetId, from: Bucket, to: Bucket, amount: u128) {
        if amount > 0 {
            self.custody.transfer(asset, from, to, amount);
        }
    }

    pub(crate) fn pay_coll(&mut self, asset: AssetId, from: Bucket, to: AccountId, amount: u128) {
        if amount > 0 {
            self.custody.transfer_out(asset, from, to, amount);
        }
    }

    // --- materialisation ---

    /// Fold a vessel's pending redistribution into its stored balances
    pub fn materialize(&mut self, asset: AssetId, owner: AccountId) -> LedgerResult<SyncedVessel> {
        let ledger = self.asset(asset)?;
        let synced = ledger.sync(owner)?;
        let mut counters = ledger.counters();
        let vessel = ledger.materialized(&synced, &mut counters)?;

        let ledger = self.asset_mut(asset)?;
        ledger.vessels.insert(owner, vessel);
        ledger.counters = counters;
        self.move_coll(asset, Bucket::PendingRedistribution, Bucket::Active, synced.pending_coll());
        debug!("{} materialized on {}", owner, asset);
        Ok(synced)
    }

    // --- stability pool ---

    /// Deposit debt units into the pool, paying out any pending gain first
    pub fn provide_to_pool(&mut self, asset: AssetId, depositor: AccountId, amount: u128) -> LedgerResult<PoolReceipt> {
        let update = self.asset(asset)?.pool().plan_deposit(depositor, amount)?;
        self.require_debt_balance(DebtHolder::Account(depositor), amount)?;
        Ok(self.commit_pool_update(asset, update))
    }

    /// Withdraw up to `amount` of the compounded deposit, paying the gain
    ///
    /// Refused while the riskiest vessel is below the minimum ratio, since
    /// the pool would otherwise shrink ahead of a pending liquidation.
    pub fn withdraw_from_pool(&mut self, asset: AssetId, depositor: AccountId, amount: u128) -> LedgerResult<PoolReceipt> {
        let ledger = self.asset(asset)?;
        let update = ledger.pool().plan_withdraw(depositor, amount)?;
        if amount > 0 {
            self.require_no_undercollateralized(asset)?;
        }
        Ok(self.commit_pool_update(asset, update))
    }

    /// Pay out the collateral gain, leaving the deposit in place
    pub fn claim_pool_gains(&mut self, asset: AssetId, depositor: AccountId) -> LedgerResult<PoolReceipt> {
        let update = self.asset(asset)?.pool().plan_withdraw(depositor, 0)?;
        Ok(self.commit_pool_update(asset, update))
    }

    fn require_no_undercollateralized(&self, asset: AssetId) -> LedgerResult<()> {
        let ledger = self.asset(asset)?;
        if let Some(lowest) = ledger.sorted().last() {
            let price = self.price(asset)?;
            if ledger.sync(lowest)?.icr(price)? < ledger.params.mcr {
                return Err(LedgerError::UndercollateralizedVessels);
            }
        }
        Ok(())
    }

    fn commit_pool_update(&mut self, asset: AssetId, update: DepositUpdate) -> PoolReceipt {
        let depositor = DebtHolder::Account(update.depositor);
        if update.debt_in > 0 {
            self.debt.transfer(depositor, DebtHolder::StabilityPool, update.debt_in);
        }
        if update.debt_out > 0 {
            self.debt.transfer(DebtHolder::StabilityPool, depositor, update.debt_out);
        }
        self.pay_coll(asset, Bucket::StabilityPool, update.depositor, update.gain);
        if let Some(ledger) = self.state.assets.get_mut(&asset) {
            ledger.pool.apply_deposit(update);
        }
        PoolReceipt {
            collateral_gain: update.gain,
            debt_withdrawn: update.debt_out,
            deposit: update.new_deposit,
        }
    }
}
