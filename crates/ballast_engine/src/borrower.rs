//! Borrower operations: open, adjust, close, surplus claim
//!
//! Each entry point syncs the vessel first, so ratio checks and the stored
//! record both include pending redistribution.

use log::info;

use crate::engine::Engine;
use crate::error::{LedgerError, LedgerResult};
use crate::interfaces::{CollateralCustody, DebtTokenLedger, PriceFeed};
use crate::math::{self, compute_cr, compute_nominal_cr, compute_system_cr};
use crate::sorted_vessels::Hint;
use crate::types::{AccountId, AssetId, Bucket, DebtHolder, Vessel, VesselStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebtChange {
    #[default]
    None,
    Borrow(u128),
    Repay(u128),
}

/// Changes applied by [`Engine::adjust_vessel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VesselAdjustment {
    pub coll_added: u128,
    pub coll_withdrawn: u128,
    pub debt_change: DebtChange,
    pub hint: Hint,
}

impl VesselAdjustment {
    pub fn add_coll(amount: u128) -> Self {
        Self { coll_added: amount, ..Self::default() }
    }

    pub fn withdraw_coll(amount: u128) -> Self {
        Self { coll_withdrawn: amount, ..Self::default() }
    }

    pub fn borrow(amount: u128) -> Self {
        Self { debt_change: DebtChange::Borrow(amount), ..Self::default() }
    }

    pub fn repay(amount: u128) -> Self {
        Self { debt_change: DebtChange::Repay(amount), ..Self::default() }
    }

    pub fn with_hint(mut self, hint: Hint) -> Self {
        self.hint = hint;
        self
    }

    fn is_empty(&self) -> bool {
        self.coll_added == 0
            && self.coll_withdrawn == 0
            && matches!(self.debt_change, DebtChange::None | DebtChange::Borrow(0) | DebtChange::Repay(0))
    }
}

impl<P: PriceFeed, D: DebtTokenLedger, C: CollateralCustody> Engine<P, D, C> {
    /// Lock `coll` and mint `debt` to the owner, plus the reserve to the gas pool
    pub fn open_vessel(&mut self, asset: AssetId, owner: AccountId, coll: u128, debt: u128, hint: Hint) -> LedgerResult<()> {
        let ledger = self.asset(asset)?;
        let params = &ledger.params;
        if ledger.vessel(owner).is_some_and(Vessel::is_active) {
            return Err(LedgerError::VesselAlreadyActive { asset, owner });
        }
        if coll == 0 || debt == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        if debt < params.min_net_debt {
            return Err(LedgerError::NetDebtTooSmall { debt, min: params.min_net_debt });
        }
        if ledger.sorted().is_full() {
            return Err(LedgerError::RegistryFull(ledger.sorted().max_size()));
        }
        self.require_coll_balance(asset, owner, coll)?;

        let price = self.price(asset)?;
        let reserve = params.liquidation_reserve;
        let composite = math::add(debt, reserve, "composite debt")?;
        let icr = compute_cr(coll, composite, price)?;
        let nicr = compute_nominal_cr(coll, composite)?;

        let mut counters = ledger.counters();
        if ledger.is_recovery_mode(price)? {
            if icr < params.ccr {
                return Err(LedgerError::InsufficientCollateralRatio { ratio: icr, required: params.ccr });
            }
        } else {
            if icr < params.mcr {
                return Err(LedgerError::InsufficientCollateralRatio { ratio: icr, required: params.mcr });
            }
            let new_tcr = compute_system_cr(
                math::add(counters.system_coll()?, coll, "system collateral")?,
                math::add(counters.system_debt()?, composite, "system debt")?,
                price,
            )?;
            if new_tcr < params.ccr {
                return Err(LedgerError::SystemRatioBelowCritical { ratio: new_tcr, critical: params.ccr });
            }
        }

        let stake = ledger.rewards().compute_stake(coll)?;
        let total_stakes = math::add(ledger.rewards().total_stakes, stake, "total stakes")?;
        counters.active_coll = math::add(counters.active_coll, coll, "active collateral")?;
        counters.active_debt = math::add(counters.active_debt, composite, "active debt")?;
        let vessel = Vessel {
            coll,
            debt,
            reserve,
            stake,
            status: VesselStatus::Active,
            snapshot: ledger.rewards().current(),
        };

        let ledger = self.asset_mut(asset)?;
        ledger.sorted.insert(owner, nicr, hint)?;
        ledger.vessels.insert(owner, vessel);
        ledger.rewards.total_stakes = total_stakes;
        ledger.counters = counters;
        self.custody.transfer_in(asset, owner, coll);
        self.debt.mint(DebtHolder::Account(owner), debt);
        if reserve > 0 {
            self.debt.mint(DebtHolder::GasPool, reserve);
        }
        info!("{} opened vessel on {}: coll {}, debt {}, icr {}", owner, asset, coll, debt, icr);
        Ok(())
    }

    pub fn adjust_vessel(&mut self, asset: AssetId, owner: AccountId, adj: VesselAdjustment) -> LedgerResult<()> {
        if adj.is_empty() {
            return Err(LedgerError::ZeroAmount);
        }
        if adj.coll_added > 0 && adj.coll_withdrawn > 0 {
            return Err(LedgerError::ConflictingCollateralChange);
        }
        let ledger = self.asset(asset)?;
        let params = &ledger.params;
        let synced = ledger.sync(owner)?;
        let price = self.price(asset)?;

        if adj.coll_withdrawn > synced.coll() {
            return Err(LedgerError::CollateralWithdrawalExceedsBalance { amount: adj.coll_withdrawn, coll: synced.coll() });
        }
        if adj.coll_added > 0 {
            self.require_coll_balance(asset, owner, adj.coll_added)?;
        }
        let new_coll = math::sub(math::add(synced.coll(), adj.coll_added, "vessel collateral")?, adj.coll_withdrawn, "vessel collateral")?;
        let (new_debt, borrowed, repaid) = match adj.debt_change {
            DebtChange::None => (synced.debt(), 0, 0),
            DebtChange::Borrow(x) => (math::add(synced.debt(), x, "vessel debt")?, x, 0),
            DebtChange::Repay(x) => {
                if x > synced.debt() {
                    return Err(LedgerError::RepaymentExceedsDebt { amount: x, debt: synced.debt() });
                }
                self.require_debt_balance(DebtHolder::Account(owner), x)?;
                (synced.debt() - x, 0, x)
            }
        };
        if new_debt < params.min_net_debt {
            return Err(LedgerError::NetDebtTooSmall { debt: new_debt, min: params.min_net_debt });
        }

        let old_icr = synced.icr(price)?;
        let new_composite = math::add(new_debt, synced.reserve(), "composite debt")?;
        let new_icr = compute_cr(new_coll, new_composite, price)?;

        if ledger.is_recovery_mode(price)? {
            if adj.coll_withdrawn > 0 {
                return Err(LedgerError::RecoveryModeRestriction);
            }
            if borrowed > 0 {
                if new_icr < params.ccr {
                    return Err(LedgerError::InsufficientCollateralRatio { ratio: new_icr, required: params.ccr });
                }
                if new_icr < old_icr {
                    return Err(LedgerError::RatioMustImprove);
                }
            }
        } else {
            if new_icr < params.mcr {
                return Err(LedgerError::InsufficientCollateralRatio { ratio: new_icr, required: params.mcr });
            }
            let c = ledger.counters();
            let sys_coll = math::sub(math::add(c.system_coll()?, adj.coll_added, "system collateral")?, adj.coll_withdrawn, "system collateral")?;
            let sys_debt = math::sub(math::add(c.system_debt()?, borrowed, "system debt")?, repaid, "system debt")?;
            let new_tcr = compute_system_cr(sys_coll, sys_debt, price)?;
            if new_tcr < params.ccr {
                return Err(LedgerError::SystemRatioBelowCritical { ratio: new_tcr, critical: params.ccr });
            }
        }

        let mut counters = ledger.counters();
        let mut vessel = ledger.materialized(&synced, &mut counters)?;
        counters.active_coll = math::sub(
            math::add(counters.active_coll, adj.coll_added, "active collateral")?,
            adj.coll_withdrawn,
            "active collateral",
        )?;
        counters.active_debt = math::sub(math::add(counters.active_debt, borrowed, "active debt")?, repaid, "active debt")?;
        let stake = ledger.rewards().compute_stake(new_coll)?;
        let total_stakes = ledger.rewards().restaked_total(vessel.stake, stake)?;
        vessel.coll = new_coll;
        vessel.debt = new_debt;
        vessel.stake = stake;
        let nicr = compute_nominal_cr(new_coll, new_composite)?;

        let ledger = self.asset_mut(asset)?;
        ledger.sorted.reinsert(owner, nicr, adj.hint)?;
        ledger.vessels.insert(owner, vessel);
        ledger.rewards.total_stakes = total_stakes;
        ledger.counters = counters;
        self.move_coll(asset, Bucket::PendingRedistribution, Bucket::Active, synced.pending_coll());
        if adj.coll_added > 0 {
            self.custody.transfer_in(asset, owner, adj.coll_added);
        }
        self.pay_coll(asset, Bucket::Active, owner, adj.coll_withdrawn);
        if borrowed > 0 {
            self.debt.mint(DebtHolder::Account(owner), borrowed);
        }
        if repaid > 0 {
            self.debt.burn(DebtHolder::Account(owner), repaid);
        }
        info!("{} adjusted vessel on {}: coll {}, debt {}, icr {}", owner, asset, new_coll, new_debt, new_icr);
        Ok(())
    }

    /// Repay the debt, release the reserve and return the collateral
    pub fn close_vessel(&mut self, asset: AssetId, owner: AccountId) -> LedgerResult<()> {
        let ledger = self.asset(asset)?;
        let synced = ledger.sync(owner)?;
        let price = self.price(asset)?;
        if ledger.is_recovery_mode(price)? {
            return Err(LedgerError::RecoveryModeRestriction);
        }
        if ledger.vessel_count() <= 1 {
            return Err(LedgerError::LastVessel(asset));
        }
        self.require_debt_balance(DebtHolder::Account(owner), synced.debt())?;
        if self.debt.balance_of(DebtHolder::GasPool) < synced.reserve() {
            return Err(LedgerError::Invariant("gas pool below vessel reserve"));
        }

        let mut counters = ledger.counters();
        counters.pull_pending(synced.pending_coll(), synced.pending_debt())?;
        counters.remove_vessel(synced.coll(), synced.composite_debt()?)?;
        let new_tcr = compute_system_cr(counters.system_coll()?, counters.system_debt()?, price)?;
        if new_tcr < ledger.params.ccr {
            return Err(LedgerError::SystemRatioBelowCritical { ratio: new_tcr, critical: ledger.params.ccr });
        }
        let total_stakes = math::sub(ledger.rewards().total_stakes, synced.stake(), "total stakes")?;

        let ledger = self.asset_mut(asset)?;
        ledger.sorted.remove(owner)?;
        if let Some(v) = ledger.vessels.get_mut(&owner) {
            v.close(VesselStatus::ClosedByOwner);
        }
        ledger.rewards.total_stakes = total_stakes;
        ledger.counters = counters;
        self.move_coll(asset, Bucket::PendingRedistribution, Bucket::Active, synced.pending_coll());
        self.pay_coll(asset, Bucket::Active, owner, synced.coll());
        if synced.debt() > 0 {
            self.debt.burn(DebtHolder::Account(owner), synced.debt());
        }
        if synced.reserve() > 0 {
            self.debt.burn(DebtHolder::GasPool, synced.reserve());
        }
        info!("{} closed vessel on {}", owner, asset);
        Ok(())
    }

    /// Collateral left over from a capped liquidation or a full redemption
    pub fn claim_collateral_surplus(&mut self, asset: AssetId, owner: AccountId) -> LedgerResult<u128> {
        let ledger = self.asset(asset)?;
        let amount = ledger.surplus_of(owner);
        if amount == 0 {
            return Err(LedgerError::NoSurplus(owner));
        }
        let mut counters = ledger.counters();
        counters.surplus_coll = math::sub(counters.surplus_coll, amount, "surplus collateral")?;

        let ledger = self.asset_mut(asset)?;
        ledger.surplus.remove(&owner);
        ledger.counters = counters;
        self.pay_coll(asset, Bucket::Surplus, owner, amount);
        info!("{} claimed {} surplus collateral on {}", owner, amount, asset);
        Ok(amount)
    }
}
