//! Redemption: debt units swapped for collateral at face value
//!
//! The walk starts at the lowest-ratio vessel that is still at or above MCR
//! and moves up the registry. Each vessel gives up to its whole debt. A
//! vessel left with no debt is closed and its remaining collateral becomes
//! the owner's surplus. A partial redemption ends the walk.

use log::{debug, info};

use crate::engine::Engine;
use crate::error::{LedgerError, LedgerResult};
use crate::interfaces::{CollateralCustody, DebtTokenLedger, PriceFeed};
use crate::math::{self, compute_nominal_cr, mul_div, Rounding, DECIMAL_PRECISION};
use crate::sorted_vessels::Hint;
use crate::types::{AccountId, AssetId, Bucket, DebtHolder, Vessel, VesselStatus};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RedemptionOutcome {
    pub debt_redeemed: u128,
    pub coll_drawn: u128,
    pub vessels_touched: usize,
    /// Vessels closed because their debt reached zero
    pub closed: Vec<AccountId>,
}

#[derive(Debug, Clone)]
enum Step {
    Closed {
        owner: AccountId,
        reserve: u128,
        surplus_balance: u128,
    },
    Partial {
        owner: AccountId,
        vessel: Vessel,
        nicr: u128,
    },
}

impl<P: PriceFeed, D: DebtTokenLedger, C: CollateralCustody> Engine<P, D, C> {
    /// Redeem `amount` debt units against the riskiest healthy vessels
    ///
    /// `max_iterations` bounds the vessels redeemed against, defaulting to
    /// the engine setting. Vessels below MCR are passed over.
    pub fn redeem_collateral(
        &mut self,
        asset: AssetId,
        redeemer: AccountId,
        amount: u128,
        hint: Hint,
        max_iterations: Option<usize>,
    ) -> LedgerResult<RedemptionOutcome> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let ledger = self.asset(asset)?;
        let params = &ledger.params;
        self.require_debt_balance(DebtHolder::Account(redeemer), amount)?;
        let price = self.price(asset)?;
        let tcr = ledger.tcr(price)?;
        if tcr < params.mcr {
            return Err(LedgerError::InsufficientCollateralRatio { ratio: tcr, required: params.mcr });
        }
        let max_iterations = max_iterations.unwrap_or(self.state.config.redemption_max_iterations);

        let mut counters = ledger.counters();
        let mut total_stakes = ledger.rewards().total_stakes;
        let mut vessels_left = ledger.vessel_count();
        let mut remaining = amount;
        let mut pending_pulled = 0u128;
        let mut reserves_burned = 0u128;
        let mut outcome = RedemptionOutcome::default();
        let mut steps = Vec::new();

        for owner in ledger.sorted().iter_from_tail() {
            if remaining == 0 || outcome.vessels_touched >= max_iterations {
                break;
            }
            let synced = ledger.sync(owner)?;
            if synced.icr(price)? < params.mcr {
                debug!("redemption passes over {} on {}: below MCR", owner, asset);
                continue;
            }

            let debt_lot = remaining.min(synced.debt());
            let coll_lot = mul_div(debt_lot, DECIMAL_PRECISION, price, Rounding::Down)?;
            let new_debt = synced.debt() - debt_lot;
            let new_coll = math::sub(synced.coll(), coll_lot, "redeemed collateral")?;

            if new_debt == 0 {
                if vessels_left <= 1 {
                    break;
                }
                counters.pull_pending(synced.pending_coll(), synced.pending_debt())?;
                counters.remove_vessel(synced.coll(), synced.composite_debt()?)?;
                counters.surplus_coll = math::add(counters.surplus_coll, new_coll, "surplus collateral")?;
                total_stakes = math::sub(total_stakes, synced.stake(), "total stakes")?;
                reserves_burned = math::add(reserves_burned, synced.reserve(), "reserves")?;
                vessels_left -= 1;
                outcome.closed.push(owner);
                steps.push(Step::Closed {
                    owner,
                    reserve: synced.reserve(),
                    surplus_balance: math::add(ledger.surplus_of(owner), new_coll, "owner surplus")?,
                });
            } else {
                if new_debt < params.min_net_debt {
                    break;
                }
                let mut vessel = ledger.materialized(&synced, &mut counters)?;
                counters.active_coll = math::sub(counters.active_coll, coll_lot, "active collateral")?;
                counters.active_debt = math::sub(counters.active_debt, debt_lot, "active debt")?;
                let stake = ledger.rewards().compute_stake(new_coll)?;
                total_stakes = math::add(math::sub(total_stakes, vessel.stake, "total stakes")?, stake, "total stakes")?;
                let nicr = compute_nominal_cr(new_coll, math::add(new_debt, synced.reserve(), "composite debt")?)?;
                if nicr == 0 {
                    return Err(LedgerError::Invariant("partially redeemed vessel has no collateral"));
                }
                vessel.coll = new_coll;
                vessel.debt = new_debt;
                vessel.stake = stake;
                steps.push(Step::Partial { owner, vessel, nicr });
            }

            pending_pulled = math::add(pending_pulled, synced.pending_coll(), "pending collateral")?;
            outcome.debt_redeemed = math::add(outcome.debt_redeemed, debt_lot, "redeemed debt")?;
            outcome.coll_drawn = math::add(outcome.coll_drawn, coll_lot, "redeemed collateral")?;
            outcome.vessels_touched += 1;
            remaining -= debt_lot;
        }

        if outcome.vessels_touched == 0 {
            return Err(LedgerError::UnableToRedeem);
        }
        if self.debt.balance_of(DebtHolder::GasPool) < reserves_burned {
            return Err(LedgerError::Invariant("gas pool holds less than the reserves"));
        }
        let surplus_total = math::sub(counters.surplus_coll, ledger.counters().surplus_coll, "surplus collateral")?;

        let ledger = self.asset_mut(asset)?;
        for step in &steps {
            match step {
                Step::Partial { owner, nicr, .. } => ledger.sorted.reinsert(*owner, *nicr, hint)?,
                Step::Closed { owner, .. } => {
                    ledger.sorted.remove(*owner)?;
                }
            }
        }
        for step in steps {
            match step {
                Step::Closed { owner, reserve, surplus_balance } => {
                    if let Some(v) = ledger.vessels.get_mut(&owner) {
                        v.close(VesselStatus::ClosedByExternalSettlement);
                    }
                    if surplus_balance > 0 {
                        ledger.surplus.insert(owner, surplus_balance);
                    }
                    debug!("{} on {} fully redeemed, reserve {} burned", owner, asset, reserve);
                }
                Step::Partial { owner, vessel, .. } => {
                    ledger.vessels.insert(owner, vessel);
                }
            }
        }
        ledger.rewards.total_stakes = total_stakes;
        ledger.counters = counters;

        self.move_coll(asset, Bucket::PendingRedistribution, Bucket::Active, pending_pulled);
        self.pay_coll(asset, Bucket::Active, redeemer, outcome.coll_drawn);
        self.move_coll(asset, Bucket::Active, Bucket::Surplus, surplus_total);
        self.debt.burn(DebtHolder::Account(redeemer), outcome.debt_redeemed);
        if reserves_burned > 0 {
            self.debt.burn(DebtHolder::GasPool, reserves_burned);
        }
        info!(
            "{} redeemed {} debt for {} coll on {} across {} vessels ({} closed)",
            redeemer,
            outcome.debt_redeemed,
            outcome.coll_drawn,
            asset,
            outcome.vessels_touched,
            outcome.closed.len()
        );
        Ok(outcome)
    }
}
