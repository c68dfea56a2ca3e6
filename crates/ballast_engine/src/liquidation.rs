//! Liquidation planner and commit
//!
//! A liquidation call is planned in full against `&self` and committed only
//! if every vessel in it plans cleanly:
//! 1. Sync each candidate and decide its treatment from the running system
//!    ratio, which drops as earlier vessels in the same call are closed
//! 2. Accumulate the split into a bounded [`LiquidationPlan`]
//! 3. Precompute one stability pool offset and one redistribution
//! 4. Commit: unlink, close, apply both updates, move custody, pay the liquidator
//!
//! Treatment per vessel:
//! - normal mode, ICR < MCR: offset against the pool, remainder redistributed
//! - recovery, ICR <= floor: everything redistributed
//! - recovery, ICR < MCR: as in normal mode
//! - recovery, MCR <= ICR < upper bound, pool covers the debt: collateral
//!   capped at MCR goes to the pool, the rest is the owner's surplus

use std::collections::HashSet;

use arrayvec::ArrayVec;
use log::{error, info, warn};

use crate::asset::{AssetLedger, PoolCounters};
use crate::config::{CappedUpperBound, EngineConfig, MAX_LIQUIDATION_BATCH};
use crate::engine::Engine;
use crate::error::{LedgerError, LedgerResult};
use crate::interfaces::{CollateralCustody, DebtTokenLedger, PriceFeed};
use crate::math::{self, bps_of, compute_system_cr, mul_div, Rounding};
use crate::rewards::{RedistributionUpdate, SyncedVessel};
use crate::stability_pool::OffsetUpdate;
use crate::types::{AccountId, AssetId, Bucket, DebtHolder, VesselStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiquidationKind {
    /// Offset against the pool, remainder redistributed
    Offset,
    /// Everything redistributed
    Redistribution,
    /// Recovery mode, collateral capped at MCR
    Capped,
}

/// Split of one liquidated vessel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SingleLiquidation {
    pub owner: AccountId,
    pub kind: LiquidationKind,
    pub coll: u128,
    pub debt: u128,
    pub reserve: u128,
    pub stake: u128,
    pub pending_coll: u128,
    pub pending_debt: u128,
    pub coll_incentive: u128,
    pub debt_to_offset: u128,
    pub coll_to_pool: u128,
    pub debt_to_redistribute: u128,
    pub coll_to_redistribute: u128,
    pub coll_surplus: u128,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiquidationTotals {
    pub coll_liquidated: u128,
    pub debt_liquidated: u128,
    pub coll_incentive: u128,
    pub reserve_paid: u128,
    pub debt_offset: u128,
    pub coll_to_pool: u128,
    pub debt_redistributed: u128,
    pub coll_redistributed: u128,
    pub coll_surplus: u128,
    pub pending_coll_pulled: u128,
    /// Pool deposits burned with an emptying offset on top of `debt_offset`
    pub pool_residue: u128,
}

impl LiquidationTotals {
    fn add(&mut self, s: &SingleLiquidation) -> LedgerResult<()> {
        self.coll_liquidated = math::add(self.coll_liquidated, s.coll, "liquidated collateral")?;
        self.debt_liquidated = math::add(self.debt_liquidated, s.debt, "liquidated debt")?;
        self.coll_incentive = math::add(self.coll_incentive, s.coll_incentive, "collateral incentive")?;
        self.reserve_paid = math::add(self.reserve_paid, s.reserve, "reserve")?;
        self.debt_offset = math::add(self.debt_offset, s.debt_to_offset, "offset debt")?;
        self.coll_to_pool = math::add(self.coll_to_pool, s.coll_to_pool, "pool collateral")?;
        self.debt_redistributed = math::add(self.debt_redistributed, s.debt_to_redistribute, "redistributed debt")?;
        self.coll_redistributed = math::add(self.coll_redistributed, s.coll_to_redistribute, "redistributed collateral")?;
        self.coll_surplus = math::add(self.coll_surplus, s.coll_surplus, "surplus")?;
        self.pending_coll_pulled = math::add(self.pending_coll_pulled, s.pending_coll, "pending collateral")?;
        Ok(())
    }
}

/// Fully computed liquidation, ready to commit
#[derive(Debug, Clone)]
pub struct LiquidationPlan {
    pub asset: AssetId,
    pub price: u128,
    pub entries: ArrayVec<SingleLiquidation, MAX_LIQUIDATION_BATCH>,
    pub totals: LiquidationTotals,
    offset: Option<OffsetUpdate>,
    redistribution: Option<RedistributionUpdate>,
    counters: PoolCounters,
    total_stakes: u128,
    collateral_snapshot: u128,
    surplus_balances: ArrayVec<(AccountId, u128), MAX_LIQUIDATION_BATCH>,
}

/// Result of a committed liquidation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationOutcome {
    pub liquidated: Vec<AccountId>,
    pub entries: Vec<SingleLiquidation>,
    pub totals: LiquidationTotals,
}

enum Selection<'a> {
    /// Walk up from the riskiest vessel, examining at most this many
    Batch(usize),
    Set(&'a [AccountId]),
}

enum Verdict {
    Liquidate(SingleLiquidation),
    /// Not eligible, later vessels may be
    Skip,
    /// Not eligible, and no vessel above it in the registry is either
    Stop,
}

/// Running state while a call is planned
struct Planner<'a> {
    ledger: &'a AssetLedger,
    config: &'a EngineConfig,
    price: u128,
    counters: PoolCounters,
    total_stakes: u128,
    pool_remaining: u128,
    vessels_left: usize,
    entries: ArrayVec<SingleLiquidation, MAX_LIQUIDATION_BATCH>,
    totals: LiquidationTotals,
}

impl<'a> Planner<'a> {
    fn new(ledger: &'a AssetLedger, config: &'a EngineConfig, price: u128) -> Self {
        Self {
            ledger,
            config,
            price,
            counters: ledger.counters(),
            total_stakes: ledger.rewards().total_stakes,
            pool_remaining: ledger.pool().total_deposits(),
            vessels_left: ledger.vessel_count(),
            entries: ArrayVec::new(),
            totals: LiquidationTotals::default(),
        }
    }

    fn assess(&self, synced: &SyncedVessel) -> LedgerResult<Verdict> {
        let params = &self.ledger.params;
        let icr = synced.icr(self.price)?;
        let tcr = compute_system_cr(self.counters.system_coll()?, self.counters.system_debt()?, self.price)?;

        if tcr >= params.ccr {
            return if icr < params.mcr {
                Ok(Verdict::Liquidate(self.offset_and_redistribute(synced, LiquidationKind::Offset)?))
            } else {
                Ok(Verdict::Stop)
            };
        }

        if icr <= self.config.recovery_redistribution_floor {
            return Ok(Verdict::Liquidate(self.offset_and_redistribute(synced, LiquidationKind::Redistribution)?));
        }
        if icr < params.mcr {
            return Ok(Verdict::Liquidate(self.offset_and_redistribute(synced, LiquidationKind::Offset)?));
        }
        if self.pool_remaining == 0 {
            return Ok(Verdict::Stop);
        }
        let upper = match self.config.recovery_capped_upper {
            CappedUpperBound::SystemRatio => tcr,
            CappedUpperBound::CriticalRatio => params.ccr,
        };
        if icr >= upper {
            return Ok(Verdict::Stop);
        }
        if synced.debt() > self.pool_remaining {
            return Ok(Verdict::Skip);
        }
        Ok(Verdict::Liquidate(self.capped(synced)?))
    }

    fn offset_and_redistribute(&self, s: &SyncedVessel, kind: LiquidationKind) -> LedgerResult<SingleLiquidation> {
        let (coll, debt) = (s.coll(), s.debt());
        let coll_incentive = bps_of(coll, self.ledger.params.collateral_incentive_bps)?;
        let coll_to_liquidate = math::sub(coll, coll_incentive, "liquidated collateral")?;

        let debt_to_offset = if kind == LiquidationKind::Offset { debt.min(self.pool_remaining) } else { 0 };
        let coll_to_pool = if debt == 0 {
            0
        } else {
            mul_div(coll_to_liquidate, debt_to_offset, debt, Rounding::Down)?
        };

        Ok(SingleLiquidation {
            owner: s.owner(),
            kind,
            coll,
            debt,
            reserve: s.reserve(),
            stake: s.stake(),
            pending_coll: s.pending_coll(),
            pending_debt: s.pending_debt(),
            coll_incentive,
            debt_to_offset,
            coll_to_pool,
            debt_to_redistribute: debt - debt_to_offset,
            coll_to_redistribute: coll_to_liquidate - coll_to_pool,
            coll_surplus: 0,
        })
    }

    fn capped(&self, s: &SyncedVessel) -> LedgerResult<SingleLiquidation> {
        let cap = mul_div(s.composite_debt()?, self.ledger.params.mcr, self.price, Rounding::Down)?;
        let coll_surplus = math::sub(s.coll(), cap, "capped collateral")?;
        let coll_incentive = bps_of(cap, self.ledger.params.collateral_incentive_bps)?;
        Ok(SingleLiquidation {
            owner: s.owner(),
            kind: LiquidationKind::Capped,
            coll: s.coll(),
            debt: s.debt(),
            reserve: s.reserve(),
            stake: s.stake(),
            pending_coll: s.pending_coll(),
            pending_debt: s.pending_debt(),
            coll_incentive,
            debt_to_offset: s.debt(),
            coll_to_pool: math::sub(cap, coll_incentive, "capped collateral to pool")?,
            debt_to_redistribute: 0,
            coll_to_redistribute: 0,
            coll_surplus,
        })
    }

    fn push(&mut self, single: SingleLiquidation) -> LedgerResult<()> {
        if self.vessels_left <= 1 {
            return Err(LedgerError::LastVessel(self.ledger.id));
        }
        let c = &mut self.counters;
        c.pull_pending(single.pending_coll, single.pending_debt)?;
        c.remove_vessel(single.coll, math::add(single.debt, single.reserve, "composite debt")?)?;
        c.default_coll = math::add(c.default_coll, single.coll_to_redistribute, "default collateral")?;
        c.default_debt = math::add(c.default_debt, single.debt_to_redistribute, "default debt")?;
        c.surplus_coll = math::add(c.surplus_coll, single.coll_surplus, "surplus collateral")?;
        self.total_stakes = math::sub(self.total_stakes, single.stake, "total stakes")?;
        self.pool_remaining = math::sub(self.pool_remaining, single.debt_to_offset, "pool remaining")?;
        self.vessels_left -= 1;
        self.totals.add(&single)?;
        self.entries.try_push(single).map_err(|_| LedgerError::BatchTooLarge {
            requested: MAX_LIQUIDATION_BATCH + 1,
            limit: MAX_LIQUIDATION_BATCH,
        })
    }

    fn finish(self) -> LedgerResult<LiquidationPlan> {
        let ledger = self.ledger;
        let mut totals = self.totals;
        let t = &self.totals;
        let offset = if t.debt_offset > 0 {
            Some(ledger.pool().plan_offset(t.debt_offset, t.coll_to_pool)?)
        } else {
            None
        };
        totals.pool_residue = offset.map_or(0, |o| o.residue);
        let redistribution = if t.debt_redistributed > 0 || t.coll_redistributed > 0 {
            Some(ledger.rewards().plan_redistribution(t.coll_redistributed, t.debt_redistributed, self.total_stakes)?)
        } else {
            None
        };

        let mut surplus_balances = ArrayVec::new();
        for e in self.entries.iter().filter(|e| e.coll_surplus > 0) {
            let balance = math::add(ledger.surplus_of(e.owner), e.coll_surplus, "owner surplus")?;
            surplus_balances.push((e.owner, balance));
        }

        Ok(LiquidationPlan {
            asset: ledger.id,
            price: self.price,
            collateral_snapshot: self.counters.system_coll()?,
            entries: self.entries,
            totals,
            offset,
            redistribution,
            counters: self.counters,
            total_stakes: self.total_stakes,
            surplus_balances,
        })
    }
}

impl<P: PriceFeed, D: DebtTokenLedger, C: CollateralCustody> Engine<P, D, C> {
    /// Liquidate one vessel
    pub fn liquidate_one(&mut self, asset: AssetId, owner: AccountId, liquidator: AccountId) -> LedgerResult<LiquidationOutcome> {
        self.asset(asset)?.active_vessel(owner)?;
        match self.liquidate_set(asset, &[owner], liquidator) {
            Err(LedgerError::NothingToLiquidate) => Err(LedgerError::NotLiquidatable { owner }),
            other => other,
        }
    }

    /// Liquidate from the riskiest vessel up, examining at most `max_count`
    pub fn liquidate_batch(&mut self, asset: AssetId, max_count: usize, liquidator: AccountId) -> LedgerResult<LiquidationOutcome> {
        if max_count == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let limit = self.state.config.max_batch_size;
        if max_count > limit {
            return Err(LedgerError::BatchTooLarge { requested: max_count, limit });
        }
        let plan = self.plan_liquidation(asset, Selection::Batch(max_count))?;
        Ok(self.commit_liquidation(plan, liquidator))
    }

    /// Liquidate the eligible vessels among `owners`, skipping healthy ones
    pub fn liquidate_set(&mut self, asset: AssetId, owners: &[AccountId], liquidator: AccountId) -> LedgerResult<LiquidationOutcome> {
        let limit = self.state.config.max_batch_size;
        if owners.len() > limit {
            return Err(LedgerError::BatchTooLarge { requested: owners.len(), limit });
        }
        let mut seen = HashSet::with_capacity(owners.len());
        for owner in owners {
            if !seen.insert(*owner) {
                return Err(LedgerError::DuplicateVessel(*owner));
            }
        }
        let ledger = self.asset(asset)?;
        for owner in owners {
            ledger.active_vessel(*owner)?;
        }
        let plan = self.plan_liquidation(asset, Selection::Set(owners))?;
        Ok(self.commit_liquidation(plan, liquidator))
    }

    fn plan_liquidation(&self, asset: AssetId, selection: Selection<'_>) -> LedgerResult<LiquidationPlan> {
        let ledger = self.asset(asset)?;
        let price = self.price(asset)?;
        let mut planner = Planner::new(ledger, &self.state.config, price);

        match selection {
            Selection::Batch(max_count) => {
                for owner in ledger.sorted().iter_from_tail().take(max_count) {
                    match planner.assess(&ledger.sync(owner)?)? {
                        Verdict::Liquidate(single) => planner.push(single)?,
                        Verdict::Skip => warn!("{} on {} skipped: pool cannot cover a capped liquidation", owner, asset),
                        Verdict::Stop => break,
                    }
                }
            }
            Selection::Set(owners) => {
                for owner in owners {
                    match planner.assess(&ledger.sync(*owner)?)? {
                        Verdict::Liquidate(single) => planner.push(single)?,
                        Verdict::Skip | Verdict::Stop => warn!("{} on {} is not liquidatable, skipped", owner, asset),
                    }
                }
            }
        }

        if planner.entries.is_empty() {
            return Err(LedgerError::NothingToLiquidate);
        }
        let plan = planner.finish()?;
        let pool_burn = math::add(plan.totals.debt_offset, plan.totals.pool_residue, "pool burn")?;
        if self.debt.balance_of(DebtHolder::StabilityPool) < pool_burn {
            return Err(LedgerError::Invariant("stability pool holds less than its deposits"));
        }
        if self.debt.balance_of(DebtHolder::GasPool) < plan.totals.reserve_paid {
            return Err(LedgerError::Invariant("gas pool holds less than the reserves"));
        }
        Ok(plan)
    }

    fn commit_liquidation(&mut self, plan: LiquidationPlan, liquidator: AccountId) -> LiquidationOutcome {
        let asset = plan.asset;
        let t = plan.totals;

        let Some(ledger) = self.state.assets.get_mut(&asset) else {
            // planning resolved the asset against the same state
            debug_assert!(false, "liquidation plan for unregistered {asset}");
            error!("dropping liquidation plan for unregistered {}", asset);
            return LiquidationOutcome {
                liquidated: Vec::new(),
                entries: Vec::new(),
                totals: LiquidationTotals::default(),
            };
        };
        for e in &plan.entries {
            // planned vessels are active registry members
            if let Err(err) = ledger.sorted.remove(e.owner) {
                debug_assert!(false, "planned vessel {} missing from registry: {err}", e.owner);
                error!("liquidated vessel {} of {} was not in the registry: {}", e.owner, asset, err);
            }
            match ledger.vessels.get_mut(&e.owner) {
                Some(v) => v.close(VesselStatus::ClosedByLiquidation),
                None => {
                    debug_assert!(false, "planned vessel {} has no record", e.owner);
                    error!("liquidated vessel {} of {} has no record", e.owner, asset);
                }
            }
            info!(
                "liquidated {} on {} ({:?}): coll {}, debt {}, offset {}, redistributed {}, surplus {}",
                e.owner, asset, e.kind, e.coll, e.debt, e.debt_to_offset, e.debt_to_redistribute, e.coll_surplus
            );
        }
        for (owner, balance) in &plan.surplus_balances {
            ledger.surplus.insert(*owner, *balance);
        }
        ledger.rewards.total_stakes = plan.total_stakes;
        if let Some(offset) = plan.offset {
            ledger.pool.apply_offset(offset);
        }
        if let Some(redistribution) = plan.redistribution {
            ledger.rewards.apply_redistribution(redistribution);
        }
        ledger.rewards.update_system_snapshots(plan.collateral_snapshot);
        ledger.counters = plan.counters;

        self.move_coll(asset, Bucket::PendingRedistribution, Bucket::Active, t.pending_coll_pulled);
        self.move_coll(asset, Bucket::Active, Bucket::StabilityPool, t.coll_to_pool);
        self.move_coll(asset, Bucket::Active, Bucket::PendingRedistribution, t.coll_redistributed);
        self.move_coll(asset, Bucket::Active, Bucket::Surplus, t.coll_surplus);
        self.pay_coll(asset, Bucket::Active, liquidator, t.coll_incentive);
        if t.debt_offset > 0 {
            self.debt.burn(DebtHolder::StabilityPool, t.debt_offset + t.pool_residue);
        }
        if t.reserve_paid > 0 {
            self.debt.transfer(DebtHolder::GasPool, DebtHolder::Account(liquidator), t.reserve_paid);
        }

        info!(
            "{} liquidated {} vessels on {}: offset {}, redistributed {}, incentive {} coll + {} reserve",
            liquidator,
            plan.entries.len(),
            asset,
            t.debt_offset,
            t.debt_redistributed,
            t.coll_incentive,
            t.reserve_paid
        );
        LiquidationOutcome {
            liquidated: plan.entries.iter().map(|e| e.owner).collect(),
            entries: plan.entries.to_vec(),
            totals: t,
        }
    }
}
