//! Stability pool compounding
//!
//! Depositors absorb liquidated debt in exchange for the collateral behind
//! it. Balances are never iterated. Each offset folds its per-unit loss into
//! the running product `P` and its per-unit gain into the running sum `S`,
//! and a depositor's balance is read back from the `(P, S)` snapshot taken at
//! their last deposit or withdrawal:
//!
//! ```text
//! compounded = initial * P / P_snap
//! gain       = initial * (S - S_snap) / P_snap / 1e18
//! ```
//!
//! `P` is kept above 1e9 by multiplying it by 1e9 and bumping `scale`. An
//! offset that empties the pool starts a new `epoch`: every older deposit
//! reads as zero and only its collateral gain remains claimable.
//!
//! Loss per unit rounds up, gain per unit rounds down with the remainder
//! carried into the next offset.

use std::collections::HashMap;

use log::{debug, info};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};
use crate::math::{self, mul_add_div_rem, mul_div, to_u128, Rounding, DECIMAL_PRECISION, SCALE_FACTOR};
use crate::types::AccountId;

/// Pool state a deposit was last synced to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositSnapshot {
    pub p: u128,
    pub s: U256,
    pub scale: u64,
    pub epoch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub initial: u128,
    pub snapshot: DepositSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilityPool {
    total_deposits: u128,
    /// Collateral gains not yet paid out
    coll_balance: u128,
    p: u128,
    current_scale: u64,
    current_epoch: u64,
    /// `S[epoch][scale]`, stored as sum of gain-per-unit times `P`
    epoch_to_scale_to_sum: Vec<Vec<U256>>,
    last_coll_error: u128,
    deposits: HashMap<AccountId, Deposit>,
}

impl Default for StabilityPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Precomputed result of an offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetUpdate {
    pub debt: u128,
    pub coll: u128,
    /// Deposits beyond `debt` wiped by an epoch reset
    pub residue: u128,
    /// New value of `S` at the pre-offset epoch and scale
    s: U256,
    p: u128,
    scale: u64,
    epoch: u64,
    last_coll_error: u128,
    total_deposits: u128,
    coll_balance: u128,
}

/// Precomputed result of a deposit, withdrawal or gain claim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositUpdate {
    pub depositor: AccountId,
    /// Collateral gain paid out
    pub gain: u128,
    /// Debt units moved into the pool
    pub debt_in: u128,
    /// Debt units returned to the depositor
    pub debt_out: u128,
    /// Compounded deposit after the change
    pub new_deposit: u128,
    total_deposits: u128,
    coll_balance: u128,
}

impl StabilityPool {
    pub fn new() -> Self {
        Self {
            total_deposits: 0,
            coll_balance: 0,
            p: DECIMAL_PRECISION,
            current_scale: 0,
            current_epoch: 0,
            epoch_to_scale_to_sum: vec![vec![U256::zero()]],
            last_coll_error: 0,
            deposits: HashMap::new(),
        }
    }

    pub fn total_deposits(&self) -> u128 {
        self.total_deposits
    }

    /// Collateral held for depositors
    pub fn coll_balance(&self) -> u128 {
        self.coll_balance
    }

    pub fn p(&self) -> u128 {
        self.p
    }

    pub fn current_scale(&self) -> u64 {
        self.current_scale
    }

    pub fn current_epoch(&self) -> u64 {
        self.current_epoch
    }

    pub fn deposit_of(&self, depositor: AccountId) -> Option<&Deposit> {
        self.deposits.get(&depositor)
    }

    pub fn depositors(&self) -> impl Iterator<Item = AccountId> + '_ {
        self.deposits.keys().copied()
    }

    /// `S[epoch][scale]`, zero if never written
    pub fn sum_at(&self, epoch: u64, scale: u64) -> U256 {
        self.epoch_to_scale_to_sum
            .get(epoch as usize)
            .and_then(|row| row.get(scale as usize))
            .copied()
            .unwrap_or_else(U256::zero)
    }

    fn current_snapshot(&self) -> DepositSnapshot {
        DepositSnapshot {
            p: self.p,
            s: self.sum_at(self.current_epoch, self.current_scale),
            scale: self.current_scale,
            epoch: self.current_epoch,
        }
    }

    /// Deposit after every offset since its snapshot
    pub fn compounded_deposit(&self, depositor: AccountId) -> LedgerResult<u128> {
        match self.deposits.get(&depositor) {
            Some(d) => self.compounded_from_snapshot(d),
            None => Ok(0),
        }
    }

    fn compounded_from_snapshot(&self, d: &Deposit) -> LedgerResult<u128> {
        let snap = &d.snapshot;
        if snap.epoch < self.current_epoch {
            return Ok(0);
        }
        let scale_diff = self.current_scale.checked_sub(snap.scale).ok_or(LedgerError::Invariant("deposit snapshot ahead of pool"))?;
        let compounded = match scale_diff {
            0 => mul_div(d.initial, self.p, snap.p, Rounding::Down)?,
            1 => mul_div(d.initial, self.p, snap.p, Rounding::Down)? / SCALE_FACTOR,
            _ => 0,
        };
        // below a billionth of the initial deposit is rounding noise
        if compounded < d.initial / SCALE_FACTOR {
            return Ok(0);
        }
        Ok(compounded)
    }

    /// Collateral gain accrued since the depositor's snapshot
    pub fn pending_collateral_gain(&self, depositor: AccountId) -> LedgerResult<u128> {
        match self.deposits.get(&depositor) {
            Some(d) => self.gain_from_snapshot(d),
            None => Ok(0),
        }
    }

    fn gain_from_snapshot(&self, d: &Deposit) -> LedgerResult<u128> {
        let snap = &d.snapshot;
        let first = self
            .sum_at(snap.epoch, snap.scale)
            .checked_sub(snap.s)
            .ok_or(LedgerError::Invariant("reward sum below snapshot"))?;
        let second = self.sum_at(snap.epoch, snap.scale + 1) / U256::from(SCALE_FACTOR);
        let gain = U256::from(d.initial)
            .checked_mul(first + second)
            .ok_or(LedgerError::Overflow("depositor gain"))?
            / U256::from(snap.p)
            / U256::from(DECIMAL_PRECISION);
        to_u128(gain, "depositor gain")
    }

    /// Absorb `debt` and take `coll` in exchange
    pub fn plan_offset(&self, debt: u128, coll: u128) -> LedgerResult<OffsetUpdate> {
        let total = self.total_deposits;
        if total == 0 {
            return Err(LedgerError::EmptyPool);
        }
        if debt > total {
            return Err(LedgerError::Invariant("offset exceeds pool deposits"));
        }

        let (gain_per_unit, last_coll_error) = mul_add_div_rem(coll, DECIMAL_PRECISION, self.last_coll_error, total)?;
        let loss_per_unit = if debt == total {
            DECIMAL_PRECISION
        } else {
            mul_div(debt, DECIMAL_PRECISION, total, Rounding::Up)?
        };

        let marginal = U256::from(gain_per_unit) * U256::from(self.p);
        let s = self
            .sum_at(self.current_epoch, self.current_scale)
            .checked_add(marginal)
            .ok_or(LedgerError::Overflow("reward sum"))?;

        let product_factor = math::sub(DECIMAL_PRECISION, loss_per_unit, "product factor")?;
        let remaining = math::sub(total, debt, "total deposits")?;
        // a loss rounded up to the whole pool empties it, dust included
        let (p, scale, epoch, total_deposits, residue) = if product_factor == 0 {
            (DECIMAL_PRECISION, 0, self.current_epoch + 1, 0, remaining)
        } else {
            let (p, scale) = self.rescaled_product(product_factor)?;
            (p, scale, self.current_epoch, remaining, 0)
        };

        Ok(OffsetUpdate {
            debt,
            coll,
            residue,
            s,
            p,
            scale,
            epoch,
            last_coll_error,
            total_deposits,
            coll_balance: math::add(self.coll_balance, coll, "pool collateral")?,
        })
    }

    /// `P * factor / 1e18`, multiplied by 1e9 per scale step until it is back above 1e9
    fn rescaled_product(&self, factor: u128) -> LedgerResult<(u128, u64)> {
        let num = U256::from(self.p) * U256::from(factor);
        let dp = U256::from(DECIMAL_PRECISION);
        let floor = U256::from(SCALE_FACTOR);
        let mut scale = self.current_scale;
        let mut multiplier = U256::one();
        let mut p = num / dp;
        while p < floor {
            multiplier = multiplier * floor;
            scale += 1;
            p = num * multiplier / dp;
        }
        Ok((to_u128(p, "P")?, scale))
    }

    pub fn apply_offset(&mut self, update: OffsetUpdate) {
        let (epoch, scale) = (self.current_epoch as usize, self.current_scale as usize);
        self.ensure_slot(epoch, scale);
        self.epoch_to_scale_to_sum[epoch][scale] = update.s;

        if update.epoch != self.current_epoch {
            info!("stability pool emptied, epoch {} -> {}", self.current_epoch, update.epoch);
        } else if update.scale != self.current_scale {
            info!("stability pool P rescaled, scale {} -> {}", self.current_scale, update.scale);
        }

        self.p = update.p;
        self.current_scale = update.scale;
        self.current_epoch = update.epoch;
        self.ensure_slot(self.current_epoch as usize, self.current_scale as usize);
        self.last_coll_error = update.last_coll_error;
        self.total_deposits = update.total_deposits;
        self.coll_balance = update.coll_balance;
        debug!(
            "offset {} debt / {} coll, P {}, total deposits {}",
            update.debt, update.coll, self.p, self.total_deposits
        );
    }

    fn ensure_slot(&mut self, epoch: usize, scale: usize) {
        while self.epoch_to_scale_to_sum.len() <= epoch {
            self.epoch_to_scale_to_sum.push(vec![U256::zero()]);
        }
        let row = &mut self.epoch_to_scale_to_sum[epoch];
        while row.len() <= scale {
            row.push(U256::zero());
        }
    }

    /// Pay the pending gain and add `amount` to the deposit
    pub fn plan_deposit(&self, depositor: AccountId, amount: u128) -> LedgerResult<DepositUpdate> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let compounded = self.compounded_deposit(depositor)?;
        let gain = self.pending_collateral_gain(depositor)?;
        Ok(DepositUpdate {
            depositor,
            gain,
            debt_in: amount,
            debt_out: 0,
            new_deposit: math::add(compounded, amount, "deposit")?,
            total_deposits: math::add(self.total_deposits, amount, "total deposits")?,
            coll_balance: math::sub(self.coll_balance, gain, "pool collateral")?,
        })
    }

    /// Pay the pending gain and withdraw up to `amount` of the compounded deposit
    ///
    /// A zero `amount` only claims the gain.
    pub fn plan_withdraw(&self, depositor: AccountId, amount: u128) -> LedgerResult<DepositUpdate> {
        if !self.deposits.contains_key(&depositor) {
            return Err(LedgerError::NoDeposit(depositor));
        }
        let compounded = self.compounded_deposit(depositor)?;
        let gain = self.pending_collateral_gain(depositor)?;
        let debt_out = amount.min(compounded);
        Ok(DepositUpdate {
            depositor,
            gain,
            debt_in: 0,
            debt_out,
            new_deposit: compounded - debt_out,
            total_deposits: math::sub(self.total_deposits, debt_out, "total deposits")?,
            coll_balance: math::sub(self.coll_balance, gain, "pool collateral")?,
        })
    }

    /// Re-snapshot the deposit at its new value
    pub fn apply_deposit(&mut self, update: DepositUpdate) {
        if update.new_deposit == 0 {
            self.deposits.remove(&update.depositor);
        } else {
            let snapshot = self.current_snapshot();
            self.deposits.insert(update.depositor, Deposit { initial: update.new_deposit, snapshot });
        }
        self.total_deposits = update.total_deposits;
        self.coll_balance = update.coll_balance;
        debug!(
            "{} deposit now {} (gain paid {}), total {}",
            update.depositor, update.new_deposit, update.gain, self.total_deposits
        );
    }
}
