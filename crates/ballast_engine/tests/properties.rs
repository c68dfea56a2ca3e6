//! Randomized liquidation and deposit sequences

mod common;

use std::collections::BTreeMap;

use ballast_engine::stability_pool::StabilityPool;
use ballast_engine::{AccountId, Bucket, CollateralCustody, DebtHolder, DebtTokenLedger, LedgerError};
use common::*;
use proptest::prelude::*;

const WHALE: u64 = 50;
const DEPOSITORS: [u64; 3] = [41, 42, 43];
/// Rounding left undistributed: per-vessel floors plus the carried division remainder
const DUST: u128 = 1_000_000;

/// Custody buckets match the protocol counters, and no vessel holds more
/// than the active side plus what is pending for it
fn check_conservation(e: &TestEngine) -> Result<(), TestCaseError> {
    let b = e.pool_balances(ETH).unwrap();
    let c = e.custody();
    prop_assert_eq!(c.balance_of(ETH, Bucket::Active), b.active_coll);
    prop_assert_eq!(c.balance_of(ETH, Bucket::PendingRedistribution), b.default_coll);
    prop_assert_eq!(c.balance_of(ETH, Bucket::StabilityPool), b.stability_coll);
    prop_assert_eq!(c.balance_of(ETH, Bucket::Surplus), b.surplus_coll);

    let ledger = e.asset(ETH).unwrap();
    let mut coll = 0u128;
    let mut debt = 0u128;
    for owner in ledger.sorted().iter() {
        let v = e.entire_debt_and_coll(ETH, owner).unwrap();
        coll += v.coll;
        debt += v.debt + v.reserve;
    }
    let (system_coll, system_debt) = (b.active_coll + b.default_coll, b.active_debt + b.default_debt);
    prop_assert!(coll <= system_coll);
    prop_assert!(debt <= system_debt);
    prop_assert!(system_coll - coll <= DUST);
    prop_assert!(system_debt - debt <= DUST);
    prop_assert_eq!(e.debt_token().balance_of(DebtHolder::StabilityPool), b.stability_deposits);
    Ok(())
}

fn liquidate_all(e: &mut TestEngine) -> Result<(), TestCaseError> {
    for _ in 0..16 {
        match e.liquidate_batch(ETH, 32, KEEPER) {
            Ok(_) => {}
            Err(LedgerError::NothingToLiquidate) => return Ok(()),
            Err(err) => return Err(TestCaseError::fail(format!("liquidation failed: {err}"))),
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_random_liquidations_keep_books_and_let_depositors_exit(
        vessels in prop::collection::vec((10u128..50, 200u128..600), 3..10),
        deposits in prop::collection::vec(1u128..800, 3),
        prices in prop::collection::vec(40u128..100, 1..5),
    ) {
        let mut e = engine_with(params(10 * DP, 50), 100 * DP);
        open(&mut e, WHALE, 1_000, 5_000);
        for (i, (coll, debt)) in vessels.iter().enumerate() {
            open(&mut e, i as u64 + 1, *coll, *debt);
        }
        for (who, amount) in DEPOSITORS.iter().zip(&deposits) {
            give_debt(&mut e, WHALE, *who, amount * DP);
            e.provide_to_pool(ETH, AccountId(*who), amount * DP).unwrap();
        }
        check_conservation(&e)?;

        let mut last: BTreeMap<u64, u128> = DEPOSITORS.iter().zip(&deposits).map(|(w, a)| (*w, a * DP)).collect();
        for price in prices {
            set_price(&mut e, price * DP);
            liquidate_all(&mut e)?;
            check_conservation(&e)?;

            for who in DEPOSITORS {
                let now = e.compounded_deposit(ETH, AccountId(who)).unwrap();
                prop_assert!(now <= last[&who], "deposit of {} grew from {} to {}", who, last[&who], now);
                last.insert(who, now);
            }
        }

        set_price(&mut e, 100 * DP);
        liquidate_all(&mut e)?;
        let ledger = e.asset(ETH).unwrap();
        if let Some(lowest) = ledger.sorted().last() {
            prop_assert!(e.get_vessel_health_ratio(ETH, lowest).unwrap() >= ledger.params.mcr);
        }

        for who in DEPOSITORS {
            let depositor = AccountId(who);
            if e.asset(ETH).unwrap().pool().deposit_of(depositor).is_none() {
                continue;
            }
            let expected = e.compounded_deposit(ETH, depositor).unwrap();
            let receipt = e.withdraw_from_pool(ETH, depositor, u128::MAX).unwrap();
            prop_assert_eq!(receipt.debt_withdrawn, expected);
            prop_assert_eq!(receipt.deposit, 0);
            prop_assert_eq!(e.compounded_deposit(ETH, depositor).unwrap(), 0);
        }
        check_conservation(&e)?;
    }

    #[test]
    fn test_deposit_after_emptying_offset_is_exact(
        first in 1u128..1_000_000,
        coll in 0u128..1_000_000,
        second in 1u128..1_000_000,
    ) {
        let mut pool = StabilityPool::new();
        let u = pool.plan_deposit(AccountId(1), first * DP).unwrap();
        pool.apply_deposit(u);
        let o = pool.plan_offset(first * DP, coll * DP).unwrap();
        pool.apply_offset(o);
        prop_assert_eq!(pool.total_deposits(), 0);

        let u = pool.plan_deposit(AccountId(2), second * DP).unwrap();
        pool.apply_deposit(u);
        prop_assert_eq!(pool.compounded_deposit(AccountId(2)).unwrap(), second * DP);
        prop_assert_eq!(pool.pending_collateral_gain(AccountId(2)).unwrap(), 0);
        // the first depositor gets everything up to the per-unit floor
        let gain = pool.pending_collateral_gain(AccountId(1)).unwrap();
        prop_assert!(gain <= coll * DP && coll * DP - gain < first);
    }

    #[test]
    fn test_compounding_is_monotone_across_rescales(
        amounts in prop::collection::vec(1u128..10_000, 1..4),
        losses in prop::collection::vec(1u128..999_999, 1..12),
    ) {
        let mut pool = StabilityPool::new();
        for (i, amount) in amounts.iter().enumerate() {
            let u = pool.plan_deposit(AccountId(i as u64), amount * DP).unwrap();
            pool.apply_deposit(u);
        }
        let mut last: Vec<u128> = amounts.iter().map(|a| a * DP).collect();
        for loss in losses {
            // lose `loss` millionths of what is left
            let total = pool.total_deposits();
            let debt = total / 1_000_000 * loss;
            if debt == 0 {
                break;
            }
            let o = pool.plan_offset(debt, DP).unwrap();
            pool.apply_offset(o);
            prop_assert!(pool.p() >= 1_000_000_000 || pool.total_deposits() == 0);

            let mut sum = 0u128;
            for (i, prev) in last.iter_mut().enumerate() {
                let now = pool.compounded_deposit(AccountId(i as u64)).unwrap();
                prop_assert!(now <= *prev);
                *prev = now;
                sum += now;
            }
            prop_assert!(sum <= pool.total_deposits());
        }
    }
}
