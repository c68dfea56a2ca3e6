//! Liquidation scenarios through the public engine API

mod common;

use ballast_engine::{
    AccountId, Bucket, CollateralCustody, DebtHolder, DebtTokenLedger, ErrorKind, LedgerError, LiquidationKind,
    PriceError, PriceFeed, StaticPriceFeed, VesselStatus,
};
use common::*;

#[test]
fn test_single_depositor_example() {
    let mut e = plain_engine();
    open(&mut e, 9, 100, 2_000);
    e.provide_to_pool(ETH, AccountId(9), 1_000 * DP).unwrap();
    open(&mut e, 1, 10, 500);

    set_price(&mut e, 50 * DP);
    let out = e.liquidate_one(ETH, AccountId(1), KEEPER).unwrap();
    assert_eq!(out.totals.debt_offset, 500 * DP);

    let pool = e.asset(ETH).unwrap().pool();
    // 10 * 1e18 / 1000 per unit, times P = 1e18
    assert_eq!(pool.sum_at(0, 0), (10 * DP * DP / (1_000 * DP) * DP).into());
    assert_eq!(e.compounded_deposit(ETH, AccountId(9)).unwrap(), 500 * DP);
    assert_eq!(e.pending_collateral_gain(ETH, AccountId(9)).unwrap(), 10 * DP);
    assert_eq!(e.total_deposits(ETH).unwrap(), 500 * DP);
}

#[test]
fn test_epoch_reset_then_fresh_deposit() {
    let mut e = plain_engine();
    let (whale, alice, bob) = (AccountId(9), AccountId(1), AccountId(2));
    open(&mut e, 9, 100, 2_000);
    e.provide_to_pool(ETH, whale, 500 * DP).unwrap();
    open(&mut e, 1, 10, 500);

    set_price(&mut e, 50 * DP);
    e.liquidate_one(ETH, alice, KEEPER).unwrap();
    let pool = e.asset(ETH).unwrap().pool();
    assert_eq!((pool.current_epoch(), pool.current_scale(), pool.p()), (1, 0, DP));
    assert_eq!(e.total_deposits(ETH).unwrap(), 0);

    // a deposit into the new epoch is untouched by the old one
    open(&mut e, 2, 50, 1_000);
    e.provide_to_pool(ETH, bob, 300 * DP).unwrap();
    assert_eq!(e.compounded_deposit(ETH, bob).unwrap(), 300 * DP);
    assert_eq!(e.pending_collateral_gain(ETH, bob).unwrap(), 0);

    assert_eq!(e.compounded_deposit(ETH, whale).unwrap(), 0);
    let receipt = e.claim_pool_gains(ETH, whale).unwrap();
    assert_eq!(receipt.collateral_gain, 10 * DP);
    assert_eq!(receipt.deposit, 0);
    assert!(e.asset(ETH).unwrap().pool().deposit_of(whale).is_none());
    assert_eq!(e.debt_token().balance_of(DebtHolder::StabilityPool), 300 * DP);
}

#[test]
fn test_redistribution_is_fair_regardless_of_last_touch() {
    let mut e = plain_engine();
    open(&mut e, 9, 100, 500);
    open(&mut e, 1, 10, 500);
    open(&mut e, 4, 10, 500);
    open(&mut e, 2, 20, 500);
    open(&mut e, 3, 20, 500);

    set_price(&mut e, 50 * DP);
    e.liquidate_one(ETH, AccountId(1), KEEPER).unwrap();
    // bob takes his share of the first redistribution into storage, carol does not
    e.materialize(ETH, AccountId(2)).unwrap();
    assert_eq!(e.pending_rewards(ETH, AccountId(2)).unwrap(), (0, 0));
    e.liquidate_one(ETH, AccountId(4), KEEPER).unwrap();

    let bob = e.entire_debt_and_coll(ETH, AccountId(2)).unwrap();
    let carol = e.entire_debt_and_coll(ETH, AccountId(3)).unwrap();
    assert!(bob.coll.abs_diff(carol.coll) <= 2);
    assert!(bob.debt.abs_diff(carol.debt) <= 2);
    assert!(carol.pending_coll > bob.pending_coll);
}

#[test]
fn test_recovery_mode_redistributes_below_floor() {
    let mut e = engine_with(params(0, 0), 200 * DP);
    let (a, b) = (AccountId(1), AccountId(2));
    open(&mut e, 1, 10, 900);
    open(&mut e, 2, 20, 1_000);
    e.provide_to_pool(ETH, b, 1_000 * DP).unwrap();

    // TCR 110%, a at 78%
    set_price(&mut e, 70 * DP);
    assert!(e.is_recovery_mode(ETH).unwrap());
    let out = e.liquidate_batch(ETH, 10, KEEPER).unwrap();
    assert_eq!(out.liquidated, vec![a]);
    assert_eq!(out.entries[0].kind, LiquidationKind::Redistribution);
    assert_eq!(out.totals.debt_offset, 0);
    assert_eq!(out.totals.debt_redistributed, 900 * DP);
    assert_eq!(e.total_deposits(ETH).unwrap(), 1_000 * DP);
    assert_eq!(e.pending_rewards(ETH, b).unwrap(), (10 * DP, 900 * DP));
}

#[test]
fn test_batch_respects_max_count() {
    let mut e = plain_engine();
    open(&mut e, 9, 200, 2_000);
    e.provide_to_pool(ETH, AccountId(9), 2_000 * DP).unwrap();
    for i in 1..=3 {
        open(&mut e, i, 10, 500);
    }

    set_price(&mut e, 50 * DP);
    let out = e.liquidate_batch(ETH, 2, KEEPER).unwrap();
    assert_eq!(out.liquidated.len(), 2);
    assert!(out.liquidated.iter().all(|o| o.0 <= 3));
    assert_eq!(e.vessel_count(ETH).unwrap(), 2);
    assert_eq!(e.total_deposits(ETH).unwrap(), 1_000 * DP);

    let out = e.liquidate_batch(ETH, 2, KEEPER).unwrap();
    assert_eq!(out.liquidated.len(), 1);
    assert_eq!(e.liquidate_batch(ETH, 2, KEEPER), Err(LedgerError::NothingToLiquidate));
}

#[test]
fn test_set_skips_healthy_and_rejects_closed() {
    let mut e = plain_engine();
    open(&mut e, 9, 200, 2_000);
    e.provide_to_pool(ETH, AccountId(9), 2_000 * DP).unwrap();
    open(&mut e, 1, 10, 500);
    open(&mut e, 2, 40, 500);

    set_price(&mut e, 50 * DP);
    let out = e.liquidate_set(ETH, &[AccountId(2), AccountId(1)], KEEPER).unwrap();
    assert_eq!(out.liquidated, vec![AccountId(1)]);
    assert_eq!(e.vessel_status(ETH, AccountId(2)).unwrap(), VesselStatus::Active);

    let err = e.liquidate_set(ETH, &[AccountId(1)], KEEPER).unwrap_err();
    assert_eq!(err, LedgerError::VesselNotActive { asset: ETH, owner: AccountId(1) });
    assert_eq!(err.kind(), ErrorKind::Precondition);
}

#[test]
fn test_failed_batch_changes_nothing() {
    let mut e = plain_engine();
    open(&mut e, 1, 10, 500);
    open(&mut e, 2, 10, 500);
    set_price(&mut e, 50 * DP);

    let (state, debt, custody) = (e.state().clone(), e.debt_token().clone(), e.custody().clone());
    // the second vessel would be the last one standing
    assert_eq!(e.liquidate_batch(ETH, 10, KEEPER), Err(LedgerError::LastVessel(ETH)));
    assert_eq!(e.state(), &state);
    assert_eq!(e.debt_token(), &debt);
    assert_eq!(e.custody(), &custody);
}

#[test]
fn test_stale_price_blocks_liquidation() {
    let mut e = plain_engine();
    open(&mut e, 9, 100, 2_000);
    open(&mut e, 1, 10, 500);

    let mut feed = StaticPriceFeed::new().with_max_age(60);
    feed.set_price(ETH, 50 * DP);
    feed.advance(120);
    *e.feed_mut() = feed;
    assert!(matches!(e.feed().fetch_price(ETH), Err(PriceError::Stale { age_secs: 120, max_age_secs: 60 })));

    let err = e.liquidate_one(ETH, AccountId(1), KEEPER).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StalePrice);
    assert_eq!(e.vessel_status(ETH, AccountId(1)).unwrap(), VesselStatus::Active);

    e.feed_mut().set_price(ETH, 50 * DP);
    e.liquidate_one(ETH, AccountId(1), KEEPER).unwrap();
}

#[test]
fn test_withdraw_waits_for_liquidation() {
    let mut e = plain_engine();
    let whale = AccountId(9);
    open(&mut e, 9, 100, 2_000);
    e.provide_to_pool(ETH, whale, 1_000 * DP).unwrap();
    open(&mut e, 1, 10, 500);

    set_price(&mut e, 50 * DP);
    assert_eq!(e.withdraw_from_pool(ETH, whale, DP), Err(LedgerError::UndercollateralizedVessels));
    e.claim_pool_gains(ETH, whale).unwrap();

    e.liquidate_batch(ETH, 5, KEEPER).unwrap();
    let receipt = e.withdraw_from_pool(ETH, whale, u128::MAX).unwrap();
    assert_eq!(receipt.debt_withdrawn, 500 * DP);
    assert_eq!(receipt.collateral_gain, 10 * DP);
    assert_eq!(e.custody().balance_of(ETH, Bucket::StabilityPool), 0);
    assert_eq!(e.total_deposits(ETH).unwrap(), 0);
}

#[test]
fn test_liquidation_kinds_are_reported() {
    let mut e = engine_with(params(10 * DP, 50), 200 * DP);
    open(&mut e, 1, 12, 990);
    open(&mut e, 2, 16, 990);
    e.provide_to_pool(ETH, AccountId(2), 990 * DP).unwrap();

    // TCR 140%, vessel 1 at 120%
    set_price(&mut e, 100 * DP);
    let out = e.liquidate_one(ETH, AccountId(1), KEEPER).unwrap();
    let entry = out.entries[0];
    assert_eq!(entry.kind, LiquidationKind::Capped);
    assert_eq!(entry.reserve, 10 * DP);
    // 1000 * 1.1 / 100 = 11 capped, 0.5% of it to the keeper
    assert_eq!(entry.coll_incentive, 11 * DP / 200);
    assert_eq!(entry.coll_to_pool + entry.coll_incentive, 11 * DP);
    assert_eq!(entry.coll_surplus, DP);
    assert_eq!(e.surplus_of(ETH, AccountId(1)).unwrap(), DP);
    assert_eq!(e.custody().account_balance(ETH, KEEPER), 11 * DP / 200);
    assert_eq!(e.debt_token().balance_of(DebtHolder::Account(KEEPER)), 10 * DP);
}

#[test]
fn test_emptying_offset_burns_pool_dust() {
    let mut e = plain_engine();
    open(&mut e, 9, 100, 2_000);
    e.provide_to_pool(ETH, AccountId(9), 500 * DP + 1).unwrap();
    open(&mut e, 1, 10, 500);

    // the loss rounds up to the whole pool and resets the epoch
    set_price(&mut e, 50 * DP);
    let out = e.liquidate_one(ETH, AccountId(1), KEEPER).unwrap();
    assert_eq!(out.totals.debt_offset, 500 * DP);
    assert_eq!(out.totals.pool_residue, 1);
    assert_eq!(e.asset(ETH).unwrap().pool().current_epoch(), 1);
    assert_eq!(e.total_deposits(ETH).unwrap(), 0);
    assert_eq!(e.debt_token().balance_of(DebtHolder::StabilityPool), 0);
    assert_eq!(e.compounded_deposit(ETH, AccountId(9)).unwrap(), 0);
}
