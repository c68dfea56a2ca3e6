//! Shared fixture for the engine integration tests

#![allow(dead_code)]

use ballast_engine::{
    AccountId, AssetId, Custody, DebtHolder, DebtToken, DebtTokenLedger, Engine, Hint, LedgerConfig,
    RiskParams, StaticPriceFeed,
};
use ballast_engine::math::DECIMAL_PRECISION;

pub const DP: u128 = DECIMAL_PRECISION;
pub const ETH: AssetId = AssetId(1);
pub const KEEPER: AccountId = AccountId(1_000);

pub type TestEngine = Engine<StaticPriceFeed, DebtToken, Custody>;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// MCR 110%, CCR 150%, min debt 100
pub fn params(reserve: u128, incentive_bps: u64) -> RiskParams {
    RiskParams {
        mcr: 11 * DP / 10,
        ccr: 15 * DP / 10,
        liquidation_reserve: reserve,
        min_net_debt: 100 * DP,
        collateral_incentive_bps: incentive_bps,
        max_vessels: 1_000,
    }
}

/// Engine with one asset priced at `price`, accounts 1..=50 funded with 10 000 coll
pub fn engine_with(params: RiskParams, price: u128) -> TestEngine {
    init_logging();
    let mut feed = StaticPriceFeed::new();
    feed.set_price(ETH, price);
    let mut e = Engine::new(LedgerConfig::default(), feed, DebtToken::new(), Custody::new())
        .expect("empty config is valid");
    e.add_asset(ETH, params).expect("fresh asset");
    for i in 1..=50 {
        e.custody_mut().fund(ETH, AccountId(i), 10_000 * DP);
    }
    e
}

/// No reserve and no incentive, so amounts are easy to follow
pub fn plain_engine() -> TestEngine {
    engine_with(params(0, 0), 100 * DP)
}

pub fn open(e: &mut TestEngine, owner: u64, coll: u128, debt: u128) {
    e.open_vessel(ETH, AccountId(owner), coll * DP, debt * DP, Hint::none())
        .expect("open vessel");
}

pub fn give_debt(e: &mut TestEngine, from: u64, to: u64, amount: u128) {
    e.debt_token_mut()
        .transfer(DebtHolder::Account(AccountId(from)), DebtHolder::Account(AccountId(to)), amount);
}

pub fn set_price(e: &mut TestEngine, price: u128) {
    e.feed_mut().set_price(ETH, price);
}
