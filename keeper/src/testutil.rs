//! Fixture shared by the keeper unit tests

use ballast_engine::{
    AccountId, AssetId, Custody, DebtToken, Engine, Hint, LedgerConfig, RiskParams, StaticPriceFeed,
};

use crate::health::KeeperEngine;

pub const DP: u128 = 1_000_000_000_000_000_000;
pub const ETH: AssetId = AssetId(1);
pub const KEEPER: AccountId = AccountId(1_000);

/// One asset at MCR 110%, CCR 150%, no reserve and no incentive
pub fn engine(price: u128) -> KeeperEngine<StaticPriceFeed> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut feed = StaticPriceFeed::new();
    feed.set_price(ETH, price);
    let mut e = Engine::new(LedgerConfig::default(), feed, DebtToken::new(), Custody::new()).unwrap();
    let params = RiskParams {
        mcr: 11 * DP / 10,
        ccr: 15 * DP / 10,
        liquidation_reserve: 0,
        min_net_debt: 100 * DP,
        collateral_incentive_bps: 0,
        max_vessels: 100,
    };
    e.add_asset(ETH, params).unwrap();
    e
}

/// Open a vessel with `coll` and `debt` in whole units
pub fn open(e: &mut KeeperEngine<StaticPriceFeed>, owner: u64, coll: u128, debt: u128) {
    e.custody_mut().fund(ETH, AccountId(owner), coll * DP);
    e.open_vessel(ETH, AccountId(owner), coll * DP, debt * DP, Hint::none()).unwrap();
}

pub fn set_price(e: &mut KeeperEngine<StaticPriceFeed>, price: u128) {
    e.feed_mut().set_price(ETH, price);
}
