//! Ledger snapshot on disk
//!
//! The keeper owns the ledger between sweeps as one JSON document. Writes go
//! to a sibling temp file first and are renamed into place.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ballast_engine::{AssetId, Custody, DebtToken, Engine, LedgerConfig, LedgerState, PriceError, PriceFeed, PriceQuote};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: LedgerState,
    pub debt: DebtToken,
    pub custody: Custody,
}

impl Snapshot {
    /// Empty ledger with the assets of `config` registered
    pub fn from_config(config: LedgerConfig) -> Result<Self> {
        config.validate().context("Invalid ledger config")?;
        let engine = Engine::new(config, NoFeed, DebtToken::new(), Custody::new())
            .context("Failed to build ledger")?;
        Ok(Self::from_engine(engine).0)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .context(format!("Failed to read snapshot: {}", path.display()))?;
        serde_json::from_str(&raw).context(format!("Failed to parse snapshot: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self).context("Failed to serialize snapshot")?;
        let tmp = tmp_path(path);
        std::fs::write(&tmp, raw).context(format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path).context(format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    pub fn into_engine<P: PriceFeed>(self, feed: P) -> Engine<P, DebtToken, Custody> {
        Engine::from_parts(self.state, feed, self.debt, self.custody)
    }

    /// Split an engine back into a snapshot and its feed
    pub fn from_engine<P: PriceFeed>(engine: Engine<P, DebtToken, Custody>) -> (Self, P) {
        let (state, feed, debt, custody) = engine.into_parts();
        (Self { state, debt, custody }, feed)
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Feed for building a ledger that never prices anything
struct NoFeed;

impl PriceFeed for NoFeed {
    fn fetch_price(&self, _asset: AssetId) -> Result<PriceQuote, PriceError> {
        Err(PriceError::Missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballast_engine::{AccountId, Hint, StaticPriceFeed};

    const DP: u128 = 1_000_000_000_000_000_000;

    fn ledger_config() -> LedgerConfig {
        LedgerConfig::from_toml_str(
            r#"
            [[assets]]
            id = 1
            mcr = "1100000000000000000"
            ccr = "1500000000000000000"
            min_net_debt = "100000000000000000000"
            liquidation_reserve = "0"
            collateral_incentive_bps = 0
            max_vessels = 100
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_snapshot_survives_disk() {
        let snapshot = Snapshot::from_config(ledger_config()).unwrap();
        let mut feed = StaticPriceFeed::new();
        feed.set_price(AssetId(1), 100 * DP);
        let mut engine = snapshot.into_engine(feed);
        engine.custody_mut().fund(AssetId(1), AccountId(7), 50 * DP);
        engine
            .open_vessel(AssetId(1), AccountId(7), 10 * DP, 500 * DP, Hint::none())
            .unwrap();
        let (snapshot, _) = Snapshot::from_engine(engine);

        let dir = std::env::temp_dir().join(format!("ballast-store-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("ledger.json");
        snapshot.save(&path).unwrap();
        assert!(!tmp_path(&path).exists());
        assert_eq!(Snapshot::load(&path).unwrap(), snapshot);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_snapshot_is_error() {
        assert!(Snapshot::load(Path::new("/nonexistent/ledger.json")).is_err());
    }
}
