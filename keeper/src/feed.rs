//! Price file reader
//!
//! Prices are decimal strings in 1e18 units, since TOML integers stop at
//! i64. A quote without a timestamp is taken as observed at load time.
//!
//! ```toml
//! [[quote]]
//! asset = 1
//! price = "2000000000000000000000"
//! timestamp = 1700000000
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use ballast_engine::{AssetId, PriceError, PriceFeed, PriceQuote};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct PriceFile {
    #[serde(default)]
    quote: Vec<QuoteEntry>,
}

#[derive(Debug, Deserialize)]
struct QuoteEntry {
    asset: AssetId,
    price: String,
    timestamp: Option<u64>,
}

/// Quotes read from a file, checked for age against the load time
#[derive(Debug, Clone)]
pub struct FilePriceFeed {
    quotes: HashMap<AssetId, PriceQuote>,
    now: u64,
    max_age_secs: u64,
}

impl FilePriceFeed {
    pub fn load(path: &Path, max_age_secs: u64) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .context(format!("Failed to read price file: {}", path.display()))?;
        Self::from_toml_str(&s, unix_now(), max_age_secs)
    }

    pub fn from_toml_str(s: &str, now: u64, max_age_secs: u64) -> Result<Self> {
        let file: PriceFile = toml::from_str(s).context("Failed to parse price file")?;
        let mut quotes = HashMap::with_capacity(file.quote.len());
        for entry in file.quote {
            let price = entry
                .price
                .trim()
                .parse::<u128>()
                .context(format!("Bad price for {}: {:?}", entry.asset, entry.price))?;
            let timestamp = entry.timestamp.unwrap_or(now);
            if quotes.insert(entry.asset, PriceQuote { price, timestamp }).is_some() {
                anyhow::bail!("Duplicate quote for {}", entry.asset);
            }
        }
        Ok(Self { quotes, now, max_age_secs })
    }

    pub fn assets(&self) -> impl Iterator<Item = AssetId> + '_ {
        self.quotes.keys().copied()
    }
}

impl PriceFeed for FilePriceFeed {
    fn fetch_price(&self, asset: AssetId) -> Result<PriceQuote, PriceError> {
        let quote = self.quotes.get(&asset).copied().ok_or(PriceError::Missing)?;
        if quote.price == 0 {
            return Err(PriceError::Zero);
        }
        let age_secs = self.now.saturating_sub(quote.timestamp);
        if age_secs > self.max_age_secs {
            return Err(PriceError::Stale { age_secs, max_age_secs: self.max_age_secs });
        }
        Ok(quote)
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
