//! Keeper configuration

use std::path::PathBuf;

use anyhow::{Context, Result};
use ballast_engine::AccountId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// JSON ledger snapshot, read and written every sweep
    pub snapshot_path: String,

    /// TOML price file
    pub price_file: String,

    /// Ledger TOML used to create the snapshot when none exists yet
    #[serde(default)]
    pub ledger_config: Option<String>,

    /// Polling interval in seconds
    pub poll_interval_secs: u64,

    /// Maximum vessels per liquidation call
    pub max_liquidations_per_batch: usize,

    /// Quotes older than this are rejected
    pub max_price_age_secs: u64,

    /// Healthy vessels this close above the threshold are logged, 1e18-scaled
    #[serde(default = "default_watch_margin")]
    pub watch_margin: u64,

    /// Account credited with reserves and collateral incentives
    pub liquidator: AccountId,
}

impl Config {
    /// Load configuration from TOML file
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("KEEPER_CONFIG")
            .unwrap_or_else(|_| "keeper-config.toml".to_string());

        let config_str = std::fs::read_to_string(expand(&config_path))
            .context(format!("Failed to read config file: {}", config_path))?;

        Self::from_toml_str(&config_str)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).context("Failed to parse config TOML")?;
        if config.max_liquidations_per_batch == 0 {
            anyhow::bail!("max_liquidations_per_batch must be positive");
        }
        Ok(config)
    }

    /// Create default configuration
    pub fn default_local() -> Self {
        Self {
            snapshot_path: "~/.ballast/ledger.json".to_string(),
            price_file: "~/.ballast/prices.toml".to_string(),
            ledger_config: None,
            poll_interval_secs: 5,
            max_liquidations_per_batch: 16,
            max_price_age_secs: 300,
            watch_margin: default_watch_margin(),
            liquidator: AccountId(0),
        }
    }

    pub fn snapshot_path(&self) -> PathBuf {
        expand(&self.snapshot_path)
    }

    pub fn price_file(&self) -> PathBuf {
        expand(&self.price_file)
    }

    pub fn ledger_config(&self) -> Option<PathBuf> {
        self.ledger_config.as_deref().map(expand)
    }

    /// Write default config to file
    pub fn write_default(path: &str) -> Result<()> {
        let config = Self::default_local();
        let toml_str = toml::to_string_pretty(&config)
            .context("Failed to serialize config")?;

        std::fs::write(expand(path), toml_str)
            .context(format!("Failed to write config to {}", path))?;

        log::info!("Created default config at {}", path);
        Ok(())
    }
}

fn default_watch_margin() -> u64 {
    100_000_000_000_000_000 // 10%
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}
