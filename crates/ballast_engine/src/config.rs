//! Risk parameters and engine settings
//!
//! Loaded from TOML. All ratios are 1e18-scaled, all amounts are in the
//! smallest unit of the debt token.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::math::{BPS_DIVISOR, DECIMAL_PRECISION, ONE_HUNDRED_PERCENT};
use crate::types::AssetId;

/// Hard upper bound on vessels handled by one liquidation call
pub const MAX_LIQUIDATION_BATCH: usize = 64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Per-collateral risk parameters, read-only to the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskParams {
    /// Minimum collateral ratio
    #[serde(with = "amount")]
    pub mcr: u128,
    /// Critical collateral ratio; TCR below this is recovery mode
    #[serde(with = "amount")]
    pub ccr: u128,
    /// Debt units set aside at open time to pay the liquidator
    #[serde(with = "amount")]
    pub liquidation_reserve: u128,
    /// Minimum vessel debt, reserve excluded
    #[serde(with = "amount")]
    pub min_net_debt: u128,
    /// Share of seized collateral paid to the liquidator
    #[serde(default = "default_incentive_bps")]
    pub collateral_incentive_bps: u64,
    /// Registry capacity
    #[serde(default = "default_max_vessels")]
    pub max_vessels: usize,
}

fn default_incentive_bps() -> u64 {
    50
}

fn default_max_vessels() -> usize {
    100_000
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            mcr: 1_100_000_000_000_000_000,   // 110%
            ccr: 1_500_000_000_000_000_000,   // 150%
            liquidation_reserve: 200 * DECIMAL_PRECISION,
            min_net_debt: 1_800 * DECIMAL_PRECISION,
            collateral_incentive_bps: default_incentive_bps(),
            max_vessels: default_max_vessels(),
        }
    }
}

impl RiskParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mcr <= ONE_HUNDRED_PERCENT {
            return Err(ConfigError::Invalid(format!("mcr {} must exceed 100%", self.mcr)));
        }
        if self.ccr < self.mcr {
            return Err(ConfigError::Invalid(format!(
                "ccr {} must be at least mcr {}",
                self.ccr, self.mcr
            )));
        }
        if self.collateral_incentive_bps as u128 > BPS_DIVISOR {
            return Err(ConfigError::Invalid(format!(
                "collateral_incentive_bps {} exceeds 10000",
                self.collateral_incentive_bps
            )));
        }
        if self.max_vessels == 0 {
            return Err(ConfigError::Invalid("max_vessels must be positive".into()));
        }
        Ok(())
    }
}

/// Upper health bound of the capped recovery-mode liquidation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CappedUpperBound {
    /// Vessels below the current system ratio
    #[default]
    SystemRatio,
    /// Vessels below the critical ratio
    CriticalRatio,
}

/// Engine-wide settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Largest `max_count`/set size accepted by one liquidation call
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// In recovery mode, vessels at or below this ratio are redistributed entirely
    #[serde(default = "default_redistribution_floor", with = "amount")]
    pub recovery_redistribution_floor: u128,
    #[serde(default)]
    pub recovery_capped_upper: CappedUpperBound,
    /// Default walk limit for a redemption
    #[serde(default = "default_redemption_iterations")]
    pub redemption_max_iterations: usize,
}

fn default_max_batch_size() -> usize {
    32
}

fn default_redistribution_floor() -> u128 {
    ONE_HUNDRED_PERCENT
}

fn default_redemption_iterations() -> usize {
    50
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            recovery_redistribution_floor: default_redistribution_floor(),
            recovery_capped_upper: CappedUpperBound::default(),
            redemption_max_iterations: default_redemption_iterations(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch_size == 0 || self.max_batch_size > MAX_LIQUIDATION_BATCH {
            return Err(ConfigError::Invalid(format!(
                "max_batch_size {} must be in 1..={}",
                self.max_batch_size, MAX_LIQUIDATION_BATCH
            )));
        }
        if self.redemption_max_iterations == 0 {
            return Err(ConfigError::Invalid("redemption_max_iterations must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetConfig {
    pub id: AssetId,
    #[serde(flatten)]
    pub params: RiskParams,
}

/// Full ledger configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub assets: Vec<AssetConfig>,
}

impl LedgerConfig {
    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: LedgerConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        for (i, asset) in self.assets.iter().enumerate() {
            asset.params.validate()?;
            if self.assets[..i].iter().any(|a| a.id == asset.id) {
                return Err(ConfigError::Invalid(format!("{} listed twice", asset.id)));
            }
        }
        Ok(())
    }
}

/// 1e18-scaled values overflow TOML integers, so they are also accepted
/// and written as decimal strings
mod amount {
    use core::fmt;

    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        deserializer.deserialize_any(AmountVisitor)
    }

    struct AmountVisitor;

    impl<'de> Visitor<'de> for AmountVisitor {
        type Value = u128;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a non-negative integer or decimal string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
            Ok(v as u128)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u128, E> {
            u128::try_from(v).map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<u128, E> {
            Ok(v)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
            v.trim().parse().map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
        }
    }
}
