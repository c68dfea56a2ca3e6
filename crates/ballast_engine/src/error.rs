//! Error taxonomy
//!
//! Every failure is one of three kinds. None of them is retried or partially
//! applied: the call that returns an error has changed nothing.

use thiserror::Error;

use crate::interfaces::PriceError;
use crate::types::{AccountId, AssetId};

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Coarse classification of [`LedgerError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller asked for something the current state does not allow
    Precondition,
    /// Accounting would become inconsistent; the call is aborted
    InvariantViolation,
    /// No trustworthy price; liquidation is blocked until resolved externally
    StalePrice,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    // --- preconditions ---
    #[error("{0} is not a registered collateral type")]
    UnknownAsset(AssetId),
    #[error("{0} is already registered")]
    AssetAlreadyRegistered(AssetId),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("vessel of {owner} for {asset} does not exist or is closed")]
    VesselNotActive { asset: AssetId, owner: AccountId },
    #[error("vessel of {owner} for {asset} is already active")]
    VesselAlreadyActive { asset: AssetId, owner: AccountId },
    #[error("amount must be non-zero")]
    ZeroAmount,
    #[error("cannot remove the last open vessel of {0}")]
    LastVessel(AssetId),
    #[error("vessel of {owner} is not eligible for liquidation")]
    NotLiquidatable { owner: AccountId },
    #[error("nothing to liquidate")]
    NothingToLiquidate,
    #[error("batch of {requested} exceeds the limit of {limit}")]
    BatchTooLarge { requested: usize, limit: usize },
    #[error("{0} appears twice in the liquidation set")]
    DuplicateVessel(AccountId),
    #[error("collateral ratio {ratio} is below the required {required}")]
    InsufficientCollateralRatio { ratio: u128, required: u128 },
    #[error("system ratio {ratio} would fall below the critical ratio {critical}")]
    SystemRatioBelowCritical { ratio: u128, critical: u128 },
    #[error("operation not permitted in recovery mode")]
    RecoveryModeRestriction,
    #[error("recovery-mode adjustment must not lower the collateral ratio")]
    RatioMustImprove,
    #[error("net debt {debt} is below the minimum {min}")]
    NetDebtTooSmall { debt: u128, min: u128 },
    #[error("repayment {amount} exceeds vessel debt {debt}")]
    RepaymentExceedsDebt { amount: u128, debt: u128 },
    #[error("cannot add and withdraw collateral in one adjustment")]
    ConflictingCollateralChange,
    #[error("collateral withdrawal {amount} exceeds vessel collateral {coll}")]
    CollateralWithdrawalExceedsBalance { amount: u128, coll: u128 },
    #[error("insufficient debt-unit balance: need {needed}, have {available}")]
    InsufficientDebtBalance { needed: u128, available: u128 },
    #[error("insufficient collateral balance: need {needed}, have {available}")]
    InsufficientCollateralBalance { needed: u128, available: u128 },
    #[error("{0} has no stability pool deposit")]
    NoDeposit(AccountId),
    #[error("pool withdrawals are blocked while a vessel is below the minimum ratio")]
    UndercollateralizedVessels,
    #[error("{0} has no collateral surplus to claim")]
    NoSurplus(AccountId),
    #[error("the stability pool is empty")]
    EmptyPool,
    #[error("no stake to redistribute onto")]
    NoStakes,
    #[error("unable to redeem any amount")]
    UnableToRedeem,
    #[error("registry is full ({0} vessels)")]
    RegistryFull(usize),
    #[error("{0} is already in the registry")]
    RegistryContains(AccountId),
    #[error("{0} is not in the registry")]
    RegistryMissing(AccountId),
    #[error("registry key must be positive")]
    ZeroRegistryKey,

    // --- price ---
    #[error("no usable price for {asset}: {reason}")]
    StalePrice { asset: AssetId, reason: PriceError },

    // --- invariants ---
    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),
    #[error("arithmetic underflow in {0}")]
    Underflow(&'static str),
    #[error("division by zero debt in {0}")]
    ZeroDebt(&'static str),
    #[error("invariant violated: {0}")]
    Invariant(&'static str),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::StalePrice { .. } => ErrorKind::StalePrice,
            LedgerError::Overflow(_)
            | LedgerError::Underflow(_)
            | LedgerError::ZeroDebt(_)
            | LedgerError::Invariant(_) => ErrorKind::InvariantViolation,
            _ => ErrorKind::Precondition,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::InvariantViolation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(LedgerError::ZeroAmount.kind(), ErrorKind::Precondition);
        assert_eq!(LedgerError::LastVessel(AssetId(0)).kind(), ErrorKind::Precondition);
        assert_eq!(LedgerError::InvalidConfig("x".into()).kind(), ErrorKind::Precondition);
        assert_eq!(LedgerError::Underflow("x").kind(), ErrorKind::InvariantViolation);
        assert!(LedgerError::ZeroDebt("x").is_fatal());
        let stale = LedgerError::StalePrice { asset: AssetId(1), reason: PriceError::Zero };
        assert_eq!(stale.kind(), ErrorKind::StalePrice);
    }

    #[test]
    fn test_error_messages() {
        let e = LedgerError::BatchTooLarge { requested: 20, limit: 10 };
        assert_eq!(e.to_string(), "batch of 20 exceeds the limit of 10");
        let e = LedgerError::InvalidConfig("max_vessels must be positive".into());
        assert_eq!(e.to_string(), "invalid configuration: max_vessels must be positive");
    }
}
