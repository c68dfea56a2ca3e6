//! Fixed-point ledger arithmetic - checked, no unwrap, no silent clamping
//!
//! Every amount, price and ratio is a `u128` scaled by [`DECIMAL_PRECISION`].
//! Products are formed in 256 bits so `a * b / d` never overflows before the
//! division; only a quotient that does not fit back into `u128` is an error.

use primitive_types::U256;

use crate::error::{LedgerError, LedgerResult};

/// 1.0 in fixed point (1e18)
pub const DECIMAL_PRECISION: u128 = 1_000_000_000_000_000_000;

/// Scale of the price-independent nominal ratio (1e20)
pub const NICR_PRECISION: u128 = 100_000_000_000_000_000_000;

/// Stability pool rescale factor and the floor `P` is kept above (1e9)
pub const SCALE_FACTOR: u128 = 1_000_000_000;

/// 100% collateral ratio
pub const ONE_HUNDRED_PERCENT: u128 = DECIMAL_PRECISION;

/// Basis point denominator
pub const BPS_DIVISOR: u128 = 10_000;

/// Direction of truncation for a division
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Amounts paid out to users
    Down,
    /// Amounts charged to users
    Up,
}

/// Checked add, `what` names the quantity for the error
pub fn add(a: u128, b: u128, what: &'static str) -> LedgerResult<u128> {
    a.checked_add(b).ok_or(LedgerError::Overflow(what))
}

/// Checked subtract, `what` names the quantity for the error
pub fn sub(a: u128, b: u128, what: &'static str) -> LedgerResult<u128> {
    a.checked_sub(b).ok_or(LedgerError::Underflow(what))
}

/// Narrow a 256-bit intermediate back to u128
pub fn to_u128(x: U256, what: &'static str) -> LedgerResult<u128> {
    if x > U256::from(u128::MAX) {
        return Err(LedgerError::Overflow(what));
    }
    Ok(x.low_u128())
}

/// `a * b / d` with explicit rounding, computed in 256 bits
pub fn mul_div(a: u128, b: u128, d: u128, rounding: Rounding) -> LedgerResult<u128> {
    if d == 0 {
        return Err(LedgerError::Invariant("mul_div by zero"));
    }
    let num = U256::from(a) * U256::from(b);
    let den = U256::from(d);
    let mut q = num / den;
    if rounding == Rounding::Up && !(num % den).is_zero() {
        q = q + U256::one();
    }
    to_u128(q, "mul_div")
}

/// `(a * b + carry) / d` and its remainder
///
/// Used by the error-feedback divisions: the remainder is carried into the
/// numerator of the next call so rounding dust is never lost for good.
pub fn mul_add_div_rem(a: u128, b: u128, carry: u128, d: u128) -> LedgerResult<(u128, u128)> {
    if d == 0 {
        return Err(LedgerError::Invariant("mul_add_div_rem by zero"));
    }
    let num = U256::from(a) * U256::from(b) + U256::from(carry);
    let den = U256::from(d);
    let q = to_u128(num / den, "per-unit quotient")?;
    // remainder < d, always fits
    let r = (num % den).low_u128();
    Ok((q, r))
}

/// Fixed-point multiply, rounded down
pub fn dec_mul(a: u128, b: u128) -> LedgerResult<u128> {
    mul_div(a, b, DECIMAL_PRECISION, Rounding::Down)
}

/// `amount * bps / 10_000`, rounded down
pub fn bps_of(amount: u128, bps: u64) -> LedgerResult<u128> {
    mul_div(amount, bps as u128, BPS_DIVISOR, Rounding::Down)
}

/// Collateral ratio: `coll * price / debt`
pub fn compute_cr(coll: u128, debt: u128, price: u128) -> LedgerResult<u128> {
    if debt == 0 {
        return Err(LedgerError::ZeroDebt("collateral ratio"));
    }
    mul_div(coll, price, debt, Rounding::Down)
}

/// Nominal (price-free) ratio: `coll * 1e20 / debt`
pub fn compute_nominal_cr(coll: u128, debt: u128) -> LedgerResult<u128> {
    if debt == 0 {
        return Err(LedgerError::ZeroDebt("nominal ratio"));
    }
    mul_div(coll, NICR_PRECISION, debt, Rounding::Down)
}

/// System-wide ratio; a collateral type without debt is never in recovery
pub fn compute_system_cr(coll: u128, debt: u128, price: u128) -> LedgerResult<u128> {
    if debt == 0 {
        return Ok(u128::MAX);
    }
    compute_cr(coll, debt, price)
}

/// Absolute difference
pub fn abs_diff(a: u128, b: u128) -> u128 {
    if a > b { a - b } else { b - a }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_div_rounding() {
        assert_eq!(mul_div(10, 1, 3, Rounding::Down).unwrap(), 3);
        assert_eq!(mul_div(10, 1, 3, Rounding::Up).unwrap(), 4);
        // exact division does not round up
        assert_eq!(mul_div(9, 1, 3, Rounding::Up).unwrap(), 3);
    }

    #[test]
    fn test_mul_div_wide_intermediate() {
        // 1e30 * 1e18 overflows u128 but the quotient fits
        let a = 1_000_000_000_000 * DECIMAL_PRECISION;
        let r = mul_div(a, DECIMAL_PRECISION, DECIMAL_PRECISION, Rounding::Down).unwrap();
        assert_eq!(r, a);
    }

    #[test]
    fn test_mul_div_quotient_overflow() {
        let err = mul_div(u128::MAX, 2, 1, Rounding::Down).unwrap_err();
        assert_eq!(err, LedgerError::Overflow("mul_div"));
    }

    #[test]
    fn test_mul_div_zero_divisor() {
        assert!(mul_div(1, 1, 0, Rounding::Down).is_err());
    }

    #[test]
    fn test_mul_add_div_rem() {
        // (7 * 3 + 2) / 5 = 4 rem 3
        assert_eq!(mul_add_div_rem(7, 3, 2, 5).unwrap(), (4, 3));
    }

    #[test]
    fn test_compute_cr() {
        // 10 coll at $200 against 1000 debt = 200%
        let cr = compute_cr(10 * DECIMAL_PRECISION, 1_000 * DECIMAL_PRECISION, 200 * DECIMAL_PRECISION).unwrap();
        assert_eq!(cr, 2 * DECIMAL_PRECISION);
    }

    #[test]
    fn test_compute_cr_zero_debt_is_error() {
        assert_eq!(compute_cr(1, 0, 1).unwrap_err(), LedgerError::ZeroDebt("collateral ratio"));
        assert_eq!(compute_system_cr(1, 0, 1).unwrap(), u128::MAX);
    }

    #[test]
    fn test_nominal_cr() {
        let nicr = compute_nominal_cr(DECIMAL_PRECISION, 100 * DECIMAL_PRECISION).unwrap();
        assert_eq!(nicr, NICR_PRECISION / 100);
    }

    #[test]
    fn test_checked_helpers() {
        assert_eq!(add(1, 2, "x").unwrap(), 3);
        assert_eq!(sub(1, 2, "x").unwrap_err(), LedgerError::Underflow("x"));
        assert_eq!(add(u128::MAX, 1, "x").unwrap_err(), LedgerError::Overflow("x"));
        assert_eq!(bps_of(10_000, 50).unwrap(), 50);
        assert_eq!(abs_diff(3, 5), 2);
    }
}
