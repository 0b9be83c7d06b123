//! Fixed-point arithmetic and mathematical utilities.
//!
//! All amounts are unsigned 256-bit integers. Ratios are 18-decimal fixed point.
//! Every helper is checked: overflow and division by zero come back as errors
//! instead of panicking.

use primitive_types::U256;

use crate::error::{Error, Result};
use crate::utils::constants::{
    BPS_DIVISOR, DECIMAL_PRECISION, DEC_POW_MAX_MINUTES, NICR_PRECISION,
};

// ═══════════════════════════════════════════════════════════════════════════════
// CONSTRUCTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Build `value × 10^decimals`
///
/// `dec(105, 17)` is 10.5 in 18-decimal fixed point.
pub fn dec(value: u64, decimals: u32) -> U256 {
    U256::from(value) * U256::exp10(decimals as usize)
}

/// Convert basis points into an 18-decimal ratio (11000 bps -> 1.1e18)
pub fn bps_to_ratio(bps: u64) -> U256 {
    U256::from(bps) * DECIMAL_PRECISION / U256::from(BPS_DIVISOR)
}

// ═══════════════════════════════════════════════════════════════════════════════
// SAFE ARITHMETIC OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Safe addition with overflow check
pub fn safe_add(a: U256, b: U256) -> Result<U256> {
    a.checked_add(b).ok_or_else(|| Error::Overflow {
        operation: format!("{} + {}", a, b),
    })
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: U256, b: U256) -> Result<U256> {
    a.checked_sub(b).ok_or_else(|| Error::Underflow {
        operation: format!("{} - {}", a, b),
    })
}

/// Safe multiplication with overflow check
pub fn safe_mul(a: U256, b: U256) -> Result<U256> {
    a.checked_mul(b).ok_or_else(|| Error::Overflow {
        operation: format!("{} * {}", a, b),
    })
}

/// Safe division with zero check
pub fn safe_div(a: U256, b: U256) -> Result<U256> {
    if b.is_zero() {
        return Err(Error::InvalidParameter {
            name: "divisor".into(),
            reason: "Division by zero".into(),
        });
    }
    Ok(a / b)
}

/// Compute `a × b / c`, rounding down
pub fn mul_div(a: U256, b: U256, c: U256) -> Result<U256> {
    safe_div(safe_mul(a, b)?, c)
}

/// Apply a basis-point share to an amount, rounding down
pub fn apply_bps(amount: U256, bps: u64) -> Result<U256> {
    mul_div(amount, U256::from(bps), U256::from(BPS_DIVISOR))
}

// ═══════════════════════════════════════════════════════════════════════════════
// DECIMAL FIXED POINT
// ═══════════════════════════════════════════════════════════════════════════════

/// Multiply two 18-decimal values, rounding half up
pub fn dec_mul(x: U256, y: U256) -> Result<U256> {
    let prod = safe_mul(x, y)?;
    Ok(safe_add(prod, DECIMAL_PRECISION / 2)? / DECIMAL_PRECISION)
}

/// Raise an 18-decimal base to an integer power by repeated squaring
///
/// The exponent is capped at [`DEC_POW_MAX_MINUTES`]; for a base below 1.0 the
/// result is already zero long before that.
pub fn dec_pow(base: U256, exponent: u64) -> Result<U256> {
    let mut n = exponent.min(DEC_POW_MAX_MINUTES);
    if n == 0 {
        return Ok(DECIMAL_PRECISION);
    }

    let mut x = base;
    let mut y = DECIMAL_PRECISION;
    while n > 1 {
        if n % 2 == 0 {
            x = dec_mul(x, x)?;
            n /= 2;
        } else {
            y = dec_mul(x, y)?;
            x = dec_mul(x, x)?;
            n = (n - 1) / 2;
        }
    }
    dec_mul(x, y)
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERAL RATIO CALCULATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Collateral ratio `coll × price / debt` as an 18-decimal value
///
/// A debt-free position has an unbounded ratio and reports `U256::MAX`.
pub fn compute_cr(coll: U256, debt: U256, price: U256) -> Result<U256> {
    if debt.is_zero() {
        return Ok(U256::MAX);
    }
    mul_div(coll, price, debt)
}

/// Price-independent ordering key `coll × 1e20 / debt`
pub fn compute_nominal_cr(coll: U256, debt: U256) -> Result<U256> {
    if debt.is_zero() {
        return Ok(U256::MAX);
    }
    mul_div(coll, U256::from(NICR_PRECISION), debt)
}

/// Absolute difference between two values
pub fn abs_diff(a: U256, b: U256) -> U256 {
    if a > b {
        a - b
    } else {
        b - a
    }
}
