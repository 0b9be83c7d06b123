//! Protocol constants and magic numbers.
//!
//! All protocol-wide constants are defined here for easy auditing and modification.
//! Ratios and per-unit amounts are 18-decimal fixed point (`1e18 == 1.0`).

use primitive_types::U256;

// ═══════════════════════════════════════════════════════════════════════════════
// FIXED-POINT CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Unit value of the 18-decimal fixed-point representation (1.0)
pub const DECIMAL_PRECISION: U256 = U256([1_000_000_000_000_000_000, 0, 0, 0]);

/// Factor the pool product is rescaled by when a shrink would lose precision (1e9)
pub const SCALE_FACTOR: U256 = U256([1_000_000_000, 0, 0, 0]);

/// 100% expressed as a fixed-point ratio
pub const ONE_HUNDRED_PERCENT: U256 = DECIMAL_PRECISION;

/// Precision of the nominal collateral ratio used for ordering (1e20)
pub const NICR_PRECISION: u128 = 100_000_000_000_000_000_000;

/// Basis points divisor (10000 = 100%)
pub const BPS_DIVISOR: u64 = 10_000;

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERALIZATION CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Minimum Collateralization Ratio (MCR) - 110%
/// Below this ratio, a position can be liquidated
pub const MIN_COLLATERAL_RATIO_BPS: u64 = 11_000;

/// Critical Collateralization Ratio (CCR) for Recovery Mode - 150%
/// When system TCR falls below this, Recovery Mode activates
pub const CRITICAL_COLLATERAL_RATIO_BPS: u64 = 15_000;

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Share of a liquidated position's collateral paid to the liquidator - 0.5%
pub const COLL_GAS_COMPENSATION_BPS: u64 = 50;

/// Minimum debt per position - 1800 units (18 decimals)
pub const MIN_DEBT: u128 = 1_800 * 1_000_000_000_000_000_000;

/// Maximum number of liquidation events kept in memory
pub const MAX_LIQUIDATION_EVENTS: usize = 1_000;

/// Maximum number of recovery mode transitions kept in memory
pub const MAX_RECOVERY_EVENTS: usize = 100;

// ═══════════════════════════════════════════════════════════════════════════════
// REWARD ISSUANCE CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Total reward tokens ever issued to the stability pool - 32 million (18 decimals)
pub const REWARD_SUPPLY_CAP: u128 = 32_000_000 * 1_000_000_000_000_000_000;

/// Per-minute decay factor; the remaining issuance halves every year
pub const ISSUANCE_FACTOR: u128 = 999_998_681_227_695_000;

/// Seconds in one minute
pub const SECONDS_IN_ONE_MINUTE: u64 = 60;

/// Exponent cap for `dec_pow` (1000 years in minutes)
pub const DEC_POW_MAX_MINUTES: u64 = 525_600_000;

// ═══════════════════════════════════════════════════════════════════════════════
// ORACLE CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Maximum age of a price before the source is treated as frozen (4 hours)
pub const MAX_PRICE_STALENESS_SECS: u64 = 14_400;

/// Maximum move between consecutive primary readings - 50%
pub const MAX_PRICE_DEVIATION_BPS: u64 = 5_000;
