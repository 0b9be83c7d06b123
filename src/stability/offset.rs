//! Offsetting liquidated debt against pool deposits.
//!
//! The processor decides how much of a liquidation the pool can absorb and
//! turns the absorbed amounts into per-unit updates of the ledger. Division
//! remainders are carried into the next offset so rounding dust never
//! accumulates.

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::stability::ledger::{FixedPointLedger, LossOutcome};
use crate::utils::constants::DECIMAL_PRECISION;
use crate::utils::math::{mul_div, safe_add, safe_mul, safe_sub};

/// How a liquidation's debt and collateral divide between pool and remainder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetSplit {
    /// Debt cancelled against deposits
    pub debt_offset: U256,
    /// Collateral handed to depositors
    pub coll_offset: U256,
    /// Debt the pool could not absorb
    pub debt_remainder: U256,
    /// Collateral matching the unabsorbed debt
    pub coll_remainder: U256,
}

impl OffsetSplit {
    /// Split `debt`/`coll` against a pool holding `total_deposits`
    ///
    /// The collateral offset is the slice of `coll` proportional to the
    /// debt fraction the pool absorbs, rounded down.
    pub fn compute(debt: U256, coll: U256, total_deposits: U256) -> Result<Self> {
        if debt.is_zero() || total_deposits.is_zero() {
            return Ok(Self {
                debt_remainder: debt,
                coll_remainder: coll,
                ..Self::default()
            });
        }

        let debt_offset = debt.min(total_deposits);
        let coll_offset = mul_div(coll, debt_offset, debt)?;
        Ok(Self {
            debt_offset,
            coll_offset,
            debt_remainder: debt - debt_offset,
            coll_remainder: safe_sub(coll, coll_offset)?,
        })
    }

    /// True if the pool absorbs nothing
    pub fn is_empty(&self) -> bool {
        self.debt_offset.is_zero()
    }
}

/// Per-unit ledger updates of one offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardsPerUnit {
    /// Collateral gained per unit of deposit
    pub coll_gain: U256,
    /// Deposit lost per unit of deposit
    pub debt_loss: U256,
}

/// Error-feedback state for offsets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetProcessor {
    last_coll_error: U256,
    last_debt_loss_error: U256,
}

impl OffsetProcessor {
    /// Create a processor with no carried remainders
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-unit collateral gain and debt loss for an offset
    ///
    /// The collateral gain rounds down and carries its remainder forward. The
    /// debt loss rounds up so deposits are never over-reported, and stays
    /// below 1.0 unless the pool is emptied exactly.
    pub fn rewards_per_unit(
        &mut self,
        coll_to_add: U256,
        debt_to_offset: U256,
        total_deposits: U256,
    ) -> Result<RewardsPerUnit> {
        if total_deposits.is_zero() {
            return Err(Error::InvariantViolation("offset against an empty pool".into()));
        }
        if debt_to_offset > total_deposits {
            return Err(Error::InvariantViolation(format!(
                "offset {} exceeds pool deposits {}",
                debt_to_offset, total_deposits
            )));
        }

        let coll_numerator = safe_add(safe_mul(coll_to_add, DECIMAL_PRECISION)?, self.last_coll_error)?;
        let coll_gain = coll_numerator / total_deposits;
        self.last_coll_error = coll_numerator - coll_gain * total_deposits;

        let debt_loss = if debt_to_offset == total_deposits {
            self.last_debt_loss_error = U256::zero();
            DECIMAL_PRECISION
        } else {
            let loss_numerator = safe_mul(debt_to_offset, DECIMAL_PRECISION)?
                .saturating_sub(self.last_debt_loss_error);
            let per_unit = (loss_numerator / total_deposits + 1).min(DECIMAL_PRECISION - 1);
            self.last_debt_loss_error = safe_mul(per_unit, total_deposits)?.saturating_sub(loss_numerator);
            per_unit
        };

        Ok(RewardsPerUnit { coll_gain, debt_loss })
    }

    /// Apply an offset to the ledger
    pub fn apply(
        &mut self,
        ledger: &mut FixedPointLedger,
        debt_to_offset: U256,
        coll_to_add: U256,
        total_deposits: U256,
    ) -> Result<LossOutcome> {
        let per_unit = self.rewards_per_unit(coll_to_add, debt_to_offset, total_deposits)?;
        ledger.add_collateral_gain(per_unit.coll_gain)?;
        ledger.apply_loss(per_unit.debt_loss)
    }

    /// Collateral remainder carried into the next offset
    pub fn last_coll_error(&self) -> U256 {
        self.last_coll_error
    }

    /// Debt-loss overshoot carried into the next offset
    pub fn last_debt_loss_error(&self) -> U256 {
        self.last_debt_loss_error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::math::dec;

    #[test]
    fn test_split_pool_covers_all() {
        let split = OffsetSplit::compute(dec(100, 18), dec(2, 18), dec(300, 18)).unwrap();
        assert_eq!(split.debt_offset, dec(100, 18));
        assert_eq!(split.coll_offset, dec(2, 18));
        assert!(split.debt_remainder.is_zero());
        assert!(split.coll_remainder.is_zero());
    }

    #[test]
    fn test_split_partial_pool() {
        let split = OffsetSplit::compute(dec(250, 18), dec(10, 18), dec(100, 18)).unwrap();
        assert_eq!(split.debt_offset, dec(100, 18));
        assert_eq!(split.coll_offset, dec(4, 18));
        assert_eq!(split.debt_remainder, dec(150, 18));
        assert_eq!(split.coll_remainder, dec(6, 18));
        assert_eq!(split.coll_offset + split.coll_remainder, dec(10, 18));
    }

    #[test]
    fn test_split_empty_pool() {
        let split = OffsetSplit::compute(dec(100, 18), dec(2, 18), U256::zero()).unwrap();
        assert!(split.is_empty());
        assert_eq!(split.debt_remainder, dec(100, 18));
        assert_eq!(split.coll_remainder, dec(2, 18));
    }

    #[test]
    fn test_full_depletion_loss_is_one() {
        let mut processor = OffsetProcessor::new();
        let per_unit = processor
            .rewards_per_unit(dec(1, 18), dec(100, 18), dec(100, 18))
            .unwrap();
        assert_eq!(per_unit.debt_loss, DECIMAL_PRECISION);
        assert_eq!(per_unit.coll_gain, dec(1, 16));
        assert!(processor.last_debt_loss_error().is_zero());
    }

    #[test]
    fn test_debt_loss_rounds_up() {
        let mut processor = OffsetProcessor::new();
        let per_unit = processor
            .rewards_per_unit(U256::zero(), dec(100, 18), dec(300, 18))
            .unwrap();
        // 1/3 rounded up by one unit
        assert_eq!(per_unit.debt_loss, dec(1, 18) / 3 + 1);
        assert!(per_unit.debt_loss * dec(300, 18) >= dec(100, 18) * DECIMAL_PRECISION);
    }

    #[test]
    fn test_coll_error_carried_forward() {
        let mut processor = OffsetProcessor::new();
        // 1 wei of collateral over 3 units of deposit loses precision
        let total = U256::from(3u64) * DECIMAL_PRECISION;
        processor.rewards_per_unit(U256::one(), U256::zero(), total).unwrap();
        let err = processor.last_coll_error();
        assert_eq!(err, DECIMAL_PRECISION);

        // The next offset includes the carried remainder
        let next = processor.rewards_per_unit(U256::from(2u64), U256::zero(), total).unwrap();
        assert_eq!(next.coll_gain, U256::one());
        assert!(processor.last_coll_error().is_zero());
    }

    #[test]
    fn test_offset_above_deposits_rejected() {
        let mut processor = OffsetProcessor::new();
        let result = processor.rewards_per_unit(U256::zero(), dec(2, 18), dec(1, 18));
        assert!(matches!(result, Err(Error::InvariantViolation(_))));
    }

    #[test]
    fn test_apply_updates_ledger() {
        let mut processor = OffsetProcessor::new();
        let mut ledger = FixedPointLedger::new();
        let snap = ledger.snapshot();

        processor.apply(&mut ledger, dec(50, 18), dec(1, 18), dec(100, 18)).unwrap();
        let compounded = ledger.compounded(dec(100, 18), &snap).unwrap();
        assert!(compounded <= dec(50, 18));
        assert!(dec(50, 18) - compounded < U256::from(1_000u64));
        assert_eq!(ledger.collateral_gain(dec(100, 18), &snap).unwrap(), dec(1, 18));
    }
}
