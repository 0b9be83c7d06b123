//! Redistribution of uncovered liquidations over active positions.
//!
//! Debt and collateral the stability pool cannot absorb are spread pro-rata
//! over active positions' stakes through two cumulative per-stake sums,
//! `L_coll` and `L_debt`. A position's share is only applied when the position
//! is next touched, so a redistribution costs O(1) regardless of how many
//! positions exist.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::position::{Position, PositionManager, RewardSnapshot};
use crate::error::{Error, Result};
use crate::utils::constants::DECIMAL_PRECISION;
use crate::utils::ids::AccountId;
use crate::utils::journal::Checkpointed;
use crate::utils::math::{mul_div, safe_add, safe_mul, safe_sub};

/// Pending redistribution share of one position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRewards {
    /// Collateral owed to the position
    pub coll: U256,
    /// Debt owed by the position
    pub debt: U256,
}

impl PendingRewards {
    /// True if nothing is pending
    pub fn is_zero(&self) -> bool {
        self.coll.is_zero() && self.debt.is_zero()
    }
}

/// Cumulative redistribution state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedistributionLedger {
    l_coll: U256,
    l_debt: U256,
    last_coll_error: U256,
    last_debt_error: U256,
    total_stakes: U256,
    total_stakes_snapshot: U256,
    total_collateral_snapshot: U256,
    /// Redistributed collateral not yet applied to any position
    pending_coll: U256,
    /// Redistributed debt not yet applied to any position
    pending_debt: U256,
}

impl RedistributionLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STAKES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Stake for `coll` at the current snapshot ratio
    ///
    /// Before the first redistribution the stake equals the collateral.
    /// Afterwards it is scaled by `totalStakesSnapshot / totalCollateralSnapshot`
    /// so new positions do not claim earlier redistributions.
    pub fn compute_new_stake(&self, coll: U256) -> Result<U256> {
        if self.total_collateral_snapshot.is_zero() {
            return Ok(coll);
        }
        if self.total_stakes_snapshot.is_zero() {
            return Err(Error::InvariantViolation(
                "stakes snapshot empty with collateral snapshot set".into(),
            ));
        }
        mul_div(coll, self.total_stakes_snapshot, self.total_collateral_snapshot)
    }

    /// Recompute a position's stake from its current collateral
    pub fn update_stake(&mut self, position: &mut Position) -> Result<U256> {
        let new_stake = self.compute_new_stake(position.collateral)?;
        let without_old = safe_sub(self.total_stakes, position.stake)?;
        self.total_stakes = safe_add(without_old, new_stake)?;
        position.stake = new_stake;
        Ok(new_stake)
    }

    /// Remove a position's stake before it closes
    pub fn remove_stake(&mut self, position: &mut Position) -> Result<()> {
        self.total_stakes = safe_sub(self.total_stakes, position.stake)?;
        position.stake = U256::zero();
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // REDISTRIBUTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Spread `debt` and `coll` over all current stakes
    ///
    /// Division remainders carry into the next redistribution.
    pub fn redistribute(&mut self, debt: U256, coll: U256) -> Result<()> {
        if debt.is_zero() && coll.is_zero() {
            return Ok(());
        }
        if self.total_stakes.is_zero() {
            return Err(Error::InvariantViolation(
                "redistribution with no active stakes".into(),
            ));
        }

        let coll_numerator = safe_add(safe_mul(coll, DECIMAL_PRECISION)?, self.last_coll_error)?;
        let debt_numerator = safe_add(safe_mul(debt, DECIMAL_PRECISION)?, self.last_debt_error)?;

        let coll_per_stake = coll_numerator / self.total_stakes;
        let debt_per_stake = debt_numerator / self.total_stakes;

        self.last_coll_error = coll_numerator - coll_per_stake * self.total_stakes;
        self.last_debt_error = debt_numerator - debt_per_stake * self.total_stakes;

        self.l_coll = safe_add(self.l_coll, coll_per_stake)?;
        self.l_debt = safe_add(self.l_debt, debt_per_stake)?;

        self.pending_coll = safe_add(self.pending_coll, coll)?;
        self.pending_debt = safe_add(self.pending_debt, debt)?;

        debug!(%debt, %coll, l_debt = %self.l_debt, l_coll = %self.l_coll, "Redistributed");
        Ok(())
    }

    /// Share of redistributions a position has not yet received
    pub fn pending_rewards(&self, position: &Position) -> Result<PendingRewards> {
        if !position.is_active() {
            return Ok(PendingRewards::default());
        }
        let coll_delta = safe_sub(self.l_coll, position.reward_snapshot.coll)?;
        let debt_delta = safe_sub(self.l_debt, position.reward_snapshot.debt)?;
        Ok(PendingRewards {
            coll: mul_div(position.stake, coll_delta, DECIMAL_PRECISION)?,
            debt: mul_div(position.stake, debt_delta, DECIMAL_PRECISION)?,
        })
    }

    /// Apply a position's pending share and refresh its snapshot
    ///
    /// Must run before any read or mutation of the position's amounts.
    pub fn sync_pending_rewards(
        &mut self,
        positions: &mut PositionManager,
        owner: &AccountId,
    ) -> Result<PendingRewards> {
        let pending = self.pending_rewards(positions.get_active(owner)?)?;

        if !pending.is_zero() {
            self.pending_coll = safe_sub(self.pending_coll, pending.coll)?;
            self.pending_debt = safe_sub(self.pending_debt, pending.debt)?;
            positions.increase_collateral(owner, pending.coll)?;
            positions.increase_debt(owner, pending.debt)?;
        }

        self.update_reward_snapshot(positions.get_active_mut(owner)?);
        Ok(pending)
    }

    /// Point a position's snapshot at the current accumulators
    pub fn update_reward_snapshot(&self, position: &mut Position) {
        position.reward_snapshot = RewardSnapshot {
            coll: self.l_coll,
            debt: self.l_debt,
        };
    }

    /// Refresh the stake baseline after a liquidation
    ///
    /// `active_collateral` must already exclude collateral that left the
    /// system (gas compensation, surplus).
    pub fn update_system_snapshots(&mut self, active_collateral: U256) -> Result<()> {
        self.total_stakes_snapshot = self.total_stakes;
        self.total_collateral_snapshot = safe_add(active_collateral, self.pending_coll)?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Cumulative collateral per unit of stake
    pub fn l_coll(&self) -> U256 {
        self.l_coll
    }

    /// Cumulative debt per unit of stake
    pub fn l_debt(&self) -> U256 {
        self.l_debt
    }

    /// Sum of all active stakes
    pub fn total_stakes(&self) -> U256 {
        self.total_stakes
    }

    /// Stakes at the last liquidation
    pub fn total_stakes_snapshot(&self) -> U256 {
        self.total_stakes_snapshot
    }

    /// Collateral at the last liquidation
    pub fn total_collateral_snapshot(&self) -> U256 {
        self.total_collateral_snapshot
    }

    /// Redistributed collateral not yet applied
    pub fn pending_coll(&self) -> U256 {
        self.pending_coll
    }

    /// Redistributed debt not yet applied
    pub fn pending_debt(&self) -> U256 {
        self.pending_debt
    }
}

// Every field is a scalar, so the checkpoint is a plain copy.
impl Checkpointed for RedistributionLedger {
    type Checkpoint = RedistributionLedger;

    fn checkpoint(&mut self) -> RedistributionLedger {
        self.clone()
    }

    fn commit(&mut self, _checkpoint: RedistributionLedger) {}

    fn rollback(&mut self, checkpoint: RedistributionLedger) {
        *self = checkpoint;
    }
}
