//! Product/sum compounding ledger for the stability pool.
//!
//! Deposits shrink by a common product factor `P` as debt is absorbed, while
//! collateral gains (`S`) and reward gains (`G`) accumulate per
//! `(epoch, scale)` bucket. A depositor only stores a snapshot of these values,
//! so every getter is O(1) regardless of how many depositors exist.
//!
//! Precision handling:
//! - When `P` would drop below [`SCALE_FACTOR`], it is multiplied back up by
//!   `SCALE_FACTOR` and `current_scale` increments.
//! - When an offset empties the pool exactly, `current_epoch` increments, the
//!   scale resets to 0 and `P` resets to 1.0. Snapshots from older epochs
//!   compound to zero.

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::utils::constants::{DECIMAL_PRECISION, SCALE_FACTOR};
use crate::utils::journal::Checkpointed;
use crate::utils::math::{mul_div, safe_add, safe_mul, safe_sub};

// ═══════════════════════════════════════════════════════════════════════════════
// SNAPSHOTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Cumulative per-unit gains for one `(epoch, scale)` pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SumBucket {
    /// Collateral gain sum
    pub s: U256,
    /// Reward-token gain sum
    pub g: U256,
}

/// Ledger values captured at a deposit's last change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Product factor
    pub p: U256,
    /// Collateral sum in the snapshot bucket
    pub s: U256,
    /// Reward sum in the snapshot bucket
    pub g: U256,
    /// Scale at snapshot time
    pub scale: u64,
    /// Epoch at snapshot time
    pub epoch: u64,
}

impl Default for LedgerSnapshot {
    fn default() -> Self {
        Self {
            p: DECIMAL_PRECISION,
            s: U256::zero(),
            g: U256::zero(),
            scale: 0,
            epoch: 0,
        }
    }
}

/// Where an absorbed loss left the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossOutcome {
    /// `P` shrank within the current scale
    Shrunk,
    /// `P` was rescaled and the scale incremented
    ScaleIncremented,
    /// The pool was emptied and a new epoch started
    EpochReset,
}

// ═══════════════════════════════════════════════════════════════════════════════
// FIXED POINT LEDGER
// ═══════════════════════════════════════════════════════════════════════════════

/// Running product and per-bucket sums
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedPointLedger {
    p: U256,
    current_scale: u64,
    current_epoch: u64,
    /// `sums[epoch][scale]`; rows and buckets are only ever appended
    sums: Vec<Vec<SumBucket>>,
}

impl Default for FixedPointLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl FixedPointLedger {
    /// Create a fresh ledger with `P = 1.0` in epoch 0, scale 0
    pub fn new() -> Self {
        Self {
            p: DECIMAL_PRECISION,
            current_scale: 0,
            current_epoch: 0,
            sums: vec![vec![SumBucket::default()]],
        }
    }

    /// Current product factor
    pub fn p(&self) -> U256 {
        self.p
    }

    /// Current scale
    pub fn current_scale(&self) -> u64 {
        self.current_scale
    }

    /// Current epoch
    pub fn current_epoch(&self) -> u64 {
        self.current_epoch
    }

    /// Sums recorded for `(epoch, scale)`, zero if that bucket was never reached
    pub fn bucket(&self, epoch: u64, scale: u64) -> SumBucket {
        self.sums
            .get(epoch as usize)
            .and_then(|row| row.get(scale as usize))
            .copied()
            .unwrap_or_default()
    }

    /// Snapshot of the current ledger position
    pub fn snapshot(&self) -> LedgerSnapshot {
        let bucket = self.bucket(self.current_epoch, self.current_scale);
        LedgerSnapshot {
            p: self.p,
            s: bucket.s,
            g: bucket.g,
            scale: self.current_scale,
            epoch: self.current_epoch,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // GETTERS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Value of `initial` after every loss since `snapshot`
    ///
    /// Returns zero when the pool was emptied since the snapshot, when two or
    /// more scale changes have passed, or when the value has fallen below a
    /// billionth of `initial`.
    pub fn compounded(&self, initial: U256, snapshot: &LedgerSnapshot) -> Result<U256> {
        if initial.is_zero() || snapshot.epoch < self.current_epoch {
            return Ok(U256::zero());
        }

        let scale_diff = self.current_scale.saturating_sub(snapshot.scale);
        let compounded = match scale_diff {
            0 => mul_div(initial, self.p, snapshot.p)?,
            1 => mul_div(initial, self.p, snapshot.p)? / SCALE_FACTOR,
            _ => U256::zero(),
        };

        if compounded < initial / SCALE_FACTOR {
            return Ok(U256::zero());
        }
        Ok(compounded)
    }

    /// Collateral earned by `initial` since `snapshot`
    pub fn collateral_gain(&self, initial: U256, snapshot: &LedgerSnapshot) -> Result<U256> {
        self.gain_from_sums(initial, snapshot, snapshot.s, |b| b.s)
    }

    /// Reward tokens earned by `initial` since `snapshot`
    pub fn reward_gain(&self, initial: U256, snapshot: &LedgerSnapshot) -> Result<U256> {
        self.gain_from_sums(initial, snapshot, snapshot.g, |b| b.g)
    }

    /// Gain over the snapshot bucket plus the next scale, which may have
    /// started after the snapshot was taken. Later scales contribute nothing
    /// measurable.
    fn gain_from_sums(
        &self,
        initial: U256,
        snapshot: &LedgerSnapshot,
        sum_at_snapshot: U256,
        field: impl Fn(&SumBucket) -> U256,
    ) -> Result<U256> {
        if initial.is_zero() {
            return Ok(U256::zero());
        }

        let first = field(&self.bucket(snapshot.epoch, snapshot.scale));
        let first_portion = safe_sub(first, sum_at_snapshot)?;
        let second_portion = field(&self.bucket(snapshot.epoch, snapshot.scale + 1)) / SCALE_FACTOR;

        let per_unit = safe_add(first_portion, second_portion)?;
        Ok(mul_div(initial, per_unit, snapshot.p)? / DECIMAL_PRECISION)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // UPDATES
    // ═══════════════════════════════════════════════════════════════════════════

    fn current_bucket_mut(&mut self) -> Result<&mut SumBucket> {
        let (epoch, scale) = (self.current_epoch as usize, self.current_scale as usize);
        self.sums
            .get_mut(epoch)
            .and_then(|row| row.get_mut(scale))
            .ok_or_else(|| {
                Error::InvariantViolation(format!("missing sum bucket ({}, {})", epoch, scale))
            })
    }

    /// Credit collateral to every unit of deposit: `S += per_unit × P`
    pub fn add_collateral_gain(&mut self, per_unit: U256) -> Result<()> {
        let marginal = safe_mul(per_unit, self.p)?;
        let bucket = self.current_bucket_mut()?;
        bucket.s = safe_add(bucket.s, marginal)?;
        Ok(())
    }

    /// Credit reward tokens to every unit of deposit: `G += per_unit × P`
    pub fn add_reward_gain(&mut self, per_unit: U256) -> Result<()> {
        let marginal = safe_mul(per_unit, self.p)?;
        let bucket = self.current_bucket_mut()?;
        bucket.g = safe_add(bucket.g, marginal)?;
        Ok(())
    }

    /// Shrink every deposit by `loss_per_unit` (18-decimal, at most 1.0)
    pub fn apply_loss(&mut self, loss_per_unit: U256) -> Result<LossOutcome> {
        if loss_per_unit > DECIMAL_PRECISION {
            return Err(Error::InvariantViolation(format!(
                "loss per unit {} exceeds 1.0",
                loss_per_unit
            )));
        }

        let factor = DECIMAL_PRECISION - loss_per_unit;
        if factor.is_zero() {
            self.current_epoch += 1;
            self.current_scale = 0;
            self.p = DECIMAL_PRECISION;
            self.sums.push(vec![SumBucket::default()]);
            return Ok(LossOutcome::EpochReset);
        }

        let shrunk = mul_div(self.p, factor, DECIMAL_PRECISION)?;
        let outcome = if shrunk < SCALE_FACTOR {
            self.p = mul_div(safe_mul(self.p, factor)?, SCALE_FACTOR, DECIMAL_PRECISION)?;
            self.current_scale += 1;
            let epoch = self.current_epoch as usize;
            match self.sums.get_mut(epoch) {
                Some(row) => row.push(SumBucket::default()),
                None => {
                    return Err(Error::InvariantViolation(format!("missing epoch row {}", epoch)))
                }
            }
            LossOutcome::ScaleIncremented
        } else {
            self.p = shrunk;
            LossOutcome::Shrunk
        };

        if self.p.is_zero() {
            return Err(Error::InvariantViolation("product factor reached zero".into()));
        }
        Ok(outcome)
    }
}

/// Ledger head at a checkpoint
///
/// Only the current bucket is ever written and rows only grow, so the head
/// plus that bucket is enough to undo any sequence of updates.
#[derive(Debug, Clone, Copy)]
pub struct LedgerCheckpoint {
    p: U256,
    scale: u64,
    epoch: u64,
    bucket: SumBucket,
}

impl Checkpointed for FixedPointLedger {
    type Checkpoint = LedgerCheckpoint;

    fn checkpoint(&mut self) -> LedgerCheckpoint {
        LedgerCheckpoint {
            p: self.p,
            scale: self.current_scale,
            epoch: self.current_epoch,
            bucket: self.bucket(self.current_epoch, self.current_scale),
        }
    }

    fn commit(&mut self, _checkpoint: LedgerCheckpoint) {}

    fn rollback(&mut self, checkpoint: LedgerCheckpoint) {
        let (epoch, scale) = (checkpoint.epoch as usize, checkpoint.scale as usize);
        self.sums.truncate(epoch + 1);
        if let Some(row) = self.sums.get_mut(epoch) {
            row.truncate(scale + 1);
            if let Some(bucket) = row.get_mut(scale) {
                *bucket = checkpoint.bucket;
            }
        }
        self.p = checkpoint.p;
        self.current_scale = checkpoint.scale;
        self.current_epoch = checkpoint.epoch;
    }
}
