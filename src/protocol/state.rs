//! System state owned by the single writer.
//!
//! Every global accumulator lives here: position records, the sorted index,
//! the redistribution ledger, the stability pool and the surplus pool.
//! Mutating operations run in place under a checkpoint; a failure undoes only
//! the entries the operation touched.

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::core::config::ProtocolParams;
use crate::core::position::{PositionCheckpoint, PositionManager};
use crate::error::{Error, Result};
use crate::liquidation::redistribution::{PendingRewards, RedistributionLedger};
use crate::liquidation::sorted::SortedPositions;
use crate::liquidation::surplus::CollSurplusPool;
use crate::stability::pool::{PoolCheckpoint, StabilityPool};
use crate::utils::ids::{sha256_hex, AccountId};
use crate::utils::journal::Checkpointed;
use crate::utils::math::{compute_cr, compute_nominal_cr, safe_add};

/// Debt and collateral of a position including its pending redistribution share
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntirePosition {
    /// Recorded debt plus pending debt
    pub debt: U256,
    /// Recorded collateral plus pending collateral
    pub coll: U256,
    /// Pending debt not yet applied
    pub pending_debt: U256,
    /// Pending collateral not yet applied
    pub pending_coll: U256,
}

/// All protocol accumulators
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemState {
    /// Position records and active totals
    pub positions: PositionManager,
    /// Active positions by nominal ratio
    pub sorted: SortedPositions,
    /// `L_coll` / `L_debt` and stakes
    pub redistribution: RedistributionLedger,
    /// Stability pool
    pub pool: StabilityPool,
    /// Claimable collateral from capped liquidations
    pub surplus: CollSurplusPool,
}

impl SystemState {
    /// Create an empty state
    pub fn new(params: &ProtocolParams) -> Self {
        Self {
            positions: PositionManager::new(),
            sorted: SortedPositions::new(),
            redistribution: RedistributionLedger::new(),
            pool: StabilityPool::new(params),
            surplus: CollSurplusPool::new(),
        }
    }

    /// Run `f` in place, undoing its changes if it fails
    ///
    /// The cost of a rollback is proportional to what `f` touched, not to
    /// the number of positions or depositors.
    pub fn transact<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut SystemState) -> Result<T>,
    {
        let checkpoint = self.checkpoint();
        match f(self) {
            Ok(value) => {
                self.commit(checkpoint);
                Ok(value)
            }
            Err(e) => {
                self.rollback(checkpoint);
                Err(e)
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SYSTEM TOTALS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Active collateral plus redistributed collateral not yet applied
    pub fn entire_system_coll(&self) -> Result<U256> {
        safe_add(self.positions.active_collateral(), self.redistribution.pending_coll())
    }

    /// Active debt plus redistributed debt not yet applied
    pub fn entire_system_debt(&self) -> Result<U256> {
        safe_add(self.positions.active_debt(), self.redistribution.pending_debt())
    }

    /// Total collateralization ratio at `price`
    pub fn tcr(&self, price: U256) -> Result<U256> {
        compute_cr(self.entire_system_coll()?, self.entire_system_debt()?, price)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // POSITIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Debt and collateral of an active position including pending rewards
    pub fn entire_debt_and_coll(&self, owner: &AccountId) -> Result<EntirePosition> {
        let position = self.positions.get_active(owner)?;
        let pending = self.redistribution.pending_rewards(position)?;
        Ok(EntirePosition {
            debt: safe_add(position.debt, pending.debt)?,
            coll: safe_add(position.collateral, pending.coll)?,
            pending_debt: pending.debt,
            pending_coll: pending.coll,
        })
    }

    /// Current ratio of a position at `price`, pending rewards included
    pub fn current_icr(&self, owner: &AccountId, price: U256) -> Result<U256> {
        let entire = self.entire_debt_and_coll(owner)?;
        compute_cr(entire.coll, entire.debt, price)
    }

    /// Apply a position's pending redistribution share
    pub fn sync_position(&mut self, owner: &AccountId) -> Result<PendingRewards> {
        self.redistribution
            .sync_pending_rewards(&mut self.positions, owner)
    }

    /// Re-key a position in the sorted index from its recorded amounts
    pub fn reinsert_sorted(&mut self, owner: &AccountId) -> Result<()> {
        let position = self.positions.get_active(owner)?;
        let nicr = compute_nominal_cr(position.collateral, position.debt)?;
        self.sorted.insert(*owner, nicr);
        Ok(())
    }

    /// Owner with the lowest nominal ratio
    pub fn lowest(&self) -> Option<AccountId> {
        self.sorted.first()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CONSISTENCY
    // ═══════════════════════════════════════════════════════════════════════════

    /// Check the cross-structure invariants
    ///
    /// The sorted index must hold exactly the active positions, and the sum of
    /// active stakes must equal the ledger's total.
    pub fn check_invariants(&self) -> Result<()> {
        if self.sorted.len() != self.positions.active_count() {
            return Err(Error::InvariantViolation(format!(
                "sorted index holds {} owners, {} positions active",
                self.sorted.len(),
                self.positions.active_count()
            )));
        }

        let mut stakes = U256::zero();
        let mut coll = U256::zero();
        let mut debt = U256::zero();
        for position in self.positions.active() {
            if !self.sorted.contains(&position.owner) {
                return Err(Error::InvariantViolation(format!(
                    "active position {} missing from sorted index",
                    position.owner.short()
                )));
            }
            stakes = safe_add(stakes, position.stake)?;
            coll = safe_add(coll, position.collateral)?;
            debt = safe_add(debt, position.debt)?;
        }

        if stakes != self.redistribution.total_stakes() {
            return Err(Error::InvariantViolation(format!(
                "stakes sum {} differs from total {}",
                stakes,
                self.redistribution.total_stakes()
            )));
        }
        if coll != self.positions.active_collateral() || debt != self.positions.active_debt() {
            return Err(Error::InvariantViolation(
                "active totals out of sync with positions".into(),
            ));
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SERIALIZATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Hash of the system aggregates
    pub fn state_hash(&self) -> Result<String> {
        let mut data = Vec::new();
        for value in [
            self.positions.active_collateral(),
            self.positions.active_debt(),
            self.redistribution.l_coll(),
            self.redistribution.l_debt(),
            self.redistribution.total_stakes(),
            self.surplus.total(),
        ] {
            for limb in value.0.iter().rev() {
                data.extend_from_slice(&limb.to_be_bytes());
            }
        }
        data.extend_from_slice(&(self.positions.active_count() as u64).to_be_bytes());
        data.extend_from_slice(self.pool.state_hash().as_bytes());
        Ok(sha256_hex(&data))
    }
}

/// Checkpoints of every component
#[derive(Debug, Clone)]
pub struct StateCheckpoint {
    positions: PositionCheckpoint,
    sorted: usize,
    redistribution: RedistributionLedger,
    pool: PoolCheckpoint,
    surplus: (usize, U256),
}

impl Checkpointed for SystemState {
    type Checkpoint = StateCheckpoint;

    fn checkpoint(&mut self) -> StateCheckpoint {
        StateCheckpoint {
            positions: self.positions.checkpoint(),
            sorted: self.sorted.checkpoint(),
            redistribution: self.redistribution.checkpoint(),
            pool: self.pool.checkpoint(),
            surplus: self.surplus.checkpoint(),
        }
    }

    fn commit(&mut self, checkpoint: StateCheckpoint) {
        self.positions.commit(checkpoint.positions);
        self.sorted.commit(checkpoint.sorted);
        self.redistribution.commit(checkpoint.redistribution);
        self.pool.commit(checkpoint.pool);
        self.surplus.commit(checkpoint.surplus);
    }

    fn rollback(&mut self, checkpoint: StateCheckpoint) {
        self.positions.rollback(checkpoint.positions);
        self.sorted.rollback(checkpoint.sorted);
        self.redistribution.rollback(checkpoint.redistribution);
        self.pool.rollback(checkpoint.pool);
        self.surplus.rollback(checkpoint.surplus);
    }
}
