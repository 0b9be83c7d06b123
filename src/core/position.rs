//! Position records and the active-pool totals.
//!
//! Each owner holds at most one position. The manager keeps the running
//! collateral and debt of all active positions so system-wide ratios never
//! require iterating the ledger.

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::utils::ids::AccountId;
use crate::utils::journal::{Checkpointed, JournaledMap};
use crate::utils::math::{compute_cr, compute_nominal_cr, safe_add, safe_sub};

// ═══════════════════════════════════════════════════════════════════════════════
// POSITION STATUS
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle status of a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    /// Never opened
    NonExistent,
    /// Open and carrying debt
    Active,
    /// Repaid and closed by its owner
    ClosedByOwner,
    /// Closed by a liquidation
    ClosedByLiquidation,
}

impl PositionStatus {
    /// Check if the position is open
    pub fn is_active(&self) -> bool {
        matches!(self, PositionStatus::Active)
    }

    /// Check if the position is closed
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PositionStatus::ClosedByOwner | PositionStatus::ClosedByLiquidation
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// POSITION
// ═══════════════════════════════════════════════════════════════════════════════

/// Redistribution accumulator values at the position's last touch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSnapshot {
    /// `L_coll` at last touch
    pub coll: U256,
    /// `L_debt` at last touch
    pub debt: U256,
}

/// A borrower's collateral and debt record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Owner, also the position key
    pub owner: AccountId,
    /// Collateral held (excluding pending redistribution)
    pub collateral: U256,
    /// Debt owed (excluding pending redistribution)
    pub debt: U256,
    /// Redistribution weight
    pub stake: U256,
    /// Lifecycle status
    pub status: PositionStatus,
    /// Accumulator snapshot taken at last touch
    pub reward_snapshot: RewardSnapshot,
    /// Block height when opened
    pub opened_at: u64,
    /// Block height of last modification
    pub last_updated: u64,
}

impl Position {
    /// Create an active position with no stake yet
    pub fn new(owner: AccountId, collateral: U256, debt: U256, block_height: u64) -> Self {
        Self {
            owner,
            collateral,
            debt,
            stake: U256::zero(),
            status: PositionStatus::Active,
            reward_snapshot: RewardSnapshot::default(),
            opened_at: block_height,
            last_updated: block_height,
        }
    }

    /// Check if the position is open
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Individual collateral ratio at `price` (recorded amounts only)
    pub fn icr(&self, price: U256) -> Result<U256> {
        compute_cr(self.collateral, self.debt, price)
    }

    /// Nominal collateral ratio (ordering key)
    pub fn nicr(&self) -> Result<U256> {
        compute_nominal_cr(self.collateral, self.debt)
    }

    fn ensure_active(&self) -> Result<()> {
        if !self.is_active() {
            return Err(Error::PositionNotActive(self.owner.to_hex()));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// POSITION MANAGER
// ═══════════════════════════════════════════════════════════════════════════════

/// Ledger of all positions plus active-pool totals
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositionManager {
    /// Positions by owner
    positions: JournaledMap<AccountId, Position>,
    /// Sum of collateral over active positions
    active_collateral: U256,
    /// Sum of debt over active positions
    active_debt: U256,
    /// Number of active positions
    active_count: usize,
}

impl PositionManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly opened position
    ///
    /// An owner whose previous position was closed may open again.
    pub fn open(&mut self, position: Position) -> Result<()> {
        if let Some(existing) = self.positions.get(&position.owner) {
            if existing.is_active() {
                return Err(Error::PositionAlreadyActive(position.owner.to_hex()));
            }
        }
        if !position.is_active() {
            return Err(Error::PositionNotActive(position.owner.to_hex()));
        }

        self.active_collateral = safe_add(self.active_collateral, position.collateral)?;
        self.active_debt = safe_add(self.active_debt, position.debt)?;
        self.active_count += 1;
        self.positions.insert(position.owner, position);
        Ok(())
    }

    /// Get a position by owner
    pub fn get(&self, owner: &AccountId) -> Option<&Position> {
        self.positions.get(owner)
    }

    /// Get an active position, failing if missing or closed
    pub fn get_active(&self, owner: &AccountId) -> Result<&Position> {
        let position = self
            .positions
            .get(owner)
            .ok_or_else(|| Error::PositionNotFound(owner.to_hex()))?;
        position.ensure_active()?;
        Ok(position)
    }

    /// Mutable access to an active position
    ///
    /// Callers must not change collateral or debt through this reference;
    /// use the increase/decrease methods so the totals stay in sync.
    pub fn get_active_mut(&mut self, owner: &AccountId) -> Result<&mut Position> {
        let position = self
            .positions
            .get_mut(owner)
            .ok_or_else(|| Error::PositionNotFound(owner.to_hex()))?;
        position.ensure_active()?;
        Ok(position)
    }

    /// Status of a position, `NonExistent` if never opened
    pub fn status(&self, owner: &AccountId) -> PositionStatus {
        self.positions
            .get(owner)
            .map(|p| p.status)
            .unwrap_or(PositionStatus::NonExistent)
    }

    /// Add collateral to an active position
    pub fn increase_collateral(&mut self, owner: &AccountId, amount: U256) -> Result<()> {
        let total = safe_add(self.active_collateral, amount)?;
        let position = self.get_active_mut(owner)?;
        position.collateral = safe_add(position.collateral, amount)?;
        self.active_collateral = total;
        Ok(())
    }

    /// Remove collateral from an active position
    pub fn decrease_collateral(&mut self, owner: &AccountId, amount: U256) -> Result<()> {
        let total = safe_sub(self.active_collateral, amount)?;
        let position = self.get_active_mut(owner)?;
        position.collateral = safe_sub(position.collateral, amount)?;
        self.active_collateral = total;
        Ok(())
    }

    /// Add debt to an active position
    pub fn increase_debt(&mut self, owner: &AccountId, amount: U256) -> Result<()> {
        let total = safe_add(self.active_debt, amount)?;
        let position = self.get_active_mut(owner)?;
        position.debt = safe_add(position.debt, amount)?;
        self.active_debt = total;
        Ok(())
    }

    /// Remove debt from an active position
    pub fn decrease_debt(&mut self, owner: &AccountId, amount: U256) -> Result<()> {
        let total = safe_sub(self.active_debt, amount)?;
        let position = self.get_active_mut(owner)?;
        position.debt = safe_sub(position.debt, amount)?;
        self.active_debt = total;
        Ok(())
    }

    /// Stamp the block height of the last modification
    pub fn touch(&mut self, owner: &AccountId, block_height: u64) -> Result<()> {
        self.get_active_mut(owner)?.last_updated = block_height;
        Ok(())
    }

    /// Close an active position, removing its remaining amounts from the totals
    ///
    /// Returns the collateral and debt the position held when closed. Stake
    /// bookkeeping is the caller's responsibility.
    pub fn close(&mut self, owner: &AccountId, status: PositionStatus) -> Result<(U256, U256)> {
        if !status.is_terminal() {
            return Err(Error::InvalidParameter {
                name: "status".into(),
                reason: format!("{:?} is not a closed status", status),
            });
        }

        let (coll, debt) = {
            let position = self.get_active(owner)?;
            (position.collateral, position.debt)
        };
        let new_coll = safe_sub(self.active_collateral, coll)?;
        let new_debt = safe_sub(self.active_debt, debt)?;

        let position = self.get_active_mut(owner)?;
        position.collateral = U256::zero();
        position.debt = U256::zero();
        position.stake = U256::zero();
        position.reward_snapshot = RewardSnapshot::default();
        position.status = status;

        self.active_collateral = new_coll;
        self.active_debt = new_debt;
        self.active_count -= 1;
        Ok((coll, debt))
    }

    /// Number of active positions
    pub fn active_count(&self) -> usize {
        self.active_count
    }

    /// Collateral held by active positions
    pub fn active_collateral(&self) -> U256 {
        self.active_collateral
    }

    /// Debt owed by active positions
    pub fn active_debt(&self) -> U256 {
        self.active_debt
    }

    /// Iterate over active positions
    pub fn active(&self) -> impl Iterator<Item = &Position> {
        self.positions.values().filter(|p| p.is_active())
    }
}

/// Journal position plus the active totals at a checkpoint
#[derive(Debug, Clone, Copy)]
pub struct PositionCheckpoint {
    journal: usize,
    active_collateral: U256,
    active_debt: U256,
    active_count: usize,
}

impl Checkpointed for PositionManager {
    type Checkpoint = PositionCheckpoint;

    fn checkpoint(&mut self) -> PositionCheckpoint {
        PositionCheckpoint {
            journal: self.positions.checkpoint(),
            active_collateral: self.active_collateral,
            active_debt: self.active_debt,
            active_count: self.active_count,
        }
    }

    fn commit(&mut self, checkpoint: PositionCheckpoint) {
        self.positions.commit(checkpoint.journal);
    }

    fn rollback(&mut self, checkpoint: PositionCheckpoint) {
        self.positions.rollback(checkpoint.journal);
        self.active_collateral = checkpoint.active_collateral;
        self.active_debt = checkpoint.active_debt;
        self.active_count = checkpoint.active_count;
    }
}
