//! Collateral surplus from capped Recovery Mode liquidations.
//!
//! When a position at or above the minimum ratio is liquidated in Recovery
//! Mode, only collateral worth `debt × MCR` is offset. The rest stays claimable
//! by the former owner here.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::utils::ids::AccountId;
use crate::utils::journal::{Checkpointed, JournaledMap};
use crate::utils::math::{safe_add, safe_sub};

/// Claimable collateral per former position owner
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollSurplusPool {
    balances: JournaledMap<AccountId, U256>,
    total: U256,
}

impl CollSurplusPool {
    /// Create an empty surplus pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit surplus to an owner
    pub fn account_surplus(&mut self, owner: AccountId, amount: U256) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let total = safe_add(self.total, amount)?;
        let balance = safe_add(self.balance_of(&owner), amount)?;
        self.balances.insert(owner, balance);
        self.total = total;
        Ok(())
    }

    /// Withdraw an owner's whole surplus
    pub fn claim(&mut self, owner: &AccountId) -> Result<U256> {
        let amount = self.balances.get(owner).copied().unwrap_or_default();
        if amount.is_zero() {
            return Err(Error::InvalidParameter {
                name: "owner".into(),
                reason: "no collateral surplus to claim".into(),
            });
        }
        self.total = safe_sub(self.total, amount)?;
        self.balances.remove(owner);
        info!(owner = %owner.short(), %amount, "Collateral surplus claimed");
        Ok(amount)
    }

    /// Surplus claimable by an owner
    pub fn balance_of(&self, owner: &AccountId) -> U256 {
        self.balances.get(owner).copied().unwrap_or_default()
    }

    /// Total unclaimed surplus
    pub fn total(&self) -> U256 {
        self.total
    }
}

impl Checkpointed for CollSurplusPool {
    type Checkpoint = (usize, U256);

    fn checkpoint(&mut self) -> Self::Checkpoint {
        (self.balances.checkpoint(), self.total)
    }

    fn commit(&mut self, (balances, _): Self::Checkpoint) {
        self.balances.commit(balances);
    }

    fn rollback(&mut self, (balances, total): Self::Checkpoint) {
        self.balances.rollback(balances);
        self.total = total;
    }
}
