//! Depositor and front-end records.
//!
//! A record stores the amount last committed plus a [`LedgerSnapshot`]; the
//! current balance and gains are derived from the ledger on demand.

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::stability::ledger::{FixedPointLedger, LedgerSnapshot};
use crate::utils::constants::DECIMAL_PRECISION;
use crate::utils::ids::AccountId;
use crate::utils::math::mul_div;

// ═══════════════════════════════════════════════════════════════════════════════
// DEPOSITOR RECORD
// ═══════════════════════════════════════════════════════════════════════════════

/// A stability pool deposit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositorRecord {
    /// Amount committed at the last deposit change
    pub initial_deposit: U256,
    /// Front end the deposit was made through, fixed at first deposit
    pub front_end_tag: Option<AccountId>,
    /// Ledger position at the last deposit change
    pub snapshot: LedgerSnapshot,
}

impl DepositorRecord {
    /// Create a record at the current ledger position
    pub fn new(
        initial_deposit: U256,
        front_end_tag: Option<AccountId>,
        ledger: &FixedPointLedger,
    ) -> Self {
        Self {
            initial_deposit,
            front_end_tag,
            snapshot: ledger.snapshot(),
        }
    }

    /// Current balance after absorbed losses
    pub fn compounded(&self, ledger: &FixedPointLedger) -> Result<U256> {
        ledger.compounded(self.initial_deposit, &self.snapshot)
    }

    /// Collateral earned since the last change
    pub fn collateral_gain(&self, ledger: &FixedPointLedger) -> Result<U256> {
        ledger.collateral_gain(self.initial_deposit, &self.snapshot)
    }

    /// Reward tokens earned since the last change, before any kickback split
    pub fn gross_reward_gain(&self, ledger: &FixedPointLedger) -> Result<U256> {
        ledger.reward_gain(self.initial_deposit, &self.snapshot)
    }

    /// Commit a new amount and move the snapshot to the current ledger position
    pub fn refresh(&mut self, new_deposit: U256, ledger: &FixedPointLedger) {
        self.initial_deposit = new_deposit;
        self.snapshot = ledger.snapshot();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FRONT END
// ═══════════════════════════════════════════════════════════════════════════════

/// A registered front end and its kickback rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontEndRecord {
    /// Share of reward gains passed on to tagged depositors (1e18 = 100%)
    pub kickback_rate: U256,
    /// Block height of registration
    pub registered_at: u64,
}

impl FrontEndRecord {
    /// Depositor's share of a gross reward gain
    pub fn depositor_share(&self, gross: U256) -> Result<U256> {
        mul_div(self.kickback_rate, gross, DECIMAL_PRECISION)
    }

    /// Front end's own share of a gross reward gain
    pub fn front_end_share(&self, gross: U256) -> Result<U256> {
        mul_div(DECIMAL_PRECISION - self.kickback_rate, gross, DECIMAL_PRECISION)
    }
}

/// Aggregate deposit routed through one front end
///
/// Compounds exactly like a deposit; the collateral sum is never read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontEndStake {
    /// Stake committed at the last change
    pub stake: U256,
    /// Ledger position at the last change
    pub snapshot: LedgerSnapshot,
}

impl FrontEndStake {
    /// Create a stake at the current ledger position
    pub fn new(stake: U256, ledger: &FixedPointLedger) -> Self {
        let mut snapshot = ledger.snapshot();
        snapshot.s = U256::zero();
        Self { stake, snapshot }
    }

    /// Current stake after absorbed losses
    pub fn compounded(&self, ledger: &FixedPointLedger) -> Result<U256> {
        ledger.compounded(self.stake, &self.snapshot)
    }

    /// Reward tokens earned by the whole stake since the last change
    pub fn gross_reward_gain(&self, ledger: &FixedPointLedger) -> Result<U256> {
        ledger.reward_gain(self.stake, &self.snapshot)
    }
}
