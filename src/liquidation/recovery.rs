//! Recovery Mode gate.
//!
//! Recovery Mode is active while the Total Collateralization Ratio (TCR) is
//! below the Critical Collateralization Ratio (CCR). In this mode:
//!
//! 1. **Liquidation policy changes**: positions below the MCR keep any debt
//!    the pool cannot absorb, and the lowest position may be liquidated even
//!    above the MCR
//! 2. **Borrowing restricted**: new positions need ICR >= CCR and debt
//!    increases may not lower a position's ICR
//! 3. **Withdrawal restricted**: collateral withdrawals and closing are blocked
//!
//! The gate only decides; it never mutates positions or pools.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::config::ProtocolParams;
use crate::error::{Error, Result};
use crate::utils::constants::{MAX_RECOVERY_EVENTS, ONE_HUNDRED_PERCENT};
use crate::utils::math::compute_cr;

// ═══════════════════════════════════════════════════════════════════════════════
// RECOVERY MODE STATUS
// ═══════════════════════════════════════════════════════════════════════════════

/// Current recovery mode status and metrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryModeStatus {
    /// Whether recovery mode is active
    pub is_active: bool,
    /// Current Total Collateralization Ratio (1e18 = 100%)
    pub tcr: U256,
    /// TCR needed to exit recovery mode
    pub ccr: U256,
    /// Entire system collateral, including pending redistribution
    pub total_collateral: U256,
    /// Entire system debt, including pending redistribution
    pub total_debt: U256,
    /// Price used for the calculation
    pub price: U256,
}

/// Event when recovery mode status changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryModeEvent {
    /// Whether entering (true) or exiting (false) recovery mode
    pub entering: bool,
    /// TCR at the time of change
    pub tcr: U256,
    /// Timestamp
    pub timestamp: u64,
    /// Block height
    pub block_height: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION POLICY
// ═══════════════════════════════════════════════════════════════════════════════

/// What a liquidation does with a candidate position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidationPolicy {
    /// Not liquidatable this round
    Skip,
    /// Normal mode, ICR < MCR: offset what the pool covers, redistribute the rest, close
    OffsetAndRedistribute,
    /// Recovery mode, ICR < 100%: redistribute everything, close
    RedistributeOnly,
    /// Recovery mode, 100% <= ICR < MCR: offset what the pool covers; any
    /// uncovered debt stays in the position
    OffsetUpToPool,
    /// Recovery mode, ICR >= MCR on the lowest position: offset the whole debt
    /// against collateral worth `debt × MCR`, the rest becomes claimable surplus
    CappedOffset,
}

impl LiquidationPolicy {
    /// True if the policy changes state
    pub fn is_liquidation(&self) -> bool {
        !matches!(self, LiquidationPolicy::Skip)
    }
}

/// Inputs for classifying one candidate
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    /// Candidate's ICR including pending redistribution
    pub icr: U256,
    /// Candidate's debt including pending redistribution
    pub debt: U256,
    /// Whether the candidate has the lowest ratio among active positions
    pub is_lowest: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECOVERY MODE GATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Mode detection, liquidation policy and borrower-action validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryModeGate {
    mcr: U256,
    ccr: U256,
    /// Mode at the last recorded check
    active: bool,
    /// Historical recovery mode events
    history: Vec<RecoveryModeEvent>,
    /// Maximum history to keep
    max_history: usize,
}

impl RecoveryModeGate {
    /// Create a gate from protocol parameters
    pub fn new(params: &ProtocolParams) -> Self {
        Self {
            mcr: params.mcr(),
            ccr: params.ccr(),
            active: false,
            history: Vec::new(),
            max_history: MAX_RECOVERY_EVENTS,
        }
    }

    /// Minimum collateral ratio
    pub fn mcr(&self) -> U256 {
        self.mcr
    }

    /// Critical collateral ratio
    pub fn ccr(&self) -> U256 {
        self.ccr
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TCR CALCULATIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Total collateralization ratio; unbounded when there is no debt
    pub fn calculate_tcr(total_collateral: U256, total_debt: U256, price: U256) -> Result<U256> {
        compute_cr(total_collateral, total_debt, price)
    }

    /// Check if a TCR means recovery mode
    pub fn is_recovery_mode(&self, tcr: U256) -> bool {
        tcr < self.ccr
    }

    /// Status snapshot for reporting
    pub fn status(&self, total_collateral: U256, total_debt: U256, price: U256) -> Result<RecoveryModeStatus> {
        let tcr = Self::calculate_tcr(total_collateral, total_debt, price)?;
        Ok(RecoveryModeStatus {
            is_active: self.is_recovery_mode(tcr),
            tcr,
            ccr: self.ccr,
            total_collateral,
            total_debt,
            price,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIQUIDATION POLICY
    // ═══════════════════════════════════════════════════════════════════════════

    /// Pick the liquidation branch for a candidate
    ///
    /// `pool_deposits` is the stability pool's current deposit total and `tcr`
    /// the system ratio before this liquidation.
    pub fn classify(
        &self,
        recovery_mode: bool,
        candidate: &Candidate,
        pool_deposits: U256,
        tcr: U256,
    ) -> LiquidationPolicy {
        if !recovery_mode {
            return if candidate.icr < self.mcr {
                LiquidationPolicy::OffsetAndRedistribute
            } else {
                LiquidationPolicy::Skip
            };
        }

        if candidate.icr < ONE_HUNDRED_PERCENT {
            LiquidationPolicy::RedistributeOnly
        } else if candidate.icr < self.mcr {
            if pool_deposits.is_zero() {
                LiquidationPolicy::Skip
            } else {
                LiquidationPolicy::OffsetUpToPool
            }
        } else if candidate.is_lowest
            && !pool_deposits.is_zero()
            && candidate.debt <= pool_deposits
            && candidate.icr < tcr
        {
            LiquidationPolicy::CappedOffset
        } else {
            LiquidationPolicy::Skip
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BORROWER VALIDATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Validate opening a position
    pub fn validate_open(&self, recovery_mode: bool, icr: U256, new_tcr: U256) -> Result<()> {
        if recovery_mode {
            return self.require_icr_at_least(icr, self.ccr);
        }
        self.require_icr_at_least(icr, self.mcr)?;
        self.require_tcr_at_least_ccr(new_tcr)
    }

    /// Validate adjusting a position
    ///
    /// In recovery mode collateral may not be withdrawn, and a debt increase
    /// must leave the position at or above the CCR without lowering its ICR.
    /// Otherwise the position must stay at or above the MCR and the system at
    /// or above the CCR.
    pub fn validate_adjust(
        &self,
        recovery_mode: bool,
        old_icr: U256,
        new_icr: U256,
        coll_withdrawal: bool,
        debt_increase: bool,
        new_tcr: U256,
    ) -> Result<()> {
        if recovery_mode {
            if coll_withdrawal {
                return Err(Error::CollateralWithdrawalInRecoveryMode);
            }
            if debt_increase {
                self.require_icr_at_least(new_icr, self.ccr)?;
                self.require_icr_at_least(new_icr, old_icr)?;
            }
            return Ok(());
        }
        self.require_icr_at_least(new_icr, self.mcr)?;
        self.require_tcr_at_least_ccr(new_tcr)
    }

    /// Validate closing a position
    pub fn validate_close(&self, recovery_mode: bool, new_tcr: U256) -> Result<()> {
        if recovery_mode {
            return Err(Error::RecoveryMode);
        }
        self.require_tcr_at_least_ccr(new_tcr)
    }

    fn require_icr_at_least(&self, icr: U256, required: U256) -> Result<()> {
        if icr < required {
            return Err(Error::InsufficientCollateralRatio { icr, required });
        }
        Ok(())
    }

    fn require_tcr_at_least_ccr(&self, tcr: U256) -> Result<()> {
        if tcr < self.ccr {
            return Err(Error::SystemRatioTooLow { tcr, ccr: self.ccr });
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STATUS AND HISTORY
    // ═══════════════════════════════════════════════════════════════════════════

    /// Record the mode seen at a check; returns true on a transition
    pub fn record_mode(&mut self, tcr: U256, timestamp: u64, block_height: u64) -> bool {
        let recovery = self.is_recovery_mode(tcr);
        if recovery == self.active {
            return false;
        }
        self.active = recovery;

        if recovery {
            warn!(%tcr, block_height, "Entering Recovery Mode");
        } else {
            info!(%tcr, block_height, "Exiting Recovery Mode");
        }

        self.history.push(RecoveryModeEvent {
            entering: recovery,
            tcr,
            timestamp,
            block_height,
        });
        if self.history.len() > self.max_history {
            self.history.remove(0);
        }
        true
    }

    /// Mode at the last recorded check
    pub fn was_recovery_mode(&self) -> bool {
        self.active
    }

    /// Get recovery mode history
    pub fn history(&self) -> &[RecoveryModeEvent] {
        &self.history
    }

    /// Get last event
    pub fn last_event(&self) -> Option<&RecoveryModeEvent> {
        self.history.last()
    }
}
