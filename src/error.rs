//! Error types for the settlement engine.
//!
//! Every rejected action surfaces as one of these variants. Checks run before
//! any state is mutated, so an error never leaves a partially applied
//! liquidation behind.

use primitive_types::U256;
use thiserror::Error;

/// Result type alias for settlement operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the settlement engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ═══════════════════════════════════════════════════════════════════
    // Position Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Position not found in the ledger
    #[error("Position not found: {0}")]
    PositionNotFound(String),

    /// Position is already open
    #[error("Position already active: {0}")]
    PositionAlreadyActive(String),

    /// Position exists but is closed
    #[error("Position is not active: {0}")]
    PositionNotActive(String),

    /// Action would leave the position below the mode-appropriate minimum ratio
    #[error("Collateral ratio {icr} below required {required} (1e18 = 100%)")]
    InsufficientCollateralRatio {
        /// Resulting individual collateral ratio
        icr: U256,
        /// Minimum ratio required in the current mode
        required: U256,
    },

    /// Action would push the system total ratio below the critical ratio
    #[error("System collateral ratio {tcr} would fall below critical {ccr}")]
    SystemRatioTooLow {
        /// Resulting total collateral ratio
        tcr: U256,
        /// Critical collateral ratio
        ccr: U256,
    },

    /// Collateral withdrawals are disabled in Recovery Mode
    #[error("Collateral withdrawal not allowed in Recovery Mode")]
    CollateralWithdrawalInRecoveryMode,

    /// Position closure by owner is disabled in Recovery Mode
    #[error("Operation not allowed in Recovery Mode")]
    RecoveryMode,

    /// Debt below protocol minimum
    #[error("Debt {amount} below minimum {minimum}")]
    DebtBelowMinimum {
        /// Resulting debt
        amount: U256,
        /// Protocol minimum debt
        minimum: U256,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Liquidation Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Candidate is above the liquidation threshold for the current mode
    #[error("Nothing to liquidate: {0}")]
    NothingToLiquidate(String),

    /// Refusal to liquidate or close the last active position
    #[error("Cannot remove the sole remaining active position")]
    SoleRemainingPosition,

    /// Pool withdrawals are blocked while liquidatable positions exist
    #[error("Withdrawal blocked while positions below the minimum ratio exist")]
    UndercollateralizedPositionsExist,

    // ═══════════════════════════════════════════════════════════════════
    // Oracle Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Both price sources are stale or broken
    #[error("Price oracle untrusted, last good price {last_good_price}")]
    PriceOracleUntrusted {
        /// Last known-good price
        last_good_price: U256,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Stability Pool Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Depositor has no deposit in the pool
    #[error("No stability pool deposit for {0}")]
    NoDeposit(String),

    /// Depositor has no collateral gain to move
    #[error("No collateral gain for {0}")]
    NoCollateralGain(String),

    /// Front end tag is not registered
    #[error("Front end not registered: {0}")]
    FrontEndNotRegistered(String),

    /// Front end is already registered
    #[error("Front end already registered: {0}")]
    FrontEndAlreadyRegistered(String),

    /// A registered front end cannot deposit
    #[error("Registered front end cannot hold a deposit: {0}")]
    DepositorIsFrontEnd(String),

    // ═══════════════════════════════════════════════════════════════════
    // Validation Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Invalid input parameter
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Amount is zero
    #[error("Amount cannot be zero")]
    ZeroAmount,

    /// Overflow in calculation
    #[error("Arithmetic overflow in {operation}")]
    Overflow {
        /// Operation that overflowed
        operation: String,
    },

    /// Underflow in calculation
    #[error("Arithmetic underflow in {operation}")]
    Underflow {
        /// Operation that underflowed
        operation: String,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Protocol Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Invariant violation detected
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    // ═══════════════════════════════════════════════════════════════════
    // Serialization Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // ═══════════════════════════════════════════════════════════════════
    // Internal Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Lock acquisition failed
    #[error("Failed to acquire lock")]
    Lock,
}

impl Error {
    /// Returns true if the caller can retry with different parameters
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InsufficientCollateralRatio { .. }
                | Error::SystemRatioTooLow { .. }
                | Error::DebtBelowMinimum { .. }
                | Error::PriceOracleUntrusted { .. }
                | Error::UndercollateralizedPositionsExist
        )
    }

    /// Returns true for the normal "nothing happened" signal of liquidation
    pub fn is_no_op(&self) -> bool {
        matches!(self, Error::NothingToLiquidate(_))
    }

    /// Returns true if this is a critical error requiring immediate attention
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Error::InvariantViolation(_) | Error::Overflow { .. } | Error::Underflow { .. }
        )
    }

    /// Returns the error code for external systems
    pub fn code(&self) -> u32 {
        match self {
            // Position errors: 1xxx
            Error::PositionNotFound(_) => 1001,
            Error::PositionAlreadyActive(_) => 1002,
            Error::PositionNotActive(_) => 1003,
            Error::InsufficientCollateralRatio { .. } => 1004,
            Error::SystemRatioTooLow { .. } => 1005,
            Error::CollateralWithdrawalInRecoveryMode => 1006,
            Error::RecoveryMode => 1007,
            Error::DebtBelowMinimum { .. } => 1008,

            // Liquidation errors: 2xxx
            Error::NothingToLiquidate(_) => 2001,
            Error::SoleRemainingPosition => 2002,
            Error::UndercollateralizedPositionsExist => 2003,

            // Oracle errors: 3xxx
            Error::PriceOracleUntrusted { .. } => 3001,

            // Stability pool errors: 4xxx
            Error::NoDeposit(_) => 4001,
            Error::NoCollateralGain(_) => 4002,
            Error::FrontEndNotRegistered(_) => 4003,
            Error::FrontEndAlreadyRegistered(_) => 4004,
            Error::DepositorIsFrontEnd(_) => 4005,

            // Validation errors: 5xxx
            Error::InvalidParameter { .. } => 5001,
            Error::ZeroAmount => 5002,
            Error::Overflow { .. } => 5003,
            Error::Underflow { .. } => 5004,

            // Protocol errors: 6xxx
            Error::InvariantViolation(_) => 6001,
            Error::Config(_) => 6002,

            // Serialization errors: 7xxx
            Error::Serialization(_) => 7001,
            Error::Deserialization(_) => 7002,

            // Internal errors: 9xxx
            Error::Lock => 9001,
        }
    }
}
