//! # cdp-settlement
//!
//! Liquidation settlement and stability-pool compounding ledger for a
//! collateralized-debt stablecoin.
//!
//! ## Architecture
//!
//! - **Core**: Protocol parameters and position records
//! - **Stability**: Product/sum ledger, deposits, offsets and reward issuance
//! - **Liquidation**: Policy engine, redistribution, recovery mode
//! - **Oracle**: Price source with primary/fallback and last-good price
//! - **Protocol**: Single-writer state with atomic operations
//!
//! ## Example
//!
//! ```rust,ignore
//! use cdp_settlement::prelude::*;
//!
//! let mut protocol = Protocol::new(ProtocolParams::default(), Box::new(StaticPrice(price)))?;
//! protocol.open_position(owner, coll, debt)?;
//! protocol.provide_to_pool(depositor, amount, None)?;
//! let outcomes = protocol.liquidate_batch(10)?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    trivial_casts,
    unused_lifetimes,
    unused_qualifications
)]

pub mod core;
pub mod error;
pub mod liquidation;
pub mod oracle;
pub mod protocol;
pub mod stability;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{
        config::ProtocolParams,
        position::{Position, PositionStatus},
    };
    pub use crate::error::{Error, Result};
    pub use crate::liquidation::{
        engine::{LiquidationEngine, LiquidationOutcome},
        recovery::{LiquidationPolicy, RecoveryModeGate},
    };
    pub use crate::oracle::price_feed::{PriceData, PriceFeed, PriceOracle, StaticPrice};
    pub use crate::protocol::{
        state::SystemState,
        system::{PositionAdjustment, Protocol, SharedProtocol},
    };
    pub use crate::stability::pool::StabilityPool;
    pub use crate::utils::{ids::AccountId, math::dec};
    pub use primitive_types::U256;
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
