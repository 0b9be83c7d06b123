//! Liquidation module.
//!
//! This module settles under-collateralized positions:
//! - Liquidation engine and its policy branches
//! - Redistribution of uncovered debt over active stakes
//! - Recovery mode detection and borrower validation
//! - Sorted index of positions by nominal ratio
//! - Collateral surplus from capped liquidations

pub mod engine;
pub mod recovery;
pub mod redistribution;
pub mod sorted;
pub mod surplus;

pub use engine::*;
pub use recovery::*;
pub use redistribution::*;
pub use sorted::*;
pub use surplus::*;
