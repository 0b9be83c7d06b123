//! Utility modules shared across the settlement engine:
//! - Constants
//! - 256-bit fixed-point arithmetic
//! - Identifiers and hashing
//! - Undo journals for in-place rollback

pub mod constants;
pub mod ids;
pub mod journal;
pub mod math;

pub use constants::*;
pub use ids::*;
pub use journal::*;
pub use math::*;
