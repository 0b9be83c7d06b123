//! Protocol module - state ownership and orchestration.
//!
//! [`SystemState`] holds every accumulator; [`Protocol`] is the single writer
//! that validates borrower actions, reads the price and commits each
//! operation atomically. [`SharedProtocol`] puts it behind a lock.

pub mod state;
pub mod system;

pub use state::*;
pub use system::*;
