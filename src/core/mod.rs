//! Core modules for the settlement engine.
//!
//! This module contains the fundamental building blocks:
//! - Configuration and protocol parameters
//! - Position records and active-pool totals

pub mod config;
pub mod position;

pub use config::*;
pub use position::*;
