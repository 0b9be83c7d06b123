//! Stability pool module.
//!
//! - Product/sum compounding ledger
//! - Depositor and front-end records
//! - Offset processing with error feedback
//! - Reward issuance
//! - The pool itself

pub mod deposit;
pub mod issuance;
pub mod ledger;
pub mod offset;
pub mod pool;

pub use deposit::*;
pub use issuance::*;
pub use ledger::*;
pub use offset::*;
pub use pool::*;
