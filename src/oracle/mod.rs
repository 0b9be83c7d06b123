//! Oracle module for the collateral price.
//!
//! Provides the [`PriceOracle`] trait the protocol reads from, a
//! primary/fallback [`PriceFeed`], and a fixed [`StaticPrice`].

pub mod price_feed;

pub use price_feed::*;
