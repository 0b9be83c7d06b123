//! Price feed implementation.
//!
//! This module provides the price the liquidation engine reads:
//! - Primary and fallback source reports
//! - Staleness and deviation checks
//! - Last-good-price tracking when both sources fail

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::config::ProtocolParams;
use crate::error::{Error, Result};
use crate::utils::constants::{BPS_DIVISOR, MAX_PRICE_DEVIATION_BPS, MAX_PRICE_STALENESS_SECS};
use crate::utils::math::{abs_diff, mul_div};

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE DATA
// ═══════════════════════════════════════════════════════════════════════════════

/// A single price report, 18-decimal fixed point
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceData {
    /// Price of one collateral unit in debt units
    pub price: U256,
    /// Unix timestamp when the price was recorded
    pub timestamp: u64,
}

impl PriceData {
    /// Create a new price data point
    pub fn new(price: U256, timestamp: u64) -> Self {
        Self { price, timestamp }
    }

    /// Check if price is fresh
    pub fn is_fresh(&self, current_time: u64, max_age: u64) -> bool {
        current_time.saturating_sub(self.timestamp) <= max_age
    }

    /// Get age of price in seconds
    pub fn age(&self, current_time: u64) -> u64 {
        current_time.saturating_sub(self.timestamp)
    }
}

/// Price handed to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceReading {
    /// Price to use
    pub price: U256,
    /// False when neither source could be trusted and `price` is the last good one
    pub trusted: bool,
}

impl PriceReading {
    /// Price for operations that must fail closed on an untrusted feed
    pub fn require_trusted(&self) -> Result<U256> {
        if !self.trusted {
            return Err(Error::PriceOracleUntrusted {
                last_good_price: self.price,
            });
        }
        Ok(self.price)
    }
}

/// Source of the collateral price
pub trait PriceOracle: Send + Sync {
    /// Read the price at `now`, updating any internal last-good state
    fn read_price(&mut self, now: u64) -> PriceReading;
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATIC PRICE
// ═══════════════════════════════════════════════════════════════════════════════

/// Fixed, always-trusted price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticPrice(pub U256);

impl PriceOracle for StaticPrice {
    fn read_price(&mut self, _now: u64) -> PriceReading {
        PriceReading {
            price: self.0,
            trusted: true,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE FEED
// ═══════════════════════════════════════════════════════════════════════════════

/// Which source the feed is relying on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedStatus {
    /// Primary report is fresh and plausible
    PrimaryWorking,
    /// Primary failed, fallback in use
    UsingFallback,
    /// Both failed, serving the last good price
    Untrusted,
}

/// Primary/fallback price feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceFeed {
    /// Latest primary report
    primary: Option<PriceData>,
    /// Latest fallback report
    fallback: Option<PriceData>,
    /// Last price that passed validation
    last_good_price: U256,
    /// Source in use at the last read
    status: FeedStatus,
    /// Maximum price staleness in seconds
    max_staleness: u64,
    /// Maximum allowed deviation from the last good price
    max_deviation_bps: u64,
}

impl Default for PriceFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceFeed {
    /// Create a new price feed
    pub fn new() -> Self {
        Self::with_params(MAX_PRICE_STALENESS_SECS, MAX_PRICE_DEVIATION_BPS)
    }

    /// Create with custom parameters
    pub fn with_params(max_staleness: u64, max_deviation_bps: u64) -> Self {
        Self {
            primary: None,
            fallback: None,
            last_good_price: U256::zero(),
            status: FeedStatus::PrimaryWorking,
            max_staleness,
            max_deviation_bps,
        }
    }

    /// Create from protocol parameters
    pub fn from_params(params: &ProtocolParams) -> Self {
        Self::with_params(params.max_price_staleness_secs, params.max_price_deviation_bps)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PRICE UPDATES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Record a primary source report
    pub fn set_primary(&mut self, price: PriceData) {
        self.primary = Some(price);
    }

    /// Record a fallback source report
    pub fn set_fallback(&mut self, price: PriceData) {
        self.fallback = Some(price);
    }

    /// Mark the primary source as not responding
    pub fn clear_primary(&mut self) {
        self.primary = None;
    }

    /// Mark the fallback source as not responding
    pub fn clear_fallback(&mut self) {
        self.fallback = None;
    }

    /// Pick a price from the current reports
    ///
    /// A source is usable if its report is non-zero, fresh, and within the
    /// deviation bound of the last good price. The primary wins when both are
    /// usable.
    pub fn fetch(&mut self, now: u64) -> PriceReading {
        let status = if self.is_usable(self.primary.as_ref(), now) {
            FeedStatus::PrimaryWorking
        } else if self.is_usable(self.fallback.as_ref(), now) {
            FeedStatus::UsingFallback
        } else {
            FeedStatus::Untrusted
        };

        if status != self.status {
            match status {
                FeedStatus::Untrusted => warn!(
                    last_good_price = %self.last_good_price,
                    "Both price sources failed"
                ),
                FeedStatus::UsingFallback => warn!("Primary price source failed, using fallback"),
                FeedStatus::PrimaryWorking => info!("Primary price source restored"),
            }
            self.status = status;
        }

        let report = match status {
            FeedStatus::PrimaryWorking => self.primary,
            FeedStatus::UsingFallback => self.fallback,
            FeedStatus::Untrusted => None,
        };

        match report {
            Some(data) => {
                self.last_good_price = data.price;
                PriceReading {
                    price: data.price,
                    trusted: true,
                }
            }
            None => PriceReading {
                price: self.last_good_price,
                trusted: false,
            },
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Last price that passed validation
    pub fn last_good_price(&self) -> U256 {
        self.last_good_price
    }

    /// Source in use at the last fetch
    pub fn status(&self) -> FeedStatus {
        self.status
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INTERNAL
    // ═══════════════════════════════════════════════════════════════════════════

    fn is_usable(&self, report: Option<&PriceData>, now: u64) -> bool {
        let Some(data) = report else {
            return false;
        };
        if data.price.is_zero() || !data.is_fresh(now, self.max_staleness) {
            return false;
        }
        if self.last_good_price.is_zero() {
            return true;
        }
        self.deviation_bps(data.price) <= U256::from(self.max_deviation_bps)
    }

    /// Deviation from the last good price in basis points
    fn deviation_bps(&self, price: U256) -> U256 {
        let diff = abs_diff(price, self.last_good_price);
        mul_div(diff, U256::from(BPS_DIVISOR), self.last_good_price).unwrap_or_else(|_| U256::MAX)
    }
}

impl PriceOracle for PriceFeed {
    fn read_price(&mut self, now: u64) -> PriceReading {
        self.fetch(now)
    }
}
