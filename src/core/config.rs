//! Protocol configuration and parameters.
//!
//! Parameters are fixed for the lifetime of a [`crate::protocol::Protocol`].
//! They start from the defaults in [`crate::utils::constants`] and can be
//! loaded from a JSON file or overridden through `CDP_SETTLEMENT_*`
//! environment variables.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::utils::constants::*;
use crate::utils::math::bps_to_ratio;

// ═══════════════════════════════════════════════════════════════════════════════
// PROTOCOL PARAMETERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Protocol parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolParams {
    /// Minimum collateralization ratio (MCR) in basis points
    /// Below this, positions can be liquidated
    pub min_collateral_ratio_bps: u64,

    /// Critical collateralization ratio (CCR) in basis points
    /// When system TCR falls below this, recovery mode activates
    pub critical_collateral_ratio_bps: u64,

    /// Share of liquidated collateral paid to the liquidator, in basis points
    pub coll_gas_compensation_bps: u64,

    /// Minimum debt per position (18 decimals)
    pub min_debt: u128,

    /// Total reward tokens the pool can ever receive (18 decimals)
    pub reward_supply_cap: u128,

    /// Per-minute issuance decay factor (18 decimals)
    pub issuance_factor: u128,

    /// Timestamp (seconds) issuance is measured from
    pub deployment_time: u64,

    /// Maximum price age before a source is considered frozen
    pub max_price_staleness_secs: u64,

    /// Maximum accepted move between consecutive primary prices, in basis points
    pub max_price_deviation_bps: u64,

    /// Liquidation events kept in the engine history
    pub max_liquidation_events: usize,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            min_collateral_ratio_bps: MIN_COLLATERAL_RATIO_BPS,
            critical_collateral_ratio_bps: CRITICAL_COLLATERAL_RATIO_BPS,
            coll_gas_compensation_bps: COLL_GAS_COMPENSATION_BPS,
            min_debt: MIN_DEBT,
            reward_supply_cap: REWARD_SUPPLY_CAP,
            issuance_factor: ISSUANCE_FACTOR,
            deployment_time: 0,
            max_price_staleness_secs: MAX_PRICE_STALENESS_SECS,
            max_price_deviation_bps: MAX_PRICE_DEVIATION_BPS,
            max_liquidation_events: MAX_LIQUIDATION_EVENTS,
        }
    }
}

impl ProtocolParams {
    /// MCR as an 18-decimal ratio
    pub fn mcr(&self) -> U256 {
        bps_to_ratio(self.min_collateral_ratio_bps)
    }

    /// CCR as an 18-decimal ratio
    pub fn ccr(&self) -> U256 {
        bps_to_ratio(self.critical_collateral_ratio_bps)
    }

    /// Minimum debt as a U256 amount
    pub fn min_debt_amount(&self) -> U256 {
        U256::from(self.min_debt)
    }

    /// Create with custom MCR (for testing)
    pub fn with_mcr_bps(mut self, bps: u64) -> Self {
        self.min_collateral_ratio_bps = bps;
        self
    }

    /// Create with custom CCR (for testing)
    pub fn with_ccr_bps(mut self, bps: u64) -> Self {
        self.critical_collateral_ratio_bps = bps;
        self
    }

    /// Create with custom gas compensation (for testing)
    pub fn with_gas_compensation_bps(mut self, bps: u64) -> Self {
        self.coll_gas_compensation_bps = bps;
        self
    }

    /// Create with custom minimum debt (for testing)
    pub fn with_min_debt(mut self, min_debt: u128) -> Self {
        self.min_debt = min_debt;
        self
    }

    /// Create with a custom issuance start time
    pub fn with_deployment_time(mut self, timestamp: u64) -> Self {
        self.deployment_time = timestamp;
        self
    }

    /// Validate parameters are consistent
    pub fn validate(&self) -> Result<()> {
        if self.min_collateral_ratio_bps <= BPS_DIVISOR {
            return Err(invalid("min_collateral_ratio_bps", "must exceed 100%"));
        }
        if self.min_collateral_ratio_bps >= self.critical_collateral_ratio_bps {
            return Err(invalid(
                "critical_collateral_ratio_bps",
                "must exceed the minimum collateral ratio",
            ));
        }
        if self.coll_gas_compensation_bps >= BPS_DIVISOR {
            return Err(invalid("coll_gas_compensation_bps", "must be below 100%"));
        }
        if U256::from(self.issuance_factor) >= DECIMAL_PRECISION {
            return Err(invalid("issuance_factor", "must be below 1.0"));
        }
        if self.max_price_staleness_secs == 0 {
            return Err(invalid("max_price_staleness_secs", "must be greater than 0"));
        }
        if self.max_liquidation_events == 0 {
            return Err(invalid("max_liquidation_events", "must be greater than 0"));
        }
        Ok(())
    }

    /// Load from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let params: Self =
            serde_json::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    /// Save to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        std::fs::write(path, content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load from environment variables over the defaults
    pub fn from_env() -> Result<Self> {
        let mut params = Self::default();

        if let Some(v) = env_parse("CDP_SETTLEMENT_MCR_BPS")? {
            params.min_collateral_ratio_bps = v;
        }
        if let Some(v) = env_parse("CDP_SETTLEMENT_CCR_BPS")? {
            params.critical_collateral_ratio_bps = v;
        }
        if let Some(v) = env_parse("CDP_SETTLEMENT_GAS_COMPENSATION_BPS")? {
            params.coll_gas_compensation_bps = v;
        }
        if let Some(v) = env_parse("CDP_SETTLEMENT_MIN_DEBT")? {
            params.min_debt = v;
        }
        if let Some(v) = env_parse("CDP_SETTLEMENT_DEPLOYMENT_TIME")? {
            params.deployment_time = v;
        }
        if let Some(v) = env_parse("CDP_SETTLEMENT_PRICE_STALENESS_SECS")? {
            params.max_price_staleness_secs = v;
        }

        params.validate()?;
        Ok(params)
    }
}

fn invalid(name: &str, reason: &str) -> Error {
    Error::InvalidParameter {
        name: name.into(),
        reason: reason.into(),
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} has invalid value {:?}", key, raw))),
        Err(_) => Ok(None),
    }
}
