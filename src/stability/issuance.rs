//! Reward-token issuance to the stability pool.
//!
//! Cumulative issuance follows `cap × (1 − factor^minutes)`: with the default
//! factor half of the remaining supply is released each year. Each trigger
//! issues the difference since the previous trigger.

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::core::config::ProtocolParams;
use crate::error::Result;
use crate::utils::constants::{DECIMAL_PRECISION, SECONDS_IN_ONE_MINUTE};
use crate::utils::math::{dec_pow, mul_div, safe_add, safe_mul, safe_sub};

/// Time-decaying reward issuance schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityIssuance {
    supply_cap: U256,
    issuance_factor: U256,
    deployment_time: u64,
    total_issued: U256,
    last_reward_error: U256,
}

impl CommunityIssuance {
    /// Create a schedule from protocol parameters
    pub fn new(params: &ProtocolParams) -> Self {
        Self {
            supply_cap: U256::from(params.reward_supply_cap),
            issuance_factor: U256::from(params.issuance_factor),
            deployment_time: params.deployment_time,
            total_issued: U256::zero(),
            last_reward_error: U256::zero(),
        }
    }

    /// Cumulative fraction of the cap released by `now` (18 decimals)
    pub fn cumulative_fraction(&self, now: u64) -> Result<U256> {
        let minutes = now.saturating_sub(self.deployment_time) / SECONDS_IN_ONE_MINUTE;
        let remaining = dec_pow(self.issuance_factor, minutes)?;
        safe_sub(DECIMAL_PRECISION, remaining)
    }

    /// Issue everything accrued since the previous call
    pub fn issue(&mut self, now: u64) -> Result<U256> {
        let fraction = self.cumulative_fraction(now)?;
        let latest_total = mul_div(self.supply_cap, fraction, DECIMAL_PRECISION)?;
        // Clock moving backwards issues nothing
        if latest_total <= self.total_issued {
            return Ok(U256::zero());
        }
        let issuance = latest_total - self.total_issued;
        self.total_issued = latest_total;
        Ok(issuance)
    }

    /// Reward per unit of deposit for an issuance, carrying the remainder
    pub fn reward_per_unit(&mut self, issuance: U256, total_deposits: U256) -> Result<U256> {
        if total_deposits.is_zero() {
            return Ok(U256::zero());
        }
        let numerator = safe_add(safe_mul(issuance, DECIMAL_PRECISION)?, self.last_reward_error)?;
        let per_unit = numerator / total_deposits;
        self.last_reward_error = numerator - per_unit * total_deposits;
        Ok(per_unit)
    }

    /// Total issued so far
    pub fn total_issued(&self) -> U256 {
        self.total_issued
    }

    /// Issuance cap
    pub fn supply_cap(&self) -> U256 {
        self.supply_cap
    }
}
