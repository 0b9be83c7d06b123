//! Liquidation Engine.
//!
//! This module settles under-collateralized positions:
//! - Policy selection per position and system mode
//! - Offset against the Stability Pool
//! - Redistribution of the remainder over active stakes
//! - Partial and capped Recovery Mode offsets
//!
//! The engine itself holds only history and running totals. All protocol
//! accumulators are passed in as a [`SystemState`], so the caller decides when
//! a settlement is committed.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::config::ProtocolParams;
use crate::core::position::PositionStatus;
use crate::error::{Error, Result};
use crate::liquidation::recovery::{Candidate, LiquidationPolicy, RecoveryModeGate};
use crate::protocol::state::SystemState;
use crate::stability::offset::OffsetSplit;
use crate::utils::constants::{DECIMAL_PRECISION, MAX_LIQUIDATION_EVENTS};
use crate::utils::ids::AccountId;
use crate::utils::math::{apply_bps, compute_cr, mul_div, safe_add, safe_sub};

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION OUTCOME
// ═══════════════════════════════════════════════════════════════════════════════

/// How one position was settled
///
/// Debt: `debt_offset + debt_redistributed + debt_remaining == entire_debt`.
/// Collateral: `coll_offset + coll_redistributed + coll_gas_compensation +
/// coll_surplus + coll_remaining == entire_coll`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationOutcome {
    /// Liquidated position
    pub position: AccountId,
    /// Branch taken
    pub policy: LiquidationPolicy,
    /// Ratio at liquidation, pending rewards included
    pub icr: U256,
    /// Debt including pending redistribution
    pub entire_debt: U256,
    /// Collateral including pending redistribution
    pub entire_coll: U256,
    /// Debt burned against pool deposits
    pub debt_offset: U256,
    /// Collateral sent to the pool
    pub coll_offset: U256,
    /// Debt spread over active stakes
    pub debt_redistributed: U256,
    /// Collateral spread over active stakes
    pub coll_redistributed: U256,
    /// Collateral paid to the liquidator
    pub coll_gas_compensation: U256,
    /// Collateral left claimable by the owner
    pub coll_surplus: U256,
    /// Debt left in a partially liquidated position
    pub debt_remaining: U256,
    /// Collateral left in a partially liquidated position
    pub coll_remaining: U256,
    /// True unless the position survived a partial offset
    pub position_closed: bool,
}

impl LiquidationOutcome {
    fn new(position: AccountId, policy: LiquidationPolicy, icr: U256, debt: U256, coll: U256) -> Self {
        Self {
            position,
            policy,
            icr,
            entire_debt: debt,
            entire_coll: coll,
            debt_offset: U256::zero(),
            coll_offset: U256::zero(),
            debt_redistributed: U256::zero(),
            coll_redistributed: U256::zero(),
            coll_gas_compensation: U256::zero(),
            coll_surplus: U256::zero(),
            debt_remaining: U256::zero(),
            coll_remaining: U256::zero(),
            position_closed: true,
        }
    }

    /// Check that every unit of debt and collateral is accounted for
    pub fn is_conserved(&self) -> bool {
        let debt = self
            .debt_offset
            .checked_add(self.debt_redistributed)
            .and_then(|d| d.checked_add(self.debt_remaining));
        let coll = self
            .coll_offset
            .checked_add(self.coll_redistributed)
            .and_then(|c| c.checked_add(self.coll_gas_compensation))
            .and_then(|c| c.checked_add(self.coll_surplus))
            .and_then(|c| c.checked_add(self.coll_remaining));
        debt == Some(self.entire_debt) && coll == Some(self.entire_coll)
    }
}

/// Price and clock for one liquidation call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidationContext {
    /// Price read once for the whole call
    pub price: U256,
    /// Unix timestamp
    pub timestamp: u64,
    /// Block height
    pub block_height: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION EVENT
// ═══════════════════════════════════════════════════════════════════════════════

/// Record of a committed liquidation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationEvent {
    /// Settlement details
    pub outcome: LiquidationOutcome,
    /// Price at liquidation
    pub price: U256,
    /// Whether the system was in Recovery Mode
    pub recovery_mode: bool,
    /// Block height
    pub block_height: u64,
    /// Unix timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Liquidation Engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationEngine {
    /// Collateral paid to the liquidator, in basis points
    coll_gas_compensation_bps: u64,
    /// Historical liquidation events
    events: Vec<LiquidationEvent>,
    /// Maximum events to keep in memory
    max_events: usize,
    /// Total positions closed or reduced by liquidation
    total_liquidations: u64,
    /// Total debt burned against the pool
    total_debt_offset: U256,
    /// Total debt redistributed
    total_debt_redistributed: U256,
    /// Total collateral that left liquidated positions
    total_collateral_liquidated: U256,
    /// Total collateral paid as gas compensation
    total_gas_compensation: U256,
}

impl Default for LiquidationEngine {
    fn default() -> Self {
        Self::new(&ProtocolParams::default())
    }
}

impl LiquidationEngine {
    /// Create a new liquidation engine
    pub fn new(params: &ProtocolParams) -> Self {
        Self {
            coll_gas_compensation_bps: params.coll_gas_compensation_bps,
            events: Vec::new(),
            max_events: params.max_liquidation_events.max(1).min(MAX_LIQUIDATION_EVENTS),
            total_liquidations: 0,
            total_debt_offset: U256::zero(),
            total_debt_redistributed: U256::zero(),
            total_collateral_liquidated: U256::zero(),
            total_gas_compensation: U256::zero(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ENTRY POINTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Liquidate one position
    ///
    /// Fails with `NothingToLiquidate` if the policy table says the position
    /// is not liquidatable under the current mode.
    pub fn liquidate(
        &self,
        state: &mut SystemState,
        gate: &RecoveryModeGate,
        owner: &AccountId,
        ctx: &LiquidationContext,
    ) -> Result<LiquidationOutcome> {
        let tcr = state.tcr(ctx.price)?;
        let recovery_mode = gate.is_recovery_mode(tcr);

        self.liquidate_one(state, gate, owner, ctx, recovery_mode, tcr)?
            .ok_or_else(|| Error::NothingToLiquidate(owner.to_hex()))
    }

    /// Walk up to `n` positions from the lowest ratio upward
    ///
    /// The mode is re-evaluated before every candidate. Stops at the first
    /// position that cannot be liquidated at or above the MCR, or when only
    /// one active position remains.
    pub fn liquidate_batch(
        &self,
        state: &mut SystemState,
        gate: &RecoveryModeGate,
        n: usize,
        ctx: &LiquidationContext,
    ) -> Result<Vec<LiquidationOutcome>> {
        let mut outcomes = Vec::new();
        let candidates: Vec<AccountId> = state.sorted.ascending().take(n).collect();

        for owner in candidates {
            if state.positions.active_count() <= 1 {
                break;
            }

            let tcr = state.tcr(ctx.price)?;
            let recovery_mode = gate.is_recovery_mode(tcr);
            let icr = state.current_icr(&owner, ctx.price)?;

            if !recovery_mode && icr >= gate.mcr() {
                break;
            }

            match self.liquidate_one(state, gate, &owner, ctx, recovery_mode, tcr)? {
                Some(outcome) => outcomes.push(outcome),
                None if icr >= gate.mcr() => break,
                None => continue,
            }
        }

        debug!(count = outcomes.len(), "Batch liquidation finished");
        Ok(outcomes)
    }

    /// Liquidate an explicit list of positions
    ///
    /// Closed, unknown and healthy entries are skipped.
    pub fn liquidate_positions(
        &self,
        state: &mut SystemState,
        gate: &RecoveryModeGate,
        owners: &[AccountId],
        ctx: &LiquidationContext,
    ) -> Result<Vec<LiquidationOutcome>> {
        let mut outcomes = Vec::new();

        for owner in owners {
            if !state.positions.status(owner).is_active() {
                debug!(owner = %owner.short(), "Skipping inactive position");
                continue;
            }
            if state.positions.active_count() <= 1 {
                break;
            }

            let tcr = state.tcr(ctx.price)?;
            let recovery_mode = gate.is_recovery_mode(tcr);
            if let Some(outcome) =
                self.liquidate_one(state, gate, owner, ctx, recovery_mode, tcr)?
            {
                outcomes.push(outcome);
            }
        }

        Ok(outcomes)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SETTLEMENT
    // ═══════════════════════════════════════════════════════════════════════════

    fn liquidate_one(
        &self,
        state: &mut SystemState,
        gate: &RecoveryModeGate,
        owner: &AccountId,
        ctx: &LiquidationContext,
        recovery_mode: bool,
        tcr: U256,
    ) -> Result<Option<LiquidationOutcome>> {
        state.positions.get_active(owner)?;
        if state.positions.active_count() <= 1 {
            return Err(Error::SoleRemainingPosition);
        }

        let entire = state.entire_debt_and_coll(owner)?;
        let icr = compute_cr(entire.coll, entire.debt, ctx.price)?;
        let candidate = Candidate {
            icr,
            debt: entire.debt,
            is_lowest: state.lowest() == Some(*owner),
        };

        let policy = gate.classify(recovery_mode, &candidate, state.pool.total_deposits(), tcr);
        if !policy.is_liquidation() {
            return Ok(None);
        }

        state.sync_position(owner)?;
        let mut outcome = LiquidationOutcome::new(*owner, policy, icr, entire.debt, entire.coll);
        let deposits = state.pool.total_deposits();

        match policy {
            LiquidationPolicy::OffsetAndRedistribute => {
                self.close_and_split(state, owner, deposits, ctx, &mut outcome)?;
            }
            LiquidationPolicy::RedistributeOnly => {
                self.close_and_split(state, owner, U256::zero(), ctx, &mut outcome)?;
            }
            LiquidationPolicy::OffsetUpToPool if entire.debt <= deposits => {
                self.close_and_split(state, owner, deposits, ctx, &mut outcome)?;
            }
            LiquidationPolicy::OffsetUpToPool => {
                self.partial_offset(state, owner, deposits, ctx, &mut outcome)?;
            }
            LiquidationPolicy::CappedOffset => {
                self.capped_offset(state, gate, owner, ctx, &mut outcome)?;
            }
            LiquidationPolicy::Skip => return Ok(None),
        }

        state
            .redistribution
            .update_system_snapshots(state.positions.active_collateral())?;

        debug_assert!(outcome.is_conserved());
        info!(
            owner = %owner.short(),
            policy = ?policy,
            recovery_mode,
            icr = %icr,
            debt_offset = %outcome.debt_offset,
            debt_redistributed = %outcome.debt_redistributed,
            "Position liquidated"
        );
        Ok(Some(outcome))
    }

    /// Close the position, pay gas compensation, offset up to `deposits` and
    /// redistribute the rest
    fn close_and_split(
        &self,
        state: &mut SystemState,
        owner: &AccountId,
        deposits: U256,
        ctx: &LiquidationContext,
        outcome: &mut LiquidationOutcome,
    ) -> Result<()> {
        let (coll, debt) = Self::close_position(state, owner)?;

        let gas = apply_bps(coll, self.coll_gas_compensation_bps)?;
        let coll_to_liquidate = safe_sub(coll, gas)?;
        let split = OffsetSplit::compute(debt, coll_to_liquidate, deposits)?;

        state
            .pool
            .offset(split.debt_offset, split.coll_offset, ctx.timestamp)?;
        state
            .redistribution
            .redistribute(split.debt_remainder, split.coll_remainder)?;

        outcome.coll_gas_compensation = gas;
        outcome.debt_offset = split.debt_offset;
        outcome.coll_offset = split.coll_offset;
        outcome.debt_redistributed = split.debt_remainder;
        outcome.coll_redistributed = split.coll_remainder;
        Ok(())
    }

    /// Offset the whole pool against a larger debt, leaving the position open
    ///
    /// Collateral leaves in proportion to the debt, so the ratio is unchanged.
    fn partial_offset(
        &self,
        state: &mut SystemState,
        owner: &AccountId,
        deposits: U256,
        ctx: &LiquidationContext,
        outcome: &mut LiquidationOutcome,
    ) -> Result<()> {
        let (coll, debt) = {
            let position = state.positions.get_active(owner)?;
            (position.collateral, position.debt)
        };
        let coll_offset = mul_div(coll, deposits, debt)?;

        state.positions.decrease_debt(owner, deposits)?;
        state.positions.decrease_collateral(owner, coll_offset)?;
        state.positions.touch(owner, ctx.block_height)?;
        state
            .redistribution
            .update_stake(state.positions.get_active_mut(owner)?)?;
        state.reinsert_sorted(owner)?;

        state.pool.offset(deposits, coll_offset, ctx.timestamp)?;

        outcome.debt_offset = deposits;
        outcome.coll_offset = coll_offset;
        outcome.debt_remaining = safe_sub(debt, deposits)?;
        outcome.coll_remaining = safe_sub(coll, coll_offset)?;
        outcome.position_closed = false;
        Ok(())
    }

    /// Offset the whole debt against only `debt × MCR / price` collateral
    fn capped_offset(
        &self,
        state: &mut SystemState,
        gate: &RecoveryModeGate,
        owner: &AccountId,
        ctx: &LiquidationContext,
        outcome: &mut LiquidationOutcome,
    ) -> Result<()> {
        let (coll, debt) = Self::close_position(state, owner)?;

        let capped = mul_div(debt, gate.mcr(), ctx.price)?.min(coll);
        let gas = apply_bps(capped, self.coll_gas_compensation_bps)?;
        let coll_offset = safe_sub(capped, gas)?;
        let surplus = safe_sub(coll, capped)?;

        state.pool.offset(debt, coll_offset, ctx.timestamp)?;
        state.surplus.account_surplus(*owner, surplus)?;

        outcome.coll_gas_compensation = gas;
        outcome.debt_offset = debt;
        outcome.coll_offset = coll_offset;
        outcome.coll_surplus = surplus;
        Ok(())
    }

    fn close_position(state: &mut SystemState, owner: &AccountId) -> Result<(U256, U256)> {
        state
            .redistribution
            .remove_stake(state.positions.get_active_mut(owner)?)?;
        let amounts = state
            .positions
            .close(owner, PositionStatus::ClosedByLiquidation)?;
        state.sorted.remove(owner);
        Ok(amounts)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // HISTORY
    // ═══════════════════════════════════════════════════════════════════════════

    /// Record committed outcomes
    pub fn record(
        &mut self,
        outcomes: &[LiquidationOutcome],
        ctx: &LiquidationContext,
        recovery_mode: bool,
    ) -> Result<()> {
        for outcome in outcomes {
            let left = safe_sub(outcome.entire_coll, outcome.coll_remaining)?;

            self.total_liquidations += 1;
            self.total_debt_offset = safe_add(self.total_debt_offset, outcome.debt_offset)?;
            self.total_debt_redistributed =
                safe_add(self.total_debt_redistributed, outcome.debt_redistributed)?;
            self.total_collateral_liquidated = safe_add(self.total_collateral_liquidated, left)?;
            self.total_gas_compensation =
                safe_add(self.total_gas_compensation, outcome.coll_gas_compensation)?;

            self.add_event(LiquidationEvent {
                outcome: outcome.clone(),
                price: ctx.price,
                recovery_mode,
                block_height: ctx.block_height,
                timestamp: ctx.timestamp,
            });
        }
        Ok(())
    }

    fn add_event(&mut self, event: LiquidationEvent) {
        self.events.push(event);
        if self.events.len() > self.max_events {
            self.events.remove(0);
        }
    }

    /// Collateral paid to the liquidator for closing a position with `coll`
    pub fn gas_compensation(&self, coll: U256) -> Result<U256> {
        apply_bps(coll, self.coll_gas_compensation_bps)
    }

    /// Get total liquidations
    pub fn total_liquidations(&self) -> u64 {
        self.total_liquidations
    }

    /// Get total debt burned against the pool
    pub fn total_debt_offset(&self) -> U256 {
        self.total_debt_offset
    }

    /// Get total debt redistributed
    pub fn total_debt_redistributed(&self) -> U256 {
        self.total_debt_redistributed
    }

    /// Get recent liquidation events
    pub fn recent_events(&self) -> &[LiquidationEvent] {
        &self.events
    }

    /// Get events for a specific position
    pub fn events_for(&self, owner: &AccountId) -> Vec<&LiquidationEvent> {
        self.events
            .iter()
            .filter(|e| &e.outcome.position == owner)
            .collect()
    }

    /// Get liquidation statistics
    pub fn statistics(&self) -> LiquidationStats {
        let offset_share = if self.total_debt_offset.is_zero() && self.total_debt_redistributed.is_zero() {
            U256::zero()
        } else {
            let total = self
                .total_debt_offset
                .saturating_add(self.total_debt_redistributed);
            mul_div(self.total_debt_offset, DECIMAL_PRECISION, total).unwrap_or_default()
        };

        LiquidationStats {
            total_liquidations: self.total_liquidations,
            total_debt_offset: self.total_debt_offset,
            total_debt_redistributed: self.total_debt_redistributed,
            total_collateral_liquidated: self.total_collateral_liquidated,
            total_gas_compensation: self.total_gas_compensation,
            offset_share,
            recent_event_count: self.events.len(),
        }
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }
}

/// Liquidation statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationStats {
    /// Positions closed or reduced
    pub total_liquidations: u64,
    /// Debt burned against the pool
    pub total_debt_offset: U256,
    /// Debt spread over active stakes
    pub total_debt_redistributed: U256,
    /// Collateral that left liquidated positions
    pub total_collateral_liquidated: U256,
    /// Collateral paid to liquidators
    pub total_gas_compensation: U256,
    /// Share of liquidated debt absorbed by the pool (1e18 = 100%)
    pub offset_share: U256,
    /// Events held in memory
    pub recent_event_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::position::Position;
    use crate::utils::math::dec;

    fn params() -> ProtocolParams {
        ProtocolParams::default()
    }

    fn ctx(price: U256) -> LiquidationContext {
        LiquidationContext {
            price,
            timestamp: params().deployment_time,
            block_height: 10,
        }
    }

    fn open(state: &mut SystemState, label: &str, coll: U256, debt: U256) -> AccountId {
        let owner = AccountId::from_label(label);
        let mut position = Position::new(owner, coll, debt, 1);
        state.redistribution.update_stake(&mut position).unwrap();
        state.redistribution.update_reward_snapshot(&mut position);
        state.positions.open(position).unwrap();
        state.reinsert_sorted(&owner).unwrap();
        owner
    }

    fn setup() -> (SystemState, RecoveryModeGate, LiquidationEngine) {
        let p = params();
        (SystemState::new(&p), RecoveryModeGate::new(&p), LiquidationEngine::new(&p))
    }

    #[test]
    fn test_offset_fully_absorbed_by_pool() {
        let (mut state, gate, engine) = setup();
        let depositor = AccountId::from_label("depositor");
        state
            .pool
            .provide(depositor, dec(10_000, 18), None, params().deployment_time)
            .unwrap();

        // ICR 105% at price 1000
        let risky = open(&mut state, "risky", dec(21, 17), dec(2_000, 18));
        open(&mut state, "healthy", dec(100, 18), dec(2_000, 18));

        let outcome = engine
            .liquidate(&mut state, &gate, &risky, &ctx(dec(1_000, 18)))
            .unwrap();

        assert_eq!(outcome.policy, LiquidationPolicy::OffsetAndRedistribute);
        assert_eq!(outcome.debt_offset, dec(2_000, 18));
        assert!(outcome.debt_redistributed.is_zero());
        assert_eq!(outcome.coll_gas_compensation, apply_bps(dec(21, 17), 50).unwrap());
        assert!(outcome.is_conserved());

        assert_eq!(state.pool.total_deposits(), dec(8_000, 18));
        assert_eq!(state.positions.status(&risky), PositionStatus::ClosedByLiquidation);
        assert!(!state.sorted.contains(&risky));
        state.check_invariants().unwrap();
    }

    #[test]
    fn test_empty_pool_redistributes_everything() {
        let (mut state, gate, engine) = setup();
        let risky = open(&mut state, "risky", dec(21, 17), dec(2_000, 18));
        let a = open(&mut state, "a", dec(50, 18), dec(2_000, 18));
        let b = open(&mut state, "b", dec(50, 18), dec(2_000, 18));

        let outcome = engine
            .liquidate(&mut state, &gate, &risky, &ctx(dec(1_000, 18)))
            .unwrap();
        assert!(outcome.debt_offset.is_zero());
        assert_eq!(outcome.debt_redistributed, dec(2_000, 18));

        let entire_a = state.entire_debt_and_coll(&a).unwrap();
        let entire_b = state.entire_debt_and_coll(&b).unwrap();
        assert_eq!(entire_a.debt, dec(3_000, 18));
        assert_eq!(entire_a, entire_b);
        assert!(outcome.is_conserved());
    }

    #[test]
    fn test_healthy_position_not_liquidated() {
        let (mut state, gate, engine) = setup();
        let a = open(&mut state, "a", dec(10, 18), dec(2_000, 18));
        open(&mut state, "b", dec(10, 18), dec(2_000, 18));

        let err = engine
            .liquidate(&mut state, &gate, &a, &ctx(dec(1_000, 18)))
            .unwrap_err();
        assert!(matches!(err, Error::NothingToLiquidate(_)));
    }

    #[test]
    fn test_sole_position_refused() {
        let (mut state, gate, engine) = setup();
        let a = open(&mut state, "a", dec(1, 18), dec(2_000, 18));

        let err = engine
            .liquidate(&mut state, &gate, &a, &ctx(dec(1_000, 18)))
            .unwrap_err();
        assert!(matches!(err, Error::SoleRemainingPosition));
    }

    #[test]
    fn test_batch_stops_at_healthy() {
        let (mut state, gate, engine) = setup();
        let depositor = AccountId::from_label("depositor");
        state
            .pool
            .provide(depositor, dec(100_000, 18), None, params().deployment_time)
            .unwrap();

        let low = open(&mut state, "low", dec(2, 18), dec(2_000, 18));
        let mid = open(&mut state, "mid", dec(21, 17), dec(2_000, 18));
        open(&mut state, "high", dec(100, 18), dec(2_000, 18));
        open(&mut state, "higher", dec(200, 18), dec(2_000, 18));

        let outcomes = engine
            .liquidate_batch(&mut state, &gate, 10, &ctx(dec(1_000, 18)))
            .unwrap();
        let liquidated: Vec<_> = outcomes.iter().map(|o| o.position).collect();
        assert_eq!(liquidated, vec![low, mid]);
        assert_eq!(state.positions.active_count(), 2);
    }

    #[test]
    fn test_batch_takes_at_most_n_candidates() {
        let (mut state, gate, engine) = setup();
        let low = open(&mut state, "low", dec(2, 18), dec(2_000, 18));
        let mid = open(&mut state, "mid", dec(21, 17), dec(2_000, 18));
        open(&mut state, "high", dec(100, 18), dec(2_000, 18));
        open(&mut state, "higher", dec(200, 18), dec(2_000, 18));

        let outcomes = engine
            .liquidate_batch(&mut state, &gate, 1, &ctx(dec(1_000, 18)))
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].position, low);
        assert!(state.positions.status(&mid).is_active());
        assert_eq!(state.lowest(), Some(mid));
    }

    #[test]
    fn test_batch_by_list_skips_healthy_and_unknown() {
        let (mut state, gate, engine) = setup();
        let low = open(&mut state, "low", dec(2, 18), dec(2_000, 18));
        let high = open(&mut state, "high", dec(100, 18), dec(2_000, 18));
        open(&mut state, "higher", dec(200, 18), dec(2_000, 18));
        let unknown = AccountId::from_label("unknown");

        let outcomes = engine
            .liquidate_positions(&mut state, &gate, &[unknown, high, low], &ctx(dec(1_000, 18)))
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].position, low);
    }

    #[test]
    fn test_record_bounds_history() {
        let (_, _, mut engine) = setup();
        engine.max_events = 2;
        let outcome = LiquidationOutcome::new(
            AccountId::from_label("a"),
            LiquidationPolicy::RedistributeOnly,
            dec(9, 17),
            dec(100, 18),
            dec(1, 18),
        );
        for _ in 0..3 {
            engine
                .record(&[outcome.clone()], &ctx(dec(1_000, 18)), true)
                .unwrap();
        }
        assert_eq!(engine.recent_events().len(), 2);
        assert_eq!(engine.total_liquidations(), 3);
        assert_eq!(engine.events_for(&AccountId::from_label("a")).len(), 2);

        let restored = LiquidationEngine::from_bytes(&engine.to_bytes().unwrap()).unwrap();
        assert_eq!(restored.statistics(), engine.statistics());
    }
}
