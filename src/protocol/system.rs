//! Protocol - the single writer over [`SystemState`].
//!
//! Every mutating operation reads the price, validates against the current
//! mode, and then runs on a scratch copy of the state that replaces the live
//! state only when the whole operation succeeds.

use primitive_types::U256;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use crate::core::config::ProtocolParams;
use crate::core::position::{Position, PositionStatus};
use crate::error::{Error, Result};
use crate::liquidation::engine::{LiquidationContext, LiquidationEngine, LiquidationOutcome};
use crate::liquidation::recovery::{RecoveryModeGate, RecoveryModeStatus};
use crate::oracle::price_feed::{PriceOracle, PriceReading};
use crate::protocol::state::{EntirePosition, SystemState};
use crate::stability::pool::DepositChange;
use crate::utils::ids::AccountId;
use crate::utils::math::{compute_cr, safe_add, safe_sub};

// ═══════════════════════════════════════════════════════════════════════════════
// POSITION ADJUSTMENT
// ═══════════════════════════════════════════════════════════════════════════════

/// Changes to apply to a position in one call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PositionAdjustment {
    /// Collateral to add
    pub coll_added: U256,
    /// Collateral to withdraw
    pub coll_withdrawn: U256,
    /// Debt to draw
    pub debt_added: U256,
    /// Debt to repay
    pub debt_repaid: U256,
}

impl PositionAdjustment {
    /// Add collateral
    pub fn add_collateral(amount: U256) -> Self {
        Self {
            coll_added: amount,
            ..Self::default()
        }
    }

    /// Withdraw collateral
    pub fn withdraw_collateral(amount: U256) -> Self {
        Self {
            coll_withdrawn: amount,
            ..Self::default()
        }
    }

    /// Draw more debt
    pub fn draw_debt(amount: U256) -> Self {
        Self {
            debt_added: amount,
            ..Self::default()
        }
    }

    /// Repay debt
    pub fn repay_debt(amount: U256) -> Self {
        Self {
            debt_repaid: amount,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.coll_added.is_zero() && !self.coll_withdrawn.is_zero() {
            return Err(Error::InvalidParameter {
                name: "collateral".into(),
                reason: "cannot add and withdraw in one adjustment".into(),
            });
        }
        if !self.debt_added.is_zero() && !self.debt_repaid.is_zero() {
            return Err(Error::InvalidParameter {
                name: "debt".into(),
                reason: "cannot draw and repay in one adjustment".into(),
            });
        }
        if self.coll_added.is_zero()
            && self.coll_withdrawn.is_zero()
            && self.debt_added.is_zero()
            && self.debt_repaid.is_zero()
        {
            return Err(Error::ZeroAmount);
        }
        Ok(())
    }

    fn apply(&self, coll: U256, debt: U256) -> Result<(U256, U256)> {
        let coll = safe_sub(safe_add(coll, self.coll_added)?, self.coll_withdrawn)?;
        let debt = safe_sub(safe_add(debt, self.debt_added)?, self.debt_repaid)?;
        Ok((coll, debt))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROTOCOL
// ═══════════════════════════════════════════════════════════════════════════════

/// Owner of all protocol state
pub struct Protocol {
    params: ProtocolParams,
    state: SystemState,
    engine: LiquidationEngine,
    gate: RecoveryModeGate,
    oracle: Box<dyn PriceOracle>,
    block_height: u64,
    timestamp: u64,
}

impl Protocol {
    /// Create a protocol with validated parameters
    pub fn new(params: ProtocolParams, oracle: Box<dyn PriceOracle>) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            state: SystemState::new(&params),
            engine: LiquidationEngine::new(&params),
            gate: RecoveryModeGate::new(&params),
            timestamp: params.deployment_time,
            block_height: 0,
            oracle,
            params,
        })
    }

    /// Advance the clock
    pub fn begin_block(&mut self, height: u64, timestamp: u64) -> Result<()> {
        if height < self.block_height || timestamp < self.timestamp {
            return Err(Error::InvalidParameter {
                name: "block".into(),
                reason: format!(
                    "block {}@{} precedes {}@{}",
                    height, timestamp, self.block_height, self.timestamp
                ),
            });
        }
        self.block_height = height;
        self.timestamp = timestamp;
        Ok(())
    }

    /// Replace the price source
    pub fn set_oracle(&mut self, oracle: Box<dyn PriceOracle>) {
        self.oracle = oracle;
    }

    /// Read the price without requiring it to be trusted
    pub fn read_price(&mut self) -> PriceReading {
        self.oracle.read_price(self.timestamp)
    }

    fn trusted_price(&mut self) -> Result<U256> {
        self.read_price().require_trusted()
    }

    fn context(&self, price: U256) -> LiquidationContext {
        LiquidationContext {
            price,
            timestamp: self.timestamp,
            block_height: self.block_height,
        }
    }

    fn refresh_mode(&mut self, price: U256) -> Result<()> {
        let tcr = self.state.tcr(price)?;
        self.gate.record_mode(tcr, self.timestamp, self.block_height);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // POSITIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Open a position for `owner`
    pub fn open_position(&mut self, owner: AccountId, coll: U256, debt: U256) -> Result<()> {
        if coll.is_zero() || debt.is_zero() {
            return Err(Error::ZeroAmount);
        }
        let minimum = self.params.min_debt_amount();
        if debt < minimum {
            return Err(Error::DebtBelowMinimum { amount: debt, minimum });
        }

        let price = self.trusted_price()?;
        let recovery_mode = self.gate.is_recovery_mode(self.state.tcr(price)?);
        let icr = compute_cr(coll, debt, price)?;
        let new_tcr = compute_cr(
            safe_add(self.state.entire_system_coll()?, coll)?,
            safe_add(self.state.entire_system_debt()?, debt)?,
            price,
        )?;
        self.gate.validate_open(recovery_mode, icr, new_tcr)?;

        let block_height = self.block_height;
        self.state.transact(|s| {
            let mut position = Position::new(owner, coll, debt, block_height);
            s.redistribution.update_stake(&mut position)?;
            s.redistribution.update_reward_snapshot(&mut position);
            s.positions.open(position)?;
            s.reinsert_sorted(&owner)
        })?;

        info!(owner = %owner.short(), %coll, %debt, %icr, "Position opened");
        self.refresh_mode(price)
    }

    /// Change a position's collateral and/or debt
    pub fn adjust_position(&mut self, owner: AccountId, adjustment: PositionAdjustment) -> Result<()> {
        adjustment.validate()?;
        self.state.positions.get_active(&owner)?;

        let price = self.trusted_price()?;
        let recovery_mode = self.gate.is_recovery_mode(self.state.tcr(price)?);
        let minimum = self.params.min_debt_amount();
        let gate = &self.gate;
        let block_height = self.block_height;

        self.state.transact(|s| {
            s.sync_position(&owner)?;
            let (coll, debt) = {
                let position = s.positions.get_active(&owner)?;
                (position.collateral, position.debt)
            };
            if adjustment.debt_repaid > debt {
                return Err(Error::InvalidParameter {
                    name: "debt_repaid".into(),
                    reason: format!("{} exceeds debt {}", adjustment.debt_repaid, debt),
                });
            }
            if adjustment.coll_withdrawn > coll {
                return Err(Error::InvalidParameter {
                    name: "coll_withdrawn".into(),
                    reason: format!("{} exceeds collateral {}", adjustment.coll_withdrawn, coll),
                });
            }

            let (new_coll, new_debt) = adjustment.apply(coll, debt)?;
            if new_debt < minimum {
                return Err(Error::DebtBelowMinimum {
                    amount: new_debt,
                    minimum,
                });
            }

            let old_icr = compute_cr(coll, debt, price)?;
            let new_icr = compute_cr(new_coll, new_debt, price)?;
            let (system_coll, system_debt) = adjustment.apply(
                s.entire_system_coll()?,
                s.entire_system_debt()?,
            )?;
            let new_tcr = compute_cr(system_coll, system_debt, price)?;
            gate.validate_adjust(
                recovery_mode,
                old_icr,
                new_icr,
                !adjustment.coll_withdrawn.is_zero(),
                !adjustment.debt_added.is_zero(),
                new_tcr,
            )?;

            s.positions.increase_collateral(&owner, adjustment.coll_added)?;
            s.positions.decrease_collateral(&owner, adjustment.coll_withdrawn)?;
            s.positions.increase_debt(&owner, adjustment.debt_added)?;
            s.positions.decrease_debt(&owner, adjustment.debt_repaid)?;
            s.positions.touch(&owner, block_height)?;
            s.redistribution
                .update_stake(s.positions.get_active_mut(&owner)?)?;
            s.reinsert_sorted(&owner)
        })?;

        debug!(owner = %owner.short(), ?adjustment, "Position adjusted");
        self.refresh_mode(price)
    }

    /// Close a position, returning the collateral released and the debt repaid
    pub fn close_position(&mut self, owner: AccountId) -> Result<(U256, U256)> {
        self.state.positions.get_active(&owner)?;
        if self.state.positions.active_count() <= 1 {
            return Err(Error::SoleRemainingPosition);
        }

        let price = self.trusted_price()?;
        let recovery_mode = self.gate.is_recovery_mode(self.state.tcr(price)?);
        let gate = &self.gate;

        let (coll, debt) = self.state.transact(|s| {
            s.sync_position(&owner)?;
            let (coll, debt) = {
                let position = s.positions.get_active(&owner)?;
                (position.collateral, position.debt)
            };
            let new_tcr = compute_cr(
                safe_sub(s.entire_system_coll()?, coll)?,
                safe_sub(s.entire_system_debt()?, debt)?,
                price,
            )?;
            gate.validate_close(recovery_mode, new_tcr)?;

            s.redistribution
                .remove_stake(s.positions.get_active_mut(&owner)?)?;
            let amounts = s.positions.close(&owner, PositionStatus::ClosedByOwner)?;
            s.sorted.remove(&owner);
            Ok(amounts)
        })?;

        info!(owner = %owner.short(), %coll, %debt, "Position closed");
        self.refresh_mode(price)?;
        Ok((coll, debt))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STABILITY POOL
    // ═══════════════════════════════════════════════════════════════════════════

    /// Register a front end with its kickback rate
    pub fn register_front_end(&mut self, front_end: AccountId, kickback_rate: U256) -> Result<()> {
        let block_height = self.block_height;
        self.state
            .transact(|s| s.pool.register_front_end(front_end, kickback_rate, block_height))
    }

    /// Deposit into the stability pool
    pub fn provide_to_pool(
        &mut self,
        depositor: AccountId,
        amount: U256,
        front_end: Option<AccountId>,
    ) -> Result<DepositChange> {
        let now = self.timestamp;
        self.state
            .transact(|s| s.pool.provide(depositor, amount, front_end, now))
    }

    /// Withdraw from the stability pool; `amount == 0` only claims gains
    ///
    /// Refused while the lowest-ratio position sits below the MCR.
    pub fn withdraw_from_pool(&mut self, depositor: AccountId, amount: U256) -> Result<DepositChange> {
        if !amount.is_zero() {
            let price = self.read_price().price;
            if let Some(lowest) = self.state.lowest() {
                if self.state.current_icr(&lowest, price)? < self.gate.mcr() {
                    return Err(Error::UndercollateralizedPositionsExist);
                }
            }
        }
        let now = self.timestamp;
        self.state
            .transact(|s| s.pool.withdraw(depositor, amount, now))
    }

    /// Move a depositor's collateral gain into their own active position
    pub fn move_collateral_gain_to_position(&mut self, depositor: AccountId) -> Result<U256> {
        self.state.positions.get_active(&depositor)?;
        let now = self.timestamp;
        let block_height = self.block_height;

        let gain = self.state.transact(|s| {
            let change = s.pool.take_collateral_gain(depositor, now)?;
            s.sync_position(&depositor)?;
            s.positions
                .increase_collateral(&depositor, change.collateral_gain)?;
            s.positions.touch(&depositor, block_height)?;
            s.redistribution
                .update_stake(s.positions.get_active_mut(&depositor)?)?;
            s.reinsert_sorted(&depositor)?;
            Ok(change.collateral_gain)
        })?;

        info!(depositor = %depositor.short(), %gain, "Collateral gain moved to position");
        Ok(gain)
    }

    /// Release reward issuance accrued since the last trigger
    pub fn trigger_issuance(&mut self) -> Result<U256> {
        let now = self.timestamp;
        self.state.transact(|s| s.pool.trigger_issuance(now))
    }

    /// Claim collateral left over from a capped liquidation
    pub fn claim_collateral_surplus(&mut self, owner: AccountId) -> Result<U256> {
        self.state.transact(|s| s.surplus.claim(&owner))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIQUIDATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Liquidate one position
    pub fn liquidate(&mut self, owner: AccountId) -> Result<LiquidationOutcome> {
        let price = self.trusted_price()?;
        let ctx = self.context(price);
        let recovery_mode = self.gate.is_recovery_mode(self.state.tcr(price)?);

        let engine = &self.engine;
        let gate = &self.gate;
        let outcome = self
            .state
            .transact(|s| engine.liquidate(s, gate, &owner, &ctx))?;

        self.engine
            .record(std::slice::from_ref(&outcome), &ctx, recovery_mode)?;
        self.refresh_mode(price)?;
        Ok(outcome)
    }

    /// Liquidate up to `n` positions from the lowest ratio upward
    pub fn liquidate_batch(&mut self, n: usize) -> Result<Vec<LiquidationOutcome>> {
        let price = self.trusted_price()?;
        let ctx = self.context(price);
        let recovery_mode = self.gate.is_recovery_mode(self.state.tcr(price)?);

        let engine = &self.engine;
        let gate = &self.gate;
        let outcomes = self
            .state
            .transact(|s| engine.liquidate_batch(s, gate, n, &ctx))?;

        self.engine.record(&outcomes, &ctx, recovery_mode)?;
        self.refresh_mode(price)?;
        Ok(outcomes)
    }

    /// Liquidate the listed positions, skipping those that are not liquidatable
    pub fn liquidate_positions(&mut self, owners: &[AccountId]) -> Result<Vec<LiquidationOutcome>> {
        let price = self.trusted_price()?;
        let ctx = self.context(price);
        let recovery_mode = self.gate.is_recovery_mode(self.state.tcr(price)?);

        let engine = &self.engine;
        let gate = &self.gate;
        let outcomes = self
            .state
            .transact(|s| engine.liquidate_positions(s, gate, owners, &ctx))?;

        self.engine.record(&outcomes, &ctx, recovery_mode)?;
        self.refresh_mode(price)?;
        Ok(outcomes)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Protocol parameters
    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    /// Committed state
    pub fn state(&self) -> &SystemState {
        &self.state
    }

    /// Liquidation history and totals
    pub fn engine(&self) -> &LiquidationEngine {
        &self.engine
    }

    /// Recovery mode gate and its history
    pub fn gate(&self) -> &RecoveryModeGate {
        &self.gate
    }

    /// A position record, open or closed
    pub fn position(&self, owner: &AccountId) -> Option<&Position> {
        self.state.positions.get(owner)
    }

    /// Debt and collateral including pending redistribution
    pub fn entire_debt_and_coll(&self, owner: &AccountId) -> Result<EntirePosition> {
        self.state.entire_debt_and_coll(owner)
    }

    /// Ratio of a position at `price`, pending rewards included
    pub fn current_icr(&self, owner: &AccountId, price: U256) -> Result<U256> {
        self.state.current_icr(owner, price)
    }

    /// Total collateralization ratio at `price`
    pub fn tcr(&self, price: U256) -> Result<U256> {
        self.state.tcr(price)
    }

    /// Check if the system is in Recovery Mode at `price`
    pub fn is_recovery_mode(&self, price: U256) -> Result<bool> {
        Ok(self.gate.is_recovery_mode(self.state.tcr(price)?))
    }

    /// Recovery mode status at `price`
    pub fn recovery_status(&self, price: U256) -> Result<RecoveryModeStatus> {
        self.gate.status(
            self.state.entire_system_coll()?,
            self.state.entire_system_debt()?,
            price,
        )
    }

    /// Compounded deposit of a depositor
    pub fn compounded_deposit(&self, depositor: &AccountId) -> Result<U256> {
        self.state.pool.compounded_deposit(depositor)
    }

    /// Collateral gain of a depositor
    pub fn depositor_collateral_gain(&self, depositor: &AccountId) -> Result<U256> {
        self.state.pool.depositor_collateral_gain(depositor)
    }

    /// Reward gain of a depositor after the front-end cut
    pub fn depositor_reward_gain(&self, depositor: &AccountId) -> Result<U256> {
        self.state.pool.depositor_reward_gain(depositor)
    }

    /// Current block height
    pub fn block_height(&self) -> u64 {
        self.block_height
    }

    /// Current timestamp
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SHARED PROTOCOL
// ═══════════════════════════════════════════════════════════════════════════════

/// Thread-safe handle: one writer at a time, concurrent readers
#[derive(Clone)]
pub struct SharedProtocol {
    inner: Arc<RwLock<Protocol>>,
}

impl SharedProtocol {
    /// Wrap a protocol
    pub fn new(protocol: Protocol) -> Self {
        Self {
            inner: Arc::new(RwLock::new(protocol)),
        }
    }

    /// Run a mutating operation under the write lock
    pub fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Protocol) -> Result<T>,
    {
        let mut guard = self.inner.write().map_err(|_| Error::Lock)?;
        f(&mut guard)
    }

    /// Run a query under the read lock
    pub fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Protocol) -> T,
    {
        let guard = self.inner.read().map_err(|_| Error::Lock)?;
        Ok(f(&guard))
    }
}
