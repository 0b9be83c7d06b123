//! Stability Pool.
//!
//! Depositors provide stablecoin that is burned against liquidated debt. In
//! return they receive the liquidated collateral and a share of the reward
//! issuance. Deposits may be routed through a registered front end, which keeps
//! part of its depositors' reward gains.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::config::ProtocolParams;
use crate::error::{Error, Result};
use crate::stability::deposit::{DepositorRecord, FrontEndRecord, FrontEndStake};
use crate::stability::issuance::CommunityIssuance;
use crate::stability::ledger::{FixedPointLedger, LedgerCheckpoint, LossOutcome};
use crate::stability::offset::OffsetProcessor;
use crate::utils::constants::DECIMAL_PRECISION;
use crate::utils::ids::{sha256_hex, AccountId};
use crate::utils::journal::{Checkpointed, JournaledMap};
use crate::utils::math::{safe_add, safe_sub};

// ═══════════════════════════════════════════════════════════════════════════════
// DEPOSIT CHANGE
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of a deposit, withdrawal or gain claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositChange {
    /// Depositor
    pub depositor: AccountId,
    /// Collateral gain paid out
    pub collateral_gain: U256,
    /// Reward tokens paid to the depositor
    pub reward_gain: U256,
    /// Front end credited on this change, if any
    pub front_end: Option<AccountId>,
    /// Reward tokens paid to the front end
    pub front_end_reward_gain: U256,
    /// Deposit returned to the depositor
    pub withdrawn: U256,
    /// Deposit after the change
    pub new_deposit: U256,
}

/// Gains realized before a deposit changes
struct Settlement {
    compounded: U256,
    collateral_gain: U256,
    reward_gain: U256,
    front_end: Option<AccountId>,
    front_end_reward_gain: U256,
}

// ═══════════════════════════════════════════════════════════════════════════════
// STABILITY POOL
// ═══════════════════════════════════════════════════════════════════════════════

/// The Stability Pool for absorbing liquidations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityPool {
    /// Compounding ledger
    ledger: FixedPointLedger,
    /// Offset error feedback
    offsets: OffsetProcessor,
    /// Reward issuance schedule
    issuance: CommunityIssuance,
    /// Sum of all compounded deposits
    total_deposits: U256,
    /// Collateral held for depositors
    collateral_balance: U256,
    /// Deposits by depositor
    deposits: JournaledMap<AccountId, DepositorRecord>,
    /// Registered front ends
    front_ends: JournaledMap<AccountId, FrontEndRecord>,
    /// Aggregate stake per front end
    front_end_stakes: JournaledMap<AccountId, FrontEndStake>,
    /// Number of offsets absorbed
    total_offsets: u64,
    /// Debt burned against deposits
    total_debt_absorbed: U256,
    /// Collateral received from liquidations
    total_collateral_absorbed: U256,
    /// Reward tokens paid to depositors and front ends
    total_rewards_paid: U256,
}

impl Default for StabilityPool {
    fn default() -> Self {
        Self::new(&ProtocolParams::default())
    }
}

impl StabilityPool {
    /// Create an empty pool
    pub fn new(params: &ProtocolParams) -> Self {
        Self {
            ledger: FixedPointLedger::new(),
            offsets: OffsetProcessor::new(),
            issuance: CommunityIssuance::new(params),
            total_deposits: U256::zero(),
            collateral_balance: U256::zero(),
            deposits: JournaledMap::new(),
            front_ends: JournaledMap::new(),
            front_end_stakes: JournaledMap::new(),
            total_offsets: 0,
            total_debt_absorbed: U256::zero(),
            total_collateral_absorbed: U256::zero(),
            total_rewards_paid: U256::zero(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // FRONT ENDS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Register a front end with a fixed kickback rate (1e18 = 100% to depositors)
    pub fn register_front_end(
        &mut self,
        front_end: AccountId,
        kickback_rate: U256,
        block_height: u64,
    ) -> Result<()> {
        if kickback_rate > DECIMAL_PRECISION {
            return Err(Error::InvalidParameter {
                name: "kickback_rate".into(),
                reason: format!("{} exceeds 100%", kickback_rate),
            });
        }
        if self.front_ends.contains_key(&front_end) {
            return Err(Error::FrontEndAlreadyRegistered(front_end.to_hex()));
        }
        if self.deposits.contains_key(&front_end) {
            return Err(Error::InvalidParameter {
                name: "front_end".into(),
                reason: "account holds a deposit".into(),
            });
        }

        self.front_ends.insert(
            front_end,
            FrontEndRecord {
                kickback_rate,
                registered_at: block_height,
            },
        );
        info!(front_end = %front_end.short(), %kickback_rate, "Front end registered");
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DEPOSITS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Add to a deposit, paying out accumulated gains
    ///
    /// `front_end_tag` is only recorded for a depositor without a deposit.
    pub fn provide(
        &mut self,
        depositor: AccountId,
        amount: U256,
        front_end_tag: Option<AccountId>,
        now: u64,
    ) -> Result<DepositChange> {
        if amount.is_zero() {
            return Err(Error::ZeroAmount);
        }
        if self.front_ends.contains_key(&depositor) {
            return Err(Error::DepositorIsFrontEnd(depositor.to_hex()));
        }
        if let Some(tag) = front_end_tag {
            if !self.front_ends.contains_key(&tag) {
                return Err(Error::FrontEndNotRegistered(tag.to_hex()));
            }
        }

        self.trigger_issuance(now)?;

        let tag = match self.deposits.get(&depositor) {
            Some(record) => record.front_end_tag,
            None => front_end_tag,
        };
        let settlement = self.settle(&depositor, tag)?;

        if let Some(fe) = tag {
            let stake = safe_add(self.compounded_front_end_stake(&fe)?, amount)?;
            self.set_front_end_stake(fe, stake);
        }

        self.total_deposits = safe_add(self.total_deposits, amount)?;
        let new_deposit = safe_add(settlement.compounded, amount)?;
        self.set_deposit(depositor, new_deposit, tag);
        self.pay_out(&settlement)?;

        debug!(
            depositor = %depositor.short(),
            %amount,
            %new_deposit,
            "Stability pool deposit"
        );

        Ok(self.change(depositor, settlement, U256::zero(), new_deposit))
    }

    /// Withdraw up to `amount` of the compounded deposit, paying out gains
    ///
    /// Withdrawing zero only claims gains.
    pub fn withdraw(&mut self, depositor: AccountId, amount: U256, now: u64) -> Result<DepositChange> {
        let tag = self
            .deposits
            .get(&depositor)
            .ok_or_else(|| Error::NoDeposit(depositor.to_hex()))?
            .front_end_tag;

        self.trigger_issuance(now)?;
        let settlement = self.settle(&depositor, tag)?;
        let withdrawn = amount.min(settlement.compounded);

        if let Some(fe) = tag {
            let stake = self.compounded_front_end_stake(&fe)?.saturating_sub(withdrawn);
            self.set_front_end_stake(fe, stake);
        }

        self.total_deposits = safe_sub(self.total_deposits, withdrawn)?;
        let new_deposit = settlement.compounded - withdrawn;
        self.set_deposit(depositor, new_deposit, tag);
        self.pay_out(&settlement)?;

        debug!(
            depositor = %depositor.short(),
            %withdrawn,
            %new_deposit,
            "Stability pool withdrawal"
        );

        Ok(self.change(depositor, settlement, withdrawn, new_deposit))
    }

    /// Pay out the collateral gain alone, for moving into the depositor's position
    pub fn take_collateral_gain(&mut self, depositor: AccountId, now: u64) -> Result<DepositChange> {
        let record = self
            .deposits
            .get(&depositor)
            .ok_or_else(|| Error::NoDeposit(depositor.to_hex()))?;
        if record.collateral_gain(&self.ledger)?.is_zero() {
            return Err(Error::NoCollateralGain(depositor.to_hex()));
        }
        let tag = record.front_end_tag;

        self.trigger_issuance(now)?;
        let settlement = self.settle(&depositor, tag)?;

        if let Some(fe) = tag {
            let stake = self.compounded_front_end_stake(&fe)?;
            self.set_front_end_stake(fe, stake);
        }

        let new_deposit = settlement.compounded;
        self.set_deposit(depositor, new_deposit, tag);
        self.pay_out(&settlement)?;

        Ok(self.change(depositor, settlement, U256::zero(), new_deposit))
    }

    fn settle(&self, depositor: &AccountId, tag: Option<AccountId>) -> Result<Settlement> {
        let (compounded, collateral_gain, reward_gain) = match self.deposits.get(depositor) {
            Some(record) => {
                let gross = record.gross_reward_gain(&self.ledger)?;
                let reward = match tag.and_then(|fe| self.front_ends.get(&fe)) {
                    Some(front_end) => front_end.depositor_share(gross)?,
                    None => gross,
                };
                (
                    record.compounded(&self.ledger)?,
                    record.collateral_gain(&self.ledger)?,
                    reward,
                )
            }
            None => (U256::zero(), U256::zero(), U256::zero()),
        };

        let front_end_reward_gain = match tag {
            Some(fe) => self.front_end_reward_gain(&fe)?,
            None => U256::zero(),
        };

        Ok(Settlement {
            compounded,
            collateral_gain,
            reward_gain,
            front_end: tag,
            front_end_reward_gain,
        })
    }

    fn pay_out(&mut self, settlement: &Settlement) -> Result<()> {
        self.collateral_balance = safe_sub(self.collateral_balance, settlement.collateral_gain)?;
        let rewards = safe_add(settlement.reward_gain, settlement.front_end_reward_gain)?;
        self.total_rewards_paid = safe_add(self.total_rewards_paid, rewards)?;
        Ok(())
    }

    fn change(
        &self,
        depositor: AccountId,
        settlement: Settlement,
        withdrawn: U256,
        new_deposit: U256,
    ) -> DepositChange {
        DepositChange {
            depositor,
            collateral_gain: settlement.collateral_gain,
            reward_gain: settlement.reward_gain,
            front_end: settlement.front_end,
            front_end_reward_gain: settlement.front_end_reward_gain,
            withdrawn,
            new_deposit,
        }
    }

    fn set_deposit(&mut self, depositor: AccountId, value: U256, tag: Option<AccountId>) {
        if value.is_zero() {
            self.deposits.remove(&depositor);
            return;
        }
        match self.deposits.get_mut(&depositor) {
            Some(record) => record.refresh(value, &self.ledger),
            None => {
                let record = DepositorRecord::new(value, tag, &self.ledger);
                self.deposits.insert(depositor, record);
            }
        }
    }

    fn set_front_end_stake(&mut self, front_end: AccountId, value: U256) {
        if value.is_zero() {
            self.front_end_stakes.remove(&front_end);
            return;
        }
        let stake = FrontEndStake::new(value, &self.ledger);
        self.front_end_stakes.insert(front_end, stake);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIQUIDATION ABSORPTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Release accrued reward issuance to current depositors
    ///
    /// Issuance accrued while the pool is empty is not distributed.
    pub fn trigger_issuance(&mut self, now: u64) -> Result<U256> {
        let issued = self.issuance.issue(now)?;
        if issued.is_zero() || self.total_deposits.is_zero() {
            return Ok(U256::zero());
        }
        let per_unit = self.issuance.reward_per_unit(issued, self.total_deposits)?;
        self.ledger.add_reward_gain(per_unit)?;
        Ok(issued)
    }

    /// Burn `debt_to_offset` of deposits and credit `coll_to_add` to depositors
    ///
    /// `debt_to_offset` must not exceed the pool's deposits.
    pub fn offset(&mut self, debt_to_offset: U256, coll_to_add: U256, now: u64) -> Result<Option<LossOutcome>> {
        if self.total_deposits.is_zero() || debt_to_offset.is_zero() {
            return Ok(None);
        }

        self.trigger_issuance(now)?;
        let outcome = self.offsets.apply(
            &mut self.ledger,
            debt_to_offset,
            coll_to_add,
            self.total_deposits,
        )?;

        self.total_deposits = safe_sub(self.total_deposits, debt_to_offset)?;
        self.collateral_balance = safe_add(self.collateral_balance, coll_to_add)?;
        self.total_offsets += 1;
        self.total_debt_absorbed = safe_add(self.total_debt_absorbed, debt_to_offset)?;
        self.total_collateral_absorbed = safe_add(self.total_collateral_absorbed, coll_to_add)?;

        match outcome {
            LossOutcome::EpochReset => info!(
                epoch = self.ledger.current_epoch(),
                "Stability pool emptied, new epoch started"
            ),
            LossOutcome::ScaleIncremented => debug!(
                scale = self.ledger.current_scale(),
                "Stability pool product rescaled"
            ),
            LossOutcome::Shrunk => {}
        }

        Ok(Some(outcome))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Current deposit of `depositor` after absorbed losses
    pub fn compounded_deposit(&self, depositor: &AccountId) -> Result<U256> {
        match self.deposits.get(depositor) {
            Some(record) => record.compounded(&self.ledger),
            None => Ok(U256::zero()),
        }
    }

    /// Collateral `depositor` can withdraw
    pub fn depositor_collateral_gain(&self, depositor: &AccountId) -> Result<U256> {
        match self.deposits.get(depositor) {
            Some(record) => record.collateral_gain(&self.ledger),
            None => Ok(U256::zero()),
        }
    }

    /// Reward tokens owed to `depositor`, after the front end's cut
    pub fn depositor_reward_gain(&self, depositor: &AccountId) -> Result<U256> {
        let Some(record) = self.deposits.get(depositor) else {
            return Ok(U256::zero());
        };
        let gross = record.gross_reward_gain(&self.ledger)?;
        match record.front_end_tag.and_then(|fe| self.front_ends.get(&fe)) {
            Some(front_end) => front_end.depositor_share(gross),
            None => Ok(gross),
        }
    }

    /// Reward tokens owed to a front end
    pub fn front_end_reward_gain(&self, front_end: &AccountId) -> Result<U256> {
        let (Some(stake), Some(record)) = (
            self.front_end_stakes.get(front_end),
            self.front_ends.get(front_end),
        ) else {
            return Ok(U256::zero());
        };
        record.front_end_share(stake.gross_reward_gain(&self.ledger)?)
    }

    /// Current aggregate stake of a front end
    pub fn compounded_front_end_stake(&self, front_end: &AccountId) -> Result<U256> {
        match self.front_end_stakes.get(front_end) {
            Some(stake) => stake.compounded(&self.ledger),
            None => Ok(U256::zero()),
        }
    }

    /// Total deposits
    pub fn total_deposits(&self) -> U256 {
        self.total_deposits
    }

    /// Collateral held for depositors
    pub fn collateral_balance(&self) -> U256 {
        self.collateral_balance
    }

    /// Current product factor
    pub fn p(&self) -> U256 {
        self.ledger.p()
    }

    /// Current scale
    pub fn current_scale(&self) -> u64 {
        self.ledger.current_scale()
    }

    /// Current epoch
    pub fn current_epoch(&self) -> u64 {
        self.ledger.current_epoch()
    }

    /// The compounding ledger
    pub fn ledger(&self) -> &FixedPointLedger {
        &self.ledger
    }

    /// Deposit record of `depositor`
    pub fn deposit(&self, depositor: &AccountId) -> Option<&DepositorRecord> {
        self.deposits.get(depositor)
    }

    /// Registration of a front end
    pub fn front_end(&self, front_end: &AccountId) -> Option<&FrontEndRecord> {
        self.front_ends.get(front_end)
    }

    /// Reward tokens issued so far
    pub fn total_rewards_issued(&self) -> U256 {
        self.issuance.total_issued()
    }

    /// Get pool statistics
    pub fn statistics(&self) -> StabilityPoolStats {
        StabilityPoolStats {
            total_deposits: self.total_deposits,
            collateral_balance: self.collateral_balance,
            depositor_count: self.deposits.len(),
            front_end_count: self.front_ends.len(),
            total_offsets: self.total_offsets,
            total_debt_absorbed: self.total_debt_absorbed,
            total_collateral_absorbed: self.total_collateral_absorbed,
            total_rewards_issued: self.issuance.total_issued(),
            total_rewards_paid: self.total_rewards_paid,
            current_epoch: self.ledger.current_epoch(),
            current_scale: self.ledger.current_scale(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SERIALIZATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Hash of the pool-wide accumulators
    pub fn state_hash(&self) -> String {
        let mut data = Vec::new();
        for value in [self.total_deposits, self.collateral_balance, self.ledger.p()] {
            for limb in value.0.iter().rev() {
                data.extend_from_slice(&limb.to_be_bytes());
            }
        }
        data.extend_from_slice(&self.ledger.current_epoch().to_be_bytes());
        data.extend_from_slice(&self.ledger.current_scale().to_be_bytes());
        sha256_hex(&data)
    }
}

/// Pool head and journal positions at a checkpoint
#[derive(Debug, Clone)]
pub struct PoolCheckpoint {
    ledger: LedgerCheckpoint,
    offsets: OffsetProcessor,
    issuance: CommunityIssuance,
    total_deposits: U256,
    collateral_balance: U256,
    total_offsets: u64,
    total_debt_absorbed: U256,
    total_collateral_absorbed: U256,
    total_rewards_paid: U256,
    deposits: usize,
    front_ends: usize,
    front_end_stakes: usize,
}

impl Checkpointed for StabilityPool {
    type Checkpoint = PoolCheckpoint;

    fn checkpoint(&mut self) -> PoolCheckpoint {
        PoolCheckpoint {
            ledger: self.ledger.checkpoint(),
            offsets: self.offsets.clone(),
            issuance: self.issuance.clone(),
            total_deposits: self.total_deposits,
            collateral_balance: self.collateral_balance,
            total_offsets: self.total_offsets,
            total_debt_absorbed: self.total_debt_absorbed,
            total_collateral_absorbed: self.total_collateral_absorbed,
            total_rewards_paid: self.total_rewards_paid,
            deposits: self.deposits.checkpoint(),
            front_ends: self.front_ends.checkpoint(),
            front_end_stakes: self.front_end_stakes.checkpoint(),
        }
    }

    fn commit(&mut self, checkpoint: PoolCheckpoint) {
        self.ledger.commit(checkpoint.ledger);
        self.deposits.commit(checkpoint.deposits);
        self.front_ends.commit(checkpoint.front_ends);
        self.front_end_stakes.commit(checkpoint.front_end_stakes);
    }

    fn rollback(&mut self, checkpoint: PoolCheckpoint) {
        self.ledger.rollback(checkpoint.ledger);
        self.deposits.rollback(checkpoint.deposits);
        self.front_ends.rollback(checkpoint.front_ends);
        self.front_end_stakes.rollback(checkpoint.front_end_stakes);
        self.offsets = checkpoint.offsets;
        self.issuance = checkpoint.issuance;
        self.total_deposits = checkpoint.total_deposits;
        self.collateral_balance = checkpoint.collateral_balance;
        self.total_offsets = checkpoint.total_offsets;
        self.total_debt_absorbed = checkpoint.total_debt_absorbed;
        self.total_collateral_absorbed = checkpoint.total_collateral_absorbed;
        self.total_rewards_paid = checkpoint.total_rewards_paid;
    }
}

/// Stability pool statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityPoolStats {
    /// Sum of compounded deposits
    pub total_deposits: U256,
    /// Collateral held for depositors
    pub collateral_balance: U256,
    /// Depositors with a non-zero deposit
    pub depositor_count: usize,
    /// Registered front ends
    pub front_end_count: usize,
    /// Offsets absorbed
    pub total_offsets: u64,
    /// Debt burned against deposits
    pub total_debt_absorbed: U256,
    /// Collateral received from liquidations
    pub total_collateral_absorbed: U256,
    /// Reward tokens released by the issuance schedule
    pub total_rewards_issued: U256,
    /// Reward tokens paid out
    pub total_rewards_paid: U256,
    /// Current epoch
    pub current_epoch: u64,
    /// Current scale
    pub current_scale: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::math::{abs_diff, dec};

    fn alice() -> AccountId {
        AccountId::from_label("alice")
    }

    fn bob() -> AccountId {
        AccountId::from_label("bob")
    }

    fn front_end() -> AccountId {
        AccountId::from_label("frontend")
    }

    fn pool() -> StabilityPool {
        StabilityPool::default()
    }

    #[test]
    fn test_provide() {
        let mut pool = pool();
        let change = pool.provide(alice(), dec(1_000, 18), None, 0).unwrap();

        assert_eq!(change.new_deposit, dec(1_000, 18));
        assert_eq!(pool.total_deposits(), dec(1_000, 18));
        assert_eq!(pool.compounded_deposit(&alice()).unwrap(), dec(1_000, 18));
        assert_eq!(pool.statistics().depositor_count, 1);
    }

    #[test]
    fn test_provide_zero_rejected() {
        let mut pool = pool();
        assert_eq!(pool.provide(alice(), U256::zero(), None, 0), Err(Error::ZeroAmount));
    }

    #[test]
    fn test_withdraw_partial_and_full() {
        let mut pool = pool();
        pool.provide(alice(), dec(1_000, 18), None, 0).unwrap();

        let change = pool.withdraw(alice(), dec(400, 18), 0).unwrap();
        assert_eq!(change.withdrawn, dec(400, 18));
        assert_eq!(change.new_deposit, dec(600, 18));

        // Requesting more than the deposit withdraws everything
        let change = pool.withdraw(alice(), dec(10_000, 18), 0).unwrap();
        assert_eq!(change.withdrawn, dec(600, 18));
        assert!(pool.deposit(&alice()).is_none());
        assert!(pool.total_deposits().is_zero());
    }

    #[test]
    fn test_withdraw_without_deposit() {
        let mut pool = pool();
        assert!(matches!(
            pool.withdraw(alice(), dec(1, 18), 0),
            Err(Error::NoDeposit(_))
        ));
    }

    #[test]
    fn test_offset_distributes_collateral() {
        let mut pool = pool();
        pool.provide(alice(), dec(100, 18), None, 0).unwrap();
        pool.provide(bob(), dec(300, 18), None, 0).unwrap();

        pool.offset(dec(200, 18), dec(4, 18), 0).unwrap();

        assert_eq!(pool.total_deposits(), dec(200, 18));
        let alice_value = pool.compounded_deposit(&alice()).unwrap();
        let bob_value = pool.compounded_deposit(&bob()).unwrap();
        assert!(abs_diff(alice_value, dec(50, 18)) < U256::from(1_000u64));
        assert!(abs_diff(bob_value, dec(150, 18)) < U256::from(1_000u64));

        let alice_gain = pool.depositor_collateral_gain(&alice()).unwrap();
        let bob_gain = pool.depositor_collateral_gain(&bob()).unwrap();
        assert_eq!(alice_gain, dec(1, 18));
        assert_eq!(bob_gain, dec(3, 18));
        assert!(alice_gain + bob_gain <= pool.collateral_balance());
    }

    #[test]
    fn test_withdraw_pays_collateral_gain() {
        let mut pool = pool();
        pool.provide(alice(), dec(100, 18), None, 0).unwrap();
        pool.offset(dec(50, 18), dec(1, 18), 0).unwrap();

        let change = pool.withdraw(alice(), U256::zero(), 0).unwrap();
        assert_eq!(change.collateral_gain, dec(1, 18));
        assert!(change.withdrawn.is_zero());
        assert!(pool.depositor_collateral_gain(&alice()).unwrap().is_zero());
        assert!(pool.collateral_balance().is_zero());
    }

    #[test]
    fn test_offset_on_empty_pool_is_noop() {
        let mut pool = pool();
        assert_eq!(pool.offset(dec(50, 18), dec(1, 18), 0).unwrap(), None);
        assert_eq!(pool.statistics().total_offsets, 0);
    }

    #[test]
    fn test_offset_exceeding_deposits_rejected() {
        let mut pool = pool();
        pool.provide(alice(), dec(10, 18), None, 0).unwrap();
        assert!(pool.offset(dec(11, 18), dec(1, 18), 0).is_err());
    }

    #[test]
    fn test_take_collateral_gain_requires_gain() {
        let mut pool = pool();
        pool.provide(alice(), dec(10, 18), None, 0).unwrap();
        assert!(matches!(
            pool.take_collateral_gain(alice(), 0),
            Err(Error::NoCollateralGain(_))
        ));

        pool.offset(dec(5, 18), dec(1, 18), 0).unwrap();
        let change = pool.take_collateral_gain(alice(), 0).unwrap();
        assert_eq!(change.collateral_gain, dec(1, 18));
        assert!(abs_diff(change.new_deposit, dec(5, 18)) < U256::from(100u64));
    }

    #[test]
    fn test_front_end_registration() {
        let mut pool = pool();
        pool.register_front_end(front_end(), dec(9, 17), 1).unwrap();

        assert!(matches!(
            pool.register_front_end(front_end(), dec(9, 17), 1),
            Err(Error::FrontEndAlreadyRegistered(_))
        ));
        assert!(pool
            .register_front_end(bob(), DECIMAL_PRECISION + U256::one(), 1)
            .is_err());
        assert!(matches!(
            pool.provide(front_end(), dec(1, 18), None, 0),
            Err(Error::DepositorIsFrontEnd(_))
        ));
        assert!(matches!(
            pool.provide(alice(), dec(1, 18), Some(bob()), 0),
            Err(Error::FrontEndNotRegistered(_))
        ));
    }

    #[test]
    fn test_front_end_kickback() {
        let mut pool = pool();
        pool.register_front_end(front_end(), dec(8, 17), 0).unwrap();
        pool.provide(alice(), dec(1_000, 18), Some(front_end()), 0).unwrap();
        pool.provide(bob(), dec(1_000, 18), None, 0).unwrap();
        assert_eq!(pool.compounded_front_end_stake(&front_end()).unwrap(), dec(1_000, 18));

        // One day of issuance
        pool.trigger_issuance(86_400).unwrap();

        let alice_reward = pool.depositor_reward_gain(&alice()).unwrap();
        let bob_reward = pool.depositor_reward_gain(&bob()).unwrap();
        let fe_reward = pool.front_end_reward_gain(&front_end()).unwrap();

        assert!(!bob_reward.is_zero());
        // Alice keeps 80%, the front end 20% of the same gross gain
        assert!(abs_diff(alice_reward * 10, bob_reward * 8) < U256::from(100u64));
        assert!(abs_diff(fe_reward * 10, bob_reward * 2) < U256::from(100u64));
    }

    #[test]
    fn test_front_end_stake_follows_withdrawal() {
        let mut pool = pool();
        pool.register_front_end(front_end(), dec(1, 18), 0).unwrap();
        pool.provide(alice(), dec(100, 18), Some(front_end()), 0).unwrap();
        pool.withdraw(alice(), dec(40, 18), 0).unwrap();
        assert_eq!(pool.compounded_front_end_stake(&front_end()).unwrap(), dec(60, 18));

        pool.withdraw(alice(), dec(60, 18), 0).unwrap();
        assert!(pool.compounded_front_end_stake(&front_end()).unwrap().is_zero());
    }

    #[test]
    fn test_getters_idempotent() {
        let mut pool = pool();
        pool.provide(alice(), dec(77, 18), None, 0).unwrap();
        pool.offset(dec(7, 18), dec(1, 17), 0).unwrap();

        let first = (
            pool.compounded_deposit(&alice()).unwrap(),
            pool.depositor_collateral_gain(&alice()).unwrap(),
            pool.depositor_reward_gain(&alice()).unwrap(),
        );
        let second = (
            pool.compounded_deposit(&alice()).unwrap(),
            pool.depositor_collateral_gain(&alice()).unwrap(),
            pool.depositor_reward_gain(&alice()).unwrap(),
        );
        assert_eq!(first, second);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let mut pool = pool();
        pool.provide(alice(), dec(100, 18), None, 0).unwrap();
        pool.offset(dec(30, 18), dec(1, 18), 0).unwrap();

        let bytes = pool.to_bytes().unwrap();
        let restored = StabilityPool::from_bytes(&bytes).unwrap();

        assert_eq!(restored.state_hash(), pool.state_hash());
        assert_eq!(
            restored.compounded_deposit(&alice()).unwrap(),
            pool.compounded_deposit(&alice()).unwrap()
        );
    }

    #[test]
    fn test_rollback_restores_deposits_and_ledger() {
        let mut pool = pool();
        pool.register_front_end(front_end(), dec(9, 17), 0).unwrap();
        pool.provide(alice(), dec(100, 18), Some(front_end()), 0).unwrap();
        pool.provide(bob(), dec(50, 18), None, 0).unwrap();
        let hash = pool.state_hash();

        let cp = pool.checkpoint();
        pool.offset(dec(150, 18), dec(3, 18), 3_600).unwrap();
        pool.provide(alice(), dec(10, 18), None, 3_600).unwrap();
        pool.withdraw(bob(), dec(5, 18), 3_600).unwrap();
        pool.rollback(cp);

        assert_eq!(pool.state_hash(), hash);
        assert_eq!(pool.compounded_deposit(&alice()).unwrap(), dec(100, 18));
        assert_eq!(pool.compounded_deposit(&bob()).unwrap(), dec(50, 18));
        assert_eq!(pool.compounded_front_end_stake(&front_end()).unwrap(), dec(100, 18));
        assert!(pool.depositor_collateral_gain(&alice()).unwrap().is_zero());
        assert!(pool.total_rewards_issued().is_zero());
    }
}
