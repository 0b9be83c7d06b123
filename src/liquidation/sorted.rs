//! Active positions ordered by nominal collateral ratio.
//!
//! The key is `coll × 1e20 / debt` including pending redistribution at the
//! time of the last touch. It does not depend on price, so the order only
//! changes when a position's own amounts change.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::utils::ids::AccountId;
use crate::utils::journal::Checkpointed;

/// Sorted index of active positions, lowest ratio first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SortedPositions {
    /// `(nicr, owner)` ascending; the owner breaks ties
    order: BTreeSet<(U256, AccountId)>,
    /// Current key per owner
    keys: HashMap<AccountId, U256>,
    /// Previous key of every owner moved since the outermost checkpoint
    #[serde(skip)]
    journal: Vec<(AccountId, Option<U256>)>,
    #[serde(skip)]
    open: usize,
}

impl SortedPositions {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or re-position an owner
    pub fn insert(&mut self, owner: AccountId, nicr: U256) {
        let previous = self.place(owner, Some(nicr));
        self.record(owner, previous);
    }

    /// Remove an owner; returns false if absent
    pub fn remove(&mut self, owner: &AccountId) -> bool {
        if !self.keys.contains_key(owner) {
            return false;
        }
        let previous = self.place(*owner, None);
        self.record(*owner, previous);
        true
    }

    fn record(&mut self, owner: AccountId, previous: Option<U256>) {
        if self.open > 0 {
            self.journal.push((owner, previous));
        }
    }

    /// Move `owner` to `nicr`, or drop it for `None`; returns the old key
    fn place(&mut self, owner: AccountId, nicr: Option<U256>) -> Option<U256> {
        let previous = match nicr {
            Some(key) => self.keys.insert(owner, key),
            None => self.keys.remove(&owner),
        };
        if let Some(old) = previous {
            self.order.remove(&(old, owner));
        }
        if let Some(key) = nicr {
            self.order.insert((key, owner));
        }
        previous
    }

    /// Check if an owner is indexed
    pub fn contains(&self, owner: &AccountId) -> bool {
        self.keys.contains_key(owner)
    }

    /// Current key of an owner
    pub fn nicr(&self, owner: &AccountId) -> Option<U256> {
        self.keys.get(owner).copied()
    }

    /// Lowest-ratio owner
    pub fn first(&self) -> Option<AccountId> {
        self.order.iter().next().map(|(_, owner)| *owner)
    }

    /// Highest-ratio owner
    pub fn last(&self) -> Option<AccountId> {
        self.order.iter().next_back().map(|(_, owner)| *owner)
    }

    /// Owners from the lowest ratio upward
    pub fn ascending(&self) -> impl DoubleEndedIterator<Item = AccountId> + '_ {
        self.order.iter().map(|(_, owner)| *owner)
    }

    /// Number of indexed owners
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn close(&mut self) {
        self.open = self.open.saturating_sub(1);
        if self.open == 0 {
            self.journal.clear();
        }
    }
}

impl Checkpointed for SortedPositions {
    type Checkpoint = usize;

    fn checkpoint(&mut self) -> usize {
        self.open += 1;
        self.journal.len()
    }

    fn commit(&mut self, _checkpoint: usize) {
        self.close();
    }

    fn rollback(&mut self, checkpoint: usize) {
        let start = checkpoint.min(self.journal.len());
        let undo: Vec<_> = self.journal.drain(start..).rev().collect();
        for (owner, previous) in undo {
            self.place(owner, previous);
        }
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(label: &str) -> AccountId {
        AccountId::from_label(label)
    }

    #[test]
    fn test_ordering() {
        let mut sorted = SortedPositions::new();
        sorted.insert(id("a"), U256::from(150u64));
        sorted.insert(id("b"), U256::from(110u64));
        sorted.insert(id("c"), U256::from(200u64));

        assert_eq!(sorted.first(), Some(id("b")));
        assert_eq!(sorted.last(), Some(id("c")));
        assert_eq!(
            sorted.ascending().collect::<Vec<_>>(),
            vec![id("b"), id("a"), id("c")]
        );
        assert_eq!(sorted.ascending().take(2).count(), 2);
        assert_eq!(sorted.len(), 3);
    }

    #[test]
    fn test_reinsert_moves_owner() {
        let mut sorted = SortedPositions::new();
        sorted.insert(id("a"), U256::from(150u64));
        sorted.insert(id("b"), U256::from(110u64));

        sorted.insert(id("b"), U256::from(300u64));
        assert_eq!(sorted.first(), Some(id("a")));
        assert_eq!(sorted.len(), 2);
        assert_eq!(sorted.nicr(&id("b")), Some(U256::from(300u64)));
    }

    #[test]
    fn test_remove() {
        let mut sorted = SortedPositions::new();
        sorted.insert(id("a"), U256::from(150u64));
        assert!(sorted.contains(&id("a")));
        assert!(sorted.remove(&id("a")));
        assert!(!sorted.remove(&id("a")));
        assert!(sorted.is_empty());
        assert_eq!(sorted.first(), None);
    }

    #[test]
    fn test_equal_keys_kept() {
        let mut sorted = SortedPositions::new();
        sorted.insert(id("a"), U256::from(100u64));
        sorted.insert(id("b"), U256::from(100u64));
        assert_eq!(sorted.len(), 2);
        assert_eq!(sorted.ascending().count(), 2);
    }

    #[test]
    fn test_rollback_restores_order() {
        let mut sorted = SortedPositions::new();
        sorted.insert(id("a"), U256::from(150u64));
        sorted.insert(id("b"), U256::from(110u64));

        let cp = sorted.checkpoint();
        sorted.remove(&id("b"));
        sorted.insert(id("a"), U256::from(90u64));
        sorted.insert(id("c"), U256::from(50u64));
        sorted.rollback(cp);

        assert_eq!(
            sorted.ascending().collect::<Vec<_>>(),
            vec![id("b"), id("a")]
        );
        assert_eq!(sorted.nicr(&id("a")), Some(U256::from(150u64)));
        assert!(!sorted.contains(&id("c")));
    }
}
