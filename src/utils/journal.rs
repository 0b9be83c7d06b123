//! Undo journals for rolling back a failed operation in place.
//!
//! A checkpoint remembers where the journal stood when an operation began.
//! Every write made after it records the value it replaced, so rolling back
//! only revisits the entries the operation touched, never the whole map.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;

/// State that can be rolled back to a checkpoint
///
/// Checkpoints nest: each `checkpoint` must be matched by exactly one
/// `commit` or `rollback`, innermost first.
pub trait Checkpointed {
    /// Whatever is needed to undo back to the checkpoint
    type Checkpoint;

    /// Open a checkpoint
    fn checkpoint(&mut self) -> Self::Checkpoint;

    /// Keep every change made since the checkpoint
    fn commit(&mut self, checkpoint: Self::Checkpoint);

    /// Undo every change made since the checkpoint
    fn rollback(&mut self, checkpoint: Self::Checkpoint);
}

/// Hash map that journals previous values while a checkpoint is open
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "K: Serialize + Eq + Hash, V: Serialize",
    deserialize = "K: Deserialize<'de> + Eq + Hash, V: Deserialize<'de>"
))]
pub struct JournaledMap<K, V> {
    entries: HashMap<K, V>,
    #[serde(skip)]
    journal: Vec<(K, Option<V>)>,
    #[serde(skip)]
    open: usize,
}

impl<K, V> Default for JournaledMap<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            journal: Vec::new(),
            open: 0,
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> JournaledMap<K, V> {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, key: &K) {
        if self.open > 0 {
            self.journal.push((key.clone(), self.entries.get(key).cloned()));
        }
    }

    /// Value stored under `key`
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// Mutable access; the current value is journaled first
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        if !self.entries.contains_key(key) {
            return None;
        }
        self.record(key);
        self.entries.get_mut(key)
    }

    /// Check if `key` is present
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert, returning the replaced value
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.record(&key);
        self.entries.insert(key, value)
    }

    /// Remove, returning the removed value
    pub fn remove(&mut self, key: &K) -> Option<V> {
        if !self.entries.contains_key(key) {
            return None;
        }
        self.record(key);
        self.entries.remove(key)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterate over values
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values()
    }

    #[cfg(test)]
    fn journal_len(&self) -> usize {
        self.journal.len()
    }

    fn close(&mut self) {
        self.open = self.open.saturating_sub(1);
        if self.open == 0 {
            self.journal.clear();
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Checkpointed for JournaledMap<K, V> {
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
        for (key, previous) in self.journal.drain(start..).rev() {
            match previous {
                Some(value) => {
                    self.entries.insert(key, value);
                }
                None => {
                    self.entries.remove(&key);
                }
            }
        }
        self.close();
    }
}
