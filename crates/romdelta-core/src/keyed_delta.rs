#![forbid(unsafe_code)]

//! Address-keyed added/removed change sets.
//!
//! A [`KeyedDelta`] records the net effect of a sequence of add and remove
//! calls against one symbolic index (runs, anchors, unmapped pointers, or
//! matched words) during a single transaction.
//!
//! # Invariants
//!
//! - add after add at the same key overwrites the added value
//! - remove after add at the same key cancels: the add is dropped and
//!   nothing is recorded as removed
//! - remove without a prior add records into `removed`, first remove wins
//! - consequently a key never sits in both maps because of an add that was
//!   later removed
//!
//! Keys are unique; iteration order is unspecified. Only minimum-key
//! queries are ordered.

use rustc_hash::FxHashMap;

use crate::Address;

/// Net additions and removals for one index, keyed by address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedDelta<V> {
    added: FxHashMap<Address, V>,
    removed: FxHashMap<Address, V>,
}

impl<V> Default for KeyedDelta<V> {
    fn default() -> Self {
        Self {
            added: FxHashMap::default(),
            removed: FxHashMap::default(),
        }
    }
}

impl<V> KeyedDelta<V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` as added at `key`, replacing any earlier add.
    pub fn add(&mut self, key: Address, value: V) {
        self.added.insert(key, value);
    }

    /// Record `value` as removed from `key`.
    ///
    /// Cancels a pending add at the same key instead of recording a remove.
    pub fn remove(&mut self, key: Address, value: V) {
        if self.added.remove(&key).is_some() {
            return;
        }
        self.removed.entry(key).or_insert(value);
    }

    /// Entries added during the transaction.
    #[must_use]
    pub fn added(&self) -> &FxHashMap<Address, V> {
        &self.added
    }

    /// Entries that existed before the transaction and are gone after it.
    #[must_use]
    pub fn removed(&self) -> &FxHashMap<Address, V> {
        &self.removed
    }

    /// True when neither map holds anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Total entries across both maps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len()
    }

    /// Smallest key in `added`.
    #[must_use]
    pub fn min_added(&self) -> Option<Address> {
        self.added.keys().min().copied()
    }

    /// Smallest key in `removed`.
    #[must_use]
    pub fn min_removed(&self) -> Option<Address> {
        self.removed.keys().min().copied()
    }

    /// Smallest key in `added` whose value satisfies `keep`.
    pub fn min_added_where(&self, keep: impl Fn(&V) -> bool) -> Option<Address> {
        min_key_where(&self.added, keep)
    }

    /// Smallest key in `removed` whose value satisfies `keep`.
    pub fn min_removed_where(&self, keep: impl Fn(&V) -> bool) -> Option<Address> {
        min_key_where(&self.removed, keep)
    }

    /// Consume the delta, swapping added and removed.
    #[must_use]
    pub fn into_inverse(self) -> Self {
        Self {
            added: self.removed,
            removed: self.added,
        }
    }
}

impl<V: Clone> KeyedDelta<V> {
    /// The opposite change set: everything added becomes removed and vice
    /// versa.
    #[must_use]
    pub fn inverse(&self) -> Self {
        self.clone().into_inverse()
    }
}

fn min_key_where<V>(map: &FxHashMap<Address, V>, keep: impl Fn(&V) -> bool) -> Option<Address> {
    map.iter()
        .filter(|(_, v)| keep(v))
        .map(|(k, _)| *k)
        .min()
}
