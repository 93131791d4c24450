#![forbid(unsafe_code)]

//! In-memory [`DataModel`] used by tools and tests.
//!
//! Bytes live in a `Vec<u8>`; runs, unmapped pointers and matched words in
//! ordered maps; anchors in a pair of hash maps kept in lockstep so lookups
//! work in both directions.
//!
//! Editing helpers (`observe_run`, `set_anchor`, ...) update the indices and
//! record the change on a [`ChangeToken`] in the same call, so an open
//! transaction always knows how to put things back.

use std::collections::BTreeMap;
use std::ops::Bound;

use rustc_hash::FxHashMap;

use crate::model::{ChangeToken, DataModel, IndexUpdate, WORD_WIDTH};
use crate::{Address, ChangeError, ERASED_BYTE, ModelError, Run};

/// Largest cartridge image the model will grow to by default (32 MiB).
pub const DEFAULT_CAPACITY: usize = 0x0200_0000;

/// A ROM image held entirely in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryModel {
    data: Vec<u8>,
    capacity: usize,
    runs: BTreeMap<Address, Run>,
    anchors: FxHashMap<Address, String>,
    anchor_addresses: FxHashMap<String, Address>,
    unmapped_pointers: BTreeMap<Address, String>,
    matched_words: BTreeMap<Address, String>,
}

impl Default for MemoryModel {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl MemoryModel {
    /// Wrap existing bytes with empty indices.
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        let capacity = DEFAULT_CAPACITY.max(data.len());
        Self {
            data,
            capacity,
            runs: BTreeMap::new(),
            anchors: FxHashMap::default(),
            anchor_addresses: FxHashMap::default(),
            unmapped_pointers: BTreeMap::new(),
            matched_words: BTreeMap::new(),
        }
    }

    /// A model of `len` erased bytes.
    #[must_use]
    pub fn erased(len: usize) -> Self {
        Self::new(vec![ERASED_BYTE; len])
    }

    /// Limit how far the model may grow.
    #[must_use]
    pub fn with_capacity_limit(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(self.data.len());
        self
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Runs in address order.
    pub fn runs(&self) -> impl Iterator<Item = &Run> {
        self.runs.values()
    }

    /// The run starting exactly at `start`.
    #[must_use]
    pub fn run_at(&self, start: Address) -> Option<&Run> {
        self.runs.get(&start)
    }

    /// Anchors in address order.
    #[must_use]
    pub fn anchors(&self) -> BTreeMap<Address, &str> {
        self.anchors
            .iter()
            .map(|(address, name)| (*address, name.as_str()))
            .collect()
    }

    #[must_use]
    pub fn unmapped_pointers(&self) -> &BTreeMap<Address, String> {
        &self.unmapped_pointers
    }

    #[must_use]
    pub fn matched_words(&self) -> &BTreeMap<Address, String> {
        &self.matched_words
    }

    // ========================================================================
    // Recorded edits
    // ========================================================================

    /// Add `run`, clearing every run it overlaps.
    pub fn observe_run(&mut self, token: &mut dyn ChangeToken, run: Run) {
        let overlapping: Vec<Address> = self
            .runs
            .values()
            .filter(|existing| overlaps(existing, &run))
            .map(Run::start)
            .collect();
        for start in overlapping {
            self.clear_run(token, start);
        }
        token.add_run(&run);
        self.runs.insert(run.start(), run);
    }

    /// Remove the run starting at `start`.
    pub fn clear_run(&mut self, token: &mut dyn ChangeToken, start: Address) -> Option<Run> {
        let run = self.runs.remove(&start)?;
        token.remove_run(&run);
        Some(run)
    }

    /// Bind `name` to `address`.
    ///
    /// A name lives at one address and an address carries one name, so any
    /// previous binding of either is cleared first. Forward references to
    /// `name` are resolved and their source addresses returned.
    pub fn set_anchor(
        &mut self,
        token: &mut dyn ChangeToken,
        address: Address,
        name: &str,
    ) -> Vec<Address> {
        if let Some(previous) = self.anchor_addresses.get(name).copied() {
            if previous == address {
                return Vec::new();
            }
            self.clear_anchor(token, previous);
        }
        self.clear_anchor(token, address);

        token.add_name(address, name);
        self.anchors.insert(address, name.to_string());
        self.anchor_addresses.insert(name.to_string(), address);
        self.resolve_unmapped_pointers(token, name)
    }

    /// Unbind whatever name sits at `address`.
    pub fn clear_anchor(&mut self, token: &mut dyn ChangeToken, address: Address) -> Option<String> {
        let name = self.anchors.remove(&address)?;
        if self.anchor_addresses.get(&name) == Some(&address) {
            self.anchor_addresses.remove(&name);
        }
        token.remove_name(address, &name);
        Some(name)
    }

    /// Record that the pointer at `address` refers to a name not yet bound,
    /// replacing any forward reference already recorded there.
    pub fn add_unmapped_pointer(&mut self, token: &mut dyn ChangeToken, address: Address, name: &str) {
        if let Some(previous) = self.unmapped_pointers.remove(&address) {
            token.remove_unmapped_pointer(address, &previous);
        }
        token.add_unmapped_pointer(address, name);
        self.unmapped_pointers.insert(address, name.to_string());
    }

    /// Drop every forward reference to `name`, returning their addresses.
    pub fn resolve_unmapped_pointers(
        &mut self,
        token: &mut dyn ChangeToken,
        name: &str,
    ) -> Vec<Address> {
        let sources: Vec<Address> = self
            .unmapped_pointers
            .iter()
            .filter(|(_, target)| target.as_str() == name)
            .map(|(address, _)| *address)
            .collect();
        for source in &sources {
            if let Some(target) = self.unmapped_pointers.remove(source) {
                token.remove_unmapped_pointer(*source, &target);
            }
        }
        sources
    }

    /// Bind the count field at `address` to the table anchored as `parent`
    /// and write the table's current element count into it. An existing
    /// binding at `address` is replaced.
    ///
    /// The model is grown to fit the field first; if that fails the existing
    /// binding is left in place.
    pub fn bind_matched_word(
        &mut self,
        token: &mut dyn ChangeToken,
        address: Address,
        parent: &str,
    ) -> Result<(), ChangeError> {
        if token.is_read_only() {
            return Err(ChangeError::ReadOnly);
        }
        let end = self.span_end(address, WORD_WIDTH)?;
        self.expand_to(end)?;
        self.unbind_matched_word(token, address);
        token.add_matched_word(self, address, parent)?;
        self.matched_words.insert(address, parent.to_string());
        Ok(())
    }

    /// Remove the matched-word binding at `address`. The bytes stay as they
    /// are.
    pub fn unbind_matched_word(
        &mut self,
        token: &mut dyn ChangeToken,
        address: Address,
    ) -> Option<String> {
        let parent = self.matched_words.remove(&address)?;
        token.remove_matched_word(address, &parent);
        Some(parent)
    }

    fn unbind_anchor_raw(&mut self, address: Address) {
        if let Some(name) = self.anchors.remove(&address) {
            if self.anchor_addresses.get(&name) == Some(&address) {
                self.anchor_addresses.remove(&name);
            }
        }
    }

    fn bind_anchor_raw(&mut self, address: Address, name: &str) {
        self.anchors.insert(address, name.to_string());
        self.anchor_addresses.insert(name.to_string(), address);
    }
}

/// Zero-length runs still occupy their start byte.
fn overlaps(a: &Run, b: &Run) -> bool {
    let a_end = a.end().max(a.start() + 1);
    let b_end = b.end().max(b.start() + 1);
    a.start() < b_end && b.start() < a_end
}

impl DataModel for MemoryModel {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn read(&self, address: Address) -> Option<u8> {
        self.data.get(address).copied()
    }

    fn write_raw(&mut self, address: Address, value: u8) -> Result<(), ModelError> {
        let len = self.data.len();
        let slot = self
            .data
            .get_mut(address)
            .ok_or(ModelError::AddressOutOfRange { address, len })?;
        *slot = value;
        Ok(())
    }

    fn expand_to(&mut self, min_len: usize) -> Result<(), ModelError> {
        if min_len <= self.data.len() {
            return Ok(());
        }
        if min_len > self.capacity {
            return Err(ModelError::CapacityExceeded {
                requested: min_len,
                capacity: self.capacity,
            });
        }
        self.data.resize(min_len, ERASED_BYTE);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn next_run(&self, address: Address) -> Option<&Run> {
        if let Some((_, run)) = self.runs.range(..=address).next_back() {
            if run.contains(address) {
                return Some(run);
            }
        }
        self.runs
            .range((Bound::Excluded(address), Bound::Unbounded))
            .next()
            .map(|(_, run)| run)
    }

    fn address_of_anchor(&self, name: &str) -> Option<Address> {
        self.anchor_addresses.get(name).copied()
    }

    fn anchor_at(&self, address: Address) -> Option<&str> {
        self.anchors.get(&address).map(String::as_str)
    }

    fn mass_update(&mut self, update: IndexUpdate<'_>) {
        #[cfg(feature = "tracing")]
        tracing::trace!(
            target: "romdelta.model",
            runs = update.runs.len(),
            names = update.names.len(),
            unmapped_pointers = update.unmapped_pointers.len(),
            matched_words = update.matched_words.len(),
            "mass update"
        );

        // Strip every added entry before reinstating removed ones; a key can
        // appear on both sides.
        for start in update.runs.added().keys() {
            self.runs.remove(start);
        }
        for address in update.names.added().keys() {
            self.unbind_anchor_raw(*address);
        }
        for address in update.unmapped_pointers.added().keys() {
            self.unmapped_pointers.remove(address);
        }
        for address in update.matched_words.added().keys() {
            self.matched_words.remove(address);
        }

        for (start, run) in update.runs.removed() {
            self.runs.insert(*start, run.clone());
        }
        for (address, name) in update.names.removed() {
            self.bind_anchor_raw(*address, name);
        }
        for (address, name) in update.unmapped_pointers.removed() {
            self.unmapped_pointers.insert(*address, name.clone());
        }
        for (address, parent) in update.matched_words.removed() {
            self.matched_words.insert(*address, parent.clone());
        }
    }
}
