#![forbid(unsafe_code)]

//! A single reversible transaction against a [`DataModel`].
//!
//! [`ModelDelta`] records one conceptual change: byte edits, runs added or
//! removed, anchors bound or unbound, forward references recorded or
//! resolved, and matched-word bindings. Mutations hit the model immediately;
//! the delta keeps what is needed to take them back.
//!
//! # Invariants
//!
//! - A byte's original value is captured on the first write to it and never
//!   overwritten by later writes in the same transaction.
//! - Adding then removing the same key in one category nets to nothing (see
//!   [`KeyedDelta`]).
//! - `revert` restores the model exactly and returns a delta whose own
//!   `revert` restores the post-transaction state exactly.
//!
//! # Failure Modes
//!
//! - **Read-only token**: every byte write fails with
//!   [`ChangeError::ReadOnly`]; model and delta stay untouched.
//! - **Capacity**: growth errors from the model propagate unchanged.
//! - **Shrunk model**: reverting against a model shorter than a recorded
//!   byte edit fails before anything is written.

use std::fmt;

use rustc_hash::FxHashMap;
use web_time::Instant;

use romdelta_core::model::WORD_WIDTH;
use romdelta_core::{
    Address, ChangeError, ChangeToken, DataModel, IndexUpdate, KeyedDelta, ModelError, Run,
};

use super::signal::ChangeSignal;

/// One atomic, exactly reversible change to a model and its indices.
#[derive(Default)]
pub struct ModelDelta {
    /// Value of each touched byte before the transaction first wrote it.
    old_data: FxHashMap<Address, u8>,
    runs: KeyedDelta<Run>,
    names: KeyedDelta<String>,
    unmapped_pointers: KeyedDelta<String>,
    matched_words: KeyedDelta<String>,
    data_changed: ChangeSignal,
    read_only: bool,
}

impl fmt::Debug for ModelDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDelta")
            .field("bytes", &self.old_data.len())
            .field("runs", &self.runs.len())
            .field("names", &self.names.len())
            .field("unmapped_pointers", &self.unmapped_pointers.len())
            .field("matched_words", &self.matched_words.len())
            .field("has_data_change", &self.has_data_change())
            .field("read_only", &self.read_only)
            .finish()
    }
}

impl ModelDelta {
    /// Create an empty transaction.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A transaction that refuses to change model data.
    ///
    /// Hand this to APIs that require a change token when the caller must
    /// not write: any byte write through it fails with
    /// [`ChangeError::ReadOnly`].
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    /// Run `f` once, the first time this transaction changes a byte.
    pub fn on_new_data_change(&mut self, f: impl FnOnce() + Send + 'static) {
        self.data_changed.subscribe(f);
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Whether any byte has changed during this transaction.
    #[must_use]
    pub fn has_data_change(&self) -> bool {
        self.data_changed.has_fired()
    }

    /// Whether reverting this transaction would have any effect.
    #[must_use]
    pub fn has_any_change(&self) -> bool {
        self.has_data_change()
            || !self.runs.is_empty()
            || !self.names.is_empty()
            || !self.unmapped_pointers.is_empty()
            || !self.matched_words.is_empty()
    }

    /// Inverse of [`has_any_change`](Self::has_any_change).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.has_any_change()
    }

    /// Lowest address the transaction touched, for scrolling a view to it.
    ///
    /// Categories are probed in a fixed priority order and the first
    /// non-empty one wins, so byte edits beat an anchor at a lower address.
    /// Placeholder runs are ignored. Matched words always come with byte
    /// edits and are not probed.
    #[must_use]
    pub fn earliest_change(&self) -> Option<Address> {
        let informative = |run: &Run| !run.is_no_info();
        self.old_data
            .keys()
            .min()
            .copied()
            .or_else(|| self.names.min_added())
            .or_else(|| self.runs.min_added_where(informative))
            .or_else(|| self.unmapped_pointers.min_added())
            .or_else(|| self.names.min_removed())
            .or_else(|| self.runs.min_removed_where(informative))
            .or_else(|| self.unmapped_pointers.min_removed())
    }

    /// Original byte values, keyed by address.
    #[must_use]
    pub fn old_data(&self) -> &FxHashMap<Address, u8> {
        &self.old_data
    }

    #[must_use]
    pub fn runs(&self) -> &KeyedDelta<Run> {
        &self.runs
    }

    #[must_use]
    pub fn names(&self) -> &KeyedDelta<String> {
        &self.names
    }

    #[must_use]
    pub fn unmapped_pointers(&self) -> &KeyedDelta<String> {
        &self.unmapped_pointers
    }

    #[must_use]
    pub fn matched_words(&self) -> &KeyedDelta<String> {
        &self.matched_words
    }

    /// All four index changes, ready for [`DataModel::mass_update`].
    #[must_use]
    pub fn index_update(&self) -> IndexUpdate<'_> {
        IndexUpdate {
            runs: &self.runs,
            names: &self.names,
            unmapped_pointers: &self.unmapped_pointers,
            matched_words: &self.matched_words,
        }
    }

    /// Approximate heap and inline footprint, for history budgeting.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        let entry = std::mem::size_of::<Address>();
        let strings = |delta: &KeyedDelta<String>| -> usize {
            delta
                .added()
                .values()
                .chain(delta.removed().values())
                .map(|s| entry + std::mem::size_of::<String>() + s.len())
                .sum()
        };
        std::mem::size_of::<Self>()
            + self.old_data.len() * (entry + 1)
            + self.runs.len() * (entry + std::mem::size_of::<Run>())
            + strings(&self.names)
            + strings(&self.unmapped_pointers)
            + strings(&self.matched_words)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Bind a matched word of `width` bytes (1 to 4) at `address`.
    ///
    /// The parent's element count is written through
    /// [`change_data`](ChangeToken::change_data), so the bytes revert with
    /// the transaction. An unresolvable parent (no such anchor, or no table
    /// there) writes zero instead of failing. Any other width fails with
    /// [`ChangeError::InvalidWidth`] and records nothing.
    pub fn add_matched_word_sized(
        &mut self,
        model: &mut dyn DataModel,
        address: Address,
        parent_name: &str,
        width: usize,
    ) -> Result<(), ChangeError> {
        let count = model
            .address_of_anchor(parent_name)
            .and_then(|parent| model.next_run(parent))
            .and_then(Run::element_count);
        if count.is_none() {
            tracing::debug!(
                target: "romdelta.delta",
                address = address,
                parent = %parent_name,
                "matched word parent unresolved, writing zero"
            );
        }
        let value = count.map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX));
        self.write_sized_value(model, address, width, value)?;
        self.matched_words.add(address, parent_name.to_string());
        Ok(())
    }

    // ========================================================================
    // Revert
    // ========================================================================

    /// Undo every recorded change against `model` and return the opposite
    /// transaction.
    ///
    /// Bytes are restored first, then all index changes are applied with a
    /// single [`DataModel::mass_update`] call. The returned delta records the
    /// values the bytes held just before the revert, so reverting it redoes
    /// this transaction exactly.
    pub fn revert(&self, model: &mut dyn DataModel) -> Result<ModelDelta, ChangeError> {
        let start = Instant::now();
        let span = tracing::debug_span!(
            "delta.revert",
            bytes = self.old_data.len(),
            index_entries = self.index_update().len(),
            duration_us = tracing::field::Empty,
        );
        let _guard = span.enter();

        let len = model.len();
        if let Some(address) = self.old_data.keys().copied().find(|a| *a >= len) {
            tracing::warn!(
                target: "romdelta.delta",
                address = address,
                len = len,
                "revert target shorter than recorded edit"
            );
            return Err(ModelError::AddressOutOfRange { address, len }.into());
        }

        let mut reverse = ModelDelta {
            data_changed: ChangeSignal::with_state(self.has_data_change()),
            ..ModelDelta::default()
        };

        for (&address, &old) in &self.old_data {
            let current = model
                .read(address)
                .ok_or(ModelError::AddressOutOfRange { address, len })?;
            reverse.old_data.insert(address, current);
            model.write_raw(address, old)?;
        }

        reverse.runs = self.runs.inverse();
        reverse.names = self.names.inverse();
        reverse.unmapped_pointers = self.unmapped_pointers.inverse();
        reverse.matched_words = self.matched_words.inverse();

        model.mass_update(self.index_update());

        let duration_us = start.elapsed().as_micros() as u64;
        span.record("duration_us", duration_us);
        tracing::debug!(
            target: "romdelta.delta",
            bytes = self.old_data.len(),
            runs = self.runs.len(),
            names = self.names.len(),
            unmapped_pointers = self.unmapped_pointers.len(),
            matched_words = self.matched_words.len(),
            duration_us = duration_us,
            "delta reverted"
        );

        Ok(reverse)
    }
}

impl ChangeToken for ModelDelta {
    /// Grow the model to cover `address` if needed, then write `value`.
    ///
    /// Writing the value already present is a no-op. Growth is not recorded.
    fn change_data(
        &mut self,
        model: &mut dyn DataModel,
        address: Address,
        value: u8,
    ) -> Result<(), ChangeError> {
        if self.read_only {
            return Err(ChangeError::ReadOnly);
        }
        let end = model.span_end(address, 1)?;
        if model.len() < end {
            model.expand_to(end)?;
        }
        let current = model.read(address).ok_or(ModelError::AddressOutOfRange {
            address,
            len: model.len(),
        })?;
        if current == value {
            return Ok(());
        }

        self.old_data.entry(address).or_insert(current);
        model.write_raw(address, value)?;

        if self.data_changed.raise() {
            tracing::debug!(
                target: "romdelta.delta",
                address = address,
                "first data change in transaction"
            );
        }
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn add_run(&mut self, run: &Run) {
        self.runs.add(run.start(), run.clone());
    }

    fn remove_run(&mut self, run: &Run) {
        self.runs.remove(run.start(), run.clone());
    }

    fn add_name(&mut self, address: Address, name: &str) {
        self.names.add(address, name.to_string());
    }

    fn remove_name(&mut self, address: Address, name: &str) {
        self.names.remove(address, name.to_string());
    }

    fn add_unmapped_pointer(&mut self, address: Address, name: &str) {
        self.unmapped_pointers.add(address, name.to_string());
    }

    fn remove_unmapped_pointer(&mut self, address: Address, name: &str) {
        self.unmapped_pointers.remove(address, name.to_string());
    }

    fn add_matched_word(
        &mut self,
        model: &mut dyn DataModel,
        address: Address,
        parent_name: &str,
    ) -> Result<(), ChangeError> {
        self.add_matched_word_sized(model, address, parent_name, WORD_WIDTH)
    }

    fn remove_matched_word(&mut self, address: Address, parent_name: &str) {
        self.matched_words.remove(address, parent_name.to_string());
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use romdelta_core::{MemoryModel, RunFormat};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn model_with(len: usize, fill: u8) -> MemoryModel {
        MemoryModel::new(vec![fill; len])
    }

    #[test]
    fn new_delta_is_empty() {
        let delta = ModelDelta::new();
        assert!(delta.is_empty());
        assert!(!delta.has_data_change());
        assert_eq!(delta.earliest_change(), None);
    }

    #[test]
    fn write_then_overwrite_keeps_first_original() {
        let mut model = model_with(0x20, 0x00);
        let mut delta = ModelDelta::new();

        delta.change_data(&mut model, 0x10, 0xFF).unwrap();
        delta.change_data(&mut model, 0x10, 0xAB).unwrap();

        assert_eq!(model.read(0x10), Some(0xAB));
        assert_eq!(delta.old_data().get(&0x10), Some(&0x00));

        let redo = delta.revert(&mut model).unwrap();
        assert_eq!(model.read(0x10), Some(0x00));
        assert_eq!(redo.old_data().get(&0x10), Some(&0xAB));
    }

    #[test]
    fn three_writes_record_pre_first_value() {
        let mut model = model_with(8, 0x42);
        let mut delta = ModelDelta::new();
        for value in [5, 9, 3] {
            delta.change_data(&mut model, 2, value).unwrap();
        }
        assert_eq!(delta.old_data().get(&2), Some(&0x42));
        delta.revert(&mut model).unwrap();
        assert_eq!(model.read(2), Some(0x42));
    }

    #[test]
    fn writing_same_value_is_noop() {
        let mut model = model_with(8, 0x11);
        let mut delta = ModelDelta::new();
        delta.change_data(&mut model, 3, 0x11).unwrap();
        assert!(delta.is_empty());
        assert!(delta.old_data().is_empty());
    }

    #[test]
    fn write_past_end_grows_model() {
        let mut model = model_with(4, 0x00);
        let mut delta = ModelDelta::new();
        delta.change_data(&mut model, 9, 0x12).unwrap();

        assert_eq!(model.len(), 10);
        assert_eq!(model.read(9), Some(0x12));
        assert_eq!(delta.old_data().get(&9), Some(&0xFF));

        delta.revert(&mut model).unwrap();
        // Growth stays; the byte goes back to the erased value.
        assert_eq!(model.len(), 10);
        assert_eq!(model.read(9), Some(0xFF));
    }

    #[test]
    fn growth_failure_propagates() {
        let mut model = model_with(4, 0x00).with_capacity_limit(8);
        let mut delta = ModelDelta::new();
        let err = delta.change_data(&mut model, 8, 1).unwrap_err();
        assert_eq!(
            err,
            ChangeError::Model(ModelError::CapacityExceeded {
                requested: 9,
                capacity: 8
            })
        );
        assert!(delta.is_empty());
    }

    #[test]
    fn write_at_max_address_fails_without_panicking() {
        let mut model = model_with(4, 0x00);
        let mut delta = ModelDelta::new();
        let err = delta.change_data(&mut model, usize::MAX, 1).unwrap_err();
        assert!(matches!(
            err,
            ChangeError::Model(ModelError::CapacityExceeded { .. })
        ));

        let err = delta
            .write_value(&mut model, usize::MAX - 1, 0x0102_0304)
            .unwrap_err();
        assert!(matches!(
            err,
            ChangeError::Model(ModelError::CapacityExceeded { .. })
        ));
        assert_eq!(model.len(), 4);
        assert!(delta.is_empty());
    }

    #[test]
    fn notification_fires_once_for_many_writes() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let mut model = model_with(0x20, 0x00);
        let mut delta = ModelDelta::new();
        delta.on_new_data_change(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        for address in 0..10 {
            delta.change_data(&mut model, address, 0x80).unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(delta.has_data_change());
    }

    #[test]
    fn notification_silent_for_index_only_changes() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let mut delta = ModelDelta::new();
        delta.on_new_data_change(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        delta.add_run(&Run::table(0x10, 3, 4));
        delta.add_name(0x10, "items");
        delta.remove_unmapped_pointer(0x40, "items");
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!delta.has_data_change());
        assert!(delta.has_any_change());
    }

    #[test]
    fn add_then_remove_cancels_in_every_category() {
        let mut delta = ModelDelta::new();
        let run = Run::pointer(0x30, None);
        delta.add_run(&run);
        delta.remove_run(&run);
        delta.add_name(0x30, "a");
        delta.remove_name(0x30, "a");
        delta.add_unmapped_pointer(0x30, "b");
        delta.remove_unmapped_pointer(0x30, "b");
        delta.matched_words.add(0x30, "c".to_string());
        delta.remove_matched_word(0x30, "c");

        assert!(delta.is_empty());
        assert!(delta.runs().removed().is_empty());
        assert!(delta.names().removed().is_empty());
        assert!(delta.unmapped_pointers().removed().is_empty());
        assert!(delta.matched_words().removed().is_empty());
    }

    #[test]
    fn earliest_change_prefers_byte_edits() {
        let mut model = model_with(0x40, 0x00);
        let mut delta = ModelDelta::new();
        delta.change_data(&mut model, 50, 1).unwrap();
        delta.change_data(&mut model, 10, 1).unwrap();
        delta.add_name(5, "early");
        assert_eq!(delta.earliest_change(), Some(10));
    }

    #[test]
    fn earliest_change_probe_order() {
        let mut delta = ModelDelta::new();
        delta.remove_name(1, "gone");
        delta.add_unmapped_pointer(40, "later");
        assert_eq!(delta.earliest_change(), Some(40));

        delta.add_run(&Run::table(30, 1, 1));
        assert_eq!(delta.earliest_change(), Some(30));

        delta.add_name(60, "name");
        assert_eq!(delta.earliest_change(), Some(60));
    }

    #[test]
    fn earliest_change_skips_placeholder_runs() {
        let mut delta = ModelDelta::new();
        delta.add_run(&Run::no_info(2));
        assert_eq!(delta.earliest_change(), None);
        assert!(delta.has_any_change());

        delta.remove_run(&Run::new(9, 3, RunFormat::Text));
        assert_eq!(delta.earliest_change(), Some(9));
    }

    #[test]
    fn read_only_rejects_writes() {
        let mut model = model_with(8, 0x00);
        let mut delta = ModelDelta::read_only();
        assert_eq!(
            delta.change_data(&mut model, 1, 7),
            Err(ChangeError::ReadOnly)
        );
        assert_eq!(delta.write_value(&mut model, 10, 7), Err(ChangeError::ReadOnly));
        assert_eq!(model.bytes(), &[0; 8]);
        assert!(delta.is_empty());
    }

    #[test]
    fn read_only_rejects_matched_word() {
        let mut model = model_with(8, 0x00);
        let mut delta = ModelDelta::read_only();
        assert_eq!(
            delta.add_matched_word(&mut model, 0, "table"),
            Err(ChangeError::ReadOnly)
        );
        assert!(delta.matched_words().is_empty());
    }

    #[test]
    fn matched_word_writes_parent_count() {
        let mut model = model_with(0x100, 0x00);
        let mut setup = ModelDelta::new();
        model.set_anchor(&mut setup, 0x80, "items");
        model.observe_run(&mut setup, Run::table(0x80, 0x1234, 1));

        let mut delta = ModelDelta::new();
        delta.add_matched_word(&mut model, 0x10, "items").unwrap();
        assert_eq!(model.read_value(0x10, 4), Some(0x1234));
        assert_eq!(
            delta.matched_words().added().get(&0x10).map(String::as_str),
            Some("items")
        );

        delta.revert(&mut model).unwrap();
        assert_eq!(model.read_value(0x10, 4), Some(0));
    }

    #[test]
    fn matched_word_defaults_to_zero_when_unresolved() {
        let mut model = model_with(0x20, 0xFF);
        let mut delta = ModelDelta::new();
        delta.add_matched_word(&mut model, 0x04, "missing").unwrap();
        assert_eq!(model.read_value(0x04, 4), Some(0));
        assert!(delta.matched_words().added().contains_key(&0x04));
    }

    #[test]
    fn matched_word_defaults_to_zero_for_non_table_parent() {
        let mut model = model_with(0x20, 0xFF);
        let mut setup = ModelDelta::new();
        model.set_anchor(&mut setup, 0x10, "ptr");
        model.observe_run(&mut setup, Run::pointer(0x10, None));

        let mut delta = ModelDelta::new();
        delta.add_matched_word_sized(&mut model, 0x00, "ptr", 2).unwrap();
        assert_eq!(model.read_value(0x00, 2), Some(0));
        assert_eq!(model.read(0x02), Some(0xFF));
    }

    #[test]
    fn matched_word_width_outside_range_is_rejected() {
        let mut model = model_with(0x20, 0xFF);
        let mut delta = ModelDelta::new();
        for width in [0, 5, 8] {
            assert_eq!(
                delta.add_matched_word_sized(&mut model, 0x04, "missing", width),
                Err(ChangeError::InvalidWidth { width })
            );
        }
        assert!(delta.is_empty());
        assert_eq!(model.read_value(0x04, 4), Some(0xFFFF_FFFF));
    }

    #[test]
    fn revert_swaps_index_sides() {
        let mut delta = ModelDelta::new();
        delta.add_name(4, "new");
        delta.remove_name(8, "old");
        delta.add_unmapped_pointer(12, "fwd");

        let mut model = model_with(16, 0);
        let mut setup = ModelDelta::new();
        model.set_anchor(&mut setup, 8, "old");
        // Pretend the transaction was applied.
        let mut applied = ModelDelta::new();
        model.clear_anchor(&mut applied, 8);
        model.set_anchor(&mut applied, 4, "new");
        model.add_unmapped_pointer(&mut applied, 12, "fwd");

        let redo = delta.revert(&mut model).unwrap();
        assert_eq!(redo.names().removed().get(&4).map(String::as_str), Some("new"));
        assert_eq!(redo.names().added().get(&8).map(String::as_str), Some("old"));
        assert!(redo.unmapped_pointers().removed().contains_key(&12));
        assert_eq!(model.address_of_anchor("old"), Some(8));
        assert_eq!(model.address_of_anchor("new"), None);
        assert!(model.unmapped_pointers().is_empty());
    }

    #[test]
    fn revert_against_shorter_model_fails_without_writing() {
        let mut big = model_with(0x20, 0);
        let mut delta = ModelDelta::new();
        delta.change_data(&mut big, 0x02, 1).unwrap();
        delta.change_data(&mut big, 0x1F, 1).unwrap();

        let mut small = model_with(0x10, 9);
        let err = delta.revert(&mut small).unwrap_err();
        assert_eq!(
            err,
            ChangeError::Model(ModelError::AddressOutOfRange {
                address: 0x1F,
                len: 0x10
            })
        );
        assert_eq!(small.bytes(), &[9; 0x10]);
    }

    #[test]
    fn revert_preserves_data_change_flag() {
        let mut model = model_with(4, 0);
        let mut delta = ModelDelta::new();
        delta.change_data(&mut model, 0, 1).unwrap();
        let redo = delta.revert(&mut model).unwrap();
        assert!(redo.has_data_change());

        let index_only = ModelDelta::new();
        assert!(!index_only.revert(&mut model).unwrap().has_data_change());
    }

    #[test]
    fn size_grows_with_entries() {
        let mut model = model_with(0x40, 0);
        let mut delta = ModelDelta::new();
        let empty = delta.size_bytes();
        delta.change_data(&mut model, 1, 1).unwrap();
        let one_byte = delta.size_bytes();
        delta.add_name(2, "a_rather_long_anchor_name");
        assert!(one_byte > empty);
        assert!(delta.size_bytes() > one_byte + "a_rather_long_anchor_name".len());
    }

    #[test]
    fn debug_summarizes_counts() {
        let delta = ModelDelta::read_only();
        let debug = format!("{delta:?}");
        assert!(debug.contains("ModelDelta"));
        assert!(debug.contains("read_only: true"));
    }
}
