#![forbid(unsafe_code)]

//! The addressable model and the change-recording surface edits go through.
//!
//! # Contract
//!
//! - [`DataModel`] owns bytes and four symbolic indices (runs, anchors,
//!   unmapped pointers, matched words). Raw writes never record anything.
//! - [`ChangeToken`] is what an open transaction looks like to code editing
//!   the model: every mutation is applied to the model immediately and
//!   recorded on the token so it can be reverted later.
//! - [`DataModel::mass_update`] applies a whole transaction's index changes
//!   in one call. Implementations must not observe a partially applied
//!   update from outside that call.

use crate::{Address, ChangeError, KeyedDelta, ModelError, Run};

/// Width in bytes of a value written by [`ChangeToken::write_value`].
pub const WORD_WIDTH: usize = 4;

/// Index changes handed to [`DataModel::mass_update`] in a single call.
///
/// Applying an update strips every `added` entry from the model's indices
/// and reinstates every `removed` entry, which is exactly what reverting the
/// transaction that recorded these deltas requires.
#[derive(Debug, Clone, Copy)]
pub struct IndexUpdate<'a> {
    pub runs: &'a KeyedDelta<Run>,
    pub names: &'a KeyedDelta<String>,
    pub unmapped_pointers: &'a KeyedDelta<String>,
    pub matched_words: &'a KeyedDelta<String>,
}

impl IndexUpdate<'_> {
    /// Total entries across all eight maps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len() + self.names.len() + self.unmapped_pointers.len() + self.matched_words.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A growable byte store overlaid with runs and anchors.
pub trait DataModel {
    /// Current extent in bytes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Byte at `address`, or `None` past the end.
    fn read(&self, address: Address) -> Option<u8>;

    /// Overwrite one byte without recording anything.
    fn write_raw(&mut self, address: Address, value: u8) -> Result<(), ModelError>;

    /// Grow to at least `min_len` bytes. Never shrinks.
    fn expand_to(&mut self, min_len: usize) -> Result<(), ModelError>;

    /// Largest extent [`expand_to`](Self::expand_to) will accept.
    fn capacity(&self) -> usize {
        usize::MAX
    }

    /// One past the last byte of the `width`-byte field at `address`.
    ///
    /// A field that would end past `usize::MAX` can never fit, so overflow
    /// is reported as [`ModelError::CapacityExceeded`].
    fn span_end(&self, address: Address, width: usize) -> Result<usize, ModelError> {
        address
            .checked_add(width)
            .ok_or(ModelError::CapacityExceeded {
                requested: usize::MAX,
                capacity: self.capacity(),
            })
    }

    /// The run covering `address`, or else the first run starting after it.
    fn next_run(&self, address: Address) -> Option<&Run>;

    /// Address bound to `name`, if any.
    fn address_of_anchor(&self, name: &str) -> Option<Address>;

    /// Name bound to `address`, if any.
    fn anchor_at(&self, address: Address) -> Option<&str>;

    /// Apply all index changes of one transaction in a single step.
    fn mass_update(&mut self, update: IndexUpdate<'_>);

    /// Little-endian value of `width` bytes at `address`.
    fn read_value(&self, address: Address, width: usize) -> Option<u32> {
        (0..width.min(WORD_WIDTH)).try_fold(0u32, |acc, i| {
            let byte = self.read(address.checked_add(i)?)?;
            Some(acc | (u32::from(byte) << (8 * i)))
        })
    }
}

/// Recording surface of an open transaction.
///
/// Byte writes go through [`change_data`](Self::change_data), which both
/// mutates the model and remembers the original value. The index methods
/// only record: callers update the model's index themselves.
pub trait ChangeToken {
    /// Write `value` at `address`, growing the model if needed.
    fn change_data(
        &mut self,
        model: &mut dyn DataModel,
        address: Address,
        value: u8,
    ) -> Result<(), ChangeError>;

    /// Whether this token refuses every byte write.
    fn is_read_only(&self) -> bool {
        false
    }

    fn add_run(&mut self, run: &Run);
    fn remove_run(&mut self, run: &Run);

    fn add_name(&mut self, address: Address, name: &str);
    fn remove_name(&mut self, address: Address, name: &str);

    fn add_unmapped_pointer(&mut self, address: Address, name: &str);
    fn remove_unmapped_pointer(&mut self, address: Address, name: &str);

    /// Bind the count field at `address` to the table named `parent_name`
    /// and write the table's current element count there.
    fn add_matched_word(
        &mut self,
        model: &mut dyn DataModel,
        address: Address,
        parent_name: &str,
    ) -> Result<(), ChangeError>;

    fn remove_matched_word(&mut self, address: Address, parent_name: &str);

    /// Write a little-endian [`WORD_WIDTH`]-byte value.
    fn write_value(
        &mut self,
        model: &mut dyn DataModel,
        address: Address,
        value: u32,
    ) -> Result<(), ChangeError> {
        self.write_sized_value(model, address, WORD_WIDTH, value)
    }

    /// Write the low `width` bytes of `value`, little-endian.
    ///
    /// `width` must be 1 to [`WORD_WIDTH`]; anything else fails with
    /// [`ChangeError::InvalidWidth`] before the model is touched. The model
    /// is grown to fit the whole value before the first byte is written, so
    /// a capacity failure leaves the data untouched.
    fn write_sized_value(
        &mut self,
        model: &mut dyn DataModel,
        address: Address,
        width: usize,
        value: u32,
    ) -> Result<(), ChangeError> {
        if self.is_read_only() {
            return Err(ChangeError::ReadOnly);
        }
        if !(1..=WORD_WIDTH).contains(&width) {
            return Err(ChangeError::InvalidWidth { width });
        }
        let end = model.span_end(address, width)?;
        if model.len() < end {
            model.expand_to(end)?;
        }
        for i in 0..width {
            self.change_data(model, address + i, (value >> (8 * i)) as u8)?;
        }
        Ok(())
    }
}
