#![forbid(unsafe_code)]

//! History stack for undo/redo of [`ModelDelta`] transactions.
//!
//! [`ChangeHistory`] keeps dual stacks plus one implicit open transaction:
//!
//! - **Open transaction**: [`current_change`](ChangeHistory::current_change)
//!   hands out the delta edits should record into, creating it on demand
//! - **Checkpoint**: closes the open transaction; empty ones are dropped
//! - **Branch handling**: pushing a transaction with edits clears the redo
//!   stack; an open transaction that turns out empty leaves it alone
//! - **Limits**: oldest entries evicted past the depth or byte budget
//! - **Saved marker**: remembers which position matches the file on disk
//!
//! # Invariants
//!
//! 1. `total_bytes` always equals the sum of `size_bytes()` over both stacks
//! 2. `undo_stack.len() <= config.max_depth` (after any operation)
//! 3. `total_bytes <= config.max_bytes` (after any operation, if enforced)
//! 4. Redo stack is cleared whenever a transaction is pushed
//!
//! ```text
//! edit, edit, checkpoint
//! ┌───────────────────────────────────────────────┐
//! │ Undo Stack: [d1, d2, d3]                      │
//! │ Redo Stack: []                                 │
//! └───────────────────────────────────────────────┘
//!
//! undo() x2   (each revert yields the inverse)
//! ┌───────────────────────────────────────────────┐
//! │ Undo Stack: [d1]                              │
//! │ Redo Stack: [inv(d3), inv(d2)]                │
//! └───────────────────────────────────────────────┘
//!
//! edit, checkpoint  <-- new branch, clears redo
//! ┌───────────────────────────────────────────────┐
//! │ Undo Stack: [d1, d4]                          │
//! │ Redo Stack: []                                 │
//! └───────────────────────────────────────────────┘
//! ```

use std::collections::VecDeque;
use std::fmt;

use romdelta_core::{Address, ChangeError, DataModel};

use super::delta::ModelDelta;
use crate::config::HistoryConfig;

/// What an undo or redo step changed, for refreshing a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryStep {
    /// Lowest address touched by the reverted transaction.
    pub earliest_change: Option<Address>,
    /// Whether model bytes changed (as opposed to only indices).
    pub data_changed: bool,
}

/// Undo/redo history over model transactions.
pub struct ChangeHistory {
    /// Transaction currently accepting edits.
    current: Option<ModelDelta>,
    /// Transactions available for undo (newest at back).
    undo_stack: VecDeque<ModelDelta>,
    /// Inverse transactions available for redo (newest at back).
    redo_stack: VecDeque<ModelDelta>,
    config: HistoryConfig,
    /// Total bytes used by both stacks.
    total_bytes: usize,
    /// Undo depth matching the saved state; `None` once unreachable.
    saved_at: Option<usize>,
}

impl fmt::Debug for ChangeHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeHistory")
            .field("open", &self.current.is_some())
            .field("undo_depth", &self.undo_stack.len())
            .field("redo_depth", &self.redo_stack.len())
            .field("total_bytes", &self.total_bytes)
            .field("saved_at", &self.saved_at)
            .field("config", &self.config)
            .finish()
    }
}

impl Default for ChangeHistory {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl ChangeHistory {
    /// Create a history with the given configuration. The initial state
    /// counts as saved.
    #[must_use]
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            current: None,
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            config,
            total_bytes: 0,
            saved_at: Some(0),
        }
    }

    // ========================================================================
    // Core Operations
    // ========================================================================

    /// The open transaction, created on first use.
    ///
    /// Opening it does not touch the redo stack. The branch is cut when the
    /// transaction is pushed with at least one change.
    pub fn current_change(&mut self) -> &mut ModelDelta {
        self.current.get_or_insert_with(ModelDelta::new)
    }

    /// Whether a transaction is open.
    #[must_use]
    pub fn has_open_change(&self) -> bool {
        self.current.is_some()
    }

    /// Close the open transaction.
    ///
    /// Returns `true` if it was pushed onto the undo stack, `false` if there
    /// was none or it was dropped for having no effect.
    pub fn checkpoint(&mut self) -> bool {
        match self.current.take() {
            Some(delta) => self.push_closed(delta),
            None => false,
        }
    }

    /// Push an already applied transaction, closing any open one first.
    ///
    /// Clears the redo stack and enforces limits. Returns whether the delta
    /// was kept.
    pub fn push(&mut self, delta: ModelDelta) -> bool {
        self.checkpoint();
        self.push_closed(delta)
    }

    /// Revert the newest transaction.
    ///
    /// The open transaction, if any, is checkpointed first. On success the
    /// inverse moves to the redo stack; on failure the transaction stays on
    /// the undo stack.
    ///
    /// # Returns
    ///
    /// - `Some(Ok(step))` if undo succeeded
    /// - `Some(Err(error))` if the revert failed
    /// - `None` if there is nothing to undo
    pub fn undo(&mut self, model: &mut dyn DataModel) -> Option<Result<HistoryStep, ChangeError>> {
        self.checkpoint();
        let delta = self.undo_stack.pop_back()?;
        match Self::revert_step(&delta, model) {
            Ok((inverse, step)) => {
                self.total_bytes = self.total_bytes.saturating_sub(delta.size_bytes())
                    + inverse.size_bytes();
                self.redo_stack.push_back(inverse);
                tracing::debug!(
                    target: "romdelta.history",
                    undo_depth = self.undo_stack.len(),
                    redo_depth = self.redo_stack.len(),
                    "undo"
                );
                self.enforce_limits();
                Some(Ok(step))
            }
            Err(e) => {
                self.undo_stack.push_back(delta);
                Some(Err(e))
            }
        }
    }

    /// Re-apply the most recently undone transaction.
    ///
    /// The open transaction is checkpointed first. If it has edits that
    /// starts a new branch and leaves nothing to redo; if it is empty it is
    /// dropped and the redo stack survives.
    pub fn redo(&mut self, model: &mut dyn DataModel) -> Option<Result<HistoryStep, ChangeError>> {
        self.checkpoint();
        let inverse = self.redo_stack.pop_back()?;
        match Self::revert_step(&inverse, model) {
            Ok((delta, step)) => {
                self.total_bytes = self.total_bytes.saturating_sub(inverse.size_bytes())
                    + delta.size_bytes();
                self.undo_stack.push_back(delta);
                tracing::debug!(
                    target: "romdelta.history",
                    undo_depth = self.undo_stack.len(),
                    redo_depth = self.redo_stack.len(),
                    "redo"
                );
                self.enforce_limits();
                Some(Ok(step))
            }
            Err(e) => {
                self.redo_stack.push_back(inverse);
                Some(Err(e))
            }
        }
    }

    /// Check if undo is available.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty() || self.current.as_ref().is_some_and(ModelDelta::has_any_change)
    }

    /// Check if redo is available.
    ///
    /// Pending edits in the open transaction will cut the branch on the next
    /// checkpoint, so they rule out redo.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        let open_edits = self
            .current
            .as_ref()
            .is_some_and(ModelDelta::has_any_change);
        !open_edits && !self.redo_stack.is_empty()
    }

    // ========================================================================
    // Saved state
    // ========================================================================

    /// Mark the current position as matching what is on disk.
    pub fn tag_as_saved(&mut self) {
        self.checkpoint();
        self.saved_at = Some(self.undo_stack.len());
    }

    /// Whether the model matches the last saved state.
    #[must_use]
    pub fn is_saved(&self) -> bool {
        let open_edits = self
            .current
            .as_ref()
            .is_some_and(ModelDelta::has_any_change);
        !open_edits && self.saved_at == Some(self.undo_stack.len())
    }

    // ========================================================================
    // Info
    // ========================================================================

    /// Get the undo stack depth.
    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    /// Get the redo stack depth.
    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Get total memory usage in bytes.
    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.total_bytes
    }

    /// Get the current configuration.
    #[must_use]
    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Drop all history, including the open transaction. The saved state
    /// becomes unreachable unless the history was already at it.
    pub fn clear(&mut self) {
        let was_saved = self.is_saved();
        self.current = None;
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.total_bytes = 0;
        self.saved_at = was_saved.then_some(0);
    }

    fn revert_step(
        delta: &ModelDelta,
        model: &mut dyn DataModel,
    ) -> Result<(ModelDelta, HistoryStep), ChangeError> {
        let inverse = delta.revert(model)?;
        let step = HistoryStep {
            earliest_change: delta.earliest_change(),
            data_changed: delta.has_data_change(),
        };
        Ok((inverse, step))
    }

    fn push_closed(&mut self, delta: ModelDelta) -> bool {
        if self.config.skip_empty && delta.is_empty() {
            tracing::debug!(target: "romdelta.history", "dropped empty transaction");
            return false;
        }
        self.clear_redo();
        self.total_bytes += delta.size_bytes();
        tracing::debug!(
            target: "romdelta.history",
            earliest_change = ?delta.earliest_change(),
            size_bytes = delta.size_bytes(),
            "transaction pushed"
        );
        self.undo_stack.push_back(delta);
        self.enforce_limits();
        true
    }

    /// Clear only the redo stack.
    fn clear_redo(&mut self) {
        for delta in self.redo_stack.drain(..) {
            self.total_bytes = self.total_bytes.saturating_sub(delta.size_bytes());
        }
        if self
            .saved_at
            .is_some_and(|saved| saved > self.undo_stack.len())
        {
            self.saved_at = None;
        }
    }

    /// Enforce depth and memory limits by evicting oldest transactions.
    fn enforce_limits(&mut self) {
        while self.undo_stack.len() > self.config.max_depth {
            self.evict_oldest_undo();
        }

        if self.config.max_bytes > 0 {
            while self.total_bytes > self.config.max_bytes {
                // Speculative future goes before real history.
                if let Some(delta) = self.redo_stack.pop_front() {
                    self.total_bytes = self.total_bytes.saturating_sub(delta.size_bytes());
                    let reachable = self.undo_stack.len() + self.redo_stack.len();
                    if self.saved_at.is_some_and(|saved| saved > reachable) {
                        self.saved_at = None;
                    }
                    continue;
                }
                if self.undo_stack.is_empty() {
                    break;
                }
                self.evict_oldest_undo();
            }
        }
    }

    fn evict_oldest_undo(&mut self) {
        if let Some(delta) = self.undo_stack.pop_front() {
            self.total_bytes = self.total_bytes.saturating_sub(delta.size_bytes());
            self.saved_at = self.saved_at.and_then(|saved| saved.checked_sub(1));
            tracing::debug!(
                target: "romdelta.history",
                size_bytes = delta.size_bytes(),
                "evicted oldest transaction"
            );
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
