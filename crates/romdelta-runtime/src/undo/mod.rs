#![forbid(unsafe_code)]

//! Delta-based undo/redo.
//!
//! Every edit of a model happens inside a [`ModelDelta`]. The delta applies
//! each change to the model immediately and records just enough to take it
//! back: the original value of each byte the first time it is written, and
//! the net added/removed entries of the four symbolic indices.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                        ChangeHistory                           │
//! │  current: Option<ModelDelta>   (implicit open transaction)     │
//! │  ┌──────────────────┐          ┌──────────────────┐            │
//! │  │   Undo Stack     │          │   Redo Stack     │            │
//! │  │  ┌────────────┐  │  undo()  │  ┌────────────┐  │            │
//! │  │  │ DeltaN     │  │ ──────►  │  │ inverse(N) │  │            │
//! │  │  ├────────────┤  │  revert  │  ├────────────┤  │            │
//! │  │  │ Delta1     │  │  ◄────── │  │ ...        │  │            │
//! │  │  └────────────┘  │  redo()  │  └────────────┘  │            │
//! │  └──────────────────┘          └──────────────────┘            │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Undo does not replay anything: [`ModelDelta::revert`] restores the model
//! and returns the opposite delta, so redo is simply reverting that.
//!
//! # Module Structure
//!
//! - [`delta`]: the transaction itself
//! - [`signal`]: one-shot data-changed notification
//! - [`history`]: the undo/redo stack

pub mod delta;
pub mod history;
pub mod signal;

pub use delta::ModelDelta;
pub use history::{ChangeHistory, HistoryStep};
pub use signal::ChangeSignal;
