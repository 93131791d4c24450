#![forbid(unsafe_code)]

//! romdelta Runtime
//!
//! This crate provides the transaction and history layer on top of the
//! models defined in `romdelta-core`.
//!
//! # Key Components
//!
//! - [`ModelDelta`] - One atomic, exactly reversible edit of a model
//! - [`ChangeSignal`] - Edge-triggered "data changed" notification
//! - [`ChangeHistory`] - Undo/redo stack with an implicit open transaction
//! - [`HistoryConfig`] - Depth and memory limits for the history
//!
//! # Role in romdelta
//! Editors open a transaction, mutate the model through it, and hand the
//! finished transaction to the history. Undo reverts the transaction and
//! keeps the inverse for redo.

pub mod config;
pub mod undo;

pub use config::{ConfigError, HistoryConfig};
pub use romdelta_core::{
    Address, ChangeError, ChangeToken, DataModel, IndexUpdate, KeyedDelta, MemoryModel,
    ModelError, Run, RunFormat,
};
pub use undo::{ChangeHistory, ChangeSignal, HistoryStep, ModelDelta};
