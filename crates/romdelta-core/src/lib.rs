#![forbid(unsafe_code)]

//! Core: the addressable ROM model, its annotations, and keyed change sets.
//!
//! # Role in romdelta
//! `romdelta-core` is the model layer. It owns the byte store abstraction,
//! the annotation ("run") types laid over it, and the generic add/remove
//! change set that every reversible transaction is built from.
//!
//! # Primary responsibilities
//! - **DataModel**: byte read/write, growth, run lookup, anchor lookup, and
//!   the single-call bulk index update.
//! - **ChangeToken**: the recording surface a transaction exposes to the
//!   model while an edit is in progress.
//! - **KeyedDelta**: address-keyed added/removed maps with net cancellation.
//! - **MemoryModel**: an in-memory reference model.
//!
//! # How it fits in the system
//! The runtime (`romdelta-runtime`) builds `ModelDelta` transactions out of
//! [`KeyedDelta`] and drives undo/redo against any [`DataModel`].

pub mod error;
pub mod keyed_delta;
pub mod memory_model;
pub mod model;
pub mod run;

pub use error::{ChangeError, ModelError};
pub use keyed_delta::KeyedDelta;
pub use memory_model::MemoryModel;
pub use model::{ChangeToken, DataModel, IndexUpdate};
pub use run::{Run, RunFormat};

/// Byte offset into a model.
pub type Address = usize;

/// Value new bytes take when a model grows (erased flash).
pub const ERASED_BYTE: u8 = 0xFF;
