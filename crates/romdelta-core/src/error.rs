#![forbid(unsafe_code)]

//! Error types shared by models and transactions.

use std::fmt;

use crate::Address;

/// Errors raised by a [`DataModel`](crate::DataModel) implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A raw write or read addressed a byte past the end of the model.
    AddressOutOfRange { address: Address, len: usize },
    /// Growing the model would exceed its capacity.
    CapacityExceeded { requested: usize, capacity: usize },
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddressOutOfRange { address, len } => {
                write!(f, "address {address:#X} out of range (length {len:#X})")
            }
            Self::CapacityExceeded {
                requested,
                capacity,
            } => write!(
                f,
                "cannot grow model to {requested:#X} bytes (capacity {capacity:#X})"
            ),
        }
    }
}

impl std::error::Error for ModelError {}

/// Errors raised while recording or reverting a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeError {
    /// The change token does not allow model data to change.
    ReadOnly,
    /// A multi-byte field must be 1 to 4 bytes wide.
    InvalidWidth { width: usize },
    /// The model rejected the operation.
    Model(ModelError),
}

impl fmt::Display for ChangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "this operation is not allowed to change model data"),
            Self::InvalidWidth { width } => write!(f, "field width {width} is not 1 to 4 bytes"),
            Self::Model(e) => write!(f, "model error: {e}"),
        }
    }
}

impl std::error::Error for ChangeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadOnly | Self::InvalidWidth { .. } => None,
            Self::Model(e) => Some(e),
        }
    }
}

impl From<ModelError> for ChangeError {
    fn from(e: ModelError) -> Self {
        Self::Model(e)
    }
}
