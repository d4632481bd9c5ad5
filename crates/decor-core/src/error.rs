//! Error taxonomy.
//!
//! Setup faults ([`DecorError`]) are programmer errors and are returned to the
//! caller synchronously. Faults inside delivered callbacks ([`CallbackError`])
//! are contained at the delivery boundary: logged, counted, never propagated.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DecorError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecorError {
    #[error("unknown property: {name}")]
    UnknownProperty { name: String },

    #[error("handle exposes no release capability (destroy, remove, cancel, or awaitable)")]
    NotDisposable,

    #[error("index {index} out of bounds (length {length})")]
    IndexOutOfBounds { index: usize, length: usize },
}

impl DecorError {
    #[must_use]
    pub fn unknown_property(name: impl Into<String>) -> Self {
        Self::UnknownProperty { name: name.into() }
    }
}

/// Failure of a single delivered callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    /// The callback returned an error.
    #[error("{0}")]
    Failed(String),

    /// The callback panicked and the panic was caught.
    #[error("panicked: {0}")]
    Panicked(String),
}

impl CallbackError {
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Whether this failure came from a caught panic.
    #[must_use]
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }
}
