//! Error types for the host-side wrapper

use thiserror::Error;

use crate::runtime::Kind;

/// Failures reported synchronously by the wrapper layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// A typed view was built from a value of another kind.
    #[error("expected {expected} value, found {found}")]
    KindMismatch { expected: Kind, found: Kind },

    /// A write went through a view that holds no handle.
    #[error("write through an empty {0} view")]
    NullHandle(Kind),

    /// A name, key or string bound for the runtime contains a NUL byte.
    #[error("interior NUL in {0:?}")]
    InteriorNul(String),

    #[error("registration name is empty")]
    EmptyName,

    /// The runtime could not be created or did not answer.
    #[error("runtime unavailable")]
    RuntimeUnavailable,

    /// A transport record that cannot be converted.
    #[error("malformed value: {0}")]
    Malformed(&'static str),

    /// The runtime rejected an operation on a valid handle.
    #[error("runtime rejected {0}")]
    Rejected(&'static str),
}

/// Failure raised by a host closure. The trampoline turns it into an
/// error-marked String result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    #[error("{0}")]
    Message(String),

    #[error("argument {index}: {reason}")]
    Argument { index: usize, reason: String },

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl CallbackError {
    pub fn msg(message: impl Into<String>) -> Self {
        CallbackError::Message(message.into())
    }
}

impl From<&str> for CallbackError {
    fn from(message: &str) -> Self {
        CallbackError::Message(message.to_string())
    }
}

impl From<String> for CallbackError {
    fn from(message: String) -> Self {
        CallbackError::Message(message)
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
