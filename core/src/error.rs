//! Recoverable errors raised by providers, cursors and the planner.
//!
//! Every variant here is something the engine can survive: the failing call
//! is reported with a status code and message and the engine decides what to
//! do next. Broken bridge invariants (double release, mismatched handles) are
//! deliberately absent; those never travel through `Result`.

use thiserror::Error;

/// Coarse classification of a [`BridgeError`].
///
/// The SQLite bridge maps each kind onto the nearest engine status code, and
/// maps engine status codes back onto a kind when it surfaces an engine
/// failure as a local error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad arguments or failed setup while constructing a provider.
    Construction,
    /// Plan negotiation itself failed (not the same as "no usable plan").
    Planning,
    /// Filter, advance, column or row identity access failed.
    Execution,
    /// A constraint was violated.
    Constraint,
    /// The engine was busy or locked.
    Busy,
    /// Memory allocation failed.
    NoMemory,
    /// A string or blob exceeded the engine's size limit.
    TooBig,
    /// An interface was used incorrectly.
    Misuse,
    /// Anything without a closer match.
    Generic,
}

/// Errors that can occur inside a provider or cursor operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    /// Provider construction failed, typically because of a malformed
    /// argument list.
    #[error("construction error: {0}")]
    Construction(String),

    /// Query plan negotiation failed.
    #[error("planning error: {0}")]
    Planning(String),

    /// A cursor operation failed.
    #[error("execution error: {0}")]
    Execution(String),

    /// A constraint was violated.
    #[error("constraint failed: {0}")]
    Constraint(String),

    /// Memory allocation failed.
    #[error("out of memory")]
    NoMemory,

    /// A value exceeded the engine's size limit.
    #[error("value too big: {0}")]
    TooBig(String),

    /// The engine reported a failure while the bridge was calling into it.
    #[error("{message} (engine code {code})")]
    Engine {
        /// Classification of `code`.
        kind: ErrorKind,
        /// Raw engine status code, preserved exactly.
        code: i32,
        /// Engine-provided message.
        message: String,
    },
}

impl BridgeError {
    /// Shorthand for [`BridgeError::Construction`].
    pub fn construction(message: impl Into<String>) -> Self {
        Self::Construction(message.into())
    }

    /// Shorthand for [`BridgeError::Planning`].
    pub fn planning(message: impl Into<String>) -> Self {
        Self::Planning(message.into())
    }

    /// Shorthand for [`BridgeError::Execution`].
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Construction(_) => ErrorKind::Construction,
            Self::Planning(_) => ErrorKind::Planning,
            Self::Execution(_) => ErrorKind::Execution,
            Self::Constraint(_) => ErrorKind::Constraint,
            Self::NoMemory => ErrorKind::NoMemory,
            Self::TooBig(_) => ErrorKind::TooBig,
            Self::Engine { kind, .. } => *kind,
        }
    }

    /// Returns the raw engine status code, if this error came from the engine.
    pub fn engine_code(&self) -> Option<i32> {
        match self {
            Self::Engine { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Convenience alias for results with [`BridgeError`].
pub type Result<T> = std::result::Result<T, BridgeError>;
