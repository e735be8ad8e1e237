//! Error types for the SQLite bridge.
//!
//! Covers failures the host sees directly: registering a provider and
//! working with the underlying connection. Errors raised inside engine
//! callbacks never surface here; they are translated into status codes and
//! show up as ordinary statement failures.

use tablebridge_core::BridgeError;
use thiserror::Error;

/// Errors that can occur while registering providers or using a
/// [`ProviderConnection`](crate::ProviderConnection).
#[derive(Debug, Error)]
pub enum Error {
    /// SQLite database operation failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A provider or value conversion failed outside an engine callback.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// Module name is empty or contains characters other than ASCII
    /// alphanumerics and underscores.
    #[error("invalid module name '{0}': must be non-empty and contain only alphanumeric characters and underscores")]
    InvalidName(String),

    /// A module with this name is already registered on the connection.
    #[error("module '{0}' is already registered")]
    DuplicateName(String),

    /// The engine rejected the module.
    #[error("registration of module '{name}' failed: {message}")]
    Registration {
        /// Module name.
        name: String,
        /// Engine-provided message.
        message: String,
    },
}

/// Convenience alias for results with [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
