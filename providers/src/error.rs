//! Error types for provider configuration.
//!
//! Covers loading and saving the YAML registration file and applying it to
//! a connection.

use thiserror::Error;

/// Errors that can occur while loading or applying a [`ProvidersConfig`].
///
/// [`ProvidersConfig`]: crate::ProvidersConfig
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// A provider kind that no built-in provider implements.
    #[error("unknown provider kind '{0}' (expected one of: series, records)")]
    UnknownKind(String),

    /// An entry that is not `name=kind`.
    #[error("invalid provider entry '{0}' (expected name=kind)")]
    InvalidEntry(String),

    /// The connection rejected a provider.
    #[error(transparent)]
    RegistrationError(#[from] tablebridge_sqlite::Error),
}

/// Convenience alias for results with [`ConfigError`].
pub type Result<T> = std::result::Result<T, ConfigError>;
