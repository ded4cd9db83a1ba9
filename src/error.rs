//! Error types for the document engine.
//!
//! Follows the propagation policy in the design: the core never throws
//! across its public boundary. Mutation primitives log one of these and
//! return a typed empty sentinel; only truly exceptional paths (codec
//! failures on byte import/export) actually return `Err` to the caller.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type DocumentResult<T> = Result<T, DocumentError>;

/// Error taxonomy (see design §7).
#[derive(Error, Debug, Clone)]
pub enum DocumentError {
    /// Malformed tag, unknown node kind for an operation, invalid replay binding.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Target node missing (deleted, never existed, dangling ref).
    #[error("not found: {0}")]
    NotFound(String),

    /// Transport disconnect, timeout, reconnect in progress.
    #[error("sync transient error: {0}")]
    SyncTransient(String),

    /// Unrecoverable handshake failure.
    #[error("sync fatal error: {0}")]
    SyncFatal(String),

    /// Substrate-level failure (byte codec, malformed update/snapshot).
    #[error("crdt substrate error: {0}")]
    Substrate(String),

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DocumentError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Category tag for logging/metrics, mirroring the taxonomy in design §7.
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
            Self::SyncTransient(_) => "sync_transient",
            Self::SyncFatal(_) => "sync_fatal",
            Self::Substrate(_) => "substrate",
            Self::Configuration(_) => "configuration",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<loro::LoroError> for DocumentError {
    fn from(err: loro::LoroError) -> Self {
        DocumentError::Substrate(err.to_string())
    }
}

impl From<config::ConfigError> for DocumentError {
    fn from(err: config::ConfigError) -> Self {
        DocumentError::Configuration(err.to_string())
    }
}

/// Logs a [`DocumentError`] at the appropriate level and discards it, for
/// call sites that follow the "log and no-op" propagation policy.
pub fn log_and_drop(context: &str, err: DocumentError) {
    match &err {
        DocumentError::Internal(_) | DocumentError::Substrate(_) => {
            tracing::error!(category = err.category(), "{context}: {err}");
        }
        _ => {
            tracing::warn!(category = err.category(), "{context}: {err}");
        }
    }
}
