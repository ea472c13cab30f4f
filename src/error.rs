//! Crate-level error types
//!
//! The synchronization core never terminates on an error: connection and
//! fetch failures are state-machine edges, not process failures. This
//! type exists for the surfaces that do propagate — configuration
//! loading, transport construction, and the CLI.

use thiserror::Error;

/// Main error type for agent operations
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Transport error: {0}")]
    Transport(#[from] Box<dyn std::error::Error + Send + Sync>),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Codec error: {0}")]
    Codec(#[from] crate::attributes::CodecError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SyncError {
    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Result type for agent operations
pub type SyncResult<T> = Result<T, SyncError>;
