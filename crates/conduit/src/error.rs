//! Error types for Conduit

use thiserror::Error;

use crate::auth::AuthError;

/// Main error type for Conduit operations
#[derive(Error, Debug)]
pub enum ConduitError {
    /// Configuration errors (missing API key, bad URL, unreadable file)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Token acquisition against the upstream auth endpoint failed
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// HTTP client construction errors
    #[error("HTTP client error: {0}")]
    Client(String),

    /// Listener / serving errors
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Conduit operations
pub type Result<T> = std::result::Result<T, ConduitError>;
