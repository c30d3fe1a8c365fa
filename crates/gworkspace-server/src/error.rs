//! Server error types.

use std::io;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that stop the serving loop.
///
/// Failures inside a single request never show up here; they are answered
/// as JSON-RPC errors or as tool results with `isError` set.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Reading stdin or writing stdout failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A response could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Setting up the toolbox failed.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl ServerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<gworkspace_auth::AuthError> for ServerError {
    fn from(err: gworkspace_auth::AuthError) -> Self {
        Self::config(err.to_string())
    }
}
