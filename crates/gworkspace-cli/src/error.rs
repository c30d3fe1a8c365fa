//! Client error types.

use std::io;

use gworkspace_auth::AuthError;
use gworkspace_migrations::MigrationError;
use gworkspace_server::ServerError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Authentication or token storage error, rendered with its remediation hint.
    #[error("{}", .0.user_message())]
    Auth(#[from] AuthError),

    /// Migration loading or state error.
    #[error("migration error: {0}")]
    Migration(#[from] MigrationError),

    /// The stdio server stopped with an error.
    #[error("server error: {0}")]
    Server(#[from] ServerError),

    /// Output could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
