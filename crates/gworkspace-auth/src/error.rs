//! Error types for the token lifecycle.
//!
//! Every failure carries an [`AuthErrorCode`] so that callers at the tool
//! boundary can decide how to present it: configuration problems and missing
//! tokens need the user to re-run setup, network failures are worth a retry.

use std::fmt;
use thiserror::Error;

/// Command users run to (re-)authenticate.
pub const SETUP_COMMAND: &str = "gworkspace-mcp setup";

/// The category of an authentication error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorCode {
    /// Client id or secret missing or malformed.
    Configuration,
    /// No usable token is stored (missing or corrupt).
    AuthRequired,
    /// The token is expired and could not be refreshed.
    RefreshFailed,
    /// Connection failed, timed out, or DNS resolution failed.
    Network,
    /// The token file could not be written.
    Storage,
    /// Unexpected response from Google.
    InvalidResponse,
    /// The interactive authorization flow failed or timed out.
    Flow,
    /// Unexpected state, a bug.
    Internal,
}

impl AuthErrorCode {
    /// Returns true if the operation may succeed when retried as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Returns a machine-readable name for this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration_error",
            Self::AuthRequired => "auth_required",
            Self::RefreshFailed => "refresh_failed",
            Self::Network => "network_error",
            Self::Storage => "storage_error",
            Self::InvalidResponse => "invalid_response",
            Self::Flow => "flow_error",
            Self::Internal => "internal_error",
        }
    }

    /// What the user should do about it, if anything.
    pub fn remediation(&self) -> Option<String> {
        match self {
            Self::AuthRequired | Self::RefreshFailed => {
                Some(format!("Run '{}' to authenticate.", SETUP_COMMAND))
            }
            Self::Network => Some("Check your network connection and try again.".to_string()),
            _ => None,
        }
    }
}

impl fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error raised while obtaining, storing or refreshing a token.
#[derive(Debug, Error)]
pub struct AuthError {
    code: AuthErrorCode,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AuthError {
    /// Creates a new error with the given code and message.
    pub fn new(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::Configuration, message)
    }

    pub fn auth_required(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::AuthRequired, message)
    }

    pub fn refresh_failed(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::RefreshFailed, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::Network, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::Storage, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::InvalidResponse, message)
    }

    pub fn flow(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::Flow, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::Internal, message)
    }

    /// Sets the underlying cause.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> AuthErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if this error is transient and may be retried.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// The message followed by the remediation hint, for end users.
    pub fn user_message(&self) -> String {
        match self.code.remediation() {
            Some(hint) => format!("{} {}", self.message, hint),
            None => self.message.clone(),
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for token operations.
pub type AuthResult<T> = Result<T, AuthError>;
