//! The seam between the token manager and the OAuth protocol.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

use crate::config::{OAuthCredentials, RedirectTarget};
use crate::error::AuthResult;
use crate::models::OAuthToken;

/// A boxed future that is Send.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Credentials as exchanged with the authorization server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCredentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Absolute expiry, if the server reported one.
    pub expiry: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
}

impl From<&OAuthToken> for ExternalCredentials {
    fn from(token: &OAuthToken) -> Self {
        Self {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            expiry: Some(token.expires_at),
            scopes: token.scopes.clone(),
        }
    }
}

/// Everything an interactive authorization needs.
#[derive(Debug, Clone)]
pub struct FlowRequest {
    pub credentials: OAuthCredentials,
    pub scopes: Vec<String>,
    pub redirect: RedirectTarget,
}

/// Performs the interactive consent flow and token refreshes.
///
/// Only one `authorize` may run at a time per process since it binds the
/// redirect listener.
pub trait AuthorizationFlow: Send + Sync {
    /// Runs the consent flow until the user grants access, fails, or times out.
    fn authorize(&self, request: FlowRequest) -> BoxFuture<'_, AuthResult<ExternalCredentials>>;

    /// Exchanges the refresh token in `current` for a new access token.
    fn refresh<'a>(
        &'a self,
        current: ExternalCredentials,
        client: &'a OAuthCredentials,
    ) -> BoxFuture<'a, AuthResult<ExternalCredentials>>;
}
