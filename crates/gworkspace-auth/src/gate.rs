//! The bearer-token gate and an HTTP client that goes through it.
//!
//! Every outbound Google API call asks the gate for a token first. The gate
//! never caches: it reads the stored status each time and refreshes lazily.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::HttpTimeouts;
use crate::error::{AuthError, AuthResult};
use crate::manager::OAuthManager;
use crate::models::TokenStatus;

pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
pub const DOCS_API_BASE: &str = "https://docs.googleapis.com/v1";
pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4";
pub const SLIDES_API_BASE: &str = "https://slides.googleapis.com/v1";
pub const TASKS_API_BASE: &str = "https://tasks.googleapis.com/tasks/v1";

/// Hands out bearer tokens, refreshing expired ones on demand.
#[derive(Debug, Clone)]
pub struct AccessTokenGate {
    manager: Arc<OAuthManager>,
}

impl AccessTokenGate {
    pub fn new(manager: Arc<OAuthManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<OAuthManager> {
        &self.manager
    }

    /// Returns the access token to send, or an error telling the user what to do.
    pub async fn bearer_token(&self) -> AuthResult<String> {
        let (status, stored) = self.manager.get_status().await?;
        match status {
            TokenStatus::Missing => Err(AuthError::auth_required("No OAuth token found.")),
            TokenStatus::Invalid => Err(AuthError::auth_required("Stored OAuth token is invalid.")),
            TokenStatus::Expired => {
                debug!("token expired, refreshing");
                match self.manager.refresh_if_needed().await? {
                    Some(token) => Ok(token.access_token),
                    None => Err(AuthError::refresh_failed(
                        "OAuth token expired and could not be refreshed.",
                    )),
                }
            }
            TokenStatus::Valid => stored
                .map(|s| s.token.access_token)
                .ok_or_else(|| AuthError::auth_required("No OAuth token found.")),
        }
    }
}

/// Authenticated JSON client for Google APIs.
#[derive(Debug, Clone)]
pub struct GoogleApiClient {
    gate: AccessTokenGate,
    http: reqwest::Client,
}

impl GoogleApiClient {
    pub fn new(gate: AccessTokenGate, timeouts: HttpTimeouts) -> AuthResult<Self> {
        Ok(Self::with_client(gate, timeouts.build_client()?))
    }

    pub fn with_client(gate: AccessTokenGate, http: reqwest::Client) -> Self {
        Self { gate, http }
    }

    pub fn gate(&self) -> &AccessTokenGate {
        &self.gate
    }

    /// `GET url?query` and parse the JSON body.
    pub async fn get_json(&self, url: &str, query: &[(&str, String)]) -> AuthResult<Value> {
        self.request_json(Method::GET, url, query, None).await
    }

    /// Sends a request with an optional JSON body; empty responses become `null`.
    pub async fn request_json(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> AuthResult<Value> {
        let token = self.gate.bearer_token().await?;

        let mut request = self
            .http
            .request(method.clone(), url)
            .bearer_auth(token)
            .query(query);
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!(%method, url, "google api request");
        let response = request
            .send()
            .await
            .map_err(|e| AuthError::network(format!("request to {} failed: {}", url, e)).with_source(e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::network(format!("failed to read response: {}", e)))?;

        check_status(status, &text)?;

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| {
            AuthError::invalid_response(format!("invalid JSON from {}: {}", url, e)).with_source(e)
        })
    }

    /// Sends a `DELETE`.
    pub async fn delete(&self, url: &str) -> AuthResult<()> {
        self.request_json(Method::DELETE, url, &[], None)
            .await
            .map(|_| ())
    }
}

fn check_status(status: StatusCode, body: &str) -> AuthResult<()> {
    if status.is_success() {
        return Ok(());
    }
    warn!(%status, "google api error");
    match status {
        StatusCode::UNAUTHORIZED => Err(AuthError::auth_required(format!(
            "Google rejected the access token ({}).",
            status
        ))),
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => Err(AuthError::network(
            format!("Google API returned {}: {}", status, body),
        )),
        _ => Err(AuthError::invalid_response(format!(
            "Google API returned {}: {}",
            status, body
        ))),
    }
}
