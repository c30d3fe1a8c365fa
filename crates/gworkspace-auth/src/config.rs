//! OAuth client configuration.

use std::time::Duration;

use url::Url;

use crate::error::{AuthError, AuthResult};

/// Scopes requested by default: full access to the Workspace APIs exposed as tools.
pub const GOOGLE_WORKSPACE_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/calendar",
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/drive",
    "https://www.googleapis.com/auth/documents",
    "https://www.googleapis.com/auth/tasks",
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/presentations",
];

/// Redirect URI used when `GOOGLE_OAUTH_REDIRECT_URI` is not set.
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8789/callback";

/// Environment variable overriding the redirect URI.
pub const REDIRECT_URI_ENV: &str = "GOOGLE_OAUTH_REDIRECT_URI";
/// Environment variable holding the client id.
pub const CLIENT_ID_ENV: &str = "GOOGLE_OAUTH_CLIENT_ID";
/// Environment variable holding the client secret.
pub const CLIENT_SECRET_ENV: &str = "GOOGLE_OAUTH_CLIENT_SECRET";

/// Google's authorization endpoint.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// Google's token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Returns [`GOOGLE_WORKSPACE_SCOPES`] as owned strings.
pub fn default_scopes() -> Vec<String> {
    GOOGLE_WORKSPACE_SCOPES.iter().map(|s| s.to_string()).collect()
}

/// OAuth 2.0 client credentials from Google Cloud Console.
#[derive(Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl OAuthCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Fails with a configuration error unless both values are non-empty.
    pub fn require(&self) -> AuthResult<()> {
        if self.client_id.trim().is_empty() || self.client_secret.trim().is_empty() {
            return Err(AuthError::configuration(format!(
                "Client ID and secret required. Pass them as arguments or set {} and {}.",
                CLIENT_ID_ENV, CLIENT_SECRET_ENV
            )));
        }
        Ok(())
    }

    /// Returns true if the client id has the usual Google suffix.
    pub fn looks_like_google_client(&self) -> bool {
        self.client_id.ends_with(".apps.googleusercontent.com")
    }
}

/// Where the loopback listener binds and which path it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTarget {
    pub uri: String,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl RedirectTarget {
    /// Parses an `http://host:port/path` redirect URI.
    pub fn parse(uri: &str) -> AuthResult<Self> {
        let url = Url::parse(uri)
            .map_err(|e| AuthError::configuration(format!("invalid redirect URI '{}': {}", uri, e)))?;

        if url.scheme() != "http" {
            return Err(AuthError::configuration(format!(
                "redirect URI '{}' must use http for a loopback listener",
                uri
            )));
        }

        let host = url.host_str().unwrap_or("127.0.0.1").to_string();
        let port = url.port_or_known_default().unwrap_or(8789);
        let path = match url.path() {
            "" => "/callback".to_string(),
            p => p.to_string(),
        };

        Ok(Self {
            uri: uri.to_string(),
            host,
            port,
            path,
        })
    }

    /// Reads `GOOGLE_OAUTH_REDIRECT_URI`, falling back to the default.
    pub fn from_env() -> AuthResult<Self> {
        let uri = std::env::var(REDIRECT_URI_ENV).unwrap_or_else(|_| DEFAULT_REDIRECT_URI.to_string());
        Self::parse(&uri)
    }

    /// The `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for RedirectTarget {
    fn default() -> Self {
        Self {
            uri: DEFAULT_REDIRECT_URI.to_string(),
            host: "127.0.0.1".to_string(),
            port: 8789,
            path: "/callback".to_string(),
        }
    }
}

/// Timeouts for outbound HTTP calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl HttpTimeouts {
    pub const DEFAULT_CONNECT_SECS: u64 = 10;
    pub const DEFAULT_REQUEST_SECS: u64 = 30;

    pub fn new(connect: Duration, request: Duration) -> Self {
        Self { connect, request }
    }

    /// Builds a client carrying these timeouts.
    pub fn build_client(&self) -> AuthResult<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(self.connect)
            .timeout(self.request)
            .user_agent(concat!("gworkspace-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AuthError::internal("failed to create HTTP client").with_source(e))
    }
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(Self::DEFAULT_CONNECT_SECS),
            request: Duration::from_secs(Self::DEFAULT_REQUEST_SECS),
        }
    }
}
