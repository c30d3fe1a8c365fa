//! OAuth 2.0 authorization code flow with PKCE and a loopback redirect.
//!
//! 1. Generate a code verifier, its SHA-256 challenge and a random state
//! 2. Bind a listener on the configured redirect host and port
//! 3. Open the browser on Google's consent page (the URL is also printed)
//! 4. Wait for a single request on the callback path
//! 5. Exchange the code (with the verifier) for tokens

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use rand::Rng as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::config::{GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL, HttpTimeouts, OAuthCredentials, RedirectTarget};
use crate::error::{AuthError, AuthErrorCode, AuthResult};
use crate::flow::{AuthorizationFlow, BoxFuture, ExternalCredentials, FlowRequest};

/// PKCE verifier length in bytes, before encoding.
const CODE_VERIFIER_LENGTH: usize = 32;

/// How long to wait for the user to finish consent.
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Production [`AuthorizationFlow`] against Google's endpoints.
#[derive(Debug, Clone)]
pub struct LoopbackFlow {
    http_client: reqwest::Client,
    auth_url: String,
    token_url: String,
    callback_timeout: Duration,
    open_browser: bool,
}

impl LoopbackFlow {
    /// Creates a flow using `timeouts` for token endpoint calls.
    pub fn new(timeouts: HttpTimeouts) -> AuthResult<Self> {
        Ok(Self::with_client(timeouts.build_client()?))
    }

    /// Creates a flow sharing an existing HTTP client.
    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            callback_timeout: CALLBACK_TIMEOUT,
            open_browser: true,
        }
    }

    /// Overrides the token endpoint.
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    /// Disables launching a browser; the URL is still printed.
    pub fn without_browser(mut self) -> Self {
        self.open_browser = false;
        self
    }

    async fn run_authorize(&self, request: FlowRequest) -> AuthResult<ExternalCredentials> {
        request.credentials.require()?;

        let pkce = PkceFlow::new();
        let auth_url = pkce.build_auth_url(
            &self.auth_url,
            &request.credentials.client_id,
            &request.redirect.uri,
            &request.scopes,
        );

        let listener = TcpListener::bind(request.redirect.bind_addr()).map_err(|e| {
            AuthError::flow(format!(
                "failed to listen on {} for the OAuth callback",
                request.redirect.bind_addr()
            ))
            .with_source(e)
        })?;
        debug!(addr = %request.redirect.bind_addr(), "bound loopback listener");

        eprintln!("Opening browser for Google authorization...");
        eprintln!("If the browser doesn't open, visit:\n\n{}\n", auth_url);
        if self.open_browser {
            if let Err(e) = open::that(&auth_url) {
                warn!(error = %e, "failed to open browser");
            }
        }

        let path = request.redirect.path.clone();
        let timeout = self.callback_timeout;
        let (code, received_state) =
            tokio::task::spawn_blocking(move || wait_for_callback(listener, &path, timeout))
                .await
                .map_err(|e| AuthError::internal("callback worker panicked").with_source(e))??;

        if received_state != pkce.state {
            return Err(AuthError::flow("OAuth state mismatch, possible CSRF attempt"));
        }

        info!("received authorization code, exchanging for tokens");
        let params = [
            ("client_id", request.credentials.client_id.as_str()),
            ("client_secret", request.credentials.client_secret.as_str()),
            ("code", code.as_str()),
            ("code_verifier", pkce.verifier.as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", request.redirect.uri.as_str()),
        ];
        let response = self.post_token(&params).await.map_err(|e| {
            if e.code() == AuthErrorCode::RefreshFailed {
                AuthError::flow(format!("token exchange rejected: {}", e.message()))
            } else {
                e
            }
        })?;

        let scopes = response.granted_scopes().unwrap_or(request.scopes);
        Ok(response.into_credentials(None, scopes))
    }

    async fn run_refresh(
        &self,
        current: ExternalCredentials,
        client: &OAuthCredentials,
    ) -> AuthResult<ExternalCredentials> {
        let refresh_token = current
            .refresh_token
            .clone()
            .ok_or_else(|| AuthError::refresh_failed("no refresh token available"))?;

        let params = [
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.as_str()),
            ("refresh_token", refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];
        let response = self.post_token(&params).await?;

        info!("refreshed access token");
        Ok(response.into_credentials(Some(refresh_token), current.scopes))
    }

    /// Posts to the token endpoint, classifying failures.
    async fn post_token(&self, params: &[(&str, &str)]) -> AuthResult<TokenResponse> {
        let response = self
            .http_client
            .post(&self.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| AuthError::network(format!("token request failed: {}", e)).with_source(e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::network(format!("failed to read token response: {}", e)))?;

        if status.as_u16() == 400 || status.as_u16() == 401 {
            return Err(AuthError::refresh_failed(format!(
                "token endpoint rejected the request ({}): {}; re-authentication is required",
                status, body
            )));
        }
        if !status.is_success() {
            return Err(AuthError::network(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            AuthError::invalid_response(format!("invalid token response: {}", e)).with_source(e)
        })
    }
}

impl AuthorizationFlow for LoopbackFlow {
    fn authorize(&self, request: FlowRequest) -> BoxFuture<'_, AuthResult<ExternalCredentials>> {
        Box::pin(self.run_authorize(request))
    }

    fn refresh<'a>(
        &'a self,
        current: ExternalCredentials,
        client: &'a OAuthCredentials,
    ) -> BoxFuture<'a, AuthResult<ExternalCredentials>> {
        Box::pin(self.run_refresh(current, client))
    }
}

/// Waits on a worker thread for one request on `path`.
fn wait_for_callback(
    listener: TcpListener,
    path: &str,
    timeout: Duration,
) -> AuthResult<(String, String)> {
    let (tx, rx) = mpsc::channel();
    let path = path.to_string();

    thread::spawn(move || {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    if let Some(result) = handle_callback(stream, &path) {
                        let _ = tx.send(result);
                        return;
                    }
                }
                Err(e) => error!(error = %e, "failed to accept connection"),
            }
        }
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(AuthError::flow(format!(
            "timed out after {}s waiting for the OAuth callback",
            timeout.as_secs()
        ))),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(AuthError::internal("callback listener stopped"))
        }
    }
}

/// Answers one HTTP request. Returns `None` for requests that are not the callback.
fn handle_callback(mut stream: TcpStream, callback_path: &str) -> Option<AuthResult<(String, String)>> {
    let mut request_line = String::new();
    {
        let mut reader = BufReader::new(&stream);
        if reader.read_line(&mut request_line).is_err() {
            return None;
        }
        // Drain headers so closing the socket does not reset the connection.
        let mut header = String::new();
        while reader.read_line(&mut header).is_ok_and(|n| n > 0) && !header.trim().is_empty() {
            header.clear();
        }
    }

    // GET /callback?code=...&state=... HTTP/1.1
    let mut parts = request_line.split_whitespace();
    let (Some("GET"), Some(target)) = (parts.next(), parts.next()) else {
        return None;
    };

    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    if path != callback_path {
        let _ = stream.write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\n\r\nNot Found");
        return None;
    }

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    let response: &[u8] = if error.is_some() || code.is_none() {
        b"HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\n\r\n\
        <html><body><h1>Authentication Failed</h1>\
        <p>Please close this window and try again.</p></body></html>"
    } else {
        b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n\
        <html><body><h1>Authentication Successful!</h1>\
        <p>You can close this window and return to the terminal.</p></body></html>"
    };
    let _ = stream.write_all(response);
    let _ = stream.flush();

    if let Some(error) = error {
        return Some(Err(AuthError::flow(format!(
            "OAuth authentication failed: {}",
            error
        ))));
    }
    match code {
        Some(code) => Some(Ok((code, state.unwrap_or_default()))),
        None => Some(Err(AuthError::flow(
            "no authorization code received from Google",
        ))),
    }
}

/// PKCE (RFC 7636) verifier, challenge and CSRF state.
#[derive(Debug)]
pub struct PkceFlow {
    pub verifier: String,
    pub challenge: String,
    pub state: String,
}

impl PkceFlow {
    pub fn new() -> Self {
        let verifier = random_urlsafe(CODE_VERIFIER_LENGTH);
        let challenge = Self::compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
            state: random_urlsafe(32),
        }
    }

    fn compute_challenge(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
    }

    /// Builds the consent URL with offline access and forced consent.
    pub fn build_auth_url(
        &self,
        base: &str,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&\
            code_challenge={}&code_challenge_method=S256&state={}&\
            access_type=offline&prompt=consent",
            base,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scopes.join(" ")),
            urlencoding::encode(&self.challenge),
            urlencoding::encode(&self.state),
        )
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

fn random_urlsafe(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

/// Response from Google's token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    fn granted_scopes(&self) -> Option<Vec<String>> {
        self.scope
            .as_ref()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
    }

    /// Keeps `fallback_refresh` when the server did not rotate the refresh token.
    fn into_credentials(
        self,
        fallback_refresh: Option<String>,
        scopes: Vec<String>,
    ) -> ExternalCredentials {
        ExternalCredentials {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(fallback_refresh),
            expiry: self
                .expires_in
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
            scopes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::SocketAddr;

    fn listener() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    fn send(addr: SocketAddr, request_target: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        let request = format!("GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", request_target);
        stream.write_all(request.as_bytes()).unwrap();
        let mut response = String::new();
        let _ = stream.read_to_string(&mut response);
        response
    }

    #[test]
    fn pkce_values() {
        let flow = PkceFlow::new();
        assert_eq!(flow.verifier.len(), 43);
        assert_eq!(flow.challenge, PkceFlow::compute_challenge(&flow.verifier));
        assert_ne!(flow.state, PkceFlow::new().state);
    }

    #[test]
    fn auth_url_format() {
        let flow = PkceFlow::new();
        let url = flow.build_auth_url(
            GOOGLE_AUTH_URL,
            "client.apps.googleusercontent.com",
            "http://127.0.0.1:8789/callback",
            &[
                "https://www.googleapis.com/auth/calendar".to_string(),
                "https://www.googleapis.com/auth/drive".to_string(),
            ],
        );

        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("redirect_uri=http%3A%2F%2F127.0.0.1%3A8789%2Fcallback"));
        assert!(url.contains("auth%2Fcalendar%20https"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains(&format!("state={}", flow.state)));
    }

    #[test]
    fn callback_returns_code_and_state() {
        let (listener, addr) = listener();
        let client = thread::spawn(move || {
            let not_found = send(addr, "/favicon.ico");
            let ok = send(addr, "/callback?code=4%2Fabc&state=xyz&scope=a");
            (not_found, ok)
        });

        let result = wait_for_callback(listener, "/callback", Duration::from_secs(10)).unwrap();
        assert_eq!(result, ("4/abc".to_string(), "xyz".to_string()));

        let (not_found, ok) = client.join().unwrap();
        assert!(not_found.starts_with("HTTP/1.1 404"));
        assert!(ok.starts_with("HTTP/1.1 200"));
    }

    #[test]
    fn callback_error_is_reported() {
        let (listener, addr) = listener();
        let client = thread::spawn(move || send(addr, "/callback?error=access_denied"));

        let err = wait_for_callback(listener, "/callback", Duration::from_secs(10)).unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::Flow);
        assert!(err.message().contains("access_denied"));
        assert!(client.join().unwrap().starts_with("HTTP/1.1 400"));
    }

    #[test]
    fn callback_times_out() {
        let (listener, _addr) = listener();
        let err = wait_for_callback(listener, "/callback", Duration::from_millis(50)).unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::Flow);
        assert!(err.message().contains("timed out"));
    }

    #[test]
    fn token_response_keeps_refresh_token_when_not_rotated() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token": "new", "expires_in": 3599, "token_type": "Bearer"}"#)
                .unwrap();
        let creds = response.into_credentials(Some("old-rt".to_string()), vec!["s".to_string()]);
        assert_eq!(creds.access_token, "new");
        assert_eq!(creds.refresh_token.as_deref(), Some("old-rt"));
        assert!(creds.expiry.unwrap() > Utc::now());
    }
}
