//! Token lifecycle orchestration.
//!
//! [`OAuthManager`] ties [`TokenStorage`] to an [`AuthorizationFlow`]: it runs
//! the consent flow, converts what the flow returns into stored tokens, and
//! refreshes lazily when a caller asks for a token that has expired.
//!
//! Storage calls run on the blocking pool. Concurrent refreshes of the same
//! expired token are not coalesced; both callers hit the token endpoint and
//! the last write wins.

use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use crate::config::{OAuthCredentials, RedirectTarget, default_scopes};
use crate::error::{AuthError, AuthResult};
use crate::flow::{AuthorizationFlow, ExternalCredentials, FlowRequest};
use crate::models::{OAuthToken, StoredToken, TokenMetadata, TokenStatus};
use crate::storage::TokenStorage;

/// Storage key for the Workspace token.
pub const DEFAULT_SERVICE_NAME: &str = "gworkspace-mcp";

/// Lifetime assumed when the server reports no expiry.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Orchestrates authorization, refresh and status for one service key.
pub struct OAuthManager {
    storage: Arc<TokenStorage>,
    flow: Arc<dyn AuthorizationFlow>,
    service_name: String,
    client: Option<OAuthCredentials>,
    redirect: RedirectTarget,
}

impl std::fmt::Debug for OAuthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthManager")
            .field("storage", &self.storage)
            .field("service_name", &self.service_name)
            .field("client", &self.client)
            .field("redirect", &self.redirect)
            .finish_non_exhaustive()
    }
}

impl OAuthManager {
    pub fn new(storage: Arc<TokenStorage>, flow: Arc<dyn AuthorizationFlow>) -> Self {
        Self {
            storage,
            flow,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            client: None,
            redirect: RedirectTarget::default(),
        }
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Sets the client credentials used for refreshing.
    pub fn with_client_credentials(mut self, credentials: OAuthCredentials) -> Self {
        self.client = Some(credentials);
        self
    }

    pub fn with_redirect(mut self, redirect: RedirectTarget) -> Self {
        self.redirect = redirect;
        self
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn token_path(&self) -> &Path {
        self.storage.path()
    }

    pub fn storage(&self) -> &Arc<TokenStorage> {
        &self.storage
    }

    async fn with_storage<T, F>(&self, f: F) -> AuthResult<T>
    where
        F: FnOnce(&TokenStorage, &str) -> T + Send + 'static,
        T: Send + 'static,
    {
        let storage = Arc::clone(&self.storage);
        let service = self.service_name.clone();
        tokio::task::spawn_blocking(move || f(&storage, &service))
            .await
            .map_err(|e| AuthError::internal("token storage worker failed").with_source(e))
    }

    /// True iff the stored token is present, parses and is not expired.
    pub async fn has_valid_tokens(&self) -> bool {
        matches!(
            self.with_storage(|s, svc| s.get_status(svc)).await,
            Ok(TokenStatus::Valid)
        )
    }

    /// Runs the interactive consent flow and stores the resulting token.
    ///
    /// `scopes` defaults to the Workspace scope set.
    pub async fn authenticate(
        &self,
        scopes: Option<Vec<String>>,
        credentials: &OAuthCredentials,
    ) -> AuthResult<OAuthToken> {
        credentials.require()?;
        let scopes = scopes.unwrap_or_else(default_scopes);

        info!(service = %self.service_name, scopes = scopes.len(), "starting authorization");
        let request = FlowRequest {
            credentials: credentials.clone(),
            scopes: scopes.clone(),
            redirect: self.redirect.clone(),
        };
        let external = self.flow.authorize(request).await?;

        let token = to_token(external, scopes);
        let metadata = TokenMetadata::new(self.service_name.clone());
        let to_store = token.clone();
        self.with_storage(move |s, svc| s.store(svc, &to_store, &metadata))
            .await??;

        info!(service = %self.service_name, expires_at = %token.expires_at, "authorization complete");
        Ok(token)
    }

    /// Returns a usable token, refreshing it first if it has expired.
    ///
    /// `Ok(None)` means there is no token, or it expired without a refresh
    /// token; either way the user has to authenticate again.
    pub async fn refresh_if_needed(&self) -> AuthResult<Option<OAuthToken>> {
        let Some(stored) = self.with_storage(|s, svc| s.retrieve(svc)).await? else {
            debug!(service = %self.service_name, "no stored token");
            return Ok(None);
        };

        if !stored.token.is_expired() {
            return Ok(Some(stored.token));
        }

        if stored.token.refresh_token.is_none() {
            warn!(service = %self.service_name, "token expired and no refresh token is stored");
            return Ok(None);
        }

        let client = self.client.as_ref().ok_or_else(|| {
            AuthError::configuration(
                "cannot refresh the token: client ID and secret are not configured",
            )
        })?;

        info!(service = %self.service_name, "refreshing expired token");
        let refreshed = self
            .flow
            .refresh(ExternalCredentials::from(&stored.token), client)
            .await?;

        let StoredToken {
            mut metadata,
            token: previous,
            ..
        } = stored;
        let mut token = to_token(refreshed, previous.scopes);
        if token.refresh_token.is_none() {
            token.refresh_token = previous.refresh_token;
        }
        metadata.last_refreshed = Some(Utc::now());

        let to_store = token.clone();
        self.with_storage(move |s, svc| s.store(svc, &to_store, &metadata))
            .await??;
        Ok(Some(token))
    }

    /// The stored token's status, with the record unless it is missing.
    pub async fn get_status(&self) -> AuthResult<(TokenStatus, Option<StoredToken>)> {
        self.with_storage(|s, svc| {
            let status = s.get_status(svc);
            let stored = if status == TokenStatus::Missing {
                None
            } else {
                s.retrieve(svc)
            };
            (status, stored)
        })
        .await
    }

    /// The stored token in flow form, without checking expiry.
    pub async fn get_credentials(&self) -> AuthResult<Option<ExternalCredentials>> {
        let stored = self.with_storage(|s, svc| s.retrieve(svc)).await?;
        Ok(stored.map(|s| ExternalCredentials::from(&s.token)))
    }

    /// Deletes the stored token; returns whether one existed.
    pub async fn logout(&self) -> AuthResult<bool> {
        self.with_storage(|s, svc| s.delete(svc)).await?
    }
}

/// Converts flow output to a stored token, defaulting expiry to one hour.
fn to_token(external: ExternalCredentials, requested_scopes: Vec<String>) -> OAuthToken {
    let expires_at = external
        .expiry
        .unwrap_or_else(|| Utc::now() + Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS));
    let scopes = if external.scopes.is_empty() {
        requested_scopes
    } else {
        external.scopes
    };
    OAuthToken::new(external.access_token, external.refresh_token, expires_at, scopes)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::AuthErrorCode;
    use crate::flow::BoxFuture;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Flow returning canned results.
    #[derive(Default)]
    pub(crate) struct FakeFlow {
        pub authorize_result: Mutex<Option<AuthResult<ExternalCredentials>>>,
        pub refresh_result: Mutex<Option<AuthResult<ExternalCredentials>>>,
        pub refresh_calls: AtomicUsize,
        pub last_request: Mutex<Option<FlowRequest>>,
    }

    impl AuthorizationFlow for FakeFlow {
        fn authorize(&self, request: FlowRequest) -> BoxFuture<'_, AuthResult<ExternalCredentials>> {
            *self.last_request.lock().unwrap() = Some(request);
            let result = self
                .authorize_result
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(AuthError::flow("no canned authorize result")));
            Box::pin(async move { result })
        }

        fn refresh<'a>(
            &'a self,
            _current: ExternalCredentials,
            _client: &'a OAuthCredentials,
        ) -> BoxFuture<'a, AuthResult<ExternalCredentials>> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            let result = self
                .refresh_result
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(AuthError::network("no canned refresh result")));
            Box::pin(async move { result })
        }
    }

    pub(crate) fn external(access: &str, refresh: Option<&str>, expires_in: Option<i64>) -> ExternalCredentials {
        ExternalCredentials {
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            expiry: expires_in.map(|s| Utc::now() + Duration::seconds(s)),
            scopes: vec![],
        }
    }

    fn setup(tmp: &TempDir) -> (Arc<FakeFlow>, OAuthManager) {
        let storage = Arc::new(TokenStorage::new(tmp.path().join("tokens.json")).unwrap());
        let flow = Arc::new(FakeFlow::default());
        let manager = OAuthManager::new(storage, flow.clone())
            .with_client_credentials(OAuthCredentials::new("id", "secret"));
        (flow, manager)
    }

    fn seed(manager: &OAuthManager, token: OAuthToken) {
        manager
            .storage()
            .store(DEFAULT_SERVICE_NAME, &token, &TokenMetadata::new(DEFAULT_SERVICE_NAME))
            .unwrap();
    }

    fn expired(refresh: Option<&str>) -> OAuthToken {
        OAuthToken::new(
            "old",
            refresh.map(str::to_string),
            Utc::now() - Duration::seconds(10),
            vec!["scope-a".to_string()],
        )
    }

    #[tokio::test]
    async fn authenticate_requires_credentials() {
        let tmp = TempDir::new().unwrap();
        let (flow, manager) = setup(&tmp);

        let err = manager
            .authenticate(None, &OAuthCredentials::new("", "secret"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::Configuration);
        assert!(flow.last_request.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn authenticate_stores_token_with_default_expiry() {
        let tmp = TempDir::new().unwrap();
        let (flow, manager) = setup(&tmp);
        *flow.authorize_result.lock().unwrap() = Some(Ok(external("at", Some("rt"), None)));

        let before = Utc::now();
        let token = manager
            .authenticate(None, &OAuthCredentials::new("id", "secret"))
            .await
            .unwrap();

        assert_eq!(token.access_token, "at");
        assert_eq!(token.scopes.len(), 7);
        assert!(token.expires_at >= before + Duration::seconds(3599));
        assert!(token.expires_at <= Utc::now() + Duration::seconds(3600));

        let request = flow.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.redirect, RedirectTarget::default());

        let (status, stored) = manager.get_status().await.unwrap();
        assert_eq!(status, TokenStatus::Valid);
        let stored = stored.unwrap();
        assert_eq!(stored.metadata.provider, "google");
        assert_eq!(stored.metadata.service_name, DEFAULT_SERVICE_NAME);
        assert!(manager.has_valid_tokens().await);
    }

    #[tokio::test]
    async fn valid_token_is_returned_without_refresh() {
        let tmp = TempDir::new().unwrap();
        let (flow, manager) = setup(&tmp);
        seed(
            &manager,
            OAuthToken::new("fresh", None, Utc::now() + Duration::hours(1), vec![]),
        );

        let token = manager.refresh_if_needed().await.unwrap().unwrap();
        assert_eq!(token.access_token, "fresh");
        assert_eq!(flow.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_or_unrefreshable_tokens_yield_none() {
        let tmp = TempDir::new().unwrap();
        let (flow, manager) = setup(&tmp);
        assert!(manager.refresh_if_needed().await.unwrap().is_none());

        seed(&manager, expired(None));
        assert!(manager.refresh_if_needed().await.unwrap().is_none());
        assert_eq!(flow.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn refresh_keeps_refresh_token_and_marks_metadata() {
        let tmp = TempDir::new().unwrap();
        let (flow, manager) = setup(&tmp);
        seed(&manager, expired(Some("rt")));
        *flow.refresh_result.lock().unwrap() = Some(Ok(external("new", None, Some(3600))));

        let token = manager.refresh_if_needed().await.unwrap().unwrap();
        assert_eq!(token.access_token, "new");
        assert_eq!(token.refresh_token.as_deref(), Some("rt"));
        assert_eq!(token.scopes, vec!["scope-a"]);

        let (status, stored) = manager.get_status().await.unwrap();
        assert_eq!(status, TokenStatus::Valid);
        assert!(stored.unwrap().metadata.last_refreshed.is_some());
    }

    #[tokio::test]
    async fn refresh_errors_propagate() {
        let tmp = TempDir::new().unwrap();
        let (flow, manager) = setup(&tmp);
        seed(&manager, expired(Some("rt")));
        *flow.refresh_result.lock().unwrap() =
            Some(Err(AuthError::refresh_failed("invalid_grant")));

        let err = manager.refresh_if_needed().await.unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::RefreshFailed);

        let (status, _) = manager.get_status().await.unwrap();
        assert_eq!(status, TokenStatus::Expired);
    }

    #[tokio::test]
    async fn refresh_without_client_credentials_is_a_configuration_error() {
        let tmp = TempDir::new().unwrap();
        let storage = Arc::new(TokenStorage::new(tmp.path().join("tokens.json")).unwrap());
        let manager = OAuthManager::new(storage, Arc::new(FakeFlow::default()));
        seed(&manager, expired(Some("rt")));

        let err = manager.refresh_if_needed().await.unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::Configuration);
    }

    #[tokio::test]
    async fn status_and_credentials_of_missing_token() {
        let tmp = TempDir::new().unwrap();
        let (_flow, manager) = setup(&tmp);

        let (status, stored) = manager.get_status().await.unwrap();
        assert_eq!(status, TokenStatus::Missing);
        assert!(stored.is_none());
        assert!(manager.get_credentials().await.unwrap().is_none());
        assert!(!manager.logout().await.unwrap());
    }

    #[tokio::test]
    async fn get_credentials_ignores_expiry() {
        let tmp = TempDir::new().unwrap();
        let (_flow, manager) = setup(&tmp);
        seed(&manager, expired(Some("rt")));

        let creds = manager.get_credentials().await.unwrap().unwrap();
        assert_eq!(creds.access_token, "old");
        assert_eq!(creds.refresh_token.as_deref(), Some("rt"));

        assert!(manager.logout().await.unwrap());
        assert_eq!(manager.get_status().await.unwrap().0, TokenStatus::Missing);
    }
}
