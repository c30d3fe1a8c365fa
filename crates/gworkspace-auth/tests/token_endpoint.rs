use std::sync::Arc;

use chrono::{Duration, Utc};
use gworkspace_auth::{
    AccessTokenGate, AuthErrorCode, DEFAULT_SERVICE_NAME, GoogleApiClient, HttpTimeouts,
    LoopbackFlow, OAuthCredentials, OAuthManager, OAuthToken, TokenMetadata, TokenStatus,
    TokenStorage,
};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn manager(tmp: &TempDir, server: &MockServer) -> Arc<OAuthManager> {
    let storage = Arc::new(TokenStorage::new(tmp.path().join(".gworkspace-mcp/tokens.json")).unwrap());
    let flow = LoopbackFlow::new(HttpTimeouts::default())
        .unwrap()
        .with_token_url(format!("{}/token", server.uri()))
        .without_browser();
    Arc::new(
        OAuthManager::new(storage, Arc::new(flow))
            .with_client_credentials(OAuthCredentials::new("client-id", "client-secret")),
    )
}

fn seed_expired(manager: &OAuthManager) {
    let token = OAuthToken::new(
        "expired-access",
        Some("refresh-123".to_string()),
        Utc::now() - Duration::minutes(5),
        vec!["https://www.googleapis.com/auth/calendar".to_string()],
    );
    manager
        .storage()
        .store(DEFAULT_SERVICE_NAME, &token, &TokenMetadata::new(DEFAULT_SERVICE_NAME))
        .unwrap();
}

#[tokio::test]
async fn refresh_against_token_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-123"))
        .and(body_string_contains("client_id=client-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-access",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let manager = manager(&tmp, &server);
    seed_expired(&manager);

    let token = manager.refresh_if_needed().await.unwrap().unwrap();
    assert_eq!(token.access_token, "fresh-access");
    assert_eq!(token.refresh_token.as_deref(), Some("refresh-123"));
    assert_eq!(token.scopes, vec!["https://www.googleapis.com/auth/calendar"]);

    let (status, stored) = manager.get_status().await.unwrap();
    assert_eq!(status, TokenStatus::Valid);
    assert!(stored.unwrap().metadata.last_refreshed.is_some());

    // Still valid: no second call to the endpoint.
    manager.refresh_if_needed().await.unwrap().unwrap();
}

#[tokio::test]
async fn revoked_refresh_token_needs_reauthentication() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Token has been expired or revoked."
        })))
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let manager = manager(&tmp, &server);
    seed_expired(&manager);

    let err = AccessTokenGate::new(manager.clone())
        .bearer_token()
        .await
        .unwrap_err();
    assert_eq!(err.code(), AuthErrorCode::RefreshFailed);
    assert!(!err.is_retryable());
    assert!(err.user_message().contains("gworkspace-mcp setup"));
    assert_eq!(manager.get_status().await.unwrap().0, TokenStatus::Expired);
}

#[tokio::test]
async fn server_errors_are_retryable_network_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let manager = manager(&tmp, &server);
    seed_expired(&manager);

    let err = manager.refresh_if_needed().await.unwrap_err();
    assert_eq!(err.code(), AuthErrorCode::Network);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn api_client_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-access",
            "expires_in": 3599
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/calendar/v3/users/me/calendarList"))
        .and(header("authorization", "Bearer fresh-access"))
        .and(query_param("maxResults", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "primary", "summary": "Me"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let manager = manager(&tmp, &server);
    seed_expired(&manager);

    let client = GoogleApiClient::new(AccessTokenGate::new(manager), HttpTimeouts::default()).unwrap();
    let body = client
        .get_json(
            &format!("{}/calendar/v3/users/me/calendarList", server.uri()),
            &[("maxResults", "10".to_string())],
        )
        .await
        .unwrap();
    assert_eq!(body["items"][0]["id"], "primary");
}

#[tokio::test]
async fn api_client_without_token_never_calls_google() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let manager = manager(&tmp, &server);
    let client = GoogleApiClient::new(AccessTokenGate::new(manager), HttpTimeouts::default()).unwrap();

    let err = client
        .get_json(&format!("{}/tasks/v1/users/@me/lists", server.uri()), &[])
        .await
        .unwrap_err();
    assert_eq!(err.code(), AuthErrorCode::AuthRequired);
}
