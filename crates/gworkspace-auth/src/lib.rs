//! OAuth token lifecycle for Google Workspace.
//!
//! - [`TokenStorage`] persists [`StoredToken`] records in an owner-only JSON file.
//! - [`OAuthManager`] runs the consent flow, refreshes expired tokens and
//!   reports [`TokenStatus`].
//! - [`AccessTokenGate`] is what tool handlers call before every API request;
//!   [`GoogleApiClient`] wraps it with an authenticated `reqwest` client.
//!
//! The interactive consent and refresh protocol sits behind the
//! [`AuthorizationFlow`] trait; [`LoopbackFlow`] is the PKCE loopback
//! implementation used in production.

pub mod config;
pub mod error;
pub mod flow;
pub mod gate;
pub mod loopback;
pub mod manager;
pub mod models;
pub mod storage;

pub use config::{
    CLIENT_ID_ENV, CLIENT_SECRET_ENV, DEFAULT_REDIRECT_URI, GOOGLE_WORKSPACE_SCOPES,
    HttpTimeouts, OAuthCredentials, REDIRECT_URI_ENV, RedirectTarget, default_scopes,
};
pub use error::{AuthError, AuthErrorCode, AuthResult, SETUP_COMMAND};
pub use flow::{AuthorizationFlow, BoxFuture, ExternalCredentials, FlowRequest};
pub use gate::{
    AccessTokenGate, CALENDAR_API_BASE, DOCS_API_BASE, DRIVE_API_BASE, GMAIL_API_BASE,
    GoogleApiClient, SHEETS_API_BASE, SLIDES_API_BASE, TASKS_API_BASE,
};
pub use loopback::{CALLBACK_TIMEOUT, LoopbackFlow, PkceFlow};
pub use manager::{DEFAULT_SERVICE_NAME, OAuthManager};
pub use models::{
    DEFAULT_EXPIRY_BUFFER_SECS, OAuthToken, StoredToken, TokenMetadata, TokenStatus,
};
pub use storage::TokenStorage;
