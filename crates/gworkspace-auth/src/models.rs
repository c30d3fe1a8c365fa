//! Token records and their derived status.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Seconds before `expires_at` at which a token is already treated as expired.
pub const DEFAULT_EXPIRY_BUFFER_SECS: i64 = 60;

/// Schema version of [`StoredToken`] records written by this crate.
pub const STORED_TOKEN_VERSION: u32 = 1;

/// The only token type Google issues for these APIs.
pub const BEARER: &str = "Bearer";

/// Default provider recorded in [`TokenMetadata`].
pub const GOOGLE_PROVIDER: &str = "google";

fn bearer() -> String {
    BEARER.to_string()
}

fn google() -> String {
    GOOGLE_PROVIDER.to_string()
}

/// An OAuth access token with its refresh token and granted scopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default = "bearer")]
    pub token_type: String,
}

impl OAuthToken {
    /// Creates a bearer token.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at,
            scopes,
            token_type: bearer(),
        }
    }

    /// Returns true if the token expires within the default 60 second buffer.
    pub fn is_expired(&self) -> bool {
        self.is_expired_within(Duration::seconds(DEFAULT_EXPIRY_BUFFER_SECS))
    }

    /// Returns true if `now + buffer >= expires_at`.
    pub fn is_expired_within(&self, buffer: Duration) -> bool {
        self.is_expired_at(Utc::now(), buffer)
    }

    /// Expiry check against an explicit clock.
    pub fn is_expired_at(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        now + buffer >= self.expires_at
    }

    /// Time left before `expires_at`; negative once passed.
    pub fn time_until_expiry(&self) -> Duration {
        self.expires_at - Utc::now()
    }
}

/// Bookkeeping stored next to a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub service_name: String,
    #[serde(default = "google")]
    pub provider: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_refreshed: Option<DateTime<Utc>>,
}

impl TokenMetadata {
    /// Fresh metadata for a Google token created now.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            provider: google(),
            created_at: Utc::now(),
            last_refreshed: None,
        }
    }
}

/// One entry of the token file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub version: u32,
    pub metadata: TokenMetadata,
    pub token: OAuthToken,
}

impl StoredToken {
    /// Wraps a token at the current schema version.
    pub fn new(token: OAuthToken, metadata: TokenMetadata) -> Self {
        Self {
            version: STORED_TOKEN_VERSION,
            metadata,
            token,
        }
    }

    /// Parses and validates a raw entry from the token file.
    pub fn from_value(value: serde_json::Value) -> Result<Self, String> {
        let stored: Self = serde_json::from_value(value).map_err(|e| e.to_string())?;
        stored.validate()?;
        Ok(stored)
    }

    /// Checks the invariants serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.version != STORED_TOKEN_VERSION {
            return Err(format!("unsupported token record version {}", self.version));
        }
        if self.token.token_type != BEARER {
            return Err(format!("unsupported token type '{}'", self.token.token_type));
        }
        if self.token.access_token.is_empty() {
            return Err("access_token is empty".to_string());
        }
        Ok(())
    }
}

/// Health of the token stored under a service name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    /// Parses and is not expired.
    Valid,
    /// Parses but is expired (or about to be).
    Expired,
    /// No entry under the key.
    Missing,
    /// An entry exists but does not parse.
    Invalid,
}

impl TokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Expired => "expired",
            Self::Missing => "missing",
            Self::Invalid => "invalid",
        }
    }

    /// Derives the status of a parsed record.
    pub fn of(stored: &StoredToken) -> Self {
        if stored.token.is_expired() {
            Self::Expired
        } else {
            Self::Valid
        }
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str().to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn token_expiring_in(secs: i64) -> OAuthToken {
        OAuthToken::new("at", None, Utc::now() + Duration::seconds(secs), vec![])
    }

    #[test]
    fn expiry_buffer_boundaries() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let token = OAuthToken::new("at", None, now + Duration::seconds(30), vec![]);

        assert!(token.is_expired_at(now, Duration::seconds(60)));
        assert!(!token.is_expired_at(now, Duration::seconds(10)));
        // Exactly at the buffer boundary counts as expired.
        assert!(token.is_expired_at(now, Duration::seconds(30)));
        assert!(!token.is_expired_at(now, Duration::seconds(29)));
    }

    #[test]
    fn default_buffer_is_sixty_seconds() {
        assert!(token_expiring_in(30).is_expired());
        assert!(token_expiring_in(59).is_expired());
        assert!(!token_expiring_in(120).is_expired());
        assert!(!token_expiring_in(30).is_expired_within(Duration::seconds(10)));
        assert!(token_expiring_in(-5).is_expired_within(Duration::zero()));
    }

    #[test]
    fn token_type_defaults_to_bearer() {
        let token: OAuthToken = serde_json::from_value(json!({
            "access_token": "at",
            "expires_at": "2025-03-01T12:00:00Z"
        }))
        .unwrap();
        assert_eq!(token.token_type, "Bearer");
        assert!(token.refresh_token.is_none());
        assert!(token.scopes.is_empty());
    }

    #[test]
    fn offset_timestamps_normalize_to_utc() {
        let token: OAuthToken = serde_json::from_value(json!({
            "access_token": "at",
            "expires_at": "2025-03-01T14:00:00+02:00"
        }))
        .unwrap();
        assert_eq!(
            token.expires_at,
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn stored_token_validation() {
        let good = json!({
            "version": 1,
            "metadata": {"service_name": "svc", "created_at": "2025-03-01T12:00:00Z"},
            "token": {"access_token": "at", "expires_at": "2025-03-01T12:00:00Z"}
        });
        let stored = StoredToken::from_value(good.clone()).unwrap();
        assert_eq!(stored.metadata.provider, "google");
        assert!(stored.metadata.last_refreshed.is_none());

        let mut wrong_type = good.clone();
        wrong_type["token"]["token_type"] = json!("MAC");
        assert!(StoredToken::from_value(wrong_type).is_err());

        let mut wrong_version = good.clone();
        wrong_version["version"] = json!(2);
        assert!(StoredToken::from_value(wrong_version).is_err());

        assert!(StoredToken::from_value(json!({"version": 1})).is_err());
        assert!(StoredToken::from_value(json!("garbage")).is_err());
    }

    #[test]
    fn status_display() {
        assert_eq!(TokenStatus::Valid.as_str(), "valid");
        assert_eq!(TokenStatus::Invalid.to_string(), "INVALID");
        assert_eq!(
            serde_json::to_value(TokenStatus::Expired).unwrap(),
            json!("expired")
        );
    }
}
