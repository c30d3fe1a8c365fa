//! Client configuration.
//!
//! Settings live in `~/.config/gworkspace-mcp/config.toml` by default:
//!
//! ```toml
//! [google]
//! client_id = "123.apps.googleusercontent.com"
//! client_secret = "env::MY_SECRET"      # or pass::entry, or plain text
//! redirect_uri = "http://127.0.0.1:8789/callback"
//!
//! [storage]
//! credentials_dir = "~/work/project/.gworkspace-mcp"
//!
//! [http]
//! connect_timeout_secs = 10
//! request_timeout_secs = 30
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use gworkspace_auth::{
    CLIENT_ID_ENV, CLIENT_SECRET_ENV, HttpTimeouts, OAuthCredentials, REDIRECT_URI_ENV,
    RedirectTarget,
};
use gworkspace_core::AppPaths;
use gworkspace_migrations::expand_path;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ClientError, ClientResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub google: GoogleSettings,

    pub storage: StorageSettings,

    pub http: HttpSettings,
}

impl ClientConfig {
    /// Loads `path`, or defaults if it does not exist yet.
    pub fn load_or_default(path: &Path) -> Result<Self, String> {
        if path.exists() {
            Self::load_from(path)
        } else {
            debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
        toml::from_str(&content).map_err(|e| format!("failed to parse {}: {}", path.display(), e))
    }

    pub fn default_path() -> PathBuf {
        gworkspace_core::paths::default_config_dir().join("config.toml")
    }
}

/// `[google]`: OAuth client and consent settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleSettings {
    pub client_id: Option<String>,

    pub client_secret: Option<String>,

    pub redirect_uri: Option<String>,

    /// Scopes requested by `setup`; the full Workspace set when absent.
    pub scopes: Option<Vec<String>>,
}

/// Where the client credentials came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// `--client-id`/`--client-secret` or their environment variables.
    Flags,
    /// The `[google]` section of config.toml.
    Config,
}

#[derive(Debug, Clone)]
pub struct ResolvedCredentials {
    pub credentials: OAuthCredentials,
    pub source: CredentialSource,
}

impl GoogleSettings {
    /// Picks client credentials: flags (or their env vars) first, then config.toml.
    ///
    /// `Ok(None)` means no source provided any credentials.
    pub fn resolve_credentials(
        &self,
        flag_id: Option<String>,
        flag_secret: Option<String>,
    ) -> ClientResult<Option<ResolvedCredentials>> {
        match (flag_id, flag_secret) {
            (Some(id), Some(secret)) => {
                return Ok(Some(ResolvedCredentials {
                    credentials: OAuthCredentials::new(id, secret),
                    source: CredentialSource::Flags,
                }));
            }
            (None, None) => {}
            _ => {
                return Err(ClientError::Config(format!(
                    "both --client-id and --client-secret ({} and {}) are required",
                    CLIENT_ID_ENV, CLIENT_SECRET_ENV
                )));
            }
        }

        match (self.client_id.as_deref(), self.client_secret.as_deref()) {
            (Some(raw_id), Some(raw_secret)) => {
                let id = crate::secret::resolve(raw_id)
                    .map_err(|e| ClientError::Config(format!("failed to resolve client_id: {}", e)))?;
                let secret = crate::secret::resolve(raw_secret).map_err(|e| {
                    ClientError::Config(format!("failed to resolve client_secret: {}", e))
                })?;
                Ok(Some(ResolvedCredentials {
                    credentials: OAuthCredentials::new(id, secret),
                    source: CredentialSource::Config,
                }))
            }
            (None, None) => Ok(None),
            (Some(_), None) => Err(ClientError::Config(
                "client_secret is missing from the [google] section".to_string(),
            )),
            (None, Some(_)) => Err(ClientError::Config(
                "client_id is missing from the [google] section".to_string(),
            )),
        }
    }

    /// Redirect URI from `GOOGLE_OAUTH_REDIRECT_URI`, then config, then the default.
    pub fn redirect_target(&self) -> ClientResult<RedirectTarget> {
        if std::env::var_os(REDIRECT_URI_ENV).is_some() {
            return Ok(RedirectTarget::from_env()?);
        }
        match self.redirect_uri.as_deref() {
            Some(uri) => Ok(RedirectTarget::parse(uri)?),
            None => Ok(RedirectTarget::default()),
        }
    }
}

/// `[storage]`: where tokens and migration state are kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Defaults to `./.gworkspace-mcp`.
    pub credentials_dir: Option<String>,

    pub state_file: Option<String>,
}

impl StorageSettings {
    /// Resolves the on-disk layout. Relative defaults use the working directory.
    pub fn paths(&self) -> ClientResult<AppPaths> {
        let mut paths = match self.credentials_dir.as_deref() {
            Some(dir) => AppPaths::new(expand_path(dir)),
            None => AppPaths::resolve_default()?,
        };
        if let Some(state_file) = self.state_file.as_deref() {
            paths = paths.with_migration_state_file(expand_path(state_file));
        }
        Ok(paths)
    }
}

/// `[http]`: timeouts for Google API and token endpoint calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub connect_timeout_secs: u64,

    pub request_timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: HttpTimeouts::DEFAULT_CONNECT_SECS,
            request_timeout_secs: HttpTimeouts::DEFAULT_REQUEST_SECS,
        }
    }
}

impl HttpSettings {
    pub fn timeouts(&self) -> HttpTimeouts {
        HttpTimeouts::new(
            Duration::from_secs(self.connect_timeout_secs),
            Duration::from_secs(self.request_timeout_secs),
        )
    }
}

/// Writes `client_id`/`client_secret` into `[google]` of the file at `path`,
/// keeping everything else in it.
pub fn save_credentials(path: &Path, credentials: &OAuthCredentials) -> ClientResult<()> {
    let content = if path.exists() {
        std::fs::read_to_string(path)?
    } else {
        String::new()
    };

    let mut doc = content
        .parse::<toml_edit::DocumentMut>()
        .map_err(|e| ClientError::Config(format!("cannot update {}: {}", path.display(), e)))?;

    if !doc.contains_key("google") {
        doc["google"] = toml_edit::Item::Table(toml_edit::Table::new());
    }
    let google = doc["google"].as_table_mut().ok_or_else(|| {
        ClientError::Config(format!("[google] in {} is not a table", path.display()))
    })?;
    google["client_id"] = toml_edit::value(credentials.client_id.as_str());
    google["client_secret"] = toml_edit::value(credentials.client_secret.as_str());

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, doc.to_string())?;
    Ok(())
}
