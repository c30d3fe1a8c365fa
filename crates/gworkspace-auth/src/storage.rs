//! File-backed token storage.
//!
//! All tokens live in one JSON document mapping service names to
//! [`StoredToken`] records. Every write loads the full map, replaces one
//! entry and writes the map back through a fresh temp file in the same
//! directory, so the file on disk is never partially written. The directory is
//! kept at `0700` and the file at `0600` on unix.
//!
//! Writers sharing one `TokenStorage` are serialized. There is no file
//! locking: concurrent writers from separate processes race and the last one
//! wins.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use gworkspace_migrations::MigrationRunner;

use crate::error::{AuthError, AuthResult};
use crate::models::{OAuthToken, StoredToken, TokenMetadata, TokenStatus};

/// Persisted token storage.
#[derive(Debug)]
pub struct TokenStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl TokenStorage {
    /// Opens storage at `path`, creating its directory with owner-only access.
    pub fn new(path: impl Into<PathBuf>) -> AuthResult<Self> {
        let storage = Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        };
        storage.ensure_credentials_dir()?;
        if storage.path.exists() {
            set_mode(&storage.path, 0o600);
        }
        Ok(storage)
    }

    /// Runs pending migrations, then opens storage at `path`.
    ///
    /// A failing migration is logged and does not prevent opening the storage.
    pub fn with_migrations(path: impl Into<PathBuf>, runner: &MigrationRunner) -> AuthResult<Self> {
        match runner.get_pending_migrations() {
            Ok(pending) if pending.is_empty() => {}
            Ok(pending) => {
                info!(count = pending.len(), "running pending migrations");
                if let Err(e) = runner.run_all_pending(false) {
                    warn!(error = %e, "migration run failed (non-fatal)");
                }
            }
            Err(e) => warn!(error = %e, "migration check failed (non-fatal)"),
        }
        Self::new(path)
    }

    /// Returns the token file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the directory holding the token file.
    pub fn credentials_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    fn ensure_credentials_dir(&self) -> AuthResult<()> {
        let dir = self.credentials_dir();
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|e| {
                AuthError::storage(format!(
                    "failed to create credentials directory {}",
                    dir.display()
                ))
                .with_source(e)
            })?;
            debug!(dir = %dir.display(), "created credentials directory");
        }
        set_mode(dir, 0o700);
        Ok(())
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Loads the raw map; unreadable or malformed files are treated as empty.
    fn load_raw(&self) -> Map<String, Value> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Map::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read token file");
                return Map::new();
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                warn!(path = %self.path.display(), "token file is not a JSON object");
                Map::new()
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "malformed token file");
                Map::new()
            }
        }
    }

    fn save_raw(&self, tokens: &Map<String, Value>) -> AuthResult<()> {
        self.ensure_credentials_dir()?;

        let content = serde_json::to_string_pretty(tokens)
            .map_err(|e| AuthError::internal("failed to serialize tokens").with_source(e))?;

        let dir = self.credentials_dir();
        let mut temp = tempfile::Builder::new()
            .prefix(".tokens")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| {
                AuthError::storage(format!("failed to create temp file in {}", dir.display()))
                    .with_source(e)
            })?;
        set_mode(temp.path(), 0o600);
        temp.write_all(content.as_bytes())
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|e| {
                AuthError::storage(format!("failed to write {}", temp.path().display()))
                    .with_source(e)
            })?;

        temp.persist(&self.path).map_err(|e| {
            AuthError::storage(format!("failed to replace {}", self.path.display()))
                .with_source(e.error)
        })?;
        set_mode(&self.path, 0o600);

        debug!(path = %self.path.display(), "saved token file");
        Ok(())
    }

    /// Stores `token` under `service_name`, replacing any previous record.
    pub fn store(
        &self,
        service_name: &str,
        token: &OAuthToken,
        metadata: &TokenMetadata,
    ) -> AuthResult<()> {
        let stored = StoredToken::new(token.clone(), metadata.clone());
        let value = serde_json::to_value(&stored)
            .map_err(|e| AuthError::internal("failed to serialize token").with_source(e))?;

        let _guard = self.lock_writes();
        let mut tokens = self.load_raw();
        tokens.insert(service_name.to_string(), value);
        self.save_raw(&tokens)?;

        info!(service = service_name, "stored token");
        Ok(())
    }

    /// Returns the record for `service_name`, or `None` if absent or corrupt.
    pub fn retrieve(&self, service_name: &str) -> Option<StoredToken> {
        let raw = self.load_raw().remove(service_name)?;
        match StoredToken::from_value(raw) {
            Ok(stored) => Some(stored),
            Err(e) => {
                warn!(service = service_name, error = %e, "stored token is corrupt");
                None
            }
        }
    }

    /// Removes the record for `service_name`; returns whether it existed.
    pub fn delete(&self, service_name: &str) -> AuthResult<bool> {
        let _guard = self.lock_writes();
        let mut tokens = self.load_raw();
        if tokens.remove(service_name).is_none() {
            return Ok(false);
        }
        self.save_raw(&tokens)?;
        info!(service = service_name, "deleted token");
        Ok(true)
    }

    /// All service names, sorted.
    pub fn list_services(&self) -> Vec<String> {
        let mut services: Vec<String> = self.load_raw().keys().cloned().collect();
        services.sort();
        services
    }

    /// Derives the status of the record under `service_name`.
    pub fn get_status(&self, service_name: &str) -> TokenStatus {
        let Some(raw) = self.load_raw().remove(service_name) else {
            return TokenStatus::Missing;
        };
        match StoredToken::from_value(raw) {
            Ok(stored) => TokenStatus::of(&stored),
            Err(_) => TokenStatus::Invalid,
        }
    }

    /// Deletes the token file if present.
    pub fn clear_all(&self) -> AuthResult<()> {
        let _guard = self.lock_writes();
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "cleared all tokens");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::storage(format!(
                "failed to remove {}",
                self.path.display()
            ))
            .with_source(e)),
        }
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(mode)) {
        warn!(path = %path.display(), error = %e, "failed to set permissions");
    }
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) {}
