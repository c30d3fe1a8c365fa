//! Command implementations.

pub mod doctor;
pub mod logout;
pub mod mcp;
pub mod migrate;
pub mod setup;

use std::path::PathBuf;
use std::sync::Arc;

use gworkspace_auth::{LoopbackFlow, OAuthCredentials, OAuthManager, TokenStorage};
use gworkspace_core::AppPaths;
use gworkspace_migrations::{MigrationRunner, MigrationSource};

use crate::config::ClientConfig;
use crate::error::ClientResult;

/// Configuration plus the paths resolved from it, shared by all commands.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: ClientConfig,
    /// File that `setup` writes credentials back to.
    pub config_path: PathBuf,
    pub paths: AppPaths,
}

impl Context {
    pub fn new(config: ClientConfig, config_path: PathBuf) -> ClientResult<Self> {
        let paths = config.storage.paths()?;
        Ok(Self {
            config,
            config_path,
            paths,
        })
    }

    /// Runner over the built-in migrations, tracking state under the credentials dir.
    pub fn migration_runner(&self) -> MigrationRunner {
        MigrationRunner::new(
            MigrationSource::builtin(),
            self.paths.migration_state_file.clone(),
        )
    }

    /// Opens token storage without touching migrations.
    pub fn storage(&self) -> ClientResult<TokenStorage> {
        Ok(TokenStorage::new(&self.paths.token_file)?)
    }

    /// Runs pending migrations, then opens token storage.
    pub fn migrated_storage(&self) -> ClientResult<TokenStorage> {
        let runner = self.migration_runner();
        Ok(TokenStorage::with_migrations(
            &self.paths.token_file,
            &runner,
        )?)
    }

    /// Builds the OAuth manager over `storage` with the loopback flow.
    pub fn manager(
        &self,
        storage: TokenStorage,
        credentials: Option<OAuthCredentials>,
    ) -> ClientResult<OAuthManager> {
        let flow = LoopbackFlow::new(self.config.http.timeouts())?;
        let mut manager = OAuthManager::new(Arc::new(storage), Arc::new(flow))
            .with_redirect(self.config.google.redirect_target()?);
        if let Some(credentials) = credentials {
            manager = manager.with_client_credentials(credentials);
        }
        Ok(manager)
    }
}
