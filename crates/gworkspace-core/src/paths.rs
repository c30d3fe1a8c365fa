//! Filesystem locations used by the token store and migration runner.
//!
//! Paths are resolved once at startup and handed to the components that need
//! them; nothing below the binary looks at the working directory or `$HOME`
//! on its own.

use std::path::{Path, PathBuf};

/// Name of the project-level credentials directory.
pub const CREDENTIALS_DIR_NAME: &str = ".gworkspace-mcp";

/// File name of the token store inside the credentials directory.
pub const TOKEN_FILE_NAME: &str = "tokens.json";

/// File name of the migration bookkeeping inside the credentials directory.
pub const MIGRATION_STATE_FILE_NAME: &str = ".migration_state.json";

/// Resolved locations for on-disk state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    /// Directory holding tokens and migration state (mode 0700).
    pub credentials_dir: PathBuf,
    /// The token store file.
    pub token_file: PathBuf,
    /// The migration state file.
    pub migration_state_file: PathBuf,
}

impl AppPaths {
    /// Builds the layout rooted at `credentials_dir`.
    pub fn new(credentials_dir: impl Into<PathBuf>) -> Self {
        let credentials_dir = credentials_dir.into();
        Self {
            token_file: credentials_dir.join(TOKEN_FILE_NAME),
            migration_state_file: credentials_dir.join(MIGRATION_STATE_FILE_NAME),
            credentials_dir,
        }
    }

    /// Project-level layout under `project_dir/.gworkspace-mcp`.
    pub fn for_project(project_dir: &Path) -> Self {
        Self::new(project_dir.join(CREDENTIALS_DIR_NAME))
    }

    /// Resolves the default layout from the current working directory.
    ///
    /// Each project authenticates separately, matching the project-level
    /// OAuth client credentials.
    pub fn resolve_default() -> std::io::Result<Self> {
        Ok(Self::for_project(&std::env::current_dir()?))
    }

    /// Overrides the token file location.
    pub fn with_token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_file = path.into();
        self
    }

    /// Overrides the migration state file location.
    pub fn with_migration_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.migration_state_file = path.into();
        self
    }
}

/// Returns the default directory for `config.toml`.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gworkspace-mcp")
}
