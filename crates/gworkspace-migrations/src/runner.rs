//! Migration discovery, execution and state tracking.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::error::{MigrationError, MigrationResult};
use crate::models::{
    AppliedInfo, Migration, MigrationOperation, MigrationState, MigrationStatus, PendingInfo,
};
use crate::operations::{OperationResult, execute_operation};

/// A migration definition compiled into the binary.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedMigration {
    /// File name, e.g. `0001_rename_credentials_dir.yaml`.
    pub file_name: &'static str,
    /// YAML contents.
    pub contents: &'static str,
}

/// Migrations shipped with the crate.
pub const BUILTIN_MIGRATIONS: &[EmbeddedMigration] = &[EmbeddedMigration {
    file_name: "0001_rename_credentials_dir.yaml",
    contents: include_str!("../migrations/0001_rename_credentials_dir.yaml"),
}];

/// Where migration definitions are read from.
#[derive(Debug, Clone)]
pub enum MigrationSource {
    /// A directory of `*.yaml` files.
    Directory(PathBuf),
    /// Definitions compiled into the binary.
    Embedded(&'static [EmbeddedMigration]),
}

impl MigrationSource {
    /// The built-in migration set.
    pub fn builtin() -> Self {
        Self::Embedded(BUILTIN_MIGRATIONS)
    }

    /// Returns `(file_name, contents)` for every candidate definition.
    fn read_definitions(&self) -> MigrationResult<Vec<(String, String)>> {
        match self {
            Self::Embedded(entries) => Ok(entries
                .iter()
                .map(|e| (e.file_name.to_string(), e.contents.to_string()))
                .collect()),
            Self::Directory(dir) => {
                if !dir.is_dir() {
                    debug!(dir = %dir.display(), "migrations directory does not exist");
                    return Ok(Vec::new());
                }
                let mut out = Vec::new();
                for entry in fs::read_dir(dir)? {
                    let path = entry?.path();
                    if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                        continue;
                    }
                    let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned())
                    else {
                        continue;
                    };
                    match fs::read_to_string(&path) {
                        Ok(contents) => out.push((name, contents)),
                        Err(e) => warn!(file = %path.display(), error = %e, "failed to read migration"),
                    }
                }
                Ok(out)
            }
        }
    }
}

impl fmt::Display for MigrationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory(dir) => write!(f, "{}", dir.display()),
            Self::Embedded(_) => write!(f, "<builtin>"),
        }
    }
}

/// Outcome of running one migration.
#[derive(Debug, Clone)]
pub struct MigrationRun {
    /// Id of the migration.
    pub id: String,
    /// True if every operation succeeded.
    pub success: bool,
    /// Per-operation results, in order, up to and including a failure.
    pub results: Vec<OperationResult>,
}

impl MigrationRun {
    /// The first failing operation as an error, if any.
    pub fn failure(&self) -> Option<MigrationError> {
        self.results
            .iter()
            .position(|r| !r.success)
            .map(|i| MigrationError::operation(i + 1, self.results[i].message.clone()))
    }
}

/// Callback receiving one human-readable line per step.
pub type ProgressCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Discovers, runs and records migrations.
pub struct MigrationRunner {
    source: MigrationSource,
    state_file: PathBuf,
    progress: Option<ProgressCallback>,
}

impl fmt::Debug for MigrationRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationRunner")
            .field("source", &self.source)
            .field("state_file", &self.state_file)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl MigrationRunner {
    /// Creates a runner over `source`, persisting state at `state_file`.
    pub fn new(source: MigrationSource, state_file: impl Into<PathBuf>) -> Self {
        Self {
            source,
            state_file: state_file.into(),
            progress: None,
        }
    }

    /// Sets the progress callback.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Returns the state file path.
    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    /// Returns the definition source.
    pub fn source(&self) -> &MigrationSource {
        &self.source
    }

    fn report(&self, line: &str) {
        info!("{}", line);
        if let Some(ref callback) = self.progress {
            callback(line);
        }
    }

    /// Loads every definition, sorted by id.
    ///
    /// Files whose name does not start with a digit are ignored. Unparseable
    /// definitions are logged and skipped, as are later duplicates of an id.
    pub fn load_migrations(&self) -> MigrationResult<Vec<Migration>> {
        let mut migrations = Vec::new();
        let mut seen = HashSet::new();

        let mut definitions = self.source.read_definitions()?;
        definitions.sort_by(|a, b| a.0.cmp(&b.0));

        for (name, contents) in definitions {
            if !name.starts_with(|c: char| c.is_ascii_digit()) {
                debug!(file = %name, "ignoring non-migration file");
                continue;
            }

            let migration: Migration = match serde_yaml::from_str(&contents) {
                Ok(m) => m,
                Err(e) => {
                    let err = MigrationError::parse(&name, e.to_string());
                    warn!(error = %err, "skipping invalid migration");
                    continue;
                }
            };

            if !seen.insert(migration.id.clone()) {
                warn!(id = %migration.id, file = %name, "duplicate migration id, skipping");
                continue;
            }
            migrations.push(migration);
        }

        migrations.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(migrations)
    }

    /// Loads the persisted state; a missing or unreadable file yields the default.
    pub fn load_state(&self) -> MigrationState {
        let content = match fs::read_to_string(&self.state_file) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return MigrationState::default();
            }
            Err(e) => {
                warn!(file = %self.state_file.display(), error = %e, "failed to read migration state");
                return MigrationState::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(state) => state,
            Err(e) => {
                warn!(file = %self.state_file.display(), error = %e, "corrupt migration state, starting fresh");
                MigrationState::default()
            }
        }
    }

    fn save_state(&self, state: &MigrationState) -> MigrationResult<()> {
        if let Some(parent) = self.state_file.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| MigrationError::state(e.to_string()))?;
        fs::write(&self.state_file, json)?;
        debug!(file = %self.state_file.display(), "saved migration state");
        Ok(())
    }

    /// Ids of applied migrations, in application order.
    pub fn get_applied_migrations(&self) -> Vec<String> {
        self.load_state()
            .applied_migrations
            .into_iter()
            .map(|m| m.id)
            .collect()
    }

    /// Known migrations not yet applied, sorted by id.
    pub fn get_pending_migrations(&self) -> MigrationResult<Vec<Migration>> {
        let state = self.load_state();
        Ok(self
            .load_migrations()?
            .into_iter()
            .filter(|m| !state.is_applied(&m.id))
            .collect())
    }

    /// Runs every operation of `migration` in order, stopping at the first failure.
    ///
    /// On full success outside dry-run the migration is recorded in the state file.
    pub fn run_migration(&self, migration: &Migration, dry_run: bool) -> MigrationResult<MigrationRun> {
        let prefix = if dry_run { "[dry-run] " } else { "" };
        self.report(&format!(
            "{}Running migration {}: {}",
            prefix, migration.id, migration.description
        ));

        let mut results = Vec::with_capacity(migration.operations.len());
        let mut success = true;

        for (index, op) in migration.operations.iter().enumerate() {
            let result = execute_operation(op, dry_run);
            self.report(&format_step(index + 1, op, &result));
            let ok = result.success;
            results.push(result);
            if !ok {
                success = false;
                break;
            }
        }

        let run = MigrationRun {
            id: migration.id.clone(),
            success,
            results,
        };

        if !success {
            if let Some(err) = run.failure() {
                error!(id = %migration.id, error = %err, "migration failed");
            }
            return Ok(run);
        }

        if !dry_run {
            let mut state = self.load_state();
            if state.record(migration, Utc::now()) {
                self.save_state(&state)?;
            }
        }

        self.report(&format!("{}Migration {} complete", prefix, migration.id));
        Ok(run)
    }

    /// Runs pending migrations in id order, stopping at the first failure.
    ///
    /// Returns the ids that were (or in dry-run, would be) applied.
    pub fn run_all_pending(&self, dry_run: bool) -> MigrationResult<Vec<String>> {
        let pending = self.get_pending_migrations()?;
        if pending.is_empty() {
            debug!("no pending migrations");
            return Ok(Vec::new());
        }

        let mut applied = Vec::new();
        for migration in &pending {
            let run = self.run_migration(migration, dry_run)?;
            if !run.success {
                self.report(&format!(
                    "Stopping: migration {} failed, {} later migration(s) not attempted",
                    migration.id,
                    pending.len() - applied.len() - 1
                ));
                break;
            }
            applied.push(run.id);
        }
        Ok(applied)
    }

    /// Summarizes applied and pending migrations.
    pub fn status(&self) -> MigrationResult<MigrationStatus> {
        let state = self.load_state();
        let migrations = self.load_migrations()?;

        let pending_migrations: Vec<PendingInfo> = migrations
            .iter()
            .filter(|m| !state.is_applied(&m.id))
            .map(|m| PendingInfo {
                id: m.id.clone(),
                version: m.version.clone(),
                description: m.description.clone(),
            })
            .collect();

        let applied_migrations: Vec<AppliedInfo> = state
            .applied_migrations
            .iter()
            .map(|m| AppliedInfo {
                id: m.id.clone(),
                version: m.version.clone(),
                applied_at: m.applied_at,
            })
            .collect();

        Ok(MigrationStatus {
            current_version: state.current_version,
            total_migrations: migrations.len(),
            applied_count: applied_migrations.len(),
            pending_count: pending_migrations.len(),
            applied_migrations,
            pending_migrations,
        })
    }
}

fn format_step(index: usize, op: &MigrationOperation, result: &OperationResult) -> String {
    let outcome = if !result.success {
        "failed"
    } else if result.skipped {
        "skipped"
    } else {
        "ok"
    };
    format!(
        "  [{}] {} {}: {}",
        index,
        op.operation_type(),
        outcome,
        result.message
    )
}
