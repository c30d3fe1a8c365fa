//! Migration definitions and runner bookkeeping.
//!
//! Definitions are YAML documents. Each operation is parsed into a
//! [`MigrationOperation`] variant carrying exactly the fields its kind needs,
//! so a definition missing a required field is rejected at load time rather
//! than when the operation runs.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Version recorded before any migration has been applied.
pub const INITIAL_VERSION: &str = "0.1.0";

/// Supported operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    MoveDirectory,
    MoveFile,
    RenameKey,
    AddField,
    RemoveField,
}

impl OperationType {
    /// The name used in definition files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MoveDirectory => "move_directory",
            Self::MoveFile => "move_file",
            Self::RenameKey => "rename_key",
            Self::AddField => "add_field",
            Self::RemoveField => "remove_field",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single migration step.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawOperation")]
pub enum MigrationOperation {
    /// Move or rename a directory.
    MoveDirectory(MoveSpec),
    /// Move or rename a regular file.
    MoveFile(MoveSpec),
    /// Rename a top-level key in a JSON or YAML file.
    RenameKey {
        file: String,
        old_key: String,
        new_key: String,
        backup: bool,
    },
    /// Add a top-level key to a JSON or YAML file.
    AddField {
        file: String,
        key: String,
        value: Value,
        backup: bool,
        skip_if_target_exists: bool,
    },
    /// Remove a top-level key from a JSON or YAML file.
    RemoveField {
        file: String,
        key: String,
        backup: bool,
    },
}

/// Source and target of a move operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveSpec {
    pub from_path: String,
    pub to_path: String,
    pub backup: bool,
    pub skip_if_target_exists: bool,
}

impl MigrationOperation {
    /// The kind of this operation.
    pub fn operation_type(&self) -> OperationType {
        match self {
            Self::MoveDirectory(_) => OperationType::MoveDirectory,
            Self::MoveFile(_) => OperationType::MoveFile,
            Self::RenameKey { .. } => OperationType::RenameKey,
            Self::AddField { .. } => OperationType::AddField,
            Self::RemoveField { .. } => OperationType::RemoveField,
        }
    }
}

/// Wire shape of an operation as written in YAML.
#[derive(Debug, Deserialize)]
struct RawOperation {
    #[serde(rename = "type")]
    kind: OperationType,
    #[serde(default, alias = "from_path")]
    from: Option<String>,
    #[serde(default, alias = "to_path")]
    to: Option<String>,
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    old_key: Option<String>,
    #[serde(default)]
    new_key: Option<String>,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    backup: bool,
    #[serde(default)]
    skip_if_target_exists: bool,
}

fn required(value: Option<String>, kind: OperationType, field: &str) -> Result<String, String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(format!("{} requires a non-empty '{}' parameter", kind, field)),
    }
}

impl TryFrom<RawOperation> for MigrationOperation {
    type Error = String;

    fn try_from(raw: RawOperation) -> Result<Self, Self::Error> {
        let kind = raw.kind;
        let op = match kind {
            OperationType::MoveDirectory | OperationType::MoveFile => {
                let spec = MoveSpec {
                    from_path: required(raw.from, kind, "from")?,
                    to_path: required(raw.to, kind, "to")?,
                    backup: raw.backup,
                    skip_if_target_exists: raw.skip_if_target_exists,
                };
                if kind == OperationType::MoveDirectory {
                    Self::MoveDirectory(spec)
                } else {
                    Self::MoveFile(spec)
                }
            }
            OperationType::RenameKey => Self::RenameKey {
                file: required(raw.file, kind, "file")?,
                old_key: required(raw.old_key, kind, "old_key")?,
                new_key: required(raw.new_key, kind, "new_key")?,
                backup: raw.backup,
            },
            OperationType::AddField => Self::AddField {
                file: required(raw.file, kind, "file")?,
                key: required(raw.key, kind, "key")?,
                value: raw.value,
                backup: raw.backup,
                skip_if_target_exists: raw.skip_if_target_exists,
            },
            OperationType::RemoveField => Self::RemoveField {
                file: required(raw.file, kind, "file")?,
                key: required(raw.key, kind, "key")?,
                backup: raw.backup,
            },
        };
        Ok(op)
    }
}

/// A complete migration definition.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Migration {
    /// Unique id with a zero-padded numeric prefix, e.g. `0001_rename_dir`.
    pub id: String,
    /// Schema version after this migration is applied.
    pub version: String,
    /// Informational source version pattern, e.g. `0.1.x`.
    pub from_version: String,
    /// Human-readable description.
    pub description: String,
    /// Creation date, informational only.
    #[serde(default)]
    pub created_at: Option<String>,
    /// Steps, executed strictly in order.
    #[serde(default)]
    pub operations: Vec<MigrationOperation>,
}

/// Record of an applied migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedMigration {
    pub id: String,
    pub applied_at: DateTime<Utc>,
    pub version: String,
}

/// Persisted runner bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationState {
    #[serde(default)]
    pub applied_migrations: Vec<AppliedMigration>,
    #[serde(default = "initial_version")]
    pub current_version: String,
}

fn initial_version() -> String {
    INITIAL_VERSION.to_string()
}

impl Default for MigrationState {
    fn default() -> Self {
        Self {
            applied_migrations: Vec::new(),
            current_version: initial_version(),
        }
    }
}

impl MigrationState {
    /// Returns true if `id` has been recorded.
    pub fn is_applied(&self, id: &str) -> bool {
        self.applied_migrations.iter().any(|m| m.id == id)
    }

    /// Records `migration` as applied and advances the current version.
    ///
    /// Returns false without changing anything if the id is already present.
    pub fn record(&mut self, migration: &Migration, applied_at: DateTime<Utc>) -> bool {
        if self.is_applied(&migration.id) {
            return false;
        }
        self.applied_migrations.push(AppliedMigration {
            id: migration.id.clone(),
            applied_at,
            version: migration.version.clone(),
        });
        self.current_version = migration.version.clone();
        true
    }
}

/// Summary of an applied migration for status reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedInfo {
    pub id: String,
    pub version: String,
    pub applied_at: DateTime<Utc>,
}

/// Summary of a pending migration for status reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingInfo {
    pub id: String,
    pub version: String,
    pub description: String,
}

/// Snapshot returned by [`MigrationRunner::status`](crate::MigrationRunner::status).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationStatus {
    pub current_version: String,
    pub total_migrations: usize,
    pub applied_count: usize,
    pub pending_count: usize,
    pub applied_migrations: Vec<AppliedInfo>,
    pub pending_migrations: Vec<PendingInfo>,
}
