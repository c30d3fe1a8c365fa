//! Operation handlers.
//!
//! Every handler checks its preconditions first, then returns early for
//! dry-runs, then optionally backs up the pre-operation state and mutates the
//! filesystem. "Nothing to do" cases resolve to a skipped success so that
//! re-running a migration is a no-op.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::models::{MigrationOperation, MoveSpec};

/// Outcome of a single operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    /// Whether the operation succeeded (skips count as success).
    pub success: bool,
    /// Human-readable result message.
    pub message: String,
    /// Backup created before mutating, if any.
    pub backup_path: Option<PathBuf>,
    /// Whether there was nothing to do.
    pub skipped: bool,
}

impl OperationResult {
    /// A successful operation.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            backup_path: None,
            skipped: false,
        }
    }

    /// A successful no-op.
    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            skipped: true,
            ..Self::ok(message)
        }
    }

    /// A failed operation.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::ok(message)
        }
    }

    /// Attaches the backup location.
    pub fn with_backup(mut self, backup_path: Option<PathBuf>) -> Self {
        self.backup_path = backup_path;
        self
    }
}

/// Executes `op`, touching nothing on disk when `dry_run` is set.
pub fn execute_operation(op: &MigrationOperation, dry_run: bool) -> OperationResult {
    match op {
        MigrationOperation::MoveDirectory(spec) => move_directory(spec, dry_run),
        MigrationOperation::MoveFile(spec) => move_file(spec, dry_run),
        MigrationOperation::RenameKey {
            file,
            old_key,
            new_key,
            backup,
        } => rename_key(file, old_key, new_key, *backup, dry_run),
        MigrationOperation::AddField {
            file,
            key,
            value,
            backup,
            skip_if_target_exists,
        } => add_field(file, key, value, *backup, *skip_if_target_exists, dry_run),
        MigrationOperation::RemoveField { file, key, backup } => {
            remove_field(file, key, *backup, dry_run)
        }
    }
}

/// Expands a leading `~` to the user's home directory.
pub fn expand_path(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Copies `source` to a timestamped sibling `<name>.backup_<YYYYMMDD_HHMMSS>`.
///
/// Returns `Ok(None)` if `source` does not exist.
pub fn create_backup(source: &Path) -> io::Result<Option<PathBuf>> {
    if !source.exists() {
        return Ok(None);
    }

    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let backup_path = source.with_file_name(format!("{}.backup_{}", name, timestamp));

    if source.is_dir() {
        copy_dir_recursive(source, &backup_path)?;
    } else {
        fs::copy(source, &backup_path)?;
    }

    info!(backup = %backup_path.display(), "created backup");
    Ok(Some(backup_path))
}

fn copy_dir_recursive(source: &Path, target: &Path) -> io::Result<()> {
    fs::create_dir_all(target)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let dest = target.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &dest)?;
        } else {
            fs::copy(entry.path(), &dest)?;
        }
    }
    // Keep the source's mode, e.g. a 0700 credentials directory.
    fs::set_permissions(target, fs::metadata(source)?.permissions())
}

/// Renames `source` to `target`, copying across filesystems if needed.
fn move_path(source: &Path, target: &Path) -> io::Result<()> {
    match fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            debug!(error = %rename_err, "rename failed, falling back to copy");
            if source.is_dir() {
                copy_dir_recursive(source, target)?;
                fs::remove_dir_all(source)
            } else {
                fs::copy(source, target)?;
                fs::remove_file(source)
            }
        }
    }
}

fn move_directory(spec: &MoveSpec, dry_run: bool) -> OperationResult {
    move_entry(spec, dry_run, false)
}

fn move_file(spec: &MoveSpec, dry_run: bool) -> OperationResult {
    move_entry(spec, dry_run, true)
}

fn move_entry(spec: &MoveSpec, dry_run: bool, file_only: bool) -> OperationResult {
    let source = expand_path(&spec.from_path);
    let target = expand_path(&spec.to_path);

    if !source.exists() {
        return OperationResult::skipped(format!(
            "Source {} does not exist, skipping",
            source.display()
        ));
    }

    if file_only && !source.is_file() {
        return OperationResult::failed(format!("Source {} is not a file", source.display()));
    }

    if target.exists() {
        if spec.skip_if_target_exists {
            return OperationResult::skipped(format!(
                "Target {} already exists, skipping",
                target.display()
            ));
        }
        return OperationResult::failed(format!("Target {} already exists", target.display()));
    }

    if dry_run {
        return OperationResult::ok(format!(
            "Would move {} -> {}",
            source.display(),
            target.display()
        ));
    }

    let backup_path = if spec.backup {
        match create_backup(&source) {
            Ok(path) => path,
            Err(e) => return OperationResult::failed(format!("Failed to create backup: {}", e)),
        }
    } else {
        None
    };

    if let Some(parent) = target.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            return OperationResult::failed(format!(
                "Failed to create {}: {}",
                parent.display(),
                e
            ));
        }
    }

    let what = if file_only { "file" } else { "directory" };
    match move_path(&source, &target) {
        Ok(()) => OperationResult::ok(format!(
            "Moved {} -> {}",
            source.display(),
            target.display()
        ))
        .with_backup(backup_path),
        Err(e) => OperationResult::failed(format!("Failed to move {}: {}", what, e)),
    }
}

/// Serialization format of a structured data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataFormat {
    Json,
    Yaml,
}

impl DataFormat {
    fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::Yaml,
            _ => Self::Json,
        }
    }
}

/// Top-level mapping of a data file, kept in its native representation.
///
/// YAML stays a `serde_yaml::Mapping` so that values JSON cannot express
/// (non-finite floats, non-string keys, tags) survive a rewrite.
#[derive(Debug)]
enum DataDocument {
    Json(Map<String, Value>),
    Yaml(serde_yaml::Mapping),
}

impl DataDocument {
    fn empty(format: DataFormat) -> Self {
        match format {
            DataFormat::Json => Self::Json(Map::new()),
            DataFormat::Yaml => Self::Yaml(serde_yaml::Mapping::new()),
        }
    }

    fn contains_key(&self, key: &str) -> bool {
        match self {
            Self::Json(map) => map.contains_key(key),
            Self::Yaml(map) => map.contains_key(key),
        }
    }

    fn insert(&mut self, key: &str, value: &Value) -> Result<(), String> {
        match self {
            Self::Json(map) => {
                map.insert(key.to_string(), value.clone());
            }
            Self::Yaml(map) => {
                let value = serde_yaml::to_value(value)
                    .map_err(|e| format!("Failed to convert value for '{}': {}", key, e))?;
                map.insert(serde_yaml::Value::String(key.to_string()), value);
            }
        }
        Ok(())
    }

    /// Moves the value under `old_key` to `new_key`, appended at the end.
    fn rename(&mut self, old_key: &str, new_key: &str) {
        match self {
            Self::Json(map) => {
                if let Some(value) = map.shift_remove(old_key) {
                    map.insert(new_key.to_string(), value);
                }
            }
            Self::Yaml(map) => {
                if let Some(value) = yaml_shift_remove(map, old_key) {
                    map.insert(serde_yaml::Value::String(new_key.to_string()), value);
                }
            }
        }
    }

    fn remove(&mut self, key: &str) {
        match self {
            Self::Json(map) => {
                map.shift_remove(key);
            }
            Self::Yaml(map) => {
                yaml_shift_remove(map, key);
            }
        }
    }
}

/// Removes a string key from a YAML mapping, keeping the order of the rest.
fn yaml_shift_remove(map: &mut serde_yaml::Mapping, key: &str) -> Option<serde_yaml::Value> {
    let mut removed = None;
    *map = std::mem::take(map)
        .into_iter()
        .filter_map(|(k, v)| {
            if removed.is_none() && k.as_str() == Some(key) {
                removed = Some(v);
                None
            } else {
                Some((k, v))
            }
        })
        .collect();
    removed
}

fn load_data_file(path: &Path) -> Result<DataDocument, String> {
    if !path.exists() {
        return Err(format!("File {} does not exist", path.display()));
    }

    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;

    let document = match DataFormat::for_path(path) {
        DataFormat::Yaml if content.trim().is_empty() => Some(DataDocument::empty(DataFormat::Yaml)),
        DataFormat::Yaml => {
            let value: serde_yaml::Value = serde_yaml::from_str(&content)
                .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;
            match value {
                serde_yaml::Value::Mapping(map) => Some(DataDocument::Yaml(map)),
                serde_yaml::Value::Null => Some(DataDocument::empty(DataFormat::Yaml)),
                _ => None,
            }
        }
        DataFormat::Json => {
            let value: Value = serde_json::from_str(&content)
                .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;
            match value {
                Value::Object(map) => Some(DataDocument::Json(map)),
                Value::Null => Some(DataDocument::empty(DataFormat::Json)),
                _ => None,
            }
        }
    };

    document.ok_or_else(|| format!("{} does not contain a mapping", path.display()))
}

fn save_data_file(path: &Path, data: &DataDocument) -> Result<(), String> {
    let content = match data {
        DataDocument::Yaml(map) => serde_yaml::to_string(map)
            .map_err(|e| format!("Failed to serialize {}: {}", path.display(), e))?,
        DataDocument::Json(map) => serde_json::to_string_pretty(map)
            .map_err(|e| format!("Failed to serialize {}: {}", path.display(), e))?,
    };
    fs::write(path, content).map_err(|e| format!("Failed to write {}: {}", path.display(), e))
}

fn backup_if(enabled: bool, path: &Path) -> Result<Option<PathBuf>, OperationResult> {
    if !enabled {
        return Ok(None);
    }
    create_backup(path)
        .map_err(|e| OperationResult::failed(format!("Failed to create backup: {}", e)))
}

fn rename_key(
    file: &str,
    old_key: &str,
    new_key: &str,
    backup: bool,
    dry_run: bool,
) -> OperationResult {
    let path = expand_path(file);

    let mut data = match load_data_file(&path) {
        Ok(data) => data,
        Err(e) => return OperationResult::failed(e),
    };

    if !data.contains_key(old_key) {
        return OperationResult::skipped(format!(
            "Key '{}' not found in {}, skipping",
            old_key,
            path.display()
        ));
    }

    if data.contains_key(new_key) {
        return OperationResult::failed(format!(
            "Key '{}' already exists in {}",
            new_key,
            path.display()
        ));
    }

    if dry_run {
        return OperationResult::ok(format!(
            "Would rename key '{}' -> '{}' in {}",
            old_key,
            new_key,
            path.display()
        ));
    }

    let backup_path = match backup_if(backup, &path) {
        Ok(p) => p,
        Err(result) => return result,
    };

    data.rename(old_key, new_key);

    if let Err(e) = save_data_file(&path, &data) {
        return OperationResult::failed(e);
    }

    OperationResult::ok(format!(
        "Renamed key '{}' -> '{}' in {}",
        old_key,
        new_key,
        path.display()
    ))
    .with_backup(backup_path)
}

fn add_field(
    file: &str,
    key: &str,
    value: &Value,
    backup: bool,
    skip_if_target_exists: bool,
    dry_run: bool,
) -> OperationResult {
    let path = expand_path(file);
    let exists = path.exists();

    let mut data = if exists {
        match load_data_file(&path) {
            Ok(data) => data,
            Err(e) => return OperationResult::failed(e),
        }
    } else {
        DataDocument::empty(DataFormat::for_path(&path))
    };

    if data.contains_key(key) {
        if skip_if_target_exists {
            return OperationResult::skipped(format!(
                "Key '{}' already exists in {}, skipping",
                key,
                path.display()
            ));
        }
        return OperationResult::failed(format!(
            "Key '{}' already exists in {}",
            key,
            path.display()
        ));
    }

    if dry_run {
        return OperationResult::ok(format!(
            "Would add key '{}' = {} to {}",
            key,
            value,
            path.display()
        ));
    }

    let backup_path = match backup_if(backup && exists, &path) {
        Ok(p) => p,
        Err(result) => return result,
    };

    if let Err(e) = data.insert(key, value) {
        return OperationResult::failed(e);
    }

    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            return OperationResult::failed(format!(
                "Failed to create {}: {}",
                parent.display(),
                e
            ));
        }
    }

    if let Err(e) = save_data_file(&path, &data) {
        return OperationResult::failed(e);
    }

    OperationResult::ok(format!(
        "Added key '{}' = {} to {}",
        key,
        value,
        path.display()
    ))
    .with_backup(backup_path)
}

fn remove_field(file: &str, key: &str, backup: bool, dry_run: bool) -> OperationResult {
    let path = expand_path(file);

    let mut data = match load_data_file(&path) {
        Ok(data) => data,
        Err(e) => return OperationResult::failed(e),
    };

    if !data.contains_key(key) {
        return OperationResult::skipped(format!(
            "Key '{}' not found in {}, skipping",
            key,
            path.display()
        ));
    }

    if dry_run {
        return OperationResult::ok(format!(
            "Would remove key '{}' from {}",
            key,
            path.display()
        ));
    }

    let backup_path = match backup_if(backup, &path) {
        Ok(p) => p,
        Err(result) => return result,
    };

    data.remove(key);

    if let Err(e) = save_data_file(&path, &data) {
        return OperationResult::failed(e);
    }

    OperationResult::ok(format!("Removed key '{}' from {}", key, path.display()))
        .with_backup(backup_path)
}
