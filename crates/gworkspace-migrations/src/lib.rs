//! Declarative, versioned migrations for on-disk configuration state.
//!
//! Migrations are YAML documents listing typed operations (move a directory
//! or file, rename/add/remove a key in a JSON or YAML file). The
//! [`MigrationRunner`] applies pending migrations in id order, stops at the
//! first failing operation, and records applied ids in a JSON state file.

pub mod error;
pub mod models;
pub mod operations;
pub mod runner;

pub use error::{MigrationError, MigrationResult};
pub use models::{
    AppliedInfo, AppliedMigration, INITIAL_VERSION, Migration, MigrationOperation,
    MigrationState, MigrationStatus, MoveSpec, OperationType, PendingInfo,
};
pub use operations::{OperationResult, create_backup, execute_operation, expand_path};
pub use runner::{
    BUILTIN_MIGRATIONS, EmbeddedMigration, MigrationRun, MigrationRunner, MigrationSource,
    ProgressCallback,
};
