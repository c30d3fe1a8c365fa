//! Error types for the migration engine.

use std::io;
use thiserror::Error;

/// Result type for migration operations.
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Errors raised by the migration runner.
///
/// A failing *operation* is not an error at this level: it is reported in the
/// [`OperationResult`](crate::OperationResult) and stops its migration. These
/// variants cover definition parsing and state bookkeeping.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Filesystem error while reading definitions or writing state.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A migration definition could not be parsed or validated.
    #[error("failed to parse migration {path}: {message}")]
    Parse { path: String, message: String },

    /// The state file could not be serialized.
    #[error("migration state error: {message}")]
    State { message: String },

    /// A single operation failed its preconditions.
    #[error("operation {index} failed: {message}")]
    Operation { index: usize, message: String },
}

impl MigrationError {
    /// Creates a parse error for the definition at `path`.
    pub fn parse(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a state error.
    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    /// Creates an operation error for the 1-based operation `index`.
    pub fn operation(index: usize, message: impl Into<String>) -> Self {
        Self::Operation {
            index,
            message: message.into(),
        }
    }
}
