//! Error handling with the AppError enum
//!
//! Every fallible operation in the crate returns `AppResult<T>`. Variants follow
//! the propagation policy of the monitor: clipboard failures are transient,
//! persistence failures are contained to the operation that hit them, and
//! configuration failures are fatal at startup.

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "message")]
pub enum AppError {
    /// The OS clipboard could not be read this cycle
    #[error("Clipboard read error: {0}")]
    ClipboardRead(String),

    /// Writing to the OS clipboard failed
    #[error("Clipboard write error: {0}")]
    ClipboardWrite(String),

    /// Insert/delete/query against the backing store failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The backing store or settings could not be initialised
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid input or parameter
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl AppError {
    /// Errors that are expected to clear up on the next poll.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::ClipboardRead(_))
    }

    /// Errors that leave the process with nothing useful to do.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Configuration(_))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(format!("JSON error: {}", err))
    }
}

impl From<redb::DatabaseError> for AppError {
    fn from(err: redb::DatabaseError) -> Self {
        match err {
            redb::DatabaseError::DatabaseAlreadyOpen => AppError::Configuration(
                "History database is locked by another process; a running `watch` takes commands on stdin"
                    .to_string(),
            ),
            other => AppError::Configuration(format!("Failed to open database: {}", other)),
        }
    }
}

impl From<redb::TransactionError> for AppError {
    fn from(err: redb::TransactionError) -> Self {
        AppError::Persistence(format!("Failed to begin transaction: {}", err))
    }
}

impl From<redb::TableError> for AppError {
    fn from(err: redb::TableError) -> Self {
        AppError::Persistence(format!("Failed to open table: {}", err))
    }
}

impl From<redb::StorageError> for AppError {
    fn from(err: redb::StorageError) -> Self {
        AppError::Persistence(format!("Storage error: {}", err))
    }
}

impl From<redb::CommitError> for AppError {
    fn from(err: redb::CommitError) -> Self {
        AppError::Persistence(format!("Failed to commit: {}", err))
    }
}

impl<T: std::fmt::Debug> From<ciborium::ser::Error<T>> for AppError {
    fn from(err: ciborium::ser::Error<T>) -> Self {
        AppError::Persistence(format!("Serialization error: {}", err))
    }
}

impl<T: std::fmt::Debug> From<ciborium::de::Error<T>> for AppError {
    fn from(err: ciborium::de::Error<T>) -> Self {
        AppError::Persistence(format!("Deserialization error: {}", err))
    }
}

pub type AppResult<T> = Result<T, AppError>;
