//! Error types for rooster-store.

use std::path::PathBuf;

use rooster_types::AlarmId;

/// Result type for rooster-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in rooster-store.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Alarm not found in database.
    #[error("Alarm not found: {0}")]
    AlarmNotFound(AlarmId),

    /// Database was written by a newer schema than this build knows.
    #[error("Unsupported database schema version {0}")]
    UnsupportedSchema(i32),

    /// Backup file has an unsupported format version.
    #[error("Unsupported backup version {0}")]
    UnsupportedBackup(u32),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
