//! Error types and Result aliases for callwatch.
//!
//! One top-level [`Error`] with per-subsystem sub-enums. All public
//! functions return `Result<T, Error>` or `Result<T>`.

use thiserror::Error;

/// Result type alias using callwatch's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for callwatch operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database/storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Directory watch error.
    #[error("watch error: {0}")]
    Watch(#[from] WatchError),

    /// Call ingestion error.
    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Storage-specific errors.
///
/// Messages carry the operation name (`dirwatches.write`, `apikeys.read`, …)
/// so a failed save is attributable from the log line alone.
#[derive(Error, Debug)]
pub enum StorageError {
    /// `SQLite` database error.
    #[error("database error: {0}")]
    Database(String),

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Registry load/save error, prefixed with the operation name.
    #[error("{op}: {reason}")]
    Registry { op: &'static str, reason: String },
}

/// Directory watch errors.
#[derive(Error, Debug)]
pub enum WatchError {
    /// Start called on a watch that is already running.
    #[error("watch already started for '{0}'")]
    AlreadyStarted(String),

    /// The configured directory cannot be watched.
    #[error("failed to watch '{path}': {reason}")]
    WatchFailed { path: String, reason: String },

    /// The notify backend could not be created.
    #[error("watch backend error: {0}")]
    Backend(String),
}

/// Call ingestion errors.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Audio or sidecar file could not be read.
    #[error("failed to read '{path}': {reason}")]
    Read { path: String, reason: String },

    /// Sidecar or tag metadata was malformed.
    #[error("failed to parse metadata for '{path}': {reason}")]
    Meta { path: String, reason: String },

    /// Ingested file could not be removed.
    #[error("failed to remove '{path}': {reason}")]
    Remove { path: String, reason: String },

    /// The ingest channel receiver is gone.
    #[error("ingest channel closed")]
    ChannelClosed,
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl StorageError {
    /// Create a registry load/save error for the named operation.
    pub fn registry(op: &'static str, reason: impl Into<String>) -> Self {
        Self::Registry {
            op,
            reason: reason.into(),
        }
    }
}

impl IngestError {
    pub(crate) fn read(path: &std::path::Path, err: &std::io::Error) -> Self {
        Self::Read {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn meta(path: &std::path::Path, reason: impl Into<String>) -> Self {
        Self::Meta {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn remove(path: &std::path::Path, err: &std::io::Error) -> Self {
        Self::Remove {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }
}
