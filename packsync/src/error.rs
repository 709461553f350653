//! Error types for the storage and update engine.
//!
//! Every engine operation returns [`StoreResult`]. Variants carry the
//! operation and path involved so failures can be diagnosed from a single
//! log line; [`StoreError::kind`] collapses them into the three categories
//! callers act on.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type for engine operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Coarse error category reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing required input. Never retried.
    InvalidInput,
    /// Resource, file or handle does not exist (or has expired).
    NotFound,
    /// Filesystem or archive codec failure.
    IoFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::InvalidInput => write!(f, "invalid input"),
            ErrorKind::NotFound => write!(f, "not found"),
            ErrorKind::IoFailure => write!(f, "I/O failure"),
        }
    }
}

/// Errors that can occur during storage, manifest and staging operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Caller supplied malformed or missing data.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A manifest, descriptor or registry document could not be parsed.
    #[error("malformed document: {0}")]
    Manifest(#[from] serde_json::Error),

    /// A package descriptor failed validation.
    #[error("invalid package descriptor: {0}")]
    Descriptor(String),

    /// Referenced resource, file or handle does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Filesystem operation failed.
    #[error("failed to {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// ZIP encoding or decoding failed.
    #[error("archive error while {context}: {source}")]
    Archive {
        context: String,
        #[source]
        source: zip::result::ZipError,
    },

    /// A blocking worker task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

impl StoreError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidInput(_) | StoreError::Manifest(_) | StoreError::Descriptor(_) => {
                ErrorKind::InvalidInput
            }
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::Io { .. } | StoreError::Archive { .. } | StoreError::Task(_) => {
                ErrorKind::IoFailure
            }
        }
    }

    /// Returns true if this error reports a missing resource.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Build an I/O error for `op` on `path`.
    pub fn io(op: &'static str, path: impl AsRef<Path>, source: io::Error) -> Self {
        StoreError::Io {
            op,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Build an archive error with context.
    pub fn archive(context: impl Into<String>, source: zip::result::ZipError) -> Self {
        StoreError::Archive {
            context: context.into(),
            source,
        }
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        StoreError::Task(e.to_string())
    }
}

/// Run blocking filesystem work on the tokio blocking pool.
pub(crate) async fn blocking<T, F>(f: F) -> StoreResult<T>
where
    F: FnOnce() -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}
