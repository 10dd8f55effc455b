//! Error types for distributed lock operations.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during lock operations.
#[derive(Error, Debug)]
pub enum LockError {
    /// Lock acquisition timed out.
    #[error("lock acquisition timed out after {0:?}")]
    Timeout(Duration),

    /// The calling process already holds an incompatible lock request, or
    /// released a lock it does not hold.
    #[error("already locked: {0}")]
    AlreadyLocked(String),

    /// Invalid lock name or identity component.
    #[error("invalid lock name: {0}")]
    InvalidName(String),

    /// Filesystem error, annotated with the path it occurred on.
    #[error("i/o error on '{}': {source}", path.display())]
    Io {
        /// The path the failing operation targeted.
        path: PathBuf,
        /// The OS-reported cause.
        #[source]
        source: io::Error,
    },
}

impl LockError {
    /// Wraps an [`io::Error`] with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;
