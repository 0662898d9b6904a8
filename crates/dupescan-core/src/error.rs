//! Error types for the engine.
//!
//! Three layers, each recoverable at its own granularity:
//! - [`TaskError`]: one filesystem operation failed inside a worker. Surfaced
//!   to the consumer as an `Error` event; the worker carries on.
//! - [`EngineError`]: the engine could not start or refused a request.
//! - [`ConfigError`]: a configuration value could not be parsed.
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure of a single task, classified from the underlying I/O error.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The path vanished between enumeration and operation.
    #[error("not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("permission denied: {}", path.display())]
    PermissionDenied { path: PathBuf },

    /// Any other read/list/unlink failure.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Unrecognised task or request kind, rejected at the boundary.
    #[error("invalid task kind: {0:?}")]
    InvalidTask(String),
}

impl TaskError {
    /// Classify an `io::Error` that occurred while operating on `path`.
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound {
                path: path.to_path_buf(),
            },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => Self::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }
}

/// Engine-level failures returned to the consumer.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The coordinator has shut down; no further requests are accepted.
    #[error("engine has stopped")]
    Stopped,

    #[error("invalid request: {0}")]
    InvalidRequest(#[from] TaskError),
}

/// Invalid configuration value (environment or command line).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} must be a positive integer, got {value:?}")]
    InvalidWorkers { key: String, value: String },

    #[error("unknown traversal mode {0:?} (expected \"per-entry\" or \"subtree\")")]
    InvalidTraversal(String),
}
