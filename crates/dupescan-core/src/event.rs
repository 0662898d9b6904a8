//! Notifications sent from the engine to its single consumer.
//!
//! Workers produce most of these; the relay adds `DirectoryFound` when a
//! folder is opened and the coordinator adds `Idle` when the pool drains.
//! Events from different workers may interleave in any order, but each
//! worker's own events arrive in the order it performed its operations.
use serde::Serialize;
use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Event {
    /// A traversal root was accepted.
    DirectoryFound { path: PathBuf },
    /// A non-empty regular file was discovered.
    FileFound { path: PathBuf, size: u64 },
    /// Lowercase hex MD5 digest of the file's contents.
    HashComputed { path: PathBuf, hash: String },
    FileDeleted { path: PathBuf },
    /// The last operation of some worker failed.
    Error { message: String },
    /// Diagnostic text.
    Log { message: String },
    /// No task is pending and no worker is busy.
    ///
    /// `handled` counts consumer requests accepted so far; compare it with
    /// the number of requests sent to know whether everything has finished.
    Idle { handled: u64 },
}

impl Event {
    /// `true` for `Error` and `Log`, the events also written to the
    /// diagnostic sink.
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Log { .. })
    }
}
