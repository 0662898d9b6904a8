//! Units of work handed from the dispatcher to a worker.
//!
//! A [`Task`] is an immutable `(kind, path)` pair. The dispatcher never looks
//! inside it; only the worker runtime interprets the kind.
use crate::error::TaskError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// What a worker should do with a task's path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Stat the path: report a non-empty file, or queue a directory listing.
    CheckPath,
    /// List (or walk) a directory. Also reached via the `open-folder` alias.
    CheckFolder,
    /// Stream the file through MD5.
    HashFile,
    /// Unlink the file.
    DeleteFile,
}

impl TaskKind {
    /// Wire name, as used in logs and by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CheckPath => "check-path",
            Self::CheckFolder => "check-folder",
            Self::HashFile => "hash-file",
            Self::DeleteFile => "delete-file",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "check-path" => Ok(Self::CheckPath),
            "check-folder" | "open-folder" => Ok(Self::CheckFolder),
            "hash-file" => Ok(Self::HashFile),
            "delete-file" => Ok(Self::DeleteFile),
            other => Err(TaskError::InvalidTask(other.to_string())),
        }
    }
}

/// One unit of scan/hash/delete work.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    kind: TaskKind,
    path: PathBuf,
}

impl Task {
    pub fn new(kind: TaskKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    pub fn check_path(path: impl Into<PathBuf>) -> Self {
        Self::new(TaskKind::CheckPath, path)
    }

    pub fn check_folder(path: impl Into<PathBuf>) -> Self {
        Self::new(TaskKind::CheckFolder, path)
    }

    pub fn hash_file(path: impl Into<PathBuf>) -> Self {
        Self::new(TaskKind::HashFile, path)
    }

    pub fn delete_file(path: impl Into<PathBuf>) -> Self {
        Self::new(TaskKind::DeleteFile, path)
    }

    #[inline]
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.path.display())
    }
}
