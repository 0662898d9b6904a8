//! Event relay between the consumer and the pool.
//!
//! Inbound, a consumer [`Request`] becomes exactly one task (opening a folder
//! also announces the root with `DirectoryFound` first). Outbound, worker
//! events are forwarded verbatim to the consumer's channel, with `Log` and
//! `Error` copied to the tracing diagnostic sink. The relay holds no
//! scheduling state.
use crate::error::TaskError;
use crate::event::Event;
use crate::task::{Task, TaskKind};
use crossbeam_channel::Sender;
use std::cell::Cell;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A request from the consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    OpenFolder(PathBuf),
    HashFile(PathBuf),
    DeleteFile(PathBuf),
}

impl Request {
    /// Validate a request given by its wire name.
    ///
    /// Accepts `open-folder` (or `check-folder`), `hash-file` and
    /// `delete-file`. Anything else, or an empty path, is rejected.
    pub fn parse(kind: &str, path: impl Into<PathBuf>) -> Result<Self, TaskError> {
        let path = path.into();
        let request = match kind.parse::<TaskKind>()? {
            TaskKind::CheckFolder => Self::OpenFolder(path),
            TaskKind::HashFile => Self::HashFile(path),
            TaskKind::DeleteFile => Self::DeleteFile(path),
            TaskKind::CheckPath => return Err(TaskError::InvalidTask(kind.to_string())),
        };
        request.validate()?;
        Ok(request)
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::OpenFolder(p) | Self::HashFile(p) | Self::DeleteFile(p) => p,
        }
    }

    /// Reject requests that could never name a real file.
    pub fn validate(&self) -> Result<(), TaskError> {
        if self.path().as_os_str().is_empty() {
            return Err(TaskError::InvalidTask(format!(
                "{} with empty path",
                self.kind()
            )));
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::OpenFolder(_) => "open-folder",
            Self::HashFile(_) => "hash-file",
            Self::DeleteFile(_) => "delete-file",
        }
    }

    fn into_task(self) -> Task {
        match self {
            Self::OpenFolder(p) => Task::check_folder(p),
            Self::HashFile(p) => Task::hash_file(p),
            Self::DeleteFile(p) => Task::delete_file(p),
        }
    }
}

pub struct Relay {
    events: Sender<Event>,
    /// Set once the consumer has dropped its receiver.
    consumer_gone: Cell<bool>,
}

impl Relay {
    pub fn new(events: Sender<Event>) -> Self {
        Self {
            events,
            consumer_gone: Cell::new(false),
        }
    }

    /// Translate a consumer request into the task to submit.
    pub fn inbound(&self, request: Request) -> Task {
        if let Request::OpenFolder(dir) = &request {
            self.outbound(Event::DirectoryFound { path: dir.clone() });
        }
        request.into_task()
    }

    /// Forward a worker event to the consumer.
    pub fn outbound(&self, event: Event) {
        match &event {
            Event::Log { message } => info!("{message}"),
            Event::Error { message } => warn!("error: {message}"),
            _ => {}
        }
        if self.events.send(event).is_err() && !self.consumer_gone.replace(true) {
            debug!("consumer dropped its event receiver; discarding further events");
        }
    }
}
