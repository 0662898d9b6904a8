//! Worker runtime: one long-lived thread per degree of parallelism.
//!
//! A worker owns nothing shared. It receives tasks on its own channel and
//! talks back only through a [`TaskSink`]: events for the consumer, new tasks
//! discovered during traversal, and a ready signal after every task.
//!
//! State machine: `Idle -> Executing(kind) -> Idle`. The transition back to
//! idle happens whether the operation succeeded or not.
use crate::config::TraversalMode;
use crate::error::TaskError;
use crate::event::Event;
use crate::hash;
use crate::pool::dispatcher::WorkerId;
use crate::task::{Task, TaskKind};
use crossbeam_channel::Receiver;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where a worker sends everything it produces.
///
/// Passed into the runtime rather than looked up globally, so directory
/// traversal can re-enter the dispatcher from inside a worker.
pub trait TaskSink {
    /// Queue a new task (a directory discovered during traversal).
    fn submit(&self, task: Task);
    /// Forward an event toward the consumer.
    fn emit(&self, event: Event);
    /// Declare this worker idle and eligible for the next assignment.
    fn ready(&self, id: WorkerId);
}

/// Worker main loop. Returns when the task channel disconnects.
pub fn run_worker<S: TaskSink>(
    id: WorkerId,
    tasks: Receiver<Task>,
    sink: S,
    traversal: TraversalMode,
) {
    debug!("worker {id}: online ({traversal} traversal)");
    sink.emit(Event::Log {
        message: format!("worker {id} online"),
    });
    sink.ready(id);

    for task in tasks.iter() {
        run_task(id, &task, traversal, &sink);
        sink.ready(id);
    }

    debug!("worker {id}: task channel closed, exiting");
}

/// Execute one task, turning any failure into an `Error` event.
pub fn run_task(id: WorkerId, task: &Task, traversal: TraversalMode, sink: &dyn TaskSink) {
    debug!("worker {id}: {task}");
    if let Err(err) = execute(task, traversal, sink) {
        debug!("worker {id}: {} failed: {err}", task.kind());
        sink.emit(Event::Error {
            message: format!("worker {id}: {err}"),
        });
    }
}

fn execute(task: &Task, traversal: TraversalMode, sink: &dyn TaskSink) -> Result<(), TaskError> {
    let path = task.path();
    match task.kind() {
        TaskKind::CheckPath => check_path(path, sink),
        TaskKind::CheckFolder => match traversal {
            TraversalMode::PerEntry => check_folder(path, sink),
            TraversalMode::Subtree => walk_subtree(path, sink),
        },
        TaskKind::HashFile => hash_file(path, sink),
        TaskKind::DeleteFile => delete_file(path, sink),
    }
}

/// What a directory entry turned out to be after stat.
#[derive(Debug, PartialEq, Eq)]
enum EntryKind {
    File(u64),
    Dir,
    /// Symlinked directories, dangling links, devices, sockets and so on.
    Other,
}

/// Stat `path`. Symlinks resolving to regular files count as files; a
/// symlinked directory is never descended into, so link cycles cannot
/// loop a traversal.
fn classify(path: &Path) -> Result<EntryKind, TaskError> {
    let meta = fs::symlink_metadata(path).map_err(|e| TaskError::from_io(path, e))?;
    let file_type = meta.file_type();
    if file_type.is_symlink() {
        return Ok(match fs::metadata(path) {
            Ok(target) if target.is_file() => EntryKind::File(target.len()),
            _ => EntryKind::Other,
        });
    }
    Ok(if file_type.is_file() {
        EntryKind::File(meta.len())
    } else if file_type.is_dir() {
        EntryKind::Dir
    } else {
        EntryKind::Other
    })
}

/// Report a non-empty regular file, or queue a directory for listing.
/// Zero-byte files and special entries are skipped.
fn check_path(path: &Path, sink: &dyn TaskSink) -> Result<(), TaskError> {
    match classify(path)? {
        EntryKind::File(size) if size > 0 => sink.emit(Event::FileFound {
            path: path.to_path_buf(),
            size,
        }),
        EntryKind::Dir => sink.submit(Task::check_folder(path)),
        EntryKind::File(_) | EntryKind::Other => {}
    }
    Ok(())
}

/// Queue a `check-path` task for every immediate child, in name order.
fn check_folder(dir: &Path, sink: &dyn TaskSink) -> Result<(), TaskError> {
    for child in list_dir(dir, sink)? {
        sink.submit(Task::check_path(child));
    }
    Ok(())
}

/// Walk the whole subtree in this worker using an explicit work-list.
///
/// Only a failure to list the root fails the task; unreadable
/// subdirectories and entries are reported as `Error` events and skipped.
fn walk_subtree(root: &Path, sink: &dyn TaskSink) -> Result<(), TaskError> {
    // Stack of entries still to visit, reversed so entries pop in name order.
    let mut work: Vec<PathBuf> = list_dir(root, sink)?;
    work.reverse();

    while let Some(path) = work.pop() {
        match classify(&path) {
            Ok(EntryKind::File(size)) if size > 0 => sink.emit(Event::FileFound { path, size }),
            Ok(EntryKind::Dir) => match list_dir(&path, sink) {
                Ok(children) => work.extend(children.into_iter().rev()),
                Err(err) => sink.emit(Event::Error {
                    message: err.to_string(),
                }),
            },
            Ok(EntryKind::File(_) | EntryKind::Other) => {}
            Err(err) => sink.emit(Event::Error {
                message: err.to_string(),
            }),
        }
    }
    Ok(())
}

/// Full paths of `dir`'s immediate children, sorted by name.
///
/// Only failing to open `dir` is an error; an entry that cannot be read is
/// reported and skipped.
fn list_dir(dir: &Path, sink: &dyn TaskSink) -> Result<Vec<PathBuf>, TaskError> {
    let entries = fs::read_dir(dir).map_err(|e| TaskError::from_io(dir, e))?;
    Ok(collect_entries(dir, entries.map(|e| e.map(|e| e.path())), sink))
}

fn collect_entries<I>(dir: &Path, entries: I, sink: &dyn TaskSink) -> Vec<PathBuf>
where
    I: IntoIterator<Item = io::Result<PathBuf>>,
{
    let mut children = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) => children.push(path),
            Err(e) => sink.emit(Event::Error {
                message: TaskError::from_io(dir, e).to_string(),
            }),
        }
    }
    children.sort();
    children
}

fn hash_file(path: &Path, sink: &dyn TaskSink) -> Result<(), TaskError> {
    let hash = hash::md5_file(path).map_err(|e| TaskError::from_io(path, e))?;
    sink.emit(Event::HashComputed {
        path: path.to_path_buf(),
        hash,
    });
    Ok(())
}

fn delete_file(path: &Path, sink: &dyn TaskSink) -> Result<(), TaskError> {
    fs::remove_file(path).map_err(|e| TaskError::from_io(path, e))?;
    sink.emit(Event::FileDeleted {
        path: path.to_path_buf(),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io::Write;
    use tempfile::TempDir;

    /// Records everything a worker produces, in order.
    #[derive(Default)]
    struct Recorder {
        submitted: RefCell<Vec<Task>>,
        events: RefCell<Vec<Event>>,
        ready: RefCell<Vec<WorkerId>>,
    }

    impl TaskSink for Recorder {
        fn submit(&self, task: Task) {
            self.submitted.borrow_mut().push(task);
        }
        fn emit(&self, event: Event) {
            self.events.borrow_mut().push(event);
        }
        fn ready(&self, id: WorkerId) {
            self.ready.borrow_mut().push(id);
        }
    }

    fn write_bytes(path: &Path, n: usize) {
        let mut f = fs::File::create(path).unwrap();
        f.write_all(&vec![b'x'; n]).unwrap();
    }

    /// ```text
    /// root/
    ///   a.txt      (5 bytes)
    ///   sub/
    ///     b.txt    (0 bytes)
    ///     c.txt    (10 bytes)
    /// ```
    fn build_tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        write_bytes(&tmp.path().join("a.txt"), 5);
        fs::create_dir(tmp.path().join("sub")).unwrap();
        write_bytes(&tmp.path().join("sub").join("b.txt"), 0);
        write_bytes(&tmp.path().join("sub").join("c.txt"), 10);
        tmp
    }

    fn run(task: Task, traversal: TraversalMode) -> Recorder {
        let rec = Recorder::default();
        run_task(WorkerId(7), &task, traversal, &rec);
        rec
    }

    #[test]
    fn test_check_path_reports_non_empty_file() {
        let tmp = build_tree();
        let a = tmp.path().join("a.txt");
        let rec = run(Task::check_path(&a), TraversalMode::PerEntry);
        assert_eq!(
            *rec.events.borrow(),
            vec![Event::FileFound { path: a, size: 5 }]
        );
        assert!(rec.submitted.borrow().is_empty());
    }

    #[test]
    fn test_check_path_skips_empty_file() {
        let tmp = build_tree();
        let rec = run(
            Task::check_path(tmp.path().join("sub").join("b.txt")),
            TraversalMode::PerEntry,
        );
        assert!(rec.events.borrow().is_empty());
        assert!(rec.submitted.borrow().is_empty());
    }

    #[test]
    fn test_check_path_requeues_directory() {
        let tmp = build_tree();
        let sub = tmp.path().join("sub");
        let rec = run(Task::check_path(&sub), TraversalMode::PerEntry);
        assert_eq!(*rec.submitted.borrow(), vec![Task::check_folder(sub)]);
        assert!(rec.events.borrow().is_empty());
    }

    #[test]
    fn test_check_folder_per_entry_submits_children_sorted() {
        let tmp = build_tree();
        let rec = run(Task::check_folder(tmp.path()), TraversalMode::PerEntry);
        assert_eq!(
            *rec.submitted.borrow(),
            vec![
                Task::check_path(tmp.path().join("a.txt")),
                Task::check_path(tmp.path().join("sub")),
            ]
        );
        assert!(rec.events.borrow().is_empty());
    }

    #[test]
    fn test_check_folder_subtree_reports_everything_inline() {
        let tmp = build_tree();
        let rec = run(Task::check_folder(tmp.path()), TraversalMode::Subtree);
        assert!(rec.submitted.borrow().is_empty());
        assert_eq!(
            *rec.events.borrow(),
            vec![
                Event::FileFound {
                    path: tmp.path().join("a.txt"),
                    size: 5
                },
                Event::FileFound {
                    path: tmp.path().join("sub").join("c.txt"),
                    size: 10
                },
            ]
        );
    }

    #[test]
    fn test_check_folder_missing_emits_error() {
        let tmp = TempDir::new().unwrap();
        let rec = run(
            Task::check_folder(tmp.path().join("nope")),
            TraversalMode::PerEntry,
        );
        let events = rec.events.borrow();
        assert_eq!(events.len(), 1);
        assert!(
            matches!(&events[0], Event::Error { message } if message.starts_with("worker 7: not found")),
            "unexpected {events:?}"
        );
    }

    #[test]
    fn test_hash_file_emits_digest() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.txt");
        fs::write(&a, b"hello").unwrap();
        let rec = run(Task::hash_file(&a), TraversalMode::PerEntry);
        assert_eq!(
            *rec.events.borrow(),
            vec![Event::HashComputed {
                path: a,
                hash: "5d41402abc4b2a76b9719d911017c592".into()
            }]
        );
    }

    #[test]
    fn test_hash_missing_file_emits_error_only() {
        let tmp = TempDir::new().unwrap();
        let rec = run(
            Task::hash_file(tmp.path().join("ghost")),
            TraversalMode::PerEntry,
        );
        let events = rec.events.borrow();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::Error { .. }));
    }

    #[test]
    fn test_delete_file() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.txt");
        fs::write(&a, b"bye").unwrap();
        let rec = run(Task::delete_file(&a), TraversalMode::PerEntry);
        assert_eq!(
            *rec.events.borrow(),
            vec![Event::FileDeleted { path: a.clone() }]
        );
        assert!(!a.exists());
    }

    #[test]
    fn test_delete_missing_file_never_reports_deleted() {
        let tmp = TempDir::new().unwrap();
        let rec = run(
            Task::delete_file(tmp.path().join("ghost")),
            TraversalMode::PerEntry,
        );
        let events = rec.events.borrow();
        assert!(events
            .iter()
            .all(|e| !matches!(e, Event::FileDeleted { .. })));
        assert!(matches!(events[0], Event::Error { .. }));
    }

    #[test]
    fn test_run_worker_reports_ready_after_every_task() {
        let tmp = TempDir::new().unwrap();
        let (tx, rx) = crossbeam_channel::bounded(1);
        let handle = std::thread::spawn(move || {
            let rec = Recorder::default();
            run_worker(WorkerId(3), rx, &rec, TraversalMode::PerEntry);
            (rec.ready.into_inner(), rec.events.into_inner())
        });

        // One failing task, then one that succeeds.
        tx.send(Task::delete_file(tmp.path().join("ghost"))).unwrap();
        let ok = tmp.path().join("ok.txt");
        fs::write(&ok, b"hello").unwrap();
        tx.send(Task::hash_file(&ok)).unwrap();
        drop(tx);

        let (ready, events) = handle.join().unwrap();
        // Once at startup, once per task.
        assert_eq!(ready, vec![WorkerId(3); 3]);
        assert!(matches!(events[0], Event::Log { .. }));
        assert!(matches!(events[1], Event::Error { .. }));
        assert!(matches!(events[2], Event::HashComputed { .. }));
    }

    #[test]
    fn test_unreadable_entry_is_reported_and_siblings_kept() {
        let rec = Recorder::default();
        let dir = Path::new("/scan");
        let entries = vec![
            Ok(dir.join("b.txt")),
            Err(io::Error::other("bad entry")),
            Ok(dir.join("a.txt")),
        ];
        let children = collect_entries(dir, entries, &rec);
        assert_eq!(children, vec![dir.join("a.txt"), dir.join("b.txt")]);
        let events = rec.events.borrow();
        assert_eq!(events.len(), 1);
        assert!(
            matches!(&events[0], Event::Error { message } if message.contains("bad entry")),
            "unexpected {events:?}"
        );
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::os::unix::fs::{symlink, PermissionsExt};

        /// ```text
        /// root/
        ///   real.txt  (3 bytes)
        ///   link.txt  -> real.txt
        ///   loop      -> root
        /// ```
        fn build_linked_tree() -> TempDir {
            let tmp = TempDir::new().unwrap();
            write_bytes(&tmp.path().join("real.txt"), 3);
            symlink(tmp.path().join("real.txt"), tmp.path().join("link.txt")).unwrap();
            symlink(tmp.path(), tmp.path().join("loop")).unwrap();
            tmp
        }

        #[test]
        fn test_check_path_follows_file_symlink() {
            let tmp = build_linked_tree();
            let link = tmp.path().join("link.txt");
            let rec = run(Task::check_path(&link), TraversalMode::PerEntry);
            assert_eq!(
                *rec.events.borrow(),
                vec![Event::FileFound {
                    path: link,
                    size: 3
                }]
            );
            assert!(rec.submitted.borrow().is_empty());
        }

        #[test]
        fn test_check_path_skips_directory_symlink() {
            let tmp = build_linked_tree();
            let rec = run(
                Task::check_path(tmp.path().join("loop")),
                TraversalMode::PerEntry,
            );
            assert!(rec.events.borrow().is_empty());
            assert!(rec.submitted.borrow().is_empty());
        }

        #[test]
        fn test_check_path_skips_dangling_symlink() {
            let tmp = TempDir::new().unwrap();
            let dangling = tmp.path().join("dangling");
            symlink(tmp.path().join("gone.txt"), &dangling).unwrap();
            let rec = run(Task::check_path(dangling), TraversalMode::PerEntry);
            assert!(rec.events.borrow().is_empty());
            assert!(rec.submitted.borrow().is_empty());
        }

        #[test]
        fn test_subtree_does_not_descend_symlink_loop() {
            let tmp = build_linked_tree();
            let rec = run(Task::check_folder(tmp.path()), TraversalMode::Subtree);
            assert_eq!(
                *rec.events.borrow(),
                vec![
                    Event::FileFound {
                        path: tmp.path().join("link.txt"),
                        size: 3
                    },
                    Event::FileFound {
                        path: tmp.path().join("real.txt"),
                        size: 3
                    },
                ]
            );
        }

        #[test]
        fn test_subtree_continues_past_unreadable_directory() {
            let tmp = build_tree();
            let locked = tmp.path().join("locked");
            fs::create_dir(&locked).unwrap();
            write_bytes(&locked.join("hidden.txt"), 4);
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

            // Privileged users can list it anyway; nothing to test then.
            if fs::read_dir(&locked).is_ok() {
                fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
                return;
            }

            let rec = run(Task::check_folder(tmp.path()), TraversalMode::Subtree);
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

            let events = rec.events.borrow();
            let errors: Vec<_> = events
                .iter()
                .filter_map(|e| match e {
                    Event::Error { message } => Some(message.as_str()),
                    _ => None,
                })
                .collect();
            assert_eq!(errors.len(), 1, "unexpected {events:?}");
            assert!(errors[0].contains("locked"));

            let found: Vec<_> = events
                .iter()
                .filter_map(|e| match e {
                    Event::FileFound { path, .. } => Some(path.clone()),
                    _ => None,
                })
                .collect();
            assert_eq!(
                found,
                vec![tmp.path().join("a.txt"), tmp.path().join("sub").join("c.txt")]
            );
        }
    }

    impl TaskSink for &Recorder {
        fn submit(&self, task: Task) {
            (**self).submit(task)
        }
        fn emit(&self, event: Event) {
            (**self).emit(event)
        }
        fn ready(&self, id: WorkerId) {
            (**self).ready(id)
        }
    }
}
