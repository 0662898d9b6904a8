//! Pool module: starts the workers and the coordinator that schedules them.
//!
//! Threads:
//! - **Coordinator** (`dupescan-dispatch`): owns the [`Dispatcher`] and the
//!   [`Relay`]. It is the only thread that mutates the pending queue or the
//!   availability registry, and it never touches the filesystem.
//! - **Workers** (`dupescan-worker-N`): one per configured degree of
//!   parallelism, each running [`worker::run_worker`].
//!
//! All communication is message passing. Workers and the consumer post
//! [`Message`]s into one unbounded inbox; the coordinator hands tasks out
//! over each worker's capacity-1 channel and sends events to the consumer
//! over an unbounded channel, so it never blocks on a send.
pub mod dispatcher;
pub mod relay;
pub mod worker;

pub use dispatcher::{Dispatcher, WorkerHandle, WorkerId};
pub use relay::{Relay, Request};
pub use worker::TaskSink;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::event::Event;
use crate::task::Task;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// Everything the coordinator can be told.
#[derive(Debug)]
pub enum Message {
    /// From the consumer.
    Request(Request),
    /// From a worker: a task discovered during traversal.
    Submit(Task),
    /// From a worker: it finished its task (or just started).
    Ready(WorkerId),
    /// From a worker: something for the consumer.
    Event(Event),
    Shutdown,
}

/// The production [`TaskSink`]: posts into the coordinator's inbox.
///
/// Sends after shutdown are dropped silently; the worker is about to exit.
#[derive(Clone)]
pub struct Mailbox {
    tx: Sender<Message>,
}

impl TaskSink for Mailbox {
    fn submit(&self, task: Task) {
        let _ = self.tx.send(Message::Submit(task));
    }

    fn emit(&self, event: Event) {
        let _ = self.tx.send(Message::Event(event));
    }

    fn ready(&self, id: WorkerId) {
        let _ = self.tx.send(Message::Ready(id));
    }
}

/// Point-in-time scheduling counters, refreshed by the coordinator after
/// every message it handles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub pending: usize,
    pub idle: usize,
    pub busy: usize,
    pub dispatched: u64,
    /// Consumer requests accepted so far.
    pub handled: u64,
}

/// Shared, concurrently-readable stats snapshot.
///
/// The coordinator holds the write lock only to copy five counters in.
pub type LiveStats = Arc<RwLock<PoolStats>>;

/// Handle to a running engine. Issue requests through it and read results
/// from [`events`](Self::events).
///
/// Dropping the handle shuts the engine down.
pub struct EngineHandle {
    /// Notifications for the consumer, in arrival order.
    pub events: Receiver<Event>,
    inbox: Sender<Message>,
    stats: LiveStats,
    worker_count: usize,
    coordinator: Option<thread::JoinHandle<()>>,
    /// Workers are never joined: one stuck on a hung mount must not block
    /// shutdown.
    _workers: Vec<thread::JoinHandle<()>>,
}

impl EngineHandle {
    /// Announce `dir` and traverse it.
    pub fn open_folder(&self, dir: impl Into<PathBuf>) -> Result<(), EngineError> {
        self.send_request(Request::OpenFolder(dir.into()))
    }

    pub fn hash_file(&self, path: impl Into<PathBuf>) -> Result<(), EngineError> {
        self.send_request(Request::HashFile(path.into()))
    }

    /// Delete `path`. The caller is responsible for having confirmed this
    /// with the user.
    pub fn delete_file(&self, path: impl Into<PathBuf>) -> Result<(), EngineError> {
        self.send_request(Request::DeleteFile(path.into()))
    }

    /// Issue a request by wire name (`open-folder`, `hash-file`,
    /// `delete-file`). Malformed requests are rejected here and never reach
    /// the pool.
    pub fn request(&self, kind: &str, path: impl Into<PathBuf>) -> Result<(), EngineError> {
        let request = Request::parse(kind, path)?;
        self.send_request(request)
    }

    /// Fails with [`EngineError::Stopped`] if the coordinator has exited.
    pub fn send_request(&self, request: Request) -> Result<(), EngineError> {
        request.validate()?;
        self.inbox
            .send(Message::Request(request))
            .map_err(|_| EngineError::Stopped)
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn stats(&self) -> PoolStats {
        *self.stats.read()
    }

    /// Stop the coordinator and wait for it to exit. Idle workers exit once
    /// their task channels close; busy ones finish their current task first.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(coordinator) = self.coordinator.take() {
            let _ = self.inbox.send(Message::Shutdown);
            if coordinator.join().is_err() {
                warn!("coordinator thread panicked");
            }
            info!("engine stopped");
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawn the worker pool and its coordinator.
pub fn start_engine(config: EngineConfig) -> Result<EngineHandle, EngineError> {
    let worker_count = config.workers.max(1);
    let (inbox_tx, inbox_rx) = crossbeam_channel::unbounded::<Message>();
    let (events_tx, events_rx) = crossbeam_channel::unbounded::<Event>();
    let stats: LiveStats = Arc::new(RwLock::new(PoolStats::default()));

    let mut roster = Vec::with_capacity(worker_count);
    let mut workers = Vec::with_capacity(worker_count);
    for i in 0..worker_count {
        let id = WorkerId::new(i);
        let (task_tx, task_rx) = crossbeam_channel::bounded::<Task>(1);
        let mailbox = Mailbox {
            tx: inbox_tx.clone(),
        };
        let traversal = config.traversal;
        let name = format!("dupescan-worker-{i}");
        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker::run_worker(id, task_rx, mailbox, traversal))
            .map_err(|source| EngineError::Spawn { name, source })?;
        roster.push(WorkerHandle::new(id, task_tx));
        workers.push(worker);
    }

    let stats_clone = stats.clone();
    let relay = Relay::new(events_tx);
    let coordinator = thread::Builder::new()
        .name("dupescan-dispatch".into())
        .spawn(move || run_coordinator(inbox_rx, roster, relay, stats_clone))
        .map_err(|source| EngineError::Spawn {
            name: "dupescan-dispatch".into(),
            source,
        })?;

    info!(
        "engine started: {} workers, {} traversal",
        worker_count, config.traversal
    );

    Ok(EngineHandle {
        events: events_rx,
        inbox: inbox_tx,
        stats,
        worker_count,
        coordinator: Some(coordinator),
        _workers: workers,
    })
}

/// Coordinator loop: the single serialization point for scheduling.
fn run_coordinator(
    inbox: Receiver<Message>,
    roster: Vec<WorkerHandle>,
    relay: Relay,
    stats: LiveStats,
) {
    let mut dispatcher = Dispatcher::new();
    let mut handled: u64 = 0;
    // Set when work arrives, cleared when the pool drains and Idle is sent.
    let mut active = false;

    for message in inbox.iter() {
        match message {
            Message::Request(request) => {
                handled += 1;
                active = true;
                let task = relay.inbound(request);
                dispatcher.submit(task);
            }
            Message::Submit(task) => {
                active = true;
                dispatcher.submit(task);
            }
            Message::Ready(id) => match roster.get(id.idx()) {
                Some(handle) => {
                    dispatcher.worker_ready(handle.clone());
                }
                None => warn!("ready from unknown worker {id}"),
            },
            Message::Event(event) => relay.outbound(event),
            Message::Shutdown => {
                debug!("coordinator: shutdown requested");
                break;
            }
        }

        if active && dispatcher.is_quiescent() {
            active = false;
            relay.outbound(Event::Idle { handled });
        }

        *stats.write() = PoolStats {
            pending: dispatcher.pending_len(),
            idle: dispatcher.idle_len(),
            busy: dispatcher.busy_len(),
            dispatched: dispatcher.dispatched_total(),
            handled,
        };
    }

    // Dropping the dispatcher and roster closes every task channel.
    debug!(
        "coordinator: exiting after {} dispatches",
        dispatcher.dispatched_total()
    );
}
