//! Dispatcher: matches pending tasks to idle workers.
//!
//! Holds the pending queue and the availability registry, both strict FIFO.
//! Every public mutation is followed by a drain, so after any call at least
//! one of the two is empty.
//!
//! The dispatcher is a plain `&mut self` state machine. It is owned by the
//! coordinator thread, which makes that thread the single serialization point
//! for every scheduling decision without any lock.
use crate::task::{Task, TaskKind};
use crossbeam_channel::{Sender, TrySendError};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use tracing::{trace, warn};

/// Stable identity of a worker, equal to its position in the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub u32);

impl WorkerId {
    #[inline]
    pub fn new(index: usize) -> Self {
        debug_assert!(index <= u32::MAX as usize, "WorkerId overflow");
        Self(index as u32)
    }

    #[inline]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity plus a one-way channel into the worker's execution context.
///
/// The channel has capacity 1: at most one task is ever in flight per
/// handle, so delivery never has to wait.
#[derive(Clone, Debug)]
pub struct WorkerHandle {
    id: WorkerId,
    tx: Sender<Task>,
}

impl WorkerHandle {
    pub fn new(id: WorkerId, tx: Sender<Task>) -> Self {
        Self { id, tx }
    }

    #[inline]
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Hand `task` to the worker without blocking. Gives the task back if
    /// the worker is gone or still holds an undelivered task.
    fn deliver(&self, task: Task) -> Result<(), Task> {
        self.tx.try_send(task).map_err(|err| match err {
            TrySendError::Full(task) => {
                warn!("worker {} still holds an undelivered task", self.id);
                task
            }
            TrySendError::Disconnected(task) => {
                warn!("worker {} is gone; dropping its handle", self.id);
                task
            }
        })
    }
}

#[derive(Default)]
pub struct Dispatcher {
    pending: VecDeque<Task>,
    available: VecDeque<WorkerHandle>,
    /// Outstanding assignment per busy worker.
    assigned: HashMap<WorkerId, TaskKind>,
    dispatched: u64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `task` to the pending queue, then drain.
    ///
    /// Returns how many tasks the drain delivered.
    pub fn submit(&mut self, task: Task) -> usize {
        trace!("submit {task}");
        self.pending.push_back(task);
        self.drain()
    }

    /// Mark `handle` idle (clearing its outstanding assignment) and append it
    /// to the registry, then drain.
    ///
    /// A handle that is already idle is not admitted a second time.
    pub fn worker_ready(&mut self, handle: WorkerHandle) -> usize {
        let id = handle.id();
        self.assigned.remove(&id);
        if self.available.iter().any(|h| h.id() == id) {
            warn!("worker {id} reported ready twice; ignoring");
            return 0;
        }
        trace!("worker {id} ready");
        self.available.push_back(handle);
        self.drain()
    }

    /// Pair queue head with registry head until one side runs out.
    fn drain(&mut self) -> usize {
        let mut delivered = 0;
        while !self.pending.is_empty() && !self.available.is_empty() {
            let (Some(task), Some(handle)) = (self.pending.pop_front(), self.available.pop_front())
            else {
                break;
            };
            let kind = task.kind();
            match handle.deliver(task) {
                Ok(()) => {
                    trace!("dispatch {kind} -> worker {}", handle.id());
                    self.assigned.insert(handle.id(), kind);
                    self.dispatched += 1;
                    delivered += 1;
                }
                Err(task) => {
                    // The handle is dropped; the task keeps its place.
                    self.pending.push_front(task);
                }
            }
        }
        debug_assert!(self.pending.is_empty() || self.available.is_empty());
        delivered
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn idle_len(&self) -> usize {
        self.available.len()
    }

    pub fn busy_len(&self) -> usize {
        self.assigned.len()
    }

    /// Nothing queued and nothing in flight.
    pub fn is_quiescent(&self) -> bool {
        self.pending.is_empty() && self.assigned.is_empty()
    }

    pub fn dispatched_total(&self) -> u64 {
        self.dispatched
    }

    /// Kind of the task currently assigned to `id`, if it is busy.
    pub fn assignment(&self, id: WorkerId) -> Option<TaskKind> {
        self.assigned.get(&id).copied()
    }
}
