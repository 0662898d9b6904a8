//! dupescan core: task dispatch and worker-pool engine.
//!
//! This crate contains all filesystem and scheduling logic with zero UI
//! dependencies. A consumer (the `dupescan` binary, or any frontend) starts
//! an engine, issues open-folder / hash-file / delete-file requests, and
//! reads [`Event`]s back from a channel.
//!
//! # Modules
//!
//! - [`pool`]: coordinator thread, dispatcher, worker runtime and relay.
//! - [`task`]: the unit of work handed to a worker.
//! - [`event`]: notifications delivered to the consumer.
//! - [`hash`]: streaming MD5 digest.
//! - [`config`]: pool size and traversal strategy.
//! - [`error`]: task, engine and configuration errors.
pub mod config;
pub mod error;
pub mod event;
pub mod hash;
pub mod pool;
pub mod task;

pub use config::{EngineConfig, TraversalMode};
pub use error::{ConfigError, EngineError, TaskError};
pub use event::Event;
pub use pool::{start_engine, EngineHandle, PoolStats, Request};
pub use task::{Task, TaskKind};
