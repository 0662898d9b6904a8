//! Engine configuration.
//!
//! The pool size is fixed for the engine's lifetime. It defaults to the
//! host's logical core count and can be overridden from the environment:
//!
//! | Variable | Effect |
//! |---|---|
//! | `DUPESCAN_WORKERS=<n>` | use `n` workers |
//! | `DUPESCAN_SINGLE_WORKER=1` | force one worker (debug mode) |
//! | `DUPESCAN_TRAVERSAL=per-entry\|subtree` | directory traversal strategy |
use crate::error::ConfigError;
use std::fmt;
use std::str::FromStr;

pub const ENV_WORKERS: &str = "DUPESCAN_WORKERS";
pub const ENV_SINGLE_WORKER: &str = "DUPESCAN_SINGLE_WORKER";
pub const ENV_TRAVERSAL: &str = "DUPESCAN_TRAVERSAL";

/// How a worker handles a `check-folder` task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TraversalMode {
    /// Queue a `check-path` task per directory entry. Subdirectories come
    /// back through the queue and may land on any worker.
    #[default]
    PerEntry,
    /// Walk the whole subtree inside one worker with an explicit directory
    /// work-list. The worker reports ready only after the subtree is done.
    Subtree,
}

impl fmt::Display for TraversalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PerEntry => "per-entry",
            Self::Subtree => "subtree",
        })
    }
}

impl FromStr for TraversalMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per-entry" => Ok(Self::PerEntry),
            "subtree" => Ok(Self::Subtree),
            _ => Err(ConfigError::InvalidTraversal(s.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Number of worker threads. Never zero.
    pub workers: usize,
    pub traversal: TraversalMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get().max(1),
            traversal: TraversalMode::default(),
        }
    }
}

impl EngineConfig {
    /// Debug configuration: exactly one worker.
    pub fn single_worker() -> Self {
        Self {
            workers: 1,
            ..Self::default()
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_traversal(mut self, traversal: TraversalMode) -> Self {
        self.traversal = traversal;
        self
    }

    /// Defaults with the `DUPESCAN_*` environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reading variables through
    /// `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_WORKERS) {
            config.workers = parse_workers(ENV_WORKERS, &value)?;
        }
        if lookup(ENV_SINGLE_WORKER).is_some_and(|v| is_truthy(&v)) {
            config.workers = 1;
        }
        if let Some(value) = lookup(ENV_TRAVERSAL) {
            config.traversal = value.parse()?;
        }

        Ok(config)
    }
}

/// Parse a worker count, rejecting zero and non-numbers.
pub fn parse_workers(key: &str, value: &str) -> Result<usize, ConfigError> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidWorkers {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
