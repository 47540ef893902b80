//! Pool-level errors.

use script_context::ContextError;
use thiserror::Error;

/// Failures of the pool itself.
///
/// Failures local to one context never abort a tick; they are reported in the
/// [`TickReport`](crate::TickReport) instead.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The configuration cannot start a pool
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    /// A worker thread could not be spawned
    #[error("failed to spawn pool worker {index}: {source}")]
    WorkerSpawn {
        /// Index of the worker
        index: usize,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A worker thread is gone
    #[error("pool worker {0} is no longer running")]
    WorkerLost(usize),

    /// Creating a context failed
    #[error(transparent)]
    Context(#[from] ContextError),
}
