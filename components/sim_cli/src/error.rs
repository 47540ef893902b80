//! Error types for the simulator

use context_pool::PoolError;
use script_context::ContextError;
use thiserror::Error;

/// Simulator failures.
#[derive(Debug, Error)]
pub enum SimError {
    /// The boot script could not be read
    #[error("could not read script '{path}': {source}")]
    Script {
        /// Path given on the command line
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The pool failed
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// An agent's context refused work
    #[error(transparent)]
    Context(#[from] ContextError),
}

/// Result alias for simulator operations.
pub type SimResult<T> = Result<T, SimError>;
