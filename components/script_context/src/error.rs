//! Context-level and conversion error types.

use script_types::{ContextId, ErrorKind, ScriptError};
use thiserror::Error;

/// Failures of a context as a whole, as opposed to failures of the script
/// code running inside it.
#[derive(Debug, Error)]
pub enum ContextError {
    /// The init function returned an error or panicked
    #[error("{context}: initialization failed: {reason}")]
    Initialization {
        /// Context whose init failed
        context: ContextId,
        /// Failure description
        reason: String,
    },

    /// The context thread went away without signalling initialization
    #[error("{0}: context thread exited before initialization completed")]
    InitAbandoned(ContextId),

    /// The context has been torn down or its thread is gone
    #[error("{0}: context is closed")]
    Closed(ContextId),

    /// A round was requested while another one is still active
    #[error("{0}: a round is already active")]
    RoundActive(ContextId),

    /// The operating system refused to spawn a thread
    #[error("{context}: failed to spawn {role} thread: {source}")]
    Spawn {
        /// Context being created
        context: ContextId,
        /// Which thread failed ("context" or "timer")
        role: &'static str,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The context did not yield within the teardown grace period
    #[error("{0}: context did not yield within the teardown grace period")]
    Unresponsive(ContextId),
}

impl ContextError {
    /// Context this error belongs to.
    pub fn context(&self) -> ContextId {
        match self {
            ContextError::Initialization { context, .. } => *context,
            ContextError::InitAbandoned(context) => *context,
            ContextError::Closed(context) => *context,
            ContextError::RoundActive(context) => *context,
            ContextError::Spawn { context, .. } => *context,
            ContextError::Unresponsive(context) => *context,
        }
    }
}

/// Failure to convert a value across the native/script boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    /// The script value had the wrong type
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        /// Native type that was required
        expected: &'static str,
        /// Script type that was supplied
        found: String,
    },

    /// The script value had the right type but does not fit the target
    #[error("value {value} is out of range for {target}")]
    OutOfRange {
        /// Native target type
        target: &'static str,
        /// Offending value, rendered as text
        value: String,
    },

    /// A conversion error raised for a specific call argument
    #[error("argument {index} of `{function}`: {source}")]
    Argument {
        /// Zero-based argument index
        index: usize,
        /// Name of the native function being called
        function: String,
        /// The conversion failure
        #[source]
        source: Box<ConversionError>,
    },
}

impl ConversionError {
    /// Builds a type mismatch for the given script value.
    pub fn mismatch(expected: &'static str, found: &rhai::Dynamic) -> Self {
        ConversionError::TypeMismatch {
            expected,
            found: found.type_name().to_string(),
        }
    }

    /// Attaches the failing argument position.
    pub fn at_argument(self, index: usize, function: impl Into<String>) -> Self {
        ConversionError::Argument {
            index,
            function: function.into(),
            source: Box::new(self),
        }
    }

    /// The innermost expected/found pair, used for engine-level mismatch
    /// errors.
    pub(crate) fn expected_found(&self) -> (String, String) {
        match self {
            ConversionError::TypeMismatch { expected, found } => {
                (expected.to_string(), found.clone())
            }
            ConversionError::OutOfRange { target, value } => {
                (format!("{} in range", target), value.clone())
            }
            ConversionError::Argument { source, .. } => source.expected_found(),
        }
    }
}

impl From<ConversionError> for ScriptError {
    fn from(err: ConversionError) -> Self {
        ScriptError::new(ErrorKind::TypeMismatch, err.to_string())
    }
}
