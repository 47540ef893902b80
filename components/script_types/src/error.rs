//! Script error taxonomy.
//!
//! Errors in this module are the ones a script can observe or cause. They
//! are always local to one context: they are logged and counted, but never
//! abort a round or cross into another context.

use crate::SourcePosition;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of script failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Script source failed to compile
    SyntaxError,
    /// A value crossing the native/script boundary had the wrong shape
    TypeMismatch,
    /// Uncaught exception thrown while running a script task
    ScriptRuntimeError,
    /// The round budget elapsed and the running script was cut off
    RoundInterrupted,
    /// The owning context has been torn down
    ContextClosed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::TypeMismatch => "TypeMismatch",
            ErrorKind::ScriptRuntimeError => "ScriptRuntimeError",
            ErrorKind::RoundInterrupted => "RoundInterrupted",
            ErrorKind::ContextClosed => "ContextClosed",
        };
        f.write_str(name)
    }
}

/// A failure raised while running script code.
///
/// # Examples
///
/// ```
/// use script_types::{ErrorKind, ScriptError, SourcePosition};
///
/// let error = ScriptError::new(ErrorKind::ScriptRuntimeError, "boom")
///     .with_position(SourcePosition::new(3, 7));
///
/// assert_eq!(error.to_string(), "ScriptRuntimeError: boom (line 3, column 7)");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptError {
    /// The type of error
    pub kind: ErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Source position where the error occurred, if known
    pub position: Option<SourcePosition>,
}

impl ScriptError {
    /// Creates an error without position information.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            position: None,
        }
    }

    /// Shorthand for a [`ErrorKind::ScriptRuntimeError`].
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ScriptRuntimeError, message)
    }

    /// Attaches a source position.
    pub fn with_position(mut self, position: SourcePosition) -> Self {
        self.position = Some(position);
        self
    }

    /// Returns true if the script was cut off, by its round budget or by
    /// the teardown of its context.
    pub fn is_interrupt(&self) -> bool {
        matches!(self.kind, ErrorKind::RoundInterrupted | ErrorKind::ContextClosed)
    }

    /// Returns true if a boundary conversion failed.
    pub fn is_type_mismatch(&self) -> bool {
        self.kind == ErrorKind::TypeMismatch
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(position) = &self.position {
            write!(f, " ({})", position)?;
        }
        Ok(())
    }
}

impl std::error::Error for ScriptError {}
