//! Source positions for script error reporting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a position in script source code.
///
/// Both fields are 1-based. A position produced by the engine for native
/// code or synthetic call sites has no line information and is represented
/// as `None` at the error level rather than as a zeroed position.
///
/// # Examples
///
/// ```
/// use script_types::SourcePosition;
///
/// let pos = SourcePosition::new(10, 5);
/// assert_eq!(pos.to_string(), "line 10, column 5");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePosition {
    /// Line number (1-based)
    pub line: u32,
    /// Column number (1-based)
    pub column: u32,
}

impl SourcePosition {
    /// Creates a new position.
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}
