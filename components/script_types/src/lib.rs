//! Shared vocabulary for the sandboxed script execution engine.
//!
//! This crate holds the types that cross every component boundary: context
//! identity, script error taxonomy, source positions and round reports. It
//! has no knowledge of threads or of the script engine itself.
//!
//! # Overview
//!
//! - [`ContextId`] - Opaque, process-unique identity of an execution context
//! - [`ScriptError`] - A failure raised while running script code
//! - [`ErrorKind`] - Classification of script failures
//! - [`SourcePosition`] - Location inside a script source
//! - [`RoundReport`] - Outcome of one bounded execution round
//!
//! # Examples
//!
//! ```
//! use script_types::{ContextId, ErrorKind, ScriptError};
//!
//! let id = ContextId::next();
//! assert_ne!(id, ContextId::next());
//!
//! let error = ScriptError::new(ErrorKind::TypeMismatch, "expected i64, found string");
//! assert!(error.is_type_mismatch());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod error;
mod id;
mod round;
mod source;

pub use error::{ErrorKind, ScriptError};
pub use id::ContextId;
pub use round::{RoundOutcome, RoundReport};
pub use source::SourcePosition;
