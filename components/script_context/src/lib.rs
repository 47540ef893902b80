//! Isolated script execution contexts with bounded rounds.
//!
//! Each [`Context`] owns one embedded script engine instance ([`Isolate`])
//! and one dedicated thread. Work reaches a context as [`Task`]s posted from
//! any thread; tasks run only while a round is granted, and a per-context
//! timer interrupts any round that outlives its budget.
//!
//! # Overview
//!
//! - [`Context`] - Owning handle: posting, rounds, teardown on drop
//! - [`Isolate`] - The engine instance, reachable only on the context thread
//! - [`ScriptFn`] / [`ScriptMethod`] - Native functions exposed to scripts
//! - [`ToScript`] / [`FromScript`] - Typed value conversion
//! - [`Callback`] - A script function handed to native code
//!
//! # Examples
//!
//! ```no_run
//! use script_context::{Context, Task};
//! use std::time::Duration;
//!
//! let (context, init) = Context::new(Duration::from_millis(50), |isolate| {
//!     isolate.bind_fn("add", |a: i64, b: i64| a + b)?;
//!     isolate.run("let counter = 0;")
//! })
//! .unwrap();
//! init.wait().unwrap();
//!
//! context.post_script("counter = add(counter, 5);").unwrap();
//! context.post(Task::new(|isolate| {
//!     let counter: i64 = isolate.eval("counter")?;
//!     assert_eq!(counter, 5);
//!     Ok(())
//! }))
//! .unwrap();
//!
//! let report = context.run_round().unwrap();
//! assert_eq!(report.tasks_run, 2);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod binding;
pub mod callback;
pub mod config;
pub mod context;
pub mod convert;
pub mod error;
pub mod isolate;
pub mod round;
pub mod task_queue;

pub use binding::{CallSite, IntoScriptReturn, ScriptFn, ScriptMethod, MAX_ARITY};
pub use callback::{Callback, CallbackId, ScriptArgs};
pub use config::{ContextConfig, DEFAULT_ROUND_BUDGET_MS, DEFAULT_TEARDOWN_GRACE_MS};
pub use context::{Context, ContextRef, InitFuture, WeakContext};
pub use convert::{FromScript, ToScript};
pub use error::{ContextError, ConversionError};
pub use isolate::Isolate;
pub use round::{InterruptHandle, RoundPhase};
pub use task_queue::{MicroTask, MicrotaskQueue, Task, TaskQueue};

pub use rhai::{Dynamic, FnPtr};
pub use script_types::{ContextId, ErrorKind, RoundOutcome, RoundReport, ScriptError, SourcePosition};
