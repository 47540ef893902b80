//! Scripted agents hosted on a [`ContextPool`](context_pool::ContextPool).
//!
//! An [`Agent`] pairs one execution context with the two collaborators a
//! scripted ship needs: a [`SourceStore`] that supplies its code by path and
//! an [`AgentBindings`] implementation that installs the native functions its
//! scripts may call.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod agent;
pub mod source;

pub use agent::{Agent, AgentBindings, NoBindings};
pub use source::{MemoryStore, SourceStore};
