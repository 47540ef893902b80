//! Round-based scheduling of many script contexts over a bounded worker pool.
//!
//! A [`ContextPool`] owns a fixed number of worker threads and a registry of
//! live contexts. Each call to [`ContextPool::update_all`] is one tick: the
//! pool collects pending context initializations, then its workers walk the
//! registry through a shared cursor and grant every live context exactly one
//! round. The call returns once every round has ended, either because the
//! context ran out of queued work or because its budget expired.
//!
//! In the worst case, where every context spends its whole budget, a tick
//! takes about `ceil(contexts / workers) * budget`. A round only ends once
//! its running task has returned, so a context blocked in a native call
//! holds its worker until then, for at most the budget plus the configured
//! report slack. Past that the worker moves on and the context is listed in
//! [`TickReport::stalled`] until its round ends.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod pool;
mod registry;
mod worker;

pub use config::{PoolConfig, DEFAULT_REPORT_SLACK_MS};
pub use error::PoolError;
pub use pool::{ContextPool, TickReport};
