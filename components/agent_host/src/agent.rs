//! One scripted agent: a context, its bindings and its boot source.

use crate::source::SourceStore;
use context_pool::{ContextPool, PoolError};
use script_context::{Context, ContextError, Isolate, Task};
use script_types::{ContextId, ScriptError};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Installs the native functions an agent's scripts may call.
///
/// Runs once, on the agent's context thread, when the context is created.
/// Bindings survive reboots.
pub trait AgentBindings: Send + Sync + 'static {
    /// Registers native functions on `isolate`.
    fn install(&self, isolate: &mut Isolate) -> Result<(), ScriptError>;
}

impl<F> AgentBindings for F
where
    F: Fn(&mut Isolate) -> Result<(), ScriptError> + Send + Sync + 'static,
{
    fn install(&self, isolate: &mut Isolate) -> Result<(), ScriptError> {
        self(isolate)
    }
}

/// Bindings for agents that get no native functions.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBindings;

impl AgentBindings for NoBindings {
    fn install(&self, _isolate: &mut Isolate) -> Result<(), ScriptError> {
        Ok(())
    }
}

/// A scripted agent scheduled by a [`ContextPool`].
///
/// Dropping the agent destroys its context.
pub struct Agent {
    context: Context,
    store: Arc<dyn SourceStore>,
    boot_path: String,
}

impl Agent {
    /// Creates the agent's context and installs its bindings.
    ///
    /// The boot script is not run until [`boot`](Self::boot) is called.
    pub fn spawn(
        pool: &ContextPool,
        store: Arc<dyn SourceStore>,
        bindings: Arc<dyn AgentBindings>,
        boot_path: impl Into<String>,
        round_budget: Duration,
    ) -> Result<Self, PoolError> {
        let context = pool.new_context(round_budget, move |isolate| bindings.install(isolate))?;
        let boot_path = boot_path.into();
        info!(context = %context.id(), boot_path = %boot_path, "agent spawned");
        Ok(Self {
            context,
            store,
            boot_path,
        })
    }

    /// Id of the agent's context.
    pub fn id(&self) -> ContextId {
        self.context.id()
    }

    /// The agent's context.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Path the boot source is read from.
    pub fn boot_path(&self) -> &str {
        &self.boot_path
    }

    /// Queues a run of the boot source.
    ///
    /// The source is read when the task runs; a missing source is reported
    /// as a script error of that task.
    pub fn boot(&self) -> Result<(), ContextError> {
        self.post_load(false)
    }

    /// Queues a reset of all script state followed by a run of the boot
    /// source.
    pub fn reboot(&self) -> Result<(), ContextError> {
        self.post_load(true)
    }

    /// Queues a reset followed by a run of `source` instead of the stored
    /// boot source.
    pub fn reboot_with(&self, source: impl Into<String>) -> Result<(), ContextError> {
        let source = source.into();
        let id = self.id();
        self.context.post(Task::new(move |isolate| {
            isolate.reset();
            info!(context = %id, "agent rebooting with new source");
            isolate.run(&source)
        }))
    }

    fn post_load(&self, reset: bool) -> Result<(), ContextError> {
        let store = Arc::clone(&self.store);
        let path = self.boot_path.clone();
        self.context.post(Task::new(move |isolate| {
            if reset {
                isolate.reset();
            }
            let source = store
                .read(&path)
                .ok_or_else(|| ScriptError::runtime(format!("no source at `{}`", path)))?;
            isolate.run(&source)
        }))
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("context", &self.context.id())
            .field("boot_path", &self.boot_path)
            .finish()
    }
}
