//! Helpers shared by the unit tests

use crossbeam::channel;
use script_context::{Context, ContextConfig, Isolate, ScriptError, Task};
use std::time::Duration;

/// Spawns a context and waits for its init to succeed.
pub fn ready_context<F>(budget_ms: u64, init: F) -> Context
where
    F: FnOnce(&mut Isolate) -> Result<(), ScriptError> + Send + 'static,
{
    let config = ContextConfig::new().with_round_budget(Duration::from_millis(budget_ms));
    let (context, init) = Context::spawn(config, init).unwrap();
    init.wait().unwrap();
    context
}

/// Runs `f` on a fresh isolate during one round and returns its result.
pub fn on_isolate<R, F>(f: F) -> R
where
    R: Send + 'static,
    F: FnOnce(&mut Isolate) -> R + Send + 'static,
{
    let context = ready_context(1_000, |_| Ok(()));
    let (tx, rx) = channel::bounded(1);
    context
        .post(Task::new(move |isolate| {
            let _ = tx.send(f(isolate));
            Ok(())
        }))
        .unwrap();
    context.run_round().unwrap();
    rx.recv_timeout(Duration::from_secs(5)).unwrap()
}
