//! Execution contexts: one isolate, one thread, bounded rounds.
//!
//! A [`Context`] owns a dedicated thread on which its [`Isolate`] is created,
//! initialized and run. Other threads interact with it only by posting
//! [`Task`]s and by granting rounds. Each round works through the tasks
//! queued when the round began; a per-context timer interrupts the round
//! once its budget is spent, and the remaining tasks wait for the next one.
//!
//! Dropping the last [`Context`] handle closes the context, interrupts any
//! running script, and joins its threads. A thread that fails to yield within
//! the teardown grace period is detached and reported.

use crate::config::ContextConfig;
use crate::error::ContextError;
use crate::isolate::Isolate;
use crate::round::{spawn_timer, InterruptHandle, Interruptible, RoundPhase, RoundState, TimerCommand};
use crate::task_queue::{Task, TaskQueue};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use script_types::{ContextId, RoundOutcome, RoundReport, ScriptError};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// State shared between a context's handle, its thread and its timer.
pub(crate) struct Shared {
    id: ContextId,
    budget: Duration,
    queue: Mutex<TaskQueue>,
    round: Mutex<RoundState>,
    wake: Condvar,
    interrupt: Arc<InterruptHandle>,
    timer: Sender<TimerCommand>,
}

impl Shared {
    fn post(&self, task: Task) -> Result<(), ContextError> {
        let rejected = self.queue.lock().enqueue(task);
        match rejected {
            Ok(()) => Ok(()),
            Err(task) => {
                drop(task);
                Err(ContextError::Closed(self.id))
            }
        }
    }

    fn start_round(&self, on_finish: Sender<RoundReport>) -> Result<u64, ContextError> {
        let mut state = self.round.lock();
        if state.closed {
            return Err(ContextError::Closed(self.id));
        }
        if state.phase != RoundPhase::Idle {
            return Err(ContextError::RoundActive(self.id));
        }
        let round = state.arm(on_finish);
        if self
            .timer
            .send(TimerCommand::Arm {
                round,
                budget: self.budget,
            })
            .is_err()
        {
            warn!(context = %self.id, round, "round timer is gone; round is unbounded");
        }
        self.wake.notify_all();
        trace!(context = %self.id, round, "round armed");
        Ok(round)
    }

    /// Blocks the context thread until a round is granted or the context
    /// closes.
    fn wait_for_round(&self) -> Option<u64> {
        let mut state = self.round.lock();
        loop {
            if state.closed || self.interrupt.is_aborted() {
                return None;
            }
            if state.phase == RoundPhase::Armed {
                state.phase = RoundPhase::Running;
                self.interrupt.clear();
                return Some(state.round);
            }
            self.wake.wait(&mut state);
        }
    }

    fn is_running(&self, round: u64) -> bool {
        self.round.lock().is_running(round)
    }

    fn record(&self, round: u64, what: &str, counted: bool, result: Result<(), ScriptError>) {
        let failed = match &result {
            Ok(()) => false,
            Err(err) if err.is_interrupt() => {
                debug!(context = %self.id, round, "{} cut off by round budget", what);
                return;
            }
            Err(err) => {
                warn!(context = %self.id, round, error = %err, "uncaught script error in {}", what);
                true
            }
        };
        if !counted {
            return;
        }
        let mut state = self.round.lock();
        if state.round == round {
            state.tasks_run += 1;
            if failed {
                state.script_errors += 1;
            }
        }
    }

    /// Ends `round` from the context thread, after its last task returned.
    fn finish_round(&self, round: u64) {
        let finished = {
            let mut state = self.round.lock();
            let outcome = state.outcome();
            state.finish(self.id, round, outcome)
        };
        if let Some((reports, report)) = finished {
            let _ = self.timer.send(TimerCommand::Cancel { round });
            trace!(
                context = %self.id,
                round,
                tasks = report.tasks_run,
                outcome = ?report.outcome,
                "round ended"
            );
            let _ = reports.send(report);
        }
    }

    fn close(&self) {
        let interrupted = {
            let mut state = self.round.lock();
            state.closed = true;
            let round = state.round;
            state.finish(self.id, round, RoundOutcome::Interrupted)
        };
        self.interrupt.abort();
        let dropped = self.queue.lock().close();
        self.wake.notify_all();
        drop(dropped);
        if let Some((reports, report)) = interrupted {
            let _ = reports.send(report);
        }
    }
}

impl Interruptible for Shared {
    fn interrupt_round(&self, round: u64) {
        // Requested under the round lock so it cannot leak into the next round
        let timed_out = {
            let mut state = self.round.lock();
            let timed_out = state.time_out(round);
            if timed_out {
                self.interrupt.request();
            }
            timed_out
        };
        if timed_out {
            debug!(context = %self.id, round, budget_ms = self.budget.as_millis() as u64, "round budget exhausted, interrupting");
        }
    }
}

/// A weak, thread-safe reference to a context, used to post work to it.
///
/// Holding a `ContextRef` does not keep the context alive.
#[derive(Clone)]
pub struct ContextRef {
    id: ContextId,
    shared: Weak<Shared>,
}

impl ContextRef {
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self {
            id: ContextId::next(),
            shared: Weak::new(),
        }
    }

    /// Id of the referenced context.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Queues a task on the context.
    ///
    /// Fails with [`ContextError::Closed`] if the context is gone.
    pub fn post(&self, task: Task) -> Result<(), ContextError> {
        match self.shared.upgrade() {
            Some(shared) => shared.post(task),
            None => Err(ContextError::Closed(self.id)),
        }
    }

    /// Whether the context still accepts tasks.
    pub fn is_alive(&self) -> bool {
        self.shared
            .upgrade()
            .map_or(false, |shared| !shared.queue.lock().is_closed())
    }
}

impl fmt::Debug for ContextRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContextRef").field(&self.id).finish()
    }
}

/// Completion of a context's init function.
#[derive(Debug)]
#[must_use = "initialization failures are only reported through the InitFuture"]
pub struct InitFuture {
    context: ContextId,
    outcome: Receiver<Result<(), ContextError>>,
}

impl InitFuture {
    /// Context being initialized.
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Whether the outcome is available without blocking.
    pub fn is_ready(&self) -> bool {
        !self.outcome.is_empty()
    }

    /// Blocks until the init function has completed.
    pub fn wait(self) -> Result<(), ContextError> {
        self.outcome
            .recv()
            .unwrap_or(Err(ContextError::InitAbandoned(self.context)))
    }

    /// Blocks for at most `timeout`; `None` if init is still running.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<(), ContextError>> {
        match self.outcome.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                Some(Err(ContextError::InitAbandoned(self.context)))
            }
        }
    }
}

struct ContextInner {
    shared: Arc<Shared>,
    name: String,
    grace: Duration,
    thread: Mutex<Option<JoinHandle<()>>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    exited: Receiver<()>,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        let id = self.shared.id;
        self.shared.close();

        let _ = self.shared.timer.send(TimerCommand::Shutdown);
        if let Some(timer) = self.timer.lock().take() {
            if timer.join().is_err() {
                warn!(context = %id, "round timer panicked");
            }
        }

        let Some(thread) = self.thread.lock().take() else {
            return;
        };
        if thread.thread().id() == thread::current().id() {
            // Last handle dropped by one of the context's own tasks
            debug!(context = %id, "context dropped from its own thread");
            return;
        }
        match self.exited.recv_timeout(self.grace) {
            Err(RecvTimeoutError::Timeout) => {
                error!(
                    context = %id,
                    grace_ms = self.grace.as_millis() as u64,
                    "{}; detaching its thread",
                    ContextError::Unresponsive(id)
                );
            }
            _ => {
                if thread.join().is_err() {
                    warn!(context = %id, "context thread panicked");
                }
                debug!(context = %id, name = %self.name, "context destroyed");
            }
        }
    }
}

/// Owning handle to an execution context.
///
/// Clones share the same context; it is destroyed when the last clone is
/// dropped.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// Creates a context with the given round budget and default settings.
    ///
    /// See [`Context::spawn`].
    pub fn new<F>(round_budget: Duration, init: F) -> Result<(Context, InitFuture), ContextError>
    where
        F: FnOnce(&mut Isolate) -> Result<(), ScriptError> + Send + 'static,
    {
        Self::spawn(ContextConfig::new().with_round_budget(round_budget), init)
    }

    /// Creates a context and starts its thread.
    ///
    /// `init` runs on the new thread right after the isolate is created,
    /// before any round; it typically binds native functions and loads the
    /// agent's boot script. Its outcome is reported through the returned
    /// [`InitFuture`]. A context whose init failed is closed.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use script_context::{Context, ContextConfig};
    ///
    /// let (context, init) = Context::spawn(ContextConfig::new(), |isolate| {
    ///     isolate.bind_fn("add", |a: i64, b: i64| a + b)?;
    ///     isolate.run("let total = add(2, 3);")
    /// })
    /// .unwrap();
    /// init.wait().unwrap();
    /// let report = context.run_round().unwrap();
    /// assert!(!report.was_interrupted());
    /// ```
    pub fn spawn<F>(config: ContextConfig, init: F) -> Result<(Context, InitFuture), ContextError>
    where
        F: FnOnce(&mut Isolate) -> Result<(), ScriptError> + Send + 'static,
    {
        let id = ContextId::next();
        let name = config.name.clone().unwrap_or_else(|| id.to_string());
        let (timer_tx, timer_rx) = channel::unbounded();
        let shared = Arc::new(Shared {
            id,
            budget: config.round_budget(),
            queue: Mutex::new(TaskQueue::new()),
            round: Mutex::new(RoundState::new()),
            wake: Condvar::new(),
            interrupt: Arc::new(InterruptHandle::default()),
            timer: timer_tx,
        });

        let timer = spawn_timer(format!("{}-timer", name), timer_rx, Arc::downgrade(&shared))
            .map_err(|source| ContextError::Spawn {
                context: id,
                role: "timer",
                source,
            })?;

        let (init_tx, init_rx) = channel::bounded(1);
        let (exit_tx, exit_rx) = channel::bounded::<()>(0);
        let grace = config.teardown_grace();
        let thread_shared = Arc::clone(&shared);
        let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
            let _exit = exit_tx;
            run_context(thread_shared, config, init, init_tx);
        });
        let thread = match spawned {
            Ok(thread) => thread,
            Err(source) => {
                let _ = shared.timer.send(TimerCommand::Shutdown);
                let _ = timer.join();
                return Err(ContextError::Spawn {
                    context: id,
                    role: "context",
                    source,
                });
            }
        };

        info!(context = %id, name = %name, budget_ms = shared.budget.as_millis() as u64, "context created");
        let context = Context {
            inner: Arc::new(ContextInner {
                shared,
                name,
                grace,
                thread: Mutex::new(Some(thread)),
                timer: Mutex::new(Some(timer)),
                exited: exit_rx,
            }),
        };
        let init = InitFuture {
            context: id,
            outcome: init_rx,
        };
        Ok((context, init))
    }

    /// Unique id of the context.
    pub fn id(&self) -> ContextId {
        self.inner.shared.id
    }

    /// Label used for the context's thread and in logs.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Wall-clock budget of each round.
    pub fn round_budget(&self) -> Duration {
        self.inner.shared.budget
    }

    /// Queues a task to run during a later round.
    ///
    /// Tasks run in the order they were posted. Fails with
    /// [`ContextError::Closed`] once the context is closing.
    pub fn post(&self, task: Task) -> Result<(), ContextError> {
        self.inner.shared.post(task)
    }

    /// Queues a script source to run during a later round.
    pub fn post_script(&self, source: impl Into<String>) -> Result<(), ContextError> {
        self.post(Task::script(source))
    }

    /// Number of tasks waiting for a round.
    pub fn pending_tasks(&self) -> usize {
        self.inner.shared.queue.lock().len()
    }

    /// Whether a round is armed or running.
    pub fn is_round_active(&self) -> bool {
        self.inner.shared.round.lock().phase != RoundPhase::Idle
    }

    /// Whether the context has been closed, by a failed init or teardown.
    pub fn is_closed(&self) -> bool {
        self.inner.shared.round.lock().closed
    }

    /// Grants the context one round.
    ///
    /// Returns the round number immediately; `on_finish` receives exactly one
    /// [`RoundReport`] once the round is drained, interrupted by its budget,
    /// or cut short by teardown. Fails with [`ContextError::RoundActive`] if
    /// the previous round has not ended yet.
    pub fn start_round(&self, on_finish: Sender<RoundReport>) -> Result<u64, ContextError> {
        self.inner.shared.start_round(on_finish)
    }

    /// Runs one round and blocks until it ends.
    pub fn run_round(&self) -> Result<RoundReport, ContextError> {
        let (tx, rx) = channel::bounded(1);
        self.start_round(tx)?;
        rx.recv().map_err(|_| ContextError::Closed(self.id()))
    }

    /// A weak reference for posting tasks without keeping the context alive.
    pub fn context_ref(&self) -> ContextRef {
        ContextRef {
            id: self.id(),
            shared: Arc::downgrade(&self.inner.shared),
        }
    }

    /// A non-owning handle that can be upgraded back while the context lives.
    pub fn downgrade(&self) -> WeakContext {
        WeakContext {
            id: self.id(),
            budget: self.round_budget(),
            inner: Arc::downgrade(&self.inner),
            shared: Arc::downgrade(&self.inner.shared),
        }
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Context {}

impl std::hash::Hash for Context {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id())
            .field("name", &self.inner.name)
            .field("budget", &self.inner.shared.budget)
            .finish()
    }
}

/// Non-owning handle to a [`Context`].
///
/// Schedulers hold these so that dropping the last [`Context`] still tears
/// the context down on the owner's side.
#[derive(Clone)]
pub struct WeakContext {
    id: ContextId,
    budget: Duration,
    inner: Weak<ContextInner>,
    shared: Weak<Shared>,
}

impl WeakContext {
    /// Id of the context.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Wall-clock budget of each round.
    pub fn round_budget(&self) -> Duration {
        self.budget
    }

    /// Returns an owning handle if the context is still alive.
    pub fn upgrade(&self) -> Option<Context> {
        self.inner.upgrade().map(|inner| Context { inner })
    }

    /// Whether an owner still holds the context and it has not closed.
    ///
    /// Never takes ownership, so it cannot trigger teardown.
    pub fn is_live(&self) -> bool {
        self.inner.strong_count() > 0
            && self
                .shared
                .upgrade()
                .map_or(false, |shared| !shared.round.lock().closed)
    }

    /// Grants the context one round without taking ownership of it.
    ///
    /// See [`Context::start_round`].
    pub fn start_round(&self, on_finish: Sender<RoundReport>) -> Result<u64, ContextError> {
        if self.inner.strong_count() == 0 {
            return Err(ContextError::Closed(self.id));
        }
        match self.shared.upgrade() {
            Some(shared) => shared.start_round(on_finish),
            None => Err(ContextError::Closed(self.id)),
        }
    }
}

impl fmt::Debug for WeakContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WeakContext").field(&self.id).finish()
    }
}

fn run_context<F>(
    shared: Arc<Shared>,
    config: ContextConfig,
    init: F,
    init_tx: Sender<Result<(), ContextError>>,
) where
    F: FnOnce(&mut Isolate) -> Result<(), ScriptError>,
{
    let owner = ContextRef {
        id: shared.id,
        shared: Arc::downgrade(&shared),
    };
    let mut isolate = Isolate::new(shared.id, &config, Arc::clone(&shared.interrupt), owner);

    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| init(&mut isolate))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(err.to_string()),
        Err(payload) => Err(format!("init panicked: {}", panic_message(payload.as_ref()))),
    };
    if let Err(reason) = outcome {
        warn!(context = %shared.id, %reason, "context initialization failed");
        shared.close();
        let _ = init_tx.send(Err(ContextError::Initialization {
            context: shared.id,
            reason,
        }));
        return;
    }
    debug!(context = %shared.id, "context initialized");
    let _ = init_tx.send(Ok(()));

    serve_rounds(&shared, &mut isolate);
    debug!(context = %shared.id, "context thread exiting");
}

fn serve_rounds(shared: &Shared, isolate: &mut Isolate) {
    while let Some(round) = shared.wait_for_round() {
        let mut batch = shared.queue.lock().take_batch();
        trace!(context = %shared.id, round, tasks = batch.len(), "round running");
        drain_microtasks(shared, isolate, round);
        while shared.is_running(round) {
            let Some(task) = batch.pop_front() else {
                break;
            };
            let counted = task.is_counted();
            shared.record(round, "task", counted, guarded(|| task.run(isolate)));
            drain_microtasks(shared, isolate, round);
        }
        if !batch.is_empty() {
            let requeued = shared.queue.lock().requeue_front(batch);
            drop(requeued);
        }
        shared.finish_round(round);
    }
}

fn drain_microtasks(shared: &Shared, isolate: &mut Isolate, round: u64) {
    while shared.is_running(round) {
        let Some(microtask) = isolate.next_microtask() else {
            break;
        };
        shared.record(round, "microtask", true, guarded(|| microtask.run(isolate)));
    }
}

fn guarded(run: impl FnOnce() -> Result<(), ScriptError>) -> Result<(), ScriptError> {
    panic::catch_unwind(AssertUnwindSafe(run)).unwrap_or_else(|payload| {
        Err(ScriptError::runtime(format!(
            "task panicked: {}",
            panic_message(payload.as_ref())
        )))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
