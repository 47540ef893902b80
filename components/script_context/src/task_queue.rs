//! Task and microtask queue management.
//!
//! Tasks are posted from any thread and run one at a time on the owning
//! context's thread, only during a round. Microtasks are queued by code that
//! is already running on that thread and are drained after each task.

use crate::isolate::Isolate;
use script_types::ScriptError;
use std::collections::VecDeque;

/// A unit of work for a context.
///
/// The closure receives the context's [`Isolate`] and may only touch it for
/// the duration of the call.
pub struct Task {
    callback: Box<dyn FnOnce(&mut Isolate) -> Result<(), ScriptError> + Send>,
    counted: bool,
}

impl Task {
    /// Creates a new Task from a closure.
    ///
    /// # Arguments
    ///
    /// * `f` - The function to execute when the task runs
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(&mut Isolate) -> Result<(), ScriptError> + Send + 'static,
    {
        Self {
            callback: Box::new(f),
            counted: true,
        }
    }

    /// Bookkeeping work that is not reported in
    /// [`RoundReport::tasks_run`](script_types::RoundReport::tasks_run).
    pub(crate) fn housekeeping<F>(f: F) -> Self
    where
        F: FnOnce(&mut Isolate) -> Result<(), ScriptError> + Send + 'static,
    {
        Self {
            callback: Box::new(f),
            counted: false,
        }
    }

    pub(crate) fn is_counted(&self) -> bool {
        self.counted
    }

    /// Creates a task that runs a script source in the isolate.
    pub fn script(source: impl Into<String>) -> Self {
        let source = source.into();
        Self::new(move |isolate| isolate.run(&source))
    }

    /// Executes the task.
    pub fn run(self, isolate: &mut Isolate) -> Result<(), ScriptError> {
        (self.callback)(isolate)
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Task {{ ... }}")
    }
}

/// Work queued from inside a running task, executed on the same thread
/// right after the current task completes.
///
/// Unlike [`Task`], a microtask is not `Send`: it may capture engine values
/// such as function pointers.
pub struct MicroTask {
    callback: Box<dyn FnOnce(&mut Isolate) -> Result<(), ScriptError>>,
}

impl MicroTask {
    /// Creates a new MicroTask from a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(&mut Isolate) -> Result<(), ScriptError> + 'static,
    {
        Self {
            callback: Box::new(f),
        }
    }

    /// Executes the microtask.
    pub fn run(self, isolate: &mut Isolate) -> Result<(), ScriptError> {
        (self.callback)(isolate)
    }
}

impl std::fmt::Debug for MicroTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MicroTask {{ ... }}")
    }
}

/// FIFO queue of posted tasks.
///
/// Once closed, the queue rejects new tasks and drops the ones it held.
#[derive(Debug, Default)]
pub struct TaskQueue {
    queue: VecDeque<Task>,
    closed: bool,
}

impl TaskQueue {
    /// Creates a new empty TaskQueue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a task to the end of the queue.
    ///
    /// A closed queue hands the task back.
    pub fn enqueue(&mut self, task: Task) -> Result<(), Task> {
        if self.closed {
            return Err(task);
        }
        self.queue.push_back(task);
        Ok(())
    }

    /// Takes every queued task, leaving the queue empty.
    ///
    /// This is the batch a round works through; tasks posted afterwards wait
    /// for the next round.
    pub fn take_batch(&mut self) -> VecDeque<Task> {
        std::mem::take(&mut self.queue)
    }

    /// Puts unprocessed tasks back in front of anything posted since the
    /// batch was taken, preserving FIFO order.
    ///
    /// A closed queue hands the batch back instead.
    pub fn requeue_front(&mut self, mut batch: VecDeque<Task>) -> Result<(), VecDeque<Task>> {
        if self.closed {
            return Err(batch);
        }
        batch.append(&mut self.queue);
        self.queue = batch;
        Ok(())
    }

    /// Closes the queue and returns the tasks it still held.
    ///
    /// The caller drops them once no lock is held: a task may own a
    /// [`Callback`](crate::Callback), whose drop posts back to this queue.
    pub fn close(&mut self) -> VecDeque<Task> {
        self.closed = true;
        std::mem::take(&mut self.queue)
    }

    /// Returns true if the queue no longer accepts tasks.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Returns true if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Returns the number of tasks in the queue.
    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

/// A queue for microtasks.
///
/// Microtasks are drained completely after each task.
#[derive(Debug, Default)]
pub struct MicrotaskQueue {
    queue: VecDeque<MicroTask>,
}

impl MicrotaskQueue {
    /// Creates a new empty MicrotaskQueue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a microtask to the end of the queue.
    pub fn enqueue(&mut self, microtask: MicroTask) {
        self.queue.push_back(microtask);
    }

    /// Removes and returns the next microtask from the queue.
    pub fn dequeue(&mut self) -> Option<MicroTask> {
        self.queue.pop_front()
    }

    /// Drops every pending microtask.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
