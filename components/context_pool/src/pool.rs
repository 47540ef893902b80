//! The context pool and its tick barrier.

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::registry::Registry;
use crate::worker::Worker;
use crossbeam::channel;
use crossbeam::sync::WaitGroup;
use parking_lot::Mutex;
use script_context::{Context, ContextConfig, ContextError, InitFuture, Isolate, WeakContext};
use script_types::{ContextId, RoundReport, ScriptError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outcome of one [`ContextPool::update_all`] call.
#[derive(Debug)]
pub struct TickReport {
    /// Sequence number of the tick, starting at 1
    pub tick: u64,
    /// One report per context that received a round
    pub rounds: Vec<RoundReport>,
    /// Contexts whose initialization failed; they are never scheduled
    pub init_failures: Vec<(ContextId, ContextError)>,
    /// Released contexts removed from the registry during this tick
    pub pruned: usize,
    /// Contexts whose round was still running when the worker stopped
    /// waiting, or was still running from an earlier tick; their side effects
    /// may still be in flight
    pub stalled: Vec<ContextId>,
    /// Wall-clock duration of the tick
    pub elapsed: Duration,
}

impl TickReport {
    /// Rounds cut off by their budget.
    pub fn interrupted(&self) -> impl Iterator<Item = &RoundReport> {
        self.rounds.iter().filter(|r| r.was_interrupted())
    }

    /// Report for one context, if it ran this tick.
    pub fn round_for(&self, context: ContextId) -> Option<&RoundReport> {
        self.rounds.iter().find(|r| r.context == context)
    }
}

struct PendingInit {
    context: WeakContext,
    init: InitFuture,
}

/// Runs many contexts over a bounded set of worker threads.
///
/// The pool does not own its contexts: [`ContextPool::new_context`] hands the
/// owning [`Context`] back to the caller, and a context the caller drops is
/// removed from the pool on the next tick.
///
/// # Examples
///
/// ```no_run
/// use context_pool::{ContextPool, PoolConfig};
/// use std::time::Duration;
///
/// let pool = ContextPool::new(PoolConfig::new().with_workers(2)).unwrap();
/// let agent = pool
///     .new_context(Duration::from_millis(50), |isolate| isolate.run("let fuel = 10;"))
///     .unwrap();
/// agent.post_script("fuel -= 1;").unwrap();
///
/// let tick = pool.update_all().unwrap();
/// assert_eq!(tick.rounds.len(), 1);
/// ```
pub struct ContextPool {
    config: PoolConfig,
    registry: Arc<Mutex<Registry>>,
    pending: Mutex<Vec<PendingInit>>,
    workers: Vec<Worker>,
    tick_lock: Mutex<()>,
    ticks: AtomicU64,
}

impl ContextPool {
    /// Validates `config` and starts the worker threads.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        let registry = Arc::new(Mutex::new(Registry::default()));
        let workers = (0..config.worker_count)
            .map(|index| {
                Worker::spawn(index, Arc::clone(&registry), config.report_slack())
                    .map_err(|source| PoolError::WorkerSpawn { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        info!(workers = workers.len(), "context pool started");
        Ok(Self {
            config,
            registry,
            pending: Mutex::new(Vec::new()),
            workers,
            tick_lock: Mutex::new(()),
            ticks: AtomicU64::new(0),
        })
    }

    /// Pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Contexts registered for scheduling, including ones released since the
    /// last tick.
    pub fn context_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Contexts whose initialization has not been collected by a tick yet.
    pub fn pending_inits(&self) -> usize {
        self.pending.lock().len()
    }

    /// Creates a context with the given round budget.
    ///
    /// `init` runs on the new context's thread. The context joins the
    /// schedule at the next [`update_all`](Self::update_all), once its init
    /// has succeeded.
    pub fn new_context<F>(&self, round_budget: Duration, init: F) -> Result<Context, PoolError>
    where
        F: FnOnce(&mut Isolate) -> Result<(), ScriptError> + Send + 'static,
    {
        let config = self.config.context_config().with_round_budget(round_budget);
        self.new_context_with(config, init)
    }

    /// Creates a context from explicit settings.
    pub fn new_context_with<F>(&self, config: ContextConfig, init: F) -> Result<Context, PoolError>
    where
        F: FnOnce(&mut Isolate) -> Result<(), ScriptError> + Send + 'static,
    {
        let (context, init) = Context::spawn(config, init)?;
        self.pending.lock().push(PendingInit {
            context: context.downgrade(),
            init,
        });
        Ok(context)
    }

    /// Runs one round of every live context and returns when all of them
    /// have ended.
    ///
    /// A round still running past its budget plus the report slack is left
    /// running and listed in [`TickReport::stalled`].
    ///
    /// Context failures are reported in the [`TickReport`]; only a lost
    /// worker fails the tick.
    pub fn update_all(&self) -> Result<TickReport, PoolError> {
        let _serial = self.tick_lock.lock();
        let started = Instant::now();
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;

        let init_failures = self.collect_inits();
        self.registry.lock().rewind();

        let (reports_tx, reports_rx) = channel::unbounded();
        let done = WaitGroup::new();
        let mut lost = None;
        for worker in &self.workers {
            if !worker.tick(reports_tx.clone(), done.clone()) {
                lost = Some(worker.index());
            }
        }
        drop(reports_tx);
        done.wait();

        if let Some(index) = lost {
            tracing::error!(worker = index, tick, "pool worker lost");
            return Err(PoolError::WorkerLost(index));
        }

        let rounds: Vec<RoundReport> = reports_rx.try_iter().collect();
        let (pruned, stalled) = {
            let mut registry = self.registry.lock();
            (registry.pruned(), registry.take_stalled())
        };
        let report = TickReport {
            tick,
            rounds,
            init_failures,
            pruned,
            stalled,
            elapsed: started.elapsed(),
        };
        for round in report.interrupted() {
            warn!(
                context = %round.context,
                round = round.round,
                elapsed_ms = round.elapsed.as_millis() as u64,
                "round interrupted at budget"
            );
        }
        debug!(
            tick,
            rounds = report.rounds.len(),
            pruned,
            stalled = report.stalled.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "tick complete"
        );
        Ok(report)
    }

    fn collect_inits(&self) -> Vec<(ContextId, ContextError)> {
        let pending = std::mem::take(&mut *self.pending.lock());
        let mut failures = Vec::new();
        for PendingInit { context, init } in pending {
            match init.wait() {
                Ok(()) => self.registry.lock().insert(context),
                Err(err) => {
                    warn!(context = %context.id(), error = %err, "context failed to initialize");
                    failures.push((context.id(), err));
                }
            }
        }
        failures
    }
}

impl std::fmt::Debug for ContextPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextPool")
            .field("workers", &self.workers.len())
            .field("contexts", &self.context_count())
            .field("ticks", &self.ticks.load(Ordering::Relaxed))
            .finish()
    }
}
