//! Persistent worker threads that dispatch rounds.
//!
//! Each worker sleeps on its own command channel between ticks. During a
//! tick it claims contexts from the shared registry one at a time, grants
//! each a round and blocks until that round is reported, then claims the
//! next. The registry lock is held only while claiming.

use crate::registry::Registry;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use crossbeam::sync::WaitGroup;
use parking_lot::Mutex;
use script_types::RoundReport;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};

pub(crate) enum WorkerCommand {
    Tick {
        reports: Sender<RoundReport>,
        done: WaitGroup,
    },
    Shutdown,
}

pub(crate) struct Worker {
    index: usize,
    commands: Sender<WorkerCommand>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    pub(crate) fn spawn(
        index: usize,
        registry: Arc<Mutex<Registry>>,
        slack: Duration,
    ) -> io::Result<Self> {
        let (tx, rx) = channel::unbounded();
        let thread = thread::Builder::new()
            .name(format!("pool-worker-{}", index))
            .spawn(move || worker_loop(index, registry, slack, rx))?;
        Ok(Self {
            index,
            commands: tx,
            thread: Some(thread),
        })
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    /// Hands the worker its share of a tick. Fails if the worker is gone.
    pub(crate) fn tick(&self, reports: Sender<RoundReport>, done: WaitGroup) -> bool {
        self.commands
            .send(WorkerCommand::Tick { reports, done })
            .is_ok()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let _ = self.commands.send(WorkerCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!(worker = self.index, "pool worker panicked");
            }
        }
    }
}

fn worker_loop(
    index: usize,
    registry: Arc<Mutex<Registry>>,
    slack: Duration,
    commands: Receiver<WorkerCommand>,
) {
    debug!(worker = index, "pool worker started");
    while let Ok(command) = commands.recv() {
        match command {
            WorkerCommand::Tick { reports, done } => {
                let rounds = run_tick(index, &registry, slack, &reports);
                trace!(worker = index, rounds, "worker finished its share of the tick");
                drop(done);
            }
            WorkerCommand::Shutdown => break,
        }
    }
    debug!(worker = index, "pool worker stopped");
}

/// Works through the registry until the cursor is exhausted.
///
/// A round that has not reported by `budget + slack` is marked stalled and
/// left running; its report, if it arrives while this worker waits on a
/// later round of the same tick, is discarded.
fn run_tick(
    index: usize,
    registry: &Mutex<Registry>,
    slack: Duration,
    reports: &Sender<RoundReport>,
) -> usize {
    let (round_tx, round_rx) = channel::unbounded();
    let mut rounds = 0;
    loop {
        let claim = registry.lock().claim_next(&round_tx);
        let Some(claim) = claim else {
            break;
        };
        rounds += 1;
        let deadline = Instant::now() + claim.budget + slack;
        loop {
            match round_rx.recv_deadline(deadline) {
                Ok(report) if report.context == claim.context && report.round == claim.round => {
                    let _ = reports.send(report);
                    break;
                }
                Ok(late) => {
                    trace!(worker = index, context = %late.context, round = late.round, "discarding late round report");
                    continue;
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    warn!(
                        worker = index,
                        context = %claim.context,
                        round = claim.round,
                        slack_ms = slack.as_millis() as u64,
                        "round still running past its budget; marking context stalled"
                    );
                    registry.lock().mark_stalled(claim.context);
                    break;
                }
            }
        }
    }
    rounds
}
