//! Round bookkeeping and the per-context budget timer.
//!
//! A round moves `Idle -> Armed -> Running -> Idle`. When the budget runs
//! out the timer only marks the round as timed out and requests an
//! interrupt; the context thread reports the round once the running task
//! has stopped. Teardown may end a round from another thread, so every path
//! goes through [`RoundState::finish`] under the same lock and exactly one
//! of them reports the round.

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use script_types::{ContextId, RoundOutcome, RoundReport};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::trace;

/// Cancellation flags polled by the interpreter at safe points.
#[derive(Debug, Default)]
pub struct InterruptHandle {
    requested: AtomicBool,
    aborted: AtomicBool,
}

impl InterruptHandle {
    /// Asks the script running now to stop at its next safe point.
    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
    }

    /// Stops the running script and every script started afterwards.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    /// Whether the context has been aborted for teardown.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Whether the interpreter should stop at its next safe point.
    pub fn should_stop(&self) -> bool {
        self.requested.load(Ordering::Acquire) || self.is_aborted()
    }

    pub(crate) fn clear(&self) {
        self.requested.store(false, Ordering::Release);
    }
}

/// Lifecycle phase of the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    /// No round is active
    Idle,
    /// A round was granted but the context thread has not picked it up
    Armed,
    /// The context thread is working through the round's batch
    Running,
}

#[derive(Debug)]
pub(crate) struct RoundState {
    pub(crate) phase: RoundPhase,
    pub(crate) round: u64,
    pub(crate) closed: bool,
    pub(crate) timed_out: bool,
    pub(crate) tasks_run: usize,
    pub(crate) script_errors: usize,
    started_at: Option<Instant>,
    on_finish: Option<Sender<RoundReport>>,
}

impl RoundState {
    pub(crate) fn new() -> Self {
        Self {
            phase: RoundPhase::Idle,
            round: 0,
            closed: false,
            timed_out: false,
            tasks_run: 0,
            script_errors: 0,
            started_at: None,
            on_finish: None,
        }
    }

    /// Arms the next round. The caller has already checked the round is idle.
    pub(crate) fn arm(&mut self, on_finish: Sender<RoundReport>) -> u64 {
        self.round += 1;
        self.phase = RoundPhase::Armed;
        self.timed_out = false;
        self.tasks_run = 0;
        self.script_errors = 0;
        self.started_at = Some(Instant::now());
        self.on_finish = Some(on_finish);
        self.round
    }

    pub(crate) fn is_running(&self, round: u64) -> bool {
        self.phase == RoundPhase::Running && self.round == round && !self.closed && !self.timed_out
    }

    /// Marks `round` as out of budget. Returns false if it already ended.
    pub(crate) fn time_out(&mut self, round: u64) -> bool {
        if self.phase == RoundPhase::Idle || self.round != round || self.closed {
            return false;
        }
        self.timed_out = true;
        true
    }

    /// How the active round ends if the context thread ends it now.
    pub(crate) fn outcome(&self) -> RoundOutcome {
        if self.timed_out {
            RoundOutcome::Interrupted
        } else {
            RoundOutcome::Finished
        }
    }

    /// Ends `round` if it is still the active one.
    ///
    /// The returned report must be sent after the lock is released.
    pub(crate) fn finish(
        &mut self,
        context: ContextId,
        round: u64,
        outcome: RoundOutcome,
    ) -> Option<(Sender<RoundReport>, RoundReport)> {
        if self.phase == RoundPhase::Idle || self.round != round {
            return None;
        }
        self.phase = RoundPhase::Idle;
        let elapsed = self
            .started_at
            .take()
            .map(|start| start.elapsed())
            .unwrap_or_default();
        let report = RoundReport {
            context,
            round,
            outcome,
            tasks_run: self.tasks_run,
            script_errors: self.script_errors,
            elapsed,
        };
        self.on_finish.take().map(|tx| (tx, report))
    }
}

#[derive(Debug)]
pub(crate) enum TimerCommand {
    Arm { round: u64, budget: Duration },
    Cancel { round: u64 },
    Shutdown,
}

/// Something the timer can interrupt.
pub(crate) trait Interruptible: Send + Sync + 'static {
    fn interrupt_round(&self, round: u64);
}

/// Spawns the budget timer thread for one context.
///
/// The thread holds only a weak reference to its target, and exits on
/// [`TimerCommand::Shutdown`] or when every sender is gone.
pub(crate) fn spawn_timer<T: Interruptible>(
    name: String,
    commands: Receiver<TimerCommand>,
    target: Weak<T>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(name)
        .spawn(move || timer_loop(commands, target))
}

fn timer_loop<T: Interruptible>(commands: Receiver<TimerCommand>, target: Weak<T>) {
    let mut armed: Option<(u64, Instant)> = None;
    loop {
        let next = match armed {
            Some((_, deadline)) => commands.recv_deadline(deadline),
            None => commands.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match next {
            Ok(TimerCommand::Arm { round, budget }) => {
                armed = Some((round, Instant::now() + budget));
            }
            Ok(TimerCommand::Cancel { round }) => {
                if matches!(armed, Some((current, _)) if current == round) {
                    armed = None;
                }
            }
            Ok(TimerCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                if let Some((round, _)) = armed.take() {
                    trace!(round, "round budget elapsed");
                    match target.upgrade() {
                        Some(target) => target.interrupt_round(round),
                        None => break,
                    }
                }
            }
        }
    }
}
