//! Round outcomes.
//!
//! A round is one bounded execution pass of a single context. The pool does
//! not distinguish a round that drained its queue from one that was cut off
//! when accounting for the tick barrier; the outcome is kept only for
//! diagnostics such as spotting runaway scripts.

use crate::ContextId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoundOutcome {
    /// Every task visible at round start ran
    Finished,
    /// The round budget elapsed before the queue drained
    Interrupted,
}

/// Summary of one completed round, produced by whichever side (queue drain
/// or round timer) won the finish transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundReport {
    /// Context the round belonged to
    pub context: ContextId,
    /// Per-context round sequence number, starting at 1
    pub round: u64,
    /// How the round ended
    pub outcome: RoundOutcome,
    /// Tasks that ran to completion (successfully or with a script error)
    pub tasks_run: usize,
    /// Tasks that ended in an uncaught script error
    pub script_errors: usize,
    /// Wall-clock time from arming to finish
    pub elapsed: Duration,
}

impl RoundReport {
    /// Returns true if the round budget cut this round off.
    pub fn was_interrupted(&self) -> bool {
        self.outcome == RoundOutcome::Interrupted
    }
}
