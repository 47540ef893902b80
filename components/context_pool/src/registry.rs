//! Live-context registry and the per-tick scheduling cursor.

use crossbeam::channel::Sender;
use script_context::{ContextError, WeakContext};
use script_types::{ContextId, RoundReport};
use std::time::Duration;
use tracing::{trace, warn};

/// A round granted to one context during a tick.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Claim {
    pub(crate) context: ContextId,
    pub(crate) round: u64,
    pub(crate) budget: Duration,
}

/// Contexts the pool schedules, walked once per tick.
///
/// Entries are weak: the pool never keeps a context alive. An entry whose
/// owner is gone is removed when the walk reaches it.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    live: Vec<WeakContext>,
    cursor: usize,
    pruned: usize,
    stalled: Vec<ContextId>,
}

impl Registry {
    pub(crate) fn insert(&mut self, context: WeakContext) {
        self.live.push(context);
    }

    pub(crate) fn len(&self) -> usize {
        self.live.len()
    }

    /// Rewinds the cursor for a new tick.
    pub(crate) fn rewind(&mut self) {
        self.cursor = 0;
        self.pruned = 0;
        self.stalled.clear();
    }

    /// Contexts removed since the last rewind.
    pub(crate) fn pruned(&self) -> usize {
        self.pruned
    }

    /// Records a context whose round did not end in time this tick.
    pub(crate) fn mark_stalled(&mut self, context: ContextId) {
        self.stalled.push(context);
    }

    /// Contexts marked stalled since the last rewind.
    pub(crate) fn take_stalled(&mut self) -> Vec<ContextId> {
        std::mem::take(&mut self.stalled)
    }

    /// Claims the next schedulable context and starts its round.
    ///
    /// Returns `None` once the walk is exhausted.
    pub(crate) fn claim_next(&mut self, on_finish: &Sender<RoundReport>) -> Option<Claim> {
        while self.cursor < self.live.len() {
            let entry = &self.live[self.cursor];
            if !entry.is_live() {
                trace!(context = %entry.id(), "pruning released context");
                self.live.swap_remove(self.cursor);
                self.pruned += 1;
                continue;
            }
            self.cursor += 1;
            match entry.start_round(on_finish.clone()) {
                Ok(round) => {
                    return Some(Claim {
                        context: entry.id(),
                        round,
                        budget: entry.round_budget(),
                    })
                }
                Err(ContextError::RoundActive(id)) => {
                    warn!(context = %id, "previous round still active, skipping this tick");
                    self.stalled.push(id);
                }
                Err(err) => {
                    trace!(context = %entry.id(), error = %err, "context closed before its round");
                }
            }
        }
        None
    }
}
