//! Pool configuration.

use crate::error::PoolError;
use script_context::{ContextConfig, DEFAULT_ROUND_BUDGET_MS, DEFAULT_TEARDOWN_GRACE_MS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default time a worker waits for a round report beyond the round budget.
pub const DEFAULT_REPORT_SLACK_MS: u64 = 1_000;

/// Settings for a [`ContextPool`](crate::ContextPool).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of worker threads dispatching rounds
    pub worker_count: usize,
    /// Round budget for contexts created without an explicit one
    pub default_round_budget_ms: u64,
    /// Teardown grace period given to every context of the pool
    pub teardown_grace_ms: u64,
    /// How long past its budget a worker waits for a round to end before
    /// reporting the context as stalled
    pub report_slack_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism().map_or(1, |n| n.get());
        Self {
            worker_count: workers.max(1),
            default_round_budget_ms: DEFAULT_ROUND_BUDGET_MS,
            teardown_grace_ms: DEFAULT_TEARDOWN_GRACE_MS,
            report_slack_ms: DEFAULT_REPORT_SLACK_MS,
        }
    }
}

impl PoolConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, PoolError> {
        serde_json::from_str(json).map_err(|e| PoolError::InvalidConfig(e.to_string()))
    }

    /// Sets the number of workers.
    pub fn with_workers(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    /// Sets the default round budget.
    pub fn with_default_round_budget(mut self, budget: Duration) -> Self {
        self.default_round_budget_ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the teardown grace period.
    pub fn with_teardown_grace(mut self, grace: Duration) -> Self {
        self.teardown_grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets how long past the budget a round may run before it is reported
    /// as stalled.
    pub fn with_report_slack(mut self, slack: Duration) -> Self {
        self.report_slack_ms = u64::try_from(slack.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Report slack as a `Duration`.
    pub fn report_slack(&self) -> Duration {
        Duration::from_millis(self.report_slack_ms)
    }

    /// Checks the configuration can start a pool.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.worker_count == 0 {
            return Err(PoolError::InvalidConfig(
                "worker_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Context settings derived from the pool defaults.
    pub fn context_config(&self) -> ContextConfig {
        ContextConfig::new()
            .with_round_budget(Duration::from_millis(self.default_round_budget_ms))
            .with_teardown_grace(Duration::from_millis(self.teardown_grace_ms))
    }
}
