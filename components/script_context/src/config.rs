//! Context configuration.
//!
//! This module defines the per-context settings: the round budget that
//! bounds each execution pass, the grace period granted at teardown, and
//! optional engine limits.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default wall-clock budget of one round.
pub const DEFAULT_ROUND_BUDGET_MS: u64 = 100;

/// Default time a context thread gets to yield after teardown was requested.
pub const DEFAULT_TEARDOWN_GRACE_MS: u64 = 250;

/// Settings for one execution context.
///
/// # Examples
///
/// ```
/// use script_context::ContextConfig;
/// use std::time::Duration;
///
/// let config = ContextConfig::new()
///     .with_round_budget(Duration::from_millis(50))
///     .with_name("scout");
///
/// assert_eq!(config.round_budget(), Duration::from_millis(50));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Wall-clock budget of one round, in milliseconds
    pub round_budget_ms: u64,
    /// Grace period for the context thread to exit on teardown, in milliseconds
    pub teardown_grace_ms: u64,
    /// Human-readable label used in thread names and logs
    pub name: Option<String>,
    /// Maximum script call depth
    pub max_call_levels: Option<usize>,
    /// Maximum length of a script string, in bytes
    pub max_string_size: Option<usize>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            round_budget_ms: DEFAULT_ROUND_BUDGET_MS,
            teardown_grace_ms: DEFAULT_TEARDOWN_GRACE_MS,
            name: None,
            max_call_levels: None,
            max_string_size: None,
        }
    }
}

impl ContextConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Sets the round budget.
    pub fn with_round_budget(mut self, budget: Duration) -> Self {
        self.round_budget_ms = duration_to_millis(budget);
        self
    }

    /// Sets the teardown grace period.
    pub fn with_teardown_grace(mut self, grace: Duration) -> Self {
        self.teardown_grace_ms = duration_to_millis(grace);
        self
    }

    /// Sets the label used in thread names and logs.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Limits script call depth.
    pub fn with_max_call_levels(mut self, levels: usize) -> Self {
        self.max_call_levels = Some(levels);
        self
    }

    /// Limits script string length.
    pub fn with_max_string_size(mut self, bytes: usize) -> Self {
        self.max_string_size = Some(bytes);
        self
    }

    /// Round budget as a [`Duration`].
    pub fn round_budget(&self) -> Duration {
        Duration::from_millis(self.round_budget_ms)
    }

    /// Teardown grace period as a [`Duration`].
    pub fn teardown_grace(&self) -> Duration {
        Duration::from_millis(self.teardown_grace_ms)
    }
}

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
