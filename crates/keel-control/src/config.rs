//! Control plane configuration

use std::time::Duration;

use keel_decision::{DecisionPolicy, DEFAULT_HISTORY_CAPACITY};
use keel_guardian::SlaConfig;
use keel_health::{CollectorConfig, HealingConfig};
use keel_rollback::RollbackConfig;
use serde::{Deserialize, Serialize};

/// Settings for every subsystem the control plane wires together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default)]
    pub policy: DecisionPolicy,

    #[serde(default)]
    pub sla: SlaConfig,

    #[serde(default)]
    pub collector: CollectorConfig,

    #[serde(default)]
    pub healing: HealingConfig,

    #[serde(default)]
    pub rollback: RollbackConfig,

    #[serde(default)]
    pub loops: LoopConfig,
}

/// Background loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Decision results kept for metrics
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// How often deferred healing attempts are re-checked
    #[serde(default = "default_deferred_tick_millis")]
    pub deferred_tick_millis: u64,

    /// How long executed outcomes stay queryable, in seconds
    #[serde(default = "default_outcome_retention_secs")]
    pub outcome_retention_secs: u64,
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_deferred_tick_millis() -> u64 {
    500
}

fn default_outcome_retention_secs() -> u64 {
    24 * 60 * 60
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            deferred_tick_millis: default_deferred_tick_millis(),
            outcome_retention_secs: default_outcome_retention_secs(),
        }
    }
}

impl LoopConfig {
    pub fn deferred_tick(&self) -> Duration {
        Duration::from_millis(self.deferred_tick_millis.max(10))
    }

    pub fn outcome_retention(&self) -> Duration {
        Duration::from_secs(self.outcome_retention_secs)
    }
}
