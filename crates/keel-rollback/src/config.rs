//! Rollback configuration

use serde::{Deserialize, Serialize};

/// Observation and trigger settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackConfig {
    /// Health observations (the deployment outcome included) that make up
    /// the post-deployment window
    #[serde(default = "default_observation_window")]
    pub observation_window: usize,

    /// Consecutive Degraded observations that trigger a rollback
    #[serde(default = "default_degraded_trigger")]
    pub degraded_trigger: usize,

    /// Deployments remembered per component
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

fn default_observation_window() -> usize {
    3
}

fn default_degraded_trigger() -> usize {
    3
}

fn default_history_capacity() -> usize {
    50
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            observation_window: default_observation_window(),
            degraded_trigger: default_degraded_trigger(),
            history_capacity: default_history_capacity(),
        }
    }
}

impl RollbackConfig {
    /// Window length, never shorter than the trigger.
    pub fn effective_window(&self) -> usize {
        self.observation_window.max(self.degraded_trigger()).max(1)
    }

    pub fn degraded_trigger(&self) -> usize {
        self.degraded_trigger.max(1)
    }
}
