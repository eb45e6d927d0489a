//! Per-component healing state.

use keel_types::{ComponentId, DecisionId, HealthStatus};
use tokio::time::Instant;

/// Healing bookkeeping for one component.
#[derive(Debug, Clone)]
pub struct HealingContext {
    pub component: ComponentId,

    /// Consecutive failed healing attempts
    pub attempt_count: u32,

    /// Healing or override decision awaiting an outcome
    pub in_flight: Option<DecisionId>,

    /// When the last healing action completed successfully
    pub last_completed: Option<Instant>,

    /// Earliest retry after a failure
    pub retry_after: Option<Instant>,

    /// Guardian override raised for the current failure streak
    pub escalation: Option<DecisionId>,

    /// Status seen on the previous snapshot
    pub last_status: HealthStatus,
}

impl HealingContext {
    pub fn new(component: ComponentId) -> Self {
        Self {
            component,
            attempt_count: 0,
            in_flight: None,
            last_completed: None,
            retry_after: None,
            escalation: None,
            last_status: HealthStatus::Healthy,
        }
    }

    pub fn exceeded_max_attempts(&self, max_attempts: u32) -> bool {
        self.attempt_count >= max_attempts
    }

    /// End of the cooldown window, if one is running at `now`.
    pub fn cooldown_until(&self, cooldown: std::time::Duration, now: Instant) -> Option<Instant> {
        self.last_completed
            .map(|completed| completed + cooldown)
            .filter(|until| *until > now)
    }

    /// End of the backoff delay, if one is running at `now`.
    pub fn backoff_until(&self, now: Instant) -> Option<Instant> {
        self.retry_after.filter(|until| *until > now)
    }

    /// Clear the failure streak after a healthy outcome.
    pub fn reset(&mut self, now: Instant) {
        self.attempt_count = 0;
        self.in_flight = None;
        self.retry_after = None;
        self.escalation = None;
        self.last_completed = Some(now);
    }
}
