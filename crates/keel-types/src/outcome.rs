//! Results of executing an approved decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decision::{DecisionResult, DecisionType};
use crate::ids::{ComponentId, DecisionId, Revision};

/// Health of the component observed after an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostActionHealth {
    Healthy,
    Warning,
    Degraded,
}

/// What happened when an approved decision was executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub decision_id: DecisionId,
    pub decision_type: DecisionType,
    pub component: ComponentId,
    pub revision: Option<Revision>,
    pub executed_at: DateTime<Utc>,
    pub success: bool,
    pub post_action_health: PostActionHealth,
    pub error_detail: Option<String>,
}

impl ActionOutcome {
    pub fn success(decision: &DecisionResult, post_action_health: PostActionHealth) -> Self {
        Self {
            decision_id: decision.decision_id.clone(),
            decision_type: decision.decision_type,
            component: decision.component.clone(),
            revision: decision.revision.clone(),
            executed_at: Utc::now(),
            success: true,
            post_action_health,
            error_detail: None,
        }
    }

    /// Failed execution; always reported as `Degraded`.
    pub fn failure(decision: &DecisionResult, error_detail: impl Into<String>) -> Self {
        Self {
            decision_id: decision.decision_id.clone(),
            decision_type: decision.decision_type,
            component: decision.component.clone(),
            revision: decision.revision.clone(),
            executed_at: Utc::now(),
            success: false,
            post_action_health: PostActionHealth::Degraded,
            error_detail: Some(error_detail.into()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.success && self.post_action_health == PostActionHealth::Healthy
    }
}
