//! Auto-approval policy tables
//!
//! Three lookups drive classification: the confidence threshold per
//! decision type, the reject margin below that threshold, and the highest
//! priority at which a type may be auto-approved.

use keel_types::{DecisionType, Priority};
use serde::{Deserialize, Serialize};

/// Policy for one decision type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypePolicy {
    /// Minimum confidence for auto-approval. `None` means always escalate.
    pub threshold: Option<f64>,

    /// Confidence more than this far below the threshold is auto-rejected.
    pub reject_margin: f64,

    /// Highest priority that may auto-approve. `None` means never.
    pub max_auto_priority: Option<Priority>,
}

impl TypePolicy {
    fn new(threshold: f64, reject_margin: f64, max_auto_priority: Priority) -> Self {
        Self {
            threshold: Some(threshold),
            reject_margin,
            max_auto_priority: Some(max_auto_priority),
        }
    }

    fn guardian_only() -> Self {
        Self {
            threshold: None,
            reject_margin: 0.0,
            max_auto_priority: None,
        }
    }
}

/// Threshold, reject-margin and auto-approval tables for every type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionPolicy {
    pub deployment: TypePolicy,
    pub scaling: TypePolicy,
    /// Auto-approves up to Critical.
    pub rollback: TypePolicy,
    pub healing: TypePolicy,
    pub monitoring: TypePolicy,
    pub guardian_override: TypePolicy,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            deployment: TypePolicy::new(0.80, 0.3, Priority::Medium),
            scaling: TypePolicy::new(0.70, 0.4, Priority::High),
            rollback: TypePolicy::new(0.90, 0.4, Priority::Critical),
            healing: TypePolicy::new(0.85, 0.3, Priority::Critical),
            monitoring: TypePolicy::new(0.60, 0.4, Priority::Low),
            guardian_override: TypePolicy::guardian_only(),
        }
    }
}

impl DecisionPolicy {
    pub fn for_type(&self, decision_type: DecisionType) -> &TypePolicy {
        match decision_type {
            DecisionType::Deployment => &self.deployment,
            DecisionType::Scaling => &self.scaling,
            DecisionType::Rollback => &self.rollback,
            DecisionType::Healing => &self.healing,
            DecisionType::Monitoring => &self.monitoring,
            DecisionType::GuardianOverride => &self.guardian_override,
        }
    }

    pub fn threshold(&self, decision_type: DecisionType) -> Option<f64> {
        if decision_type == DecisionType::GuardianOverride {
            return None;
        }
        self.for_type(decision_type).threshold
    }

    pub fn reject_margin(&self, decision_type: DecisionType) -> f64 {
        self.for_type(decision_type).reject_margin
    }

    /// The `(DecisionType, Priority) -> bool` allow-list.
    pub fn auto_approvable(&self, decision_type: DecisionType, priority: Priority) -> bool {
        if decision_type == DecisionType::GuardianOverride {
            return false;
        }
        self.for_type(decision_type)
            .max_auto_priority
            .is_some_and(|max| priority <= max)
    }
}
