//! Guardian tickets
//!
//! A ticket exists exactly when a decision was classified
//! `PendingGuardian`. The state machine is one-way, with a single allowed
//! out-of-band correction: an `Expired` ticket may still be resolved late.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decision::{DecisionResult, Parameter};
use crate::ids::{DecisionId, GuardianId, TicketId};

/// Lifecycle state of a [`GuardianTicket`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketState {
    Open,
    Approved,
    Rejected,
    Modified,
    /// SLA deadline passed without a response. Never executes anything.
    Expired,
}

impl TicketState {
    /// Approved, Rejected or Modified.
    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            TicketState::Approved | TicketState::Rejected | TicketState::Modified
        )
    }

    /// Whether a guardian may still act on the ticket.
    pub fn accepts_resolution(&self) -> bool {
        matches!(self, TicketState::Open | TicketState::Expired)
    }
}

impl fmt::Display for TicketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TicketState::Open => "open",
            TicketState::Approved => "approved",
            TicketState::Rejected => "rejected",
            TicketState::Modified => "modified",
            TicketState::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// What a guardian decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum GuardianAction {
    Approve,
    Reject,
    /// Re-score the decision with these parameters. Parameters whose names
    /// match the original replace them; new names are appended.
    Modify { parameters: Vec<Parameter> },
}

impl GuardianAction {
    /// State the ticket moves to when this action is applied.
    pub fn target_state(&self) -> TicketState {
        match self {
            GuardianAction::Approve => TicketState::Approved,
            GuardianAction::Reject => TicketState::Rejected,
            GuardianAction::Modify { .. } => TicketState::Modified,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GuardianAction::Approve => "approve",
            GuardianAction::Reject => "reject",
            GuardianAction::Modify { .. } => "modify",
        }
    }
}

/// A decision awaiting (or having received) a Guardian's response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardianTicket {
    pub id: TicketId,
    /// The escalated decision, including per-parameter scores.
    pub decision: DecisionResult,
    pub state: TicketState,
    pub created_at: DateTime<Utc>,
    pub sla_deadline: DateTime<Utc>,
    pub assigned_guardian: Option<GuardianId>,
    pub resolution_reasoning: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Set when the ticket timed out, kept after a late resolution.
    pub expired_at: Option<DateTime<Utc>>,
    /// Result of re-scoring on `Modify`. It executes under this ticket's
    /// approval even when it scored `PendingGuardian`; no second ticket is
    /// opened for it.
    pub replacement_decision: Option<DecisionResult>,
}

impl GuardianTicket {
    /// Open a ticket for `decision` with the given deadline.
    pub fn open(decision: DecisionResult, sla_deadline: DateTime<Utc>) -> Self {
        Self {
            id: TicketId::generate(),
            decision,
            state: TicketState::Open,
            created_at: Utc::now(),
            sla_deadline,
            assigned_guardian: None,
            resolution_reasoning: None,
            resolved_at: None,
            expired_at: None,
            replacement_decision: None,
        }
    }

    pub fn decision_id(&self) -> &DecisionId {
        &self.decision.decision_id
    }

    /// Resolution arrived after the ticket had expired.
    pub fn resolved_late(&self) -> bool {
        self.state.is_resolved() && self.expired_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_acceptance() {
        assert!(TicketState::Open.accepts_resolution());
        assert!(TicketState::Expired.accepts_resolution());
        assert!(!TicketState::Approved.accepts_resolution());
        assert!(!TicketState::Rejected.accepts_resolution());
        assert!(!TicketState::Modified.accepts_resolution());
    }

    #[test]
    fn test_action_target_state() {
        assert_eq!(GuardianAction::Approve.target_state(), TicketState::Approved);
        assert_eq!(GuardianAction::Reject.target_state(), TicketState::Rejected);
        assert_eq!(
            GuardianAction::Modify { parameters: vec![] }.target_state(),
            TicketState::Modified
        );
    }
}
