//! Audit event vocabulary
//!
//! Every pipeline stage reports what it did as an [`AuditEvent`]. The audit
//! log wraps each event in an [`AuditRecord`] carrying a per-component
//! sequence number. Nothing in the controller reads these back for control
//! flow.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::decision::{DecisionRequest, DecisionResult, DecisionType, Priority};
use crate::error::ValidationError;
use crate::guardian::{GuardianTicket, TicketState};
use crate::health::HealthStatus;
use crate::ids::{ComponentId, DecisionId, GuardianId, Revision, TicketId};
use crate::outcome::ActionOutcome;

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
    /// Requires immediate attention
    Critical,
}

impl From<HealthStatus> for EventSeverity {
    fn from(status: HealthStatus) -> Self {
        match status {
            HealthStatus::Healthy => EventSeverity::Info,
            HealthStatus::Degraded => EventSeverity::Warning,
            HealthStatus::Unhealthy => EventSeverity::Error,
            HealthStatus::Critical => EventSeverity::Critical,
        }
    }
}

/// Audited events
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    // ═══════════════════════════════════════════════════════════════════
    // DECISION EVENTS
    // ═══════════════════════════════════════════════════════════════════
    /// A validated request entered the pipeline
    RequestSubmitted { request: DecisionRequest },

    /// A request was rejected at construction
    ValidationFailed {
        decision_type: DecisionType,
        error: ValidationError,
    },

    /// The engine classified a request
    DecisionMade { result: DecisionResult },

    // ═══════════════════════════════════════════════════════════════════
    // GUARDIAN EVENTS
    // ═══════════════════════════════════════════════════════════════════
    /// Decision escalated to a guardian
    TicketOpened { ticket: GuardianTicket },

    /// SLA deadline passed without a response
    TicketExpired {
        ticket_id: TicketId,
        decision_id: DecisionId,
        priority: Priority,
        deadline: DateTime<Utc>,
    },

    /// A guardian resolved a ticket
    TicketResolved {
        ticket_id: TicketId,
        decision_id: DecisionId,
        guardian: GuardianId,
        previous_state: TicketState,
        state: TicketState,
        reasoning: String,
        /// Resolution of an already expired ticket
        late: bool,
    },

    // ═══════════════════════════════════════════════════════════════════
    // EXECUTION EVENTS
    // ═══════════════════════════════════════════════════════════════════
    /// An approved decision was executed
    ActionExecuted { outcome: ActionOutcome },

    // ═══════════════════════════════════════════════════════════════════
    // HEALING EVENTS
    // ═══════════════════════════════════════════════════════════════════
    /// An unhealthy snapshot was observed
    IncidentDetected {
        status: HealthStatus,
        metrics: BTreeMap<String, f64>,
        description: String,
    },

    /// Healing postponed until the cooldown or backoff elapses
    HealingDeferred {
        until: DateTime<Utc>,
        attempts: u32,
    },

    /// Attempt ceiling reached, escalated as a guardian override
    HealingEscalated {
        decision_id: DecisionId,
        attempts: u32,
    },

    /// A healing action failed or left the component unhealthy
    HealingAttemptFailed {
        decision_id: DecisionId,
        attempts: u32,
    },

    /// Successful healing cleared the attempt counter
    HealingReset { decision_id: DecisionId },

    // ═══════════════════════════════════════════════════════════════════
    // ROLLBACK EVENTS
    // ═══════════════════════════════════════════════════════════════════
    /// A rollback request was synthesized
    RollbackTriggered {
        decision_id: DecisionId,
        target: Revision,
        from: Option<Revision>,
        manual: bool,
    },

    /// Degradation seen while a rollback was already in flight
    RollbackIgnored { in_flight: DecisionId },

    /// Rollback needed but no target revision exists
    RollbackSkipped { reason: String },
}

impl AuditEvent {
    /// Default severity of the event
    pub fn severity(&self) -> EventSeverity {
        match self {
            AuditEvent::IncidentDetected { status, .. } => (*status).into(),

            AuditEvent::HealingEscalated { .. }
            | AuditEvent::RollbackTriggered { .. }
            | AuditEvent::RollbackSkipped { .. } => EventSeverity::Error,

            AuditEvent::ValidationFailed { .. }
            | AuditEvent::TicketExpired { .. }
            | AuditEvent::HealingAttemptFailed { .. }
            | AuditEvent::RollbackIgnored { .. } => EventSeverity::Warning,

            AuditEvent::ActionExecuted { outcome } if !outcome.success => EventSeverity::Error,

            AuditEvent::HealingDeferred { .. } => EventSeverity::Debug,

            _ => EventSeverity::Info,
        }
    }

    /// Short stable name, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::RequestSubmitted { .. } => "request_submitted",
            AuditEvent::ValidationFailed { .. } => "validation_failed",
            AuditEvent::DecisionMade { .. } => "decision_made",
            AuditEvent::TicketOpened { .. } => "ticket_opened",
            AuditEvent::TicketExpired { .. } => "ticket_expired",
            AuditEvent::TicketResolved { .. } => "ticket_resolved",
            AuditEvent::ActionExecuted { .. } => "action_executed",
            AuditEvent::IncidentDetected { .. } => "incident_detected",
            AuditEvent::HealingDeferred { .. } => "healing_deferred",
            AuditEvent::HealingEscalated { .. } => "healing_escalated",
            AuditEvent::HealingAttemptFailed { .. } => "healing_attempt_failed",
            AuditEvent::HealingReset { .. } => "healing_reset",
            AuditEvent::RollbackTriggered { .. } => "rollback_triggered",
            AuditEvent::RollbackIgnored { .. } => "rollback_ignored",
            AuditEvent::RollbackSkipped { .. } => "rollback_skipped",
        }
    }
}

/// One appended audit entry
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    /// Unique record ID
    pub id: Uuid,

    /// Position in this component's stream, starting at 1
    pub sequence: u64,

    pub component: ComponentId,

    pub timestamp: DateTime<Utc>,

    pub severity: EventSeverity,

    pub event: AuditEvent,
}

impl AuditRecord {
    pub fn new(component: ComponentId, sequence: u64, event: AuditEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence,
            component,
            timestamp: Utc::now(),
            severity: event.severity(),
            event,
        }
    }
}
