//! Control plane event stream
//!
//! A live broadcast of what the pipeline is doing, for dashboards and
//! tests. The audit log remains the record of truth; "no subscribers" is
//! never an error here.

use chrono::{DateTime, Utc};
use keel_types::{
    Classification, ComponentId, DecisionId, DecisionType, EventSeverity, PostActionHealth,
    Revision, TicketId, TicketState,
};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Channel capacity for the event stream
const EVENT_CHANNEL_CAPACITY: usize = 4096;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlEvent {
    // ═══════════════════════════════════════════════════════════════════
    // Decision pipeline
    // ═══════════════════════════════════════════════════════════════════
    DecisionMade {
        decision_id: DecisionId,
        decision_type: DecisionType,
        classification: Classification,
        confidence: f64,
    },

    ActionExecuted {
        decision_id: DecisionId,
        success: bool,
        health: PostActionHealth,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Guardian
    // ═══════════════════════════════════════════════════════════════════
    TicketOpened {
        ticket_id: TicketId,
        decision_id: DecisionId,
    },

    TicketResolved {
        ticket_id: TicketId,
        state: TicketState,
        late: bool,
    },

    TicketExpired {
        ticket_id: TicketId,
        decision_id: DecisionId,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Feedback loops
    // ═══════════════════════════════════════════════════════════════════
    HealingEscalated { decision_id: DecisionId },

    RollbackRequested {
        decision_id: DecisionId,
        target: Option<Revision>,
    },
}

impl ControlEvent {
    pub fn severity(&self) -> EventSeverity {
        match self {
            ControlEvent::DecisionMade {
                classification: Classification::AutoRejected,
                ..
            } => EventSeverity::Warning,
            ControlEvent::ActionExecuted { success: false, .. } => EventSeverity::Error,
            ControlEvent::ActionExecuted {
                health: PostActionHealth::Degraded,
                ..
            } => EventSeverity::Warning,
            ControlEvent::TicketExpired { .. } => EventSeverity::Warning,
            ControlEvent::HealingEscalated { .. } | ControlEvent::RollbackRequested { .. } => {
                EventSeverity::Error
            }
            _ => EventSeverity::Info,
        }
    }
}

/// One event on the stream.
#[derive(Debug, Clone, Serialize)]
pub struct ControlEventEnvelope {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub component: ComponentId,
    pub severity: EventSeverity,
    pub event: ControlEvent,
}

/// Broadcasts control plane events.
#[derive(Debug, Clone)]
pub struct EventAggregator {
    tx: broadcast::Sender<ControlEventEnvelope>,
}

impl EventAggregator {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControlEventEnvelope> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn emit(&self, component: &ComponentId, event: ControlEvent) {
        let envelope = ControlEventEnvelope {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            component: component.clone(),
            severity: event.severity(),
            event,
        };
        let _ = self.tx.send(envelope);
    }
}

impl Default for EventAggregator {
    fn default() -> Self {
        Self::new()
    }
}
