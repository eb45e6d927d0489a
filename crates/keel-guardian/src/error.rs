//! Error types for the escalation workflow

use keel_types::{DecisionId, TicketId, TicketState, ValidationError};
use thiserror::Error;

/// Guardian workflow error type
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GuardianError {
    /// Ticket already carries a guardian resolution
    #[error("Ticket {ticket_id} already resolved ({state})")]
    AlreadyResolved {
        ticket_id: TicketId,
        state: TicketState,
    },

    #[error("Ticket not found: {0}")]
    TicketNotFound(TicketId),

    /// Only `PendingGuardian` decisions get tickets
    #[error("Decision {0} was not escalated")]
    NotEscalated(DecisionId),

    /// A ticket already exists for the decision
    #[error("Decision {0} already has a ticket")]
    AlreadyEscalated(DecisionId),

    /// Modify carried no parameters
    #[error("Modify on ticket {0} carries no parameters")]
    MissingModification(TicketId),

    /// Re-scoring the modified request fell below the reject margin
    #[error("Modified decision for ticket {ticket_id} auto-rejected at confidence {confidence:.2}")]
    ModificationRejected { ticket_id: TicketId, confidence: f64 },

    /// Modified parameters failed validation
    #[error("Invalid modification: {0}")]
    Validation(#[from] ValidationError),
}

/// Result type for guardian operations
pub type GuardianResult<T> = Result<T, GuardianError>;
