//! Error types for rollback coordination

use keel_types::{ComponentId, DecisionId, ValidationError};
use thiserror::Error;

/// Rollback error type
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RollbackError {
    /// A rollback for the component has not reported back yet
    #[error("Rollback {in_flight} already in flight for {component}")]
    InFlight {
        component: ComponentId,
        in_flight: DecisionId,
    },

    #[error("Invalid rollback request: {0}")]
    Validation(#[from] ValidationError),
}

/// Result type for rollback operations
pub type RollbackResult<T> = Result<T, RollbackError>;
