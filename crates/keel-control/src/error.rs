//! Error types for the control plane

use keel_guardian::GuardianError;
use keel_health::HealthError;
use keel_rollback::RollbackError;
use keel_types::ValidationError;
use thiserror::Error;

/// Control plane error type
#[derive(Debug, Error)]
pub enum ControlError {
    /// Request rejected before scoring
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Guardian workflow error, including already-resolved tickets
    #[error("Guardian error: {0}")]
    Guardian(#[from] GuardianError),

    #[error("Health error: {0}")]
    Health(#[from] HealthError),

    #[error("Rollback error: {0}")]
    Rollback(#[from] RollbackError),

    /// Builder was missing a collaborator
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type for control plane operations
pub type ControlResult<T> = Result<T, ControlError>;
