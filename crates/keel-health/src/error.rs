//! Error types for health collection and healing.

use keel_types::{ComponentId, ValidationError};
use thiserror::Error;

/// Errors that can occur in health operations.
#[derive(Debug, Error)]
pub enum HealthError {
    /// Component is not registered with the collector.
    #[error("Component not registered: {0}")]
    ComponentNotFound(ComponentId),

    /// Component is already registered.
    #[error("Component already registered: {0}")]
    AlreadyRegistered(ComponentId),

    /// The metrics source failed.
    #[error("Metrics source error for {component}: {message}")]
    Source {
        component: ComponentId,
        message: String,
    },

    /// Every raw value in the sample was rejected.
    #[error("No valid signals for {0}")]
    NoValidSignals(ComponentId),

    /// Building a healing request failed.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Result type for health operations.
pub type HealthResult<T> = Result<T, HealthError>;
