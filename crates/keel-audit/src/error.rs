//! Error types for audit and notification delivery

use thiserror::Error;

/// Audit sink error type
#[derive(Debug, Error)]
pub enum AuditError {
    /// Underlying store could not be written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for audit operations
pub type AuditResult<T> = Result<T, AuditError>;

/// Notification delivery error
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Delivery failed: {0}")]
    Delivery(String),
}
