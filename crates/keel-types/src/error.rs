//! Construction-time validation errors.

use serde::Serialize;
use thiserror::Error;

use crate::ids::DecisionId;

/// A malformed request or out-of-range signal, rejected before scoring.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum ValidationError {
    /// Request carries no parameters.
    #[error("decision request has no parameters")]
    EmptyParameters,

    /// Parameter name is blank.
    #[error("parameter name must not be empty")]
    EmptyParameterName,

    /// Two parameters share a name.
    #[error("duplicate parameter name: {0}")]
    DuplicateParameter(String),

    /// Weight is zero, negative or NaN.
    #[error("parameter {name} has non-positive weight {weight}")]
    NonPositiveWeight { name: String, weight: f64 },

    /// Observed value is NaN or infinite.
    #[error("parameter {name} has a non-finite observed value")]
    NonFiniteValue { name: String },

    /// Threshold is not a finite positive number.
    #[error("parameter {name} has invalid threshold {threshold}")]
    InvalidThreshold { name: String, threshold: f64 },

    /// The id was already issued during this process lifetime.
    #[error("decision id already issued: {0}")]
    DuplicateId(DecisionId),

    /// A raw signal fell outside its plausible range.
    #[error("signal {signal} value {value} outside [{min}, {max}]")]
    OutOfRange {
        signal: String,
        value: f64,
        min: f64,
        max: f64,
    },
}
