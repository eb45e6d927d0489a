//! Keel Types - shared vocabulary of the operations controller
//!
//! Keel decides whether to deploy, scale, heal or roll back a running
//! service. Every change is scored, gated, executed, observed and, when
//! post-action health degrades, reversed. This crate holds the records that
//! flow between the pipeline stages.
//!
//! ## Key Concepts
//!
//! - **DecisionRequest**: immutable, validated input to the decision engine
//! - **DecisionResult**: confidence + classification, produced once per request
//! - **GuardianTicket**: a decision waiting on a human Guardian
//! - **ActionOutcome**: what happened when an approved decision was executed
//! - **HealthSnapshot**: one normalized sample of live service signal
//! - **AuditRecord**: append-only trail of everything above

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod decision;
pub mod error;
pub mod events;
pub mod guardian;
pub mod health;
pub mod ids;
pub mod outcome;

pub use decision::{
    Classification, DecisionRequest, DecisionRequestBuilder, DecisionResult, DecisionType,
    Parameter, ParameterKind, ParameterScore, Priority,
};
pub use error::ValidationError;
pub use events::{AuditEvent, AuditRecord, EventSeverity};
pub use guardian::{GuardianAction, GuardianTicket, TicketState};
pub use health::{HealthSnapshot, HealthStatus, SignalKind};
pub use ids::{ComponentId, DecisionId, DecisionIdAllocator, GuardianId, Revision, TicketId};
pub use outcome::{ActionOutcome, PostActionHealth};
