//! Keel Decision - confidence scoring and auto-approval
//!
//! The engine turns a [`DecisionRequest`](keel_types::DecisionRequest) into
//! a [`DecisionResult`](keel_types::DecisionResult):
//!
//! 1. every parameter is scored into [0, 1] ([`scoring`])
//! 2. confidence is the weighted mean, weights renormalized to sum to 1
//! 3. the result is classified against the [`DecisionPolicy`] tables
//!
//! ## Classification
//!
//! | Order | Condition | Result |
//! |---|---|---|
//! | 1 | type is `GuardianOverride` | `PendingGuardian` |
//! | 2 | confidence >= threshold and `(type, priority)` allowed | `AutoApproved` |
//! | 3 | confidence < threshold - reject margin | `AutoRejected` |
//! | 4 | otherwise | `PendingGuardian` |
//!
//! ## Example
//!
//! ```rust
//! use keel_decision::DecisionEngine;
//! use keel_types::{Classification, DecisionRequest, DecisionType, Parameter, Priority};
//!
//! let request = DecisionRequest::builder(DecisionType::Deployment, Priority::Medium, "api")
//!     .parameter(Parameter::gate("health_check", true, 0.4))
//!     .parameter(Parameter::higher_is_better("test_coverage", 0.85, 0.80, 0.3))
//!     .parameter(Parameter::gate("security_scan", true, 0.3))
//!     .build()
//!     .unwrap();
//!
//! let result = DecisionEngine::default().evaluate(&request);
//! assert_eq!(result.classification, Classification::AutoApproved);
//! ```

#![deny(unsafe_code)]

pub mod engine;
pub mod history;
pub mod policy;
pub mod scoring;

pub use engine::DecisionEngine;
pub use history::{ClassificationRates, DecisionHistory, DecisionMetrics, DEFAULT_HISTORY_CAPACITY};
pub use policy::{DecisionPolicy, TypePolicy};
