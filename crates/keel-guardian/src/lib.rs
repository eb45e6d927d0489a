//! Keel Guardian - human escalation for low-confidence decisions
//!
//! ```text
//!             ┌──────────► Approved
//!    Open ────┼──────────► Rejected
//!      │      └──────────► Modified  (re-scored by the engine)
//!      │ SLA deadline
//!      ▼
//!   Expired ── late resolution ──► Approved / Rejected / Modified
//! ```
//!
//! SLA windows default to 15 minutes (Critical), 1 hour (High), 4 hours
//! (Medium) and 24 hours (Low). An expired ticket never executes on its
//! own.

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod workflow;

pub use config::{EscalationTiming, SlaConfig};
pub use error::{GuardianError, GuardianResult};
pub use workflow::{ApprovalStats, EscalationWorkflow, Resolution, TypeApprovalStats};
