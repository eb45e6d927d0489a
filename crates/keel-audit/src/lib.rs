//! Keel Audit - append-only trail and outbound notifications
//!
//! - [`AuditLog`] numbers records per component and forwards them to an
//!   [`AuditSink`]. The controller writes to it and never reads it back.
//! - [`NotificationDispatcher`] hands escalation, expiry, rollback and
//!   failure notices to a [`Notifier`] without waiting for delivery.

#![deny(unsafe_code)]

pub mod error;
pub mod log;
pub mod notify;
pub mod sink;

pub use error::{AuditError, AuditResult, NotifyError};
pub use log::AuditLog;
pub use notify::{
    FailingNotifier, MemoryNotifier, NoOpNotifier, Notification, NotificationDispatcher,
    NotificationKind, Notifier,
};
pub use sink::{AuditSink, JsonlAuditSink, MemoryAuditSink};
