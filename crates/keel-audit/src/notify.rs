//! Fire-and-forget notifications
//!
//! The transport (chat, issue tracker, email) lives outside keel. A
//! [`Notifier`] failure is logged and never reaches the pipeline.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keel_types::ComponentId;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::NotifyError;

/// What the notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Escalation,
    Expiry,
    Rollback,
    Failure,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationKind::Escalation => "escalation",
            NotificationKind::Expiry => "expiry",
            NotificationKind::Rollback => "rollback",
            NotificationKind::Failure => "failure",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub component: ComponentId,
    pub summary: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(kind: NotificationKind, component: ComponentId, summary: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            component,
            summary: summary.into(),
            payload: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    /// Attach a serializable payload. Unserializable payloads become null.
    pub fn with_payload<T: Serialize>(mut self, payload: &T) -> Self {
        self.payload = serde_json::to_value(payload).unwrap_or(serde_json::Value::Null);
        self
    }
}

/// Outbound notification transport.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;

    fn name(&self) -> &str;
}

/// Hands notifications to a [`Notifier`] on a detached task.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Dispatcher that drops everything.
    pub fn disabled() -> Self {
        Self::new(Arc::new(NoOpNotifier))
    }

    /// Send without waiting. Outside a Tokio runtime the notification is
    /// dropped with a warning.
    pub fn dispatch(&self, notification: Notification) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(
                kind = %notification.kind,
                component = %notification.component,
                "No runtime available, notification dropped"
            );
            return;
        };

        let notifier = self.notifier.clone();
        handle.spawn(async move {
            match notifier.notify(&notification).await {
                Ok(()) => debug!(
                    notifier = notifier.name(),
                    kind = %notification.kind,
                    component = %notification.component,
                    "Notification delivered"
                ),
                Err(e) => warn!(
                    notifier = notifier.name(),
                    kind = %notification.kind,
                    component = %notification.component,
                    error = %e,
                    "Notification delivery failed"
                ),
            }
        });
    }
}

impl fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("notifier", &self.notifier.name())
            .finish()
    }
}

/// Discards notifications
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpNotifier;

#[async_trait]
impl Notifier for NoOpNotifier {
    async fn notify(&self, _notification: &Notification) -> Result<(), NotifyError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "noop"
    }
}

/// Collects notifications in memory (for testing)
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|n| n.kind == kind)
            .count()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Always fails (for testing)
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _notification: &Notification) -> Result<(), NotifyError> {
        Err(NotifyError::Delivery("transport unavailable".to_string()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}
