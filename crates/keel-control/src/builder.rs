//! Builder for ControlPlane

use std::sync::Arc;

use keel_audit::{AuditLog, AuditSink, MemoryAuditSink, NotificationDispatcher, Notifier};
use keel_health::MetricsSource;
use keel_types::DecisionIdAllocator;

use crate::config::ControlConfig;
use crate::control_plane::ControlPlane;
use crate::error::{ControlError, ControlResult};
use crate::executor::ActionExecutor;

/// Builder for constructing a ControlPlane with its collaborators
#[derive(Default)]
pub struct ControlPlaneBuilder {
    config: ControlConfig,
    executor: Option<Arc<dyn ActionExecutor>>,
    metrics_source: Option<Arc<dyn MetricsSource>>,
    audit_sink: Option<Arc<dyn AuditSink>>,
    notifier: Option<Arc<dyn Notifier>>,
    allocator: Option<Arc<DecisionIdAllocator>>,
}

impl ControlPlaneBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: ControlConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the action executor (required)
    pub fn with_executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Set the metrics source (required)
    pub fn with_metrics_source(mut self, source: Arc<dyn MetricsSource>) -> Self {
        self.metrics_source = Some(source);
        self
    }

    /// Set the audit sink. Defaults to an in-memory sink.
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    /// Set the notifier. Defaults to dropping notifications.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Use a dedicated id allocator instead of the process-wide one.
    pub fn with_allocator(mut self, allocator: Arc<DecisionIdAllocator>) -> Self {
        self.allocator = Some(allocator);
        self
    }

    pub fn build(self) -> ControlResult<ControlPlane> {
        let executor = self
            .executor
            .ok_or_else(|| ControlError::InvalidConfiguration("executor required".into()))?;
        let metrics_source = self
            .metrics_source
            .ok_or_else(|| ControlError::InvalidConfiguration("metrics_source required".into()))?;

        let audit_sink = self
            .audit_sink
            .unwrap_or_else(|| Arc::new(MemoryAuditSink::new()));
        let notifications = self
            .notifier
            .map(NotificationDispatcher::new)
            .unwrap_or_else(NotificationDispatcher::disabled);
        let allocator = self.allocator.unwrap_or_else(DecisionIdAllocator::global);

        Ok(ControlPlane::new(
            self.config,
            executor,
            metrics_source,
            Arc::new(AuditLog::new(audit_sink)),
            notifications,
            allocator,
        ))
    }
}
