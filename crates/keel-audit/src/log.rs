//! Per-component ordered audit log

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use keel_types::{AuditEvent, AuditRecord, ComponentId};
use tracing::{debug, error};

use crate::sink::{AuditSink, MemoryAuditSink};

/// Assigns per-component sequence numbers and forwards records to a sink.
///
/// All events about one component reach the sink in the order they were
/// recorded. No ordering holds across components.
pub struct AuditLog {
    sink: Arc<dyn AuditSink>,
    sequences: DashMap<ComponentId, u64>,
    failed_appends: AtomicU64,
}

impl AuditLog {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            sink,
            sequences: DashMap::new(),
            failed_appends: AtomicU64::new(0),
        }
    }

    /// Log backed by a fresh [`MemoryAuditSink`], returned alongside it.
    pub fn in_memory() -> (Self, Arc<MemoryAuditSink>) {
        let sink = Arc::new(MemoryAuditSink::new());
        (Self::new(sink.clone()), sink)
    }

    /// Append an event for `component`.
    ///
    /// A sink failure is logged and counted but never fails the caller.
    pub fn record(&self, component: &ComponentId, event: AuditEvent) -> AuditRecord {
        let mut sequence = self.sequences.entry(component.clone()).or_insert(0);
        *sequence += 1;
        let record = AuditRecord::new(component.clone(), *sequence, event);

        match self.sink.append(&record) {
            Ok(()) => debug!(
                component = %component,
                sequence = record.sequence,
                event = record.event.kind(),
                "Audit record appended"
            ),
            Err(e) => {
                self.failed_appends.fetch_add(1, Ordering::Relaxed);
                error!(
                    component = %component,
                    sequence = record.sequence,
                    sink = self.sink.name(),
                    error = %e,
                    "Failed to append audit record"
                );
            }
        }

        record
    }

    /// Last sequence number issued for `component`.
    pub fn last_sequence(&self, component: &ComponentId) -> u64 {
        self.sequences.get(component).map(|s| *s).unwrap_or(0)
    }

    /// Appends the sink rejected since startup.
    pub fn failed_appends(&self) -> u64 {
        self.failed_appends.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("sink", &self.sink.name())
            .field("components", &self.sequences.len())
            .finish()
    }
}
