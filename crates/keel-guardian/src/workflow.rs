//! Guardian escalation workflow
//!
//! Holds `PendingGuardian` decisions as tickets, runs their SLA clocks on
//! the monotonic clock, and applies guardian resolutions. Resolution of a
//! ticket is serialized through its map entry: of two concurrent callers,
//! the second receives [`GuardianError::AlreadyResolved`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use keel_audit::{AuditLog, Notification, NotificationDispatcher, NotificationKind};
use keel_decision::DecisionEngine;
use keel_types::{
    AuditEvent, Classification, DecisionId, DecisionIdAllocator, DecisionRequest, DecisionResult,
    DecisionType, GuardianAction, GuardianId, GuardianTicket, Parameter, TicketId, TicketState,
};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::{EscalationTiming, SlaConfig};
use crate::error::{GuardianError, GuardianResult};

struct TicketEntry {
    ticket: GuardianTicket,
    /// Request that produced the escalated decision; rebuilt on Modify.
    request: DecisionRequest,
    /// Monotonic SLA deadline. `None` once the timer fired or was cancelled.
    deadline: Option<Instant>,
    /// When the ticket last left `Open`, by expiry or resolution.
    settled_at: Option<Instant>,
}

/// Outcome of a successful [`EscalationWorkflow::resolve`].
#[derive(Debug, Clone)]
pub struct Resolution {
    pub ticket: GuardianTicket,
    /// The ticket had already expired.
    pub late: bool,
    /// Decision to hand to the executor: the original on Approve, the
    /// re-scored replacement on Modify, nothing on Reject.
    pub execute: Option<DecisionResult>,
    /// Request behind `execute`.
    pub request: Option<DecisionRequest>,
}

/// Counts per decision type.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TypeApprovalStats {
    pub approved: usize,
    pub rejected: usize,
    pub modified: usize,
}

/// Guardian response statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApprovalStats {
    pub total: usize,
    pub open: usize,
    pub expired: usize,
    pub approved: usize,
    pub rejected: usize,
    pub modified: usize,
    pub late_resolutions: usize,
    /// (approved + modified) / resolved
    pub approval_rate: f64,
    pub by_type: BTreeMap<DecisionType, TypeApprovalStats>,
}

/// Escalation workflow
pub struct EscalationWorkflow {
    config: SlaConfig,
    engine: Arc<DecisionEngine>,
    allocator: Arc<DecisionIdAllocator>,
    audit: Arc<AuditLog>,
    notifications: NotificationDispatcher,
    tickets: DashMap<TicketId, TicketEntry>,
    by_decision: DashMap<DecisionId, TicketId>,
}

impl EscalationWorkflow {
    pub fn new(
        config: SlaConfig,
        engine: Arc<DecisionEngine>,
        allocator: Arc<DecisionIdAllocator>,
        audit: Arc<AuditLog>,
        notifications: NotificationDispatcher,
    ) -> Self {
        Self {
            config,
            engine,
            allocator,
            audit,
            notifications,
            tickets: DashMap::new(),
            by_decision: DashMap::new(),
        }
    }

    pub fn config(&self) -> &SlaConfig {
        &self.config
    }

    /// Open a ticket for an escalated decision and notify guardians.
    #[instrument(skip(self, request, decision), fields(decision_id = %decision.decision_id))]
    pub fn open(
        &self,
        request: DecisionRequest,
        decision: DecisionResult,
    ) -> GuardianResult<GuardianTicket> {
        if decision.classification != Classification::PendingGuardian {
            return Err(GuardianError::NotEscalated(decision.decision_id));
        }

        let window = self.config.window(decision.priority);
        let mut ticket = GuardianTicket::open(decision, Utc::now());
        ticket.sla_deadline =
            ticket.created_at + chrono::Duration::seconds(window.as_secs() as i64);
        let ticket_id = ticket.id;

        match self.by_decision.entry(ticket.decision_id().clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(GuardianError::AlreadyEscalated(ticket.decision_id().clone()));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(ticket_id);
            }
        }

        self.tickets.insert(
            ticket_id,
            TicketEntry {
                ticket: ticket.clone(),
                request,
                deadline: Some(Instant::now() + window),
                settled_at: None,
            },
        );

        self.audit.record(
            &ticket.decision.component,
            AuditEvent::TicketOpened {
                ticket: ticket.clone(),
            },
        );

        let timing = EscalationTiming::for_priority(ticket.decision.priority);
        self.notifications.dispatch(
            Notification::new(
                NotificationKind::Escalation,
                ticket.decision.component.clone(),
                format!(
                    "Guardian approval needed: {} ({} priority, confidence {:.2})",
                    ticket.decision.decision_type, ticket.decision.priority, ticket.decision.confidence
                ),
            )
            .with_payload(&serde_json::json!({
                "ticket": &ticket,
                "timing": timing,
            })),
        );

        info!(
            ticket_id = %ticket_id,
            priority = %ticket.decision.priority,
            sla_deadline = %ticket.sla_deadline,
            "Guardian ticket opened"
        );

        Ok(ticket)
    }

    /// Apply a guardian's response.
    ///
    /// Accepted on `Open` tickets and, once, on `Expired` tickets as a late
    /// correction. Approve hands the original decision to execution, Modify
    /// re-scores a rebuilt request and hands over the replacement unless
    /// the engine auto-rejects it, Reject executes nothing.
    ///
    /// A replacement scored `PendingGuardian` executes under this ticket's
    /// approval; no second ticket is opened for it.
    #[instrument(skip(self, action, reasoning), fields(ticket_id = %ticket_id, guardian = %guardian, action = action.label()))]
    pub fn resolve(
        &self,
        ticket_id: TicketId,
        action: GuardianAction,
        reasoning: impl Into<String>,
        guardian: GuardianId,
    ) -> GuardianResult<Resolution> {
        let reasoning = reasoning.into();
        let mut entry = self
            .tickets
            .get_mut(&ticket_id)
            .ok_or(GuardianError::TicketNotFound(ticket_id))?;

        let previous_state = entry.ticket.state;
        if !previous_state.accepts_resolution() {
            warn!(state = %previous_state, "Resolution attempt on resolved ticket");
            return Err(GuardianError::AlreadyResolved {
                ticket_id,
                state: previous_state,
            });
        }

        let (execute, request) = match &action {
            GuardianAction::Approve => (
                Some(entry.ticket.decision.clone()),
                Some(entry.request.clone()),
            ),
            GuardianAction::Reject => (None, None),
            GuardianAction::Modify { parameters } => {
                let (request, replacement) = self.rescore(ticket_id, &entry.request, parameters)?;
                entry.ticket.replacement_decision = Some(replacement.clone());
                (Some(replacement), Some(request))
            }
        };

        let late = previous_state == TicketState::Expired;
        entry.deadline = None;
        entry.settled_at = Some(Instant::now());
        entry.ticket.state = action.target_state();
        entry.ticket.assigned_guardian = Some(guardian.clone());
        entry.ticket.resolution_reasoning = Some(reasoning.clone());
        entry.ticket.resolved_at = Some(Utc::now());

        let ticket = entry.ticket.clone();
        self.audit.record(
            &ticket.decision.component,
            AuditEvent::TicketResolved {
                ticket_id,
                decision_id: ticket.decision_id().clone(),
                guardian,
                previous_state,
                state: ticket.state,
                reasoning,
                late,
            },
        );
        drop(entry);

        if late {
            warn!(state = %ticket.state, "Expired ticket resolved late");
        } else {
            info!(state = %ticket.state, "Guardian ticket resolved");
        }

        Ok(Resolution {
            ticket,
            late,
            execute,
            request,
        })
    }

    /// Rebuild the request with the guardian's parameters and score it.
    fn rescore(
        &self,
        ticket_id: TicketId,
        original: &DecisionRequest,
        modified: &[Parameter],
    ) -> GuardianResult<(DecisionRequest, DecisionResult)> {
        if modified.is_empty() {
            return Err(GuardianError::MissingModification(ticket_id));
        }

        let mut merged: Vec<Parameter> = original.parameters().to_vec();
        for parameter in modified {
            match merged.iter_mut().find(|p| p.name == parameter.name) {
                Some(existing) => *existing = parameter.clone(),
                None => merged.push(parameter.clone()),
            }
        }

        let request = original
            .rebuild()
            .source("guardian_modification")
            .parameters(merged)
            .build_with(&self.allocator)?;
        let replacement = self.engine.evaluate(&request);

        self.audit.record(
            request.component(),
            AuditEvent::RequestSubmitted {
                request: request.clone(),
            },
        );
        self.audit.record(
            request.component(),
            AuditEvent::DecisionMade {
                result: replacement.clone(),
            },
        );

        // PendingGuardian replacements proceed under the parent ticket
        if replacement.classification == Classification::AutoRejected {
            return Err(GuardianError::ModificationRejected {
                ticket_id,
                confidence: replacement.confidence,
            });
        }

        debug!(
            replacement_id = %replacement.decision_id,
            confidence = replacement.confidence,
            "Modified decision re-scored"
        );
        Ok((request, replacement))
    }

    /// Expire every open ticket whose deadline is at or before `now`.
    ///
    /// Expiry never executes the underlying decision.
    pub fn expire_overdue(&self, now: Instant) -> Vec<GuardianTicket> {
        let mut expired = Vec::new();

        for mut entry in self.tickets.iter_mut() {
            let overdue = entry.ticket.state == TicketState::Open
                && entry.deadline.is_some_and(|deadline| deadline <= now);
            if !overdue {
                continue;
            }

            entry.deadline = None;
            entry.settled_at = Some(now);
            entry.ticket.state = TicketState::Expired;
            entry.ticket.expired_at = Some(Utc::now());
            let ticket = entry.ticket.clone();

            self.audit.record(
                &ticket.decision.component,
                AuditEvent::TicketExpired {
                    ticket_id: ticket.id,
                    decision_id: ticket.decision_id().clone(),
                    priority: ticket.decision.priority,
                    deadline: ticket.sla_deadline,
                },
            );
            expired.push(ticket);
        }

        for ticket in &expired {
            warn!(
                ticket_id = %ticket.id,
                decision_id = %ticket.decision_id(),
                priority = %ticket.decision.priority,
                "Guardian ticket expired without response"
            );
            self.notifications.dispatch(
                Notification::new(
                    NotificationKind::Expiry,
                    ticket.decision.component.clone(),
                    format!(
                        "No guardian response for {} within {} SLA; not executed",
                        ticket.decision.decision_type, ticket.decision.priority
                    ),
                )
                .with_payload(ticket),
            );
        }

        expired
    }

    /// Drop tickets settled at least the retention window before `now`.
    /// Open tickets are never pruned. Stats only count retained tickets.
    pub fn prune_settled(&self, now: Instant) -> usize {
        let retention = self.config.retention();
        let mut pruned = Vec::new();
        self.tickets.retain(|_, entry| {
            let stale = entry
                .settled_at
                .is_some_and(|settled| settled + retention <= now);
            if stale {
                pruned.push(entry.ticket.decision_id().clone());
            }
            !stale
        });

        for decision_id in &pruned {
            self.by_decision.remove(decision_id);
        }
        if !pruned.is_empty() {
            debug!(count = pruned.len(), "Pruned settled guardian tickets");
        }
        pruned.len()
    }

    pub fn ticket(&self, ticket_id: &TicketId) -> Option<GuardianTicket> {
        self.tickets.get(ticket_id).map(|e| e.ticket.clone())
    }

    pub fn ticket_for_decision(&self, decision_id: &DecisionId) -> Option<GuardianTicket> {
        let ticket_id = *self.by_decision.get(decision_id)?;
        self.ticket(&ticket_id)
    }

    /// Open tickets, nearest deadline first.
    pub fn open_tickets(&self) -> Vec<GuardianTicket> {
        let mut open: Vec<GuardianTicket> = self
            .tickets
            .iter()
            .filter(|e| e.ticket.state == TicketState::Open)
            .map(|e| e.ticket.clone())
            .collect();
        open.sort_by_key(|t| t.sla_deadline);
        open
    }

    pub fn tickets_in_state(&self, state: TicketState) -> Vec<GuardianTicket> {
        self.tickets
            .iter()
            .filter(|e| e.ticket.state == state)
            .map(|e| e.ticket.clone())
            .collect()
    }

    /// Number of tickets with a live SLA timer.
    pub fn armed_timers(&self) -> usize {
        self.tickets.iter().filter(|e| e.deadline.is_some()).count()
    }

    pub fn stats(&self) -> ApprovalStats {
        let mut stats = ApprovalStats::default();
        let mut by_type: HashMap<DecisionType, TypeApprovalStats> = HashMap::new();

        for entry in self.tickets.iter() {
            let ticket = &entry.ticket;
            stats.total += 1;
            if ticket.resolved_late() {
                stats.late_resolutions += 1;
            }

            let per_type = by_type.entry(ticket.decision.decision_type).or_default();
            match ticket.state {
                TicketState::Open => stats.open += 1,
                TicketState::Expired => stats.expired += 1,
                TicketState::Approved => {
                    stats.approved += 1;
                    per_type.approved += 1;
                }
                TicketState::Rejected => {
                    stats.rejected += 1;
                    per_type.rejected += 1;
                }
                TicketState::Modified => {
                    stats.modified += 1;
                    per_type.modified += 1;
                }
            }
        }

        let resolved = stats.approved + stats.rejected + stats.modified;
        if resolved > 0 {
            stats.approval_rate = (stats.approved + stats.modified) as f64 / resolved as f64;
        }
        stats.by_type = by_type.into_iter().collect();
        stats
    }
}

impl std::fmt::Debug for EscalationWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscalationWorkflow")
            .field("config", &self.config)
            .field("tickets", &self.tickets.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_audit::{MemoryAuditSink, MemoryNotifier};
    use keel_types::{Parameter, Priority};
    use std::time::Duration;

    struct Harness {
        workflow: Arc<EscalationWorkflow>,
        allocator: Arc<DecisionIdAllocator>,
        sink: Arc<MemoryAuditSink>,
        notifier: Arc<MemoryNotifier>,
    }

    fn harness() -> Harness {
        let (audit, sink) = AuditLog::in_memory();
        let notifier = Arc::new(MemoryNotifier::new());
        let allocator = Arc::new(DecisionIdAllocator::new());
        let workflow = Arc::new(EscalationWorkflow::new(
            SlaConfig::default(),
            Arc::new(DecisionEngine::default()),
            allocator.clone(),
            Arc::new(audit),
            NotificationDispatcher::new(notifier.clone()),
        ));
        Harness {
            workflow,
            allocator,
            sink,
            notifier,
        }
    }

    impl Harness {
        /// Deployment with weak coverage: scores 0.775, escalated.
        fn escalate(&self, priority: Priority) -> GuardianTicket {
            let request = DecisionRequest::builder(DecisionType::Deployment, priority, "api")
                .parameter(Parameter::gate("health_check", true, 0.4))
                .parameter(Parameter::higher_is_better("test_coverage", 0.20, 0.80, 0.3))
                .parameter(Parameter::gate("security_scan", true, 0.3))
                .build_with(&self.allocator)
                .unwrap();
            let decision = DecisionEngine::default().evaluate(&request);
            assert_eq!(decision.classification, Classification::PendingGuardian);
            self.workflow.open(request, decision).unwrap()
        }
    }

    fn guardian() -> GuardianId {
        GuardianId::new("ops-lead")
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_sets_deadline_and_notifies() {
        let h = harness();
        let ticket = h.escalate(Priority::High);

        assert_eq!(ticket.state, TicketState::Open);
        assert_eq!(
            ticket.sla_deadline - ticket.created_at,
            chrono::Duration::hours(1)
        );
        assert_eq!(h.workflow.armed_timers(), 1);

        settle().await;
        let sent = h.notifier.notifications();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, NotificationKind::Escalation);
        assert_eq!(sent[0].payload["timing"], "immediate");
    }

    #[tokio::test]
    async fn test_open_rejects_non_escalated() {
        let h = harness();
        let request = DecisionRequest::builder(DecisionType::Scaling, Priority::Low, "api")
            .parameter(Parameter::gate("capacity", true, 1.0))
            .build_with(&h.allocator)
            .unwrap();
        let decision = DecisionEngine::default().evaluate(&request);

        assert!(matches!(
            h.workflow.open(request, decision),
            Err(GuardianError::NotEscalated(_))
        ));
    }

    #[tokio::test]
    async fn test_approve_returns_original_decision() {
        let h = harness();
        let ticket = h.escalate(Priority::Medium);

        let resolution = h
            .workflow
            .resolve(ticket.id, GuardianAction::Approve, "looks fine", guardian())
            .unwrap();

        assert_eq!(resolution.ticket.state, TicketState::Approved);
        assert!(!resolution.late);
        assert_eq!(
            resolution.execute.unwrap().decision_id,
            ticket.decision.decision_id
        );
        assert_eq!(h.workflow.armed_timers(), 0);
    }

    #[tokio::test]
    async fn test_reject_executes_nothing() {
        let h = harness();
        let ticket = h.escalate(Priority::Medium);

        let resolution = h
            .workflow
            .resolve(ticket.id, GuardianAction::Reject, "not today", guardian())
            .unwrap();
        assert_eq!(resolution.ticket.state, TicketState::Rejected);
        assert!(resolution.execute.is_none());
    }

    #[tokio::test]
    async fn test_second_resolution_is_already_resolved() {
        let h = harness();
        let ticket = h.escalate(Priority::Medium);

        h.workflow
            .resolve(ticket.id, GuardianAction::Approve, "ok", guardian())
            .unwrap();
        let second = h
            .workflow
            .resolve(ticket.id, GuardianAction::Reject, "no", guardian());

        assert_eq!(
            second.unwrap_err(),
            GuardianError::AlreadyResolved {
                ticket_id: ticket.id,
                state: TicketState::Approved,
            }
        );
        assert_eq!(
            h.workflow.ticket(&ticket.id).unwrap().state,
            TicketState::Approved
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_resolution_has_one_winner() {
        let h = harness();
        let ticket = h.escalate(Priority::Medium);

        let attempts: Vec<_> = (0..8)
            .map(|i| {
                let workflow = h.workflow.clone();
                tokio::spawn(async move {
                    workflow.resolve(
                        ticket.id,
                        GuardianAction::Approve,
                        format!("attempt {i}"),
                        GuardianId::new(format!("guardian-{i}")),
                    )
                })
            })
            .collect();

        let mut winners = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => winners += 1,
                Err(GuardianError::AlreadyResolved { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_modify_rescores_through_engine() {
        let h = harness();
        let ticket = h.escalate(Priority::Medium);

        let resolution = h
            .workflow
            .resolve(
                ticket.id,
                GuardianAction::Modify {
                    parameters: vec![Parameter::higher_is_better(
                        "test_coverage",
                        0.82,
                        0.80,
                        0.3,
                    )],
                },
                "coverage re-measured",
                guardian(),
            )
            .unwrap();

        let replacement = resolution.execute.unwrap();
        assert_ne!(replacement.decision_id, ticket.decision.decision_id);
        assert_eq!(replacement.classification, Classification::AutoApproved);
        assert!((replacement.confidence - 1.0).abs() < 1e-9);
        assert_eq!(resolution.ticket.state, TicketState::Modified);
        assert_eq!(
            resolution.ticket.replacement_decision.unwrap().decision_id,
            replacement.decision_id
        );
        assert_eq!(
            resolution.request.unwrap().source(),
            "guardian_modification"
        );
    }

    #[tokio::test]
    async fn test_modify_that_scores_reject_leaves_ticket_open() {
        let h = harness();
        let ticket = h.escalate(Priority::Medium);

        let result = h.workflow.resolve(
            ticket.id,
            GuardianAction::Modify {
                parameters: vec![
                    Parameter::gate("health_check", false, 0.4),
                    Parameter::gate("security_scan", false, 0.3),
                ],
            },
            "force it",
            guardian(),
        );

        assert!(matches!(
            result,
            Err(GuardianError::ModificationRejected { .. })
        ));
        assert_eq!(h.workflow.ticket(&ticket.id).unwrap().state, TicketState::Open);
    }

    #[tokio::test]
    async fn test_empty_modify_is_refused() {
        let h = harness();
        let ticket = h.escalate(Priority::Medium);

        let result = h.workflow.resolve(
            ticket.id,
            GuardianAction::Modify { parameters: vec![] },
            "",
            guardian(),
        );
        assert_eq!(
            result.unwrap_err(),
            GuardianError::MissingModification(ticket.id)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_settled_keeps_open_tickets() {
        let h = harness();
        let resolved = h.escalate(Priority::Medium);
        let expired = h.escalate(Priority::Critical);
        let open = h.escalate(Priority::Low);

        h.workflow
            .resolve(resolved.id, GuardianAction::Reject, "no", guardian())
            .unwrap();
        tokio::time::advance(Duration::from_secs(15 * 60)).await;
        assert_eq!(h.workflow.expire_overdue(Instant::now()).len(), 1);

        // Inside the retention window nothing goes
        assert_eq!(h.workflow.prune_settled(Instant::now()), 0);

        tokio::time::advance(h.workflow.config().retention()).await;
        assert_eq!(h.workflow.prune_settled(Instant::now()), 2);
        assert!(h.workflow.ticket(&resolved.id).is_none());
        assert!(h.workflow.ticket(&expired.id).is_none());
        assert!(h.workflow.ticket_for_decision(expired.decision_id()).is_none());
        assert!(matches!(
            h.workflow
                .resolve(expired.id, GuardianAction::Approve, "too late", guardian()),
            Err(GuardianError::TicketNotFound(_))
        ));

        // Overdue but never swept, so still open and retained
        assert_eq!(h.workflow.ticket(&open.id).unwrap().state, TicketState::Open);
        assert_eq!(h.workflow.stats().total, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_after_sla_and_late_resolution() {
        let h = harness();
        let ticket = h.escalate(Priority::High);

        tokio::time::advance(Duration::from_secs(59 * 60)).await;
        assert!(h.workflow.expire_overdue(Instant::now()).is_empty());

        tokio::time::advance(Duration::from_secs(2 * 60)).await;
        let expired = h.workflow.expire_overdue(Instant::now());
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].state, TicketState::Expired);
        assert!(h.workflow.open_tickets().is_empty());
        assert_eq!(h.workflow.tickets_in_state(TicketState::Expired).len(), 1);

        tokio::time::advance(Duration::from_secs(10 * 60)).await;
        let resolution = h
            .workflow
            .resolve(ticket.id, GuardianAction::Approve, "late but fine", guardian())
            .unwrap();
        assert!(resolution.late);
        assert!(resolution.execute.is_some());
        assert!(resolution.ticket.resolved_late());

        let late_again =
            h.workflow
                .resolve(ticket.id, GuardianAction::Reject, "changed mind", guardian());
        assert!(matches!(
            late_again,
            Err(GuardianError::AlreadyResolved { .. })
        ));

        settle().await;
        assert_eq!(h.notifier.count(NotificationKind::Expiry), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolved_ticket_never_expires() {
        let h = harness();
        let ticket = h.escalate(Priority::Critical);
        h.workflow
            .resolve(ticket.id, GuardianAction::Reject, "no", guardian())
            .unwrap();

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert!(h.workflow.expire_overdue(Instant::now()).is_empty());
        assert_eq!(
            h.workflow.ticket(&ticket.id).unwrap().state,
            TicketState::Rejected
        );
    }

    #[tokio::test]
    async fn test_queries_and_stats() {
        let h = harness();
        let low = h.escalate(Priority::Low);
        let critical = h.escalate(Priority::Critical);
        let medium = h.escalate(Priority::Medium);

        let open = h.workflow.open_tickets();
        assert_eq!(open.len(), 3);
        assert_eq!(open[0].id, critical.id);
        assert_eq!(open[2].id, low.id);

        assert_eq!(
            h.workflow
                .ticket_for_decision(&medium.decision.decision_id)
                .unwrap()
                .id,
            medium.id
        );

        h.workflow
            .resolve(low.id, GuardianAction::Approve, "ok", guardian())
            .unwrap();
        h.workflow
            .resolve(medium.id, GuardianAction::Reject, "no", guardian())
            .unwrap();

        let stats = h.workflow.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.open, 1);
        assert_eq!(stats.approved, 1);
        assert_eq!(stats.rejected, 1);
        assert!((stats.approval_rate - 0.5).abs() < 1e-9);
        assert_eq!(stats.by_type[&DecisionType::Deployment].approved, 1);
    }

    #[tokio::test]
    async fn test_resolution_is_audited() {
        let h = harness();
        let ticket = h.escalate(Priority::Medium);
        h.workflow
            .resolve(ticket.id, GuardianAction::Approve, "ok", guardian())
            .unwrap();

        let kinds: Vec<_> = h
            .sink
            .records()
            .iter()
            .map(|r| r.event.kind())
            .collect();
        assert_eq!(kinds, vec!["ticket_opened", "ticket_resolved"]);
    }
}
