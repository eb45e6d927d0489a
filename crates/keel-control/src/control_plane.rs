//! Control plane
//!
//! Wires the pipeline together:
//!
//! ```text
//! SignalCollector ─► SelfHealingController ─┐
//!        │                                  ▼
//!        └────────► RollbackCoordinator ─► DecisionEngine ─► { IdempotentExecutor
//!                          ▲                                 | EscalationWorkflow ─► IdempotentExecutor }
//!                          └──────────── ActionOutcome ◄─────────────┘
//! ```
//!
//! Every arrow also writes to the audit log. Requests raised by the
//! feedback loops while handling a submission are processed in the same
//! call and reported as follow-ups.

use std::collections::VecDeque;
use std::sync::Arc;

use keel_audit::{AuditLog, NotificationDispatcher};
use keel_decision::{DecisionEngine, DecisionHistory, DecisionMetrics};
use keel_guardian::{ApprovalStats, EscalationWorkflow};
use keel_health::{
    CollectorStatus, HealingContext, HealingPlan, MetricsSource, SelfHealingController,
    SignalCollector,
};
use keel_rollback::{RollbackCoordinator, RollbackStatus};
use keel_types::{
    ActionOutcome, AuditEvent, Classification, ComponentId, DecisionId, DecisionIdAllocator,
    DecisionRequest, DecisionRequestBuilder, DecisionResult, DecisionType, GuardianAction,
    GuardianId, GuardianTicket, HealthSnapshot, Revision, TicketId,
};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::config::ControlConfig;
use crate::error::ControlResult;
use crate::events::{ControlEvent, ControlEventEnvelope, EventAggregator};
use crate::executor::{ActionExecutor, IdempotentExecutor};

/// What happened to a submitted request.
#[derive(Debug, Clone)]
pub struct Submission {
    pub result: DecisionResult,
    /// Set when the decision was escalated
    pub ticket: Option<GuardianTicket>,
    /// Set when the decision was auto-approved and executed
    pub outcome: Option<ActionOutcome>,
    /// Requests raised by feedback loops while handling this one
    pub follow_ups: Vec<Submission>,
}

impl Submission {
    fn new(result: DecisionResult) -> Self {
        Self {
            result,
            ticket: None,
            outcome: None,
            follow_ups: Vec::new(),
        }
    }
}

/// What happened after a guardian resolution.
#[derive(Debug, Clone)]
pub struct TicketResolution {
    pub ticket: GuardianTicket,
    pub late: bool,
    /// Outcome of the approved or modified decision
    pub outcome: Option<ActionOutcome>,
    pub follow_ups: Vec<Submission>,
}

/// Point-in-time summary across subsystems.
#[derive(Debug, Clone, Serialize)]
pub struct ControlStatus {
    pub decisions: DecisionMetrics,
    pub approvals: ApprovalStats,
    pub collector: CollectorStatus,
    pub open_tickets: usize,
    pub executed_actions: usize,
    pub deferred_healing: usize,
    pub audit_failures: u64,
}

/// Autonomous operations control plane
pub struct ControlPlane {
    config: ControlConfig,
    engine: Arc<DecisionEngine>,
    allocator: Arc<DecisionIdAllocator>,
    audit: Arc<AuditLog>,
    history: DecisionHistory,
    guardian: EscalationWorkflow,
    collector: Arc<SignalCollector>,
    healing: SelfHealingController,
    rollback: RollbackCoordinator,
    executor: IdempotentExecutor,
    events: EventAggregator,
}

impl ControlPlane {
    pub fn new(
        config: ControlConfig,
        executor: Arc<dyn ActionExecutor>,
        source: Arc<dyn MetricsSource>,
        audit: Arc<AuditLog>,
        notifications: NotificationDispatcher,
        allocator: Arc<DecisionIdAllocator>,
    ) -> Self {
        let engine = Arc::new(DecisionEngine::new(config.policy.clone()));

        let guardian = EscalationWorkflow::new(
            config.sla.clone(),
            engine.clone(),
            allocator.clone(),
            audit.clone(),
            notifications.clone(),
        );

        let collector = Arc::new(SignalCollector::new(config.collector.clone(), source));

        let healing = SelfHealingController::new(
            config.healing.clone(),
            config.collector.thresholds.clone(),
            allocator.clone(),
            audit.clone(),
        );

        let rollback = RollbackCoordinator::new(
            config.rollback.clone(),
            allocator.clone(),
            audit.clone(),
            notifications,
        );

        Self {
            history: DecisionHistory::new(config.loops.history_capacity),
            config,
            engine,
            allocator,
            audit,
            guardian,
            collector,
            healing,
            rollback,
            executor: IdempotentExecutor::new(executor),
            events: EventAggregator::new(),
        }
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    // ========== Decision Pipeline ==========

    /// Build, validate and submit a request. Validation failures are
    /// audited and returned to the caller.
    pub async fn request(&self, builder: DecisionRequestBuilder) -> ControlResult<Submission> {
        let component = builder.component().clone();
        let decision_type = builder.decision_type();

        match builder.build_with(&self.allocator) {
            Ok(request) => self.submit(request).await,
            Err(error) => {
                warn!(component = %component, decision_type = %decision_type, error = %error, "Request failed validation");
                self.audit.record(
                    &component,
                    AuditEvent::ValidationFailed {
                        decision_type,
                        error: error.clone(),
                    },
                );
                Err(error.into())
            }
        }
    }

    /// Evaluate a request, then execute it or escalate it. Each decision id
    /// is accepted once; resubmitting one fails with `DuplicateId`.
    pub async fn submit(&self, request: DecisionRequest) -> ControlResult<Submission> {
        let (mut submission, raised) = self.process(request).await?;
        submission.follow_ups = self.drain(raised).await;
        Ok(submission)
    }

    #[instrument(
        skip(self, request),
        fields(
            decision_id = %request.id(),
            decision_type = %request.decision_type(),
            component = %request.component(),
        )
    )]
    async fn process(
        &self,
        request: DecisionRequest,
    ) -> ControlResult<(Submission, Vec<DecisionRequest>)> {
        let component = request.component().clone();
        if let Err(error) = self.allocator.claim(request.id()) {
            warn!(error = %error, "Request id already submitted");
            self.audit.record(
                &component,
                AuditEvent::ValidationFailed {
                    decision_type: request.decision_type(),
                    error: error.clone(),
                },
            );
            return Err(error.into());
        }

        self.audit.record(
            &component,
            AuditEvent::RequestSubmitted {
                request: request.clone(),
            },
        );

        let result = self.engine.evaluate(&request);
        self.history.record(result.clone());
        self.audit.record(
            &component,
            AuditEvent::DecisionMade {
                result: result.clone(),
            },
        );
        self.events.emit(
            &component,
            ControlEvent::DecisionMade {
                decision_id: result.decision_id.clone(),
                decision_type: result.decision_type,
                classification: result.classification,
                confidence: result.confidence,
            },
        );
        info!(
            classification = %result.classification,
            confidence = result.confidence,
            "Decision made"
        );

        let mut submission = Submission::new(result.clone());
        let mut raised = Vec::new();

        match result.classification {
            Classification::AutoApproved => {
                let (outcome, more) = self.execute(&result).await;
                submission.outcome = Some(outcome);
                raised = more;
            }
            Classification::PendingGuardian => {
                let decision_id = result.decision_id.clone();
                match self.guardian.open(request, result) {
                    Ok(ticket) => {
                        self.events.emit(
                            &component,
                            ControlEvent::TicketOpened {
                                ticket_id: ticket.id,
                                decision_id,
                            },
                        );
                        submission.ticket = Some(ticket);
                    }
                    Err(e) => {
                        self.release_guards(&component, &decision_id, Instant::now());
                        return Err(e.into());
                    }
                }
            }
            Classification::AutoRejected => {
                self.release_guards(&component, &result.decision_id, Instant::now());
            }
        }

        Ok((submission, raised))
    }

    /// Process feedback-loop requests until none remain.
    async fn drain(&self, raised: Vec<DecisionRequest>) -> Vec<Submission> {
        let mut queue: VecDeque<DecisionRequest> = raised.into();
        let mut submissions = Vec::new();

        while let Some(request) = queue.pop_front() {
            let decision_id = request.id().clone();
            match self.process(request).await {
                Ok((submission, more)) => {
                    queue.extend(more);
                    submissions.push(submission);
                }
                Err(e) => {
                    warn!(decision_id = %decision_id, error = %e, "Follow-up request failed");
                }
            }
        }
        submissions
    }

    /// Execute once and route the outcome into the feedback loops.
    async fn execute(&self, decision: &DecisionResult) -> (ActionOutcome, Vec<DecisionRequest>) {
        let (outcome, fresh) = self.executor.execute(decision).await;
        if !fresh {
            return (outcome, Vec::new());
        }

        self.audit.record(
            &outcome.component,
            AuditEvent::ActionExecuted {
                outcome: outcome.clone(),
            },
        );
        self.events.emit(
            &outcome.component,
            ControlEvent::ActionExecuted {
                decision_id: outcome.decision_id.clone(),
                success: outcome.success,
                health: outcome.post_action_health,
            },
        );
        if outcome.success {
            info!(health = ?outcome.post_action_health, "Action executed");
        } else {
            warn!(error = outcome.error_detail.as_deref().unwrap_or(""), "Action failed");
        }

        let raised = self.feed_back(&outcome);
        (outcome, raised)
    }

    fn feed_back(&self, outcome: &ActionOutcome) -> Vec<DecisionRequest> {
        match outcome.decision_type {
            DecisionType::Healing | DecisionType::GuardianOverride => {
                self.healing.record_outcome(outcome, Instant::now());
                Vec::new()
            }
            DecisionType::Deployment => match self.rollback.record_deployment(outcome) {
                Ok(Some(request)) => vec![self.rollback_requested(request)],
                Ok(None) => Vec::new(),
                Err(e) => {
                    warn!(component = %outcome.component, error = %e, "Could not track deployment");
                    Vec::new()
                }
            },
            DecisionType::Rollback => {
                self.rollback.complete(outcome);
                Vec::new()
            }
            DecisionType::Scaling | DecisionType::Monitoring => Vec::new(),
        }
    }

    fn rollback_requested(&self, request: DecisionRequest) -> DecisionRequest {
        self.events.emit(
            request.component(),
            ControlEvent::RollbackRequested {
                decision_id: request.id().clone(),
                target: request.revision().cloned(),
            },
        );
        request
    }

    /// Drop healing and rollback guards held by a decision that will not
    /// execute.
    fn release_guards(&self, component: &ComponentId, decision_id: &DecisionId, now: Instant) {
        self.healing.release(component, decision_id, now);
        self.rollback.release(component, decision_id);
    }

    fn rebind_guards(&self, component: &ComponentId, from: &DecisionId, to: &DecisionId) {
        self.healing.rebind(component, from, to.clone());
        self.rollback.rebind(component, from, to.clone());
    }

    // ========== Guardian ==========

    /// Apply a guardian response and execute whatever it approves.
    #[instrument(skip(self, action, reasoning), fields(ticket_id = %ticket_id, guardian = %guardian))]
    pub async fn resolve_ticket(
        &self,
        ticket_id: TicketId,
        action: GuardianAction,
        reasoning: impl Into<String>,
        guardian: GuardianId,
    ) -> ControlResult<TicketResolution> {
        let resolution = self.guardian.resolve(ticket_id, action, reasoning, guardian)?;
        let component = resolution.ticket.decision.component.clone();
        let original = resolution.ticket.decision_id().clone();

        self.events.emit(
            &component,
            ControlEvent::TicketResolved {
                ticket_id,
                state: resolution.ticket.state,
                late: resolution.late,
            },
        );

        let mut outcome = None;
        let mut follow_ups = Vec::new();
        match &resolution.execute {
            Some(decision) => {
                if decision.decision_id != original {
                    self.history.record(decision.clone());
                    self.rebind_guards(&component, &original, &decision.decision_id);
                }
                let (executed, raised) = self.execute(decision).await;
                outcome = Some(executed);
                follow_ups = self.drain(raised).await;
            }
            None => self.release_guards(&component, &original, Instant::now()),
        }

        Ok(TicketResolution {
            ticket: resolution.ticket,
            late: resolution.late,
            outcome,
            follow_ups,
        })
    }

    /// Expire overdue tickets without executing them.
    pub fn sweep_sla(&self, now: Instant) -> Vec<GuardianTicket> {
        let expired = self.guardian.expire_overdue(now);
        for ticket in &expired {
            let component = &ticket.decision.component;
            self.release_guards(component, ticket.decision_id(), now);
            self.events.emit(
                component,
                ControlEvent::TicketExpired {
                    ticket_id: ticket.id,
                    decision_id: ticket.decision_id().clone(),
                },
            );
        }
        expired
    }

    /// Forget settled tickets and executed outcomes past their retention.
    pub fn prune_settled(&self, now: Instant) -> usize {
        let tickets = self.guardian.prune_settled(now);
        let outcomes = self
            .executor
            .prune(self.config.loops.outcome_retention(), now);
        tickets + outcomes
    }

    pub fn open_tickets(&self) -> Vec<GuardianTicket> {
        self.guardian.open_tickets()
    }

    pub fn ticket(&self, ticket_id: &TicketId) -> Option<GuardianTicket> {
        self.guardian.ticket(ticket_id)
    }

    pub fn ticket_for_decision(&self, decision_id: &DecisionId) -> Option<GuardianTicket> {
        self.guardian.ticket_for_decision(decision_id)
    }

    pub fn approval_stats(&self) -> ApprovalStats {
        self.guardian.stats()
    }

    // ========== Health and Feedback Loops ==========

    pub fn register_component(&self, component: ComponentId) -> ControlResult<()> {
        Ok(self.collector.register(component)?)
    }

    /// React to a new snapshot: feed the rollback window, then plan healing.
    #[instrument(skip(self, snapshot), fields(component = %snapshot.component, status = %snapshot.status))]
    pub async fn on_snapshot(&self, snapshot: &HealthSnapshot) -> ControlResult<Vec<Submission>> {
        let mut raised = Vec::new();

        match self
            .rollback
            .observe(&snapshot.component, snapshot.status.to_post_action_health())
        {
            Ok(Some(request)) => raised.push(self.rollback_requested(request)),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Rollback observation failed"),
        }

        raised.extend(self.plan_healing(snapshot)?);
        Ok(self.drain(raised).await)
    }

    fn plan_healing(&self, snapshot: &HealthSnapshot) -> ControlResult<Option<DecisionRequest>> {
        let stability = self.collector.stability(&snapshot.component);
        let plan = self.healing.plan(snapshot, stability, Instant::now())?;

        Ok(match plan {
            HealingPlan::Heal { request, remedy } => {
                debug!(remedy = %remedy, "Submitting healing request");
                Some(request)
            }
            HealingPlan::Escalate { request } => {
                self.events.emit(
                    &snapshot.component,
                    ControlEvent::HealingEscalated {
                        decision_id: request.id().clone(),
                    },
                );
                Some(request)
            }
            HealingPlan::Healthy | HealingPlan::Deferred { .. } | HealingPlan::InFlight(_) => None,
        })
    }

    /// Re-plan healing for components whose backoff or cooldown elapsed,
    /// using the freshest snapshot available.
    pub async fn retry_deferred(&self, now: Instant) -> Vec<Submission> {
        let mut raised = Vec::new();
        for deferred in self.healing.take_due(now) {
            let snapshot = self
                .collector
                .latest(&deferred.component)
                .filter(|latest| latest.timestamp >= deferred.timestamp)
                .unwrap_or(deferred);

            match self.plan_healing(&snapshot) {
                Ok(Some(request)) => raised.push(request),
                Ok(None) => {}
                Err(e) => warn!(component = %snapshot.component, error = %e, "Deferred healing failed"),
            }
        }
        self.drain(raised).await
    }

    /// Operator-initiated rollback, optionally to an explicit revision.
    pub async fn request_rollback(
        &self,
        component: &ComponentId,
        target: Option<Revision>,
    ) -> ControlResult<Option<Submission>> {
        match self.rollback.request_manual(component, target)? {
            Some(request) => {
                let request = self.rollback_requested(request);
                Ok(Some(self.submit(request).await?))
            }
            None => Ok(None),
        }
    }

    // ========== Background Loops ==========

    /// Spawn the collector, snapshot consumer, SLA ticker and deferred
    /// healing loops. All stop when `shutdown` flips to true.
    pub fn start(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let snapshots = self.collector.subscribe();

        vec![
            self.collector.clone().spawn(shutdown.clone()),
            self.clone().spawn_snapshot_consumer(snapshots, shutdown.clone()),
            self.clone().spawn_sla_ticker(shutdown.clone()),
            self.clone().spawn_deferred_healing(shutdown),
        ]
    }

    fn spawn_snapshot_consumer(
        self: Arc<Self>,
        mut snapshots: broadcast::Receiver<HealthSnapshot>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = snapshots.recv() => match received {
                        Ok(snapshot) => {
                            if let Err(e) = self.on_snapshot(&snapshot).await {
                                warn!(component = %snapshot.component, error = %e, "Snapshot handling failed");
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(lagged = n, "Snapshot consumer lagged behind collector");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Snapshot consumer stopped");
        })
    }

    fn spawn_sla_ticker(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.config.sla.ticker_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = Instant::now();
                        let expired = self.sweep_sla(now);
                        if !expired.is_empty() {
                            info!(count = expired.len(), "Guardian tickets expired");
                        }
                        self.prune_settled(now);
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("SLA ticker stopped");
        })
    }

    fn spawn_deferred_healing(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.config.loops.deferred_tick());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.retry_deferred(Instant::now()).await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Deferred healing loop stopped");
        })
    }

    // ========== Observability ==========

    pub fn subscribe_events(&self) -> broadcast::Receiver<ControlEventEnvelope> {
        self.events.subscribe()
    }

    pub fn metrics(&self) -> DecisionMetrics {
        self.history.metrics()
    }

    pub fn recent_decisions(
        &self,
        decision_type: Option<DecisionType>,
        limit: usize,
    ) -> Vec<DecisionResult> {
        self.history.recent(decision_type, limit)
    }

    pub fn outcome(&self, decision_id: &DecisionId) -> Option<ActionOutcome> {
        self.executor.outcome(decision_id)
    }

    pub fn healing_context(&self, component: &ComponentId) -> Option<HealingContext> {
        self.healing.context(component)
    }

    pub fn rollback_status(&self, component: &ComponentId) -> Option<RollbackStatus> {
        self.rollback.status(component)
    }

    pub fn collector(&self) -> &Arc<SignalCollector> {
        &self.collector
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn status(&self) -> ControlStatus {
        ControlStatus {
            decisions: self.metrics(),
            approvals: self.approval_stats(),
            collector: self.collector.status(),
            open_tickets: self.guardian.open_tickets().len(),
            executed_actions: self.executor.executed_count(),
            deferred_healing: self.healing.deferred_count(),
            audit_failures: self.audit.failed_appends(),
        }
    }
}

impl std::fmt::Debug for ControlPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlane")
            .field("executor", &self.executor.name())
            .field("decisions", &self.history.len())
            .finish()
    }
}
