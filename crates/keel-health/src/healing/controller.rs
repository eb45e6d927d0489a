//! Self-healing controller.
//!
//! Turns unhealthy snapshots into Healing decision requests with bounded
//! retries. After `max_attempts` consecutive failures the controller raises
//! a GuardianOverride request instead of healing again, independent of any
//! confidence score. Failures back off exponentially and a completed
//! healing action starts a cooldown. A snapshot arriving inside either
//! window is queued, not dropped.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use keel_audit::AuditLog;
use keel_types::{
    ActionOutcome, AuditEvent, ComponentId, DecisionId, DecisionIdAllocator, DecisionRequest,
    DecisionType, HealthSnapshot, HealthStatus, Parameter, Priority,
};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::context::HealingContext;
use crate::config::{DiagnosticThresholds, HealingConfig};
use crate::diagnostics::{diagnose, Diagnosis, Remedy};
use crate::error::HealthResult;

/// Why a healing attempt was postponed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    /// Waiting out the delay after a failed attempt
    Backoff,
    /// Waiting out the quiet period after a completed action
    Cooldown,
}

/// What the controller wants done about a snapshot.
#[derive(Debug, Clone)]
pub enum HealingPlan {
    /// Nothing to heal
    Healthy,

    /// Submit a Healing request
    Heal {
        request: DecisionRequest,
        remedy: Remedy,
    },

    /// Attempt ceiling reached; submit a GuardianOverride request
    Escalate { request: DecisionRequest },

    /// Retry once `until` passes
    Deferred { until: Instant, reason: DeferReason },

    /// An earlier decision has not reported back yet
    InFlight(DecisionId),
}

/// Self-healing controller.
pub struct SelfHealingController {
    config: HealingConfig,
    thresholds: DiagnosticThresholds,
    allocator: Arc<DecisionIdAllocator>,
    audit: Arc<AuditLog>,
    contexts: DashMap<ComponentId, HealingContext>,
    deferred: DashMap<ComponentId, (Instant, HealthSnapshot)>,
}

impl SelfHealingController {
    pub fn new(
        config: HealingConfig,
        thresholds: DiagnosticThresholds,
        allocator: Arc<DecisionIdAllocator>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            config,
            thresholds,
            allocator,
            audit,
            contexts: DashMap::new(),
            deferred: DashMap::new(),
        }
    }

    pub fn config(&self) -> &HealingConfig {
        &self.config
    }

    /// Decide what to do about `snapshot`.
    ///
    /// `stability` is the fraction of recent snapshots that were not
    /// critical, as reported by the collector.
    #[instrument(skip(self, snapshot), fields(component = %snapshot.component, status = %snapshot.status))]
    pub fn plan(
        &self,
        snapshot: &HealthSnapshot,
        stability: f64,
        now: Instant,
    ) -> HealthResult<HealingPlan> {
        let component = &snapshot.component;
        let diagnosis = diagnose(&snapshot.metrics, &self.thresholds);

        let mut context = self
            .contexts
            .entry(component.clone())
            .or_insert_with(|| HealingContext::new(component.clone()));

        let previous = context.last_status;
        context.last_status = snapshot.status;

        if !snapshot.status.needs_healing() {
            self.deferred.remove(component);
            return Ok(HealingPlan::Healthy);
        }

        if snapshot.status > previous {
            self.record_incident(snapshot, &diagnosis);
        }

        if let Some(in_flight) = &context.in_flight {
            debug!(decision_id = %in_flight, "Healing decision already in flight");
            return Ok(HealingPlan::InFlight(in_flight.clone()));
        }

        let waiting = context
            .backoff_until(now)
            .map(|until| (until, DeferReason::Backoff))
            .or_else(|| {
                context
                    .cooldown_until(self.config.cooldown(), now)
                    .map(|until| (until, DeferReason::Cooldown))
            });
        if let Some((until, reason)) = waiting {
            let newly_deferred = self
                .deferred
                .insert(component.clone(), (until, snapshot.clone()))
                .is_none();
            if newly_deferred {
                debug!(?reason, "Healing deferred");
                let wait = chrono::Duration::from_std(until.saturating_duration_since(now))
                    .unwrap_or_else(|_| chrono::Duration::zero());
                self.audit.record(
                    component,
                    AuditEvent::HealingDeferred {
                        until: Utc::now() + wait,
                        attempts: context.attempt_count,
                    },
                );
            }
            return Ok(HealingPlan::Deferred { until, reason });
        }

        self.deferred.remove(component);
        let attempts = context.attempt_count;
        if context.exceeded_max_attempts(self.config.max_attempts) {
            let request = self.build_request(
                DecisionType::GuardianOverride,
                snapshot,
                &diagnosis,
                stability,
                attempts,
            )?;
            context.in_flight = Some(request.id().clone());
            context.escalation = Some(request.id().clone());

            warn!(
                attempts,
                decision_id = %request.id(),
                "Healing attempt ceiling reached, escalating to guardian"
            );
            self.audit.record(
                component,
                AuditEvent::HealingEscalated {
                    decision_id: request.id().clone(),
                    attempts,
                },
            );
            return Ok(HealingPlan::Escalate { request });
        }

        let remedy = diagnosis.remedy().unwrap_or(Remedy::RestartService);
        let request =
            self.build_request(DecisionType::Healing, snapshot, &diagnosis, stability, attempts)?;
        context.in_flight = Some(request.id().clone());

        info!(
            attempts,
            remedy = %remedy,
            decision_id = %request.id(),
            "Healing attempt planned"
        );
        Ok(HealingPlan::Heal { request, remedy })
    }

    fn build_request(
        &self,
        decision_type: DecisionType,
        snapshot: &HealthSnapshot,
        diagnosis: &Diagnosis,
        stability: f64,
        attempts: u32,
    ) -> HealthResult<DecisionRequest> {
        let priority = match snapshot.status {
            HealthStatus::Critical => Priority::Critical,
            _ => Priority::High,
        };
        let remedy = diagnosis.remedy().unwrap_or(Remedy::RestartService);

        let request = DecisionRequest::builder(decision_type, priority, snapshot.component.clone())
            .parameter(Parameter::ratio(
                "process_health",
                diagnosis.non_critical_ratio(),
                0.4,
            ))
            .parameter(Parameter::ratio(
                "system_stability",
                stability.clamp(0.0, 1.0),
                0.3,
            ))
            .parameter(Parameter::lower_is_better(
                "healing_attempts",
                f64::from(attempts),
                f64::from(self.config.max_attempts.max(1)),
                0.3,
            ))
            .source(format!("self_healing/{remedy}"))
            .build_with(&self.allocator)?;
        Ok(request)
    }

    fn record_incident(&self, snapshot: &HealthSnapshot, diagnosis: &Diagnosis) {
        warn!(
            component = %snapshot.component,
            status = %snapshot.status,
            findings = %diagnosis.summary(),
            "Incident detected"
        );
        self.audit.record(
            &snapshot.component,
            AuditEvent::IncidentDetected {
                status: snapshot.status,
                metrics: snapshot.metrics.clone(),
                description: diagnosis.summary(),
            },
        );
    }

    /// Feed back the outcome of an executed Healing or GuardianOverride
    /// decision.
    ///
    /// A successful action that leaves the component Healthy resets the
    /// attempt counter and starts the cooldown. Anything else counts as a
    /// failed attempt and schedules the next one after backoff.
    #[instrument(skip(self, outcome), fields(component = %outcome.component, decision_id = %outcome.decision_id))]
    pub fn record_outcome(&self, outcome: &ActionOutcome, now: Instant) {
        let Some(mut context) = self.contexts.get_mut(&outcome.component) else {
            debug!("No healing context for component");
            return;
        };

        let ours = match outcome.decision_type {
            DecisionType::Healing => true,
            DecisionType::GuardianOverride => {
                context.escalation.as_ref() == Some(&outcome.decision_id)
                    || context.in_flight.as_ref() == Some(&outcome.decision_id)
            }
            _ => false,
        };
        if !ours {
            return;
        }

        if context.in_flight.as_ref() == Some(&outcome.decision_id) {
            context.in_flight = None;
        }

        if outcome.is_healthy() {
            let previous_attempts = context.attempt_count;
            context.reset(now);
            self.deferred.remove(&outcome.component);
            info!(previous_attempts, "Healing succeeded, attempt counter reset");
            self.audit.record(
                &outcome.component,
                AuditEvent::HealingReset {
                    decision_id: outcome.decision_id.clone(),
                },
            );
        } else {
            context.escalation = None;
            let error = outcome.error_detail.as_deref().unwrap_or("");
            self.count_failure(&mut context, &outcome.decision_id, error, now);
        }
    }

    fn count_failure(
        &self,
        context: &mut HealingContext,
        decision_id: &DecisionId,
        error: &str,
        now: Instant,
    ) {
        context.attempt_count += 1;
        let backoff = self.config.backoff(context.attempt_count);
        context.retry_after = Some(now + backoff);
        warn!(
            component = %context.component,
            decision_id = %decision_id,
            attempts = context.attempt_count,
            backoff_secs = backoff.as_secs(),
            error,
            "Healing attempt failed"
        );
        self.audit.record(
            &context.component,
            AuditEvent::HealingAttemptFailed {
                decision_id: decision_id.clone(),
                attempts: context.attempt_count,
            },
        );
    }

    /// Forget an in-flight decision that will not execute (rejected,
    /// expired or auto-rejected).
    ///
    /// A dropped Healing decision counts as a failed attempt, so a
    /// component whose requests keep being refused still reaches the
    /// escalation ceiling. A dropped escalation keeps the attempt count and
    /// waits a full cooldown before escalating again.
    pub fn release(&self, component: &ComponentId, decision_id: &DecisionId, now: Instant) {
        let Some(mut context) = self.contexts.get_mut(component) else {
            return;
        };
        if context.in_flight.as_ref() != Some(decision_id) {
            return;
        }

        context.in_flight = None;
        if context.escalation.as_ref() == Some(decision_id) {
            context.escalation = None;
            context.retry_after = Some(now + self.config.cooldown());
            info!(component = %component, decision_id = %decision_id, "Escalation dropped, waiting out cooldown");
        } else {
            self.count_failure(&mut context, decision_id, "not executed", now);
        }
    }

    /// Point the in-flight guard at a replacement decision, e.g. after a
    /// guardian modified the escalated one.
    pub fn rebind(&self, component: &ComponentId, from: &DecisionId, to: DecisionId) {
        let Some(mut context) = self.contexts.get_mut(component) else {
            return;
        };
        if context.escalation.as_ref() == Some(from) {
            context.escalation = Some(to.clone());
        }
        if context.in_flight.as_ref() == Some(from) {
            context.in_flight = Some(to);
        }
    }

    /// Remove and return deferred snapshots whose wait has elapsed.
    pub fn take_due(&self, now: Instant) -> Vec<HealthSnapshot> {
        let due: Vec<ComponentId> = self
            .deferred
            .iter()
            .filter(|entry| entry.value().0 <= now)
            .map(|entry| entry.key().clone())
            .collect();

        due.into_iter()
            .filter_map(|component| self.deferred.remove(&component))
            .map(|(_, (_, snapshot))| snapshot)
            .collect()
    }

    pub fn deferred_count(&self) -> usize {
        self.deferred.len()
    }

    pub fn context(&self, component: &ComponentId) -> Option<HealingContext> {
        self.contexts.get(component).map(|c| c.clone())
    }

    /// Clear all state for a component (operator override).
    pub fn reset(&self, component: &ComponentId) {
        self.contexts.remove(component);
        self.deferred.remove(component);
        info!(component = %component, "Healing state reset");
    }
}

impl std::fmt::Debug for SelfHealingController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelfHealingController")
            .field("config", &self.config)
            .field("components", &self.contexts.len())
            .field("deferred", &self.deferred.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_audit::MemoryAuditSink;
    use keel_types::{PostActionHealth, SignalKind};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn controller() -> (SelfHealingController, Arc<MemoryAuditSink>) {
        let (audit, sink) = AuditLog::in_memory();
        (
            SelfHealingController::new(
                HealingConfig::default(),
                DiagnosticThresholds::default(),
                Arc::new(DecisionIdAllocator::new()),
                Arc::new(audit),
            ),
            sink,
        )
    }

    fn snapshot(cpu: f64) -> HealthSnapshot {
        let mut metrics = BTreeMap::new();
        metrics.insert(SignalKind::CpuPercent.name().to_string(), cpu);
        metrics.insert(SignalKind::MemoryPercent.name().to_string(), 40.0);
        let status = diagnose(&metrics, &DiagnosticThresholds::default()).status;
        HealthSnapshot {
            component: ComponentId::new("cache"),
            timestamp: Utc::now(),
            metrics,
            status,
        }
    }

    fn outcome(request: &DecisionRequest, health: PostActionHealth, success: bool) -> ActionOutcome {
        ActionOutcome {
            decision_id: request.id().clone(),
            decision_type: request.decision_type(),
            component: request.component().clone(),
            revision: None,
            executed_at: Utc::now(),
            success,
            post_action_health: health,
            error_detail: (!success).then(|| "restart failed".to_string()),
        }
    }

    fn expect_heal(plan: HealingPlan) -> DecisionRequest {
        match plan {
            HealingPlan::Heal { request, .. } => request,
            other => panic!("expected heal, got {other:?}"),
        }
    }

    #[test]
    fn test_healthy_snapshot_needs_nothing() {
        let (controller, _) = controller();
        let plan = controller.plan(&snapshot(30.0), 1.0, Instant::now()).unwrap();
        assert!(matches!(plan, HealingPlan::Healthy));
    }

    #[test]
    fn test_unhealthy_snapshot_plans_healing() {
        let (controller, sink) = controller();
        let request = expect_heal(controller.plan(&snapshot(85.0), 1.0, Instant::now()).unwrap());

        assert_eq!(request.decision_type(), DecisionType::Healing);
        assert_eq!(request.priority(), Priority::High);
        assert_eq!(request.source(), "self_healing/reduce_cpu_load");
        assert_eq!(request.parameter("healing_attempts").unwrap().observed_value, 0.0);
        assert!(request.parameter("process_health").is_some());
        assert!(request.parameter("system_stability").is_some());

        let kinds: Vec<_> = sink.records().iter().map(|r| r.event.kind()).collect();
        assert_eq!(kinds, vec!["incident_detected"]);
    }

    #[test]
    fn test_in_flight_blocks_second_request() {
        let (controller, _) = controller();
        let now = Instant::now();
        let request = expect_heal(controller.plan(&snapshot(85.0), 1.0, now).unwrap());

        match controller.plan(&snapshot(86.0), 1.0, now).unwrap() {
            HealingPlan::InFlight(id) => assert_eq!(&id, request.id()),
            other => panic!("expected in-flight, got {other:?}"),
        }
    }

    #[test]
    fn test_failure_backs_off_exponentially() {
        let (controller, _) = controller();
        let mut now = Instant::now();

        for (attempt, expected) in [(1u32, 1u64), (2, 2), (3, 4)] {
            let request = expect_heal(controller.plan(&snapshot(85.0), 1.0, now).unwrap());
            controller.record_outcome(&outcome(&request, PostActionHealth::Degraded, false), now);
            assert_eq!(controller.context(request.component()).unwrap().attempt_count, attempt);

            match controller.plan(&snapshot(85.0), 1.0, now).unwrap() {
                HealingPlan::Deferred { until, reason } => {
                    assert_eq!(reason, DeferReason::Backoff);
                    assert_eq!(until - now, Duration::from_secs(expected));
                }
                other => panic!("expected backoff, got {other:?}"),
            }
            now += Duration::from_secs(expected);
            assert_eq!(controller.take_due(now).len(), 1);

            if attempt == 3 {
                break;
            }
        }
    }

    #[test]
    fn test_ceiling_escalates_instead_of_healing() {
        let (controller, sink) = controller();
        let mut now = Instant::now();

        for _ in 0..3 {
            let request = expect_heal(controller.plan(&snapshot(85.0), 1.0, now).unwrap());
            controller.record_outcome(&outcome(&request, PostActionHealth::Degraded, false), now);
            now += Duration::from_secs(10);
        }

        match controller.plan(&snapshot(85.0), 1.0, now).unwrap() {
            HealingPlan::Escalate { request } => {
                assert_eq!(request.decision_type(), DecisionType::GuardianOverride);
                assert_eq!(
                    request.parameter("healing_attempts").unwrap().observed_value,
                    3.0
                );
            }
            other => panic!("expected escalation, got {other:?}"),
        }
        assert!(sink
            .records()
            .iter()
            .any(|r| r.event.kind() == "healing_escalated"));
    }

    #[test]
    fn test_success_resets_and_starts_cooldown() {
        let (controller, _) = controller();
        let now = Instant::now();

        let first = expect_heal(controller.plan(&snapshot(85.0), 1.0, now).unwrap());
        controller.record_outcome(&outcome(&first, PostActionHealth::Degraded, false), now);

        let later = now + Duration::from_secs(5);
        let second = expect_heal(controller.plan(&snapshot(85.0), 1.0, later).unwrap());
        controller.record_outcome(&outcome(&second, PostActionHealth::Healthy, true), later);

        let context = controller.context(second.component()).unwrap();
        assert_eq!(context.attempt_count, 0);
        assert!(context.in_flight.is_none());

        match controller
            .plan(&snapshot(85.0), 1.0, later + Duration::from_secs(60))
            .unwrap()
        {
            HealingPlan::Deferred { until, reason } => {
                assert_eq!(reason, DeferReason::Cooldown);
                assert_eq!(until, later + Duration::from_secs(300));
            }
            other => panic!("expected cooldown, got {other:?}"),
        }

        // Deferred, not dropped
        assert_eq!(controller.deferred_count(), 1);
        assert!(controller.take_due(later + Duration::from_secs(299)).is_empty());
        assert_eq!(controller.take_due(later + Duration::from_secs(300)).len(), 1);
        expect_heal(
            controller
                .plan(&snapshot(85.0), 1.0, later + Duration::from_secs(300))
                .unwrap(),
        );
    }

    #[test]
    fn test_success_with_warning_counts_as_failure() {
        let (controller, _) = controller();
        let now = Instant::now();
        let request = expect_heal(controller.plan(&snapshot(85.0), 1.0, now).unwrap());
        controller.record_outcome(&outcome(&request, PostActionHealth::Warning, true), now);

        assert_eq!(controller.context(request.component()).unwrap().attempt_count, 1);
    }

    #[test]
    fn test_release_counts_as_failed_attempt() {
        let (controller, sink) = controller();
        let now = Instant::now();
        let request = expect_heal(controller.plan(&snapshot(85.0), 1.0, now).unwrap());

        controller.release(request.component(), request.id(), now);
        let context = controller.context(request.component()).unwrap();
        assert!(context.in_flight.is_none());
        assert_eq!(context.attempt_count, 1);
        assert!(matches!(
            controller.plan(&snapshot(85.0), 1.0, now).unwrap(),
            HealingPlan::Deferred {
                reason: DeferReason::Backoff,
                ..
            }
        ));
        expect_heal(
            controller
                .plan(&snapshot(85.0), 1.0, now + Duration::from_secs(1))
                .unwrap(),
        );
        assert!(sink
            .records()
            .iter()
            .any(|r| r.event.kind() == "healing_attempt_failed"));
    }

    #[test]
    fn test_refused_healing_reaches_ceiling() {
        let (controller, _) = controller();
        let mut now = Instant::now();

        for (attempt, backoff) in [(1u32, 1u64), (2, 2), (3, 4)] {
            let request = expect_heal(controller.plan(&snapshot(97.0), 0.0, now).unwrap());
            controller.release(request.component(), request.id(), now);
            let context = controller.context(request.component()).unwrap();
            assert_eq!(context.attempt_count, attempt);
            assert_eq!(context.retry_after, Some(now + Duration::from_secs(backoff)));
            now += Duration::from_secs(15);
        }

        match controller.plan(&snapshot(97.0), 0.0, now).unwrap() {
            HealingPlan::Escalate { request } => {
                assert_eq!(request.decision_type(), DecisionType::GuardianOverride);
            }
            other => panic!("expected escalation, got {other:?}"),
        }
    }

    #[test]
    fn test_dropped_escalation_waits_cooldown_then_escalates_again() {
        let (controller, _) = controller();
        let mut now = Instant::now();
        for _ in 0..3 {
            let request = expect_heal(controller.plan(&snapshot(85.0), 1.0, now).unwrap());
            controller.release(request.component(), request.id(), now);
            now += Duration::from_secs(10);
        }
        let escalation = match controller.plan(&snapshot(85.0), 1.0, now).unwrap() {
            HealingPlan::Escalate { request } => request,
            other => panic!("expected escalation, got {other:?}"),
        };

        controller.release(escalation.component(), escalation.id(), now);
        let context = controller.context(escalation.component()).unwrap();
        assert_eq!(context.attempt_count, 3);
        assert!(context.escalation.is_none());

        assert!(matches!(
            controller
                .plan(&snapshot(85.0), 1.0, now + Duration::from_secs(299))
                .unwrap(),
            HealingPlan::Deferred { .. }
        ));
        assert!(matches!(
            controller
                .plan(&snapshot(85.0), 1.0, now + Duration::from_secs(300))
                .unwrap(),
            HealingPlan::Escalate { .. }
        ));
    }

    #[test]
    fn test_recovery_clears_deferred_snapshot() {
        let (controller, _) = controller();
        let now = Instant::now();
        let request = expect_heal(controller.plan(&snapshot(85.0), 1.0, now).unwrap());
        controller.record_outcome(&outcome(&request, PostActionHealth::Degraded, false), now);
        controller.plan(&snapshot(85.0), 1.0, now).unwrap();
        assert_eq!(controller.deferred_count(), 1);

        controller.plan(&snapshot(20.0), 1.0, now).unwrap();
        assert_eq!(controller.deferred_count(), 0);
    }

    #[test]
    fn test_critical_snapshot_uses_critical_priority() {
        let (controller, _) = controller();
        let request = expect_heal(controller.plan(&snapshot(97.0), 1.0, Instant::now()).unwrap());
        assert_eq!(request.priority(), Priority::Critical);
        assert_eq!(request.parameter("process_health").unwrap().observed_value, 0.5);
    }
}
