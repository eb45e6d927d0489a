//! Rollback coordinator
//!
//! Consumes Deployment outcomes and the post-action health observed after
//! them. Sustained degradation produces a Critical-priority Rollback
//! request for the decision engine; the coordinator never executes
//! anything itself.

use std::sync::Arc;

use dashmap::DashMap;
use keel_audit::{AuditLog, Notification, NotificationDispatcher, NotificationKind};
use keel_types::{
    ActionOutcome, AuditEvent, ComponentId, DecisionId, DecisionIdAllocator, DecisionRequest,
    DecisionType, Parameter, PostActionHealth, Priority, Revision,
};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::config::RollbackConfig;
use crate::error::{RollbackError, RollbackResult};
use crate::history::{DeploymentHistory, DeploymentRecord, ObservationEffect};

/// Rollback view of one component.
#[derive(Debug, Clone, Serialize)]
pub struct RollbackStatus {
    pub component: ComponentId,
    pub current: Option<DeploymentRecord>,
    pub last_known_good: Option<Revision>,
    pub in_flight: Option<DecisionId>,
    pub deployments: usize,
}

#[derive(Debug)]
struct ComponentState {
    history: DeploymentHistory,
    in_flight: Option<DecisionId>,
}

/// Rollback coordinator.
pub struct RollbackCoordinator {
    config: RollbackConfig,
    allocator: Arc<DecisionIdAllocator>,
    audit: Arc<AuditLog>,
    notifications: NotificationDispatcher,
    components: DashMap<ComponentId, ComponentState>,
}

impl RollbackCoordinator {
    pub fn new(
        config: RollbackConfig,
        allocator: Arc<DecisionIdAllocator>,
        audit: Arc<AuditLog>,
        notifications: NotificationDispatcher,
    ) -> Self {
        Self {
            config,
            allocator,
            audit,
            notifications,
            components: DashMap::new(),
        }
    }

    pub fn config(&self) -> &RollbackConfig {
        &self.config
    }

    /// Start tracking an executed Deployment. Its own post-action health
    /// is the first observation of the window.
    #[instrument(skip(self, outcome), fields(component = %outcome.component, decision_id = %outcome.decision_id))]
    pub fn record_deployment(
        &self,
        outcome: &ActionOutcome,
    ) -> RollbackResult<Option<DecisionRequest>> {
        if outcome.decision_type != DecisionType::Deployment {
            return Ok(None);
        }

        let revision = outcome
            .revision
            .clone()
            .unwrap_or_else(|| Revision::new(outcome.decision_id.as_str()));
        info!(revision = %revision, "Deployment recorded, observation window opened");

        self.components
            .entry(outcome.component.clone())
            .or_insert_with(|| self.empty_state())
            .history
            .push(DeploymentRecord::new(
                outcome.decision_id.clone(),
                revision,
                outcome.executed_at,
            ));

        self.observe(&outcome.component, outcome.post_action_health)
    }

    /// Feed one post-action health observation for the component's current
    /// deployment.
    #[instrument(skip(self))]
    pub fn observe(
        &self,
        component: &ComponentId,
        health: PostActionHealth,
    ) -> RollbackResult<Option<DecisionRequest>> {
        let Some(mut state) = self.components.get_mut(component) else {
            return Ok(None);
        };

        if let Some(in_flight) = state.in_flight.clone() {
            if health == PostActionHealth::Degraded {
                info!(in_flight = %in_flight, "Degradation while rollback pending, ignoring");
                self.audit
                    .record(component, AuditEvent::RollbackIgnored { in_flight });
            }
            return Ok(None);
        }

        let window = self.config.effective_window();
        let trigger = self.config.degraded_trigger();
        let Some(current) = state.history.current_mut() else {
            return Ok(None);
        };

        match current.observe(health, window, trigger) {
            ObservationEffect::Triggered => {
                warn!(
                    revision = %current.revision,
                    consecutive = current.consecutive_degraded,
                    "Sustained degradation after deployment"
                );
                self.trigger(component, &mut state, None)
            }
            ObservationEffect::BecameKnownGood => {
                info!(revision = %current.revision, "Deployment is known-good");
                Ok(None)
            }
            ObservationEffect::BecameUnstable => {
                debug!(revision = %current.revision, "Deployment window closed unstable");
                Ok(None)
            }
            ObservationEffect::Recorded | ObservationEffect::Closed => Ok(None),
        }
    }

    /// Operator-initiated rollback. An explicit `target` takes precedence
    /// over known-good selection. Without either, the rollback is skipped
    /// and a failure notification is sent.
    #[instrument(skip(self))]
    pub fn request_manual(
        &self,
        component: &ComponentId,
        target: Option<Revision>,
    ) -> RollbackResult<Option<DecisionRequest>> {
        let mut state = self
            .components
            .entry(component.clone())
            .or_insert_with(|| self.empty_state());

        if let Some(in_flight) = &state.in_flight {
            return Err(RollbackError::InFlight {
                component: component.clone(),
                in_flight: in_flight.clone(),
            });
        }

        info!(target = ?target, "Manual rollback requested");
        self.trigger(component, &mut state, Some(target))
    }

    fn trigger(
        &self,
        component: &ComponentId,
        state: &mut ComponentState,
        manual: Option<Option<Revision>>,
    ) -> RollbackResult<Option<DecisionRequest>> {
        let is_manual = manual.is_some();
        let from = state.history.current().map(|r| r.revision.clone());

        let target = match manual.flatten() {
            Some(revision) => Some(revision),
            None => state.history.last_known_good().map(|r| r.revision.clone()),
        };
        let Some(target) = target else {
            let reason = "no known-good revision to roll back to".to_string();
            warn!(component = %component, "Rollback skipped: {}", reason);
            self.audit.record(
                component,
                AuditEvent::RollbackSkipped {
                    reason: reason.clone(),
                },
            );
            self.notifications.dispatch(
                Notification::new(
                    NotificationKind::Failure,
                    component.clone(),
                    format!("Rollback of {component} skipped: {reason}"),
                )
                .with_payload(&json!({ "from": from, "manual": is_manual })),
            );
            return Ok(None);
        };

        let parameters = if is_manual {
            let verified = state
                .history
                .find_revision(&target)
                .is_some_and(|r| r.is_known_good());
            vec![
                Parameter::gate("operator_requested", true, 0.7),
                Parameter::gate("target_verified", verified, 0.3),
            ]
        } else {
            let stability = state
                .history
                .find_revision(&target)
                .map(|r| r.healthy_ratio())
                .unwrap_or(0.0);
            let evidence = state
                .history
                .current()
                .map(|r| {
                    (r.consecutive_degraded as f64 / self.config.degraded_trigger() as f64).min(1.0)
                })
                .unwrap_or(0.0);
            vec![
                Parameter::ratio("target_stability", stability, 0.5),
                Parameter::ratio("degradation_evidence", evidence, 0.5),
            ]
        };

        let request = DecisionRequest::builder(DecisionType::Rollback, Priority::Critical, component.clone())
            .parameters(parameters)
            .revision(target.clone())
            .source(if is_manual {
                "manual_rollback"
            } else {
                "rollback_coordinator"
            })
            .build_with(&self.allocator)?;

        state.in_flight = Some(request.id().clone());

        warn!(
            component = %component,
            decision_id = %request.id(),
            target = %target,
            from = ?from,
            manual = is_manual,
            "Rollback triggered"
        );
        self.audit.record(
            component,
            AuditEvent::RollbackTriggered {
                decision_id: request.id().clone(),
                target: target.clone(),
                from: from.clone(),
                manual: is_manual,
            },
        );
        self.notifications.dispatch(
            Notification::new(
                NotificationKind::Rollback,
                component.clone(),
                format!("Rolling back {component} to {target}"),
            )
            .with_payload(&json!({
                "decision_id": request.id(),
                "target": target,
                "from": from,
                "manual": is_manual,
            })),
        );

        Ok(Some(request))
    }

    /// Feed back the outcome of an executed Rollback. Returns whether it
    /// matched the in-flight rollback.
    #[instrument(skip(self, outcome), fields(component = %outcome.component, decision_id = %outcome.decision_id))]
    pub fn complete(&self, outcome: &ActionOutcome) -> bool {
        if outcome.decision_type != DecisionType::Rollback {
            return false;
        }
        let Some(mut state) = self.components.get_mut(&outcome.component) else {
            return false;
        };
        if state.in_flight.as_ref() != Some(&outcome.decision_id) {
            return false;
        }
        state.in_flight = None;

        if outcome.is_healthy() {
            info!(revision = ?outcome.revision, "Rollback completed");
        } else {
            warn!(
                revision = ?outcome.revision,
                error = outcome.error_detail.as_deref().unwrap_or(""),
                "Rollback did not restore health"
            );
            self.notifications.dispatch(
                Notification::new(
                    NotificationKind::Failure,
                    outcome.component.clone(),
                    format!("Rollback of {} did not restore health", outcome.component),
                )
                .with_payload(outcome),
            );
        }
        true
    }

    /// Drop an in-flight rollback that will not execute (rejected, expired
    /// or auto-rejected).
    pub fn release(&self, component: &ComponentId, decision_id: &DecisionId) -> bool {
        let Some(mut state) = self.components.get_mut(component) else {
            return false;
        };
        if state.in_flight.as_ref() != Some(decision_id) {
            return false;
        }
        state.in_flight = None;
        debug!(component = %component, decision_id = %decision_id, "Released rollback");
        true
    }

    /// Point the in-flight guard at a replacement decision.
    pub fn rebind(&self, component: &ComponentId, from: &DecisionId, to: DecisionId) {
        if let Some(mut state) = self.components.get_mut(component) {
            if state.in_flight.as_ref() == Some(from) {
                state.in_flight = Some(to);
            }
        }
    }

    pub fn in_flight(&self, component: &ComponentId) -> Option<DecisionId> {
        self.components
            .get(component)
            .and_then(|s| s.in_flight.clone())
    }

    pub fn history(&self, component: &ComponentId) -> Option<DeploymentHistory> {
        self.components.get(component).map(|s| s.history.clone())
    }

    pub fn status(&self, component: &ComponentId) -> Option<RollbackStatus> {
        self.components.get(component).map(|s| RollbackStatus {
            component: component.clone(),
            current: s.history.current().cloned(),
            last_known_good: s.history.last_known_good().map(|r| r.revision.clone()),
            in_flight: s.in_flight.clone(),
            deployments: s.history.len(),
        })
    }

    fn empty_state(&self) -> ComponentState {
        ComponentState {
            history: DeploymentHistory::new(self.config.history_capacity),
            in_flight: None,
        }
    }
}

impl std::fmt::Debug for RollbackCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollbackCoordinator")
            .field("config", &self.config)
            .field("components", &self.components.len())
            .finish()
    }
}
