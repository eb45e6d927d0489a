//! Simulated collaborators so keeld runs without real infrastructure.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use keel_control::{ActionExecutor, ExecutionError};
use keel_health::{HealthResult, MetricsSource};
use keel_types::{ComponentId, DecisionResult, DecisionType, PostActionHealth, SignalKind};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::config::SimulationConfig;

/// Metrics with random jitter around a healthy baseline. Components
/// occasionally start degrading and stay degraded until an action fixes them.
pub struct SimulatedMetricsSource {
    config: SimulationConfig,
    rng: Mutex<StdRng>,
    degraded: Mutex<HashMap<ComponentId, bool>>,
}

impl SimulatedMetricsSource {
    pub fn new(config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            rng: Mutex::new(rng),
            degraded: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_degraded(&self, component: &ComponentId) -> bool {
        self.degraded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(component)
            .copied()
            .unwrap_or(false)
    }

    pub fn set_degraded(&self, component: &ComponentId, degraded: bool) {
        self.degraded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(component.clone(), degraded);
    }

    /// Roll for recovery after a remedial action. Returns whether the
    /// component is healthy afterwards.
    pub fn attempt_recovery(&self, component: &ComponentId) -> bool {
        let recovered = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_bool(self.config.recovery_probability.clamp(0.0, 1.0));
        if recovered {
            self.set_degraded(component, false);
        }
        !self.is_degraded(component)
    }
}

#[async_trait]
impl MetricsSource for SimulatedMetricsSource {
    async fn fetch(&self, component: &ComponentId) -> HealthResult<BTreeMap<String, f64>> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);

        let degraded = {
            let mut states = self.degraded.lock().unwrap_or_else(PoisonError::into_inner);
            let state = states.entry(component.clone()).or_insert(false);
            if !*state && rng.gen_bool(self.config.degradation_probability.clamp(0.0, 1.0)) {
                info!(component = %component, "Simulated degradation started");
                *state = true;
            }
            *state
        };

        let (cpu, error_rate, latency) = if degraded {
            (
                rng.gen_range(82.0..96.0),
                rng.gen_range(0.04..0.12),
                rng.gen_range(900.0..2500.0),
            )
        } else {
            (
                rng.gen_range(20.0..55.0),
                rng.gen_range(0.0..0.005),
                rng.gen_range(40.0..250.0),
            )
        };

        let mut metrics = BTreeMap::new();
        metrics.insert(SignalKind::CpuPercent.name().to_string(), cpu);
        metrics.insert(
            SignalKind::MemoryPercent.name().to_string(),
            rng.gen_range(30.0..65.0),
        );
        metrics.insert(
            SignalKind::DiskPercent.name().to_string(),
            rng.gen_range(20.0..60.0),
        );
        metrics.insert(SignalKind::ErrorRate.name().to_string(), error_rate);
        metrics.insert(SignalKind::ResponseTimeMs.name().to_string(), latency);

        debug!(component = %component, degraded, "Simulated metrics");
        Ok(metrics)
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

/// Logs each action and reports health from the simulated source.
pub struct LoggingExecutor {
    source: Arc<SimulatedMetricsSource>,
}

impl LoggingExecutor {
    pub fn new(source: Arc<SimulatedMetricsSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl ActionExecutor for LoggingExecutor {
    async fn execute(&self, decision: &DecisionResult) -> Result<PostActionHealth, ExecutionError> {
        info!(
            decision_id = %decision.decision_id,
            decision_type = %decision.decision_type,
            component = %decision.component,
            revision = decision.revision.as_ref().map(|r| r.as_str()).unwrap_or("-"),
            "Executing action"
        );

        let healthy = match decision.decision_type {
            DecisionType::Healing | DecisionType::Rollback | DecisionType::GuardianOverride => {
                self.source.attempt_recovery(&decision.component)
            }
            _ => !self.source.is_degraded(&decision.component),
        };

        Ok(if healthy {
            PostActionHealth::Healthy
        } else {
            PostActionHealth::Degraded
        })
    }

    fn name(&self) -> &str {
        "logging"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_decision::DecisionEngine;
    use keel_types::{DecisionIdAllocator, DecisionRequest, Parameter, Priority};

    fn config(degradation: f64, recovery: f64) -> SimulationConfig {
        SimulationConfig {
            degradation_probability: degradation,
            recovery_probability: recovery,
            seed: Some(42),
        }
    }

    #[tokio::test]
    async fn test_healthy_baseline_is_in_range() {
        let source = SimulatedMetricsSource::new(config(0.0, 1.0));
        let api = ComponentId::new("api");

        for _ in 0..20 {
            let metrics = source.fetch(&api).await.unwrap();
            for kind in [SignalKind::CpuPercent, SignalKind::ErrorRate] {
                let value = metrics[kind.name()];
                assert!(kind.validate(value).is_ok());
            }
            assert!(metrics["cpu_percent"] < 60.0);
        }
        assert!(!source.is_degraded(&api));
    }

    #[tokio::test]
    async fn test_degradation_persists_until_recovery() {
        let source = SimulatedMetricsSource::new(config(1.0, 1.0));
        let api = ComponentId::new("api");

        let metrics = source.fetch(&api).await.unwrap();
        assert!(metrics["cpu_percent"] >= 82.0);
        assert!(source.is_degraded(&api));

        assert!(source.attempt_recovery(&api));
        assert!(!source.is_degraded(&api));
    }

    #[tokio::test]
    async fn test_failed_recovery_reports_degraded() {
        let source = Arc::new(SimulatedMetricsSource::new(config(0.0, 0.0)));
        let executor = LoggingExecutor::new(source.clone());
        let api = ComponentId::new("api");
        source.set_degraded(&api, true);

        let request = DecisionRequest::builder(DecisionType::Healing, Priority::High, "api")
            .parameter(Parameter::ratio("process_health", 1.0, 1.0))
            .build_with(&DecisionIdAllocator::new())
            .unwrap();
        let decision = DecisionEngine::default().evaluate(&request);

        assert_eq!(
            executor.execute(&decision).await,
            Ok(PostActionHealth::Degraded)
        );
    }
}
