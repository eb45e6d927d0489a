//! Metrics source collaborator.

use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;
use keel_types::{ComponentId, SignalKind};

use crate::error::{HealthError, HealthResult};

/// Supplies raw, untrusted metric values keyed by signal name.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn fetch(&self, component: &ComponentId) -> HealthResult<BTreeMap<String, f64>>;

    fn name(&self) -> &str;
}

/// Serves whatever values were last set (for tests and wiring checks).
#[derive(Debug, Default)]
pub struct StaticMetricsSource {
    values: DashMap<ComponentId, BTreeMap<String, f64>>,
}

impl StaticMetricsSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, component: &ComponentId, kind: SignalKind, value: f64) {
        self.set_raw(component, kind.name(), value);
    }

    /// Set a value under an arbitrary name, valid or not.
    pub fn set_raw(&self, component: &ComponentId, name: &str, value: f64) {
        self.values
            .entry(component.clone())
            .or_default()
            .insert(name.to_string(), value);
    }
}

#[async_trait]
impl MetricsSource for StaticMetricsSource {
    async fn fetch(&self, component: &ComponentId) -> HealthResult<BTreeMap<String, f64>> {
        self.values
            .get(component)
            .map(|v| v.clone())
            .ok_or_else(|| HealthError::Source {
                component: component.clone(),
                message: "no metrics published".to_string(),
            })
    }

    fn name(&self) -> &str {
        "static"
    }
}
