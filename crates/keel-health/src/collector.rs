//! Signal collector.
//!
//! Polls the metrics source for every registered component, rejects
//! implausible values, derives a health status and keeps a bounded ring of
//! snapshots per component. New snapshots are broadcast to subscribers.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use keel_types::{ComponentId, HealthSnapshot, HealthStatus, Parameter, SignalKind};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::config::CollectorConfig;
use crate::diagnostics::{diagnose, Diagnosis};
use crate::error::{HealthError, HealthResult};
use crate::source::MetricsSource;

/// Minimum test coverage a deployment is scored against.
const COVERAGE_THRESHOLD: f64 = 0.80;

/// Broadcast capacity for the snapshot stream.
const SNAPSHOT_CHANNEL_CAPACITY: usize = 1024;

/// Lifecycle state of the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorState {
    Inactive,
    Active,
    /// The last collection failed.
    Error,
}

/// Collector status report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectorStatus {
    pub state: CollectorState,
    pub last_collection: Option<DateTime<Utc>>,
    pub collections: u64,
    pub failures: u64,
    /// Raw values dropped as unknown or out of range
    pub rejected_values: u64,
    pub last_error: Option<String>,
    pub components: usize,
    pub retained_snapshots: usize,
}

#[derive(Debug)]
struct Counters {
    state: CollectorState,
    last_collection: Option<DateTime<Utc>>,
    collections: u64,
    failures: u64,
    rejected_values: u64,
    last_error: Option<String>,
}

/// Signal collector.
pub struct SignalCollector {
    config: CollectorConfig,
    source: Arc<dyn MetricsSource>,
    rings: DashMap<ComponentId, VecDeque<HealthSnapshot>>,
    snapshot_tx: broadcast::Sender<HealthSnapshot>,
    counters: RwLock<Counters>,
}

impl SignalCollector {
    pub fn new(config: CollectorConfig, source: Arc<dyn MetricsSource>) -> Self {
        let (snapshot_tx, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        Self {
            config,
            source,
            rings: DashMap::new(),
            snapshot_tx,
            counters: RwLock::new(Counters {
                state: CollectorState::Inactive,
                last_collection: None,
                collections: 0,
                failures: 0,
                rejected_values: 0,
                last_error: None,
            }),
        }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Subscribe to new snapshots.
    pub fn subscribe(&self) -> broadcast::Receiver<HealthSnapshot> {
        self.snapshot_tx.subscribe()
    }

    #[instrument(skip(self))]
    pub fn register(&self, component: ComponentId) -> HealthResult<()> {
        if self.rings.contains_key(&component) {
            return Err(HealthError::AlreadyRegistered(component));
        }
        info!(component = %component, "Registering component for signal collection");
        self.rings.insert(component, VecDeque::new());
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn unregister(&self, component: &ComponentId) -> HealthResult<()> {
        self.rings
            .remove(component)
            .map(|_| ())
            .ok_or_else(|| HealthError::ComponentNotFound(component.clone()))
    }

    pub fn components(&self) -> Vec<ComponentId> {
        let mut components: Vec<_> = self.rings.iter().map(|r| r.key().clone()).collect();
        components.sort();
        components
    }

    /// Fetch from the source and ingest the result.
    #[instrument(skip(self), fields(source = self.source.name()))]
    pub async fn collect(&self, component: &ComponentId) -> HealthResult<HealthSnapshot> {
        if !self.rings.contains_key(component) {
            return Err(HealthError::ComponentNotFound(component.clone()));
        }

        match self.source.fetch(component).await {
            Ok(raw) => self.ingest(component, raw),
            Err(e) => {
                self.record_failure(&e);
                Err(e)
            }
        }
    }

    /// Collect every registered component concurrently.
    pub async fn collect_all(&self) -> Vec<HealthSnapshot> {
        let components = self.components();
        let results = join_all(components.iter().map(|c| self.collect(c))).await;

        results
            .into_iter()
            .zip(components)
            .filter_map(|(result, component)| match result {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    warn!(component = %component, error = %e, "Signal collection failed");
                    None
                }
            })
            .collect()
    }

    /// Validate raw values and append a snapshot.
    ///
    /// Unknown names and out-of-range values are dropped individually; the
    /// sample fails only if nothing valid remains.
    pub fn ingest(
        &self,
        component: &ComponentId,
        raw: BTreeMap<String, f64>,
    ) -> HealthResult<HealthSnapshot> {
        let mut metrics = BTreeMap::new();
        let mut rejected = 0u64;

        for (name, value) in raw {
            let Some(kind) = SignalKind::ALL.iter().find(|k| k.name() == name) else {
                debug!(component = %component, signal = %name, "Ignoring unknown signal");
                rejected += 1;
                continue;
            };
            match kind.validate(value) {
                Ok(value) => {
                    metrics.insert(name, value);
                }
                Err(e) => {
                    warn!(component = %component, error = %e, "Rejecting out-of-range signal");
                    rejected += 1;
                }
            }
        }

        if metrics.is_empty() {
            let err = HealthError::NoValidSignals(component.clone());
            self.record_failure(&err);
            return Err(err);
        }

        let diagnosis = diagnose(&metrics, &self.config.thresholds);
        let snapshot = HealthSnapshot {
            component: component.clone(),
            timestamp: Utc::now(),
            metrics,
            status: diagnosis.status,
        };

        {
            let mut ring = self
                .rings
                .get_mut(component)
                .ok_or_else(|| HealthError::ComponentNotFound(component.clone()))?;
            if ring.len() >= self.config.ring_capacity.max(1) {
                ring.pop_front();
            }
            ring.push_back(snapshot.clone());
        }

        {
            let mut counters = self.counters.write().unwrap_or_else(PoisonError::into_inner);
            counters.state = CollectorState::Active;
            counters.last_collection = Some(snapshot.timestamp);
            counters.collections += 1;
            counters.rejected_values += rejected;
            counters.last_error = None;
        }

        debug!(
            component = %component,
            status = %snapshot.status,
            signals = snapshot.metrics.len(),
            "Snapshot collected"
        );
        let _ = self.snapshot_tx.send(snapshot.clone());

        Ok(snapshot)
    }

    fn record_failure(&self, error: &HealthError) {
        let mut counters = self.counters.write().unwrap_or_else(PoisonError::into_inner);
        counters.state = CollectorState::Error;
        counters.failures += 1;
        counters.last_error = Some(error.to_string());
    }

    pub fn latest(&self, component: &ComponentId) -> Option<HealthSnapshot> {
        self.rings.get(component).and_then(|r| r.back().cloned())
    }

    /// Up to `limit` most recent snapshots, oldest first.
    pub fn history(&self, component: &ComponentId, limit: usize) -> Vec<HealthSnapshot> {
        self.rings
            .get(component)
            .map(|ring| {
                let skip = ring.len().saturating_sub(limit);
                ring.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    /// Fraction of recent snapshots that were not critical.
    pub fn stability(&self, component: &ComponentId) -> f64 {
        let recent = self.history(component, self.config.stability_window.max(1));
        if recent.is_empty() {
            return 1.0;
        }
        let stable = recent
            .iter()
            .filter(|s| s.status < HealthStatus::Critical)
            .count();
        stable as f64 / recent.len() as f64
    }

    pub fn diagnose(&self, snapshot: &HealthSnapshot) -> Diagnosis {
        diagnose(&snapshot.metrics, &self.config.thresholds)
    }

    /// Decision parameters for deploying onto the component in this state.
    pub fn deployment_parameters(&self, snapshot: &HealthSnapshot) -> Vec<Parameter> {
        let mut parameters = vec![Parameter::gate(
            "health_check",
            snapshot.status <= HealthStatus::Degraded,
            0.4,
        )];
        if let Some(coverage) = snapshot.metric(SignalKind::TestCoverage) {
            parameters.push(Parameter::higher_is_better(
                "test_coverage",
                coverage,
                COVERAGE_THRESHOLD,
                0.3,
            ));
        }
        if let Some(scan) = snapshot.metric(SignalKind::SecurityScan) {
            parameters.push(Parameter::gate("security_scan", scan > 0.0, 0.3));
        }
        if let Some(error_rate) = snapshot.metric(SignalKind::ErrorRate) {
            parameters.push(Parameter::lower_is_better(
                "error_rate",
                error_rate,
                self.config.thresholds.error_rate.unhealthy,
                0.2,
            ));
        }
        parameters
    }

    pub fn status(&self) -> CollectorStatus {
        let counters = self.counters.read().unwrap_or_else(PoisonError::into_inner);
        CollectorStatus {
            state: counters.state,
            last_collection: counters.last_collection,
            collections: counters.collections,
            failures: counters.failures,
            rejected_values: counters.rejected_values,
            last_error: counters.last_error.clone(),
            components: self.rings.len(),
            retained_snapshots: self.rings.iter().map(|r| r.len()).sum(),
        }
    }

    /// Poll every registered component until `shutdown` flips to true.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.config.interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                interval_secs = self.config.interval().as_secs(),
                "Signal collector started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.collect_all().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            self.counters
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .state = CollectorState::Inactive;
            info!("Signal collector stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticMetricsSource;
    use std::time::Duration;

    fn api() -> ComponentId {
        ComponentId::new("api")
    }

    fn collector(capacity: usize) -> (Arc<SignalCollector>, Arc<StaticMetricsSource>) {
        let source = Arc::new(StaticMetricsSource::new());
        let config = CollectorConfig {
            ring_capacity: capacity,
            ..CollectorConfig::default()
        };
        let collector = Arc::new(SignalCollector::new(config, source.clone()));
        collector.register(api()).unwrap();
        (collector, source)
    }

    #[tokio::test]
    async fn test_collect_derives_status() {
        let (collector, source) = collector(10);
        source.set(&api(), SignalKind::CpuPercent, 85.0);
        source.set(&api(), SignalKind::ErrorRate, 0.002);

        let snapshot = collector.collect(&api()).await.unwrap();
        assert_eq!(snapshot.status, HealthStatus::Unhealthy);
        assert_eq!(snapshot.metric(SignalKind::CpuPercent), Some(85.0));
        assert_eq!(collector.latest(&api()).unwrap(), snapshot);

        let status = collector.status();
        assert_eq!(status.state, CollectorState::Active);
        assert_eq!(status.collections, 1);
        assert!(status.last_collection.is_some());
    }

    #[tokio::test]
    async fn test_out_of_range_values_are_dropped() {
        let (collector, source) = collector(10);
        source.set(&api(), SignalKind::CpuPercent, 250.0);
        source.set(&api(), SignalKind::MemoryPercent, 40.0);
        source.set_raw(&api(), "bogus_metric", 1.0);

        let snapshot = collector.collect(&api()).await.unwrap();
        assert_eq!(snapshot.metrics.len(), 1);
        assert!(snapshot.metric(SignalKind::CpuPercent).is_none());
        assert_eq!(collector.status().rejected_values, 2);
    }

    #[tokio::test]
    async fn test_all_invalid_is_an_error() {
        let (collector, source) = collector(10);
        source.set(&api(), SignalKind::ErrorRate, 3.0);

        let err = collector.collect(&api()).await.unwrap_err();
        assert!(matches!(err, HealthError::NoValidSignals(_)));
        assert_eq!(collector.status().state, CollectorState::Error);
    }

    #[tokio::test]
    async fn test_ring_evicts_oldest() {
        let (collector, _) = collector(3);
        for cpu in [10.0, 20.0, 30.0, 40.0, 50.0] {
            let mut raw = BTreeMap::new();
            raw.insert(SignalKind::CpuPercent.name().to_string(), cpu);
            collector.ingest(&api(), raw).unwrap();
        }

        let history = collector.history(&api(), 10);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].metric(SignalKind::CpuPercent), Some(30.0));
        assert_eq!(history[2].metric(SignalKind::CpuPercent), Some(50.0));
        assert_eq!(collector.status().retained_snapshots, 3);
    }

    #[tokio::test]
    async fn test_unregistered_component() {
        let (collector, _) = collector(3);
        let err = collector.collect(&ComponentId::new("db")).await.unwrap_err();
        assert!(matches!(err, HealthError::ComponentNotFound(_)));
        assert!(matches!(
            collector.register(api()),
            Err(HealthError::AlreadyRegistered(_))
        ));

        collector.unregister(&api()).unwrap();
        assert!(collector.components().is_empty());
        assert!(matches!(
            collector.unregister(&api()),
            Err(HealthError::ComponentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshots_are_broadcast() {
        let (collector, source) = collector(3);
        let mut rx = collector.subscribe();
        source.set(&api(), SignalKind::CpuPercent, 20.0);

        collector.collect(&api()).await.unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.component, api());
    }

    #[tokio::test]
    async fn test_stability_counts_critical() {
        let (collector, _) = collector(10);
        for cpu in [20.0, 95.0, 20.0, 95.0] {
            let mut raw = BTreeMap::new();
            raw.insert(SignalKind::CpuPercent.name().to_string(), cpu);
            collector.ingest(&api(), raw).unwrap();
        }
        assert!((collector.stability(&api()) - 0.5).abs() < 1e-9);
        assert_eq!(collector.stability(&ComponentId::new("db")), 1.0);
    }

    #[tokio::test]
    async fn test_deployment_parameters() {
        let (collector, source) = collector(3);
        source.set(&api(), SignalKind::CpuPercent, 20.0);
        source.set(&api(), SignalKind::TestCoverage, 0.85);
        source.set(&api(), SignalKind::SecurityScan, 1.0);

        let snapshot = collector.collect(&api()).await.unwrap();
        let parameters = collector.deployment_parameters(&snapshot);
        let names: Vec<_> = parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["health_check", "test_coverage", "security_scan"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_loop_collects_and_stops() {
        let (collector, source) = collector(100);
        source.set(&api(), SignalKind::CpuPercent, 20.0);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = collector.clone().spawn(shutdown_rx);
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(collector.history(&api(), 100).len() >= 3);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(collector.status().state, CollectorState::Inactive);
    }
}
