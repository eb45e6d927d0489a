//! Bounded decision history and derived metrics
//!
//! History is for operators and dashboards. Nothing in the pipeline
//! consults it when deciding.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{PoisonError, RwLock};

use keel_types::{Classification, DecisionResult, DecisionType};
use serde::Serialize;

/// Default number of retained results.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Ring buffer of recent decision results, oldest evicted first.
#[derive(Debug)]
pub struct DecisionHistory {
    capacity: usize,
    entries: RwLock<VecDeque<DecisionResult>>,
}

impl Default for DecisionHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl DecisionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn record(&self, result: DecisionResult) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(result);
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Most recent results, newest last, optionally filtered by type.
    pub fn recent(&self, decision_type: Option<DecisionType>, limit: usize) -> Vec<DecisionResult> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<DecisionResult> = entries
            .iter()
            .rev()
            .filter(|r| decision_type.map_or(true, |t| r.decision_type == t))
            .take(limit)
            .cloned()
            .collect();
        out.reverse();
        out
    }

    pub fn metrics(&self) -> DecisionMetrics {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        DecisionMetrics::from_results(entries.iter())
    }
}

/// Rates over a set of results.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassificationRates {
    pub total: usize,
    pub auto_approval_rate: f64,
    pub auto_rejection_rate: f64,
    pub guardian_required_rate: f64,
    pub average_confidence: f64,
}

#[derive(Debug, Default)]
struct Tally {
    total: usize,
    approved: usize,
    rejected: usize,
    pending: usize,
    confidence_sum: f64,
}

impl Tally {
    fn add(&mut self, result: &DecisionResult) {
        self.total += 1;
        self.confidence_sum += result.confidence;
        match result.classification {
            Classification::AutoApproved => self.approved += 1,
            Classification::AutoRejected => self.rejected += 1,
            Classification::PendingGuardian => self.pending += 1,
        }
    }

    fn rates(&self) -> ClassificationRates {
        if self.total == 0 {
            return ClassificationRates::default();
        }
        let total = self.total as f64;
        ClassificationRates {
            total: self.total,
            auto_approval_rate: self.approved as f64 / total,
            auto_rejection_rate: self.rejected as f64 / total,
            guardian_required_rate: self.pending as f64 / total,
            average_confidence: self.confidence_sum / total,
        }
    }
}

/// Decision-making metrics over the retained history.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DecisionMetrics {
    pub overall: ClassificationRates,
    pub by_type: BTreeMap<DecisionType, ClassificationRates>,
}

impl DecisionMetrics {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a DecisionResult>) -> Self {
        let mut overall = Tally::default();
        let mut by_type: BTreeMap<DecisionType, Tally> = BTreeMap::new();

        for result in results {
            overall.add(result);
            by_type.entry(result.decision_type).or_default().add(result);
        }

        Self {
            overall: overall.rates(),
            by_type: by_type.into_iter().map(|(t, tally)| (t, tally.rates())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DecisionEngine;
    use keel_types::{DecisionIdAllocator, DecisionRequest, Parameter, Priority};

    fn result(decision_type: DecisionType, passed: bool, allocator: &DecisionIdAllocator) -> DecisionResult {
        let request = DecisionRequest::builder(decision_type, Priority::Low, "api")
            .parameter(Parameter::gate("health_check", passed, 1.0))
            .build_with(allocator)
            .unwrap();
        DecisionEngine::default().evaluate(&request)
    }

    #[test]
    fn test_history_is_bounded() {
        let allocator = DecisionIdAllocator::new();
        let history = DecisionHistory::new(3);
        for _ in 0..5 {
            history.record(result(DecisionType::Scaling, true, &allocator));
        }
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_recent_filters_and_keeps_order() {
        let allocator = DecisionIdAllocator::new();
        let history = DecisionHistory::default();
        let first = result(DecisionType::Scaling, true, &allocator);
        history.record(first.clone());
        history.record(result(DecisionType::Monitoring, true, &allocator));
        let last = result(DecisionType::Scaling, false, &allocator);
        history.record(last.clone());

        let scaling = history.recent(Some(DecisionType::Scaling), 10);
        assert_eq!(scaling.len(), 2);
        assert_eq!(scaling[0].decision_id, first.decision_id);
        assert_eq!(scaling[1].decision_id, last.decision_id);

        assert_eq!(history.recent(None, 1)[0].decision_id, last.decision_id);
    }

    #[test]
    fn test_metrics() {
        let allocator = DecisionIdAllocator::new();
        let history = DecisionHistory::default();
        history.record(result(DecisionType::Scaling, true, &allocator));
        history.record(result(DecisionType::Scaling, false, &allocator));
        history.record(result(DecisionType::GuardianOverride, true, &allocator));
        history.record(result(DecisionType::Monitoring, true, &allocator));

        let metrics = history.metrics();
        assert_eq!(metrics.overall.total, 4);
        assert!((metrics.overall.auto_approval_rate - 0.5).abs() < 1e-9);
        assert!((metrics.overall.auto_rejection_rate - 0.25).abs() < 1e-9);
        assert!((metrics.overall.guardian_required_rate - 0.25).abs() < 1e-9);
        assert!((metrics.overall.average_confidence - 0.75).abs() < 1e-9);

        let scaling = &metrics.by_type[&DecisionType::Scaling];
        assert_eq!(scaling.total, 2);
        assert!((scaling.auto_approval_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_metrics() {
        let metrics = DecisionHistory::default().metrics();
        assert_eq!(metrics.overall.total, 0);
        assert!(metrics.by_type.is_empty());
    }
}
