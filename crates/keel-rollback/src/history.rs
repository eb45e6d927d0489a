//! Per-component deployment history

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use keel_types::{DecisionId, PostActionHealth, Revision};
use serde::{Deserialize, Serialize};

/// Where a deployment stands after its observations so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentVerdict {
    /// Window still open
    Observing,
    /// Healthy for the whole window; eligible as a rollback target
    KnownGood,
    /// Window closed with at least one non-healthy observation
    Unstable,
    /// Sustained degradation; a rollback was requested or skipped
    Degraded,
}

impl fmt::Display for DeploymentVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeploymentVerdict::Observing => "observing",
            DeploymentVerdict::KnownGood => "known_good",
            DeploymentVerdict::Unstable => "unstable",
            DeploymentVerdict::Degraded => "degraded",
        };
        f.write_str(s)
    }
}

/// What a single observation did to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ObservationEffect {
    /// Window already closed
    Closed,
    Recorded,
    BecameKnownGood,
    BecameUnstable,
    /// Consecutive degraded observations reached the trigger
    Triggered,
}

/// One executed deployment and what was seen after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub decision_id: DecisionId,
    pub revision: Revision,
    pub deployed_at: DateTime<Utc>,
    pub observations: Vec<PostActionHealth>,
    pub consecutive_degraded: usize,
    pub verdict: DeploymentVerdict,
}

impl DeploymentRecord {
    pub fn new(decision_id: DecisionId, revision: Revision, deployed_at: DateTime<Utc>) -> Self {
        Self {
            decision_id,
            revision,
            deployed_at,
            observations: Vec::new(),
            consecutive_degraded: 0,
            verdict: DeploymentVerdict::Observing,
        }
    }

    pub fn is_known_good(&self) -> bool {
        self.verdict == DeploymentVerdict::KnownGood
    }

    /// Fraction of recorded observations that were Healthy.
    pub fn healthy_ratio(&self) -> f64 {
        if self.observations.is_empty() {
            return 0.0;
        }
        let healthy = self
            .observations
            .iter()
            .filter(|h| **h == PostActionHealth::Healthy)
            .count();
        healthy as f64 / self.observations.len() as f64
    }

    pub(crate) fn observe(
        &mut self,
        health: PostActionHealth,
        window: usize,
        trigger: usize,
    ) -> ObservationEffect {
        if self.verdict != DeploymentVerdict::Observing {
            return ObservationEffect::Closed;
        }

        self.observations.push(health);
        if health == PostActionHealth::Degraded {
            self.consecutive_degraded += 1;
        } else {
            self.consecutive_degraded = 0;
        }

        if self.consecutive_degraded >= trigger {
            self.verdict = DeploymentVerdict::Degraded;
            return ObservationEffect::Triggered;
        }

        if self.observations.len() < window {
            return ObservationEffect::Recorded;
        }

        if self
            .observations
            .iter()
            .all(|h| *h == PostActionHealth::Healthy)
        {
            self.verdict = DeploymentVerdict::KnownGood;
            ObservationEffect::BecameKnownGood
        } else {
            self.verdict = DeploymentVerdict::Unstable;
            ObservationEffect::BecameUnstable
        }
    }
}

/// Bounded list of deployments for one component, oldest first.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeploymentHistory {
    records: VecDeque<DeploymentRecord>,
    #[serde(skip)]
    capacity: usize,
}

impl DeploymentHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, record: DeploymentRecord) {
        if self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// The most recent deployment.
    pub fn current(&self) -> Option<&DeploymentRecord> {
        self.records.back()
    }

    pub(crate) fn current_mut(&mut self) -> Option<&mut DeploymentRecord> {
        self.records.back_mut()
    }

    /// Most recent known-good deployment before the current one.
    pub fn last_known_good(&self) -> Option<&DeploymentRecord> {
        self.records
            .iter()
            .rev()
            .skip(1)
            .find(|r| r.is_known_good())
    }

    pub fn find_revision(&self, revision: &Revision) -> Option<&DeploymentRecord> {
        self.records.iter().rev().find(|r| &r.revision == revision)
    }

    pub fn records(&self) -> impl Iterator<Item = &DeploymentRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
