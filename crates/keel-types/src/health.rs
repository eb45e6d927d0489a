//! Normalized health signal.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::ids::ComponentId;
use crate::outcome::PostActionHealth;

/// Overall health derived from a snapshot, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Critical,
}

impl HealthStatus {
    /// Unhealthy or worse; the healing controller acts on these.
    pub fn needs_healing(&self) -> bool {
        *self >= HealthStatus::Unhealthy
    }

    /// Coarser view used for action outcomes.
    pub fn to_post_action_health(self) -> PostActionHealth {
        match self {
            HealthStatus::Healthy => PostActionHealth::Healthy,
            HealthStatus::Degraded => PostActionHealth::Warning,
            HealthStatus::Unhealthy | HealthStatus::Critical => PostActionHealth::Degraded,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Raw signals accepted from a metrics source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    CpuPercent,
    MemoryPercent,
    DiskPercent,
    /// Fraction of failed requests.
    ErrorRate,
    ResponseTimeMs,
    /// Fraction of lines covered by tests.
    TestCoverage,
    /// 1.0 when the last security scan passed.
    SecurityScan,
}

impl SignalKind {
    pub const ALL: [SignalKind; 7] = [
        SignalKind::CpuPercent,
        SignalKind::MemoryPercent,
        SignalKind::DiskPercent,
        SignalKind::ErrorRate,
        SignalKind::ResponseTimeMs,
        SignalKind::TestCoverage,
        SignalKind::SecurityScan,
    ];

    /// Metric key used in [`HealthSnapshot::metrics`].
    pub fn name(&self) -> &'static str {
        match self {
            SignalKind::CpuPercent => "cpu_percent",
            SignalKind::MemoryPercent => "memory_percent",
            SignalKind::DiskPercent => "disk_percent",
            SignalKind::ErrorRate => "error_rate",
            SignalKind::ResponseTimeMs => "response_time_ms",
            SignalKind::TestCoverage => "test_coverage",
            SignalKind::SecurityScan => "security_scan",
        }
    }

    /// Inclusive range of plausible values.
    pub fn valid_range(&self) -> (f64, f64) {
        match self {
            SignalKind::CpuPercent | SignalKind::MemoryPercent | SignalKind::DiskPercent => {
                (0.0, 100.0)
            }
            SignalKind::ErrorRate | SignalKind::TestCoverage | SignalKind::SecurityScan => {
                (0.0, 1.0)
            }
            SignalKind::ResponseTimeMs => (0.0, 600_000.0),
        }
    }

    /// Reject non-finite or out-of-range raw values.
    pub fn validate(&self, value: f64) -> Result<f64, ValidationError> {
        let (min, max) = self.valid_range();
        if !value.is_finite() || value < min || value > max {
            return Err(ValidationError::OutOfRange {
                signal: self.name().to_string(),
                value,
                min,
                max,
            });
        }
        Ok(value)
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One validated sample of a component's signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub component: ComponentId,
    pub timestamp: DateTime<Utc>,
    pub metrics: BTreeMap<String, f64>,
    pub status: HealthStatus,
}

impl HealthSnapshot {
    pub fn metric(&self, kind: SignalKind) -> Option<f64> {
        self.metrics.get(kind.name()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_ordering() {
        assert!(HealthStatus::Healthy < HealthStatus::Degraded);
        assert!(HealthStatus::Unhealthy < HealthStatus::Critical);
        assert!(!HealthStatus::Degraded.needs_healing());
        assert!(HealthStatus::Unhealthy.needs_healing());
    }

    #[test]
    fn test_post_action_mapping() {
        assert_eq!(
            HealthStatus::Healthy.to_post_action_health(),
            PostActionHealth::Healthy
        );
        assert_eq!(
            HealthStatus::Degraded.to_post_action_health(),
            PostActionHealth::Warning
        );
        assert_eq!(
            HealthStatus::Critical.to_post_action_health(),
            PostActionHealth::Degraded
        );
    }

    #[test]
    fn test_signal_range_validation() {
        assert!(SignalKind::CpuPercent.validate(55.0).is_ok());
        assert!(SignalKind::CpuPercent.validate(140.0).is_err());
        assert!(SignalKind::ErrorRate.validate(-0.1).is_err());
        assert!(SignalKind::ResponseTimeMs.validate(f64::NAN).is_err());
    }
}
