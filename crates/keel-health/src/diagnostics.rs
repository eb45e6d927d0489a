//! Diagnostics over a validated metric set.

use std::collections::BTreeMap;
use std::fmt;

use keel_types::{HealthStatus, SignalKind};
use serde::{Deserialize, Serialize};

use crate::config::DiagnosticThresholds;

/// One signal outside its healthy band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub signal: SignalKind,
    pub value: f64,
    pub status: HealthStatus,
    pub message: String,
}

/// Repair to attempt for the dominant finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Remedy {
    ReduceCpuLoad,
    FreeMemory,
    FreeDiskSpace,
    RestartService,
}

impl Remedy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Remedy::ReduceCpuLoad => "reduce_cpu_load",
            Remedy::FreeMemory => "free_memory",
            Remedy::FreeDiskSpace => "free_disk_space",
            Remedy::RestartService => "restart_service",
        }
    }

    fn for_signal(signal: SignalKind) -> Self {
        match signal {
            SignalKind::CpuPercent => Remedy::ReduceCpuLoad,
            SignalKind::MemoryPercent => Remedy::FreeMemory,
            SignalKind::DiskPercent => Remedy::FreeDiskSpace,
            _ => Remedy::RestartService,
        }
    }
}

impl fmt::Display for Remedy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of running every diagnostic check on a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnosis {
    /// Worst status across all checked signals
    pub status: HealthStatus,
    /// Non-healthy signals, worst first
    pub findings: Vec<Finding>,
    /// Number of signals checked
    pub checked: usize,
}

impl Diagnosis {
    pub fn worst(&self) -> Option<&Finding> {
        self.findings.first()
    }

    pub fn remedy(&self) -> Option<Remedy> {
        self.worst().map(|f| Remedy::for_signal(f.signal))
    }

    /// Fraction of checked signals that are not critical.
    pub fn non_critical_ratio(&self) -> f64 {
        if self.checked == 0 {
            return 1.0;
        }
        let critical = self
            .findings
            .iter()
            .filter(|f| f.status == HealthStatus::Critical)
            .count();
        (self.checked - critical) as f64 / self.checked as f64
    }

    pub fn summary(&self) -> String {
        if self.findings.is_empty() {
            return "All checks passed".to_string();
        }
        self.findings
            .iter()
            .map(|f| f.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Run every diagnostic check on `metrics`.
pub fn diagnose(metrics: &BTreeMap<String, f64>, thresholds: &DiagnosticThresholds) -> Diagnosis {
    let mut findings = Vec::new();
    let mut checked = 0;

    for kind in SignalKind::ALL {
        let (Some(band), Some(&value)) = (thresholds.band(kind), metrics.get(kind.name())) else {
            continue;
        };
        checked += 1;

        let status = band.classify(value);
        if status != HealthStatus::Healthy {
            findings.push(Finding {
                signal: kind,
                value,
                status,
                message: format!("{} {}: {}", label(kind), adjective(status), format_value(kind, value)),
            });
        }
    }

    findings.sort_by(|a, b| b.status.cmp(&a.status));
    let status = findings
        .first()
        .map(|f| f.status)
        .unwrap_or(HealthStatus::Healthy);

    Diagnosis {
        status,
        findings,
        checked,
    }
}

fn label(kind: SignalKind) -> &'static str {
    match kind {
        SignalKind::CpuPercent => "CPU usage",
        SignalKind::MemoryPercent => "Memory usage",
        SignalKind::DiskPercent => "Disk usage",
        SignalKind::ErrorRate => "Error rate",
        SignalKind::ResponseTimeMs => "Response time",
        SignalKind::TestCoverage => "Test coverage",
        SignalKind::SecurityScan => "Security scan",
    }
}

fn adjective(status: HealthStatus) -> &'static str {
    match status {
        HealthStatus::Healthy => "normal",
        HealthStatus::Degraded => "elevated",
        HealthStatus::Unhealthy => "high",
        HealthStatus::Critical => "critical",
    }
}

fn format_value(kind: SignalKind, value: f64) -> String {
    match kind {
        SignalKind::ErrorRate | SignalKind::TestCoverage => format!("{:.1}%", value * 100.0),
        SignalKind::ResponseTimeMs => format!("{value:.0}ms"),
        SignalKind::SecurityScan => format!("{value}"),
        _ => format!("{value:.1}%"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(pairs: &[(SignalKind, f64)]) -> BTreeMap<String, f64> {
        pairs
            .iter()
            .map(|(k, v)| (k.name().to_string(), *v))
            .collect()
    }

    #[test]
    fn test_all_healthy() {
        let diagnosis = diagnose(
            &metrics(&[
                (SignalKind::CpuPercent, 30.0),
                (SignalKind::MemoryPercent, 40.0),
                (SignalKind::ErrorRate, 0.001),
                (SignalKind::TestCoverage, 0.9),
            ]),
            &DiagnosticThresholds::default(),
        );
        assert_eq!(diagnosis.status, HealthStatus::Healthy);
        assert_eq!(diagnosis.checked, 3);
        assert!(diagnosis.remedy().is_none());
        assert_eq!(diagnosis.summary(), "All checks passed");
    }

    #[test]
    fn test_worst_signal_wins() {
        let diagnosis = diagnose(
            &metrics(&[
                (SignalKind::CpuPercent, 65.0),
                (SignalKind::MemoryPercent, 96.0),
                (SignalKind::ResponseTimeMs, 1200.0),
            ]),
            &DiagnosticThresholds::default(),
        );
        assert_eq!(diagnosis.status, HealthStatus::Critical);
        assert_eq!(diagnosis.findings.len(), 3);
        assert_eq!(diagnosis.worst().unwrap().signal, SignalKind::MemoryPercent);
        assert_eq!(diagnosis.remedy(), Some(Remedy::FreeMemory));
        assert!((diagnosis.non_critical_ratio() - 2.0 / 3.0).abs() < 1e-9);
        assert!(diagnosis.summary().starts_with("Memory usage critical: 96.0%"));
    }

    #[test]
    fn test_error_rate_maps_to_restart() {
        let diagnosis = diagnose(
            &metrics(&[(SignalKind::ErrorRate, 0.07)]),
            &DiagnosticThresholds::default(),
        );
        assert_eq!(diagnosis.status, HealthStatus::Unhealthy);
        assert_eq!(diagnosis.remedy(), Some(Remedy::RestartService));
    }
}
