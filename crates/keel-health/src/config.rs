//! Configuration for collection, diagnostics and healing.

use std::time::Duration;

use keel_types::{HealthStatus, SignalKind};
use serde::{Deserialize, Serialize};

/// Degraded / unhealthy / critical cut-offs for one signal. A value at or
/// above a cut-off falls into that band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub degraded: f64,
    pub unhealthy: f64,
    pub critical: f64,
}

impl Band {
    pub const fn new(degraded: f64, unhealthy: f64, critical: f64) -> Self {
        Self {
            degraded,
            unhealthy,
            critical,
        }
    }

    pub fn classify(&self, value: f64) -> HealthStatus {
        if value >= self.critical {
            HealthStatus::Critical
        } else if value >= self.unhealthy {
            HealthStatus::Unhealthy
        } else if value >= self.degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Diagnostic thresholds per signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticThresholds {
    /// CPU usage in percent
    pub cpu_percent: Band,
    /// Memory usage in percent
    pub memory_percent: Band,
    /// Disk usage in percent
    pub disk_percent: Band,
    /// Fraction of failed requests
    pub error_rate: Band,
    /// Response time in milliseconds
    pub response_time_ms: Band,
}

impl Default for DiagnosticThresholds {
    fn default() -> Self {
        Self {
            cpu_percent: Band::new(60.0, 80.0, 90.0),
            memory_percent: Band::new(70.0, 85.0, 95.0),
            disk_percent: Band::new(80.0, 90.0, 95.0),
            error_rate: Band::new(0.01, 0.05, 0.10),
            response_time_ms: Band::new(500.0, 1000.0, 2000.0),
        }
    }
}

impl DiagnosticThresholds {
    /// Band for a signal that contributes to health status.
    pub fn band(&self, kind: SignalKind) -> Option<&Band> {
        match kind {
            SignalKind::CpuPercent => Some(&self.cpu_percent),
            SignalKind::MemoryPercent => Some(&self.memory_percent),
            SignalKind::DiskPercent => Some(&self.disk_percent),
            SignalKind::ErrorRate => Some(&self.error_rate),
            SignalKind::ResponseTimeMs => Some(&self.response_time_ms),
            SignalKind::TestCoverage | SignalKind::SecurityScan => None,
        }
    }
}

/// Signal collector configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Collection interval in seconds
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Snapshots retained per component
    #[serde(default = "default_ring_capacity")]
    pub ring_capacity: usize,

    /// Snapshots considered when computing stability
    #[serde(default = "default_stability_window")]
    pub stability_window: usize,

    #[serde(default)]
    pub thresholds: DiagnosticThresholds,
}

fn default_interval_secs() -> u64 {
    15
}

fn default_ring_capacity() -> usize {
    1000
}

fn default_stability_window() -> usize {
    10
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            ring_capacity: default_ring_capacity(),
            stability_window: default_stability_window(),
            thresholds: DiagnosticThresholds::default(),
        }
    }
}

impl CollectorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Self-healing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealingConfig {
    /// Failed attempts before escalating to a guardian
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay in seconds, doubled per failure
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,

    /// Quiet period after a completed healing action, in seconds
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_secs() -> u64 {
    1
}

fn default_cooldown_secs() -> u64 {
    300
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base_secs(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl HealingConfig {
    /// Delay before retrying after the `attempts`-th failure: 1s, 2s, 4s...
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(16);
        Duration::from_secs(self.backoff_base_secs.saturating_mul(1u64 << exponent))
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}
