//! SLA configuration

use std::time::Duration;

use keel_types::Priority;
use serde::{Deserialize, Serialize};

/// Response deadlines per priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaConfig {
    /// Critical response window in seconds
    #[serde(default = "default_critical_secs")]
    pub critical_secs: u64,

    /// High response window in seconds
    #[serde(default = "default_high_secs")]
    pub high_secs: u64,

    /// Medium response window in seconds
    #[serde(default = "default_medium_secs")]
    pub medium_secs: u64,

    /// Low response window in seconds
    #[serde(default = "default_low_secs")]
    pub low_secs: u64,

    /// How often the ticker scans for overdue tickets
    #[serde(default = "default_ticker_interval_secs")]
    pub ticker_interval_secs: u64,

    /// How long resolved and expired tickets stay queryable, in seconds.
    /// Late resolution of an expired ticket is possible within this window.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

fn default_critical_secs() -> u64 {
    15 * 60
}

fn default_high_secs() -> u64 {
    60 * 60
}

fn default_medium_secs() -> u64 {
    4 * 60 * 60
}

fn default_low_secs() -> u64 {
    24 * 60 * 60
}

fn default_ticker_interval_secs() -> u64 {
    30
}

fn default_retention_secs() -> u64 {
    7 * 24 * 60 * 60
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            critical_secs: default_critical_secs(),
            high_secs: default_high_secs(),
            medium_secs: default_medium_secs(),
            low_secs: default_low_secs(),
            ticker_interval_secs: default_ticker_interval_secs(),
            retention_secs: default_retention_secs(),
        }
    }
}

impl SlaConfig {
    /// Time allowed between ticket creation and a guardian response.
    pub fn window(&self, priority: Priority) -> Duration {
        let secs = match priority {
            Priority::Critical => self.critical_secs,
            Priority::High => self.high_secs,
            Priority::Medium => self.medium_secs,
            Priority::Low => self.low_secs,
        };
        Duration::from_secs(secs)
    }

    pub fn ticker_interval(&self) -> Duration {
        Duration::from_secs(self.ticker_interval_secs.max(1))
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

/// How quickly guardians are told about a new ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTiming {
    Immediate,
    Batched,
    DailySummary,
}

impl EscalationTiming {
    pub fn for_priority(priority: Priority) -> Self {
        match priority {
            Priority::Critical | Priority::High => EscalationTiming::Immediate,
            Priority::Medium => EscalationTiming::Batched,
            Priority::Low => EscalationTiming::DailySummary,
        }
    }
}
