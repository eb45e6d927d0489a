//! Keel Health - signal collection, diagnostics and self-healing
//!
//! The [`SignalCollector`] turns raw metrics into [`HealthSnapshot`]s,
//! [`diagnose`] grades each signal against its [`Band`], and the
//! [`SelfHealingController`] turns unhealthy snapshots into Healing
//! decision requests. After three consecutive failed attempts the
//! controller escalates to a guardian instead of trying again.
//!
//! [`HealthSnapshot`]: keel_types::HealthSnapshot

#![deny(unsafe_code)]

pub mod collector;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod healing;
pub mod source;

pub use collector::{CollectorState, CollectorStatus, SignalCollector};
pub use config::{Band, CollectorConfig, DiagnosticThresholds, HealingConfig};
pub use diagnostics::{diagnose, Diagnosis, Finding, Remedy};
pub use error::{HealthError, HealthResult};
pub use healing::{DeferReason, HealingContext, HealingPlan, SelfHealingController};
pub use source::{MetricsSource, StaticMetricsSource};
