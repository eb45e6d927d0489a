//! Configuration for keeld

use std::path::PathBuf;
use std::time::Duration;

use keel_control::ControlConfig;
use serde::{Deserialize, Serialize};

/// Main daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Decision, guardian, health and rollback settings
    #[serde(default)]
    pub control: ControlConfig,

    /// Components to monitor
    #[serde(default = "default_components")]
    pub components: Vec<String>,

    /// JSON-lines audit file; in-memory when unset
    #[serde(default)]
    pub audit_path: Option<PathBuf>,

    /// How often a status summary is logged
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,

    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            control: ControlConfig::default(),
            components: default_components(),
            audit_path: None,
            status_interval_secs: default_status_interval(),
            simulation: SimulationConfig::default(),
        }
    }
}

/// Simulated metrics source and executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Chance per collection that a healthy component starts degrading
    #[serde(default = "default_degradation_probability")]
    pub degradation_probability: f64,

    /// Chance that a healing or rollback action clears the degradation
    #[serde(default = "default_recovery_probability")]
    pub recovery_probability: f64,

    /// Fixed RNG seed for reproducible runs
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            degradation_probability: default_degradation_probability(),
            recovery_probability: default_recovery_probability(),
            seed: None,
        }
    }
}

// Default value helpers
fn default_components() -> Vec<String> {
    vec!["api".to_string(), "worker".to_string()]
}

fn default_status_interval() -> u64 {
    60
}

fn default_degradation_probability() -> f64 {
    0.05
}

fn default_recovery_probability() -> f64 {
    0.7
}

impl DaemonConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `KEEL_` environment variables (`__` separates nested keys).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("KEEL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs.max(1))
    }
}
