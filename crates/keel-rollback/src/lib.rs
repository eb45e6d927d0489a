//! Keel Rollback - closing the loop on deployments
//!
//! Every executed Deployment opens an observation window. Post-action
//! health is sampled once per health-check cycle; a deployment that stays
//! Healthy for the whole window becomes *known-good*, and one that reports
//! Degraded for `degraded_trigger` consecutive observations causes a
//! Rollback request targeting the most recent known-good revision.

#![deny(unsafe_code)]

pub mod config;
pub mod coordinator;
pub mod error;
pub mod history;

pub use config::RollbackConfig;
pub use coordinator::{RollbackCoordinator, RollbackStatus};
pub use error::{RollbackError, RollbackResult};
pub use history::{DeploymentHistory, DeploymentRecord, DeploymentVerdict};
