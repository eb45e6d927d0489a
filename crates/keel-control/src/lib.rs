//! # Keel Control Plane
//!
//! Single entry point wiring the decision engine, guardian escalation,
//! signal collection, self-healing and rollback coordination together.
//!
//! ## Key Components
//!
//! - [`ControlPlane`]: submits requests, resolves tickets, reacts to
//!   snapshots and runs the background loops
//! - [`ControlPlaneBuilder`]: assembles the control plane from its
//!   collaborators
//! - [`ActionExecutor`]: the deploy/scale/heal/rollback mechanics, wrapped
//!   by [`IdempotentExecutor`] so each decision executes at most once
//! - [`EventAggregator`]: live event stream for observers
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use keel_control::{ControlPlaneBuilder, ScriptedExecutor};
//! use keel_health::StaticMetricsSource;
//! use keel_types::{DecisionRequest, DecisionType, Parameter, PostActionHealth, Priority};
//!
//! # async fn example() -> keel_control::ControlResult<()> {
//! let plane = ControlPlaneBuilder::new()
//!     .with_executor(Arc::new(ScriptedExecutor::reporting(PostActionHealth::Healthy)))
//!     .with_metrics_source(Arc::new(StaticMetricsSource::new()))
//!     .build()?;
//!
//! let submission = plane
//!     .request(
//!         DecisionRequest::builder(DecisionType::Scaling, Priority::Medium, "api")
//!             .parameter(Parameter::ratio("cpu_headroom", 0.8, 1.0)),
//!     )
//!     .await?;
//! println!("{}", submission.result.reasoning);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod builder;
pub mod config;
pub mod control_plane;
pub mod error;
pub mod events;
pub mod executor;

pub use builder::ControlPlaneBuilder;
pub use config::{ControlConfig, LoopConfig};
pub use control_plane::{ControlPlane, ControlStatus, Submission, TicketResolution};
pub use error::{ControlError, ControlResult};
pub use events::{ControlEvent, ControlEventEnvelope, EventAggregator};
pub use executor::{ActionExecutor, ExecutionError, IdempotentExecutor, ScriptedExecutor};
