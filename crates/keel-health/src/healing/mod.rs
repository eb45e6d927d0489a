//! Bounded self-healing.

mod context;
mod controller;

pub use context::HealingContext;
pub use controller::{DeferReason, HealingPlan, SelfHealingController};
