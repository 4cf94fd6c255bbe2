//! The deployment pipeline and the commands built on it.
//!
//! `deploy` runs the stages listed in [`Stage`] in order and persists the
//! resolved configuration after each one that changes it. A stage failure
//! stops the run; the next run starts over from the persisted state.

mod builder;
mod core;
mod lifecycle;
mod plan;
mod stage;
mod sync;
#[cfg(test)]
mod testing;

pub use builder::OrchestratorBuilder;
pub use core::Orchestrator;
pub use plan::{PlanSummary, PlannedModule};
pub use stage::{DeployOptions, DeployReport, Stage};
