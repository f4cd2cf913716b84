//! Scenario Suite for U-Placement
//!
//! This crate provides:
//! - Synthetic scene scenarios (scattered props, objects on a table, spheres in a room)
//! - A scenario runner driving the pose sampler, surface sampler and settling simulator
//! - Result recording with collision audit and JSON export

mod error;
mod result;
mod runner;
mod scenario;

pub use error::{Result, ScenarioError};
pub use result::{PoseRecord, ScenarioReport, ScenarioResult, SettlingSummary};
pub use runner::{RunnerConfig, ScenarioRunner};
pub use scenario::{Scenario, ScenarioKind, SceneSetup};
