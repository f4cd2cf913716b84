//! Error type for scenario construction and reporting.

use thiserror::Error;

/// Errors raised while building, running or saving scenarios.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// The placement engine rejected its input.
    #[error("engine error: {0}")]
    Engine(#[from] u_placement_core::Error),

    /// A scenario parameter is out of range.
    #[error("invalid scenario '{name}': {reason}")]
    InvalidScenario { name: String, reason: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for the benchmark crate.
pub type Result<T> = std::result::Result<T, ScenarioError>;
