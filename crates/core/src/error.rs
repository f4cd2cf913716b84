//! Error type shared by all u-placement crates.

use crate::scene::ObjectHandle;
use thiserror::Error;

/// Errors raised by the placement engine.
///
/// Placement shortfalls and simulation timeouts are not errors; they are reported
/// as per-object outcomes. Only invalid input is rejected.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// A configuration value is out of range (non-positive tries, inverted time window, ...).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Mesh data is malformed (dangling triangle indices, non-finite vertices).
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// The handle does not refer to a live object of the scene.
    #[error("object {0} not found")]
    NotFound(ObjectHandle),

    /// An object with this name already exists in the scene.
    #[error("duplicate object name: {0}")]
    DuplicateName(String),

    /// Internal invariant violated.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;
