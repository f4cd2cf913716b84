//! # U-Placement Core
//!
//! Core types for the U-Placement scene population engine.
//!
//! This crate provides the data model shared by the collision detector, the pose samplers
//! and the settling simulator in `u-placement-d3`.
//!
//! ## Core Components
//!
//! - **Scene table**: [`Scene`], [`ObjectHandle`], [`PlaceableObject`] - arena of placeable
//!   objects with typed handles and per-object revisions
//! - **Geometry**: [`TriangleMesh`] - indexed meshes and primitives (cube, sphere, plane, room)
//! - **Transforms**: [`Pose`], [`Transform3D`]
//! - **Physics attributes**: [`RigidBodySettings`], [`BodyKind`], [`MassPolicy`],
//!   [`CollisionShape`]
//! - **Configuration**: [`PoseSamplerConfig`], [`SurfaceSamplerConfig`], [`SimulationConfig`],
//!   [`OnExhaustion`]
//!
//! ## Configuration
//!
//! ```rust
//! use u_placement_core::{OnExhaustion, PoseSamplerConfig, SimulationConfig};
//!
//! let sampler = PoseSamplerConfig::new()
//!     .with_max_tries(500)
//!     .with_on_exhaustion(OnExhaustion::Discard);
//! assert!(sampler.validate().is_ok());
//!
//! let simulation = SimulationConfig::new()
//!     .with_time_window(1.0, 10.0)
//!     .with_check_interval(1.0);
//! assert!(simulation.validate().is_ok());
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization support

pub mod config;
pub mod error;
pub mod geometry;
pub mod rigid_body;
pub mod scene;
pub mod transform;

// Re-exports
pub use config::{OnExhaustion, PoseSamplerConfig, SimulationConfig, SurfaceSamplerConfig};
pub use error::{Error, Result};
pub use geometry::TriangleMesh;
pub use rigid_body::{BodyKind, CollisionShape, MassPolicy, RigidBodySettings};
pub use scene::{ObjectHandle, PlaceableObject, Scene};
pub use transform::{Pose, Transform3D};
