//! # U-Placement 3D
//!
//! Collision-aware placement and physics settling for procedurally populated 3D scenes.
//!
//! This crate works on a [`Scene`] from `u-placement-core` and provides:
//!
//! - **Collision detection**: broad-phase AABB test, narrow-phase BVH triangle overlap and
//!   optional containment check, backed by a per-session [`BvhCache`]
//! - **Pose sampling**: retry-based random placement against a growing working set
//! - **Surface sampling**: drop-to-contact placement on a supporting object with spacing
//!   control
//! - **Settling**: time-stepped rigid-body simulation with convergence detection
//!
//! ## Example
//!
//! ```rust
//! use nalgebra::Vector3;
//! use std::collections::HashSet;
//! use u_placement_core::{PoseSamplerConfig, Scene, TriangleMesh};
//! use u_placement_d3::{BvhCache, PoseSampler, UniformVolumeSampler};
//!
//! let mut scene = Scene::new();
//! let cubes: Vec<_> = (0..4)
//!     .map(|i| scene.add_object(format!("cube{}", i), TriangleMesh::unit_cube()).unwrap())
//!     .collect();
//!
//! let mut generator =
//!     UniformVolumeSampler::new(Vector3::new(-5.0, -5.0, 0.0), Vector3::new(5.0, 5.0, 0.0))
//!         .with_seed(1);
//! let report = PoseSampler::new(PoseSamplerConfig::new().with_max_tries(100))
//!     .sample_poses(
//!         &mut scene,
//!         &mut BvhCache::new(),
//!         &cubes,
//!         &mut generator,
//!         None,
//!         &HashSet::new(),
//!     )
//!     .unwrap();
//! assert_eq!(report.outcomes.len(), 4);
//! ```

pub mod aabb;
pub mod bvh;
pub mod bvh_cache;
pub mod collision;
pub mod physics;
pub mod pose_sampler;
pub mod surface_sampler;
pub mod triangle;

// Re-exports
pub use aabb::Aabb3D;
pub use bvh::{Bvh, NearestHit, RayHit};
pub use bvh_cache::BvhCache;
pub use collision::{bbox_intersects, collides_with_any, intersects, is_point_inside};
pub use physics::{SettlingReport, SettlingSimulator};
pub use pose_sampler::{
    PlacementOutcome, PlacementReport, PlacementStatus, PoseGenerator, PoseSampler,
    UniformVolumeSampler,
};
pub use surface_sampler::{SurfacePlacementReport, SurfaceSampler, UpperRegionSampler};
pub use u_placement_core::{Error, ObjectHandle, Pose, Result, Scene};
