//! Rigid poses and scaled world transforms.

use nalgebra::{Matrix3, Point3, UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Location and rotation of an object, without scale.
///
/// This is what pose generators produce and what the settling simulator commits.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pose {
    /// World-space location of the object origin.
    pub location: Vector3<f64>,
    /// World-space rotation.
    pub rotation: UnitQuaternion<f64>,
}

impl Pose {
    /// Creates a pose from a location and a rotation.
    pub fn new(location: Vector3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        Self { location, rotation }
    }

    /// The identity pose.
    pub fn identity() -> Self {
        Self::new(Vector3::zeros(), UnitQuaternion::identity())
    }

    /// A pure translation.
    pub fn from_location(location: Vector3<f64>) -> Self {
        Self::new(location, UnitQuaternion::identity())
    }

    /// Creates a pose from XYZ Euler angles (radians), applied X first, then Y, then Z.
    pub fn from_euler(location: Vector3<f64>, euler: Vector3<f64>) -> Self {
        Self::new(
            location,
            UnitQuaternion::from_euler_angles(euler.x, euler.y, euler.z),
        )
    }

    /// Returns the rotation as XYZ Euler angles (radians).
    pub fn euler_angles(&self) -> Vector3<f64> {
        let (x, y, z) = self.rotation.euler_angles();
        Vector3::new(x, y, z)
    }

    /// Maps a point from the pose's local frame into world space.
    pub fn transform_point(&self, point: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.location + self.rotation * point.coords)
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Full world transform of a scene object: location, rotation and non-uniform scale.
///
/// A local point `p` maps to `location + rotation * (scale ⊙ p)`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Transform3D {
    /// World-space location of the object origin.
    pub location: Vector3<f64>,
    /// World-space rotation.
    pub rotation: UnitQuaternion<f64>,
    /// Per-axis scale applied before rotation.
    pub scale: Vector3<f64>,
}

impl Transform3D {
    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            location: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    /// A transform with unit scale and the given pose.
    pub fn from_pose(pose: Pose) -> Self {
        Self {
            location: pose.location,
            rotation: pose.rotation,
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    /// Sets the scale.
    pub fn with_scale(mut self, scale: Vector3<f64>) -> Self {
        self.scale = scale;
        self
    }

    /// Sets the location.
    pub fn with_location(mut self, location: Vector3<f64>) -> Self {
        self.location = location;
        self
    }

    /// Returns the rigid part of the transform.
    pub fn pose(&self) -> Pose {
        Pose::new(self.location, self.rotation)
    }

    /// Replaces location and rotation, keeping the scale.
    pub fn set_pose(&mut self, pose: Pose) {
        self.location = pose.location;
        self.rotation = pose.rotation;
    }

    /// Maps a local point into world space.
    pub fn transform_point(&self, point: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.location + self.rotation * self.scale.component_mul(&point.coords))
    }

    /// The linear part (rotation times scale) as a matrix.
    pub fn linear_matrix(&self) -> Matrix3<f64> {
        self.rotation.to_rotation_matrix().matrix() * Matrix3::from_diagonal(&self.scale)
    }

    /// True when an odd number of scale components is negative, which flips triangle winding.
    pub fn is_mirrored(&self) -> bool {
        self.scale.x * self.scale.y * self.scale.z < 0.0
    }

    /// True when the scale is (1, 1, 1) up to `1e-12`.
    pub fn has_unit_scale(&self) -> bool {
        (self.scale - Vector3::new(1.0, 1.0, 1.0)).amax() < 1e-12
    }
}

impl Default for Transform3D {
    fn default() -> Self {
        Self::identity()
    }
}
