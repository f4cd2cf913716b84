//! Axis-aligned bounding boxes.
//!
//! Used by the broad phase of the collision detector, by every BVH node and by the
//! settling simulator's contact generation.

use nalgebra::{Point3, Vector3};

/// Simple 3D AABB (Axis-Aligned Bounding Box).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb3D {
    /// Minimum corner
    pub min: Point3<f64>,
    /// Maximum corner
    pub max: Point3<f64>,
}

impl Aabb3D {
    /// Creates a new AABB.
    pub fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// An inverted box that any `grow` replaces.
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    /// Smallest box containing all points. Empty input gives [`Aabb3D::empty`].
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3<f64>>) -> Self {
        points.into_iter().fold(Self::empty(), |mut aabb, p| {
            aabb.grow(p);
            aabb
        })
    }

    /// Returns true if no point was ever added.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Extends the box to contain `point`.
    pub fn grow(&mut self, point: &Point3<f64>) {
        self.min = self.min.inf(point);
        self.max = self.max.sup(point);
    }

    /// Smallest box containing both boxes.
    pub fn union(&self, other: &Aabb3D) -> Self {
        Self {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// Closed-interval overlap test: boxes that only touch do intersect.
    pub fn intersects(&self, other: &Aabb3D) -> bool {
        self.max.x >= other.min.x
            && other.max.x >= self.min.x
            && self.max.y >= other.min.y
            && other.max.y >= self.min.y
            && self.max.z >= other.min.z
            && other.max.z >= self.min.z
    }

    /// Checks if this AABB contains a point.
    pub fn contains_point(&self, point: &Point3<f64>) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Checks if this AABB is fully contained within another AABB.
    pub fn is_within(&self, other: &Aabb3D) -> bool {
        self.min.x >= other.min.x
            && self.min.y >= other.min.y
            && self.min.z >= other.min.z
            && self.max.x <= other.max.x
            && self.max.y <= other.max.y
            && self.max.z <= other.max.z
    }

    /// Expands this AABB by a margin on all sides.
    pub fn expand(&self, margin: f64) -> Self {
        let m = Vector3::new(margin, margin, margin);
        Self {
            min: self.min - m,
            max: self.max + m,
        }
    }

    /// Box center.
    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Edge lengths.
    pub fn extents(&self) -> Vector3<f64> {
        self.max - self.min
    }

    /// Index of the longest axis (0 = x, 1 = y, 2 = z).
    pub fn longest_axis(&self) -> usize {
        self.extents().imax()
    }

    /// Returns the volume of this AABB.
    pub fn volume(&self) -> f64 {
        let e = self.extents();
        e.x * e.y * e.z
    }

    /// Per-axis signed separation: positive values are gaps, negative values are overlap depths.
    pub fn separation(&self, other: &Aabb3D) -> Vector3<f64> {
        Vector3::from_fn(|k, _| (other.min[k] - self.max[k]).max(self.min[k] - other.max[k]))
    }

    /// Squared distance from a point to the box (zero inside).
    pub fn distance_squared(&self, point: &Point3<f64>) -> f64 {
        (0..3)
            .map(|k| {
                let d = (self.min[k] - point[k]).max(point[k] - self.max[k]).max(0.0);
                d * d
            })
            .sum()
    }

    /// Slab test. Returns the entry distance along the ray if it hits within `max_t`.
    pub fn ray_entry(
        &self,
        origin: &Point3<f64>,
        inv_direction: &Vector3<f64>,
        max_t: f64,
    ) -> Option<f64> {
        let mut t_min = 0.0_f64;
        let mut t_max = max_t;
        for k in 0..3 {
            let t1 = (self.min[k] - origin[k]) * inv_direction[k];
            let t2 = (self.max[k] - origin[k]) * inv_direction[k];
            // NaN appears for rays parallel to a slab with the origin on its boundary.
            let (near, far) = if t1 <= t2 { (t1, t2) } else { (t2, t1) };
            if !near.is_nan() {
                t_min = t_min.max(near);
            }
            if !far.is_nan() {
                t_max = t_max.min(far);
            }
            if t_min > t_max {
                return None;
            }
        }
        Some(t_min)
    }
}

impl Default for Aabb3D {
    fn default() -> Self {
        Self::empty()
    }
}
