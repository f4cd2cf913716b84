//! Triangle meshes and mesh primitives.
//!
//! Meshes are stored in the object's local frame. The world-space view is produced by
//! [`crate::scene::Scene`] by applying the object's [`crate::transform::Transform3D`].

use crate::error::{Error, Result};
use nalgebra::{Matrix3, Point3, Vector3};
use std::collections::HashMap;
use std::f64::consts::PI;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Volumes below this magnitude are treated as degenerate (open or flat meshes).
const VOLUME_EPSILON: f64 = 1e-12;

/// An indexed triangle mesh.
///
/// Triangles are expected to be wound counter-clockwise when seen from outside, so that
/// `(v1 - v0) × (v2 - v0)` is the outward normal. Containment tests depend on this.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "RawMesh"))]
pub struct TriangleMesh {
    vertices: Vec<Point3<f64>>,
    triangles: Vec<[u32; 3]>,
}

/// Unchecked wire form of [`TriangleMesh`]; deserialized meshes go through
/// [`TriangleMesh::new`].
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct RawMesh {
    vertices: Vec<Point3<f64>>,
    triangles: Vec<[u32; 3]>,
}

#[cfg(feature = "serde")]
impl TryFrom<RawMesh> for TriangleMesh {
    type Error = Error;

    fn try_from(raw: RawMesh) -> Result<Self> {
        Self::new(raw.vertices, raw.triangles)
    }
}

impl TriangleMesh {
    /// Creates a mesh, validating that every index refers to an existing vertex.
    pub fn new(vertices: Vec<Point3<f64>>, triangles: Vec<[u32; 3]>) -> Result<Self> {
        if let Some(v) = vertices.iter().find(|v| !v.coords.iter().all(|c| c.is_finite())) {
            return Err(Error::InvalidGeometry(format!("non-finite vertex {:?}", v)));
        }
        let n = vertices.len() as u32;
        if let Some(tri) = triangles.iter().find(|t| t.iter().any(|&i| i >= n)) {
            return Err(Error::InvalidGeometry(format!(
                "triangle {:?} references a vertex beyond {}",
                tri, n
            )));
        }
        Ok(Self {
            vertices,
            triangles,
        })
    }

    /// A mesh without vertices. Never collides with anything.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Local-space vertices.
    pub fn vertices(&self) -> &[Point3<f64>] {
        &self.vertices
    }

    /// Triangle index triples.
    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Returns true if the mesh has no vertices.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Returns the three corners of triangle `index`.
    pub fn triangle(&self, index: usize) -> [Point3<f64>; 3] {
        let [a, b, c] = self.triangles[index];
        [
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        ]
    }

    /// Local axis-aligned bounds, or `None` for an empty mesh.
    pub fn local_bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let first = self.vertices.first()?;
        let mut min = *first;
        let mut max = *first;
        for v in &self.vertices[1..] {
            min = min.inf(v);
            max = max.sup(v);
        }
        Some((min, max))
    }

    /// The 8 corners of the local bounding box. All zero for an empty mesh.
    ///
    /// Corner `i` takes the max coordinate on axis `k` when bit `k` of `i` is set.
    pub fn bounding_box_corners(&self) -> [Point3<f64>; 8] {
        let (min, max) = self
            .local_bounds()
            .unwrap_or((Point3::origin(), Point3::origin()));
        let mut corners = [Point3::origin(); 8];
        for (i, corner) in corners.iter_mut().enumerate() {
            *corner = Point3::new(
                if i & 1 == 0 { min.x } else { max.x },
                if i & 2 == 0 { min.y } else { max.y },
                if i & 4 == 0 { min.z } else { max.z },
            );
        }
        corners
    }

    /// Signed enclosed volume (positive for outward-wound closed meshes).
    pub fn signed_volume(&self) -> f64 {
        (0..self.triangles.len())
            .map(|i| {
                let [a, b, c] = self.triangle(i);
                a.coords.dot(&b.coords.cross(&c.coords)) / 6.0
            })
            .sum()
    }

    /// Absolute enclosed volume.
    pub fn volume(&self) -> f64 {
        self.signed_volume().abs()
    }

    /// Returns true if every edge is shared by exactly two triangles.
    pub fn is_closed(&self) -> bool {
        if self.triangles.is_empty() {
            return false;
        }
        let mut edges: HashMap<(u32, u32), u32> = HashMap::new();
        for tri in &self.triangles {
            for k in 0..3 {
                let (a, b) = (tri[k], tri[(k + 1) % 3]);
                *edges.entry((a.min(b), a.max(b))).or_insert(0) += 1;
            }
        }
        edges.values().all(|&count| count == 2)
    }

    /// Volumetric center of mass assuming uniform density.
    ///
    /// Closed meshes use the signed-tetrahedron decomposition; open or flat meshes fall
    /// back to the vertex mean.
    pub fn center_of_mass(&self) -> Point3<f64> {
        if self.vertices.is_empty() {
            return Point3::origin();
        }

        let volume = self.signed_volume();
        if self.is_closed() && volume.abs() > VOLUME_EPSILON {
            let weighted: Vector3<f64> = (0..self.triangles.len())
                .map(|i| {
                    let [a, b, c] = self.triangle(i);
                    let v = a.coords.dot(&b.coords.cross(&c.coords)) / 6.0;
                    (a.coords + b.coords + c.coords) * (v / 4.0)
                })
                .sum();
            return Point3::from(weighted / volume);
        }

        let sum: Vector3<f64> = self.vertices.iter().map(|v| v.coords).sum();
        Point3::from(sum / self.vertices.len() as f64)
    }

    /// Inertia tensor about the center of mass for a body of total `mass`.
    ///
    /// Closed meshes integrate the signed tetrahedra of every triangle. Open or flat meshes
    /// use the solid box spanned by their bounds.
    pub fn inertia_tensor(&self, mass: f64) -> Matrix3<f64> {
        let volume = self.signed_volume();
        if self.is_closed() && volume.abs() > VOLUME_EPSILON {
            #[rustfmt::skip]
            let canonical = Matrix3::new(
                2.0, 1.0, 1.0,
                1.0, 2.0, 1.0,
                1.0, 1.0, 2.0,
            ) / 120.0;
            let covariance: Matrix3<f64> = (0..self.triangles.len())
                .map(|i| {
                    let [a, b, c] = self.triangle(i);
                    let m = Matrix3::from_columns(&[a.coords, b.coords, c.coords]);
                    m * canonical * m.transpose() * m.determinant()
                })
                .sum();
            let com = self.center_of_mass().coords;
            let centered = (covariance - com * com.transpose() * volume) * (mass / volume);
            return Matrix3::identity() * centered.trace() - centered;
        }

        let (min, max) = self
            .local_bounds()
            .unwrap_or((Point3::origin(), Point3::origin()));
        let d = (max - min).component_mul(&(max - min));
        Matrix3::from_diagonal(&Vector3::new(d.y + d.z, d.x + d.z, d.x + d.y)) * (mass / 12.0)
    }

    /// Returns a copy with the scale baked into the vertices.
    ///
    /// Mirroring scales reverse the winding so normals keep pointing outward.
    pub fn scaled(&self, scale: &Vector3<f64>) -> Self {
        let vertices = self
            .vertices
            .iter()
            .map(|v| Point3::from(v.coords.component_mul(scale)))
            .collect();
        let triangles = if scale.x * scale.y * scale.z < 0.0 {
            self.triangles.iter().map(|&[a, b, c]| [a, c, b]).collect()
        } else {
            self.triangles.clone()
        };
        Self {
            vertices,
            triangles,
        }
    }

    /// Returns a copy with every vertex shifted by `offset`.
    pub fn translated(&self, offset: &Vector3<f64>) -> Self {
        Self {
            vertices: self.vertices.iter().map(|v| v + offset).collect(),
            triangles: self.triangles.clone(),
        }
    }

    /// Axis-aligned box centered at the origin.
    pub fn cuboid(half_extents: Vector3<f64>) -> Self {
        let h = half_extents;
        let mut builder = MeshBuilder::default();
        let c = |x: f64, y: f64, z: f64| Point3::new(x * h.x, y * h.y, z * h.z);

        builder.quad(
            [c(-1., -1., -1.), c(-1., 1., -1.), c(1., 1., -1.), c(1., -1., -1.)],
            -Vector3::z(),
        );
        builder.quad(
            [c(-1., -1., 1.), c(1., -1., 1.), c(1., 1., 1.), c(-1., 1., 1.)],
            Vector3::z(),
        );
        builder.quad(
            [c(-1., -1., -1.), c(1., -1., -1.), c(1., -1., 1.), c(-1., -1., 1.)],
            -Vector3::y(),
        );
        builder.quad(
            [c(-1., 1., -1.), c(-1., 1., 1.), c(1., 1., 1.), c(1., 1., -1.)],
            Vector3::y(),
        );
        builder.quad(
            [c(-1., -1., -1.), c(-1., -1., 1.), c(-1., 1., 1.), c(-1., 1., -1.)],
            -Vector3::x(),
        );
        builder.quad(
            [c(1., -1., -1.), c(1., 1., -1.), c(1., 1., 1.), c(1., -1., 1.)],
            Vector3::x(),
        );
        builder.build()
    }

    /// Unit cube (edge length 1) centered at the origin.
    pub fn unit_cube() -> Self {
        Self::cuboid(Vector3::new(0.5, 0.5, 0.5))
    }

    /// UV sphere centered at the origin. The first vertex is the north pole.
    pub fn uv_sphere(radius: f64, segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);

        let mut vertices = Vec::with_capacity((segments * (rings - 1) + 2) as usize);
        vertices.push(Point3::new(0.0, 0.0, radius));
        for r in 1..rings {
            let theta = PI * r as f64 / rings as f64;
            let (z, rho) = (radius * theta.cos(), radius * theta.sin());
            for s in 0..segments {
                let phi = 2.0 * PI * s as f64 / segments as f64;
                vertices.push(Point3::new(rho * phi.cos(), rho * phi.sin(), z));
            }
        }
        let south = vertices.len() as u32;
        vertices.push(Point3::new(0.0, 0.0, -radius));

        let ring = |r: u32, s: u32| 1 + (r - 1) * segments + (s % segments);
        let mut triangles = Vec::new();
        for s in 0..segments {
            triangles.push([0, ring(1, s), ring(1, s + 1)]);
        }
        for r in 1..rings - 1 {
            for s in 0..segments {
                let (a, b) = (ring(r, s), ring(r, s + 1));
                let (c, d) = (ring(r + 1, s), ring(r + 1, s + 1));
                triangles.push([a, c, d]);
                triangles.push([a, d, b]);
            }
        }
        for s in 0..segments {
            triangles.push([ring(rings - 1, s), south, ring(rings - 1, s + 1)]);
        }

        Self {
            vertices,
            triangles,
        }
    }

    /// Square in the XY plane at z = 0, facing +Z.
    pub fn plane(half_size: f64) -> Self {
        let s = half_size;
        let mut builder = MeshBuilder::default();
        builder.quad(
            [
                Point3::new(-s, -s, 0.0),
                Point3::new(s, -s, 0.0),
                Point3::new(s, s, 0.0),
                Point3::new(-s, s, 0.0),
            ],
            Vector3::z(),
        );
        builder.build()
    }

    /// Open-topped room: a floor at z = 0 and four walls up to `size.z`, all facing inward.
    ///
    /// This mesh is not closed; exclude it from containment checks.
    pub fn room(size: Vector3<f64>) -> Self {
        let (hx, hy, h) = (size.x / 2.0, size.y / 2.0, size.z);
        let p = Point3::new;
        let mut builder = MeshBuilder::default();
        builder.quad(
            [p(-hx, -hy, 0.0), p(hx, -hy, 0.0), p(hx, hy, 0.0), p(-hx, hy, 0.0)],
            Vector3::z(),
        );
        builder.quad(
            [p(-hx, -hy, 0.0), p(-hx, hy, 0.0), p(-hx, hy, h), p(-hx, -hy, h)],
            Vector3::x(),
        );
        builder.quad(
            [p(hx, -hy, 0.0), p(hx, hy, 0.0), p(hx, hy, h), p(hx, -hy, h)],
            -Vector3::x(),
        );
        builder.quad(
            [p(-hx, -hy, 0.0), p(hx, -hy, 0.0), p(hx, -hy, h), p(-hx, -hy, h)],
            Vector3::y(),
        );
        builder.quad(
            [p(-hx, hy, 0.0), p(hx, hy, 0.0), p(hx, hy, h), p(-hx, hy, h)],
            -Vector3::y(),
        );
        builder.build()
    }
}

/// Accumulates quads, orienting each one toward the requested normal.
#[derive(Default)]
struct MeshBuilder {
    vertices: Vec<Point3<f64>>,
    triangles: Vec<[u32; 3]>,
}

impl MeshBuilder {
    fn quad(&mut self, corners: [Point3<f64>; 4], normal: Vector3<f64>) {
        let base = self.vertices.len() as u32;
        let winding = (corners[1] - corners[0]).cross(&(corners[2] - corners[0]));
        let ordered = if winding.dot(&normal) >= 0.0 {
            corners
        } else {
            [corners[0], corners[3], corners[2], corners[1]]
        };
        self.vertices.extend_from_slice(&ordered);
        self.triangles.push([base, base + 1, base + 2]);
        self.triangles.push([base, base + 2, base + 3]);
    }

    fn build(self) -> TriangleMesh {
        // Shared corners are merged so closed primitives report `is_closed`.
        let mut unique: Vec<Point3<f64>> = Vec::new();
        let mut remap = Vec::with_capacity(self.vertices.len());
        for v in &self.vertices {
            let idx = match unique.iter().position(|u| (u - v).norm_squared() < 1e-24) {
                Some(i) => i,
                None => {
                    unique.push(*v);
                    unique.len() - 1
                }
            };
            remap.push(idx as u32);
        }
        let triangles = self
            .triangles
            .iter()
            .map(|t| [remap[t[0] as usize], remap[t[1] as usize], remap[t[2] as usize]])
            .collect();
        TriangleMesh {
            vertices: unique,
            triangles,
        }
    }
}
