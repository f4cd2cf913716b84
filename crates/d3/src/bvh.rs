//! Bounding volume hierarchy over world-space triangles.
//!
//! Built top-down by median split on the longest centroid axis. Nodes are stored in a flat
//! vector, leaves reference a contiguous range of the reordered triangle list.

use crate::aabb::Aabb3D;
use crate::triangle::{
    closest_point_on_triangle, face_normal, ray_triangle, triangles_overlap, Triangle, EPSILON,
};
use nalgebra::{Point3, Vector3};

/// Maximum number of triangles stored in a leaf.
pub const MAX_LEAF_SIZE: usize = 4;

#[derive(Debug, Clone)]
enum NodeKind {
    Leaf { start: usize, count: usize },
    Internal { left: usize, right: usize },
}

#[derive(Debug, Clone)]
struct BvhNode {
    aabb: Aabb3D,
    kind: NodeKind,
}

/// Result of a nearest-surface-point query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestHit {
    /// Closest point on the surface.
    pub point: Point3<f64>,
    /// Outward unit normal of the triangle containing `point`.
    pub normal: Vector3<f64>,
    /// Distance from the query point.
    pub distance: f64,
}

/// Result of a ray cast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Hit point.
    pub point: Point3<f64>,
    /// Unit normal of the hit triangle.
    pub normal: Vector3<f64>,
    /// Distance along the (normalized) ray.
    pub distance: f64,
}

/// Triangle BVH in world space.
#[derive(Debug, Clone, Default)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    triangles: Vec<Triangle>,
    bounds: Vec<Aabb3D>,
}

impl Bvh {
    /// Builds a BVH. Empty input yields an empty tree that overlaps nothing.
    pub fn build(triangles: Vec<Triangle>) -> Self {
        if triangles.is_empty() {
            return Self::default();
        }

        let bounds: Vec<Aabb3D> = triangles.iter().map(|t| Aabb3D::from_points(t)).collect();
        let centroids: Vec<Point3<f64>> = bounds.iter().map(Aabb3D::center).collect();
        let mut order: Vec<usize> = (0..triangles.len()).collect();
        let mut nodes = Vec::with_capacity(2 * triangles.len() / MAX_LEAF_SIZE + 1);

        build_node(&mut nodes, &mut order, 0, &bounds, &centroids);

        Self {
            nodes,
            triangles: order.iter().map(|&i| triangles[i]).collect(),
            bounds: order.iter().map(|&i| bounds[i]).collect(),
        }
    }

    /// Returns true if the tree holds no triangles.
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Bounds of the whole tree.
    pub fn bounds(&self) -> Option<Aabb3D> {
        self.nodes.first().map(|n| n.aabb)
    }

    /// Returns true if any triangle of `self` overlaps any triangle of `other`.
    pub fn overlaps(&self, other: &Bvh) -> bool {
        let mut found = false;
        self.traverse_pairs(other, |_, _| {
            found = true;
            false
        });
        found
    }

    /// All overlapping triangle index pairs `(self, other)`, in traversal order.
    pub fn overlapping_pairs(&self, other: &Bvh) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        self.traverse_pairs(other, |i, j| {
            pairs.push((i, j));
            true
        });
        pairs
    }

    /// Dual-tree traversal. `visit` receives each overlapping triangle pair and returns
    /// whether to keep going.
    fn traverse_pairs(&self, other: &Bvh, mut visit: impl FnMut(usize, usize) -> bool) {
        if self.is_empty() || other.is_empty() {
            return;
        }
        let mut stack = vec![(0usize, 0usize)];
        while let Some((i, j)) = stack.pop() {
            let a = &self.nodes[i];
            let b = &other.nodes[j];
            if !a.aabb.intersects(&b.aabb) {
                continue;
            }
            match (&a.kind, &b.kind) {
                (
                    NodeKind::Leaf { start: sa, count: ca },
                    NodeKind::Leaf { start: sb, count: cb },
                ) => {
                    for ta in *sa..sa + ca {
                        for tb in *sb..sb + cb {
                            if self.bounds[ta].intersects(&other.bounds[tb])
                                && triangles_overlap(&self.triangles[ta], &other.triangles[tb])
                                && !visit(ta, tb)
                            {
                                return;
                            }
                        }
                    }
                }
                (NodeKind::Leaf { .. }, NodeKind::Internal { left, right }) => {
                    stack.push((i, *right));
                    stack.push((i, *left));
                }
                (NodeKind::Internal { left, right }, NodeKind::Leaf { .. }) => {
                    stack.push((*right, j));
                    stack.push((*left, j));
                }
                (
                    NodeKind::Internal { left: la, right: ra },
                    NodeKind::Internal { left: lb, right: rb },
                ) => {
                    // Descend the larger node first.
                    if a.aabb.volume() >= b.aabb.volume() {
                        stack.push((*ra, j));
                        stack.push((*la, j));
                    } else {
                        stack.push((i, *rb));
                        stack.push((i, *lb));
                    }
                }
            }
        }
    }

    /// Closest surface point to `point`.
    ///
    /// When several triangles are equally close (the point projects onto a shared edge or
    /// vertex), the one whose plane is farthest from the point wins. Its normal best tells
    /// inside from outside.
    pub fn nearest(&self, point: &Point3<f64>) -> Option<NearestHit> {
        if self.is_empty() {
            return None;
        }
        let mut best: Option<(f64, f64, usize, Point3<f64>)> = None;
        let mut stack = vec![0usize];
        while let Some(i) = stack.pop() {
            let node = &self.nodes[i];
            let bound = node.aabb.distance_squared(point);
            if let Some((best_d2, ..)) = best {
                if bound > best_d2 + EPSILON {
                    continue;
                }
            }
            match node.kind {
                NodeKind::Leaf { start, count } => {
                    for t in start..start + count {
                        let tri = &self.triangles[t];
                        let q = closest_point_on_triangle(tri, point);
                        let d2 = (q - point).norm_squared();
                        let plane = face_normal(tri)
                            .try_normalize(EPSILON * EPSILON)
                            .map_or(0.0, |n| n.dot(&(point - tri[0])).abs());
                        let better = match best {
                            None => true,
                            Some((best_d2, best_plane, ..)) => {
                                d2 < best_d2 - EPSILON
                                    || (d2 <= best_d2 + EPSILON && plane > best_plane)
                            }
                        };
                        if better {
                            best = Some((d2, plane, t, q));
                        }
                    }
                }
                NodeKind::Internal { left, right } => {
                    let dl = self.nodes[left].aabb.distance_squared(point);
                    let dr = self.nodes[right].aabb.distance_squared(point);
                    // Visit the closer child first.
                    if dl <= dr {
                        stack.push(right);
                        stack.push(left);
                    } else {
                        stack.push(left);
                        stack.push(right);
                    }
                }
            }
        }

        best.map(|(d2, _, t, q)| NearestHit {
            point: q,
            normal: face_normal(&self.triangles[t])
                .try_normalize(EPSILON * EPSILON)
                .unwrap_or_else(Vector3::zeros),
            distance: d2.sqrt(),
        })
    }

    /// First hit of the ray `origin + t * direction`, `t >= 0`.
    pub fn ray_cast(&self, origin: &Point3<f64>, direction: &Vector3<f64>) -> Option<RayHit> {
        let direction = direction.try_normalize(EPSILON * EPSILON)?;
        if self.is_empty() {
            return None;
        }
        let inv = direction.map(|d| 1.0 / d);
        let mut best: Option<(f64, usize)> = None;
        let mut stack = vec![0usize];
        while let Some(i) = stack.pop() {
            let node = &self.nodes[i];
            let max_t = best.map_or(f64::INFINITY, |(t, _)| t);
            if node.aabb.ray_entry(origin, &inv, max_t).is_none() {
                continue;
            }
            match node.kind {
                NodeKind::Leaf { start, count } => {
                    for t in start..start + count {
                        if let Some(dist) = ray_triangle(origin, &direction, &self.triangles[t]) {
                            if best.map_or(true, |(b, _)| dist < b) {
                                best = Some((dist, t));
                            }
                        }
                    }
                }
                NodeKind::Internal { left, right } => {
                    stack.push(right);
                    stack.push(left);
                }
            }
        }

        best.map(|(distance, t)| RayHit {
            point: origin + direction * distance,
            normal: face_normal(&self.triangles[t])
                .try_normalize(EPSILON * EPSILON)
                .unwrap_or_else(Vector3::zeros),
            distance,
        })
    }
}

/// Builds the subtree over `order` (a window of the global order starting at `offset`) and
/// returns its node index.
fn build_node(
    nodes: &mut Vec<BvhNode>,
    order: &mut [usize],
    offset: usize,
    bounds: &[Aabb3D],
    centroids: &[Point3<f64>],
) -> usize {
    let aabb = order
        .iter()
        .fold(Aabb3D::empty(), |acc, &i| acc.union(&bounds[i]));
    let index = nodes.len();

    if order.len() <= MAX_LEAF_SIZE {
        nodes.push(BvhNode {
            aabb,
            kind: NodeKind::Leaf {
                start: offset,
                count: order.len(),
            },
        });
        return index;
    }

    let axis = Aabb3D::from_points(order.iter().map(|&i| &centroids[i])).longest_axis();
    let mid = order.len() / 2;
    order.select_nth_unstable_by(mid, |&a, &b| centroids[a][axis].total_cmp(&centroids[b][axis]));

    // Placeholder, patched once both children exist.
    nodes.push(BvhNode {
        aabb,
        kind: NodeKind::Internal { left: 0, right: 0 },
    });
    let (lo, hi) = order.split_at_mut(mid);
    let left = build_node(nodes, lo, offset, bounds, centroids);
    let right = build_node(nodes, hi, offset + mid, bounds, centroids);
    nodes[index].kind = NodeKind::Internal { left, right };
    index
}
