//! Exact-ish triangle predicates used by the narrow phase.
//!
//! All tests use a small absolute tolerance so that surfaces which merely touch (shared
//! faces, edges or vertices, up to floating point noise) are reported as separated.

use nalgebra::{Point3, Vector3};

/// Tolerance for separation and degeneracy tests.
pub const EPSILON: f64 = 1e-9;

/// A world-space triangle.
pub type Triangle = [Point3<f64>; 3];

/// Unnormalized face normal (`(b - a) × (c - a)`), following the counter-clockwise winding.
pub fn face_normal(tri: &Triangle) -> Vector3<f64> {
    (tri[1] - tri[0]).cross(&(tri[2] - tri[0]))
}

/// Unit face normal, or `None` for a degenerate triangle.
pub fn unit_normal(tri: &Triangle) -> Option<Vector3<f64>> {
    face_normal(tri).try_normalize(EPSILON * EPSILON)
}

/// Returns true if the two triangles share interior volume or area.
///
/// Separating axis test over both face normals and the nine edge cross products. Projections
/// that overlap by no more than [`EPSILON`] count as separated, so touching triangles do not
/// overlap. Coplanar triangles are handled in 2D: opposite facing never overlaps (two
/// closed meshes resting face to face), same facing overlaps only with positive area.
/// Degenerate triangles never overlap anything.
pub fn triangles_overlap(a: &Triangle, b: &Triangle) -> bool {
    let (Some(na), Some(nb)) = (unit_normal(a), unit_normal(b)) else {
        return false;
    };

    if na.cross(&nb).norm() < EPSILON && b.iter().all(|p| na.dot(&(p - a[0])).abs() < EPSILON) {
        if na.dot(&nb) < 0.0 {
            return false;
        }
        return coplanar_overlap(a, b, &na);
    }

    if separated_on(&na, a, b) || separated_on(&nb, a, b) {
        return false;
    }

    let edges_a = [a[1] - a[0], a[2] - a[1], a[0] - a[2]];
    let edges_b = [b[1] - b[0], b[2] - b[1], b[0] - b[2]];
    for edge_a in &edges_a {
        for edge_b in &edges_b {
            // Parallel edges give no axis.
            let Some(axis) = edge_a.cross(edge_b).try_normalize(EPSILON * EPSILON) else {
                continue;
            };
            if separated_on(&axis, a, b) {
                return false;
            }
        }
    }
    true
}

fn project(axis: &Vector3<f64>, tri: &Triangle) -> (f64, f64) {
    tri.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
        let d = axis.dot(&p.coords);
        (lo.min(d), hi.max(d))
    })
}

fn separated_on(axis: &Vector3<f64>, a: &Triangle, b: &Triangle) -> bool {
    let (min_a, max_a) = project(axis, a);
    let (min_b, max_b) = project(axis, b);
    max_a <= min_b + EPSILON || max_b <= min_a + EPSILON
}

/// 2D separating axis test in the shared plane, dropping the dominant normal axis.
fn coplanar_overlap(a: &Triangle, b: &Triangle, normal: &Vector3<f64>) -> bool {
    let drop = normal.iamax();
    let (u, v) = match drop {
        0 => (1, 2),
        1 => (2, 0),
        _ => (0, 1),
    };
    let flat = |tri: &Triangle| tri.map(|p| [p[u], p[v]]);
    let a2 = flat(a);
    let b2 = flat(b);

    let project_2d = |axis: [f64; 2], tri: &[[f64; 2]; 3]| {
        tri.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
            let d = axis[0] * p[0] + axis[1] * p[1];
            (lo.min(d), hi.max(d))
        })
    };

    for tri in [&a2, &b2] {
        for i in 0..3 {
            let p = tri[i];
            let q = tri[(i + 1) % 3];
            let edge = [q[0] - p[0], q[1] - p[1]];
            let len = (edge[0] * edge[0] + edge[1] * edge[1]).sqrt();
            if len < EPSILON {
                continue;
            }
            let axis = [-edge[1] / len, edge[0] / len];
            let (min_a, max_a) = project_2d(axis, &a2);
            let (min_b, max_b) = project_2d(axis, &b2);
            if max_a <= min_b + EPSILON || max_b <= min_a + EPSILON {
                return false;
            }
        }
    }
    true
}

/// Closest point on a triangle to `p` (Voronoi region walk).
pub fn closest_point_on_triangle(tri: &Triangle, p: &Point3<f64>) -> Point3<f64> {
    let [a, b, c] = *tri;
    let ab = b - a;
    let ac = c - a;

    let ap = p - a;
    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let denom = d1 - d3;
        let t = if denom.abs() > EPSILON { d1 / denom } else { 0.5 };
        return a + ab * t;
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let denom = d2 - d6;
        let t = if denom.abs() > EPSILON { d2 / denom } else { 0.5 };
        return a + ac * t;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let num = d4 - d3;
        let denom = num + (d5 - d6);
        let t = if denom.abs() > EPSILON { num / denom } else { 0.5 };
        return b + (c - b) * t;
    }

    let total = va + vb + vc;
    if total.abs() < EPSILON * EPSILON {
        return a;
    }
    let v = vb / total;
    let w = vc / total;
    a + ab * v + ac * w
}

/// Möller–Trumbore ray/triangle test, two-sided. Returns the hit distance in units of
/// `direction`, or `None` for misses and hits behind the origin.
pub fn ray_triangle(
    origin: &Point3<f64>,
    direction: &Vector3<f64>,
    tri: &Triangle,
) -> Option<f64> {
    let e1 = tri[1] - tri[0];
    let e2 = tri[2] - tri[0];
    let h = direction.cross(&e2);
    let det = e1.dot(&h);
    if det.abs() < EPSILON * EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = origin - tri[0];
    let u = inv_det * s.dot(&h);
    if !(-EPSILON..=1.0 + EPSILON).contains(&u) {
        return None;
    }
    let q = s.cross(&e1);
    let v = inv_det * direction.dot(&q);
    if v < -EPSILON || u + v > 1.0 + EPSILON {
        return None;
    }
    let t = inv_det * e2.dot(&q);
    (t >= 0.0).then_some(t)
}
