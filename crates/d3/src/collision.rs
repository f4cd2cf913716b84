//! Collision detection between scene objects.
//!
//! A pair is tested in three stages:
//!
//! 1. **Broad phase**: world AABBs of the two oriented bounding boxes, closed intervals.
//!    Disjoint boxes end the test before any BVH is touched.
//! 2. **Narrow phase**: dual BVH traversal over world triangles. Touching surfaces do not
//!    count as intersecting.
//! 3. **Containment**: unless skipped for either object, checks whether the first vertex of
//!    one object lies strictly inside the other. This catches full enclosure, which has no
//!    triangle overlap. It assumes closed, consistently wound meshes.

use crate::aabb::Aabb3D;
use crate::bvh::Bvh;
use crate::bvh_cache::BvhCache;
use crate::triangle::EPSILON;
use nalgebra::Point3;
use std::collections::HashSet;
use u_placement_core::{ObjectHandle, PlaceableObject, Result, Scene};

/// World AABB of an object's oriented bounding box.
pub fn world_aabb(object: &PlaceableObject) -> Aabb3D {
    Aabb3D::from_points(&object.bounding_box_corners())
}

/// Broad-phase test: do the world AABBs of the two bounding boxes overlap or touch?
pub fn bbox_intersects(scene: &Scene, a: ObjectHandle, b: ObjectHandle) -> Result<bool> {
    let box_a = world_aabb(scene.object(a)?);
    let box_b = world_aabb(scene.object(b)?);
    Ok(box_a.intersects(&box_b))
}

/// Full collision test between two objects.
///
/// Only the cache is mutated. An object is never tested against itself.
pub fn intersects(
    scene: &Scene,
    cache: &mut BvhCache,
    a: ObjectHandle,
    b: ObjectHandle,
    skip_inside_check_for: &HashSet<ObjectHandle>,
) -> Result<bool> {
    if a == b {
        log::debug!("skipping self test for {}", a);
        return Ok(false);
    }
    let object_a = scene.object(a)?;
    let object_b = scene.object(b)?;
    if object_a.mesh().vertex_count() == 0 || object_b.mesh().vertex_count() == 0 {
        return Ok(false);
    }

    if !world_aabb(object_a).intersects(&world_aabb(object_b)) {
        return Ok(false);
    }

    let bvh_a = cache.get_or_build(scene, a)?;
    let bvh_b = cache.get_or_build(scene, b)?;
    if bvh_a.overlaps(&bvh_b) {
        log::trace!("{} and {} overlap", a, b);
        return Ok(true);
    }

    if skip_inside_check_for.contains(&a) || skip_inside_check_for.contains(&b) {
        return Ok(false);
    }
    let a_in_b = object_a
        .first_world_vertex()
        .is_some_and(|p| point_inside_bvh(&bvh_b, &p));
    let b_in_a = object_b
        .first_world_vertex()
        .is_some_and(|p| point_inside_bvh(&bvh_a, &p));
    if a_in_b || b_in_a {
        log::trace!("{} and {} are nested", a, b);
    }
    Ok(a_in_b || b_in_a)
}

/// Returns true if `point` lies strictly inside the object's closed surface.
pub fn is_point_inside(
    scene: &Scene,
    cache: &mut BvhCache,
    object: ObjectHandle,
    point: &Point3<f64>,
) -> Result<bool> {
    if scene.object(object)?.mesh().vertex_count() == 0 {
        return Ok(false);
    }
    let bvh = cache.get_or_build(scene, object)?;
    Ok(point_inside_bvh(&bvh, point))
}

/// Inside iff the direction to the nearest surface point agrees with the outward normal.
/// Points on the surface are outside.
fn point_inside_bvh(bvh: &Bvh, point: &Point3<f64>) -> bool {
    bvh.nearest(point)
        .is_some_and(|hit| (hit.point - point).dot(&hit.normal) > EPSILON)
}

/// Tests `candidate` against every object in `others` and returns the first collider.
pub fn collides_with_any(
    scene: &Scene,
    cache: &mut BvhCache,
    candidate: ObjectHandle,
    others: &[ObjectHandle],
    skip_inside_check_for: &HashSet<ObjectHandle>,
) -> Result<Option<ObjectHandle>> {
    for &other in others {
        if other != candidate
            && intersects(scene, cache, candidate, other, skip_inside_check_for)?
        {
            return Ok(Some(other));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;
    use u_placement_core::{Transform3D, TriangleMesh};

    fn scene_with(meshes: &[(TriangleMesh, Vector3<f64>)]) -> (Scene, Vec<ObjectHandle>) {
        let mut scene = Scene::new();
        let handles = meshes
            .iter()
            .enumerate()
            .map(|(i, (mesh, location))| {
                scene
                    .add_object_with_transform(
                        format!("obj{}", i),
                        mesh.clone(),
                        Transform3D::identity().with_location(*location),
                    )
                    .unwrap()
            })
            .collect();
        (scene, handles)
    }

    #[test]
    fn test_disjoint_pair_builds_nothing() {
        let (scene, h) = scene_with(&[
            (TriangleMesh::unit_cube(), Vector3::zeros()),
            (TriangleMesh::unit_cube(), Vector3::new(5.0, 0.0, 0.0)),
        ]);
        let mut cache = BvhCache::new();

        assert!(!bbox_intersects(&scene, h[0], h[1]).unwrap());
        assert!(!intersects(&scene, &mut cache, h[0], h[1], &HashSet::new()).unwrap());
        assert_eq!(cache.build_count(), 0);
    }

    #[test]
    fn test_self_test_is_false() {
        let (scene, h) = scene_with(&[(TriangleMesh::unit_cube(), Vector3::zeros())]);
        let mut cache = BvhCache::new();
        assert!(!intersects(&scene, &mut cache, h[0], h[0], &HashSet::new()).unwrap());
    }

    #[test]
    fn test_empty_mesh_never_collides() {
        let (scene, h) = scene_with(&[
            (TriangleMesh::unit_cube(), Vector3::zeros()),
            (TriangleMesh::empty(), Vector3::zeros()),
        ]);
        let mut cache = BvhCache::new();
        assert!(!intersects(&scene, &mut cache, h[0], h[1], &HashSet::new()).unwrap());
        assert_eq!(cache.build_count(), 0);
    }

    #[test]
    fn test_containment_and_skip() {
        let (scene, h) = scene_with(&[
            (TriangleMesh::cuboid(Vector3::new(2.0, 2.0, 2.0)), Vector3::zeros()),
            (TriangleMesh::unit_cube(), Vector3::new(0.2, 0.0, 0.0)),
        ]);
        let mut cache = BvhCache::new();

        assert!(intersects(&scene, &mut cache, h[0], h[1], &HashSet::new()).unwrap());
        assert!(intersects(&scene, &mut cache, h[1], h[0], &HashSet::new()).unwrap());

        let skip: HashSet<_> = [h[0]].into_iter().collect();
        assert!(!intersects(&scene, &mut cache, h[1], h[0], &skip).unwrap());
    }

    #[test]
    fn test_point_inside() {
        let (scene, h) = scene_with(&[(TriangleMesh::unit_cube(), Vector3::zeros())]);
        let mut cache = BvhCache::new();

        assert!(is_point_inside(&scene, &mut cache, h[0], &Point3::new(0.1, 0.2, 0.3)).unwrap());
        assert!(!is_point_inside(&scene, &mut cache, h[0], &Point3::new(1.1, 0.2, 0.3)).unwrap());
        // On the surface counts as outside
        assert!(!is_point_inside(&scene, &mut cache, h[0], &Point3::new(0.5, 0.2, 0.3)).unwrap());
    }

    #[test]
    fn test_collides_with_any_reports_first_hit() {
        let (scene, h) = scene_with(&[
            (TriangleMesh::unit_cube(), Vector3::zeros()),
            (TriangleMesh::unit_cube(), Vector3::new(4.0, 0.0, 0.0)),
            (TriangleMesh::unit_cube(), Vector3::new(0.5, 0.5, 0.0)),
        ]);
        let mut cache = BvhCache::new();
        let hit = collides_with_any(&scene, &mut cache, h[0], &h, &HashSet::new()).unwrap();
        assert_eq!(hit, Some(h[2]));
    }
}
