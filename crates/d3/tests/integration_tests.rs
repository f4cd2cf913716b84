//! Integration tests for u-placement-d3.

use nalgebra::{UnitQuaternion, Vector3};
use std::collections::HashSet;
use u_placement_core::{
    CollisionShape, ObjectHandle, OnExhaustion, Pose, PoseSamplerConfig, RigidBodySettings,
    Scene, SimulationConfig, SurfaceSamplerConfig, Transform3D, TriangleMesh,
};
use u_placement_d3::{
    bbox_intersects, collision::world_aabb, intersects, BvhCache, PlacementStatus, PoseSampler,
    SettlingSimulator, SurfaceSampler, UniformVolumeSampler, UpperRegionSampler,
};

fn add_at(
    scene: &mut Scene,
    name: &str,
    mesh: TriangleMesh,
    location: Vector3<f64>,
) -> ObjectHandle {
    scene
        .add_object_with_transform(name, mesh, Transform3D::identity().with_location(location))
        .unwrap()
}

fn no_skip() -> HashSet<ObjectHandle> {
    HashSet::new()
}

mod collision_tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn axis_offsets(distance: f64) -> Vec<Vector3<f64>> {
        (0..3)
            .flat_map(|axis| {
                [1.0, -1.0].map(|sign| {
                    let mut offset = Vector3::zeros();
                    offset[axis] = sign * distance;
                    offset
                })
            })
            .collect()
    }

    #[test]
    fn test_touching_cubes_do_not_collide() {
        for offset in axis_offsets(1.0) {
            let mut scene = Scene::new();
            let a = add_at(&mut scene, "a", TriangleMesh::unit_cube(), Vector3::zeros());
            let b = add_at(&mut scene, "b", TriangleMesh::unit_cube(), offset);
            let mut cache = BvhCache::new();

            // Touching boxes pass the broad phase but not the narrow phase.
            assert!(bbox_intersects(&scene, a, b).unwrap());
            assert!(!intersects(&scene, &mut cache, a, b, &no_skip()).unwrap(), "{:?}", offset);
            assert!(!intersects(&scene, &mut cache, b, a, &no_skip()).unwrap(), "{:?}", offset);
        }
    }

    #[test]
    fn test_touching_rotated_cube_does_not_collide() {
        let mut scene = Scene::new();
        let a = add_at(&mut scene, "a", TriangleMesh::unit_cube(), Vector3::zeros());
        let b = add_at(&mut scene, "b", TriangleMesh::unit_cube(), Vector3::zeros());
        scene
            .set_pose(
                b,
                Pose::from_euler(
                    Vector3::new(0.0, 0.0, 1.0),
                    Vector3::new(0.0, 0.0, std::f64::consts::FRAC_PI_2),
                ),
            )
            .unwrap();
        let mut cache = BvhCache::new();
        assert!(!intersects(&scene, &mut cache, a, b, &no_skip()).unwrap());
    }

    #[test]
    fn test_overlapping_cubes_collide() {
        for offset in axis_offsets(0.5) {
            let mut scene = Scene::new();
            let a = add_at(&mut scene, "a", TriangleMesh::unit_cube(), Vector3::zeros());
            let b = add_at(&mut scene, "b", TriangleMesh::unit_cube(), offset);
            let mut cache = BvhCache::new();

            assert!(intersects(&scene, &mut cache, a, b, &no_skip()).unwrap(), "{:?}", offset);
            assert!(intersects(&scene, &mut cache, b, a, &no_skip()).unwrap(), "{:?}", offset);
        }
    }

    #[test]
    fn test_broad_phase_rejections_build_no_bvh() {
        let mut scene = Scene::new();
        let mut rng = StdRng::seed_from_u64(11);
        let handles: Vec<_> = (0..20)
            .map(|i| {
                let location = Vector3::new(
                    rng.gen_range(-6.0..6.0),
                    rng.gen_range(-6.0..6.0),
                    rng.gen_range(-6.0..6.0),
                );
                add_at(&mut scene, &format!("cube{}", i), TriangleMesh::unit_cube(), location)
            })
            .collect();
        let mut cache = BvhCache::new();

        let mut rejected = 0;
        for &a in &handles {
            for &b in &handles {
                if a == b || bbox_intersects(&scene, a, b).unwrap() {
                    continue;
                }
                let before = cache.build_count();
                assert!(!intersects(&scene, &mut cache, a, b, &no_skip()).unwrap());
                assert_eq!(cache.build_count(), before);
                rejected += 1;
            }
        }
        assert!(rejected > 0);
    }

    #[test]
    fn test_moving_an_object_is_seen_by_the_cache() {
        let mut scene = Scene::new();
        let a = add_at(&mut scene, "a", TriangleMesh::unit_cube(), Vector3::zeros());
        let b = add_at(&mut scene, "b", TriangleMesh::unit_cube(), Vector3::new(0.5, 0.0, 0.0));
        let mut cache = BvhCache::new();

        assert!(intersects(&scene, &mut cache, a, b, &no_skip()).unwrap());
        let builds = cache.build_count();

        // Moved to touching, which still passes the broad phase.
        scene
            .set_pose(b, Pose::from_location(Vector3::new(1.0, 0.0, 0.0)))
            .unwrap();
        assert!(!cache.is_fresh(&scene, b));
        assert!(!intersects(&scene, &mut cache, a, b, &no_skip()).unwrap());
        assert_eq!(cache.build_count(), builds + 1);

        scene
            .set_pose(b, Pose::from_location(Vector3::new(0.2, 0.2, 0.2)))
            .unwrap();
        cache.invalidate(b);
        assert!(intersects(&scene, &mut cache, a, b, &no_skip()).unwrap());
    }

    #[test]
    fn test_nested_objects_detected_unless_skipped() {
        let mut scene = Scene::new();
        let outer = add_at(
            &mut scene,
            "outer",
            TriangleMesh::uv_sphere(3.0, 24, 12),
            Vector3::zeros(),
        );
        let inner = add_at(
            &mut scene,
            "inner",
            TriangleMesh::unit_cube(),
            Vector3::new(0.5, 0.0, 0.0),
        );
        let mut cache = BvhCache::new();

        assert!(intersects(&scene, &mut cache, outer, inner, &no_skip()).unwrap());
        let skip: HashSet<_> = [outer].into_iter().collect();
        assert!(!intersects(&scene, &mut cache, outer, inner, &skip).unwrap());
    }

    #[test]
    fn test_mirrored_object_keeps_outward_normals() {
        let mut scene = Scene::new();
        let outer = scene
            .add_object_with_transform(
                "outer",
                TriangleMesh::cuboid(Vector3::new(2.0, 2.0, 2.0)),
                Transform3D::identity().with_scale(Vector3::new(-1.0, 1.0, 1.0)),
            )
            .unwrap();
        let inner = add_at(&mut scene, "inner", TriangleMesh::unit_cube(), Vector3::zeros());
        let mut cache = BvhCache::new();
        assert!(intersects(&scene, &mut cache, inner, outer, &no_skip()).unwrap());
    }
}

mod pose_sampler_tests {
    use super::*;

    #[test]
    fn test_retry_bound_with_keep_last() {
        let mut scene = Scene::new();
        let blocker = add_at(&mut scene, "blocker", TriangleMesh::unit_cube(), Vector3::zeros());
        let far = Vector3::new(9.0, 0.0, 0.0);
        let cube = add_at(&mut scene, "cube", TriangleMesh::unit_cube(), far);
        let mut cache = BvhCache::new();

        let mut calls = 0;
        let mut generator = |_: &Scene, _: ObjectHandle| {
            calls += 1;
            Pose::from_location(Vector3::new(0.25, 0.0, 0.0))
        };
        let report = PoseSampler::new(PoseSamplerConfig::new().with_max_tries(7))
            .sample_poses(&mut scene, &mut cache, &[cube], &mut generator, None, &no_skip())
            .unwrap();

        assert_eq!(calls, 7);
        let outcome = report.outcome(cube).unwrap();
        assert_eq!(outcome.tries, 7);
        assert_eq!(outcome.status, PlacementStatus::KeptLastPose);
        assert_eq!(report.working_set, vec![blocker, cube]);
        assert_eq!(
            scene.transform(cube).unwrap().location,
            Vector3::new(0.25, 0.0, 0.0)
        );
    }

    #[test]
    fn test_retry_bound_with_discard() {
        let mut scene = Scene::new();
        add_at(&mut scene, "blocker", TriangleMesh::unit_cube(), Vector3::zeros());
        let far = Vector3::new(9.0, 0.0, 0.0);
        let cube = add_at(&mut scene, "cube", TriangleMesh::unit_cube(), far);
        let mut cache = BvhCache::new();

        let mut generator = |_: &Scene, _: ObjectHandle| Pose::identity();
        let config = PoseSamplerConfig::new()
            .with_max_tries(3)
            .with_on_exhaustion(OnExhaustion::Discard);
        let report = PoseSampler::new(config)
            .sample_poses(&mut scene, &mut cache, &[cube], &mut generator, None, &no_skip())
            .unwrap();

        assert_eq!(report.discarded_count(), 1);
        assert!(!report.working_set.contains(&cube));
        assert!(!scene.contains(cube));
        assert!(!cache.contains(cube));
    }

    #[test]
    fn test_scattered_objects_do_not_collide() {
        let mut scene = Scene::new();
        let objects: Vec<_> = (0..12)
            .map(|i| {
                let mesh = if i % 2 == 0 {
                    TriangleMesh::unit_cube()
                } else {
                    TriangleMesh::uv_sphere(0.5, 12, 6)
                };
                scene.add_object(format!("obj{}", i), mesh).unwrap()
            })
            .collect();
        let mut cache = BvhCache::new();
        let mut generator =
            UniformVolumeSampler::new(Vector3::new(-4.0, -4.0, -4.0), Vector3::new(4.0, 4.0, 4.0))
                .with_seed(5)
                .with_random_rotation();

        let report = PoseSampler::default()
            .sample_poses(&mut scene, &mut cache, &objects, &mut generator, None, &no_skip())
            .unwrap();
        assert!(report.all_placed());

        for (i, &a) in objects.iter().enumerate() {
            for &b in &objects[i + 1..] {
                assert!(!intersects(&scene, &mut cache, a, b, &no_skip()).unwrap());
            }
        }
    }

    #[test]
    fn test_same_seed_same_layout() {
        let layout = |seed: u64| {
            let mut scene = Scene::new();
            let objects: Vec<_> = (0..5)
                .map(|i| scene.add_object(format!("cube{}", i), TriangleMesh::unit_cube()).unwrap())
                .collect();
            let mut generator = UniformVolumeSampler::new(
                Vector3::new(-2.0, -2.0, 0.0),
                Vector3::new(2.0, 2.0, 0.0),
            )
            .with_seed(seed);
            let report = PoseSampler::default()
                .sample_poses(
                    &mut scene,
                    &mut BvhCache::new(),
                    &objects,
                    &mut generator,
                    None,
                    &no_skip(),
                )
                .unwrap();
            let poses: Vec<Pose> = objects
                .iter()
                .map(|&h| scene.object(h).unwrap().pose())
                .collect();
            (report.total_tries(), poses)
        };
        assert_eq!(layout(99), layout(99));
    }
}

mod surface_sampler_tests {
    use super::*;

    #[test]
    fn test_objects_rest_on_surface_within_spacing() {
        let mut scene = Scene::new();
        let table = scene.add_object("table", TriangleMesh::plane(3.0)).unwrap();
        let items: Vec<_> = (0..6)
            .map(|i| {
                scene
                    .add_object(
                        format!("item{}", i),
                        TriangleMesh::cuboid(Vector3::new(0.15, 0.15, 0.15)),
                    )
                    .unwrap()
            })
            .collect();
        let mut cache = BvhCache::new();
        let mut generator = UpperRegionSampler::new(&scene, table, Vector3::z(), 0.5, 1.5)
            .unwrap()
            .with_seed(21)
            .with_rotation_range(Vector3::zeros(), Vector3::new(0.0, 0.0, 1.5));

        let config = SurfaceSamplerConfig::new()
            .with_max_tries(500)
            .with_spacing(1.0, 3.0);
        let report = SurfaceSampler::new(config)
            .sample_on_surface(&mut scene, &mut cache, &items, table, &mut generator)
            .unwrap();
        assert!(report.placed.len() >= 2);

        for (k, &object) in report.placed.iter().enumerate() {
            let corners = scene.bounding_box_corners(object).unwrap();
            let lowest = corners.iter().map(|c| c.z).fold(f64::INFINITY, f64::min);
            assert!(lowest.abs() < 1e-9, "object {} floats at {}", object, lowest);
            assert!(corners
                .iter()
                .all(|c| c.x.abs() <= 3.0 + 1e-9 && c.y.abs() <= 3.0 + 1e-9));

            let center = scene.object(object).unwrap().bounding_box_center();
            let distances: Vec<f64> = report.placed[..k]
                .iter()
                .map(|&o| (scene.object(o).unwrap().bounding_box_center() - center).norm())
                .collect();
            if let Some(nearest) = distances.iter().copied().reduce(f64::min) {
                assert!(nearest >= 1.0 && nearest <= 3.0, "nearest distance {}", nearest);
            }
            assert!(distances.iter().all(|&d| d >= 1.0));
        }

        // Objects that were not placed are gone from the scene.
        for outcome in &report.outcomes {
            assert_eq!(
                scene.contains(outcome.object),
                outcome.status != PlacementStatus::Discarded
            );
        }
    }

    #[test]
    fn test_spacing_rejects_crowded_candidates() {
        let mut scene = Scene::new();
        let table = scene.add_object("table", TriangleMesh::plane(3.0)).unwrap();
        let a = scene.add_object("a", TriangleMesh::unit_cube()).unwrap();
        let b = scene.add_object("b", TriangleMesh::unit_cube()).unwrap();
        let mut cache = BvhCache::new();

        // The second object can only land 1.5 away from the first, outside a [2, 3] band.
        let mut generator = |_: &Scene, object: ObjectHandle| {
            let x = if object == a { 0.0 } else { 1.5 };
            Pose::from_location(Vector3::new(x, 0.0, 2.0))
        };
        let config = SurfaceSamplerConfig::new()
            .with_max_tries(4)
            .with_spacing(2.0, 3.0);
        let report = SurfaceSampler::new(config)
            .sample_on_surface(&mut scene, &mut cache, &[a, b], table, &mut generator)
            .unwrap();

        assert_eq!(report.placed, vec![a]);
        assert_eq!(report.outcomes[1].status, PlacementStatus::Discarded);
        assert_eq!(report.outcomes[1].tries, 4);
        assert!((scene.transform(a).unwrap().location.z - 0.5).abs() < 1e-12);
    }
}

mod settling_tests {
    use super::*;

    fn room_scene() -> (Scene, ObjectHandle) {
        let mut scene = Scene::new();
        let room = scene
            .add_object("room", TriangleMesh::room(Vector3::new(10.0, 10.0, 10.0)))
            .unwrap();
        scene
            .enable_rigid_body(
                room,
                RigidBodySettings::passive().with_collision_shape(CollisionShape::Mesh),
            )
            .unwrap();
        (scene, room)
    }

    #[test]
    fn test_stacked_boxes_settle_without_interpenetration() {
        let mut scene = Scene::new();
        let floor = scene.add_object("floor", TriangleMesh::plane(5.0)).unwrap();
        let cube = TriangleMesh::unit_cube;
        let lower = add_at(&mut scene, "lower", cube(), Vector3::new(0.0, 0.0, 0.6));
        let upper = add_at(&mut scene, "upper", cube(), Vector3::new(0.2, 0.1, 1.8));
        scene
            .enable_rigid_body(floor, RigidBodySettings::passive())
            .unwrap();
        for h in [lower, upper] {
            scene
                .enable_rigid_body(h, RigidBodySettings::active())
                .unwrap();
        }

        let config = SimulationConfig::new()
            .with_time_window(1.0, 20.0)
            .with_check_interval(1.0)
            .with_thresholds(0.01, 0.1);
        let mut cache = BvhCache::new();
        let report = SettlingSimulator::new(config)
            .simulate(&mut scene, &mut cache, &[floor, lower, upper])
            .unwrap();

        assert!(report.converged);
        assert!(report.simulated_time < 20.0);
        assert!(!intersects(&scene, &mut cache, lower, upper, &no_skip()).unwrap());
        let lower_box = world_aabb(scene.object(lower).unwrap());
        let upper_box = world_aabb(scene.object(upper).unwrap());
        assert!(lower_box.min.z > -1e-3);
        assert!(upper_box.min.z > lower_box.max.z - 1e-3);
        assert!((lower_box.min.z).abs() < 1e-3);
        assert!((upper_box.min.z - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_spheres_settle_inside_room() {
        let (mut scene, room) = room_scene();
        let spheres: Vec<_> = (0..5)
            .map(|i| {
                scene
                    .add_object(format!("sphere{}", i), TriangleMesh::uv_sphere(0.5, 16, 8))
                    .unwrap()
            })
            .collect();
        let mut cache = BvhCache::new();
        let mut generator =
            UniformVolumeSampler::new(Vector3::new(-4.0, -4.0, 1.0), Vector3::new(4.0, 4.0, 6.0))
                .with_seed(8);
        let skip: HashSet<_> = [room].into_iter().collect();
        let placement = PoseSampler::new(PoseSamplerConfig::new().with_max_tries(1000))
            .sample_poses(&mut scene, &mut cache, &spheres, &mut generator, None, &skip)
            .unwrap();
        assert!(placement.all_placed());
        // A sparse room accepts almost every first candidate.
        assert!(placement.outcomes.iter().all(|o| o.tries <= 2));

        for &s in &spheres {
            scene
                .enable_rigid_body(s, RigidBodySettings::active())
                .unwrap();
        }
        let config = SimulationConfig::new()
            .with_time_window(2.0, 30.0)
            .with_check_interval(1.0);
        let report = SettlingSimulator::new(config)
            .simulate_all(&mut scene, &mut cache)
            .unwrap();
        assert!(report.converged);
        assert_eq!(report.final_poses.len(), 5);

        let boxes: Vec<_> = spheres
            .iter()
            .map(|&s| world_aabb(scene.object(s).unwrap()))
            .collect();
        for b in &boxes {
            assert!(b.min.z > -1e-3);
            assert!(b.min.x > -5.0 - 1e-3 && b.max.x < 5.0 + 1e-3);
            assert!(b.min.y > -5.0 - 1e-3 && b.max.y < 5.0 + 1e-3);
        }
        for (i, a) in boxes.iter().enumerate() {
            for b in &boxes[i + 1..] {
                let separation = a.separation(b);
                assert!(separation.max() > -1e-3, "spheres interpenetrate: {:?}", separation);
            }
        }
        for (i, &a) in spheres.iter().enumerate() {
            for &b in &spheres[i + 1..] {
                assert!(!intersects(&scene, &mut cache, a, b, &no_skip()).unwrap());
            }
        }
    }

    #[test]
    fn test_origin_shift_round_trip_on_passive_plane() {
        let mut scene = Scene::new();
        let plane = scene.add_object("plane", TriangleMesh::plane(4.0)).unwrap();
        // Origin at a bottom corner, far from the center of mass.
        let mesh = TriangleMesh::unit_cube().translated(&Vector3::new(0.5, 0.5, 0.5));
        let initial = Transform3D::from_pose(Pose::from_euler(
            Vector3::new(1.0, -0.5, 0.0),
            Vector3::new(0.0, 0.0, 0.7),
        ))
        .with_scale(Vector3::new(1.5, 1.0, 1.0));
        let block = scene
            .add_object_with_transform("block", mesh.clone(), initial)
            .unwrap();
        scene
            .enable_rigid_body(plane, RigidBodySettings::passive())
            .unwrap();
        scene
            .enable_rigid_body(block, RigidBodySettings::active())
            .unwrap();

        let report = SettlingSimulator::new(
            SimulationConfig::new()
                .with_time_window(0.5, 5.0)
                .with_check_interval(0.5),
        )
        .simulate(&mut scene, &mut BvhCache::new(), &[plane, block])
        .unwrap();
        assert!(report.converged);

        let object = scene.object(block).unwrap();
        let transform = object.transform();
        assert!((transform.location - initial.location).amax() < 1e-6);
        assert!((transform.rotation.coords - initial.rotation.coords).amax() < 1e-12);
        assert_eq!(transform.scale, initial.scale);
        assert_eq!(object.mesh().vertices(), mesh.vertices());
        assert_eq!(report.bodies_moved, 0);
        assert!(scene.object(plane).unwrap().rigid_body().is_some());
    }

    #[test]
    fn test_tilted_cube_tips_onto_a_face() {
        let mut scene = Scene::new();
        let floor = scene.add_object("floor", TriangleMesh::plane(5.0)).unwrap();
        // Origin at a corner, so the committed origin depends on the settled rotation.
        let mesh = TriangleMesh::unit_cube().translated(&Vector3::new(0.5, 0.5, 0.5));
        let tilt = UnitQuaternion::from_euler_angles(0.6, 0.0, 0.0);
        let cube = scene
            .add_object_with_transform(
                "cube",
                mesh,
                Transform3D::from_pose(Pose::new(Vector3::new(0.0, 0.0, 2.0), tilt)),
            )
            .unwrap();
        scene
            .enable_rigid_body(floor, RigidBodySettings::passive())
            .unwrap();
        scene
            .enable_rigid_body(cube, RigidBodySettings::active())
            .unwrap();

        let config = SimulationConfig::new()
            .with_time_window(1.0, 20.0)
            .with_check_interval(1.0)
            .with_thresholds(1e-3, 1e-3);
        let report = SettlingSimulator::new(config)
            .simulate(&mut scene, &mut BvhCache::new(), &[floor, cube])
            .unwrap();
        assert!(report.converged);

        // Resting on a face: roll is a whole number of quarter turns.
        let (roll, pitch, yaw) = scene.transform(cube).unwrap().rotation.euler_angles();
        let quarter = std::f64::consts::FRAC_PI_2;
        let off_face = (roll / quarter - (roll / quarter).round()).abs() * quarter;
        assert!(off_face < 0.02, "roll = {}", roll);
        assert!(pitch.abs() < 1e-6 && yaw.abs() < 1e-6);

        let heights: Vec<f64> = scene
            .bounding_box_corners(cube)
            .unwrap()
            .iter()
            .map(|c| c.z)
            .collect();
        let lowest = heights.iter().copied().fold(f64::INFINITY, f64::min);
        let highest = heights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert!(lowest.abs() < 1e-2, "lowest corner at {}", lowest);
        assert!((highest - lowest - 1.0).abs() < 2e-2);
    }
}
