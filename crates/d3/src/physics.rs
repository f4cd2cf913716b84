//! Physics settling of placed objects.
//!
//! Active rigid bodies fall under gravity and come to rest on passive obstacles and on each
//! other. The simulation stops as soon as every body moved less than the configured
//! thresholds during one check interval, or at `max_time`. Final poses are then written back
//! to the scene and physics is disabled on the committed objects.
//!
//! # Model
//!
//! The dynamics are deliberately simple, aimed at "stops moving" rather than accuracy:
//!
//! - Each active body is reduced to the axis-aligned bounds of its collision hull, taken
//!   around its volumetric center of mass after baking the object's scale.
//! - Passive obstacles contribute one box (`Box`, `ConvexHull`) or one box per triangle
//!   (`Mesh`), so open meshes such as rooms work as containers.
//! - Contacts are solved with sequential impulses along the least-penetration axis.
//!   Speculative contacts stop approaching bodies exactly at the surface, and Coulomb friction
//!   acts on the tangential velocity. Residual overlap is removed by mass-weighted
//!   positional correction.
//! - The normal impulse acts at the point of the supporting feature (the hull vertices
//!   closest to the other side) nearest to the center of mass. A body whose center of mass
//!   lies over its support feels no torque and stays put; one that overhangs tips over until
//!   it rests on a face. Angular velocity is integrated with the body's inertia tensor and
//!   loses `angular_damping` per second, plus `rolling_friction` while touching.
//!
//! # Example
//!
//! ```
//! use nalgebra::Vector3;
//! use u_placement_core::{RigidBodySettings, Scene, SimulationConfig, Transform3D, TriangleMesh};
//! use u_placement_d3::{BvhCache, SettlingSimulator};
//!
//! let mut scene = Scene::new();
//! let floor = scene.add_object("floor", TriangleMesh::plane(5.0)).unwrap();
//! let cube = scene
//!     .add_object_with_transform(
//!         "cube",
//!         TriangleMesh::unit_cube(),
//!         Transform3D::identity().with_location(Vector3::new(0.0, 0.0, 2.0)),
//!     )
//!     .unwrap();
//! scene.enable_rigid_body(floor, RigidBodySettings::passive()).unwrap();
//! scene.enable_rigid_body(cube, RigidBodySettings::active()).unwrap();
//!
//! let simulator = SettlingSimulator::new(SimulationConfig::new().with_time_window(1.0, 10.0));
//! let report = simulator
//!     .simulate(&mut scene, &mut BvhCache::new(), &[floor, cube])
//!     .unwrap();
//! assert!(report.converged);
//! assert!((scene.transform(cube).unwrap().location.z - 0.5).abs() < 1e-3);
//! ```

use crate::aabb::Aabb3D;
use crate::bvh_cache::BvhCache;
use instant::Instant;
use nalgebra::{Matrix3, Point2, Point3, UnitQuaternion, Vector2, Vector3};
use std::f64::consts::PI;
use u_placement_core::{
    CollisionShape, Error, ObjectHandle, PlaceableObject, Pose, Result, RigidBodySettings, Scene,
    SimulationConfig, Transform3D,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Time comparisons tolerate this much accumulated rounding.
const TIME_EPSILON: f64 = 1e-9;

/// Hull vertices within this distance of the deepest one form the supporting feature.
const SUPPORT_TOLERANCE: f64 = 1e-3;

/// Active body during simulation.
#[derive(Debug, Clone)]
struct Body {
    handle: ObjectHandle,
    /// Compound children and their transforms at the start.
    children: Vec<(ObjectHandle, Transform3D)>,
    /// Collision hull relative to the center of mass, in the body frame.
    hull: Vec<Vector3<f64>>,
    /// `hull` in world orientation.
    offsets: Vec<Point3<f64>>,
    /// Bounds of `offsets`.
    bounds: Aabb3D,
    /// Center of mass.
    position: Point3<f64>,
    rotation: UnitQuaternion<f64>,
    velocity: Vector3<f64>,
    angular_velocity: Vector3<f64>,
    inv_mass: f64,
    inv_inertia_local: Matrix3<f64>,
    /// `inv_inertia_local` in world orientation.
    inv_inertia: Matrix3<f64>,
    friction: f64,
    linear_damping: f64,
    angular_damping: f64,
    rolling_friction: f64,
    margin: f64,
    /// Transform of the object origin at the start.
    initial: Transform3D,
    /// Center of mass minus origin at the start, in world space.
    shift: Vector3<f64>,
}

impl Body {
    /// Recomputes the orientation-dependent state.
    fn refresh(&mut self) {
        let r = self.rotation.to_rotation_matrix().into_inner();
        self.offsets = self
            .hull
            .iter()
            .map(|v| Point3::from(self.rotation * v))
            .collect();
        self.bounds = Aabb3D::from_points(&self.offsets);
        self.inv_inertia = r * self.inv_inertia_local * r.transpose();
    }

    fn world_aabb(&self) -> Aabb3D {
        Aabb3D::new(
            self.position + self.bounds.min.coords,
            self.position + self.bounds.max.coords,
        )
    }

    /// Pose of the object origin for the current state.
    fn origin_pose(&self) -> Pose {
        let delta = self.rotation * self.initial.rotation.inverse();
        Pose::new(self.position.coords - delta * self.shift, self.rotation)
    }

    /// Velocity of the point at `arm` from the center of mass.
    fn point_velocity(&self, arm: &Vector3<f64>) -> Vector3<f64> {
        self.velocity + self.angular_velocity.cross(arm)
    }

    /// Rotational share of the inverse effective mass along `direction` at `arm`.
    fn angular_inv_mass(&self, arm: &Vector3<f64>, direction: &Vector3<f64>) -> f64 {
        let axis = arm.cross(direction);
        axis.dot(&(self.inv_inertia * axis))
    }

    fn apply_impulse(&mut self, impulse: &Vector3<f64>, arm: &Vector3<f64>) {
        self.velocity += impulse * self.inv_mass;
        self.angular_velocity += self.inv_inertia * arm.cross(impulse);
    }

    /// Lever arm of a contact whose `normal` points from the other side toward this body.
    ///
    /// The force acts at the point of the supporting feature nearest to the center of mass,
    /// restricted to the part of the feature that lies over `region`.
    fn lever_arm(&self, normal: &Vector3<f64>, region: &Aabb3D) -> Vector3<f64> {
        let axis = normal.iamax();
        let (u, v) = ((axis + 1) % 3, (axis + 2) % 3);
        let depth = self
            .offsets
            .iter()
            .map(|o| o.coords.dot(normal))
            .fold(f64::INFINITY, f64::min);
        let support: Vec<Point2<f64>> = self
            .offsets
            .iter()
            .filter(|o| o.coords.dot(normal) <= depth + SUPPORT_TOLERANCE)
            .map(|o| Point2::new(o[u], o[v]))
            .collect();
        if support.is_empty() {
            return Vector3::zeros();
        }

        // Tangential coordinates relative to the center of mass.
        let lo = Point2::new(region.min[u] - self.position[u], region.min[v] - self.position[v]);
        let hi = Point2::new(region.max[u] - self.position[u], region.max[v] - self.position[v]);
        let feature = clip_to_rect(&convex_hull_2d(support.clone()), &lo, &hi);
        let point = if feature.is_empty() {
            let sum: Vector2<f64> = support.iter().map(|p| p.coords).sum();
            Point2::from(sum / support.len() as f64).sup(&lo).inf(&hi)
        } else {
            closest_to_origin(&feature)
        };

        let mut arm = normal * depth;
        arm[u] = point.x;
        arm[v] = point.y;
        arm
    }
}

/// Passive obstacle piece.
#[derive(Debug, Clone)]
struct StaticPiece {
    aabb: Aabb3D,
    friction: f64,
    margin: f64,
}

/// Passive obstacle made of one or more pieces.
#[derive(Debug, Clone)]
struct Obstacle {
    bounds: Aabb3D,
    pieces: Vec<StaticPiece>,
}

#[derive(Debug, Clone, Copy)]
enum Other {
    Body(usize),
    Static,
}

/// Contact on `body`, with `normal` pointing from the other side toward `body`.
#[derive(Debug, Clone)]
struct Contact {
    body: usize,
    other: Other,
    normal: Vector3<f64>,
    gap: f64,
    friction: f64,
    /// Lever arms on `body` and on the other side.
    arm: Vector3<f64>,
    other_arm: Vector3<f64>,
    /// Inverse effective mass along the normal.
    normal_inv_mass: f64,
    normal_impulse: f64,
    tangent_impulse: Vector3<f64>,
}

/// Result of a settling run.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SettlingReport {
    /// Committed origin poses of the simulated objects (compound children included).
    pub final_poses: Vec<(ObjectHandle, Pose)>,
    /// Number of integration steps performed.
    pub steps: usize,
    /// Simulated time (seconds).
    pub simulated_time: f64,
    /// Whether all bodies came to rest before `max_time`.
    pub converged: bool,
    /// Number of bodies whose origin moved more than the location threshold.
    pub bodies_moved: usize,
    /// Average origin displacement.
    pub avg_displacement: f64,
    /// Maximum origin displacement.
    pub max_displacement: f64,
    /// Wall-clock time for computation (milliseconds).
    pub computation_time_ms: u64,
}

impl SettlingReport {
    /// Committed pose of one object.
    pub fn final_pose(&self, object: ObjectHandle) -> Option<Pose> {
        self.final_poses
            .iter()
            .find(|(h, _)| *h == object)
            .map(|(_, p)| *p)
    }
}

/// Time-stepped settling simulator.
#[derive(Debug, Clone, Default)]
pub struct SettlingSimulator {
    config: SimulationConfig,
}

impl SettlingSimulator {
    /// Creates a simulator with the given configuration.
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    /// The configuration.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Simulates every object that has rigid-body settings enabled.
    pub fn simulate_all(&self, scene: &mut Scene, cache: &mut BvhCache) -> Result<SettlingReport> {
        let participating: Vec<ObjectHandle> = scene
            .handles()
            .filter(|&h| scene.object(h).is_ok_and(|o| o.rigid_body().is_some()))
            .collect();
        self.simulate(scene, cache, &participating)
    }

    /// Runs the simulation over `participating` and commits the resting poses.
    ///
    /// Objects without rigid-body settings are ignored. Passive objects collide but are never
    /// written. Running into `max_time` is reported through `converged = false`, not as an
    /// error.
    pub fn simulate(
        &self,
        scene: &mut Scene,
        cache: &mut BvhCache,
        participating: &[ObjectHandle],
    ) -> Result<SettlingReport> {
        self.config.validate()?;
        ensure_unique(participating)?;
        for &handle in participating {
            scene.object(handle)?;
        }

        let start = Instant::now();
        let (mut bodies, obstacles) = self.build_world(scene, participating)?;
        let mut report = SettlingReport::default();

        let dt = self.config.time_step;
        let max_steps = (self.config.max_time / dt - TIME_EPSILON).ceil().max(0.0) as usize;
        let interval = self.config.check_interval;

        let mut reference: Option<Vec<Pose>> = None;
        let mut reference_time = (self.config.min_time - interval).max(0.0);
        let mut next_check = self.config.min_time;
        if reference_time <= TIME_EPSILON {
            reference = Some(bodies.iter().map(Body::origin_pose).collect());
        }

        let mut steps = 0;
        while steps < max_steps {
            self.step(&mut bodies, &obstacles);
            steps += 1;
            let t = steps as f64 * dt;

            if reference.is_none() && t + TIME_EPSILON >= reference_time {
                reference = Some(bodies.iter().map(Body::origin_pose).collect());
            }
            if next_check < self.config.max_time - TIME_EPSILON && t + TIME_EPSILON >= next_check {
                let current: Vec<Pose> = bodies.iter().map(Body::origin_pose).collect();
                if let Some(previous) = &reference {
                    if self.is_at_rest(previous, &current) {
                        report.converged = true;
                        log::debug!("settled after {:.3}s ({} steps)", t, steps);
                        break;
                    }
                }
                reference = Some(current);
                reference_time = next_check;
                next_check += interval;
                log::trace!(
                    "not at rest at {:.3}s, next check at {:.3}s",
                    reference_time,
                    next_check
                );
            }
        }

        report.steps = steps;
        report.simulated_time = steps as f64 * dt;
        if !report.converged {
            log::warn!(
                "settling did not converge within {:.2}s, committing current poses",
                self.config.max_time
            );
        }

        self.commit(scene, cache, &bodies, &mut report)?;
        report.computation_time_ms = start.elapsed().as_millis() as u64;
        log::info!(
            "settled {} bodies in {:.2}s simulated ({} steps, converged: {}), {} ms",
            bodies.len(),
            report.simulated_time,
            report.steps,
            report.converged,
            report.computation_time_ms
        );
        Ok(report)
    }

    /// Converts the participating objects into bodies and obstacles.
    fn build_world(
        &self,
        scene: &Scene,
        participating: &[ObjectHandle],
    ) -> Result<(Vec<Body>, Vec<Obstacle>)> {
        let mut bodies = Vec::new();
        let mut obstacles = Vec::new();

        for &handle in participating {
            let object = scene.object(handle)?;
            let Some(settings) = object.rigid_body() else {
                log::debug!("{} has no rigid body, ignored", handle);
                continue;
            };
            if object.mesh().is_empty() {
                log::debug!("{} has no geometry, ignored", handle);
                continue;
            }

            if !settings.is_active() {
                obstacles.push(build_obstacle(object, settings));
                continue;
            }
            if let Some(parent) = settings.compound_parent {
                let parent_active = participating.contains(&parent)
                    && scene
                        .object(parent)?
                        .rigid_body()
                        .is_some_and(|p| p.is_active() && !p.is_compound_child());
                if parent_active {
                    continue;
                }
                log::warn!(
                    "compound parent {} of {} is not simulated, treating it as a separate body",
                    parent,
                    handle
                );
            }

            // Bake the scale and measure around the volumetric center of mass.
            let transform = *object.transform();
            let baked = object.mesh().scaled(&transform.scale);
            let com = baked.center_of_mass().coords;
            let shift = transform.rotation * com;
            let position = Point3::from(transform.location + shift);

            let hull_points: Vec<Point3<f64>> = match settings.collision_shape {
                CollisionShape::Box => baked.bounding_box_corners().to_vec(),
                CollisionShape::ConvexHull | CollisionShape::Mesh => baked.vertices().to_vec(),
            };
            let mut hull: Vec<Vector3<f64>> =
                hull_points.iter().map(|v| v.coords - com).collect();
            let mut mass = settings.resolve_mass(baked.volume());
            let mut inertia = baked.inertia_tensor(mass);

            // Children are folded in as extra hull points and point masses.
            let to_local = transform.rotation.inverse();
            let mut children = Vec::new();
            for &child in participating {
                let child_object = scene.object(child)?;
                let Some(child_settings) = child_object.rigid_body() else {
                    continue;
                };
                if child_settings.compound_parent != Some(handle) || !child_settings.is_active() {
                    continue;
                }
                let child_transform = *child_object.transform();
                hull.extend(
                    child_object
                        .world_vertices()
                        .iter()
                        .map(|v| to_local * (v - position)),
                );
                let child_mesh = child_object.mesh();
                let child_mass = child_settings
                    .resolve_mass(child_mesh.scaled(&child_transform.scale).volume());
                let d = to_local
                    * (child_transform.transform_point(&child_mesh.center_of_mass()) - position);
                inertia +=
                    (Matrix3::identity() * d.norm_squared() - d * d.transpose()) * child_mass;
                mass += child_mass;
                children.push((child, child_transform));
            }

            let mut body = Body {
                handle,
                children,
                hull,
                offsets: Vec::new(),
                bounds: Aabb3D::empty(),
                position,
                rotation: transform.rotation,
                velocity: Vector3::zeros(),
                angular_velocity: Vector3::zeros(),
                inv_mass: 1.0 / mass.max(1e-9),
                inv_inertia_local: inertia.try_inverse().unwrap_or_else(Matrix3::zeros),
                inv_inertia: Matrix3::zeros(),
                friction: settings.friction,
                linear_damping: settings.linear_damping.clamp(0.0, 1.0),
                angular_damping: settings.angular_damping.clamp(0.0, 1.0),
                rolling_friction: settings.rolling_friction.clamp(0.0, 1.0),
                margin: settings.collision_margin.max(0.0),
                initial: transform,
                shift,
            };
            body.refresh();
            bodies.push(body);
        }

        Ok((bodies, obstacles))
    }

    /// One integration step.
    fn step(&self, bodies: &mut [Body], obstacles: &[Obstacle]) {
        let dt = self.config.time_step;

        for body in bodies.iter_mut() {
            body.velocity += self.config.gravity * dt;
            body.velocity *= (1.0 - body.linear_damping).powf(dt);
            body.angular_velocity *= (1.0 - body.angular_damping).powf(dt);
        }

        let mut contacts = find_contacts(bodies, obstacles, dt);
        for _ in 0..self.config.solver_iterations {
            for contact in contacts.iter_mut() {
                solve_contact(bodies, contact, dt);
            }
        }

        let mut touching = vec![false; bodies.len()];
        for contact in contacts.iter().filter(|c| c.normal_impulse > 0.0) {
            touching[contact.body] = true;
            if let Other::Body(j) = contact.other {
                touching[j] = true;
            }
        }

        for (body, touching) in bodies.iter_mut().zip(touching) {
            if touching {
                body.angular_velocity *= (1.0 - body.rolling_friction).powf(dt);
            }
            body.position += body.velocity * dt;
            if body.angular_velocity != Vector3::zeros() {
                let spin = UnitQuaternion::from_scaled_axis(body.angular_velocity * dt);
                body.rotation = UnitQuaternion::new_normalize((spin * body.rotation).into_inner());
                body.refresh();
            }
        }

        self.correct_positions(bodies, obstacles);
    }

    /// Pushes overlapping bodies apart along the least-penetration axis.
    fn correct_positions(&self, bodies: &mut [Body], obstacles: &[Obstacle]) {
        for _ in 0..self.config.solver_iterations {
            let mut moved = false;

            for body in bodies.iter_mut() {
                for obstacle in obstacles {
                    if !body.world_aabb().intersects(&obstacle.bounds) {
                        continue;
                    }
                    for piece in &obstacle.pieces {
                        let aabb = body.world_aabb();
                        if let Some((normal, depth)) = penetration(&aabb, &piece.aabb) {
                            body.position += normal * depth;
                            let vn = body.velocity.dot(&normal);
                            if vn < 0.0 {
                                body.velocity -= normal * vn;
                            }
                            moved = true;
                        }
                    }
                }
            }

            for i in 0..bodies.len() {
                for j in (i + 1)..bodies.len() {
                    let (head, tail) = bodies.split_at_mut(j);
                    let (a, b) = (&mut head[i], &mut tail[0]);
                    let overlap = penetration(&a.world_aabb(), &b.world_aabb());
                    let Some((normal, depth)) = overlap else {
                        continue;
                    };
                    let total = a.inv_mass + b.inv_mass;
                    a.position += normal * (depth * a.inv_mass / total);
                    b.position -= normal * (depth * b.inv_mass / total);
                    let vn = (a.velocity - b.velocity).dot(&normal);
                    if vn < 0.0 {
                        a.velocity -= normal * (vn * a.inv_mass / total);
                        b.velocity += normal * (vn * b.inv_mass / total);
                    }
                    moved = true;
                }
            }

            if !moved {
                break;
            }
        }
    }

    /// True if no body moved more than the thresholds since `previous`.
    fn is_at_rest(&self, previous: &[Pose], current: &[Pose]) -> bool {
        previous.iter().zip(current).all(|(p, c)| {
            let location = (c.location - p.location).amax();
            let rotation = (c.euler_angles() - p.euler_angles())
                .iter()
                .map(|d| wrap_angle(*d).abs())
                .fold(0.0, f64::max);
            location < self.config.location_threshold && rotation < self.config.rotation_threshold
        })
    }

    /// Writes final poses back, restoring each object's original scale and origin.
    fn commit(
        &self,
        scene: &mut Scene,
        cache: &mut BvhCache,
        bodies: &[Body],
        report: &mut SettlingReport,
    ) -> Result<()> {
        let mut displacements = Vec::new();

        for body in bodies {
            let pose = body.origin_pose();
            scene.set_pose(body.handle, pose)?;
            scene.disable_rigid_body(body.handle)?;
            cache.invalidate(body.handle);
            report.final_poses.push((body.handle, pose));
            displacements.push((pose.location - body.initial.location).norm());

            // Children follow the rigid motion of the parent's center of mass.
            let delta = body.rotation * body.initial.rotation.inverse();
            let start = body.initial.location + body.shift;
            for (child, initial) in &body.children {
                let child_pose = Pose::new(
                    body.position.coords + delta * (initial.location - start),
                    delta * initial.rotation,
                );
                scene.set_pose(*child, child_pose)?;
                scene.disable_rigid_body(*child)?;
                cache.invalidate(*child);
                report.final_poses.push((*child, child_pose));
                displacements.push((child_pose.location - initial.location).norm());
            }
        }

        if !displacements.is_empty() {
            report.avg_displacement =
                displacements.iter().sum::<f64>() / displacements.len() as f64;
            report.max_displacement = displacements.iter().copied().fold(0.0, f64::max);
            report.bodies_moved = displacements
                .iter()
                .filter(|&&d| d > self.config.location_threshold)
                .count();
        }
        Ok(())
    }
}

/// Static collision pieces of a passive object.
fn build_obstacle(object: &PlaceableObject, settings: &RigidBodySettings) -> Obstacle {
    let piece = |aabb: Aabb3D| StaticPiece {
        aabb,
        friction: settings.friction,
        margin: settings.collision_margin.max(0.0),
    };
    let pieces: Vec<StaticPiece> = match settings.collision_shape {
        CollisionShape::Box => vec![piece(Aabb3D::from_points(&object.bounding_box_corners()))],
        CollisionShape::ConvexHull => vec![piece(Aabb3D::from_points(&object.world_vertices()))],
        CollisionShape::Mesh => object
            .world_triangles()
            .iter()
            .map(|t| piece(Aabb3D::from_points(t)))
            .collect(),
    };
    let bounds = pieces
        .iter()
        .fold(Aabb3D::empty(), |acc, p| acc.union(&p.aabb));
    Obstacle { bounds, pieces }
}

/// Least-penetration axis and depth when `a` and `b` overlap, with the normal pointing
/// from `b` toward `a`.
fn penetration(a: &Aabb3D, b: &Aabb3D) -> Option<(Vector3<f64>, f64)> {
    let separation = a.separation(b);
    let axis = separation.imax();
    let depth = -separation[axis];
    if depth <= 0.0 {
        return None;
    }
    Some((axis_normal(a, b, axis), depth))
}

/// Unit axis `k` oriented from `b`'s center toward `a`'s center.
fn axis_normal(a: &Aabb3D, b: &Aabb3D, axis: usize) -> Vector3<f64> {
    let mut normal = Vector3::zeros();
    normal[axis] = if a.center()[axis] >= b.center()[axis] {
        1.0
    } else {
        -1.0
    };
    normal
}

/// Contacts for overlapping or soon-to-touch pairs. The detection distance grows with the
/// distance the pair can close within one step.
fn find_contacts(bodies: &[Body], obstacles: &[Obstacle], dt: f64) -> Vec<Contact> {
    let mut contacts = Vec::new();

    for (i, body) in bodies.iter().enumerate() {
        let aabb = body.world_aabb();
        let reach = body.velocity.norm() * dt;
        for obstacle in obstacles {
            if !aabb.expand(body.margin + reach).intersects(&obstacle.bounds) {
                continue;
            }
            for piece in &obstacle.pieces {
                let range = body.margin.max(piece.margin) + reach;
                let Some((normal, gap)) = proximity(&aabb, &piece.aabb, range) else {
                    continue;
                };
                let arm = body.lever_arm(&normal, &piece.aabb);
                contacts.push(Contact {
                    body: i,
                    other: Other::Static,
                    normal,
                    gap,
                    friction: body.friction * piece.friction,
                    arm,
                    other_arm: Vector3::zeros(),
                    normal_inv_mass: body.inv_mass + body.angular_inv_mass(&arm, &normal),
                    normal_impulse: 0.0,
                    tangent_impulse: Vector3::zeros(),
                });
            }
        }

        for (j, other) in bodies.iter().enumerate().skip(i + 1) {
            let other_aabb = other.world_aabb();
            let range = body.margin.max(other.margin)
                + (body.velocity - other.velocity).norm() * dt;
            let Some((normal, gap)) = proximity(&aabb, &other_aabb, range) else {
                continue;
            };
            let arm = body.lever_arm(&normal, &other_aabb);
            let other_arm = other.lever_arm(&-normal, &aabb);
            contacts.push(Contact {
                body: i,
                other: Other::Body(j),
                normal,
                gap,
                friction: body.friction * other.friction,
                arm,
                other_arm,
                normal_inv_mass: body.inv_mass
                    + body.angular_inv_mass(&arm, &normal)
                    + other.inv_mass
                    + other.angular_inv_mass(&other_arm, &normal),
                normal_impulse: 0.0,
                tangent_impulse: Vector3::zeros(),
            });
        }
    }
    contacts
}

/// Contact normal (from `b` toward `a`) and signed gap when the boxes are closer than
/// `range` on every axis.
fn proximity(a: &Aabb3D, b: &Aabb3D, range: f64) -> Option<(Vector3<f64>, f64)> {
    let separation = a.separation(b);
    if separation.iter().any(|&s| s >= range) {
        return None;
    }
    let axis = separation.imax();
    Some((axis_normal(a, b, axis), separation[axis]))
}

/// Relative velocity of the contact points, `body` minus other side.
fn relative_velocity(bodies: &[Body], contact: &Contact) -> Vector3<f64> {
    let va = bodies[contact.body].point_velocity(&contact.arm);
    match contact.other {
        Other::Body(j) => va - bodies[j].point_velocity(&contact.other_arm),
        Other::Static => va,
    }
}

/// One sequential-impulse iteration on a contact.
///
/// The normal impulse acts at the contact points. Friction acts on the linear velocities
/// only, so sliding never tips a supported body.
fn solve_contact(bodies: &mut [Body], contact: &mut Contact, dt: f64) {
    if contact.normal_inv_mass <= 0.0 {
        return;
    }
    let n = contact.normal;

    // Normal: allow closing the gap within this step, never approaching once touching.
    let target = -contact.gap.max(0.0) / dt;
    let vn = relative_velocity(bodies, contact).dot(&n);
    let lambda = (target - vn) / contact.normal_inv_mass;
    let accumulated = (contact.normal_impulse + lambda).max(0.0);
    let applied = accumulated - contact.normal_impulse;
    contact.normal_impulse = accumulated;
    bodies[contact.body].apply_impulse(&(n * applied), &contact.arm);
    if let Other::Body(j) = contact.other {
        bodies[j].apply_impulse(&(-n * applied), &contact.other_arm);
    }

    // Friction, bounded by the accumulated normal impulse.
    let inv_a = bodies[contact.body].inv_mass;
    let inv_b = match contact.other {
        Other::Body(j) => bodies[j].inv_mass,
        Other::Static => 0.0,
    };
    let relative = relative_velocity(bodies, contact);
    let tangential = relative - n * relative.dot(&n);
    let limit = contact.friction * contact.normal_impulse;
    let mut tangent = contact.tangent_impulse - tangential / (inv_a + inv_b);
    let norm = tangent.norm();
    if norm > limit {
        tangent *= if norm > 0.0 { limit / norm } else { 0.0 };
    }
    let delta = tangent - contact.tangent_impulse;
    contact.tangent_impulse = tangent;

    bodies[contact.body].velocity += delta * inv_a;
    if let Other::Body(j) = contact.other {
        bodies[j].velocity -= delta * inv_b;
    }
}

/// Convex hull of planar points, counter-clockwise. Fewer than three distinct or collinear
/// points come back as a point or a segment.
fn convex_hull_2d(mut points: Vec<Point2<f64>>) -> Vec<Point2<f64>> {
    points.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    points.dedup();
    if points.len() < 3 {
        return points;
    }

    let mut hull = half_hull(points.iter());
    hull.extend(half_hull(points.iter().rev()));
    hull
}

/// One monotone chain of the hull, without its last point.
fn half_hull<'a>(points: impl Iterator<Item = &'a Point2<f64>>) -> Vec<Point2<f64>> {
    let mut half: Vec<Point2<f64>> = Vec::new();
    for p in points {
        while let [.., o, a] = half[..] {
            if (a - o).perp(&(p - o)) > 0.0 {
                break;
            }
            half.pop();
        }
        half.push(*p);
    }
    half.pop();
    half
}

/// Part of a convex polygon inside the rectangle `[lo, hi]`.
fn clip_to_rect(polygon: &[Point2<f64>], lo: &Point2<f64>, hi: &Point2<f64>) -> Vec<Point2<f64>> {
    let mut clipped = polygon.to_vec();
    for axis in 0..2 {
        clipped = clip_half_plane(&clipped, axis, lo[axis], 1.0);
        clipped = clip_half_plane(&clipped, axis, hi[axis], -1.0);
    }
    clipped
}

/// Keeps the part of `polygon` where `sign * (p[axis] - bound) >= 0`.
fn clip_half_plane(
    polygon: &[Point2<f64>],
    axis: usize,
    bound: f64,
    sign: f64,
) -> Vec<Point2<f64>> {
    let inside = |p: &Point2<f64>| sign * (p[axis] - bound) >= 0.0;
    let mut kept = Vec::with_capacity(polygon.len() + 2);
    for (i, current) in polygon.iter().enumerate() {
        let next = &polygon[(i + 1) % polygon.len()];
        if inside(current) {
            kept.push(*current);
        }
        if inside(current) != inside(next) {
            let t = (bound - current[axis]) / (next[axis] - current[axis]);
            kept.push(current + (next - current) * t);
        }
    }
    kept
}

/// Point of a convex polygon (or point, or segment) nearest to the origin.
fn closest_to_origin(polygon: &[Point2<f64>]) -> Point2<f64> {
    let n = polygon.len();
    let edges = || (0..n).map(move |i| (polygon[i], polygon[(i + 1) % n]));

    let area: f64 = edges().map(|(a, b)| a.coords.perp(&b.coords)).sum::<f64>() / 2.0;
    if area > 1e-12 && edges().all(|(a, b)| (b - a).perp(&(-a.coords)) >= 0.0) {
        return Point2::origin();
    }

    edges()
        .map(|(a, b)| closest_on_segment(&a, &b))
        .min_by(|p, q| p.coords.norm_squared().total_cmp(&q.coords.norm_squared()))
        .unwrap_or_else(Point2::origin)
}

/// Point of segment `ab` nearest to the origin.
fn closest_on_segment(a: &Point2<f64>, b: &Point2<f64>) -> Point2<f64> {
    let d = b - a;
    let length_squared = d.norm_squared();
    if length_squared <= 0.0 {
        return *a;
    }
    let t = (-a.coords.dot(&d) / length_squared).clamp(0.0, 1.0);
    a + d * t
}

/// Wraps an angle difference into `[-π, π]`.
fn wrap_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped < -PI {
        wrapped + 2.0 * PI
    } else {
        wrapped
    }
}

/// Rejects handles listed more than once.
fn ensure_unique(participating: &[ObjectHandle]) -> Result<()> {
    for (i, h) in participating.iter().enumerate() {
        if participating[..i].contains(h) {
            return Err(Error::InvalidConfig(format!("{} listed twice", h)));
        }
    }
    Ok(())
}
