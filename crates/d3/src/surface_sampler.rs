//! Placement on top of a supporting surface.
//!
//! Each try runs the same sequence: sample a pose, reject it if it collides with objects
//! placed earlier in this call, reject it unless the whole bounding box projects onto the
//! surface, drop it along `-up` until its lowest corner touches the surface's top, then
//! repeat the projection and collision checks and finally enforce the spacing band to the
//! nearest placed object.

use crate::bvh_cache::BvhCache;
use crate::collision::collides_with_any;
use crate::pose_sampler::{
    sample_range, sample_vector, PlacementOutcome, PlacementStatus, PoseGenerator,
};
use instant::Instant;
use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use u_placement_core::{
    Error, ObjectHandle, OnExhaustion, Pose, Result, Scene, SurfaceSamplerConfig,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Why a candidate pose was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    Collision,
    OffSurface,
    Spacing,
}

/// Result of a surface sampling run.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SurfacePlacementReport {
    /// Objects left on the surface, in placement order.
    pub placed: Vec<ObjectHandle>,
    /// One outcome per requested object, in request order.
    pub outcomes: Vec<PlacementOutcome>,
    /// Wall-clock time in milliseconds.
    pub computation_time_ms: u64,
}

impl SurfacePlacementReport {
    /// Number of objects deleted after exhausting their retries.
    pub fn discarded_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == PlacementStatus::Discarded)
            .count()
    }
}

/// Places objects on a surface object with controlled spacing.
#[derive(Debug, Clone, Default)]
pub struct SurfaceSampler {
    config: SurfaceSamplerConfig,
}

impl SurfaceSampler {
    /// Creates a sampler with the given configuration.
    pub fn new(config: SurfaceSamplerConfig) -> Self {
        Self { config }
    }

    /// The configuration.
    pub fn config(&self) -> &SurfaceSamplerConfig {
        &self.config
    }

    /// Places every object of `to_place` on `surface`.
    ///
    /// Collisions are only checked against objects placed earlier in the same call; the
    /// surface itself is never a collider. Objects that exhaust their retries are deleted
    /// under [`OnExhaustion::Discard`] (the default) or kept in their last pose.
    pub fn sample_on_surface<G>(
        &self,
        scene: &mut Scene,
        cache: &mut BvhCache,
        to_place: &[ObjectHandle],
        surface: ObjectHandle,
        generator: &mut G,
    ) -> Result<SurfacePlacementReport>
    where
        G: PoseGenerator + ?Sized,
    {
        self.config.validate()?;
        if to_place.is_empty() {
            return Err(Error::InvalidConfig(
                "no objects to place were given".into(),
            ));
        }
        scene.object(surface)?;
        for &handle in to_place {
            if handle == surface {
                return Err(Error::InvalidConfig(format!(
                    "surface {} cannot be placed on itself",
                    surface
                )));
            }
            scene.object(handle)?;
        }

        let start = Instant::now();
        let up = self.config.up_direction;
        let surface_height = scene
            .bounding_box_corners(surface)?
            .iter()
            .map(|c| c.coords.dot(&up))
            .fold(f64::NEG_INFINITY, f64::max);
        let no_skip = HashSet::new();
        let mut report = SurfacePlacementReport::default();

        for &object in to_place {
            let mut tries = 0;
            let mut placed = false;
            while tries < self.config.max_tries {
                tries += 1;
                let pose = generator.next_pose(scene, object);
                scene.set_pose(object, pose)?;
                cache.invalidate(object);

                match self.try_candidate(
                    scene,
                    cache,
                    object,
                    surface,
                    surface_height,
                    &report.placed,
                    &no_skip,
                )? {
                    None => {
                        placed = true;
                        break;
                    }
                    Some(reason) => {
                        log::trace!("{} try {} rejected: {:?}", object, tries, reason);
                    }
                }
            }

            let status = if placed {
                log::debug!("placed {} on surface after {} tries", object, tries);
                report.placed.push(object);
                PlacementStatus::Placed
            } else {
                match self.config.on_exhaustion {
                    OnExhaustion::Discard => {
                        log::warn!(
                            "could not place {} on surface in {} tries, discarding",
                            object,
                            tries
                        );
                        scene.remove_object(object)?;
                        cache.invalidate(object);
                        PlacementStatus::Discarded
                    }
                    OnExhaustion::KeepLast => {
                        log::warn!(
                            "could not place {} on surface in {} tries, keeping last pose",
                            object,
                            tries
                        );
                        report.placed.push(object);
                        PlacementStatus::KeptLastPose
                    }
                }
            };
            report.outcomes.push(PlacementOutcome {
                object,
                tries,
                status,
            });
        }

        report.computation_time_ms = start.elapsed().as_millis() as u64;
        log::info!(
            "surface sampling: {}/{} placed on {}, {} ms",
            report.placed.len(),
            to_place.len(),
            surface,
            report.computation_time_ms
        );
        Ok(report)
    }

    /// Checks (and drops) one candidate pose. `None` means accepted.
    #[allow(clippy::too_many_arguments)]
    fn try_candidate(
        &self,
        scene: &mut Scene,
        cache: &mut BvhCache,
        object: ObjectHandle,
        surface: ObjectHandle,
        surface_height: f64,
        placed: &[ObjectHandle],
        no_skip: &HashSet<ObjectHandle>,
    ) -> Result<Option<Rejection>> {
        let up = self.config.up_direction;

        if collides_with_any(scene, cache, object, placed, no_skip)?.is_some() {
            return Ok(Some(Rejection::Collision));
        }
        if !is_above_surface(scene, cache, object, surface, &up)? {
            return Ok(Some(Rejection::OffSurface));
        }

        drop_onto_surface(scene, object, surface_height, &up)?;
        cache.invalidate(object);

        if !is_above_surface(scene, cache, object, surface, &up)? {
            return Ok(Some(Rejection::OffSurface));
        }
        if collides_with_any(scene, cache, object, placed, no_skip)?.is_some() {
            return Ok(Some(Rejection::Collision));
        }
        if !self.spacing_ok(scene, object, placed)? {
            return Ok(Some(Rejection::Spacing));
        }
        Ok(None)
    }

    /// Distance between bounding box centers to the nearest placed object must fall within
    /// `[min_distance, max_distance]`. Vacuous for the first object.
    fn spacing_ok(
        &self,
        scene: &Scene,
        object: ObjectHandle,
        placed: &[ObjectHandle],
    ) -> Result<bool> {
        let center = scene.object(object)?.bounding_box_center();
        let mut nearest = f64::INFINITY;
        for &other in placed {
            let d = (scene.object(other)?.bounding_box_center() - center).norm();
            nearest = nearest.min(d);
        }
        if !nearest.is_finite() {
            return Ok(true);
        }
        Ok(nearest >= self.config.min_distance && nearest <= self.config.max_distance)
    }
}

/// Returns true if every bounding box corner of `object`, lifted by `up`, projects onto the
/// surface mesh along `-up`.
pub fn is_above_surface(
    scene: &Scene,
    cache: &mut BvhCache,
    object: ObjectHandle,
    surface: ObjectHandle,
    up: &Vector3<f64>,
) -> Result<bool> {
    let corners = scene.bounding_box_corners(object)?;
    let bvh = cache.get_or_build(scene, surface)?;
    let down = -up;
    Ok(corners
        .iter()
        .all(|c| bvh.ray_cast(&(c + up), &down).is_some()))
}

/// Moves `object` along `-up` so that its lowest bounding box corner sits at `surface_height`
/// (measured along `up`).
pub fn drop_onto_surface(
    scene: &mut Scene,
    object: ObjectHandle,
    surface_height: f64,
    up: &Vector3<f64>,
) -> Result<()> {
    let lowest = scene
        .bounding_box_corners(object)?
        .iter()
        .map(|c| c.coords.dot(up))
        .fold(f64::INFINITY, f64::min);
    scene.translate(object, -up * (lowest - surface_height))
}

/// Samples poses in a slab above the top face of a surface object's bounding box.
///
/// The top face is the bounding box face whose outward normal is best aligned with `up`.
/// Locations are uniform over that face, lifted by a height in `[min_height, max_height]`.
#[derive(Debug, Clone)]
pub struct UpperRegionSampler {
    origin: Point3<f64>,
    edge_u: Vector3<f64>,
    edge_v: Vector3<f64>,
    up: Vector3<f64>,
    min_height: f64,
    max_height: f64,
    rotation_min: Vector3<f64>,
    rotation_max: Vector3<f64>,
    rng: StdRng,
}

impl UpperRegionSampler {
    /// Creates a sampler above `surface`'s top face.
    pub fn new(
        scene: &Scene,
        surface: ObjectHandle,
        up: Vector3<f64>,
        min_height: f64,
        max_height: f64,
    ) -> Result<Self> {
        let up = up
            .try_normalize(1e-12)
            .ok_or_else(|| Error::InvalidConfig("up direction must be non-zero".into()))?;
        if !(min_height <= max_height) {
            return Err(Error::InvalidConfig(format!(
                "height range [{}, {}] is empty",
                min_height, max_height
            )));
        }

        let object = scene.object(surface)?;
        let corners = object.bounding_box_corners();
        let transform = object.transform();

        // Outward direction of each local axis; valid even for flat boxes.
        let axis_dir = |k: usize| -> Vector3<f64> {
            let mut local = Vector3::zeros();
            local[k] = if transform.scale[k] < 0.0 { -1.0 } else { 1.0 };
            transform.rotation * local
        };
        let (axis, side) = (0..3)
            .flat_map(|k| [(k, 0usize), (k, 1usize)])
            .max_by(|&(ka, sa), &(kb, sb)| {
                let score = |k: usize, s: usize| {
                    let d = axis_dir(k).dot(&up);
                    if s == 1 {
                        d
                    } else {
                        -d
                    }
                };
                score(ka, sa).total_cmp(&score(kb, sb))
            })
            .unwrap_or((2, 1));

        let base = side << axis;
        let (i, j) = ((axis + 1) % 3, (axis + 2) % 3);
        let origin = corners[base];
        Ok(Self {
            origin,
            edge_u: corners[base | (1 << i)] - origin,
            edge_v: corners[base | (1 << j)] - origin,
            up,
            min_height,
            max_height,
            rotation_min: Vector3::zeros(),
            rotation_max: Vector3::zeros(),
            rng: StdRng::from_entropy(),
        })
    }

    /// Makes the sampler deterministic.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Sets the Euler angle range (radians).
    pub fn with_rotation_range(mut self, min: Vector3<f64>, max: Vector3<f64>) -> Self {
        self.rotation_min = min;
        self.rotation_max = max;
        self
    }
}

impl PoseGenerator for UpperRegionSampler {
    fn next_pose(&mut self, _scene: &Scene, _object: ObjectHandle) -> Pose {
        let u = sample_range(&mut self.rng, 0.0, 1.0);
        let v = sample_range(&mut self.rng, 0.0, 1.0);
        let h = sample_range(&mut self.rng, self.min_height, self.max_height);
        let location = self.origin.coords + self.edge_u * u + self.edge_v * v + self.up * h;
        let euler = sample_vector(&mut self.rng, &self.rotation_min, &self.rotation_max);
        Pose::from_euler(location, euler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use u_placement_core::TriangleMesh;

    fn table_scene() -> (Scene, ObjectHandle, ObjectHandle) {
        let mut scene = Scene::new();
        let table = scene.add_object("table", TriangleMesh::plane(2.0)).unwrap();
        let cube = scene.add_object("cube", TriangleMesh::unit_cube()).unwrap();
        (scene, table, cube)
    }

    #[test]
    fn test_drop_rests_lowest_corner_on_surface() {
        let (mut scene, _, cube) = table_scene();
        scene
            .set_pose(cube, Pose::from_location(Vector3::new(0.0, 0.0, 3.0)))
            .unwrap();
        drop_onto_surface(&mut scene, cube, 0.0, &Vector3::z()).unwrap();

        let lowest = scene
            .bounding_box_corners(cube)
            .unwrap()
            .iter()
            .map(|c| c.z)
            .fold(f64::INFINITY, f64::min);
        assert_relative_eq!(lowest, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_above_surface() {
        let (mut scene, table, cube) = table_scene();
        let mut cache = BvhCache::new();

        scene
            .set_pose(cube, Pose::from_location(Vector3::new(0.5, 0.5, 2.0)))
            .unwrap();
        assert!(is_above_surface(&scene, &mut cache, cube, table, &Vector3::z()).unwrap());

        // Hangs over the edge at x = 2
        scene
            .set_pose(cube, Pose::from_location(Vector3::new(1.8, 0.0, 2.0)))
            .unwrap();
        assert!(!is_above_surface(&scene, &mut cache, cube, table, &Vector3::z()).unwrap());

        // Below the table
        scene
            .set_pose(cube, Pose::from_location(Vector3::new(0.0, 0.0, -3.0)))
            .unwrap();
        assert!(!is_above_surface(&scene, &mut cache, cube, table, &Vector3::z()).unwrap());
    }

    #[test]
    fn test_upper_region_samples_above_top_face() {
        let (scene, table, cube) = table_scene();
        let mut sampler = UpperRegionSampler::new(&scene, table, Vector3::z(), 0.5, 1.5)
            .unwrap()
            .with_seed(3);
        for _ in 0..50 {
            let pose = sampler.next_pose(&scene, cube);
            assert!(pose.location.x.abs() <= 2.0 + 1e-12);
            assert!(pose.location.y.abs() <= 2.0 + 1e-12);
            assert!(pose.location.z >= 0.5 - 1e-12 && pose.location.z <= 1.5 + 1e-12);
        }
    }

    #[test]
    fn test_surface_cannot_be_placed_on_itself() {
        let (mut scene, table, cube) = table_scene();
        let mut cache = BvhCache::new();
        let mut generator = |_: &Scene, _: ObjectHandle| Pose::identity();
        let result = SurfaceSampler::default().sample_on_surface(
            &mut scene,
            &mut cache,
            &[cube, table],
            table,
            &mut generator,
        );
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
        assert_eq!(scene.object(cube).unwrap().revision(), 0);
    }

    #[test]
    fn test_off_surface_object_is_discarded() {
        let (mut scene, table, cube) = table_scene();
        let mut cache = BvhCache::new();
        let mut generator =
            |_: &Scene, _: ObjectHandle| Pose::from_location(Vector3::new(10.0, 0.0, 1.0));
        let report = SurfaceSampler::new(SurfaceSamplerConfig::new().with_max_tries(5))
            .sample_on_surface(&mut scene, &mut cache, &[cube], table, &mut generator)
            .unwrap();

        assert!(report.placed.is_empty());
        assert_eq!(report.discarded_count(), 1);
        assert_eq!(report.outcomes[0].tries, 5);
        assert!(!scene.contains(cube));
    }
}
