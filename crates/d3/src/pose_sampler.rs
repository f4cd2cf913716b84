//! Retry-based random pose sampling.
//!
//! Objects are placed one at a time. Each try asks a [`PoseGenerator`] for a pose, applies it
//! and tests the object against the working set. The first collision-free pose is kept.

use crate::bvh_cache::BvhCache;
use crate::collision::collides_with_any;
use instant::Instant;
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use u_placement_core::{
    Error, ObjectHandle, OnExhaustion, Pose, PoseSamplerConfig, Result, Scene,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Produces candidate poses for an object.
///
/// Implemented for any `FnMut(&Scene, ObjectHandle) -> Pose`, so closures work directly.
pub trait PoseGenerator {
    /// Returns the next candidate pose for `object`.
    fn next_pose(&mut self, scene: &Scene, object: ObjectHandle) -> Pose;
}

impl<F> PoseGenerator for F
where
    F: FnMut(&Scene, ObjectHandle) -> Pose,
{
    fn next_pose(&mut self, scene: &Scene, object: ObjectHandle) -> Pose {
        self(scene, object)
    }
}

/// Uniform value in `[lo, hi]`; collapses to `lo` for empty or inverted ranges.
pub(crate) fn sample_range(rng: &mut StdRng, lo: f64, hi: f64) -> f64 {
    if hi > lo {
        rng.gen_range(lo..=hi)
    } else {
        lo
    }
}

pub(crate) fn sample_vector(
    rng: &mut StdRng,
    lo: &Vector3<f64>,
    hi: &Vector3<f64>,
) -> Vector3<f64> {
    Vector3::new(
        sample_range(rng, lo.x, hi.x),
        sample_range(rng, lo.y, hi.y),
        sample_range(rng, lo.z, hi.z),
    )
}

/// Samples locations uniformly in an axis-aligned box and XYZ Euler angles uniformly in a
/// range (zero rotation by default).
#[derive(Debug, Clone)]
pub struct UniformVolumeSampler {
    min: Vector3<f64>,
    max: Vector3<f64>,
    rotation_min: Vector3<f64>,
    rotation_max: Vector3<f64>,
    rng: StdRng,
}

impl UniformVolumeSampler {
    /// Creates a sampler over the box `[min, max]` seeded from the OS.
    pub fn new(min: Vector3<f64>, max: Vector3<f64>) -> Self {
        Self {
            min,
            max,
            rotation_min: Vector3::zeros(),
            rotation_max: Vector3::zeros(),
            rng: StdRng::from_entropy(),
        }
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

    /// Samples rotations over the full circle on every axis.
    pub fn with_random_rotation(self) -> Self {
        let tau = std::f64::consts::TAU;
        self.with_rotation_range(Vector3::zeros(), Vector3::new(tau, tau, tau))
    }
}

impl PoseGenerator for UniformVolumeSampler {
    fn next_pose(&mut self, _scene: &Scene, _object: ObjectHandle) -> Pose {
        let location = sample_vector(&mut self.rng, &self.min, &self.max);
        let euler = sample_vector(&mut self.rng, &self.rotation_min, &self.rotation_max);
        Pose::from_euler(location, euler)
    }
}

/// How an object left the sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PlacementStatus {
    /// A collision-free pose was found.
    Placed,
    /// Retries ran out; the last sampled pose was kept.
    KeptLastPose,
    /// Retries ran out; the object was deleted from the scene.
    Discarded,
}

/// Per-object sampling outcome.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PlacementOutcome {
    /// The object.
    pub object: ObjectHandle,
    /// Number of poses tried.
    pub tries: usize,
    /// Final status.
    pub status: PlacementStatus,
}

impl PlacementOutcome {
    /// Returns true if the object is still in the scene.
    pub fn is_kept(&self) -> bool {
        self.status != PlacementStatus::Discarded
    }
}

/// Result of a pose sampling run.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PlacementReport {
    /// One outcome per requested object, in request order.
    pub outcomes: Vec<PlacementOutcome>,
    /// The effective working set after the run.
    pub working_set: Vec<ObjectHandle>,
    /// Wall-clock time in milliseconds.
    pub computation_time_ms: u64,
}

impl PlacementReport {
    /// Number of objects placed without collision.
    pub fn placed_count(&self) -> usize {
        self.count(PlacementStatus::Placed)
    }

    /// Number of objects deleted after exhausting their retries.
    pub fn discarded_count(&self) -> usize {
        self.count(PlacementStatus::Discarded)
    }

    /// Returns true if every object found a collision-free pose.
    pub fn all_placed(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| o.status == PlacementStatus::Placed)
    }

    /// Total number of tries across all objects.
    pub fn total_tries(&self) -> usize {
        self.outcomes.iter().map(|o| o.tries).sum()
    }

    /// Outcome for one object.
    pub fn outcome(&self, object: ObjectHandle) -> Option<&PlacementOutcome> {
        self.outcomes.iter().find(|o| o.object == object)
    }

    fn count(&self, status: PlacementStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }
}

/// Places objects at collision-free poses drawn from a [`PoseGenerator`].
#[derive(Debug, Clone, Default)]
pub struct PoseSampler {
    config: PoseSamplerConfig,
}

impl PoseSampler {
    /// Creates a sampler with the given configuration.
    pub fn new(config: PoseSamplerConfig) -> Self {
        Self { config }
    }

    /// The configuration.
    pub fn config(&self) -> &PoseSamplerConfig {
        &self.config
    }

    /// Samples a pose for every object in `to_place`, in order.
    ///
    /// With `working_set = None` the initial working set is every live object not in
    /// `to_place`. Accepted objects (and, under [`OnExhaustion::KeepLast`], exhausted ones) are
    /// appended to it, so later objects avoid earlier ones. Preconditions are checked before
    /// the scene is touched.
    pub fn sample_poses<G>(
        &self,
        scene: &mut Scene,
        cache: &mut BvhCache,
        to_place: &[ObjectHandle],
        generator: &mut G,
        working_set: Option<&[ObjectHandle]>,
        skip_inside_check_for: &HashSet<ObjectHandle>,
    ) -> Result<PlacementReport>
    where
        G: PoseGenerator + ?Sized,
    {
        self.config.validate()?;
        if to_place.is_empty() {
            return Err(Error::InvalidConfig(
                "no objects to place were given".into(),
            ));
        }
        for &handle in to_place {
            scene.object(handle)?;
        }

        let start = Instant::now();
        let mut working: Vec<ObjectHandle> = match working_set {
            Some(set) => set.to_vec(),
            None => scene.handles().filter(|h| !to_place.contains(h)).collect(),
        };
        let mut report = PlacementReport::default();

        for &object in to_place {
            let mut tries = 0;
            let mut placed = false;
            while tries < self.config.max_tries {
                tries += 1;
                let pose = generator.next_pose(scene, object);
                scene.set_pose(object, pose)?;
                cache.invalidate(object);
                if collides_with_any(scene, cache, object, &working, skip_inside_check_for)?
                    .is_none()
                {
                    placed = true;
                    break;
                }
            }

            let status = if placed {
                log::debug!("placed {} after {} tries", object, tries);
                working.push(object);
                PlacementStatus::Placed
            } else {
                match self.config.on_exhaustion {
                    OnExhaustion::KeepLast => {
                        log::warn!(
                            "could not place {} without collision in {} tries, keeping last pose",
                            object,
                            tries
                        );
                        working.push(object);
                        PlacementStatus::KeptLastPose
                    }
                    OnExhaustion::Discard => {
                        log::warn!(
                            "could not place {} without collision in {} tries, discarding",
                            object,
                            tries
                        );
                        scene.remove_object(object)?;
                        cache.invalidate(object);
                        PlacementStatus::Discarded
                    }
                }
            };
            report.outcomes.push(PlacementOutcome {
                object,
                tries,
                status,
            });
        }

        report.working_set = working;
        report.computation_time_ms = start.elapsed().as_millis() as u64;
        log::info!(
            "pose sampling: {}/{} placed, {} tries, {} ms",
            report.placed_count(),
            to_place.len(),
            report.total_tries(),
            report.computation_time_ms
        );
        Ok(report)
    }
}
