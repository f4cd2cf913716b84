//! Scenario runner: builds a scene, populates it with the engine and records the outcome.

use crate::error::{Result, ScenarioError};
use crate::result::{PoseRecord, ScenarioReport, ScenarioResult, SettlingSummary};
use crate::scenario::{Scenario, ScenarioKind, SceneSetup};
use instant::Instant;
use nalgebra::Vector3;
use std::collections::HashSet;
use u_placement_core::{ObjectHandle, RigidBodySettings, Scene};
use u_placement_d3::{
    intersects, BvhCache, PoseSampler, SettlingSimulator, SurfaceSampler, UniformVolumeSampler,
    UpperRegionSampler,
};

/// Configuration for scenario runs.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Whether to print progress lines.
    pub show_progress: bool,
    /// Whether to store final poses in each result.
    pub record_poses: bool,
    /// Height band above the table for surface candidates.
    pub drop_height: (f64, f64),
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            show_progress: true,
            record_poses: false,
            drop_height: (0.5, 1.5),
        }
    }
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Quiet preset for tests and scripted runs.
    pub fn quiet() -> Self {
        Self {
            show_progress: false,
            ..Self::default()
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn with_poses(mut self, record: bool) -> Self {
        self.record_poses = record;
        self
    }
}

/// Runs scenarios against the placement engine.
pub struct ScenarioRunner {
    config: RunnerConfig,
}

impl ScenarioRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Runs every scenario and collects the results. Stops at the first invalid scenario.
    pub fn run_all(&self, scenarios: &[Scenario]) -> Result<ScenarioReport> {
        let mut report = ScenarioReport::new();
        for scenario in scenarios {
            report.add_result(self.run(scenario)?);
        }
        Ok(report)
    }

    /// Runs one scenario on a fresh scene.
    pub fn run(&self, scenario: &Scenario) -> Result<ScenarioResult> {
        self.run_on(scenario, scenario.build_scene()?)
    }

    /// Runs a scenario on a prepared scene.
    pub fn run_on(&self, scenario: &Scenario, setup: SceneSetup) -> Result<ScenarioResult> {
        let SceneSetup {
            mut scene,
            objects,
            support,
        } = setup;

        if self.config.show_progress {
            println!(
                "\nRunning scenario: {} ({}, seed={})",
                scenario.name, scenario.kind, scenario.seed
            );
            println!("  Objects: {}", objects.len());
        }

        let mut cache = BvhCache::new();
        let start = Instant::now();

        let (total_tries, settling) = match (scenario.kind, support) {
            (ScenarioKind::Surface, Some(table)) => {
                let (min_h, max_h) = self.config.drop_height;
                let mut generator =
                    UpperRegionSampler::new(&scene, table, Vector3::z(), min_h, max_h)?
                        .with_seed(scenario.seed)
                        .with_rotation_range(
                            Vector3::zeros(),
                            Vector3::new(0.0, 0.0, std::f64::consts::TAU),
                        );
                let report = SurfaceSampler::new(scenario.surface_config()).sample_on_surface(
                    &mut scene,
                    &mut cache,
                    &objects,
                    table,
                    &mut generator,
                )?;
                (report.outcomes.iter().map(|o| o.tries).sum::<usize>(), None)
            }
            (ScenarioKind::Settle, Some(room)) => {
                // Keep a one unit gap to the walls and the floor.
                let inner = scenario.extent - 1.0;
                let mut generator = UniformVolumeSampler::new(
                    Vector3::new(-inner, -inner, 1.0),
                    Vector3::new(inner, inner, 2.0 * scenario.extent - 1.0),
                )
                .with_seed(scenario.seed);
                let skip: HashSet<ObjectHandle> = [room].into_iter().collect();
                let report = PoseSampler::new(scenario.pose_sampler_config()).sample_poses(
                    &mut scene,
                    &mut cache,
                    &objects,
                    &mut generator,
                    None,
                    &skip,
                )?;
                let total_tries = report.total_tries();

                for object in alive(&scene, &objects) {
                    scene.enable_rigid_body(object, RigidBodySettings::active())?;
                }
                let settled = SettlingSimulator::new(scenario.simulation_config())
                    .simulate_all(&mut scene, &mut cache)?;
                (total_tries, Some(SettlingSummary::from(&settled)))
            }
            (ScenarioKind::Surface | ScenarioKind::Settle, None) => {
                return Err(ScenarioError::InvalidScenario {
                    name: scenario.name.clone(),
                    reason: format!("{} scenario built no support object", scenario.kind),
                });
            }
            (ScenarioKind::Scatter, _) => {
                let e = scenario.extent;
                let mut generator =
                    UniformVolumeSampler::new(Vector3::repeat(-e), Vector3::repeat(e))
                        .with_seed(scenario.seed)
                        .with_random_rotation();
                let report = PoseSampler::new(scenario.pose_sampler_config()).sample_poses(
                    &mut scene,
                    &mut cache,
                    &objects,
                    &mut generator,
                    None,
                    &HashSet::new(),
                )?;
                (report.total_tries(), None)
            }
        };

        let placed = alive(&scene, &objects);
        let collisions = count_collisions(&scene, &mut cache, &placed)?;
        let elapsed = start.elapsed().as_millis() as u64;

        if self.config.show_progress {
            println!(
                "  placed={}/{}, tries={}, collisions={}, time={}ms",
                placed.len(),
                objects.len(),
                total_tries,
                collisions,
                elapsed
            );
        }
        log::info!(
            "scenario {}: placed {}/{} objects, {} colliding pairs",
            scenario.name,
            placed.len(),
            objects.len(),
            collisions
        );

        let poses = if self.config.record_poses {
            pose_records(&scene, &placed)?
        } else {
            Vec::new()
        };

        Ok(ScenarioResult {
            scenario: scenario.name.clone(),
            kind: scenario.kind,
            seed: scenario.seed,
            objects_requested: objects.len(),
            objects_placed: placed.len(),
            total_tries,
            collisions,
            bvh_builds: cache.build_count(),
            settling,
            time_ms: elapsed,
            poses,
        })
    }
}

fn alive(scene: &Scene, objects: &[ObjectHandle]) -> Vec<ObjectHandle> {
    objects
        .iter()
        .copied()
        .filter(|&h| scene.contains(h))
        .collect()
}

fn count_collisions(scene: &Scene, cache: &mut BvhCache, placed: &[ObjectHandle]) -> Result<usize> {
    let mut count = 0;
    for (i, &a) in placed.iter().enumerate() {
        for &b in &placed[i + 1..] {
            if intersects(scene, cache, a, b, &HashSet::new())? {
                log::debug!("{} and {} intersect", a, b);
                count += 1;
            }
        }
    }
    Ok(count)
}

fn pose_records(scene: &Scene, placed: &[ObjectHandle]) -> Result<Vec<PoseRecord>> {
    placed
        .iter()
        .map(|&h| {
            let object = scene.object(h)?;
            let pose = object.pose();
            let euler = pose.euler_angles();
            Ok(PoseRecord {
                name: object.name().to_string(),
                location: [pose.location.x, pose.location.y, pose.location.z],
                rotation_euler: [euler.x, euler.y, euler.z],
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> ScenarioRunner {
        ScenarioRunner::new(RunnerConfig::quiet().with_poses(true))
    }

    #[test]
    fn test_scatter_is_collision_free() {
        let scenario = Scenario::scatter(3).with_object_count(8);
        let result = runner().run(&scenario).unwrap();
        assert_eq!(result.objects_requested, 8);
        assert_eq!(result.objects_placed, 8);
        assert!(result.is_collision_free());
        assert!(result.total_tries >= 8);
        assert_eq!(result.poses.len(), 8);
    }

    #[test]
    fn test_same_seed_same_poses() {
        let scenario = Scenario::scatter(11).with_object_count(5);
        let first = runner().run(&scenario).unwrap();
        let second = runner().run(&scenario).unwrap();
        assert_eq!(first.poses, second.poses);
        assert_eq!(first.total_tries, second.total_tries);
    }

    #[test]
    fn test_surface_objects_rest_on_table() {
        let scenario = Scenario::surface(5).with_object_count(4);
        let result = runner().run(&scenario).unwrap();
        assert!(result.objects_placed >= 1);
        assert!(result.is_collision_free());
        // Box half height is 0.12 and the table top is at z = 0.
        for pose in &result.poses {
            assert!((pose.location[2] - 0.12).abs() < 1e-9, "{:?}", pose);
        }
    }

    #[test]
    fn test_settle_converges() {
        let scenario = Scenario::settle(2).with_object_count(3);
        let result = runner().run(&scenario).unwrap();
        let settling = result.settling.unwrap();
        assert!(settling.converged);
        assert!(settling.simulated_time < scenario.max_time);
        assert_eq!(result.objects_placed, 3);
        for pose in &result.poses {
            assert!(pose.location[2] > 0.5 - 1e-3);
        }
    }

    #[test]
    fn test_missing_support_is_rejected() {
        let scenario = Scenario::surface(1).with_object_count(2);
        let mut setup = scenario.build_scene().unwrap();
        setup.support = None;
        let result = runner().run_on(&scenario, setup);
        assert!(matches!(result, Err(ScenarioError::InvalidScenario { .. })));
    }

    #[test]
    fn test_run_all() {
        let suite = vec![
            Scenario::scatter(1).with_object_count(3),
            Scenario::surface(1).with_object_count(2),
        ];
        let report = ScenarioRunner::new(RunnerConfig::quiet())
            .run_all(&suite)
            .unwrap();
        assert_eq!(report.results.len(), 2);
        assert!(report.results.iter().all(|r| r.poses.is_empty()));
    }
}
