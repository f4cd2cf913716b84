//! Synthetic scenario definitions.
//!
//! A scenario names a scene layout (scattered props, objects on a table, spheres in a room),
//! the RNG seed and the engine settings used to populate it. Scenes are built from mesh
//! primitives only, so every scenario is reproducible from its definition.

use crate::error::{Result, ScenarioError};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use u_placement_core::{
    CollisionShape, ObjectHandle, OnExhaustion, PoseSamplerConfig, RigidBodySettings, Scene,
    SimulationConfig, SurfaceSamplerConfig, TriangleMesh,
};

/// Layout family of a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioKind {
    /// Mixed props at random poses inside a cubic volume.
    Scatter,
    /// Small boxes dropped onto a table with spacing control.
    Surface,
    /// Spheres scattered in a closed room, then settled under gravity.
    Settle,
}

impl std::fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ScenarioKind::Scatter => "scatter",
            ScenarioKind::Surface => "surface",
            ScenarioKind::Settle => "settle",
        };
        f.write_str(name)
    }
}

/// A reproducible scene population scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique scenario name
    pub name: String,
    pub kind: ScenarioKind,
    /// Seed for every pose generator of the run
    pub seed: u64,
    /// Number of objects to place
    pub object_count: usize,
    /// Retry budget per object
    pub max_tries: usize,
    /// Half size of the scatter volume, the table or the room
    pub extent: f64,
    /// Spacing band used by surface scenarios
    pub min_distance: f64,
    pub max_distance: f64,
    /// Settling window in simulated seconds
    pub min_time: f64,
    pub max_time: f64,
    pub check_interval: f64,
}

/// A freshly built scene together with the objects the scenario places.
#[derive(Debug, Clone)]
pub struct SceneSetup {
    pub scene: Scene,
    /// Objects to place, in placement order.
    pub objects: Vec<ObjectHandle>,
    /// The table of a surface scenario or the room of a settle scenario.
    pub support: Option<ObjectHandle>,
}

impl Scenario {
    fn base(name: &str, kind: ScenarioKind, seed: u64) -> Self {
        Self {
            name: name.to_string(),
            kind,
            seed,
            object_count: 10,
            max_tries: 1000,
            extent: 5.0,
            min_distance: 0.25,
            max_distance: 1.0,
            min_time: 4.0,
            max_time: 40.0,
            check_interval: 2.0,
        }
    }

    /// Props scattered in a 10×10×10 volume.
    pub fn scatter(seed: u64) -> Self {
        Self::base("scatter", ScenarioKind::Scatter, seed)
    }

    /// Boxes dropped onto a 6×6 table.
    pub fn surface(seed: u64) -> Self {
        Self {
            object_count: 8,
            max_tries: 200,
            extent: 3.0,
            ..Self::base("surface", ScenarioKind::Surface, seed)
        }
    }

    /// Five spheres settled in a 10×10×10 room.
    pub fn settle(seed: u64) -> Self {
        Self {
            object_count: 5,
            min_time: 2.0,
            max_time: 20.0,
            check_interval: 1.0,
            ..Self::base("settle", ScenarioKind::Settle, seed)
        }
    }

    /// One scenario of every kind.
    pub fn standard_suite(seed: u64) -> Vec<Scenario> {
        vec![Self::scatter(seed), Self::surface(seed), Self::settle(seed)]
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_object_count(mut self, count: usize) -> Self {
        self.object_count = count;
        self
    }

    pub fn with_max_tries(mut self, max_tries: usize) -> Self {
        self.max_tries = max_tries;
        self
    }

    pub fn with_extent(mut self, extent: f64) -> Self {
        self.extent = extent;
        self
    }

    pub fn with_spacing(mut self, min_distance: f64, max_distance: f64) -> Self {
        self.min_distance = min_distance;
        self.max_distance = max_distance;
        self
    }

    pub fn with_time_window(mut self, min_time: f64, max_time: f64) -> Self {
        self.min_time = min_time;
        self.max_time = max_time;
        self
    }

    pub fn with_check_interval(mut self, interval: f64) -> Self {
        self.check_interval = interval;
        self
    }

    /// Checks the scenario-level parameters. Engine settings are validated by the engine.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| ScenarioError::InvalidScenario {
            name: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.object_count == 0 {
            return Err(invalid("object_count must be positive"));
        }
        if !(self.extent.is_finite() && self.extent > 0.0) {
            return Err(invalid("extent must be positive and finite"));
        }
        if self.kind == ScenarioKind::Settle && self.extent <= 1.0 {
            return Err(invalid("room extent must exceed the sphere diameter"));
        }
        Ok(())
    }

    /// Pose sampler settings for scatter and settle scenarios.
    pub fn pose_sampler_config(&self) -> PoseSamplerConfig {
        PoseSamplerConfig::new()
            .with_max_tries(self.max_tries)
            .with_on_exhaustion(OnExhaustion::Discard)
    }

    /// Surface sampler settings for surface scenarios.
    pub fn surface_config(&self) -> SurfaceSamplerConfig {
        SurfaceSamplerConfig::new()
            .with_max_tries(self.max_tries)
            .with_spacing(self.min_distance, self.max_distance)
    }

    /// Simulation settings for settle scenarios.
    pub fn simulation_config(&self) -> SimulationConfig {
        SimulationConfig::new()
            .with_time_window(self.min_time, self.max_time)
            .with_check_interval(self.check_interval)
    }

    /// Builds the initial scene. Objects start at the origin; placement moves them.
    pub fn build_scene(&self) -> Result<SceneSetup> {
        self.validate()?;
        let mut scene = Scene::new();

        let support = match self.kind {
            ScenarioKind::Scatter => None,
            ScenarioKind::Surface => {
                Some(scene.add_object("table", TriangleMesh::plane(self.extent))?)
            }
            ScenarioKind::Settle => {
                let room = scene.add_object(
                    "room",
                    TriangleMesh::room(Vector3::repeat(2.0 * self.extent)),
                )?;
                scene.enable_rigid_body(
                    room,
                    RigidBodySettings::passive().with_collision_shape(CollisionShape::Mesh),
                )?;
                Some(room)
            }
        };

        let objects = (0..self.object_count)
            .map(|i| {
                let (name, mesh) = self.object_mesh(i);
                scene.add_object(name, mesh)
            })
            .collect::<u_placement_core::Result<Vec<_>>>()?;

        Ok(SceneSetup {
            scene,
            objects,
            support,
        })
    }

    fn object_mesh(&self, index: usize) -> (String, TriangleMesh) {
        match self.kind {
            ScenarioKind::Scatter => match index % 3 {
                0 => (
                    format!("crate{}", index),
                    TriangleMesh::unit_cube().scaled(&Vector3::repeat(0.8)),
                ),
                1 => (format!("ball{}", index), TriangleMesh::uv_sphere(0.4, 16, 8)),
                _ => (
                    format!("plank{}", index),
                    TriangleMesh::cuboid(Vector3::new(0.6, 0.15, 0.1)),
                ),
            },
            ScenarioKind::Surface => (
                format!("box{}", index),
                TriangleMesh::cuboid(Vector3::new(0.15, 0.1, 0.12)),
            ),
            ScenarioKind::Settle => (
                format!("sphere{}", index),
                TriangleMesh::uv_sphere(0.5, 16, 8),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_suite() {
        let suite = Scenario::standard_suite(7);
        assert_eq!(suite.len(), 3);
        assert!(suite.iter().all(|s| s.seed == 7 && s.validate().is_ok()));
        assert_eq!(suite[2].object_count, 5);
    }

    #[test]
    fn test_invalid_scenario() {
        let scenario = Scenario::scatter(1).with_object_count(0);
        assert!(matches!(
            scenario.build_scene(),
            Err(ScenarioError::InvalidScenario { .. })
        ));
        assert!(Scenario::settle(1).with_extent(0.5).validate().is_err());
    }

    #[test]
    fn test_settle_scene_has_passive_room() {
        let setup = Scenario::settle(1).build_scene().unwrap();
        let room = setup.support.unwrap();
        let body = setup.scene.object(room).unwrap().rigid_body().unwrap();
        assert!(!body.is_active());
        assert_eq!(body.collision_shape, CollisionShape::Mesh);
        assert_eq!(setup.objects.len(), 5);
        assert_eq!(setup.scene.len(), 6);
    }

    #[test]
    fn test_scatter_scene_names_are_unique() {
        let setup = Scenario::scatter(1).with_object_count(9).build_scene().unwrap();
        assert!(setup.support.is_none());
        assert_eq!(setup.scene.find_by_name("plank8"), Some(setup.objects[8]));
    }

    #[test]
    fn test_scenario_json() {
        let scenario = Scenario::surface(3).with_spacing(0.5, 2.0);
        let json = serde_json::to_string(&scenario).unwrap();
        assert!(json.contains("\"kind\":\"surface\""));
        let parsed: Scenario = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, scenario);
    }
}
