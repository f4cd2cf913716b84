//! Scenario result types and recording.

use crate::error::Result;
use crate::scenario::ScenarioKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use u_placement_d3::SettlingReport;

/// Final pose of one object, for JSON output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseRecord {
    pub name: String,
    pub location: [f64; 3],
    /// XYZ Euler angles in radians
    pub rotation_euler: [f64; 3],
}

/// Settling statistics of a settle scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlingSummary {
    pub converged: bool,
    /// Simulated seconds
    pub simulated_time: f64,
    pub steps: usize,
    pub bodies_moved: usize,
    pub avg_displacement: f64,
    pub max_displacement: f64,
}

impl From<&SettlingReport> for SettlingSummary {
    fn from(report: &SettlingReport) -> Self {
        Self {
            converged: report.converged,
            simulated_time: report.simulated_time,
            steps: report.steps,
            bodies_moved: report.bodies_moved,
            avg_displacement: report.avg_displacement,
            max_displacement: report.max_displacement,
        }
    }
}

/// Result of a single scenario run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    /// Scenario name
    pub scenario: String,
    pub kind: ScenarioKind,
    pub seed: u64,
    /// Objects the scenario asked for
    pub objects_requested: usize,
    /// Objects still in the scene after placement
    pub objects_placed: usize,
    /// Candidate poses evaluated over all objects
    pub total_tries: usize,
    /// Colliding pairs among the placed objects at the end of the run
    pub collisions: usize,
    /// BVH builds performed by the cache during the run
    pub bvh_builds: usize,
    /// Settling statistics (settle scenarios only)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub settling: Option<SettlingSummary>,
    /// Wall-clock time in milliseconds
    pub time_ms: u64,
    /// Final poses (optional, for inspection)
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub poses: Vec<PoseRecord>,
}

impl ScenarioResult {
    /// Fraction of requested objects that were placed.
    pub fn placement_ratio(&self) -> f64 {
        if self.objects_requested == 0 {
            return 0.0;
        }
        self.objects_placed as f64 / self.objects_requested as f64
    }

    /// No placed object intersects another one.
    pub fn is_collision_free(&self) -> bool {
        self.collisions == 0
    }
}

/// Collection of scenario results.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub results: Vec<ScenarioResult>,
    /// Engine version that produced the report
    pub version: String,
}

impl ScenarioReport {
    pub fn new() -> Self {
        Self {
            results: Vec::new(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn add_result(&mut self, result: ScenarioResult) {
        self.results.push(result);
    }

    /// True if every run ended collision-free.
    pub fn all_collision_free(&self) -> bool {
        self.results.iter().all(ScenarioResult::is_collision_free)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Saves the report to a JSON file.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Prints a table of all runs.
    pub fn print_summary(&self) {
        println!("\nScenario Results (u-placement {})", self.version);
        println!("{:-<86}", "");
        println!(
            "{:<16} {:<8} {:>6} {:>8} {:>8} {:>10} {:>10} {:>10}",
            "scenario", "kind", "seed", "placed", "tries", "collisions", "settled", "time_ms"
        );
        println!("{:-<86}", "");
        for r in &self.results {
            let settled = match &r.settling {
                Some(s) if s.converged => format!("{:.1}s", s.simulated_time),
                Some(_) => "timeout".to_string(),
                None => "-".to_string(),
            };
            println!(
                "{:<16} {:<8} {:>6} {:>8} {:>8} {:>10} {:>10} {:>10}",
                r.scenario,
                r.kind.to_string(),
                r.seed,
                format!("{}/{}", r.objects_placed, r.objects_requested),
                r.total_tries,
                r.collisions,
                settled,
                r.time_ms
            );
        }
        println!("{:-<86}", "");
    }
}
