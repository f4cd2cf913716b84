//! Sampler and simulation configuration.
//!
//! Every config has sensible defaults, `with_*` builders and a `validate` method that the
//! engine calls before mutating anything.

use crate::error::{Error, Result};
use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What happens to an object that found no valid pose within its retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OnExhaustion {
    /// Keep the last sampled pose and treat the object as placed.
    KeepLast,
    /// Delete the object from the scene.
    Discard,
}

/// Configuration of the generic pose sampler.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoseSamplerConfig {
    /// Maximum number of candidate poses per object.
    pub max_tries: usize,
    /// Give-up policy.
    pub on_exhaustion: OnExhaustion,
}

impl Default for PoseSamplerConfig {
    fn default() -> Self {
        Self {
            max_tries: 1000,
            on_exhaustion: OnExhaustion::KeepLast,
        }
    }
}

impl PoseSamplerConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry budget.
    pub fn with_max_tries(mut self, max_tries: usize) -> Self {
        self.max_tries = max_tries;
        self
    }

    /// Sets the give-up policy.
    pub fn with_on_exhaustion(mut self, policy: OnExhaustion) -> Self {
        self.on_exhaustion = policy;
        self
    }

    /// Rejects a zero retry budget.
    pub fn validate(&self) -> Result<()> {
        if self.max_tries == 0 {
            return Err(Error::InvalidConfig("max_tries must be positive".into()));
        }
        Ok(())
    }
}

/// Configuration of the surface sampler.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SurfaceSamplerConfig {
    /// Maximum number of candidate poses per object.
    pub max_tries: usize,
    /// Minimum center distance to the nearest placed object.
    pub min_distance: f64,
    /// Maximum center distance to the nearest placed object.
    pub max_distance: f64,
    /// Unit vector pointing away from the surface.
    pub up_direction: Vector3<f64>,
    /// Give-up policy.
    pub on_exhaustion: OnExhaustion,
}

impl Default for SurfaceSamplerConfig {
    fn default() -> Self {
        Self {
            max_tries: 100,
            min_distance: 0.25,
            max_distance: 1.0,
            up_direction: Vector3::z(),
            on_exhaustion: OnExhaustion::Discard,
        }
    }
}

impl SurfaceSamplerConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry budget.
    pub fn with_max_tries(mut self, max_tries: usize) -> Self {
        self.max_tries = max_tries;
        self
    }

    /// Sets the allowed distance band to the nearest placed object.
    pub fn with_spacing(mut self, min_distance: f64, max_distance: f64) -> Self {
        self.min_distance = min_distance;
        self.max_distance = max_distance;
        self
    }

    /// Sets the up direction. The vector is normalized; zero vectors are rejected by `validate`.
    pub fn with_up_direction(mut self, up: Vector3<f64>) -> Self {
        self.up_direction = up.try_normalize(1e-12).unwrap_or_else(Vector3::zeros);
        self
    }

    /// Sets the give-up policy.
    pub fn with_on_exhaustion(mut self, policy: OnExhaustion) -> Self {
        self.on_exhaustion = policy;
        self
    }

    /// Checks tries, the distance band and the up vector.
    pub fn validate(&self) -> Result<()> {
        if self.max_tries == 0 {
            return Err(Error::InvalidConfig("max_tries must be positive".into()));
        }
        if !(self.min_distance >= 0.0) || self.min_distance > self.max_distance {
            return Err(Error::InvalidConfig(format!(
                "spacing band [{}, {}] is empty or negative",
                self.min_distance, self.max_distance
            )));
        }
        let norm = self.up_direction.norm();
        if !norm.is_finite() || (norm - 1.0).abs() > 1e-6 {
            return Err(Error::InvalidConfig(
                "up_direction must be a unit vector".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration of the settling simulator.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimulationConfig {
    /// Simulated seconds before the first convergence check.
    pub min_time: f64,
    /// Simulated seconds after which the simulation stops unconditionally.
    pub max_time: f64,
    /// Simulated seconds between convergence checks.
    pub check_interval: f64,
    /// Per-axis location change per interval below which a body counts as resting.
    pub location_threshold: f64,
    /// Per-axis Euler angle change (radians) per interval below which a body counts as resting.
    pub rotation_threshold: f64,
    /// Integration step (seconds).
    pub time_step: f64,
    /// Gravity acceleration.
    pub gravity: Vector3<f64>,
    /// Contact solver iterations per step.
    pub solver_iterations: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            min_time: 4.0,
            max_time: 40.0,
            check_interval: 2.0,
            location_threshold: 0.01,
            rotation_threshold: 0.1,
            time_step: 1.0 / 120.0,
            gravity: Vector3::new(0.0, 0.0, -9.81),
            solver_iterations: 10,
        }
    }
}

impl SimulationConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the simulated time window.
    pub fn with_time_window(mut self, min_time: f64, max_time: f64) -> Self {
        self.min_time = min_time;
        self.max_time = max_time;
        self
    }

    /// Sets the convergence check interval.
    pub fn with_check_interval(mut self, interval: f64) -> Self {
        self.check_interval = interval;
        self
    }

    /// Sets the location and rotation stop thresholds.
    pub fn with_thresholds(mut self, location: f64, rotation: f64) -> Self {
        self.location_threshold = location;
        self.rotation_threshold = rotation;
        self
    }

    /// Sets the integration step.
    pub fn with_time_step(mut self, dt: f64) -> Self {
        self.time_step = dt.max(1e-4);
        self
    }

    /// Sets gravity.
    pub fn with_gravity(mut self, gravity: Vector3<f64>) -> Self {
        self.gravity = gravity;
        self
    }

    /// Sets the number of contact solver iterations.
    pub fn with_solver_iterations(mut self, iterations: usize) -> Self {
        self.solver_iterations = iterations.max(1);
        self
    }

    /// Checks the time window, interval and step.
    pub fn validate(&self) -> Result<()> {
        if !(self.min_time >= 0.0) || !(self.min_time < self.max_time) {
            return Err(Error::InvalidConfig(format!(
                "min_time ({}) must be non-negative and smaller than max_time ({})",
                self.min_time, self.max_time
            )));
        }
        if !(self.check_interval > 0.0) {
            return Err(Error::InvalidConfig(
                "check_interval must be positive".into(),
            ));
        }
        if !(self.time_step > 0.0) || self.time_step > self.check_interval {
            return Err(Error::InvalidConfig(
                "time_step must be positive and not exceed check_interval".into(),
            ));
        }
        Ok(())
    }
}
