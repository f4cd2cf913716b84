//! Rigid-body attributes consumed by the settling simulator.

use crate::scene::ObjectHandle;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Whether a body is moved by the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BodyKind {
    /// Moved by gravity and contacts; its final pose is committed.
    #[default]
    Active,
    /// Obstacle: collides but is never moved and never written back.
    Passive,
}

/// How the mass of a body is obtained.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MassPolicy {
    /// Explicit mass.
    Fixed(f64),
    /// `density * volume` of the (scaled) mesh.
    FromVolume {
        /// Mass per unit volume.
        density: f64,
    },
}

impl Default for MassPolicy {
    fn default() -> Self {
        Self::FromVolume { density: 1.0 }
    }
}

/// Shape used for contact generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CollisionShape {
    /// The 8 corners of the bounding box.
    Box,
    /// Every vertex of the mesh.
    #[default]
    ConvexHull,
    /// Every vertex of the mesh; kept distinct for callers that track the authoring intent.
    Mesh,
}

/// Per-object physics parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RigidBodySettings {
    /// Active or passive.
    pub kind: BodyKind,
    /// Mass policy.
    pub mass: MassPolicy,
    /// Contact shape.
    pub collision_shape: CollisionShape,
    /// Coulomb friction coefficient.
    pub friction: f64,
    /// Fraction of linear velocity lost per second (0.0-1.0).
    pub linear_damping: f64,
    /// Fraction of angular velocity lost per second (0.0-1.0).
    pub angular_damping: f64,
    /// Fraction of angular velocity lost per second while touching something (0.0-1.0).
    pub rolling_friction: f64,
    /// Distance below which approaching bodies are treated as in contact.
    pub collision_margin: f64,
    /// Set on compound children: the body whose rigid motion this object follows.
    pub compound_parent: Option<ObjectHandle>,
}

impl Default for RigidBodySettings {
    fn default() -> Self {
        Self {
            kind: BodyKind::Active,
            mass: MassPolicy::default(),
            collision_shape: CollisionShape::default(),
            friction: 0.5,
            linear_damping: 0.04,
            angular_damping: 0.1,
            rolling_friction: 0.5,
            collision_margin: 0.04,
            compound_parent: None,
        }
    }
}

impl RigidBodySettings {
    /// Active body with default parameters.
    pub fn active() -> Self {
        Self::default()
    }

    /// Passive obstacle with default parameters.
    pub fn passive() -> Self {
        Self {
            kind: BodyKind::Passive,
            ..Self::default()
        }
    }

    /// Sets an explicit mass.
    pub fn with_mass(mut self, mass: f64) -> Self {
        self.mass = MassPolicy::Fixed(mass.max(f64::MIN_POSITIVE));
        self
    }

    /// Derives the mass from the mesh volume.
    pub fn with_mass_from_volume(mut self, density: f64) -> Self {
        self.mass = MassPolicy::FromVolume {
            density: density.max(f64::MIN_POSITIVE),
        };
        self
    }

    /// Sets the collision shape.
    pub fn with_collision_shape(mut self, shape: CollisionShape) -> Self {
        self.collision_shape = shape;
        self
    }

    /// Sets the friction coefficient.
    pub fn with_friction(mut self, friction: f64) -> Self {
        self.friction = friction.max(0.0);
        self
    }

    /// Sets linear and angular damping.
    pub fn with_damping(mut self, linear: f64, angular: f64) -> Self {
        self.linear_damping = linear.clamp(0.0, 1.0);
        self.angular_damping = angular.clamp(0.0, 1.0);
        self
    }

    /// Sets the rolling friction.
    pub fn with_rolling_friction(mut self, rolling_friction: f64) -> Self {
        self.rolling_friction = rolling_friction.clamp(0.0, 1.0);
        self
    }

    /// Sets the collision margin.
    pub fn with_collision_margin(mut self, margin: f64) -> Self {
        self.collision_margin = margin.max(0.0);
        self
    }

    /// Attaches this body to a compound parent.
    pub fn with_compound_parent(mut self, parent: ObjectHandle) -> Self {
        self.compound_parent = Some(parent);
        self
    }

    /// Returns true for active bodies.
    pub fn is_active(&self) -> bool {
        self.kind == BodyKind::Active
    }

    /// Returns true for compound children.
    pub fn is_compound_child(&self) -> bool {
        self.compound_parent.is_some()
    }

    /// Resolves the mass for a mesh of the given volume. Degenerate volumes fall back to 1.
    pub fn resolve_mass(&self, volume: f64) -> f64 {
        match self.mass {
            MassPolicy::Fixed(m) => m,
            MassPolicy::FromVolume { density } => {
                let m = density * volume.abs();
                if m > 1e-9 {
                    m
                } else {
                    1.0
                }
            }
        }
    }
}
