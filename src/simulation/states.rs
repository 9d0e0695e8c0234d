//! Core state types for the N-body simulation.
//!
//! - `Body`   a point mass, using `NVec2`
//! - `System` the contiguous body store plus the simulation time `t`
//!
//! Bodies are addressed by their index in `System::bodies` for the whole run.
//! The quad tree only ever holds these indices.

use nalgebra::Vector2;
pub type NVec2 = Vector2<f64>;

/// Index of a body in `System::bodies`.
pub type BodyId = usize;

#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub position: NVec2,
    pub velocity: NVec2,
    pub mass: f64,
}

impl Body {
    pub fn new(position: NVec2, velocity: NVec2, mass: f64) -> Self {
        Self { position, velocity, mass }
    }
}

#[derive(Debug, Clone, Default)]
pub struct System {
    pub bodies: Vec<Body>, // body store, stable indices
    pub t: f64, // time
}

impl System {
    pub fn new(bodies: Vec<Body>) -> Self {
        Self { bodies, t: 0.0 }
    }

    /// Total mass of every body in the store, tracked or not.
    pub fn total_mass(&self) -> f64 {
        self.bodies.iter().map(|b| b.mass).sum()
    }
}

/// Read-only view of one tracked body, handed to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodySnapshot {
    pub id: BodyId,
    pub position: NVec2,
    pub mass: f64,
}
