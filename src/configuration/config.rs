//! Configuration types for loading simulation scenarios from YAML.
//!
//! This module defines a thin, `serde`-deserializable representation of a
//! simulation scenario. A scenario consists of:
//!
//! - [`EngineConfig`]     – tree options (theta, depth limit, parallelism, escape policy)
//! - [`ParametersConfig`] – step size, end time, optional real-time stepping
//! - [`Aabb`]             – the root region of the tree
//! - [`BodyConfig`]       – initial state for each explicitly listed body
//! - [`DiskConfig`]       – optional generator for a rotating disk of bodies
//! - [`RenderConfig`]     – viewer options, including the tree overlay toggle
//! - [`ScenarioConfig`]   – top-level wrapper used to load a scenario from YAML
//!
//! # YAML format
//! The galaxy that ships in `scenarios/galaxy.yaml`:
//!
//! ```yaml
//! engine:
//!   theta: 1.0
//!   max_depth: 32
//!   parallel: true
//!   escape_policy: drop     # drop | wrap | reflect
//!
//! parameters:
//!   h0: 1.0e-5              # fixed step size
//!   t_end: 0.05             # total simulation time (headless runs)
//!   real_time_scale: 1.0e-3 # viewer: dt = frame seconds * scale
//!
//! region: { left: -1.0, top: 1.0, right: 1.0, bottom: -1.0 }
//!
//! bodies:
//!   - x: [ -0.1, 0.0 ]
//!     v: [  0.0, 80.0 ]
//!     m: 5000.0
//!   - x: [  0.1, 0.0 ]
//!     v: [  0.0, -80.0 ]
//!     m: 5000.0
//!
//! disk:
//!   count: 998
//!   seed: 42
//!   radius: [ 0.5, 1.0 ]
//!   speed: [ 54.0, 60.0 ]
//!   mass: [ 5.0, 10.0 ]
//!
//! render:
//!   render_tree_overlay: false
//!   scale: 400.0
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::simulation::quadtree::DEFAULT_MAX_DEPTH;
use crate::simulation::region::Aabb;

/// What the driver does with a body that leaves the root region
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EscapePolicy {
    /// Stop tracking the body; it stays in the store but is never updated again
    #[default]
    Drop,

    /// Wrap the position back into the region as on a torus and re-insert
    Wrap,

    /// Mirror the position across the crossed edge, flip that velocity component and re-insert
    Reflect,
}

/// Tree / engine configuration
#[derive(Deserialize, Debug, Clone)]
pub struct EngineConfig {
    pub theta: Option<f64>, // opening threshold, 0 = exact pairwise
    pub max_depth: Option<usize>, // subdivision limit before bucketing
    #[serde(default)]
    pub parallel: bool, // evaluate accelerations on the rayon pool
    #[serde(default)]
    pub escape_policy: EscapePolicy,
}

/// Step size and run length
#[derive(Deserialize, Debug, Clone)]
pub struct ParametersConfig {
    pub h0: f64,      // fixed time step size
    pub t_end: f64,   // time end
    pub real_time_scale: Option<f64>, // viewer only: dt = frame seconds * scale
}

/// Configuration for a single body's initial state
#[derive(Deserialize, Debug, Clone)]
pub struct BodyConfig {
    pub x: [f64; 2], // Initial position
    pub v: [f64; 2], // Initial velocity
    pub m: f64,      // Mass of the body
}

/// Generator for a disk of bodies orbiting the origin.
///
/// Each body gets a radius, speed and mass drawn uniformly from the given
/// `[min, max]` ranges, a uniform random angle, and a velocity tangent to
/// its circle (counter-clockwise).
#[derive(Deserialize, Debug, Clone)]
pub struct DiskConfig {
    pub count: usize,
    pub seed: u64,
    pub radius: [f64; 2],
    pub speed: [f64; 2],
    pub mass: [f64; 2],
}

/// Viewer settings; not read by the simulation itself
#[derive(Deserialize, Debug, Clone)]
pub struct RenderConfig {
    #[serde(default)]
    pub render_tree_overlay: bool, // draw every leaf region each frame
    #[serde(default = "default_scale")]
    pub scale: f32, // pixels per simulation unit
    #[serde(default = "default_body_radius")]
    pub body_radius: f32, // circle radius in pixels
}

fn default_scale() -> f32 {
    400.0
}

fn default_body_radius() -> f32 {
    1.5
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            render_tree_overlay: false,
            scale: default_scale(),
            body_radius: default_body_radius(),
        }
    }
}

/// Top-level scenario configuration loaded from YAML.
#[derive(Deserialize, Debug, Clone)]
pub struct ScenarioConfig {
    pub engine: EngineConfig, // Tree settings
    pub parameters: ParametersConfig, // Step size and run length
    pub region: Aabb, // Root region of the tree
    #[serde(default)]
    pub bodies: Vec<BodyConfig>, // Explicitly placed bodies
    pub disk: Option<DiskConfig>, // Optional generated disk
    #[serde(default)]
    pub render: RenderConfig, // Viewer options
}

impl ScenarioConfig {
    /// Parse and validate a scenario from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let cfg: ScenarioConfig = serde_yaml::from_str(yaml)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse and validate a scenario file
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: ScenarioConfig = serde_yaml::from_reader(BufReader::new(file))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn theta(&self) -> f64 {
        self.engine.theta.unwrap_or(1.0)
    }

    pub fn max_depth(&self) -> usize {
        self.engine.max_depth.unwrap_or(DEFAULT_MAX_DEPTH)
    }

    /// Reject values the tree cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.region.is_valid() {
            return Err(ConfigError::InvalidRegion(self.region));
        }

        let theta = self.theta();
        if !theta.is_finite() || theta < 0.0 {
            return Err(ConfigError::InvalidTheta(theta));
        }

        if self.max_depth() == 0 {
            return Err(ConfigError::InvalidMaxDepth);
        }

        let h0 = self.parameters.h0;
        if !h0.is_finite() || h0 <= 0.0 {
            return Err(ConfigError::InvalidTimeStep(h0));
        }
        if let Some(scale) = self.parameters.real_time_scale {
            if !scale.is_finite() || scale <= 0.0 {
                return Err(ConfigError::InvalidTimeStep(scale));
            }
        }

        if let Some(disk) = &self.disk {
            disk.validate()?;
        }
        Ok(())
    }
}

impl DiskConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, [lo, hi]) in [("radius", self.radius), ("speed", self.speed), ("mass", self.mass)] {
            if !lo.is_finite() || !hi.is_finite() || lo > hi {
                return Err(ConfigError::InvalidDisk(format!("{name} range [{lo}, {hi}] is not ordered")));
            }
        }
        if self.radius[0] < 0.0 {
            return Err(ConfigError::InvalidDisk("radius must be non-negative".to_string()));
        }
        Ok(())
    }
}
