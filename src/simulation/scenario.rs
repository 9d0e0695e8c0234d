//! Build fully-initialized simulation scenarios from configuration
//!
//! Takes a `ScenarioConfig` (YAML-facing) and produces a `Scenario` runtime
//! bundle containing:
//! - engine settings (`Engine`)
//! - numerical parameters (`Parameters`)
//! - system state (`System`, bodies at t = 0)
//! - the quad tree indexing those bodies (`QuadTree`)
//!
//! The scenario is inserted into Bevy as a `Resource` by the viewer, or
//! driven directly by the headless runner

use std::f64::consts::PI;

use bevy::prelude::Resource;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::configuration::config::{BodyConfig, DiskConfig, EscapePolicy, RenderConfig, ScenarioConfig};
use crate::error::ConfigError;
use crate::simulation::engine::Engine;
use crate::simulation::integrator::tree_step;
use crate::simulation::params::Parameters;
use crate::simulation::quadtree::QuadTree;
use crate::simulation::region::Aabb;
use crate::simulation::states::{Body, BodyId, BodySnapshot, NVec2, System};

/// Bevy resource representing a fully-initialized simulation scenario
///
/// This is the main "runtime bundle" constructed from a [`ScenarioConfig`]:
/// the engine settings, parameters, current system state and the tree
/// over it. `dropped` lists bodies that left the root region and are no
/// longer simulated.
#[derive(Resource)]
pub struct Scenario {
    pub engine: Engine,
    pub parameters: Parameters,
    pub system: System,
    pub tree: QuadTree,
    pub render: RenderConfig,
    pub dropped: Vec<BodyId>,
}

impl Scenario {
    pub fn build_scenario(cfg: ScenarioConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;

        // Bodies: explicit list first, then the generated disk
        let mut bodies: Vec<Body> = cfg.bodies.iter().map(|bc: &BodyConfig| Body {
            position: NVec2::new(bc.x[0], bc.x[1]),
            velocity: NVec2::new(bc.v[0], bc.v[1]),
            mass: bc.m,
        }).collect();
        if let Some(disk) = &cfg.disk {
            bodies.extend(generate_disk(disk));
        }

        let engine = Engine {
            theta: cfg.theta(),
            max_depth: cfg.max_depth(),
            parallel: cfg.engine.parallel,
            escape_policy: cfg.engine.escape_policy,
        };

        let parameters = Parameters {
            h0: cfg.parameters.h0,
            t_end: cfg.parameters.t_end,
            real_time_scale: cfg.parameters.real_time_scale,
        };

        Ok(Self::new(cfg.region, System::new(bodies), engine, parameters, cfg.render))
    }

    /// Insert every body of `system` into a fresh tree over `region`.
    /// Bodies outside the region are logged and start out dropped.
    pub fn new(region: Aabb, system: System, engine: Engine, parameters: Parameters, render: RenderConfig) -> Self {
        let mut tree = QuadTree::new(region)
            .with_max_depth(engine.max_depth)
            .with_parallel(engine.parallel);

        let mut dropped = Vec::new();
        for id in 0..system.bodies.len() {
            if !tree.insert(id, &system.bodies) {
                log::warn!("body {id} at {:?} lies outside the root region; skipping", system.bodies[id].position);
                dropped.push(id);
            }
        }
        log::info!("scenario: {} bodies in tree, total mass {:.3}", tree.len(), tree.total_mass());

        Self {
            engine,
            parameters,
            system,
            tree,
            render,
            dropped,
        }
    }

    /// Advance one tick of length `dt`, then apply the escape policy.
    /// Returns the bodies dropped during this tick.
    pub fn step(&mut self, dt: f64) -> Vec<BodyId> {
        let escaped = tree_step(&mut self.system, &mut self.tree, dt, self.engine.theta);
        if escaped.is_empty() {
            return escaped;
        }

        let dropped = self.handle_escaped(escaped);
        if !dropped.is_empty() {
            log::info!("t = {:.6}: dropped {} bodies ({} still tracked)", self.system.t, dropped.len(), self.tree.len());
        }
        self.dropped.extend_from_slice(&dropped);
        dropped
    }

    fn handle_escaped(&mut self, escaped: Vec<BodyId>) -> Vec<BodyId> {
        let region = self.tree.region();
        let mut dropped = Vec::new();

        for id in escaped {
            let body = &mut self.system.bodies[id];
            match self.engine.escape_policy {
                EscapePolicy::Drop => {}
                EscapePolicy::Wrap => {
                    body.position.x = wrap(body.position.x, region.left, region.right);
                    body.position.y = wrap(body.position.y, region.bottom, region.top);
                }
                EscapePolicy::Reflect => {
                    reflect(&mut body.position.x, &mut body.velocity.x, region.left, region.right);
                    reflect(&mut body.position.y, &mut body.velocity.y, region.bottom, region.top);
                }
            }

            let placed = self.engine.escape_policy != EscapePolicy::Drop
                && self.tree.insert(id, &self.system.bodies);
            if !placed {
                log::debug!("body {id} dropped at {:?}", self.system.bodies[id].position);
                dropped.push(id);
            }
        }
        dropped
    }

    /// Run fixed `h0` steps until `t_end`. Returns the number of steps taken.
    pub fn run_headless(&mut self) -> usize {
        // tolerate t_end / h0 landing a rounding error above an integer
        let steps = (self.parameters.t_end / self.parameters.h0 - 1e-9).ceil().max(0.0) as usize;
        let report_every = (steps / 10).max(1);
        log::info!("headless run: {steps} steps of {} with theta {}", self.parameters.h0, self.engine.theta);

        for step in 1..=steps {
            self.step(self.parameters.h0);
            if step % report_every == 0 {
                log::info!(
                    "step {step}/{steps}: t = {:.6}, tracked = {}, com = ({:.4}, {:.4})",
                    self.system.t,
                    self.tree.len(),
                    self.tree.center_of_mass().x,
                    self.tree.center_of_mass().y,
                );
            }
        }
        steps
    }

    pub fn snapshot(&self) -> Vec<BodySnapshot> {
        self.tree.snapshot(&self.system.bodies)
    }

    pub fn region_geometry(&self) -> Vec<Aabb> {
        self.tree.region_geometry()
    }
}

/// Bodies on a disk around the origin with tangential velocities.
pub fn generate_disk(cfg: &DiskConfig) -> Vec<Body> {
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    (0..cfg.count).map(|_| {
        let r = rng.gen_range(cfg.radius[0]..=cfg.radius[1]);
        let t = rng.gen_range(0.0..2.0 * PI);
        let v = rng.gen_range(cfg.speed[0]..=cfg.speed[1]);
        let m = rng.gen_range(cfg.mass[0]..=cfg.mass[1]);
        Body {
            position: NVec2::new(r * t.cos(), r * t.sin()),
            velocity: NVec2::new(v * (t + PI / 2.0).cos(), v * (t + PI / 2.0).sin()),
            mass: m,
        }
    }).collect()
}

// Toroidal wrap into [lo, hi)
fn wrap(x: f64, lo: f64, hi: f64) -> f64 {
    lo + (x - lo).rem_euclid(hi - lo)
}

// Mirror across whichever edge was crossed
fn reflect(x: &mut f64, v: &mut f64, lo: f64, hi: f64) {
    if *x < lo {
        *x = 2.0 * lo - *x;
        *v = -*v;
    } else if *x >= hi {
        *x = 2.0 * hi - *x;
        *v = -*v;
    }
}
