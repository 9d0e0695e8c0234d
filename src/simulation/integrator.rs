//! Fixed-step time integrators for the N-body system
//!
//! Both integrators are kick-then-drift (semi-implicit Euler):
//! `v += dt * a(x)`, then `x += dt * v`.
//! - `tree_step`   drives a `QuadTree` tick and repartitions in place
//! - `direct_step` is the O(N²) reference used by tests and benchmarks

use super::forces::direct_accelerations;
use super::quadtree::QuadTree;
use super::states::{BodyId, NVec2, System};

/// Advance the system by one step through the quad tree.
/// Returns the bodies that left the tree's root region during the drift.
pub fn tree_step(sys: &mut System, tree: &mut QuadTree, dt: f64, theta: f64) -> Vec<BodyId> {
    let escaped = tree.tick(&mut sys.bodies, dt, theta);
    sys.t += dt;
    escaped
}

/// Advance every body in the store by one step using direct summation.
pub fn direct_step(sys: &mut System, dt: f64) {
    let n = sys.bodies.len();
    if n == 0 { // no bodies, return
        return;
    }

    let mut acc = vec![NVec2::zeros(); n];
    direct_accelerations(sys, &mut acc);

    // Kick: v_n+1 = v_n + dt * a_n
    for (b, a) in sys.bodies.iter_mut().zip(acc.iter()) {
        b.velocity += dt * *a;
    }

    // Drift: x_n+1 = x_n + dt * v_n+1
    for b in sys.bodies.iter_mut() {
        b.position += dt * b.velocity;
    }

    sys.t += dt;
}
