use std::time::Instant;

use crate::simulation::integrator::{direct_step, tree_step};
use crate::simulation::quadtree::QuadTree;
use crate::simulation::region::Aabb;
use crate::simulation::states::{Body, NVec2, System};

/// Deterministic spread of `n` bodies inside the unit disk, no rand needed
pub fn bench_system(n: usize) -> System {
    let bodies = (0..n).map(|i| {
        let i_f = i as f64;
        let x = NVec2::new((i_f * 0.37).sin() * 0.8, (i_f * 0.13).cos() * 0.8);
        Body::new(x, NVec2::zeros(), 1.0)
    }).collect();
    System::new(bodies)
}

/// Time the direct O(N²) step against the quad tree tick for growing N
pub fn bench_tick() {
    let ns = [200, 400, 800, 1600, 3200, 6400];
    let steps = 5; // ticks per model
    let dt = 1.0e-6;
    let theta = 1.0;

    for n in ns {
        let template = bench_system(n);
        let region = Aabb::new(-1.0, 1.0, 1.0, -1.0);

        // Direct
        let mut sys = template.clone();
        let t0 = Instant::now();
        for _ in 0..steps {
            direct_step(&mut sys, dt);
        }
        let dt_direct = t0.elapsed().as_secs_f64() / steps as f64;

        // Tree, sequential and parallel read phase
        let mut timings = [0.0; 2];
        for (slot, parallel) in [false, true].into_iter().enumerate() {
            let mut sys = template.clone();
            let mut tree = QuadTree::new(region).with_parallel(parallel);
            for id in 0..sys.bodies.len() {
                tree.insert(id, &sys.bodies);
            }

            let t1 = Instant::now();
            for _ in 0..steps {
                tree_step(&mut sys, &mut tree, dt, theta);
            }
            timings[slot] = t1.elapsed().as_secs_f64() / steps as f64;
        }

        println!(
            "N = {n:5}, direct = {:8.6} s, tree = {:8.6} s, tree (parallel) = {:8.6} s",
            dt_direct, timings[0], timings[1]
        );
    }
}
