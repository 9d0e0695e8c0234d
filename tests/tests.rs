use std::collections::HashSet;

use approx::{assert_abs_diff_eq, assert_relative_eq};

use bhquad::configuration::config::{EscapePolicy, RenderConfig, ScenarioConfig};
use bhquad::simulation::engine::Engine;
use bhquad::simulation::params::Parameters;
use bhquad::{
    direct_accelerations, generate_disk, tree_step, Aabb, Body, ConfigError, NVec2, QuadTree, Scenario, System,
};

/// The [-1, 1] square used by the galaxy scenario
pub fn unit_region() -> Aabb {
    Aabb::new(-1.0, 1.0, 1.0, -1.0)
}

pub fn body(x: f64, y: f64, vx: f64, vy: f64, m: f64) -> Body {
    Body::new(NVec2::new(x, y), NVec2::new(vx, vy), m)
}

/// Deterministic scatter of `n` bodies inside the unit disk
pub fn scattered_bodies(n: usize) -> Vec<Body> {
    (0..n).map(|i| {
        let i_f = i as f64;
        body(
            (i_f * 0.37).sin() * 0.6,
            (i_f * 0.13).cos() * 0.6,
            (i_f * 0.11).cos() * 0.5,
            (i_f * 0.29).sin() * 0.5,
            1.0 + (i % 7) as f64,
        )
    }).collect()
}

/// Build a tree holding every body of `bodies`
pub fn build_tree(bodies: &[Body]) -> QuadTree {
    let mut tree = QuadTree::new(unit_region());
    for id in 0..bodies.len() {
        assert!(tree.insert(id, bodies), "body {id} was rejected");
    }
    tree
}

pub fn engine(policy: EscapePolicy) -> Engine {
    Engine {
        theta: 1.0,
        max_depth: 32,
        parallel: false,
        escape_policy: policy,
    }
}

pub fn params(h0: f64) -> Parameters {
    Parameters {
        h0,
        t_end: 10.0 * h0,
        real_time_scale: None,
    }
}

// ==================================================================================
// Region tests
// ==================================================================================

#[test]
fn region_contains_is_half_open() {
    let r = unit_region();

    assert!(r.contains(&NVec2::new(-1.0, -1.0)), "bottom-left corner must be inside");
    assert!(r.contains(&NVec2::new(0.0, 0.0)));
    assert!(!r.contains(&NVec2::new(1.0, 0.0)), "right edge must be outside");
    assert!(!r.contains(&NVec2::new(0.0, 1.0)), "top edge must be outside");
    assert!(!r.contains(&NVec2::new(-1.0 - 1e-12, 0.0)));
}

#[test]
fn region_partition_order_and_size() {
    let [nw, ne, sw, se] = unit_region().partition();

    assert_eq!(nw, Aabb::new(-1.0, 1.0, 0.0, 0.0));
    assert_eq!(ne, Aabb::new(0.0, 1.0, 1.0, 0.0));
    assert_eq!(sw, Aabb::new(-1.0, 0.0, 0.0, -1.0));
    assert_eq!(se, Aabb::new(0.0, 0.0, 1.0, -1.0));
    for q in [nw, ne, sw, se] {
        assert_relative_eq!(q.width(), 1.0);
        assert_relative_eq!(q.height(), 1.0);
    }
}

#[test]
fn region_partition_is_exhaustive_and_disjoint() {
    // Odd-sized region so midlines are not round numbers
    let r = Aabb::new(-0.3, 0.7, 1.1, -0.9);
    let quads = r.partition();

    let steps = 40;
    for i in 0..=steps {
        for j in 0..=steps {
            let p = NVec2::new(
                r.left + r.width() * i as f64 / steps as f64,
                r.bottom + r.height() * j as f64 / steps as f64,
            );
            let hits = quads.iter().filter(|q| q.contains(&p)).count();
            if r.contains(&p) {
                assert_eq!(hits, 1, "point {p:?} found in {hits} quadrants");
            } else {
                assert_eq!(hits, 0, "point {p:?} outside the parent found in a quadrant");
            }
        }
    }

    // Exactly on both midlines
    let mid = r.center();
    assert_eq!(quads.iter().filter(|q| q.contains(&mid)).count(), 1);
    assert_eq!(r.quadrant_of(&mid), Some(1));
}

// ==================================================================================
// Construction tests
// ==================================================================================

#[test]
fn insert_outside_root_is_ignored() {
    let bodies = vec![body(0.5, 0.5, 0.0, 0.0, 1.0), body(1.0, 0.0, 0.0, 0.0, 1.0)];
    let mut tree = QuadTree::new(unit_region());

    assert!(tree.insert(0, &bodies));
    assert!(!tree.insert(1, &bodies), "right edge is outside the root");
    assert_eq!(tree.len(), 1);
    assert_eq!(tree.to_flat_list(), vec![0]);
    assert_relative_eq!(tree.total_mass(), 1.0);
}

#[test]
fn single_body_is_an_occupied_leaf() {
    let bodies = vec![body(0.25, -0.75, 0.0, 0.0, 3.0)];
    let tree = build_tree(&bodies);
    let root = tree.node(tree.root());

    assert!(root.is_leaf());
    assert_eq!(root.count, 1);
    assert_eq!(root.bodies, vec![0]);
    assert_eq!(root.com, bodies[0].position);
    assert_relative_eq!(root.mass, 3.0);
}

#[test]
fn flat_list_round_trip() {
    let bodies = scattered_bodies(300);
    let tree = build_tree(&bodies);

    let flat = tree.to_flat_list();
    assert_eq!(flat.len(), bodies.len());
    let ids: HashSet<_> = flat.iter().copied().collect();
    assert_eq!(ids, (0..bodies.len()).collect::<HashSet<_>>());

    let lazy: Vec<_> = tree.iter().collect();
    assert_eq!(lazy, flat, "lazy and eager linearizations disagree");

    for snap in tree.snapshot(&bodies) {
        assert_eq!(snap.position, bodies[snap.id].position);
        assert_eq!(snap.mass, bodies[snap.id].mass);
    }
}

#[test]
fn flat_list_is_preorder_nw_ne_sw_se() {
    let bodies = vec![
        body(0.5, 0.5, 0.0, 0.0, 1.0),   // NE
        body(0.5, -0.5, 0.0, 0.0, 1.0),  // SE
        body(-0.5, -0.5, 0.0, 0.0, 1.0), // SW
        body(-0.5, 0.5, 0.0, 0.0, 1.0),  // NW
    ];
    let tree = build_tree(&bodies);

    assert_eq!(tree.to_flat_list(), vec![3, 0, 2, 1]);
    assert_eq!(tree.region_geometry(), unit_region().partition().to_vec());
}

#[test]
fn mass_and_center_of_mass_after_construction() {
    let bodies = scattered_bodies(200);
    let tree = build_tree(&bodies);

    tree.validate(&bodies, 1e-9).expect("freshly built tree is inconsistent");

    let total: f64 = bodies.iter().map(|b| b.mass).sum();
    let com = bodies.iter().fold(NVec2::zeros(), |acc, b| acc + b.position * b.mass) / total;
    assert_relative_eq!(tree.total_mass(), total, max_relative = 1e-12);
    assert_abs_diff_eq!(tree.center_of_mass().x, com.x, epsilon = 1e-12);
    assert_abs_diff_eq!(tree.center_of_mass().y, com.y, epsilon = 1e-12);

    // Every internal node has four children and no direct bodies
    for id in tree.node_ids() {
        let node = tree.node(id);
        match node.children {
            Some(_) => {
                assert!(node.count > 1);
                assert!(node.bodies.is_empty());
            }
            None => assert!(node.count <= 1),
        }
    }
}

#[test]
fn zero_mass_subtree_uses_geometric_center() {
    let bodies = vec![body(-0.5, 0.5, 0.0, 0.0, 0.0), body(0.5, -0.5, 0.0, 0.0, 0.0)];
    let tree = build_tree(&bodies);
    let root = tree.node(tree.root());

    assert!(!root.is_leaf());
    assert_eq!(root.mass, 0.0);
    assert_eq!(root.com, unit_region().center());
    tree.validate(&bodies, 1e-12).unwrap();
}

#[test]
fn coincident_bodies_fall_back_to_a_bucket() {
    let bodies = vec![
        body(0.3, 0.3, 0.0, 0.0, 1.0),
        body(0.3, 0.3, 0.0, 0.0, 2.0),
        body(0.3, 0.3, 0.0, 0.0, 3.0),
    ];
    let mut tree = QuadTree::new(unit_region()).with_max_depth(6);
    for id in 0..bodies.len() {
        assert!(tree.insert(id, &bodies));
    }

    assert_eq!(tree.len(), 3);
    tree.validate(&bodies, 1e-12).unwrap();

    let bucket = tree
        .node_ids()
        .into_iter()
        .map(|id| tree.node(id))
        .find(|n| n.is_leaf() && n.count > 0)
        .unwrap();
    assert_eq!(bucket.depth, 6);
    assert_eq!(bucket.bodies.len(), 3);

    // Zero separation contributes nothing instead of NaN
    let mut moved = bodies.clone();
    let escaped = tree.tick(&mut moved, 1e-3, 1.0);
    assert!(escaped.is_empty());
    for b in &moved {
        assert!(b.velocity.iter().all(|v| v.is_finite()));
        assert_eq!(b.velocity, NVec2::zeros());
    }
}

// ==================================================================================
// Force tests
// ==================================================================================

#[test]
fn theta_zero_matches_direct_summation() {
    let mut bodies = scattered_bodies(120);
    for b in bodies.iter_mut() {
        b.velocity = NVec2::zeros();
    }
    let sys = System::new(bodies.clone());
    let mut expected = vec![NVec2::zeros(); bodies.len()];
    direct_accelerations(&sys, &mut expected);

    let tree = build_tree(&bodies);
    tree.update_velocities(&mut bodies, 1.0, 0.0);

    for (i, (b, a)) in bodies.iter().zip(expected.iter()).enumerate() {
        let err = (b.velocity - a).norm();
        assert!(err <= 1e-9 * a.norm().max(1.0), "body {i}: tree {:?} vs direct {:?}", b.velocity, a);
    }
}

#[test]
fn velocity_update_leaves_topology_and_positions_alone() {
    let mut bodies = scattered_bodies(64);
    let before = bodies.clone();
    let tree = build_tree(&bodies);
    let nodes_before = tree.node_ids();

    tree.update_velocities(&mut bodies, 1e-3, 0.7);

    assert_eq!(tree.node_ids(), nodes_before);
    for (b, old) in bodies.iter().zip(before.iter()) {
        assert_eq!(b.position, old.position);
    }
    tree.validate(&bodies, 1e-9).unwrap();
}

#[test]
fn parallel_velocity_pass_matches_sequential() {
    let bodies = scattered_bodies(500);
    let sequential = build_tree(&bodies);
    let parallel = build_tree(&bodies).with_parallel(true);

    let mut a = bodies.clone();
    let mut b = bodies.clone();
    sequential.update_velocities(&mut a, 1e-3, 0.8);
    parallel.update_velocities(&mut b, 1e-3, 0.8);

    for (x, y) in a.iter().zip(b.iter()) {
        assert_eq!(x.velocity, y.velocity);
    }
}

#[test]
fn acceleration_points_toward_the_other_body() {
    let bodies = vec![body(-0.5, 0.0, 0.0, 0.0, 1.0), body(0.5, 0.0, 0.0, 0.0, 4.0)];
    let tree = build_tree(&bodies);

    let a0 = tree.acceleration_on(0, &bodies, 0.0);
    let a1 = tree.acceleration_on(1, &bodies, 0.0);

    // |a| = m_other / d²
    assert_relative_eq!(a0.x, 4.0, max_relative = 1e-12);
    assert_relative_eq!(a1.x, -1.0, max_relative = 1e-12);
    assert_abs_diff_eq!(a0.y, 0.0);
}

// ==================================================================================
// Tick / repartition tests
// ==================================================================================

#[test]
fn invariants_hold_across_many_ticks() {
    // light enough that nobody is flung out of the root
    let mut bodies = scattered_bodies(250);
    for b in bodies.iter_mut() {
        b.mass *= 1e-4;
    }
    let mut tree = build_tree(&bodies);
    let total = tree.total_mass();

    for step in 0..200 {
        let escaped = tree.tick(&mut bodies, 1e-3, 0.6);
        assert!(escaped.is_empty(), "step {step}: unexpected escapes {escaped:?}");
        if let Err(e) = tree.validate(&bodies, 1e-8) {
            panic!("step {step}: {e}");
        }
    }

    assert_eq!(tree.len(), bodies.len());
    assert_relative_eq!(tree.total_mass(), total, max_relative = 1e-10);
    for id in tree.node_ids() {
        let node = tree.node(id);
        for &b in &node.bodies {
            assert!(node.region.contains(&bodies[b].position));
        }
    }
}

#[test]
fn escaped_body_is_reported_once() {
    let mut bodies = vec![
        body(0.9, 0.0, 1000.0, 0.0, 1.0),
        body(-0.5, -0.5, 0.0, 0.0, 1.0),
        body(-0.5, 0.5, 0.0, 0.0, 1.0),
    ];
    let mut tree = build_tree(&bodies);

    let escaped = tree.tick(&mut bodies, 1e-3, 1.0);
    assert_eq!(escaped, vec![0]);
    assert!(!tree.to_flat_list().contains(&0));
    assert_eq!(tree.len(), 2);
    assert_relative_eq!(tree.total_mass(), 2.0);
    tree.validate(&bodies, 1e-12).unwrap();

    let again = tree.tick(&mut bodies, 1e-3, 1.0);
    assert!(again.is_empty(), "escaped body reported twice");
}

#[test]
fn merge_frees_nodes_for_reuse() {
    let mut bodies = vec![
        body(-0.45, 0.55, 0.0, 0.0, 1e-9),
        body(-0.44, 0.55, 1000.0, -1000.0, 1e-9),
    ];
    let mut tree = build_tree(&bodies);
    let capacity = tree.capacity();
    assert!(tree.node_ids().len() > 5, "close pair should split several levels deep");

    let escaped = tree.tick(&mut bodies, 1e-3, 1.0);
    assert!(escaped.is_empty());
    tree.validate(&bodies, 1e-9).unwrap();

    // Root with four leaves: body 0 in NW, body 1 now in SE
    assert_eq!(tree.node_ids().len(), 5);
    let [nw, _, _, se] = tree.node(tree.root()).children.unwrap();
    assert_eq!(tree.node(nw).bodies, vec![0]);
    assert_eq!(tree.node(se).bodies, vec![1]);

    // Re-creating the same pair reuses the freed slots
    bodies.push(body(-0.44, 0.55, 0.0, 0.0, 1e-9));
    assert!(tree.insert(2, &bodies));
    assert_eq!(tree.capacity(), capacity);
    tree.validate(&bodies, 1e-9).unwrap();
}

#[test]
fn two_body_orbit_stays_bounded() {
    let mut sys = System::new(vec![
        body(-0.1, 0.0, 0.0, 80.0, 5000.0),
        body(0.1, 0.0, 0.0, -80.0, 5000.0),
    ]);
    let mut tree = build_tree(&sys.bodies);

    let dt = 1e-6;
    let mut min_sep = f64::INFINITY;
    let mut max_sep: f64 = 0.0;
    let mut closings = 0;
    let mut prev = 0.2;

    for step in 0..10_000 {
        let escaped = tree_step(&mut sys, &mut tree, dt, 1.0);
        assert!(escaped.is_empty(), "step {step}: a body left the root region");

        let sep = (sys.bodies[1].position - sys.bodies[0].position).norm();
        assert!(sep > 0.02 && sep < 0.3, "step {step}: separation {sep} out of range");
        if prev >= 0.15 && sep < 0.15 {
            closings += 1;
        }
        prev = sep;
        min_sep = min_sep.min(sep);
        max_sep = max_sep.max(sep);
    }

    assert!(min_sep < 0.12, "never closed in: min separation {min_sep}");
    assert!(max_sep > 0.18, "never opened out: max separation {max_sep}");
    assert!(closings >= 2, "expected a periodic orbit, saw {closings} approaches");
    assert!(tree.center_of_mass().norm() < 1e-6, "center of mass drifted");
    tree.validate(&sys.bodies, 1e-9).unwrap();
}

// ==================================================================================
// Scenario tests
// ==================================================================================

fn runaway_scenario(policy: EscapePolicy) -> Scenario {
    let system = System::new(vec![
        body(0.95, 0.0, 100.0, 0.0, 1e-9),
        body(-0.5, -0.5, 0.0, 0.0, 1e-9),
    ]);
    Scenario::new(unit_region(), system, engine(policy), params(1e-3), RenderConfig::default())
}

#[test]
fn drop_policy_stops_tracking() {
    let mut scenario = runaway_scenario(EscapePolicy::Drop);

    let dropped = scenario.step(1e-3);
    assert_eq!(dropped, vec![0]);
    assert_eq!(scenario.dropped, vec![0]);
    assert_eq!(scenario.tree.len(), 1);
    assert!(scenario.snapshot().iter().all(|s| s.id != 0));
}

#[test]
fn wrap_policy_reenters_from_the_opposite_edge() {
    let mut scenario = runaway_scenario(EscapePolicy::Wrap);

    let dropped = scenario.step(1e-3);
    assert!(dropped.is_empty());
    assert_eq!(scenario.tree.len(), 2);
    assert_abs_diff_eq!(scenario.system.bodies[0].position.x, -0.95, epsilon = 1e-6);
    scenario.tree.validate(&scenario.system.bodies, 1e-9).unwrap();
}

#[test]
fn reflect_policy_bounces_off_the_edge() {
    let mut scenario = runaway_scenario(EscapePolicy::Reflect);

    let dropped = scenario.step(1e-3);
    assert!(dropped.is_empty());
    assert_eq!(scenario.tree.len(), 2);
    assert_abs_diff_eq!(scenario.system.bodies[0].position.x, 0.95, epsilon = 1e-6);
    assert!(scenario.system.bodies[0].velocity.x < 0.0);
    scenario.tree.validate(&scenario.system.bodies, 1e-9).unwrap();
}

#[test]
fn run_headless_reaches_t_end() {
    let mut scenario = runaway_scenario(EscapePolicy::Wrap);
    let steps = scenario.run_headless();

    assert_eq!(steps, 10);
    assert_relative_eq!(scenario.system.t, 0.01, max_relative = 1e-9);
    assert_eq!(scenario.tree.len(), 2);
}

// ==================================================================================
// Configuration tests
// ==================================================================================

const SCENARIO_YAML: &str = r#"
engine:
  theta: 0.5
  escape_policy: wrap

parameters:
  h0: 1.0e-5
  t_end: 1.0e-3

region: { left: -1.0, top: 1.0, right: 1.0, bottom: -1.0 }

bodies:
  - x: [ -0.1, 0.0 ]
    v: [  0.0, 80.0 ]
    m: 5000.0
  - x: [  0.1, 0.0 ]
    v: [  0.0, -80.0 ]
    m: 5000.0
  - x: [  3.0, 0.0 ]
    v: [  0.0, 0.0 ]
    m: 1.0

disk:
  count: 20
  seed: 7
  radius: [ 0.5, 0.9 ]
  speed: [ 54.0, 60.0 ]
  mass: [ 5.0, 10.0 ]
"#;

#[test]
fn scenario_yaml_builds_a_tree() {
    let cfg = ScenarioConfig::from_yaml_str(SCENARIO_YAML).unwrap();
    assert_eq!(cfg.engine.escape_policy, EscapePolicy::Wrap);
    assert_eq!(cfg.max_depth(), bhquad::DEFAULT_MAX_DEPTH);
    assert!(!cfg.render.render_tree_overlay);

    let scenario = Scenario::build_scenario(cfg).unwrap();
    assert_eq!(scenario.system.bodies.len(), 23);
    // the body at x = 3 is outside the root
    assert_eq!(scenario.tree.len(), 22);
    assert_eq!(scenario.dropped, vec![2]);
    assert_relative_eq!(scenario.engine.theta, 0.5);
    scenario.tree.validate(&scenario.system.bodies, 1e-9).unwrap();
}

#[test]
fn invalid_configs_are_rejected() {
    let flipped = SCENARIO_YAML.replace("top: 1.0, right: 1.0, bottom: -1.0", "top: -1.0, right: 1.0, bottom: 1.0");
    assert!(matches!(ScenarioConfig::from_yaml_str(&flipped), Err(ConfigError::InvalidRegion(_))));

    let theta = SCENARIO_YAML.replace("theta: 0.5", "theta: -0.5");
    assert!(matches!(ScenarioConfig::from_yaml_str(&theta), Err(ConfigError::InvalidTheta(_))));

    let step = SCENARIO_YAML.replace("h0: 1.0e-5", "h0: 0.0");
    assert!(matches!(ScenarioConfig::from_yaml_str(&step), Err(ConfigError::InvalidTimeStep(_))));

    let disk = SCENARIO_YAML.replace("radius: [ 0.5, 0.9 ]", "radius: [ 0.9, 0.5 ]");
    assert!(matches!(ScenarioConfig::from_yaml_str(&disk), Err(ConfigError::InvalidDisk(_))));

    assert!(matches!(ScenarioConfig::from_yaml_str("engine: ["), Err(ConfigError::Yaml(_))));
}

#[test]
fn disk_generator_is_seeded_and_in_range() {
    let cfg = ScenarioConfig::from_yaml_str(SCENARIO_YAML).unwrap();
    let disk = cfg.disk.unwrap();

    let a = generate_disk(&disk);
    let b = generate_disk(&disk);
    assert_eq!(a, b);
    assert_eq!(a.len(), 20);

    for body in &a {
        let r = body.position.norm();
        assert!((0.5 - 1e-12..=0.9 + 1e-12).contains(&r));
        assert!((54.0 - 1e-9..=60.0 + 1e-9).contains(&body.velocity.norm()));
        assert!((5.0..=10.0).contains(&body.mass));
        // tangential velocity
        assert!(body.position.dot(&body.velocity).abs() < 1e-9 * r * body.velocity.norm().max(1.0));
    }
}
