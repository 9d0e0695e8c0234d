pub mod simulation;
pub mod configuration;
pub mod visualization;
pub mod benchmark;
pub mod error;

pub use simulation::states::{Body, BodyId, BodySnapshot, System, NVec2};
pub use simulation::region::Aabb;
pub use simulation::quadtree::{QuadTree, QuadNode, NodeId, DEFAULT_MAX_DEPTH};
pub use simulation::forces::{direct_accelerations, pairwise_acceleration, MIN_DIST_SQ};
pub use simulation::integrator::{direct_step, tree_step};
pub use simulation::scenario::{Scenario, generate_disk};

pub use configuration::config::{EngineConfig, ParametersConfig, BodyConfig, DiskConfig, RenderConfig, ScenarioConfig, EscapePolicy};
pub use error::{ConfigError, TreeError};

pub use visualization::vis2d::run_2d;

pub use benchmark::benchmark::bench_tick;
