//! Error types for bhquad.

use std::path::PathBuf;

use thiserror::Error;

use crate::simulation::quadtree::NodeId;
use crate::simulation::states::BodyId;

/// Problems loading or validating a scenario file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read scenario {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid region: need finite extents with right > left and top > bottom, got {0:?}")]
    InvalidRegion(crate::simulation::region::Aabb),

    #[error("theta must be finite and non-negative, got {0}")]
    InvalidTheta(f64),

    #[error("time step must be finite and positive, got {0}")]
    InvalidTimeStep(f64),

    #[error("max_depth must be at least 1")]
    InvalidMaxDepth,

    #[error("invalid disk generator: {0}")]
    InvalidDisk(String),
}

/// A broken structural invariant found by `QuadTree::validate`.
#[derive(Debug, Error, PartialEq)]
pub enum TreeError {
    #[error("node {node}: count is {count} but subtree holds {found} bodies")]
    CountMismatch { node: NodeId, count: usize, found: usize },

    #[error("node {node}: shape does not match count {count}")]
    MalformedNode { node: NodeId, count: usize },

    #[error("node {node}: body {body} lies outside the node's region")]
    BodyOutsideRegion { node: NodeId, body: BodyId },

    #[error("node {node}: mass {mass} differs from subtree mass {expected}")]
    MassMismatch { node: NodeId, mass: f64, expected: f64 },

    #[error("node {node}: center of mass off by {error}")]
    CenterOfMassMismatch { node: NodeId, error: f64 },
}
