//! # Barnes–Hut Quad Tree (2D)
//!
//! This module implements a **2D Barnes–Hut quad tree** that is built once and
//! then kept up to date *in place* as bodies move, instead of being rebuilt
//! from scratch every step.
//!
//! ## Core Concepts
//!
//! - Space is recursively split into 4 quadrants (NW, NE, SW, SE).
//! - A leaf holds zero or one body; an internal node holds exactly four
//!   children and no body of its own.
//! - Every node stores the total mass, the center of mass (COM) and the number
//!   of bodies beneath it.
//! - Distant subtrees are treated as a single point mass at their COM when
//!   `width² / dist² < theta²`.
//!
//! ## Incremental repartitioning
//!
//! After positions are integrated, a body that leaves its leaf is handed up
//! the tree until it reaches an ancestor whose region still contains it, and is
//! re-inserted below that ancestor. Nodes split when a second body arrives and
//! merge back into a leaf when their count drops to one or zero. Bodies that
//! leave the root region are returned to the caller.
//!
//! ## Storage
//!
//! Nodes live in an arena (`Vec<QuadNode>`) and refer to their children by
//! index. Nodes released by a merge go on a free list and are reused by later
//! splits. Bodies are never owned by the tree: it stores indices into the
//! caller's `&[Body]`.
//!
//! ## Coincident bodies
//!
//! Bodies at (numerically) the same position can never be separated by
//! bisection. Splitting stops at `max_depth`; a leaf at that depth becomes a
//! bucket that keeps every body it receives.

use rayon::prelude::*;

use crate::error::TreeError;
use crate::simulation::forces::{pairwise_acceleration, MIN_DIST_SQ};
use crate::simulation::region::Aabb;
use crate::simulation::states::{Body, BodyId, BodySnapshot, NVec2};

/// Index of a node in the tree's arena.
pub type NodeId = usize;

/// Default subdivision limit. A root of width 2 bottoms out at cells about
/// `5e-10` wide.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// A single quad tree node.
///
/// - `count == 0`: empty leaf
/// - `count == 1`: leaf holding one body
/// - `count > 1` : internal node with four children, or a bucket leaf at
///   `max_depth`
#[derive(Debug, Clone)]
pub struct QuadNode {
    pub region: Aabb,
    pub depth: usize,
    pub mass: f64,
    pub com: NVec2,
    pub count: usize,
    pub children: Option<[NodeId; 4]>, // NW, NE, SW, SE
    pub bodies: Vec<BodyId>,            // only populated on leaves
}

impl QuadNode {
    fn empty(region: Aabb, depth: usize) -> Self {
        Self {
            region,
            depth,
            mass: 0.0,
            com: region.center(),
            count: 0,
            children: None,
            bodies: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Fold one more body into the running mass-weighted average.
    fn absorb(&mut self, position: &NVec2, mass: f64) {
        let total = self.mass + mass;
        let weighted = self.com * self.mass + position * mass;
        self.set_aggregate(total, weighted);
        self.count += 1;
    }

    /// Store `mass` and `weighted / mass`, falling back to the geometric
    /// center when the mass is numerically zero.
    fn set_aggregate(&mut self, mass: f64, weighted: NVec2) {
        self.mass = mass;
        self.com = if mass.abs() < f64::EPSILON {
            self.region.center()
        } else {
            weighted / mass
        };
    }
}

/// Quad tree over the bodies of an external store.
#[derive(Debug, Clone)]
pub struct QuadTree {
    nodes: Vec<QuadNode>,
    free: Vec<NodeId>,
    root: NodeId,
    max_depth: usize,
    parallel: bool,
}

impl QuadTree {
    /// Create an empty tree covering `region`.
    pub fn new(region: Aabb) -> Self {
        Self {
            nodes: vec![QuadNode::empty(region, 0)],
            free: Vec::new(),
            root: 0,
            max_depth: DEFAULT_MAX_DEPTH,
            parallel: false,
        }
    }

    /// Limit subdivision depth; leaves at this depth become buckets.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    /// Evaluate per-body accelerations on the rayon pool during
    /// [`QuadTree::update_velocities`].
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &QuadNode {
        &self.nodes[id]
    }

    pub fn region(&self) -> Aabb {
        self.nodes[self.root].region
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Number of bodies currently tracked.
    pub fn len(&self) -> usize {
        self.nodes[self.root].count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_mass(&self) -> f64 {
        self.nodes[self.root].mass
    }

    pub fn center_of_mass(&self) -> NVec2 {
        self.nodes[self.root].com
    }

    /// Slots in the arena, live or free.
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    // insertion ==========================================================================

    /// Insert body `id` of `bodies` into the tree.
    ///
    /// Returns `false` (and changes nothing) if the body lies outside the
    /// root region. Out-of-region inserts are not an error.
    ///
    /// # Parameters
    /// - `id`    : Index of the body in `bodies`.
    /// - `bodies`: The body store the tree indexes into.
    pub fn insert(&mut self, id: BodyId, bodies: &[Body]) -> bool {
        self.insert_at(self.root, id, bodies)
    }

    /// Insert below `node_id`, splitting occupied leaves on the way.
    ///
    /// - region does not contain the body: reject
    /// - empty leaf: the body becomes the sole occupant
    /// - occupied leaf at `max_depth`: append to the bucket
    /// - occupied leaf: split, then broadcast the new body to the children
    /// - internal node: broadcast to the children
    ///
    /// On acceptance the node's count, mass and COM are updated as a running
    /// mass-weighted average.
    fn insert_at(&mut self, node_id: NodeId, id: BodyId, bodies: &[Body]) -> bool {
        let body = &bodies[id];
        let node = &self.nodes[node_id];
        if !node.region.contains(&body.position) {
            return false;
        }

        let children = node.children;
        let occupied = !node.bodies.is_empty();
        let at_max_depth = node.depth >= self.max_depth;

        match children {
            None if !occupied => {
                let node = &mut self.nodes[node_id];
                node.bodies.push(id);
                node.mass = body.mass;
                node.com = body.position;
                node.count = 1;
                return true;
            }
            None if at_max_depth => {
                log::debug!("node {node_id} at max depth {}: bucketing body {id}", self.max_depth);
                self.nodes[node_id].bodies.push(id);
            }
            None => {
                let children = self.split(node_id, bodies);
                self.broadcast_insert(children, id, bodies);
            }
            Some(children) => {
                self.broadcast_insert(children, id, bodies);
            }
        }

        self.nodes[node_id].absorb(&body.position, body.mass);
        true
    }

    /// Broadcast-insert, single-acceptance.
    ///
    /// The body is offered to all four children and each child checks
    /// containment on entry. Because quadrants are half-open and share
    /// their midlines, exactly one child accepts a body that the parent
    /// contains. Dispatching straight to one child is only equivalent if it
    /// reproduces that same containment test.
    fn broadcast_insert(&mut self, children: [NodeId; 4], id: BodyId, bodies: &[Body]) -> usize {
        let accepted: usize = children
            .into_iter()
            .map(|child| usize::from(self.insert_at(child, id, bodies)))
            .sum();
        debug_assert_eq!(accepted, 1, "body {id} accepted by {accepted} quadrants");
        accepted
    }

    /// Turn an occupied leaf into an internal node.
    ///
    /// Four children are allocated over the partitioned region and the
    /// previous occupant is broadcast into them. The node's own body slot is
    /// cleared; its aggregate stays as it was since the subtree still holds
    /// the same body.
    fn split(&mut self, node_id: NodeId, bodies: &[Body]) -> [NodeId; 4] {
        let region = self.nodes[node_id].region;
        let depth = self.nodes[node_id].depth + 1;

        let children = region.partition().map(|quad| self.alloc_node(quad, depth));
        let occupants = std::mem::take(&mut self.nodes[node_id].bodies);
        self.nodes[node_id].children = Some(children);

        for occupant in occupants {
            self.broadcast_insert(children, occupant, bodies);
        }
        children
    }

    fn alloc_node(&mut self, region: Aabb, depth: usize) -> NodeId {
        let node = QuadNode::empty(region, depth);
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = node;
                id
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    // velocity update (read phase) =======================================================

    /// Kick every tracked body: `velocity += dt * acceleration`.
    ///
    /// Accelerations are evaluated against frozen positions first and applied
    /// afterwards, so the result does not depend on visiting order. Tree
    /// topology is left untouched.
    ///
    /// # Parameters
    /// - `bodies`: Body store; only `velocity` is written.
    /// - `dt`    : Time step.
    /// - `theta` : Opening threshold. `0` evaluates every pair exactly.
    pub fn update_velocities(&self, bodies: &mut [Body], dt: f64, theta: f64) {
        for (id, acc) in self.accelerations(bodies, theta) {
            bodies[id].velocity += acc * dt;
        }
    }

    /// Acceleration on every tracked body, in flat-list order.
    pub fn accelerations(&self, bodies: &[Body], theta: f64) -> Vec<(BodyId, NVec2)> {
        let held = self.to_flat_list();
        if self.parallel {
            held.par_iter()
                .map(|&id| (id, self.acceleration_on(id, bodies, theta)))
                .collect()
        } else {
            held.iter()
                .map(|&id| (id, self.acceleration_on(id, bodies, theta)))
                .collect()
        }
    }

    /// Approximate acceleration on body `id`, starting from the root.
    pub fn acceleration_on(&self, id: BodyId, bodies: &[Body], theta: f64) -> NVec2 {
        let mut acc = NVec2::zeros();
        let pos = bodies[id].position;
        self.accumulate(self.root, id, &pos, bodies, theta * theta, &mut acc);
        acc
    }

    /// Recursively accumulate the acceleration on `target` from `node_id`.
    ///
    /// - **Empty node**: no contribution.
    /// - **Leaf**: exact pairwise contribution of every held body except the
    ///   target itself.
    /// - **Internal node**: if `width² / dist² < theta²` the whole subtree acts
    ///   as one mass at its COM, otherwise descend into all four children.
    ///   `dist²` is clamped to [`MIN_DIST_SQ`].
    fn accumulate(
        &self,
        node_id: NodeId,
        target: BodyId,
        pos: &NVec2,
        bodies: &[Body],
        theta_sq: f64,
        acc: &mut NVec2,
    ) {
        let node = &self.nodes[node_id];
        if node.count == 0 {
            return;
        }

        match node.children {
            None => {
                for &other in node.bodies.iter().filter(|&&other| other != target) {
                    let b = &bodies[other];
                    *acc += pairwise_acceleration(pos, &b.position, b.mass);
                }
            }
            Some(children) => {
                let dist_sq = (node.com - pos).norm_squared().max(MIN_DIST_SQ);
                let width = node.region.width();
                if width * width / dist_sq < theta_sq {
                    *acc += pairwise_acceleration(pos, &node.com, node.mass);
                } else {
                    for child in children {
                        self.accumulate(child, target, pos, bodies, theta_sq, acc);
                    }
                }
            }
        }
    }

    // position update (write phase) ======================================================

    /// Drift every tracked body and repartition the tree.
    ///
    /// Returns the bodies that left the root region. They are no longer
    /// tracked; what happens to them is up to the caller.
    pub fn update_positions(&mut self, bodies: &mut [Body], dt: f64) -> Vec<BodyId> {
        let escaped = self.update_positions_at(self.root, bodies, dt);
        if !escaped.is_empty() {
            log::debug!("{} bodies left the root region", escaped.len());
        }
        escaped
    }

    /// One simulation tick: velocity update, then position update.
    pub fn tick(&mut self, bodies: &mut [Body], dt: f64, theta: f64) -> Vec<BodyId> {
        self.update_velocities(bodies, dt, theta);
        self.update_positions(bodies, dt)
    }

    /// Drift the subtree at `node_id` and return bodies that left its region.
    ///
    /// Leaves integrate their own bodies and hand back the ones that left.
    /// Internal nodes first process all four children, re-insert escapees
    /// that they still contain, recompute their aggregate from the children
    /// and merge back into a leaf once `count <= 1`. Re-insertion happens only
    /// after every child has drifted, so no body is integrated twice.
    fn update_positions_at(&mut self, node_id: NodeId, bodies: &mut [Body], dt: f64) -> Vec<BodyId> {
        let children = self.nodes[node_id].children;
        let Some(children) = children else {
            return self.drift_leaf(node_id, bodies, dt);
        };

        let mut escaped = Vec::new();
        for child in children {
            escaped.extend(self.update_positions_at(child, bodies, dt));
        }

        let region = self.nodes[node_id].region;
        let frozen: &[Body] = bodies;
        escaped.retain(|&id| {
            if region.contains(&frozen[id].position) {
                self.broadcast_insert(children, id, frozen);
                false
            } else {
                true
            }
        });

        self.refresh_internal(node_id, children);
        if self.nodes[node_id].count <= 1 {
            self.merge(node_id, children, frozen);
        }
        escaped
    }

    fn drift_leaf(&mut self, node_id: NodeId, bodies: &mut [Body], dt: f64) -> Vec<BodyId> {
        let node = &mut self.nodes[node_id];
        if node.bodies.is_empty() {
            return Vec::new();
        }

        let region = node.region;
        let mut escaped = Vec::new();
        node.bodies.retain(|&id| {
            let body = &mut bodies[id];
            body.position += body.velocity * dt;
            let inside = region.contains(&body.position);
            if !inside {
                escaped.push(id);
            }
            inside
        });

        self.refresh_leaf(node_id, bodies);
        escaped
    }

    /// Recompute a leaf's count and aggregate from the bodies it holds.
    fn refresh_leaf(&mut self, node_id: NodeId, bodies: &[Body]) {
        let node = &mut self.nodes[node_id];
        node.count = node.bodies.len();
        match node.bodies.as_slice() {
            [only] => {
                node.mass = bodies[*only].mass;
                node.com = bodies[*only].position;
            }
            held => {
                let (mass, weighted) = held.iter().fold((0.0, NVec2::zeros()), |(m, w), &id| {
                    let b = &bodies[id];
                    (m + b.mass, w + b.position * b.mass)
                });
                node.set_aggregate(mass, weighted);
            }
        }
    }

    /// Recompute an internal node's count and aggregate from its children.
    fn refresh_internal(&mut self, node_id: NodeId, children: [NodeId; 4]) {
        let mut mass = 0.0;
        let mut weighted = NVec2::zeros();
        let mut count = 0;
        for child in children {
            let c = &self.nodes[child];
            mass += c.mass;
            weighted += c.com * c.mass;
            count += c.count;
        }

        let node = &mut self.nodes[node_id];
        node.count = count;
        node.set_aggregate(mass, weighted);
    }

    /// Collapse an internal node back into a leaf, pulling up whatever bodies
    /// remain below it and freeing every descendant.
    fn merge(&mut self, node_id: NodeId, children: [NodeId; 4], bodies: &[Body]) {
        let mut held = Vec::new();
        for child in children {
            self.release(child, &mut held);
        }

        let node = &mut self.nodes[node_id];
        node.children = None;
        node.bodies = held;
        self.refresh_leaf(node_id, bodies);
    }

    fn release(&mut self, node_id: NodeId, held: &mut Vec<BodyId>) {
        if let Some(children) = self.nodes[node_id].children.take() {
            for child in children {
                self.release(child, held);
            }
        }
        held.append(&mut self.nodes[node_id].bodies);
        self.free.push(node_id);
    }

    // linearization =====================================================================

    /// Lazily walk every tracked body in pre-order (NW, NE, SW, SE).
    pub fn iter(&self) -> BodyIter<'_> {
        BodyIter {
            tree: self,
            stack: vec![self.root],
            current: [].iter(),
        }
    }

    pub fn to_flat_list(&self) -> Vec<BodyId> {
        self.iter().collect()
    }

    /// Positions and masses of every tracked body, in flat-list order.
    pub fn snapshot(&self, bodies: &[Body]) -> Vec<BodySnapshot> {
        self.iter()
            .map(|id| BodySnapshot {
                id,
                position: bodies[id].position,
                mass: bodies[id].mass,
            })
            .collect()
    }

    /// Live nodes in pre-order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(children) = self.nodes[id].children {
                stack.extend(children.iter().rev());
            }
        }
        out
    }

    /// Bounds of every leaf, empty or not, in pre-order.
    pub fn region_geometry(&self) -> Vec<Aabb> {
        self.node_ids()
            .into_iter()
            .map(|id| &self.nodes[id])
            .filter(|node| node.is_leaf())
            .map(|node| node.region)
            .collect()
    }

    // diagnostics =======================================================================

    /// Check every structural invariant of the tree against `bodies`.
    ///
    /// Mass and COM are compared with a relative `tolerance`.
    pub fn validate(&self, bodies: &[Body], tolerance: f64) -> Result<(), TreeError> {
        self.validate_node(self.root, bodies, tolerance).map(|_| ())
    }

    fn validate_node(&self, node_id: NodeId, bodies: &[Body], tolerance: f64) -> Result<Vec<BodyId>, TreeError> {
        let node = &self.nodes[node_id];
        let malformed = TreeError::MalformedNode { node: node_id, count: node.count };

        let held = match node.children {
            None => {
                if node.bodies.len() > 1 && node.depth < self.max_depth {
                    return Err(malformed);
                }
                node.bodies.clone()
            }
            Some(children) => {
                if node.count <= 1 || !node.bodies.is_empty() {
                    return Err(malformed);
                }
                let mut held = Vec::with_capacity(node.count);
                for child in children {
                    held.extend(self.validate_node(child, bodies, tolerance)?);
                }
                held
            }
        };

        if held.len() != node.count {
            return Err(TreeError::CountMismatch { node: node_id, count: node.count, found: held.len() });
        }

        if let Some(&body) = held.iter().find(|&&id| !node.region.contains(&bodies[id].position)) {
            return Err(TreeError::BodyOutsideRegion { node: node_id, body });
        }

        let expected: f64 = held.iter().map(|&id| bodies[id].mass).sum();
        if (node.mass - expected).abs() > tolerance * expected.abs().max(1.0) {
            return Err(TreeError::MassMismatch { node: node_id, mass: node.mass, expected });
        }

        if expected.abs() >= f64::EPSILON {
            let weighted = held
                .iter()
                .fold(NVec2::zeros(), |acc, &id| acc + bodies[id].position * bodies[id].mass);
            let com = weighted / expected;
            let error = (node.com - com).norm();
            if error > tolerance * com.norm().max(1.0) {
                return Err(TreeError::CenterOfMassMismatch { node: node_id, error });
            }
        }

        Ok(held)
    }
}

/// Pre-order iterator over tracked bodies, see [`QuadTree::iter`].
pub struct BodyIter<'a> {
    tree: &'a QuadTree,
    stack: Vec<NodeId>,
    current: std::slice::Iter<'a, BodyId>,
}

impl Iterator for BodyIter<'_> {
    type Item = BodyId;

    fn next(&mut self) -> Option<BodyId> {
        loop {
            if let Some(&id) = self.current.next() {
                return Some(id);
            }
            let tree = self.tree;
            let node = &tree.nodes[self.stack.pop()?];
            if node.count == 0 {
                continue;
            }
            match node.children {
                // reversed so NW is visited first
                Some(children) => self.stack.extend(children.iter().rev()),
                None => self.current = node.bodies.iter(),
            }
        }
    }
}
