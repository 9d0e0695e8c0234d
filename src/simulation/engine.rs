//! High-level runtime engine settings
//!
//! Selects the Barnes–Hut opening threshold, tree depth limit, whether the
//! velocity pass runs on the rayon pool, and what happens to bodies that
//! leave the root region

use crate::configuration::config::EscapePolicy;

#[derive(Debug, Clone)]
pub struct Engine {
    pub theta: f64, // parameter to determine if use center of mass
    pub max_depth: usize, // subdivision limit before leaves become buckets
    pub parallel: bool, // false = sequential velocity pass, true = rayon
    pub escape_policy: EscapePolicy, // drop, wrap or reflect
}
