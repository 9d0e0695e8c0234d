//! Inverse-square acceleration kernel and the direct O(n²) reference sum.
//!
//! The force law has unit coupling: a source of mass `m` at squared distance
//! `d²` pulls with magnitude `m / d²`. The quad tree and the direct sum share
//! [`pairwise_acceleration`] so their results agree exactly when every
//! interaction is evaluated pairwise (`theta = 0`).

use crate::simulation::states::{NVec2, System};

/// Lower bound on the squared separation used in the force law.
pub const MIN_DIST_SQ: f64 = 1.0e-6;

/// Acceleration on a target at `target` due to a point mass at `source`.
///
/// A zero displacement has no direction and contributes nothing.
pub fn pairwise_acceleration(target: &NVec2, source: &NVec2, source_mass: f64) -> NVec2 {
    let r = source - target;
    let dist_sq = r.norm_squared().max(MIN_DIST_SQ);
    match r.try_normalize(0.0) {
        Some(dir) => dir * (source_mass / dist_sq),
        None => NVec2::zeros(),
    }
}

/// Direct summation over every ordered pair `(i, j)`, `i != j`.
/// - `out[i]` is overwritten with the acceleration on body `i`
pub fn direct_accelerations(sys: &System, out: &mut [NVec2]) {
    // Zero buffer
    for a in out.iter_mut() {
        *a = NVec2::zeros();
    }

    for (i, bi) in sys.bodies.iter().enumerate() {
        for (j, bj) in sys.bodies.iter().enumerate() {
            if i == j {
                continue;
            }
            out[i] += pairwise_acceleration(&bi.position, &bj.position, bj.mass);
        }
    }
}
