//! Axis-aligned rectangular regions used to partition space.

use serde::{Deserialize, Serialize};

use crate::simulation::states::NVec2;

/// Axis-aligned bounding box with `top > bottom` and `right > left`.
///
/// Containment is half-open: the left and bottom edges belong to the box, the
/// right and top edges do not. Together with [`Aabb::partition`] this puts
/// every contained point in exactly one quadrant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Aabb {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }

    pub fn center(&self) -> NVec2 {
        NVec2::new(
            self.left + self.width() * 0.5,
            self.bottom + self.height() * 0.5,
        )
    }

    /// `true` if the extents are finite and strictly positive.
    pub fn is_valid(&self) -> bool {
        [self.left, self.top, self.right, self.bottom]
            .iter()
            .all(|v| v.is_finite())
            && self.right > self.left
            && self.top > self.bottom
    }

    pub fn contains(&self, p: &NVec2) -> bool {
        p.x >= self.left && p.x < self.right && p.y >= self.bottom && p.y < self.top
    }

    /// Split into four equal quadrants, ordered NW, NE, SW, SE.
    ///
    /// The quadrants reuse this box's own edges and share the two midlines,
    /// so no point falls into a gap between siblings.
    pub fn partition(&self) -> [Aabb; 4] {
        let mid_x = self.left + self.width() * 0.5;
        let mid_y = self.bottom + self.height() * 0.5;
        [
            Aabb::new(self.left, self.top, mid_x, mid_y),     // NW
            Aabb::new(mid_x, self.top, self.right, mid_y),    // NE
            Aabb::new(self.left, mid_y, mid_x, self.bottom),  // SW
            Aabb::new(mid_x, mid_y, self.right, self.bottom), // SE
        ]
    }

    /// Index of the quadrant of [`Aabb::partition`] holding `p`, if any.
    pub fn quadrant_of(&self, p: &NVec2) -> Option<usize> {
        self.partition().iter().position(|q| q.contains(p))
    }
}
