//! Periodic boundary conditions for hosts with a rectangular simulation cell.

use crate::types::{AtomPos, RVector};
use serde::{Deserialize, Serialize};

/// Simulation cell: either open boundaries or an orthorhombic periodic box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PeriodicCell {
    /// No periodicity; displacements are plain differences
    Open,
    /// Orthorhombic box with edge lengths `a`, `b`, `c` (host length units)
    Orthorhombic {
        /// Edge along x
        a: f64,
        /// Edge along y
        b: f64,
        /// Edge along z
        c: f64,
    },
}

impl Default for PeriodicCell {
    fn default() -> Self {
        PeriodicCell::Open
    }
}

impl PeriodicCell {
    /// Builds a periodic cell, falling back to open boundaries when any edge is
    /// not strictly positive.
    pub fn orthorhombic(a: f64, b: f64, c: f64) -> Self {
        if a > 0.0 && b > 0.0 && c > 0.0 {
            PeriodicCell::Orthorhombic { a, b, c }
        } else {
            PeriodicCell::Open
        }
    }

    /// Returns true for a periodic cell.
    pub fn is_periodic(&self) -> bool {
        matches!(self, PeriodicCell::Orthorhombic { .. })
    }

    /// Minimum-image version of the displacement `dv`.
    pub fn min_image(&self, dv: RVector) -> RVector {
        match *self {
            PeriodicCell::Open => dv,
            PeriodicCell::Orthorhombic { a, b, c } => RVector::new(
                dv.x - (dv.x / a).round() * a,
                dv.y - (dv.y / b).round() * b,
                dv.z - (dv.z / c).round() * c,
            ),
        }
    }

    /// Shortest displacement vector pointing from `pos1` to `pos2`.
    pub fn distance(&self, pos1: &AtomPos, pos2: &AtomPos) -> RVector {
        self.min_image(pos2 - pos1)
    }

    /// Periodic image of `pos` closest to `ref_pos`.
    pub fn closest_image(&self, pos: &AtomPos, ref_pos: &AtomPos) -> AtomPos {
        ref_pos + self.distance(ref_pos, pos)
    }

    /// Wraps `pos` into the primary cell `[0, a) x [0, b) x [0, c)`.
    pub fn wrap(&self, pos: &AtomPos) -> AtomPos {
        match *self {
            PeriodicCell::Open => *pos,
            PeriodicCell::Orthorhombic { a, b, c } => AtomPos::new(
                pos.x.rem_euclid(a),
                pos.y.rem_euclid(b),
                pos.z.rem_euclid(c),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: &RVector, b: &RVector) -> bool {
        (a - b).norm() < 1e-12
    }

    #[test]
    fn test_open_cell_is_plain_difference() {
        let cell = PeriodicCell::Open;
        let d = cell.distance(&AtomPos::new(0.0, 0.0, 0.0), &AtomPos::new(30.0, -4.0, 1.0));
        assert_eq!(d, RVector::new(30.0, -4.0, 1.0));
    }

    #[test]
    fn test_minimum_image_across_boundary() {
        let cell = PeriodicCell::orthorhombic(10.0, 10.0, 10.0);
        let d = cell.distance(&AtomPos::new(9.5, 0.0, 0.0), &AtomPos::new(0.5, 0.0, 0.0));
        assert!(close(&d, &RVector::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn test_closest_image_moves_next_to_reference() {
        let cell = PeriodicCell::orthorhombic(10.0, 20.0, 30.0);
        let img = cell.closest_image(&AtomPos::new(19.0, 1.0, -28.0), &AtomPos::new(1.0, 1.0, 1.0));
        assert!(close(&img, &AtomPos::new(-1.0, 1.0, 2.0)));
    }

    #[test]
    fn test_degenerate_edges_fall_back_to_open() {
        assert_eq!(PeriodicCell::orthorhombic(10.0, 0.0, 10.0), PeriodicCell::Open);
    }

    #[test]
    fn test_wrap_into_primary_cell() {
        let cell = PeriodicCell::orthorhombic(10.0, 10.0, 10.0);
        let w = cell.wrap(&AtomPos::new(-1.0, 12.0, 5.0));
        assert!(close(&w, &AtomPos::new(9.0, 2.0, 5.0)));
    }
}
