use nalgebra::Vector3;
use rayon::prelude::*;

use crate::{error::SimError, particle::Particle};

/// Axis-aligned cube described by its center and half of its side length.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub center: Vector3<f64>,
    pub half_side: f64,
}

impl BoundingBox {
    #[must_use]
    pub fn new(center: Vector3<f64>, half_side: f64) -> Self {
        Self { center, half_side }
    }

    /// Full side length, the `s` of the opening criterion.
    #[must_use]
    pub fn side(&self) -> f64 {
        2.0 * self.half_side
    }

    #[must_use]
    pub fn contains(&self, p: &Vector3<f64>) -> bool {
        (p.x - self.center.x).abs() <= self.half_side
            && (p.y - self.center.y).abs() <= self.half_side
            && (p.z - self.center.z).abs() <= self.half_side
    }

    /// Octant of `p` relative to the box center.
    ///
    /// The upper hemisphere (z >= center) holds octants 0..=3, the lower
    /// one 4..=7. Within a hemisphere the (x, y) signs map as
    /// (+,+) -> +0, (-,+) -> +1, (-,-) -> +2, (+,-) -> +3. Points exactly
    /// on a split plane count as positive.
    #[must_use]
    pub fn octant_of(&self, p: &Vector3<f64>) -> usize {
        let mut id = if p.z >= self.center.z { 0 } else { 4 };

        if p.x >= self.center.x {
            id += if p.y >= self.center.y { 0 } else { 3 };
        } else {
            id += if p.y >= self.center.y { 1 } else { 2 };
        }

        id
    }

    /// Sub-box of octant `i`; the inverse of [`Self::octant_of`].
    #[must_use]
    pub fn child(&self, i: usize) -> BoundingBox {
        let half = self.half_side / 2.0;
        let mut center = self.center;

        center.x += if matches!(i, 0 | 3 | 4 | 7) { half } else { -half };
        center.y += if matches!(i, 0 | 1 | 4 | 5) { half } else { -half };
        center.z += if i < 4 { half } else { -half };

        BoundingBox {
            center,
            half_side: half,
        }
    }
}

type Extent = (Vector3<f64>, Vector3<f64>);

fn empty_extent() -> Extent {
    (
        Vector3::repeat(f64::INFINITY),
        Vector3::repeat(f64::NEG_INFINITY),
    )
}

fn merge(a: Extent, b: Extent) -> Extent {
    (a.0.inf(&b.0), a.1.sup(&b.1))
}

/// Smallest padded cube enclosing every particle position.
///
/// The side is the largest per-axis extent and the cube is cornered at the
/// per-axis minima. Padding of `max(1e-9, 0.0005 * side)` keeps input
/// particles off the faces of the root box.
pub fn compute_bounding_box(
    particles: &[Particle],
    parallel: bool,
) -> Result<BoundingBox, SimError> {
    if particles.is_empty() {
        return Err(SimError::EmptyInput);
    }

    let (min, max) = if parallel {
        particles
            .par_iter()
            .fold(empty_extent, |acc, p| merge(acc, (p.position, p.position)))
            .reduce(empty_extent, merge)
    } else {
        particles
            .iter()
            .fold(empty_extent(), |acc, p| merge(acc, (p.position, p.position)))
    };

    let side = (max - min).max();
    let half = side / 2.0;

    Ok(BoundingBox {
        center: min.add_scalar(half),
        half_side: half + (0.0005 * side).max(1e-9),
    })
}
