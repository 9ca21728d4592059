use nalgebra::Vector3;
use rayon::prelude::*;

use crate::particle::Particle;

/// Advance every particle by one velocity-Verlet (kick-drift-kick) step.
///
/// Positions move under the previous acceleration, the new acceleration is
/// taken from the accumulated force, and velocities are kicked with the
/// average of the two. The accumulated force is zeroed afterwards.
pub fn step(particles: &mut [Particle], dt: f64, parallel: bool) {
    let advance = |particle: &mut Particle| {
        particle.position += particle.velocity * dt + particle.acceleration * (0.5 * dt * dt);

        let acceleration = particle.force / particle.mass;
        particle.velocity += (particle.acceleration + acceleration) * (0.5 * dt);
        particle.acceleration = acceleration;
        particle.force = Vector3::zeros();
    };

    if parallel {
        particles.par_iter_mut().for_each(advance);
    } else {
        particles.iter_mut().for_each(advance);
    }
}
