use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::Vector3;
use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::error::SimError;
use crate::particle::Particle;

/// Value ranges for randomly generated particle sets.
#[derive(Clone, Copy, Debug)]
pub struct ParticleLimits {
    pub position_min: Vector3<f64>,
    pub position_max: Vector3<f64>,
    pub mass: (f64, f64),
    pub velocity: (f64, f64),
    pub acceleration: (f64, f64),
}

impl Default for ParticleLimits {
    fn default() -> Self {
        Self {
            position_min: Vector3::repeat(-500.0),
            position_max: Vector3::repeat(500.0),
            mass: (40.0, 70.0),
            velocity: (10.0, 20.0),
            acceleration: (1.0, 10.0),
        }
    }
}

/// Draw `count` particles uniformly from `limits`, with dense ids `0..count`.
#[must_use]
pub fn generate<R: Rng>(count: usize, limits: &ParticleLimits, rng: &mut R) -> Vec<Particle> {
    let position: [Uniform<f64>; 3] = std::array::from_fn(|axis| {
        Uniform::new_inclusive(limits.position_min[axis], limits.position_max[axis])
    });
    let mass = Uniform::new_inclusive(limits.mass.0, limits.mass.1);
    let velocity = Uniform::new_inclusive(limits.velocity.0, limits.velocity.1);
    let acceleration = Uniform::new_inclusive(limits.acceleration.0, limits.acceleration.1);

    (0..count)
        .map(|id| {
            let mut particle = Particle::new(
                id,
                mass.sample(rng),
                Vector3::new(
                    position[0].sample(rng),
                    position[1].sample(rng),
                    position[2].sample(rng),
                ),
                Vector3::new(
                    velocity.sample(rng),
                    velocity.sample(rng),
                    velocity.sample(rng),
                ),
            );
            particle.acceleration = Vector3::new(
                acceleration.sample(rng),
                acceleration.sample(rng),
                acceleration.sample(rng),
            );
            particle
        })
        .collect()
}

fn malformed(message: String) -> SimError {
    SimError::Io(io::Error::new(io::ErrorKind::InvalidData, message))
}

fn tail<'l>(line: &'l str, prefix: &str) -> Result<&'l str, SimError> {
    line.trim()
        .strip_prefix(prefix)
        .map(str::trim)
        .ok_or_else(|| malformed(format!("expected `{prefix}`, got `{line}`")))
}

fn triple(text: &str) -> Result<Vector3<f64>, SimError> {
    let inner = text
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .ok_or_else(|| malformed(format!("expected a `(x, y, z)` triple, got `{text}`")))?;

    let mut components = inner.split(',');
    let mut next = || -> Result<f64, SimError> {
        components
            .next()
            .and_then(|c| c.trim().parse().ok())
            .ok_or_else(|| malformed(format!("malformed triple `{text}`")))
    };

    Ok(Vector3::new(next()?, next()?, next()?))
}

/// Read a particle configuration file.
///
/// The format is the one [`write_config`] emits: a header line followed by
/// five-line blocks of id, position, velocity, acceleration, and mass.
pub fn parse(path: impl AsRef<Path>) -> Result<Vec<Particle>, SimError> {
    let file = BufReader::new(File::open(path)?);
    let mut lines = file.lines();

    // header carries no particle data
    let _ = lines.next().transpose()?;

    let mut particles = Vec::new();
    loop {
        let Some(line) = lines.next().transpose()? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let id = tail(&line, "Particle ID:")?
            .parse()
            .map_err(|_| malformed(format!("malformed particle id in `{line}`")))?;

        let mut block = |prefix: &str| -> Result<String, SimError> {
            lines
                .next()
                .transpose()?
                .ok_or_else(|| malformed(format!("truncated particle block, missing `{prefix}`")))
        };

        let position = triple(tail(&block("Position:")?, "Position:")?)?;
        let velocity = triple(tail(&block("Velocity:")?, "Velocity:")?)?;
        let acceleration = triple(tail(&block("Acceleration:")?, "Acceleration:")?)?;
        let mass = tail(&block("Mass:")?, "Mass:")?
            .parse()
            .map_err(|_| malformed("malformed particle mass".into()))?;

        let mut particle = Particle::new(id, mass, position, velocity);
        particle.acceleration = acceleration;
        particles.push(particle);
    }

    Ok(particles)
}

/// Write `particles` in the configuration file format understood by
/// [`parse`].
pub fn write_config(path: impl AsRef<Path>, particles: &[Particle]) -> Result<(), SimError> {
    let mut file = BufWriter::new(File::create(path)?);

    writeln!(file, "Particle System with {} particles:", particles.len())?;
    for p in particles {
        writeln!(file, "Particle ID: {}", p.id)?;
        writeln!(
            file,
            "Position: ({}, {}, {})",
            p.position.x, p.position.y, p.position.z
        )?;
        writeln!(
            file,
            "Velocity: ({}, {}, {})",
            p.velocity.x, p.velocity.y, p.velocity.z
        )?;
        writeln!(
            file,
            "Acceleration: ({}, {}, {})",
            p.acceleration.x, p.acceleration.y, p.acceleration.z
        )?;
        writeln!(file, "Mass: {}", p.mass)?;
    }
    file.flush()?;

    Ok(())
}
