//! Parallel Barnes-Hut gravitational N-body simulation.
//!
//! Each step rebuilds an octree over the particle set, reduces it bottom-up
//! into per-node centers of mass, walks the tree to approximate the force
//! on every particle, and advances the system with a velocity-Verlet step.
//! Positions of every iteration are kept in a [`PositionStore`] and can be
//! dumped as a binary playback file.
//!
//! # Example
//! ```rust
//! use nalgebra::Vector3;
//! use octograv::{simulate, Particle, PositionStore, SimulationConfig};
//!
//! let mut particles = vec![
//!     Particle::new(0, 5e10, Vector3::new(-1.0, 0.0, 0.0), Vector3::zeros()),
//!     Particle::new(1, 5e10, Vector3::new(1.0, 0.0, 0.0), Vector3::zeros()),
//! ];
//!
//! let config = SimulationConfig {
//!     dt: 0.1,
//!     simulation_length: 1.0,
//!     ..SimulationConfig::default()
//! };
//! let mut store = PositionStore::new(particles.len(), config.dt, config.iterations());
//!
//! simulate(&mut particles, &config, &mut store).unwrap();
//! ```

pub mod bounds;
pub mod config;
pub mod error;
pub mod forces;
pub mod gravity;
pub mod integrator;
pub mod octree;
pub mod particle;
pub mod particle_creator;
pub mod profiler;
pub mod storage;

pub use config::SimulationConfig;
pub use error::SimError;
pub use octree::{Octree, TreeConfig};
pub use particle::{Particle, PointMass};
pub use storage::PositionStore;

use rayon::prelude::*;

use profiler::{Profiler, Section};

/// Run the full simulation: `iterations()` steps of
/// build -> reduce -> evaluate -> integrate, emitting one position frame
/// per step into `store`.
///
/// Any failure aborts the run; there is no per-step recovery.
pub fn simulate(
    particles: &mut [Particle],
    config: &SimulationConfig,
    store: &mut PositionStore,
) -> Result<(), SimError> {
    config.validate()?;
    if particles.is_empty() {
        return Err(SimError::EmptyInput);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.worker_count)
        .build()
        .map_err(|_| SimError::InvalidConfig {
            parameter: "worker_count",
            value: config.worker_count as f64,
        })?;

    pool.install(|| run(particles, config, store))
}

fn run(
    particles: &mut [Particle],
    config: &SimulationConfig,
    store: &mut PositionStore,
) -> Result<(), SimError> {
    let iterations = config.iterations();
    log::info!(
        "simulating {} particles over {} iterations (dt = {})",
        particles.len(),
        iterations,
        config.dt
    );

    for particle in particles.iter() {
        store.add_mass(particle.id, particle.mass)?;
    }
    store.fill_frame(0, particles)?;

    let tree_config = config.tree_config();
    let parameters = config.force_parameters();
    let mut profiler = Profiler::new();

    for iteration in 0..iterations {
        let forces = {
            let view: &[Particle] = particles;
            let tree =
                profiler.time(Section::BuildTree, || Octree::build(view, &tree_config))?;
            profiler.time(Section::Reduce, || forces::reduce(&tree));
            profiler.time(Section::Forces, || {
                forces::evaluate(&tree, &parameters, config.parallel)
            })
            // the tree is discarded here; particles outlive it
        };

        profiler.time(Section::Integrate, || {
            if config.parallel {
                particles
                    .par_iter_mut()
                    .zip(forces.par_iter())
                    .for_each(|(particle, force)| particle.force += force);
            } else {
                for (particle, force) in particles.iter_mut().zip(&forces) {
                    particle.force += force;
                }
            }
            integrator::step(particles, config.dt, config.parallel);
        });

        profiler.time(Section::Store, || store.fill_frame(iteration + 1, particles))?;
        profiler.finish_iteration();
    }

    if config.profile {
        log::info!("profile over {iterations} iterations:\n{profiler}");
    }

    Ok(())
}
