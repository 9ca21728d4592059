use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rand::{rngs::StdRng, SeedableRng};

use octograv::particle_creator::{self, ParticleLimits};
use octograv::{simulate, Octree, PositionStore, SimulationConfig, TreeConfig};

fn tree_construction(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0);
    let particles = particle_creator::generate(100_000, &ParticleLimits::default(), &mut rng);

    let mut group = c.benchmark_group("octree construction");
    for n in [1_000usize, 10_000, 100_000] {
        let population = &particles[..n];

        group.bench_with_input(BenchmarkId::new("serial", n), &n, |b, _| {
            b.iter(|| {
                Octree::build(
                    population,
                    &TreeConfig {
                        parallel: false,
                        max_points_per_node: 1,
                        ..TreeConfig::default()
                    },
                )
                .unwrap()
            })
        });

        group.bench_with_input(BenchmarkId::new("parallel", n), &n, |b, _| {
            b.iter(|| {
                Octree::build(
                    population,
                    &TreeConfig {
                        parallel: true,
                        max_points_per_node: 1,
                        ..TreeConfig::default()
                    },
                )
                .unwrap()
            })
        });
    }
    group.finish();
}

fn short_simulation(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(1);

    c.bench_function("simulate 2000 particles over 5 steps", |b| {
        b.iter_batched_ref(
            || particle_creator::generate(2_000, &ParticleLimits::default(), &mut rng),
            |particles| {
                let config = SimulationConfig {
                    dt: 0.1,
                    simulation_length: 0.5,
                    ..SimulationConfig::default()
                };
                let mut store =
                    PositionStore::new(particles.len(), config.dt, config.iterations());
                simulate(particles, &config, &mut store).unwrap();
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, tree_construction, short_simulation);
criterion_main!(benches);
