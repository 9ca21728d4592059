use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use octograv::{particle_creator, simulate, PositionStore, SimulationConfig};

/// Barnes-Hut gravitational N-body simulator.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Integration time step in seconds
    #[arg(short = 't')]
    dt: f64,

    /// Simulated length in seconds; the iteration count is length / dt
    #[arg(short = 'l')]
    length: f64,

    /// Particle configuration file
    #[arg(short = 'i', long = "in")]
    input: PathBuf,

    /// Output name; positions are dumped to `<name>.bin`
    #[arg(short = 'o', long = "out")]
    output: String,

    /// Log per-section timing averages
    #[arg(short = 'p', long)]
    profile: bool,

    /// Build the tree and evaluate forces on a single thread
    #[arg(long)]
    serial: bool,

    /// Worker thread count; defaults to the available parallelism
    #[arg(short = 'j', long)]
    workers: Option<usize>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = SimulationConfig {
        dt: args.dt,
        simulation_length: args.length,
        parallel: !args.serial,
        profile: args.profile,
        ..SimulationConfig::default()
    };
    if let Some(workers) = args.workers {
        config.worker_count = workers;
    }

    let mut particles = particle_creator::parse(&args.input)
        .with_context(|| format!("reading particles from {}", args.input.display()))?;

    let mut store = PositionStore::new(particles.len(), config.dt, config.iterations());
    simulate(&mut particles, &config, &mut store)?;

    let output = format!("{}.bin", args.output);
    store
        .write_binary(&output)
        .with_context(|| format!("writing {output}"))?;
    log::info!("wrote {output}");

    Ok(())
}
