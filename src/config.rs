use std::thread;

use crate::error::SimError;
use crate::forces::ForceParameters;
use crate::gravity;
use crate::octree::{TreeConfig, DEFAULT_BULK_PARTITION_THRESHOLD};

/// Everything the driver needs for one run.
#[derive(Clone, Debug)]
pub struct SimulationConfig {
    /// Integration step in seconds.
    pub dt: f64,
    /// Simulated length in seconds; the iteration count is
    /// `floor(simulation_length / dt)`.
    pub simulation_length: f64,
    /// Opening angle of the Barnes-Hut acceptance criterion.
    pub theta: f64,
    /// Softening added to pairwise distances in the force kernel.
    pub softening: f64,
    pub gravitational_constant: f64,
    /// Leaf capacity of the simulation tree.
    pub max_points_per_node: usize,
    /// Populations at or below this are inserted serially during the
    /// parallel build.
    pub bulk_partition_threshold: usize,
    pub parallel: bool,
    pub worker_count: usize,
    /// Log per-section timing averages after the run.
    pub profile: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            dt: 1.0,
            simulation_length: 1.0,
            theta: 0.5,
            softening: 1e-8,
            gravitational_constant: gravity::G,
            max_points_per_node: 1,
            bulk_partition_threshold: DEFAULT_BULK_PARTITION_THRESHOLD,
            parallel: true,
            worker_count: thread::available_parallelism().map_or(1, |n| n.get()),
            profile: false,
        }
    }
}

impl SimulationConfig {
    /// Number of integration steps of this run.
    #[must_use]
    pub fn iterations(&self) -> usize {
        (self.simulation_length / self.dt) as usize
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if !(self.dt > 0.0) {
            return Err(SimError::InvalidConfig {
                parameter: "dt",
                value: self.dt,
            });
        }
        if !(self.simulation_length > 0.0) {
            return Err(SimError::InvalidConfig {
                parameter: "simulation_length",
                value: self.simulation_length,
            });
        }
        if !(self.theta > 0.0) {
            return Err(SimError::InvalidConfig {
                parameter: "theta",
                value: self.theta,
            });
        }
        if self.worker_count < 1 {
            return Err(SimError::InvalidConfig {
                parameter: "worker_count",
                value: self.worker_count as f64,
            });
        }
        Ok(())
    }

    pub(crate) fn tree_config(&self) -> TreeConfig {
        TreeConfig {
            parallel: self.parallel,
            max_points_per_node: self.max_points_per_node,
            bulk_partition_threshold: self.bulk_partition_threshold,
        }
    }

    pub(crate) fn force_parameters(&self) -> ForceParameters {
        ForceParameters {
            theta: self.theta,
            softening: self.softening,
            gravitational_constant: self.gravitational_constant,
        }
    }
}
