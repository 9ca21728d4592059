use thiserror::Error;

/// Errors shared by tree construction, the simulation driver, and the
/// position store. All of them are fatal to the running simulation.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("cannot build an octree from zero particles")]
    EmptyInput,

    #[error("{what} {id} out of range (limit {limit})")]
    IdOutOfRange {
        what: &'static str,
        id: usize,
        limit: usize,
    },

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {parameter} = {value}")]
    InvalidConfig { parameter: &'static str, value: f64 },
}
