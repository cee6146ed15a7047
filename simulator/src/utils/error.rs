use spsim_common::CommonError;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ParameterError {
    #[error("Invalid number of dimensions (expected 1 or 2, got {0})")]
    InvalidNumDimensions(usize),

    #[error("{name} must be a positive integer, got {value}")]
    NonPositiveCount { name: &'static str, value: usize },

    #[error("{name} must be positive and finite, got {value}")]
    NonPositiveSize { name: &'static str, value: f64 },

    #[error("{name} must be finite, got {value}")]
    NonFinite { name: &'static str, value: f64 },

    #[error("{name} has {got} entries but the grid has {expected} dimensions")]
    MismatchedLength {
        name: &'static str,
        expected: usize,
        got: usize,
    },
}

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("No initial condition was set before integrating")]
    MissingInitialCondition,

    #[error("Field has spatial shape {got:?} but the integrator was built for {expected:?}")]
    MismatchedMesh {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("All {time_steps} time steps have already been computed")]
    TimeSeriesComplete { time_steps: usize },

    #[error("Invalid parameters: {err}")]
    InvalidParameters {
        #[from]
        err: ParameterError,
    },

    #[error("Error in common: {err}")]
    TomlReadError {
        #[from]
        err: CommonError,
    },
}
