use std::path::PathBuf;

use thiserror::Error;

use crate::driver::DriverState;

/// Failure of a single stepper invocation. The adaptive driver treats these as a signal
/// to halve the step and retry.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum StepError {
    #[error("Newton iteration did not converge after {iterations} iterations")]
    NewtonDiverged { iterations: usize },
    #[error("iteration matrix is singular")]
    SingularMatrix,
    #[error("stepper produced a non-finite state")]
    NonFinite,
}

/// Errors raised while loading or deriving a configuration. None of them touch the
/// previously active configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("parameter `{field}` is NaN")]
    NotANumber { field: &'static str },
    #[error("parameter `{field}` is an empty string")]
    EmptyField { field: &'static str },
    #[error("unknown stepper `{0}` (expected one of rk4, rkf45, rk8pd, adams)")]
    UnknownStepper(String),
    #[error("parameter `{field}` is invalid: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
    #[error("derived quantity `{quantity}` is not finite and positive")]
    NonFiniteDerived { quantity: &'static str },
}

/// The driver's local result type: allocation failures are fatal to the run attempt,
/// step failures end the current run only.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error("solver allocation failed: {0}")]
    Allocation(String),
    #[error("step failed at t = {t}: {reason}")]
    StepFailed { t: f64, reason: String },
    #[error("cannot {operation} while the driver is {state:?}")]
    InvalidState {
        state: DriverState,
        operation: &'static str,
    },
}

impl SolverError {
    /// Allocation and setup failures happen before the first step.
    pub fn is_allocation(&self) -> bool {
        matches!(self, SolverError::Allocation(_))
    }
}

/// Errors ending a call to `Simulation::setup_and_run`.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("magnet: {0}")]
    Hardware(String),
    #[error("renderer: {0}")]
    Render(String),
    #[error(transparent)]
    Solver(#[from] SolverError),
}
