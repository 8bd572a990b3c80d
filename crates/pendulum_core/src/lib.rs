//! The `pendulum_core` crate is the numerical engine behind the pendulum demonstrator.
//! It advances a rod-and-bob pendulum in step with the wall clock so the rendered motion
//! matches what a physical pendulum released at the same moment would do.
//!
//! Key components:
//! - **Traits**: `Scalar`, `DynamicalSystem`/`JacobianSystem` (right-hand sides), `Steppable` (steppers).
//! - **Model / Params**: equation of motion and the derivation of inertia and gravity torque from raw inputs.
//! - **Solvers**: RK4, RKF45, RK8PD and an implicit Adams method, plus standard step-size control.
//! - **Driver / Clock**: solver lifecycle, frame targets and real-time drift detection.
//! - **Simulation**: the per-run control loop and the collaborator traits it drives.
pub mod analysis;
pub mod clock;
pub mod config;
pub mod driver;
pub mod error;
pub mod model;
pub mod params;
pub mod simulation;
pub mod solvers;
pub mod traits;

pub use config::{ConfigStore, PRESETS};
pub use driver::{DriverState, IntegratorDriver};
pub use error::{ConfigError, RunError, SolverError, StepError};
pub use params::PendulumConfiguration;
pub use simulation::{RunContext, RunSummary, Simulation};
