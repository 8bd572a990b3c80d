//! Solver lifecycle and the advance of the `[θ, ω]` state to frame targets.

use log::{debug, Level};

use crate::error::{SolverError, StepError};
use crate::model::PendulumSystem;
use crate::params::{PendulumConfiguration, SolverConfig};
use crate::simulation::StatusSink;
use crate::solvers::{Adjustment, StepControl, Stepper};
use crate::traits::Steppable;

/// Upper bound on internal steps for a single adaptive advance.
pub const MAX_INTERNAL_STEPS: u64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Uninitialized,
    Ready,
    Stepping,
    Terminated,
    /// Absorbing until `terminate`.
    Faulted,
}

/// The live solver instance, present exactly between `init` and `terminate`.
struct Solver {
    system: PendulumSystem,
    stepper: Stepper,
    control: StepControl,
    settings: SolverConfig,
    /// Nominal step size carried across advances.
    h: f64,
    yerr: [f64; 2],
}

impl Solver {
    fn allocate(conf: &PendulumConfiguration) -> Result<Self, SolverError> {
        let settings = *conf.solver();

        if !(settings.initial_step.is_finite() && settings.initial_step > 0.0) {
            return Err(SolverError::Allocation(format!(
                "initial step must be positive, got {}",
                settings.initial_step
            )));
        }
        if !(settings.abs_err >= 0.0 && settings.rel_err >= 0.0) {
            return Err(SolverError::Allocation(format!(
                "tolerances must not be negative (abserr {}, relerr {})",
                settings.abs_err, settings.rel_err
            )));
        }
        if settings.adaptive && settings.abs_err == 0.0 && settings.rel_err == 0.0 {
            return Err(SolverError::Allocation(
                "adaptive stepping needs a nonzero tolerance".to_string(),
            ));
        }
        if !(settings.max_step > 0.0) {
            return Err(SolverError::Allocation(format!(
                "failed to set max step {}",
                settings.max_step
            )));
        }

        let system = conf.system();
        Ok(Self {
            stepper: settings.stepper.build(2),
            control: StepControl::new(settings.abs_err, settings.rel_err),
            h: settings.initial_step.min(settings.max_step),
            yerr: [0.0; 2],
            system,
            settings,
        })
    }

    fn min_step(t: f64) -> f64 {
        f64::EPSILON * t.abs().max(1.0)
    }

    /// Error-controlled integration from `*t` to `t1`. The last step is truncated to land on
    /// `t1` exactly and does not change the nominal step size.
    fn apply(&mut self, t: &mut f64, t1: f64, y: &mut [f64; 2]) -> Result<(), SolverError> {
        let mut steps = 0_u64;

        while *t < t1 {
            steps += 1;
            if steps > MAX_INTERNAL_STEPS {
                return Err(SolverError::StepFailed {
                    t: *t,
                    reason: format!("more than {MAX_INTERNAL_STEPS} internal steps"),
                });
            }

            let remaining = t1 - *t;
            let final_step = self.h >= remaining;
            let h = if final_step { remaining } else { self.h };
            if !final_step && h < Self::min_step(*t) {
                return Err(SolverError::StepFailed {
                    t: *t,
                    reason: format!("step size collapsed to {h:e}"),
                });
            }

            let mut trial = *y;
            if let Err(err) = self
                .stepper
                .step(&self.system, *t, &mut trial, h, &mut self.yerr)
            {
                self.stepper.reset();
                self.h = h * 0.5;
                if self.h < Self::min_step(*t) {
                    return Err(SolverError::StepFailed {
                        t: *t,
                        reason: err.to_string(),
                    });
                }
                continue;
            }

            match self
                .control
                .adjust(self.stepper.order(), &trial, &self.yerr, h)
            {
                Adjustment::Decrease(h_new) => {
                    self.stepper.reject();
                    self.h = h_new;
                    continue;
                }
                Adjustment::Increase(h_new) if !final_step => {
                    self.h = h_new.min(self.settings.max_step);
                }
                _ => {}
            }

            *y = trial;
            *t = if final_step { t1 } else { *t + h };
        }

        Ok(())
    }

    /// Exactly `substeps` equal steps without error control. Ends on `t1` exactly.
    fn apply_fixed(&mut self, t: &mut f64, t1: f64, y: &mut [f64; 2]) -> Result<(), SolverError> {
        let n = self.settings.substeps;
        let t0 = *t;
        let h = (t1 - t0) / n as f64;
        if h == 0.0 {
            return Ok(());
        }

        for i in 1..=n {
            self.stepper
                .step(&self.system, *t, y, h, &mut self.yerr)
                .map_err(|err: StepError| SolverError::StepFailed {
                    t: *t,
                    reason: err.to_string(),
                })?;
            *t = if i == n { t1 } else { t0 + i as f64 * h };
        }
        Ok(())
    }
}

/// Owns the single solver instance of a run and the state vector it advances.
pub struct IntegratorDriver {
    state: DriverState,
    solver: Option<Solver>,
    t: f64,
    y: [f64; 2],
}

impl Default for IntegratorDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl IntegratorDriver {
    pub fn new() -> Self {
        Self {
            state: DriverState::Uninitialized,
            solver: None,
            t: 0.0,
            y: [0.0; 2],
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Current simulation time.
    pub fn time(&self) -> f64 {
        self.t
    }

    /// Current `[θ, ω]`.
    pub fn y(&self) -> [f64; 2] {
        self.y
    }

    /// Allocates the solver for `conf` and seeds `(angle, 0)` at `t = 0`.
    pub fn init(
        &mut self,
        conf: &PendulumConfiguration,
        sink: &mut dyn StatusSink,
    ) -> Result<(), SolverError> {
        if !matches!(
            self.state,
            DriverState::Uninitialized | DriverState::Terminated
        ) {
            return Err(SolverError::InvalidState {
                state: self.state,
                operation: "initialize",
            });
        }

        match Solver::allocate(conf) {
            Ok(solver) => {
                debug!(
                    "solver ready: {} ({}), h0 = {}, hmax = {}",
                    solver.settings.stepper,
                    if solver.settings.adaptive {
                        "adaptive"
                    } else {
                        "fixed"
                    },
                    solver.h,
                    solver.settings.max_step
                );
                self.solver = Some(solver);
                self.y = [conf.angle(), 0.0];
                self.t = 0.0;
                self.state = DriverState::Ready;
                Ok(())
            }
            Err(err) => {
                sink.report(Level::Error, &format!("solver initialization failed: {err}"));
                self.state = DriverState::Faulted;
                Err(err)
            }
        }
    }

    /// Advances to `target` and writes the new angle into `conf`. On failure neither the
    /// driver's state vector nor `conf` change and the driver is `Faulted`.
    pub fn advance(
        &mut self,
        conf: &mut PendulumConfiguration,
        target: f64,
        sink: &mut dyn StatusSink,
    ) -> Result<(), SolverError> {
        let state = self.state;
        let solver = match (&mut self.solver, state) {
            (Some(solver), DriverState::Ready | DriverState::Stepping) => solver,
            _ => {
                return Err(SolverError::InvalidState {
                    state,
                    operation: "advance",
                })
            }
        };

        if target < self.t {
            return Err(SolverError::StepFailed {
                t: self.t,
                reason: format!("target {target} lies in the past"),
            });
        }

        let mut t = self.t;
        let mut y = self.y;
        let result = if solver.settings.adaptive {
            solver.apply(&mut t, target, &mut y)
        } else {
            solver.apply_fixed(&mut t, target, &mut y)
        };

        match result {
            Ok(()) => {
                self.t = t;
                self.y = y;
                conf.set_angle(y[0]);
                self.state = DriverState::Stepping;
                Ok(())
            }
            Err(err) => {
                debug!("integration to t = {target} failed");
                sink.report(Level::Error, &format!("step failed: {err}"));
                self.state = DriverState::Faulted;
                Err(err)
            }
        }
    }

    /// Resets and releases the solver. Always succeeds; problems are only reported.
    pub fn terminate(&mut self, sink: &mut dyn StatusSink) {
        match self.solver.take() {
            Some(mut solver) => {
                solver.stepper.reset();
                debug!(
                    "solver {} released at t = {}",
                    solver.settings.stepper, self.t
                );
            }
            None => sink.report(Level::Warn, "solver not reset correctly: no live instance"),
        }
        self.state = DriverState::Terminated;
    }
}
