pub mod adams;
pub mod rk8pd;
pub mod rkf45;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, StepError};
use crate::traits::{lit, DynamicalSystem, JacobianSystem, Scalar, Steppable};

pub use adams::MsAdams;
pub use rk8pd::Rk8pd;
pub use rkf45::Rkf45;

/// The fixed set of steppers a configuration may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepperKind {
    /// Classical explicit Runge-Kutta 4.
    Rk4,
    /// Embedded Runge-Kutta-Fehlberg 4(5).
    Rkf45,
    /// Embedded Prince-Dormand 8(7).
    Rk8pd,
    /// Implicit Adams multistep.
    MsAdams,
}

impl StepperKind {
    pub const ALL: [StepperKind; 4] = [
        StepperKind::Rk4,
        StepperKind::Rkf45,
        StepperKind::Rk8pd,
        StepperKind::MsAdams,
    ];

    /// The name used in configuration documents.
    pub fn name(self) -> &'static str {
        match self {
            StepperKind::Rk4 => "rk4",
            StepperKind::Rkf45 => "rkf45",
            StepperKind::Rk8pd => "rk8pd",
            StepperKind::MsAdams => "adams",
        }
    }

    /// Whether the stepper evaluates the Jacobian.
    pub fn is_implicit(self) -> bool {
        matches!(self, StepperKind::MsAdams)
    }

    pub fn build(self, dim: usize) -> Stepper {
        match self {
            StepperKind::Rk4 => Stepper::Rk4(Rk4::new(dim)),
            StepperKind::Rkf45 => Stepper::Rkf45(Rkf45::new(dim)),
            StepperKind::Rk8pd => Stepper::Rk8pd(Rk8pd::new(dim)),
            StepperKind::MsAdams => Stepper::MsAdams(MsAdams::new(dim)),
        }
    }
}

impl FromStr for StepperKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepperKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| ConfigError::UnknownStepper(s.to_string()))
    }
}

impl fmt::Display for StepperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A stepper instance selected at run time.
pub enum Stepper {
    Rk4(Rk4<f64>),
    Rkf45(Rkf45<f64>),
    Rk8pd(Rk8pd<f64>),
    MsAdams(MsAdams),
}

impl Stepper {
    pub fn kind(&self) -> StepperKind {
        match self {
            Stepper::Rk4(_) => StepperKind::Rk4,
            Stepper::Rkf45(_) => StepperKind::Rkf45,
            Stepper::Rk8pd(_) => StepperKind::Rk8pd,
            Stepper::MsAdams(_) => StepperKind::MsAdams,
        }
    }
}

impl Steppable<f64> for Stepper {
    fn order(&self) -> u32 {
        match self {
            Stepper::Rk4(s) => s.order(),
            Stepper::Rkf45(s) => s.order(),
            Stepper::Rk8pd(s) => s.order(),
            Stepper::MsAdams(s) => s.order(),
        }
    }

    fn step<S: JacobianSystem<f64>>(
        &mut self,
        system: &S,
        t: f64,
        y: &mut [f64],
        h: f64,
        yerr: &mut [f64],
    ) -> Result<(), StepError> {
        match self {
            Stepper::Rk4(s) => s.step(system, t, y, h, yerr),
            Stepper::Rkf45(s) => s.step(system, t, y, h, yerr),
            Stepper::Rk8pd(s) => s.step(system, t, y, h, yerr),
            Stepper::MsAdams(s) => s.step(system, t, y, h, yerr),
        }
    }

    fn reset(&mut self) {
        match self {
            Stepper::Rk4(s) => s.reset(),
            Stepper::Rkf45(s) => s.reset(),
            Stepper::Rk8pd(s) => s.reset(),
            Stepper::MsAdams(s) => s.reset(),
        }
    }

    fn reject(&mut self) {
        match self {
            Stepper::Rk4(s) => s.reject(),
            Stepper::Rkf45(s) => s.reject(),
            Stepper::Rk8pd(s) => s.reject(),
            Stepper::MsAdams(s) => s.reject(),
        }
    }
}

/// Outcome of the step-size controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Adjustment {
    /// Error too large: reject the step and retry with the given size.
    Decrease(f64),
    /// Error comfortably small: accept and grow to the given size.
    Increase(f64),
    Keep,
}

/// Standard error control on the state: D_i = eps_abs + eps_rel·|y_i|.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepControl {
    pub eps_abs: f64,
    pub eps_rel: f64,
}

impl StepControl {
    const SAFETY: f64 = 0.9;
    const MIN_FACTOR: f64 = 0.2;
    const MAX_FACTOR: f64 = 5.0;

    pub fn new(eps_abs: f64, eps_rel: f64) -> Self {
        Self { eps_abs, eps_rel }
    }

    /// Largest ratio of the local error to the allowed error over all components.
    pub fn error_ratio(&self, y: &[f64], yerr: &[f64]) -> f64 {
        y.iter()
            .zip(yerr)
            .map(|(yi, ei)| ei.abs() / (self.eps_abs + self.eps_rel * yi.abs()))
            .fold(0.0, f64::max)
    }

    /// Proposes the next step size for a method of the given order.
    pub fn adjust(&self, order: u32, y: &[f64], yerr: &[f64], h: f64) -> Adjustment {
        let ratio = self.error_ratio(y, yerr);
        let q = order as f64;

        if ratio > 1.1 {
            let factor = (Self::SAFETY * ratio.powf(-1.0 / q)).max(Self::MIN_FACTOR);
            Adjustment::Decrease(h * factor)
        } else if ratio < 0.5 {
            let factor = (Self::SAFETY * ratio.powf(-1.0 / (q + 1.0))).clamp(1.0, Self::MAX_FACTOR);
            Adjustment::Increase(h * factor)
        } else {
            Adjustment::Keep
        }
    }
}

/// Butcher tableau of an explicit embedded pair. `b` propagates, `e` holds the
/// difference between the propagating and the embedded weights.
pub(crate) struct Tableau {
    pub c: &'static [f64],
    pub a: &'static [&'static [f64]],
    pub b: &'static [f64],
    pub e: &'static [f64],
}

impl Tableau {
    pub(crate) fn stages(&self) -> usize {
        self.c.len()
    }
}

/// Performs one step of an explicit embedded pair. `y` is only overwritten when the
/// result is finite.
#[allow(clippy::too_many_arguments)]
pub(crate) fn embedded_step<T: Scalar, S: DynamicalSystem<T>>(
    tableau: &Tableau,
    system: &S,
    t: T,
    y: &mut [T],
    h: T,
    k: &mut [Vec<T>],
    tmp: &mut [T],
    yerr: &mut [T],
) -> Result<(), StepError> {
    let n = y.len();

    for stage in 0..tableau.stages() {
        for i in 0..n {
            let mut acc = T::zero();
            for (j, &a) in tableau.a[stage].iter().enumerate() {
                if a != 0.0 {
                    acc = acc + lit::<T>(a) * k[j][i];
                }
            }
            tmp[i] = y[i] + h * acc;
        }
        system.apply(t + lit::<T>(tableau.c[stage]) * h, tmp, &mut k[stage]);
    }

    for i in 0..n {
        let mut acc = T::zero();
        let mut err = T::zero();
        for stage in 0..tableau.stages() {
            acc = acc + lit::<T>(tableau.b[stage]) * k[stage][i];
            err = err + lit::<T>(tableau.e[stage]) * k[stage][i];
        }
        tmp[i] = y[i] + h * acc;
        yerr[i] = h * err;
    }

    if tmp.iter().any(|v| !v.is_finite()) {
        return Err(StepError::NonFinite);
    }
    y.copy_from_slice(tmp);
    Ok(())
}

/// Classic Runge-Kutta 4th Order Solver.
/// The error estimate comes from step doubling: the returned state is the result of two
/// half steps, the error is their difference to one full step divided by 15.
pub struct Rk4<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    tmp: Vec<T>,
    y0: Vec<T>,
    onestep: Vec<T>,
}

impl<T: Scalar> Rk4<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::zero();
        Self {
            k1: vec![z; dim],
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            tmp: vec![z; dim],
            y0: vec![z; dim],
            onestep: vec![z; dim],
        }
    }

    fn advance<S: DynamicalSystem<T>>(&mut self, system: &S, t0: T, y: &mut [T], h: T) {
        let half: T = lit(0.5);
        let sixth: T = lit(1.0 / 6.0);
        let two: T = lit(2.0);

        // k1 = f(t, y)
        system.apply(t0, y, &mut self.k1);

        // k2 = f(t + h/2, y + h*k1/2)
        for i in 0..y.len() {
            self.tmp[i] = y[i] + h * self.k1[i] * half;
        }
        system.apply(t0 + h * half, &self.tmp, &mut self.k2);

        // k3 = f(t + h/2, y + h*k2/2)
        for i in 0..y.len() {
            self.tmp[i] = y[i] + h * self.k2[i] * half;
        }
        system.apply(t0 + h * half, &self.tmp, &mut self.k3);

        // k4 = f(t + h, y + h*k3)
        for i in 0..y.len() {
            self.tmp[i] = y[i] + h * self.k3[i];
        }
        system.apply(t0 + h, &self.tmp, &mut self.k4);

        // y_next = y + h/6 * (k1 + 2k2 + 2k3 + k4)
        for i in 0..y.len() {
            y[i] = y[i] + h * sixth * (self.k1[i] + two * self.k2[i] + two * self.k3[i] + self.k4[i]);
        }
    }
}

impl<T: Scalar> Steppable<T> for Rk4<T> {
    fn order(&self) -> u32 {
        4
    }

    fn step<S: JacobianSystem<T>>(
        &mut self,
        system: &S,
        t: T,
        y: &mut [T],
        h: T,
        yerr: &mut [T],
    ) -> Result<(), StepError> {
        let half: T = lit(0.5);
        let fifteen: T = lit(15.0);

        self.y0.copy_from_slice(y);
        let mut onestep = std::mem::take(&mut self.onestep);
        onestep.copy_from_slice(y);
        self.advance(system, t, &mut onestep, h);

        self.advance(system, t, y, h * half);
        self.advance(system, t + h * half, y, h * half);

        for i in 0..y.len() {
            yerr[i] = (y[i] - onestep[i]) / fifteen;
        }
        self.onestep = onestep;

        if y.iter().any(|v| !v.is_finite()) {
            y.copy_from_slice(&self.y0);
            return Err(StepError::NonFinite);
        }
        Ok(())
    }
}
