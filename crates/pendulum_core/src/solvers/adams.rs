//! Implicit Adams multistep stepper.
//!
//! Fourth order Adams-Bashforth predictor and Adams-Moulton corrector, the corrector solved
//! with Newton's method on `(I - γJ)`. The coefficients are integrals of the Lagrange
//! interpolant through the stored right-hand side values at their actual times, so the
//! history stays usable when `h` changes between steps. While fewer than four points are
//! known the method bootstraps with RK4.

use std::collections::VecDeque;
use std::mem;

use nalgebra::{DMatrix, DVector};

use crate::error::StepError;
use crate::traits::{JacobianSystem, Steppable};

use super::Rk4;

const HISTORY: usize = 4;
const MAX_NEWTON_ITERATIONS: usize = 10;
const NEWTON_TOLERANCE: f64 = 1e-10;

/// A step shorter than this fraction of the last spacing replaces the newest point instead
/// of adding a nearly coincident one.
const MIN_SPACING: f64 = 1e-3;

/// Milne's estimate for the AB4/AM4 pair: (19/270)·(corrected - predicted).
const MILNE: f64 = 19.0 / 270.0;

/// Three-point Gauss-Legendre rule on [0, 1]. Exact for the cubic interpolants used here.
const GAUSS_NODES: [f64; 3] = [
    0.5 - 0.387_298_334_620_741_7,
    0.5,
    0.5 + 0.387_298_334_620_741_7,
];
const GAUSS_WEIGHTS: [f64; 3] = [5.0 / 18.0, 8.0 / 18.0, 5.0 / 18.0];

/// `∫₀¹ L_j(s) ds` for the Lagrange basis on `nodes`, all in units of the step size.
fn adams_weights(nodes: &[f64; 4]) -> [f64; 4] {
    let mut weights = [0.0; 4];
    for (j, weight) in weights.iter_mut().enumerate() {
        for (s, w) in GAUSS_NODES.iter().zip(GAUSS_WEIGHTS) {
            let basis = nodes
                .iter()
                .enumerate()
                .filter(|(k, _)| *k != j)
                .fold(1.0, |acc, (_, x)| acc * (s - x) / (nodes[j] - x));
            *weight += w * basis;
        }
    }
    weights
}

fn max_abs(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |m, x| m.max(x.abs()))
}

/// A right-hand side value and the time it was taken at.
struct Point {
    t: f64,
    f: Vec<f64>,
}

/// What the last successful step did to the history.
enum Pending {
    Nothing,
    Pushed,
    Replaced(Point),
}

pub struct MsAdams {
    dim: usize,
    /// Newest first. One point more than the formulas use, so a rejected step can be undone.
    history: VecDeque<Point>,
    pending: Pending,
    bootstrap: Rk4<f64>,
    predicted: Vec<f64>,
    corrected: Vec<f64>,
    f_trial: Vec<f64>,
    dfdy: Vec<f64>,
    dfdt: Vec<f64>,
    corrector_steps: u64,
}

impl MsAdams {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            history: VecDeque::with_capacity(HISTORY + 1),
            pending: Pending::Nothing,
            bootstrap: Rk4::new(dim),
            predicted: vec![0.0; dim],
            corrected: vec![0.0; dim],
            f_trial: vec![0.0; dim],
            dfdy: vec![0.0; dim * dim],
            dfdt: vec![0.0; dim],
            corrector_steps: 0,
        }
    }

    /// Number of past right-hand side values the next step can use.
    pub fn history_len(&self) -> usize {
        self.history.len().min(HISTORY)
    }

    /// Steps taken with the predictor-corrector pair rather than the RK4 bootstrap.
    pub fn corrector_steps(&self) -> u64 {
        self.corrector_steps
    }

    fn starts_at(&self, t: f64) -> bool {
        self.history
            .front()
            .map_or(true, |p| (p.t - t).abs() <= 1e-12 * t.abs().max(1.0))
    }

    fn record(&mut self, t: f64, f: Vec<f64>, h: f64) {
        let point = Point { t, f };
        let crowded = match (self.history.front(), self.history.get(1)) {
            (Some(newest), Some(previous)) => h < MIN_SPACING * (newest.t - previous.t),
            _ => false,
        };

        if crowded {
            if let Some(newest) = self.history.front_mut() {
                self.pending = Pending::Replaced(mem::replace(newest, point));
                return;
            }
        }
        self.history.push_front(point);
        self.history.truncate(HISTORY + 1);
        self.pending = Pending::Pushed;
    }

    fn evaluate<S: JacobianSystem<f64>>(&self, system: &S, t: f64, y: &[f64]) -> Vec<f64> {
        let mut f = vec![0.0; self.dim];
        system.apply(t, y, &mut f);
        f
    }

    /// Solves `z = y + γ f(t1, z) + known` for `z`, starting from `self.predicted`.
    fn correct<S: JacobianSystem<f64>>(
        &mut self,
        system: &S,
        t1: f64,
        y: &[f64],
        gamma: f64,
        known: &[f64],
    ) -> Result<(), StepError> {
        let n = self.dim;
        self.corrected.copy_from_slice(&self.predicted);

        for _ in 0..MAX_NEWTON_ITERATIONS {
            system.apply(t1, &self.corrected, &mut self.f_trial);
            system.jacobian(t1, &self.corrected, &mut self.dfdy, &mut self.dfdt);

            let residual = DVector::from_fn(n, |i, _| {
                -(self.corrected[i] - y[i] - gamma * self.f_trial[i] - known[i])
            });
            let iteration = DMatrix::from_fn(n, n, |r, c| {
                let identity = if r == c { 1.0 } else { 0.0 };
                identity - gamma * self.dfdy[r * n + c]
            });

            let delta = iteration
                .lu()
                .solve(&residual)
                .ok_or(StepError::SingularMatrix)?;

            for i in 0..n {
                self.corrected[i] += delta[i];
            }
            if self.corrected.iter().any(|v| !v.is_finite()) {
                return Err(StepError::NonFinite);
            }
            if delta.amax() <= NEWTON_TOLERANCE * (1.0 + max_abs(&self.corrected)) {
                return Ok(());
            }
        }

        Err(StepError::NewtonDiverged {
            iterations: MAX_NEWTON_ITERATIONS,
        })
    }
}

impl Steppable<f64> for MsAdams {
    fn order(&self) -> u32 {
        4
    }

    fn step<S: JacobianSystem<f64>>(
        &mut self,
        system: &S,
        t: f64,
        y: &mut [f64],
        h: f64,
        yerr: &mut [f64],
    ) -> Result<(), StepError> {
        self.pending = Pending::Nothing;
        if !self.starts_at(t) {
            self.history.clear();
        }
        if self.history.is_empty() {
            let f0 = self.evaluate(system, t, y);
            self.history.push_front(Point { t, f: f0 });
        }

        if self.history.len() < HISTORY {
            self.bootstrap.step(system, t, y, h, yerr)?;
            let f1 = self.evaluate(system, t + h, y);
            self.record(t + h, f1, h);
            return Ok(());
        }

        let mut nodes = [0.0; HISTORY];
        for (x, point) in nodes.iter_mut().zip(&self.history) {
            *x = (point.t - t) / h;
        }
        let predictor = adams_weights(&nodes);
        let corrector = adams_weights(&[1.0, nodes[0], nodes[1], nodes[2]]);

        let mut known = vec![0.0; self.dim];
        for i in 0..self.dim {
            let mut explicit = 0.0;
            let mut implicit = 0.0;
            for (j, point) in self.history.iter().take(HISTORY).enumerate() {
                explicit += predictor[j] * point.f[i];
                if j + 1 < HISTORY {
                    implicit += corrector[j + 1] * point.f[i];
                }
            }
            self.predicted[i] = y[i] + h * explicit;
            known[i] = h * implicit;
        }

        self.correct(system, t + h, y, h * corrector[0], &known)?;

        for i in 0..self.dim {
            yerr[i] = MILNE * (self.corrected[i] - self.predicted[i]);
        }
        y.copy_from_slice(&self.corrected);
        let f_new = self.evaluate(system, t + h, y);
        self.record(t + h, f_new, h);
        self.corrector_steps += 1;
        Ok(())
    }

    fn reset(&mut self) {
        self.history.clear();
        self.pending = Pending::Nothing;
    }

    fn reject(&mut self) {
        match mem::replace(&mut self.pending, Pending::Nothing) {
            Pending::Pushed => {
                self.history.pop_front();
            }
            Pending::Replaced(previous) => {
                if let Some(newest) = self.history.front_mut() {
                    *newest = previous;
                }
            }
            Pending::Nothing => {}
        }
    }
}
