//! Runge-Kutta-Fehlberg 4(5).

use crate::error::StepError;
use crate::traits::{JacobianSystem, Scalar, Steppable};

use super::{embedded_step, Tableau};

const RKF45: Tableau = Tableau {
    c: &[0.0, 1.0 / 4.0, 3.0 / 8.0, 12.0 / 13.0, 1.0, 1.0 / 2.0],
    a: &[
        &[],
        &[1.0 / 4.0],
        &[3.0 / 32.0, 9.0 / 32.0],
        &[1932.0 / 2197.0, -7200.0 / 2197.0, 7296.0 / 2197.0],
        &[439.0 / 216.0, -8.0, 3680.0 / 513.0, -845.0 / 4104.0],
        &[-8.0 / 27.0, 2.0, -3544.0 / 2565.0, 1859.0 / 4104.0, -11.0 / 40.0],
    ],
    // 5th order weights
    b: &[
        16.0 / 135.0,
        0.0,
        6656.0 / 12825.0,
        28561.0 / 56430.0,
        -9.0 / 50.0,
        2.0 / 55.0,
    ],
    // 5th minus 4th order weights
    e: &[
        1.0 / 360.0,
        0.0,
        -128.0 / 4275.0,
        -2197.0 / 75240.0,
        1.0 / 50.0,
        2.0 / 55.0,
    ],
};

/// Fehlberg's six stage embedded pair. Propagates the 5th order solution.
pub struct Rkf45<T: Scalar> {
    k: Vec<Vec<T>>,
    tmp: Vec<T>,
}

impl<T: Scalar> Rkf45<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            k: vec![vec![T::zero(); dim]; RKF45.stages()],
            tmp: vec![T::zero(); dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for Rkf45<T> {
    fn order(&self) -> u32 {
        5
    }

    fn step<S: JacobianSystem<T>>(
        &mut self,
        system: &S,
        t: T,
        y: &mut [T],
        h: T,
        yerr: &mut [T],
    ) -> Result<(), StepError> {
        embedded_step(&RKF45, system, t, y, h, &mut self.k, &mut self.tmp, yerr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tableau_is_consistent() {
        for (stage, row) in RKF45.a.iter().enumerate() {
            let sum: f64 = row.iter().sum();
            assert!((sum - RKF45.c[stage]).abs() < 1e-14, "row {stage}");
        }
        assert!((RKF45.b.iter().sum::<f64>() - 1.0).abs() < 1e-14);
        assert!(RKF45.e.iter().sum::<f64>().abs() < 1e-14);
    }
}
