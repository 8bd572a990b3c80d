use anyhow::{bail, Result};
use nalgebra::DMatrix;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::model::ModelVariant;
use crate::params::PendulumConfiguration;

/// Kinetic plus potential energy of the configured pendulum (friction ignored).
/// The potential is `G·(1 - cos θ)` for the nonlinear model and `G·θ²/2` for the linear
/// one, so each model conserves its own energy when undamped.
pub fn mechanical_energy(conf: &PendulumConfiguration, theta: f64, omega: f64) -> f64 {
    let model = conf.model();
    let kinetic = 0.5 * model.moment_of_inertia * omega * omega;
    let potential = match conf.variant() {
        ModelVariant::Nonlinear => model.gravity_torque * (1.0 - theta.cos()),
        ModelVariant::Linear => 0.5 * model.gravity_torque * theta * theta,
    };
    kinetic + potential
}

/// Small-oscillation behaviour around the resting state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Linearization {
    /// Row-major Jacobian at θ = ω = 0.
    pub jacobian: Vec<f64>,
    pub eigenvalues: Vec<Complex64>,
    /// √(G/I) in rad/s.
    pub natural_frequency: f64,
    pub period: f64,
}

pub fn linearize(conf: &PendulumConfiguration) -> Result<Linearization> {
    let natural_frequency = natural_frequency(conf)?;

    let mut jacobian = vec![0.0; 4];
    let mut dfdt = [0.0; 2];
    conf.variant()
        .jacobian(conf.model(), &[0.0, 0.0], &mut jacobian, &mut dfdt);

    let matrix = DMatrix::from_row_slice(2, 2, &jacobian);
    let eigenvalues = matrix.complex_eigenvalues().iter().copied().collect();

    Ok(Linearization {
        jacobian,
        eigenvalues,
        natural_frequency,
        period: std::f64::consts::TAU / natural_frequency,
    })
}

pub fn natural_frequency(conf: &PendulumConfiguration) -> Result<f64> {
    let model = conf.model();
    if model.gravity_torque <= 0.0 {
        bail!(
            "No restoring torque (G = {}), the pendulum does not oscillate.",
            model.gravity_torque
        );
    }
    Ok((model.gravity_torque / model.moment_of_inertia).sqrt())
}

/// θ₀·cos(ω_n t), the undamped small-angle approximation.
pub fn small_angle_solution(conf: &PendulumConfiguration, t: f64) -> Result<f64> {
    Ok(conf.initial_angle() * (natural_frequency(conf)? * t).cos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::tests::reference_raw;
    use approx::assert_relative_eq;

    #[test]
    fn energy_at_rest_is_zero() {
        let conf = PendulumConfiguration::derive(reference_raw()).unwrap();
        assert_eq!(mechanical_energy(&conf, 0.0, 0.0), 0.0);
        assert_relative_eq!(
            mechanical_energy(&conf, 0.0, 2.0),
            0.5 * 1.1275 * 4.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn undamped_eigenvalues_are_imaginary() {
        let conf = PendulumConfiguration::derive(reference_raw()).unwrap();
        let lin = linearize(&conf).unwrap();
        let omega_n = (10.791_f64 / 1.1275).sqrt();
        assert_relative_eq!(lin.natural_frequency, omega_n, epsilon = 1e-12);
        assert_relative_eq!(lin.period, std::f64::consts::TAU / omega_n, epsilon = 1e-12);
        assert_eq!(lin.eigenvalues.len(), 2);
        for lambda in &lin.eigenvalues {
            assert!(lambda.re.abs() < 1e-9);
            assert_relative_eq!(lambda.im.abs(), omega_n, epsilon = 1e-9);
        }
    }

    #[test]
    fn damping_moves_eigenvalues_left() {
        let mut raw = reference_raw();
        raw.bearing.friction_linear = 0.2;
        let conf = PendulumConfiguration::derive(raw).unwrap();
        let lin = linearize(&conf).unwrap();
        for lambda in &lin.eigenvalues {
            assert_relative_eq!(lambda.re, -0.1 / 1.1275, epsilon = 1e-9);
        }
    }

    #[test]
    fn zero_gravity_has_no_frequency() {
        let mut raw = reference_raw();
        raw.environment.gravity = 0.0;
        let conf = PendulumConfiguration::derive(raw).unwrap();
        let err = linearize(&conf).unwrap_err();
        assert!(err.to_string().contains("No restoring torque"));
    }
}
