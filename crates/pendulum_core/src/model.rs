//! Equation of motion of the rod-and-bob pendulum.
//!
//! The state vector is `[θ, ω]`. Both variants share the bearing friction model
//! `-ω·c_lin - copysign(ω²·c_quad + c_const, ω)` and differ only in the gravity torque:
//! `-sin(θ)·G` (nonlinear) or `-θ·G` (linear, small angle).

use serde::{Deserialize, Serialize};

use crate::traits::{lit, DynamicalSystem, JacobianSystem, Scalar};

/// Bearing friction coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Friction {
    pub constant: f64,
    pub linear: f64,
    pub quadratic: f64,
}

impl Friction {
    pub const NONE: Friction = Friction {
        constant: 0.0,
        linear: 0.0,
        quadratic: 0.0,
    };

    /// Friction torque at angular velocity `omega`. The sign follows `copysign`, so at
    /// `+0.0` the static term acts in the negative direction with magnitude `constant`.
    pub fn torque<T: Scalar>(&self, omega: T) -> T {
        let c_const: T = lit(self.constant);
        let c_lin: T = lit(self.linear);
        let c_quad: T = lit(self.quadratic);
        -omega * c_lin - (omega * omega * c_quad + c_const).copysign(omega)
    }
}

/// Quantities the right-hand side closes over, resolved once per configuration load.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    /// Combined moment of inertia about the pivot.
    pub moment_of_inertia: f64,
    /// Combined gravitational torque coefficient G.
    pub gravity_torque: f64,
    pub friction: Friction,
}

/// Selects the right-hand side and Jacobian pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    Linear,
    Nonlinear,
}

impl ModelVariant {
    pub fn from_linear_flag(linear: bool) -> Self {
        if linear {
            ModelVariant::Linear
        } else {
            ModelVariant::Nonlinear
        }
    }

    /// Restoring function g(θ) in the gravity torque `-g(θ)·G`.
    fn restoring<T: Scalar>(self, theta: T) -> T {
        match self {
            ModelVariant::Linear => theta,
            ModelVariant::Nonlinear => theta.sin(),
        }
    }

    /// dg/dθ.
    fn restoring_slope<T: Scalar>(self, theta: T) -> T {
        match self {
            ModelVariant::Linear => T::one(),
            ModelVariant::Nonlinear => theta.cos(),
        }
    }

    /// Writes `[dθ/dt, dω/dt]` for the state `y = [θ, ω]`.
    pub fn derivative<T: Scalar>(self, params: &ModelParameters, y: &[T], dydt: &mut [T]) {
        let gravity: T = lit(params.gravity_torque);
        let inertia: T = lit(params.moment_of_inertia);

        let torque_gravity = -self.restoring(y[0]) * gravity;
        let torque_friction = params.friction.torque(y[1]);

        dydt[0] = y[1];
        dydt[1] = (torque_gravity + torque_friction) / inertia;
    }

    /// Writes the row-major 2x2 Jacobian ∂f/∂y into `dfdy` and the zero time partials into `dfdt`.
    pub fn jacobian<T: Scalar>(
        self,
        params: &ModelParameters,
        y: &[T],
        dfdy: &mut [T],
        dfdt: &mut [T],
    ) {
        let gravity: T = lit(params.gravity_torque);
        let inertia: T = lit(params.moment_of_inertia);
        let c_lin: T = lit(params.friction.linear);
        let c_quad: T = lit(params.friction.quadratic);
        let two: T = lit(2.0);

        dfdy[0] = T::zero();
        dfdy[1] = T::one();
        dfdy[2] = -self.restoring_slope(y[0]) * gravity / inertia;
        dfdy[3] = (-c_lin + two * c_quad * y[1]) / inertia;
        dfdt[0] = T::zero();
        dfdt[1] = T::zero();
    }
}

/// The pendulum as a `DynamicalSystem`, borrowing nothing so it can be rebuilt cheaply per advance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendulumSystem {
    pub variant: ModelVariant,
    pub params: ModelParameters,
}

impl PendulumSystem {
    pub fn new(variant: ModelVariant, params: ModelParameters) -> Self {
        Self { variant, params }
    }
}

impl<T: Scalar> DynamicalSystem<T> for PendulumSystem {
    fn dimension(&self) -> usize {
        2
    }

    fn apply(&self, _t: T, y: &[T], out: &mut [T]) {
        self.variant.derivative(&self.params, y, out);
    }
}

impl<T: Scalar> JacobianSystem<T> for PendulumSystem {
    fn jacobian(&self, _t: T, y: &[T], dfdy: &mut [T], dfdt: &mut [T]) {
        self.variant.jacobian(&self.params, y, dfdy, dfdt);
    }
}
