use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

use crate::error::StepError;

/// A trait for types that can be used as scalars in the pendulum model.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Converts an `f64` constant into the scalar type. Unrepresentable values become NaN.
pub(crate) fn lit<T: Scalar>(value: f64) -> T {
    T::from_f64(value).unwrap_or_else(T::nan)
}

/// An autonomous or time-dependent flow dy/dt = f(t, y).
pub trait DynamicalSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field.
    /// t: current time
    /// y: current (possibly trial) state
    /// out: buffer to write dy/dt
    fn apply(&self, t: T, y: &[T], out: &mut [T]);
}

/// A flow that also knows its Jacobian, needed by implicit steppers.
pub trait JacobianSystem<T: Scalar>: DynamicalSystem<T> {
    /// Writes ∂f/∂y in row-major order into `dfdy` (dimension²) and ∂f/∂t into `dfdt`.
    fn jacobian(&self, t: T, y: &[T], dfdy: &mut [T], dfdt: &mut [T]);
}

/// A trait for solvers that can step a system forward by one step of size `h`.
pub trait Steppable<T: Scalar> {
    /// Order used by the step-size controller.
    fn order(&self) -> u32;

    /// Advances `y` from `t` to `t + h` in place and writes the local error estimate into `yerr`.
    /// On error `y` must be left as it was on entry.
    fn step<S: JacobianSystem<T>>(
        &mut self,
        system: &S,
        t: T,
        y: &mut [T],
        h: T,
        yerr: &mut [T],
    ) -> Result<(), StepError>;

    /// Drops any accumulated history (multistep methods).
    fn reset(&mut self) {}

    /// Forgets the last successful `step`, which the caller has thrown away.
    fn reject(&mut self) {
        self.reset();
    }
}
