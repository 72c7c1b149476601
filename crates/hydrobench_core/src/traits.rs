use num_traits::{Float, FromPrimitive, ToPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars in the hydrological model.
/// Must support basic arithmetic, debug printing, and conversion to and from f64.
/// Implemented by `f64` and by `Dual` so the same model code yields values and
/// parameter sensitivities.
pub trait Scalar: Float + FromPrimitive + ToPrimitive + Debug + 'static {
    /// Lifts a plain constant into the scalar type.
    fn cst(value: f64) -> Self {
        Self::from_f64(value).unwrap_or_else(Self::nan)
    }

    /// The real part, dropping any derivative information.
    fn real(self) -> f64 {
        self.to_f64().unwrap_or(f64::NAN)
    }
}

impl<T: Float + FromPrimitive + ToPrimitive + Debug + 'static> Scalar for T {}

/// Represents a continuous-time system dx/dt = f(t, x).
pub trait DynamicalSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field.
    /// t: current time
    /// x: current state
    /// out: buffer to write dx/dt
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}

/// A trait for solvers that can step a system forward.
pub trait Steppable<T: Scalar> {
    /// Performs one step of size dt.
    /// t: current time (updated after step)
    /// state: current state (updated after step)
    /// dt: step size
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T);

    /// Number of right-hand side evaluations one call to `step` performs.
    fn stages(&self) -> usize;
}

/// A Runge-Kutta pair that produces a candidate step together with an
/// estimate of its local truncation error.
pub trait EmbeddedStepper<T: Scalar> {
    /// Order of the embedded error estimate; the controller exponent is
    /// derived from it.
    fn error_order(&self) -> usize;

    /// Number of right-hand side evaluations per trial step.
    fn stages(&self) -> usize;

    /// Attempts a step of size dt from (t, state) without mutating `state`.
    /// y_new: candidate state at t + dt
    /// error: local error estimate, same length as state
    fn trial_step(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t: T,
        state: &[T],
        dt: T,
        y_new: &mut [T],
        error: &mut [T],
    );
}
