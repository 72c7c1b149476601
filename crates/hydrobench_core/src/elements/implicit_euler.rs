use super::root_finder::RootFinder;
use crate::error::SolveError;

/// Implicit Euler update for a single store.
///
/// Solves `S1 - S0 - dt * q(S1) = 0` for the end-of-step storage `S1`, where
/// `q` is the signed sum of the store's fluxes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImplicitEuler<R> {
    pub root_finder: R,
}

impl<R: RootFinder> ImplicitEuler<R> {
    pub fn new(root_finder: R) -> Self {
        Self { root_finder }
    }

    /// Advances `storage` by one step. The search starts on
    /// `[min(0, S0), S0 + max(inflow, 0) * dt]`.
    pub fn step(
        &self,
        storage: f64,
        inflow: f64,
        dt: f64,
        net_flux: impl Fn(f64) -> f64,
    ) -> Result<f64, SolveError> {
        let lower = storage.min(0.0);
        let upper = storage + inflow.max(0.0) * dt;
        self.root_finder
            .solve(|s| s - storage - dt * net_flux(s), lower, upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::Pegasus;
    use approx::assert_relative_eq;

    #[test]
    fn linear_reservoir_matches_closed_form() {
        // dS/dt = P - k S  =>  S1 = (S0 + dt P) / (1 + dt k)
        let euler = ImplicitEuler::new(Pegasus::default());
        let (s0, p, k, dt) = (10.0, 4.0, 0.3, 1.0);
        let s1 = euler
            .step(s0, p, dt, |s| p - k * s)
            .expect("step should succeed");
        assert_relative_eq!(s1, (s0 + dt * p) / (1.0 + dt * k), epsilon = 1e-7);
    }

    #[test]
    fn empty_store_without_inflow_stays_empty() {
        let euler = ImplicitEuler::new(Pegasus::default());
        let s1 = euler.step(0.0, 0.0, 1.0, |s| -0.5 * s).expect("step should succeed");
        assert_eq!(s1, 0.0);
    }

    #[test]
    fn nonlinear_drainage_stays_within_bracket() {
        let euler = ImplicitEuler::new(Pegasus::default());
        let s1 = euler
            .step(20.0, 5.0, 1.0, |s| 5.0 - 0.01 * s * s)
            .expect("step should succeed");
        assert!(s1 > 0.0 && s1 < 25.0);
        assert_relative_eq!(s1 - 20.0 - (5.0 - 0.01 * s1 * s1), 0.0, epsilon = 1e-7);
    }
}
