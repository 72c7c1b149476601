//! Step-size control for embedded Runge-Kutta pairs.

use crate::traits::{DynamicalSystem, Scalar};
use serde::{Deserialize, Serialize};

/// PID step-size controller.
///
/// With `pcoeff = dcoeff = 0` and `icoeff = 1` this is the classic integral
/// controller `dt_next = safety * dt * err^(-1 / (q + 1))` where `q` is the
/// order of the embedded error estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PidController {
    pub rtol: f64,
    pub atol: f64,
    pub pcoeff: f64,
    pub icoeff: f64,
    pub dcoeff: f64,
    pub safety: f64,
    pub factor_min: f64,
    pub factor_max: f64,
    pub dt_min: f64,
    pub dt_max: Option<f64>,
}

impl Default for PidController {
    fn default() -> Self {
        Self {
            rtol: 1e-3,
            atol: 1e-3,
            pcoeff: 0.0,
            icoeff: 1.0,
            dcoeff: 0.0,
            safety: 0.9,
            factor_min: 0.2,
            factor_max: 10.0,
            dt_min: 0.0,
            dt_max: None,
        }
    }
}

/// Inverse scaled errors of the two previously accepted steps.
#[derive(Debug, Clone, Copy)]
pub struct ControllerHistory {
    prev: f64,
    prev_prev: f64,
}

impl Default for ControllerHistory {
    fn default() -> Self {
        Self {
            prev: 1.0,
            prev_prev: 1.0,
        }
    }
}

impl PidController {
    pub fn new(rtol: f64, atol: f64) -> Self {
        Self {
            rtol,
            atol,
            ..Self::default()
        }
    }

    /// The plain integral controller used by the reference solver.
    pub fn integral(rtol: f64, atol: f64) -> Self {
        Self {
            pcoeff: 0.0,
            icoeff: 1.0,
            dcoeff: 0.0,
            ..Self::new(rtol, atol)
        }
    }

    /// RMS norm of `err` scaled by `atol + rtol * max(|y0|, |y1|)`.
    pub fn error_norm(&self, y0: &[f64], y1: &[f64], err: &[f64]) -> f64 {
        if err.is_empty() {
            return 0.0;
        }
        let sum: f64 = y0
            .iter()
            .zip(y1)
            .zip(err)
            .map(|((a, b), e)| {
                let scale = self.atol + self.rtol * a.abs().max(b.abs());
                (e / scale).powi(2)
            })
            .sum();
        (sum / err.len() as f64).sqrt()
    }

    /// Multiplicative factor for the next step size. A step is accepted when
    /// `err_norm <= 1`; after a rejection the factor never exceeds 1.
    pub fn factor(
        &self,
        history: &mut ControllerHistory,
        err_norm: f64,
        error_order: usize,
        accepted: bool,
    ) -> f64 {
        if !err_norm.is_finite() {
            return self.factor_min;
        }
        let k = (error_order + 1) as f64;
        let beta1 = (self.pcoeff + self.icoeff + self.dcoeff) / k;
        let beta2 = -(self.pcoeff + 2.0 * self.dcoeff) / k;
        let beta3 = self.dcoeff / k;

        let inv = if err_norm == 0.0 {
            f64::INFINITY
        } else {
            1.0 / err_norm
        };
        let mut factor =
            self.safety * inv.powf(beta1) * history.prev.powf(beta2) * history.prev_prev.powf(beta3);
        if !factor.is_finite() {
            factor = self.factor_max;
        }

        let upper = if accepted { self.factor_max } else { 1.0 };
        let factor = factor.clamp(self.factor_min, upper);

        if accepted {
            history.prev_prev = history.prev;
            history.prev = inv.min(1e10);
        }
        factor
    }

    /// Clamps a proposed step size to `[dt_min, dt_max]`.
    pub fn limit(&self, dt: f64) -> f64 {
        let dt = dt.max(self.dt_min);
        match self.dt_max {
            Some(max) => dt.min(max),
            None => dt,
        }
    }

    /// Hairer's starting step heuristic, driven by the real parts of the
    /// state.
    pub fn select_initial_step<T: Scalar>(
        &self,
        system: &impl DynamicalSystem<T>,
        t0: f64,
        y0: &[T],
        span: f64,
        error_order: usize,
    ) -> f64 {
        let n = y0.len();
        if n == 0 || span <= 0.0 {
            return span.max(0.0);
        }
        let rms = |v: &[f64]| (v.iter().map(|x| x * x).sum::<f64>() / v.len() as f64).sqrt();

        let mut f0 = vec![T::zero(); n];
        system.apply(T::cst(t0), y0, &mut f0);
        let y0r: Vec<f64> = y0.iter().map(|v| v.real()).collect();
        let f0r: Vec<f64> = f0.iter().map(|v| v.real()).collect();
        let scale: Vec<f64> = y0r.iter().map(|y| self.atol + y.abs() * self.rtol).collect();

        let d0 = rms(&y0r.iter().zip(&scale).map(|(y, s)| y / s).collect::<Vec<_>>());
        let d1 = rms(&f0r.iter().zip(&scale).map(|(f, s)| f / s).collect::<Vec<_>>());
        let h0 = if d0 < 1e-5 || d1 < 1e-5 { 1e-6 } else { 0.01 * d0 / d1 };
        let h0 = h0.min(span);

        let y1: Vec<T> = y0
            .iter()
            .zip(&f0)
            .map(|(y, f)| *y + T::cst(h0) * *f)
            .collect();
        let mut f1 = vec![T::zero(); n];
        system.apply(T::cst(t0 + h0), &y1, &mut f1);
        let d2 = rms(
            &f1.iter()
                .zip(&f0r)
                .zip(&scale)
                .map(|((a, b), s)| (a.real() - b) / s)
                .collect::<Vec<_>>(),
        ) / h0;

        let h1 = if d1 <= 1e-15 && d2 <= 1e-15 {
            (h0 * 1e-3).max(1e-6)
        } else {
            (0.01 / d1.max(d2)).powf(1.0 / (error_order + 1) as f64)
        };
        (100.0 * h0).min(h1).min(span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn error_norm_is_scaled_rms() {
        let controller = PidController::new(0.0, 2.0);
        let norm = controller.error_norm(&[0.0, 0.0], &[0.0, 0.0], &[2.0, 2.0]);
        assert_relative_eq!(norm, 1.0);
    }

    #[test]
    fn error_norm_uses_larger_of_both_states() {
        let controller = PidController::new(0.1, 0.0);
        let norm = controller.error_norm(&[10.0], &[20.0], &[2.0]);
        assert_relative_eq!(norm, 1.0);
    }

    #[test]
    fn integral_factor_follows_fifth_root() {
        let controller = PidController::integral(1e-3, 1e-3);
        let mut history = ControllerHistory::default();
        let factor = controller.factor(&mut history, 0.5, 4, true);
        assert_relative_eq!(factor, 0.9 * 2.0_f64.powf(0.2), epsilon = 1e-12);
    }

    #[test]
    fn rejection_never_grows_the_step() {
        let controller = PidController::default();
        let mut history = ControllerHistory::default();
        let factor = controller.factor(&mut history, 1e-12, 4, false);
        assert!(factor <= 1.0);
        let factor = controller.factor(&mut history, 1e6, 4, false);
        assert_relative_eq!(factor, controller.factor_min);
    }

    #[test]
    fn zero_error_grows_by_factor_max() {
        let controller = PidController::default();
        let mut history = ControllerHistory::default();
        assert_relative_eq!(controller.factor(&mut history, 0.0, 4, true), 10.0);
    }

    #[test]
    fn proportional_term_uses_history() {
        let controller = PidController {
            pcoeff: 0.4,
            icoeff: 0.3,
            ..PidController::default()
        };
        let mut history = ControllerHistory::default();
        let first = controller.factor(&mut history, 0.5, 4, true);
        // beta1 = 0.7 / 5, beta2 = -0.4 / 5, history starts at 1.
        assert_relative_eq!(first, 0.9 * 2.0_f64.powf(0.14), epsilon = 1e-12);
        let second = controller.factor(&mut history, 0.5, 4, true);
        assert_relative_eq!(second, 0.9 * 2.0_f64.powf(0.14) * 2.0_f64.powf(-0.08), epsilon = 1e-12);
    }

    #[test]
    fn limit_respects_bounds() {
        let controller = PidController {
            dt_min: 0.1,
            dt_max: Some(2.0),
            ..PidController::default()
        };
        assert_relative_eq!(controller.limit(0.01), 0.1);
        assert_relative_eq!(controller.limit(5.0), 2.0);
    }

    struct Growth;

    impl DynamicalSystem<f64> for Growth {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = x[0];
        }
    }

    #[test]
    fn initial_step_is_positive_and_bounded_by_span() {
        let controller = PidController::new(1e-3, 1e-6);
        let h = controller.select_initial_step(&Growth, 0.0, &[1.0], 0.5, 4);
        assert!(h > 0.0 && h <= 0.5, "h = {h}");
    }
}
