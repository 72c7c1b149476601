use crate::error::SolveError;
use serde::{Deserialize, Serialize};

/// Finds a zero of a scalar function inside a bracket.
pub trait RootFinder {
    fn solve(&self, f: impl Fn(f64) -> f64, lower: f64, upper: f64) -> Result<f64, SolveError>;
}

/// Pegasus variant of regula falsi.
///
/// Each iteration takes the secant through the bracket ends; when the
/// retained end would stagnate its function value is scaled by
/// `f_b / (f_b + f_x)`, which restores superlinear convergence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pegasus {
    /// Absolute tolerance on |f(x)|.
    pub tol_f: f64,
    /// Absolute tolerance on the bracket width.
    pub tol_x: f64,
    pub max_iterations: usize,
    /// How many times the bracket may be pushed outward when both ends have
    /// the same sign.
    pub max_widenings: usize,
}

impl Default for Pegasus {
    fn default() -> Self {
        Self {
            tol_f: 1e-8,
            tol_x: 1e-8,
            max_iterations: 50,
            max_widenings: 60,
        }
    }
}

impl RootFinder for Pegasus {
    fn solve(&self, f: impl Fn(f64) -> f64, lower: f64, upper: f64) -> Result<f64, SolveError> {
        let (mut a, mut b) = if lower <= upper {
            (lower, upper)
        } else {
            (upper, lower)
        };
        let mut fa = f(a);
        let mut fb = f(b);

        // Push the end closer to the root (smaller |f|) outward.
        let mut widenings = 0;
        while fa * fb > 0.0 && widenings < self.max_widenings {
            let width = (b - a).abs().max(1.0);
            if fa.abs() < fb.abs() {
                a -= width;
                fa = f(a);
            } else {
                b += width;
                fb = f(b);
            }
            widenings += 1;
        }
        if widenings > 0 {
            log::debug!("widened bracket {widenings} times to [{a}, {b}]");
        }
        if !(fa * fb <= 0.0) {
            return Err(SolveError::RootNotBracketed {
                lower: a,
                upper: b,
                f_lower: fa,
                f_upper: fb,
            });
        }

        if fa == 0.0 {
            return Ok(a);
        }
        if fb == 0.0 {
            return Ok(b);
        }

        for _ in 0..self.max_iterations {
            let x = b - fb * (b - a) / (fb - fa);
            let fx = f(x);
            if fx == 0.0 {
                return Ok(x);
            }
            if fx * fb < 0.0 {
                a = b;
                fa = fb;
            } else {
                fa *= fb / (fb + fx);
            }
            b = x;
            fb = fx;

            if (b - a).abs() < self.tol_x || fb.abs() < self.tol_f {
                return Ok(b);
            }
        }

        Err(SolveError::RootNotConverged {
            iterations: self.max_iterations,
            residual: fb.abs(),
        })
    }
}
