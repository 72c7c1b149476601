//! Continuous-time views of daily forcing series.
//!
//! The ODE solvers evaluate forcing at arbitrary stage times, so each daily
//! series is wrapped in an interpolant on the uniform axis `t0, t0 + h, ...`.

use crate::forcing::Forcing;
use anyhow::{anyhow, bail, Result};
use nalgebra::DMatrix;
use nalgebra_sparse::{coo::CooMatrix, csc::CscMatrix, factorization::CscCholesky};

/// A one-dimensional interpolant over uniformly spaced samples.
pub trait Interpolator {
    /// Builds the interpolant for samples located at `t0 + i * h`.
    fn from_samples(t0: f64, h: f64, values: &[f64]) -> Result<Self>
    where
        Self: Sized;

    /// Evaluates the interpolant at time `t`.
    fn evaluate(&self, t: f64) -> f64;
}

/// Uniform knot axis shared by all interpolants.
#[derive(Debug, Clone, Copy)]
struct Axis {
    t0: f64,
    h: f64,
    len: usize,
}

impl Axis {
    fn new(t0: f64, h: f64, len: usize) -> Result<Self> {
        if len == 0 {
            bail!("Cannot interpolate an empty series.");
        }
        if !(h > 0.0) || !h.is_finite() {
            bail!("Knot spacing must be positive, got {}.", h);
        }
        if !t0.is_finite() {
            bail!("Knot origin must be finite.");
        }
        Ok(Self { t0, h, len })
    }

    /// Segment index and local offset `u = t - t_i`, with the index clamped to
    /// the first / last segment.
    fn locate(&self, t: f64) -> (usize, f64) {
        let s = (t - self.t0) / self.h;
        let last_segment = self.len.saturating_sub(2);
        let i = if s <= 0.0 {
            0
        } else {
            (s.floor() as usize).min(last_segment)
        };
        (i, t - (self.t0 + i as f64 * self.h))
    }
}

/// Piecewise-linear interpolation; outside the knot range the first or last
/// sample is held constant.
#[derive(Debug, Clone)]
pub struct LinearInterpolator {
    axis: Axis,
    values: Vec<f64>,
}

impl Interpolator for LinearInterpolator {
    fn from_samples(t0: f64, h: f64, values: &[f64]) -> Result<Self> {
        Ok(Self {
            axis: Axis::new(t0, h, values.len())?,
            values: values.to_vec(),
        })
    }

    fn evaluate(&self, t: f64) -> f64 {
        let n = self.values.len();
        let t_end = self.axis.t0 + (n - 1) as f64 * self.axis.h;
        if n == 1 || t <= self.axis.t0 {
            return self.values[0];
        }
        if t >= t_end {
            return self.values[n - 1];
        }
        let (i, u) = self.axis.locate(t);
        let w = u / self.axis.h;
        self.values[i] * (1.0 - w) + self.values[i + 1] * w
    }
}

/// C1 piecewise cubic Hermite interpolation with finite-difference slopes:
/// central differences inside, one-sided differences at both ends.
#[derive(Debug, Clone)]
pub struct CubicHermite {
    axis: Axis,
    values: Vec<f64>,
    slopes: Vec<f64>,
}

impl Interpolator for CubicHermite {
    fn from_samples(t0: f64, h: f64, values: &[f64]) -> Result<Self> {
        let axis = Axis::new(t0, h, values.len())?;
        let n = values.len();
        let mut slopes = vec![0.0; n];
        if n >= 2 {
            slopes[0] = (values[1] - values[0]) / h;
            slopes[n - 1] = (values[n - 1] - values[n - 2]) / h;
            for i in 1..n - 1 {
                slopes[i] = (values[i + 1] - values[i - 1]) / (2.0 * h);
            }
        }
        Ok(Self {
            axis,
            values: values.to_vec(),
            slopes,
        })
    }

    fn evaluate(&self, t: f64) -> f64 {
        if self.values.len() == 1 {
            return self.values[0];
        }
        let h = self.axis.h;
        let (i, u) = self.axis.locate(t);
        let s = u / h;
        let s2 = s * s;
        let s3 = s2 * s;
        let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
        let h10 = s3 - 2.0 * s2 + s;
        let h01 = -2.0 * s3 + 3.0 * s2;
        let h11 = s3 - s2;
        h00 * self.values[i]
            + h10 * h * self.slopes[i]
            + h01 * self.values[i + 1]
            + h11 * h * self.slopes[i + 1]
    }
}

/// Natural cubic spline (zero curvature at both ends).
///
/// Stores per-segment coefficients `y_i + b_i u + c_i u^2 + d_i u^3`.
#[derive(Debug, Clone)]
pub struct NaturalCubicSpline {
    axis: Axis,
    a: Vec<f64>,
    b: Vec<f64>,
    c: Vec<f64>,
    d: Vec<f64>,
}

impl NaturalCubicSpline {
    /// Second derivatives at the knots. The interior unknowns satisfy the SPD
    /// tridiagonal system `M_{i-1} + 4 M_i + M_{i+1} = 6 (y_{i+1} - 2 y_i + y_{i-1}) / h^2`.
    fn second_derivatives(h: f64, values: &[f64]) -> Result<Vec<f64>> {
        let n = values.len();
        let mut m = vec![0.0; n];
        if n < 3 {
            return Ok(m);
        }
        let interior = n - 2;

        let mut coo = CooMatrix::<f64>::new(interior, interior);
        let mut rhs = DMatrix::<f64>::zeros(interior, 1);
        for k in 0..interior {
            coo.push(k, k, 4.0);
            if k > 0 {
                coo.push(k, k - 1, 1.0);
            }
            if k + 1 < interior {
                coo.push(k, k + 1, 1.0);
            }
            let i = k + 1;
            rhs[(k, 0)] = 6.0 * (values[i + 1] - 2.0 * values[i] + values[i - 1]) / (h * h);
        }

        let csc = CscMatrix::from(&coo);
        let cholesky = CscCholesky::factor(&csc)
            .map_err(|e| anyhow!("Spline system factorization failed: {:?}", e))?;
        let solution = cholesky.solve(&rhs);
        for k in 0..interior {
            m[k + 1] = solution[(k, 0)];
        }
        Ok(m)
    }
}

impl Interpolator for NaturalCubicSpline {
    fn from_samples(t0: f64, h: f64, values: &[f64]) -> Result<Self> {
        let axis = Axis::new(t0, h, values.len())?;
        let n = values.len();
        let m = Self::second_derivatives(h, values)?;

        let segments = n.saturating_sub(1).max(1);
        let mut b = vec![0.0; segments];
        let mut c = vec![0.0; segments];
        let mut d = vec![0.0; segments];
        for i in 0..n.saturating_sub(1) {
            b[i] = (values[i + 1] - values[i]) / h - h * (2.0 * m[i] + m[i + 1]) / 6.0;
            c[i] = m[i] / 2.0;
            d[i] = (m[i + 1] - m[i]) / (6.0 * h);
        }

        Ok(Self {
            axis,
            a: values[..segments].to_vec(),
            b,
            c,
            d,
        })
    }

    fn evaluate(&self, t: f64) -> f64 {
        let (i, u) = self.axis.locate(t);
        if self.axis.len == 1 {
            return self.a[0];
        }
        self.a[i] + u * (self.b[i] + u * (self.c[i] + u * self.d[i]))
    }
}

/// The three forcing drivers of the ExpHydro model as continuous functions
/// of time.
#[derive(Debug, Clone)]
pub struct ForcingInterpolant<I> {
    pub temp: I,
    pub lday: I,
    pub prcp: I,
}

impl<I: Interpolator> ForcingInterpolant<I> {
    /// Places day `i` of the forcing at time `t0 + i`.
    pub fn new(forcing: &Forcing, t0: f64) -> Result<Self> {
        Ok(Self {
            temp: I::from_samples(t0, 1.0, &forcing.temp)?,
            lday: I::from_samples(t0, 1.0, &forcing.lday)?,
            prcp: I::from_samples(t0, 1.0, &forcing.prcp)?,
        })
    }

    /// Returns (temp, lday, prcp) at time `t`.
    pub fn at(&self, t: f64) -> (f64, f64, f64) {
        (
            self.temp.evaluate(t),
            self.lday.evaluate(t),
            self.prcp.evaluate(t),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SAMPLES: [f64; 6] = [0.0, 1.0, 4.0, 2.0, -1.0, 3.0];

    #[test]
    fn linear_hits_knots_and_midpoints() {
        let interp = LinearInterpolator::from_samples(1.0, 1.0, &SAMPLES).expect("build");
        assert_relative_eq!(interp.evaluate(3.0), 4.0);
        assert_relative_eq!(interp.evaluate(2.5), 2.5);
        assert_relative_eq!(interp.evaluate(6.0), 3.0);
    }

    #[test]
    fn linear_holds_end_values_outside_range() {
        let interp = LinearInterpolator::from_samples(0.0, 1.0, &SAMPLES).expect("build");
        assert_relative_eq!(interp.evaluate(-5.0), 0.0);
        assert_relative_eq!(interp.evaluate(42.0), 3.0);
    }

    #[test]
    fn hermite_interpolates_knots_and_reproduces_quadratics_inside() {
        let quad: Vec<f64> = (0..8).map(|i| (i as f64).powi(2)).collect();
        let interp = CubicHermite::from_samples(0.0, 1.0, &quad).expect("build");
        for (i, &y) in quad.iter().enumerate() {
            assert_relative_eq!(interp.evaluate(i as f64), y, epsilon = 1e-12);
        }
        // Central differences are exact for quadratics, so interior segments are exact.
        assert_relative_eq!(interp.evaluate(3.5), 12.25, epsilon = 1e-12);
    }

    #[test]
    fn natural_spline_interpolates_knots() {
        let spline = NaturalCubicSpline::from_samples(1.0, 1.0, &SAMPLES).expect("build");
        for (i, &y) in SAMPLES.iter().enumerate() {
            assert_relative_eq!(spline.evaluate(1.0 + i as f64), y, epsilon = 1e-12);
        }
    }

    #[test]
    fn natural_spline_reproduces_lines_exactly() {
        let line: Vec<f64> = (0..10).map(|i| 2.0 * i as f64 - 3.0).collect();
        let spline = NaturalCubicSpline::from_samples(0.0, 1.0, &line).expect("build");
        assert_relative_eq!(spline.evaluate(4.25), 2.0 * 4.25 - 3.0, epsilon = 1e-12);
    }

    #[test]
    fn natural_spline_is_c2_at_interior_knots() {
        let spline = NaturalCubicSpline::from_samples(0.0, 1.0, &SAMPLES).expect("build");
        for i in 1..SAMPLES.len() - 1 {
            // Second derivative from the left segment end equals 2 c_i on the right.
            let left = 2.0 * spline.c[i - 1] + 6.0 * spline.d[i - 1];
            let right = 2.0 * spline.c[i];
            assert_relative_eq!(left, right, epsilon = 1e-10);
        }
        assert_relative_eq!(spline.c[0], 0.0);
    }

    #[test]
    fn short_series_degrade_gracefully() {
        let single = NaturalCubicSpline::from_samples(0.0, 1.0, &[5.0]).expect("build");
        assert_relative_eq!(single.evaluate(3.0), 5.0);
        let pair = NaturalCubicSpline::from_samples(0.0, 1.0, &[1.0, 3.0]).expect("build");
        assert_relative_eq!(pair.evaluate(0.5), 2.0);
    }

    #[test]
    fn empty_series_is_rejected() {
        assert!(LinearInterpolator::from_samples(0.0, 1.0, &[]).is_err());
        assert!(CubicHermite::from_samples(0.0, 0.0, &[1.0]).is_err());
    }
}
