//! Goodness-of-fit scores between observed and simulated flow.
//!
//! Slices are compared pairwise up to the shorter length.

use crate::traits::Scalar;

/// Mean squared error. Generic so the benchmark loss can carry derivatives.
pub fn mse<T: Scalar>(observed: &[f64], simulated: &[T]) -> T {
    let n = observed.len().min(simulated.len());
    if n == 0 {
        return T::zero();
    }
    let sum = observed
        .iter()
        .zip(simulated)
        .fold(T::zero(), |acc, (&o, &s)| {
            let d = s - T::cst(o);
            acc + d * d
        });
    sum / T::cst(n as f64)
}

/// Root mean squared error.
pub fn rmse(observed: &[f64], simulated: &[f64]) -> f64 {
    mse(observed, simulated).sqrt()
}

/// Nash-Sutcliffe efficiency, 1 for a perfect fit. Constant observations give
/// negative infinity.
pub fn nse(observed: &[f64], simulated: &[f64]) -> f64 {
    let n = observed.len().min(simulated.len());
    if n == 0 {
        return f64::NEG_INFINITY;
    }
    let observed = &observed[..n];
    let mean = observed.iter().sum::<f64>() / n as f64;
    let residual: f64 = observed
        .iter()
        .zip(simulated)
        .map(|(o, s)| (o - s).powi(2))
        .sum();
    let spread: f64 = observed.iter().map(|o| (o - mean).powi(2)).sum();
    if spread == 0.0 {
        return f64::NEG_INFINITY;
    }
    1.0 - residual / spread
}

/// Kling-Gupta efficiency from correlation, variability ratio and bias ratio.
pub fn kge(observed: &[f64], simulated: &[f64]) -> f64 {
    let n = observed.len().min(simulated.len());
    if n == 0 {
        return f64::NEG_INFINITY;
    }
    let (observed, simulated) = (&observed[..n], &simulated[..n]);
    let len = n as f64;
    let mean = |v: &[f64]| v.iter().sum::<f64>() / len;
    let (mean_o, mean_s) = (mean(observed), mean(simulated));
    let std = |v: &[f64], m: f64| (v.iter().map(|x| (x - m).powi(2)).sum::<f64>() / len).sqrt();
    let (std_o, std_s) = (std(observed, mean_o), std(simulated, mean_s));

    let r = if std_o == 0.0 || std_s == 0.0 {
        0.0
    } else {
        observed
            .iter()
            .zip(simulated)
            .map(|(o, s)| (o - mean_o) * (s - mean_s))
            .sum::<f64>()
            / (len * std_o * std_s)
    };
    let alpha = if std_o == 0.0 { 0.0 } else { std_s / std_o };
    let beta = if mean_o == 0.0 { 0.0 } else { mean_s / mean_o };
    1.0 - ((r - 1.0).powi(2) + (alpha - 1.0).powi(2) + (beta - 1.0).powi(2)).sqrt()
}
