//! GR4J unit hydrographs: delay an input series by convolving it with weights
//! taken from an S-curve.

use anyhow::{bail, Result};

/// Convolution with fixed weights and a carried state.
///
/// Each step spreads `input * weights[i]` over the next `weights.len()`
/// outputs; the first slot of the state is released and the state shifts
/// left.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitHydrograph {
    weights: Vec<f64>,
    state: Vec<f64>,
}

fn uh1_curve(bin: f64, len: f64) -> f64 {
    if bin <= 0.0 {
        0.0
    } else if bin < len {
        (bin / len).powf(2.5)
    } else {
        1.0
    }
}

fn uh2_curve(bin: f64, len: f64) -> f64 {
    let half = len / 2.0;
    if bin <= 0.0 {
        0.0
    } else if bin < half {
        0.5 * (bin / half).powf(2.5)
    } else if bin < len {
        1.0 - 0.5 * (2.0 - bin / half).powf(2.5)
    } else {
        1.0
    }
}

impl UnitHydrograph {
    /// First GR4J unit hydrograph with lag `x4`.
    pub fn uh1(lag_time: f64) -> Result<Self> {
        Self::from_s_curve(lag_time, uh1_curve)
    }

    /// Second GR4J unit hydrograph; `lag_time` is already `2 * x4`.
    pub fn uh2(lag_time: f64) -> Result<Self> {
        Self::from_s_curve(lag_time, uh2_curve)
    }

    fn from_s_curve(lag_time: f64, curve: fn(f64, f64) -> f64) -> Result<Self> {
        if !(lag_time > 0.0) || !lag_time.is_finite() {
            bail!("Lag time must be positive and finite, got {lag_time}.");
        }
        let len = lag_time.ceil() as usize;
        let weights: Vec<f64> = (0..len)
            .map(|i| curve(i as f64 + 1.0, lag_time) - curve(i as f64, lag_time))
            .collect();
        Ok(Self {
            state: vec![0.0; weights.len()],
            weights,
        })
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn reset(&mut self) {
        self.state.iter_mut().for_each(|s| *s = 0.0);
    }

    pub fn step(&mut self, input: f64) -> f64 {
        for (s, w) in self.state.iter_mut().zip(&self.weights) {
            *s += input * w;
        }
        let out = self.state[0];
        self.state.rotate_left(1);
        if let Some(last) = self.state.last_mut() {
            *last = 0.0;
        }
        out
    }

    pub fn run(&mut self, inputs: &[f64]) -> Vec<f64> {
        inputs.iter().map(|&x| self.step(x)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn weights_sum_to_one() {
        for uh in [
            UnitHydrograph::uh1(3.5).expect("valid lag"),
            UnitHydrograph::uh2(7.0).expect("valid lag"),
        ] {
            assert_relative_eq!(uh.weights().iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn weight_count_is_ceiling_of_lag() {
        assert_eq!(UnitHydrograph::uh1(3.5).expect("valid lag").weights().len(), 4);
        assert_eq!(UnitHydrograph::uh2(7.0).expect("valid lag").weights().len(), 7);
    }

    #[test]
    fn first_uh1_weight_follows_s_curve() {
        let uh = UnitHydrograph::uh1(3.5).expect("valid lag");
        assert_relative_eq!(uh.weights()[0], (1.0_f64 / 3.5).powf(2.5), epsilon = 1e-12);
    }

    #[test]
    fn uh2_is_symmetric() {
        let uh = UnitHydrograph::uh2(6.0).expect("valid lag");
        let w = uh.weights();
        for i in 0..w.len() {
            assert_relative_eq!(w[i], w[w.len() - 1 - i], epsilon = 1e-12);
        }
    }

    #[test]
    fn impulse_response_reproduces_weights_and_conserves_volume() {
        let mut uh = UnitHydrograph::uh1(3.5).expect("valid lag");
        let weights = uh.weights().to_vec();
        let mut input = vec![0.0; 8];
        input[0] = 10.0;
        let out = uh.run(&input);
        for (o, w) in out.iter().zip(&weights) {
            assert_relative_eq!(*o, 10.0 * w, epsilon = 1e-12);
        }
        assert_relative_eq!(out.iter().sum::<f64>(), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn reset_clears_carried_water() {
        let mut uh = UnitHydrograph::uh2(7.0).expect("valid lag");
        uh.step(5.0);
        uh.reset();
        assert_eq!(uh.step(0.0), 0.0);
    }

    #[test]
    fn rejects_non_positive_lag() {
        let err = UnitHydrograph::uh1(0.0).expect_err("zero lag is invalid");
        assert!(format!("{err}").contains("Lag time must be positive"));
    }
}
