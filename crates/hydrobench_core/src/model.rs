//! The ExpHydro bucket model: a snowpack and a soil-water store driven by
//! temperature, daylength and precipitation.
//!
//! Every function is generic over [`Scalar`] so the same code evaluates on
//! `f64` for forward runs and on `Dual` for parameter sensitivities. Threshold
//! switches use the smooth surrogate [`step_fn`] to keep the system
//! differentiable.

use crate::interpolation::{ForcingInterpolant, Interpolator};
use crate::traits::{DynamicalSystem, Scalar};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Parameter names in the order used by [`Parameters::to_array`].
pub const PARAMETER_NAMES: [&str; 6] = ["Tmin", "Tmax", "Df", "Smax", "Qmax", "f"];

/// Number of model states (snowpack, soil water).
pub const STATE_DIM: usize = 2;

/// The six calibration parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Parameters<T = f64> {
    /// Temperature below which precipitation falls as snow (°C).
    #[serde(rename = "Tmin")]
    pub tmin: T,
    /// Temperature above which snow melts (°C).
    #[serde(rename = "Tmax")]
    pub tmax: T,
    /// Degree-day melt factor (mm/°C/day).
    #[serde(rename = "Df")]
    pub df: T,
    /// Soil-water capacity (mm).
    #[serde(rename = "Smax")]
    pub smax: T,
    /// Maximum baseflow (mm/day).
    #[serde(rename = "Qmax")]
    pub qmax: T,
    /// Baseflow decay rate with soil-water deficit (1/mm).
    pub f: T,
}

impl Default for Parameters<f64> {
    fn default() -> Self {
        Self {
            tmin: -2.092959084,
            tmax: 0.175739196,
            df: 2.674548848,
            smax: 1709.461015,
            qmax: 18.46996175,
            f: 0.01674478,
        }
    }
}

impl<T: Scalar> Parameters<T> {
    pub fn to_array(&self) -> [T; 6] {
        [self.tmin, self.tmax, self.df, self.smax, self.qmax, self.f]
    }

    pub fn from_array(values: [T; 6]) -> Self {
        let [tmin, tmax, df, smax, qmax, f] = values;
        Self {
            tmin,
            tmax,
            df,
            smax,
            qmax,
            f,
        }
    }

    /// Builds parameters from a slice in [`PARAMETER_NAMES`] order.
    pub fn from_slice(values: &[T]) -> Result<Self> {
        match values {
            [tmin, tmax, df, smax, qmax, f] => Ok(Self::from_array([*tmin, *tmax, *df, *smax, *qmax, *f])),
            _ => bail!("Expected 6 parameters, got {}.", values.len()),
        }
    }

    /// Drops derivative information.
    pub fn real(&self) -> Parameters<f64> {
        Parameters::from_array(self.to_array().map(Scalar::real))
    }
}

impl Parameters<f64> {
    /// Lifts plain parameters into another scalar type.
    pub fn lift<T: Scalar>(&self) -> Parameters<T> {
        Parameters::from_array(self.to_array().map(T::cst))
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in PARAMETER_NAMES.iter().zip(self.to_array()) {
            if !value.is_finite() {
                bail!("Parameter {} must be finite, got {}.", name, value);
            }
        }
        if self.smax <= 0.0 {
            bail!("Smax must be positive, got {}.", self.smax);
        }
        if self.qmax < 0.0 {
            bail!("Qmax must be non-negative, got {}.", self.qmax);
        }
        Ok(())
    }
}

/// Model storages in mm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct State<T = f64> {
    pub snowpack: T,
    pub soilwater: T,
}

impl Default for State<f64> {
    fn default() -> Self {
        Self {
            snowpack: 0.0,
            soilwater: 50.0,
        }
    }
}

impl<T: Scalar> State<T> {
    pub fn to_array(&self) -> [T; STATE_DIM] {
        [self.snowpack, self.soilwater]
    }

    pub fn from_slice(x: &[T]) -> Self {
        Self {
            snowpack: x[0],
            soilwater: x[1],
        }
    }
}

impl State<f64> {
    pub fn lift<T: Scalar>(&self) -> State<T> {
        State {
            snowpack: T::cst(self.snowpack),
            soilwater: T::cst(self.soilwater),
        }
    }
}

/// Flows leaving the soil bucket plus the melt entering it (mm/day).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelOutput<T = f64> {
    pub flow: T,
    pub baseflow: T,
    pub surfaceflow: T,
    pub evap: T,
    pub melt: T,
}

/// Fluxes of the snow bucket (mm/day).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceFluxes<T> {
    pub snowfall: T,
    pub rainfall: T,
    pub melt: T,
    pub pet: T,
}

/// Smooth Heaviside surrogate `(tanh(5x) + 1) / 2`.
pub fn step_fn<T: Scalar>(x: T) -> T {
    ((T::cst(5.0) * x).tanh() + T::one()) * T::cst(0.5)
}

/// Hamon potential evapotranspiration (mm/day).
pub fn potential_evapotranspiration<T: Scalar>(temp: T, lday: T) -> T {
    T::cst(29.8 * 24.0 * 0.611) * lday * (T::cst(17.3) * temp / (temp + T::cst(237.3))).exp()
        / (temp + T::cst(273.2))
}

/// Partitions precipitation into snow and rain and computes snowmelt and PET.
pub fn surface_bucket<T: Scalar>(
    snowpack: T,
    temp: T,
    lday: T,
    prcp: T,
    params: &Parameters<T>,
) -> SurfaceFluxes<T> {
    let snowfall = step_fn(params.tmin - temp) * prcp;
    let rainfall = step_fn(temp - params.tmin) * prcp;
    let melt = step_fn(temp - params.tmax)
        * step_fn(snowpack)
        * snowpack.min(params.df * (temp - params.tmax));
    SurfaceFluxes {
        snowfall,
        rainfall,
        melt,
        pet: potential_evapotranspiration(temp, lday),
    }
}

/// Evapotranspiration and runoff from the soil bucket.
pub fn soil_bucket<T: Scalar>(soilwater: T, pet: T, melt: T, params: &Parameters<T>) -> ModelOutput<T> {
    let wet = step_fn(soilwater);
    let evap = wet * pet * T::one().min(soilwater / params.smax);
    let baseflow = wet * params.qmax * (-params.f * T::zero().max(params.smax - soilwater)).exp();
    let surfaceflow = T::zero().max(soilwater - params.smax);
    ModelOutput {
        flow: baseflow + surfaceflow,
        baseflow,
        surfaceflow,
        evap,
        melt,
    }
}

/// Right-hand side for one state and forcing sample.
///
/// With `clamp` the derivatives are bounded below by `-state`, so a store can
/// at most empty itself within one unit of time.
pub fn derivatives<T: Scalar>(
    state: &State<T>,
    temp: T,
    lday: T,
    prcp: T,
    params: &Parameters<T>,
    clamp: bool,
) -> [T; STATE_DIM] {
    let surface = surface_bucket(state.snowpack, temp, lday, prcp, params);
    let soil = soil_bucket(state.soilwater, surface.pet, surface.melt, params);

    let dsnowpack = surface.snowfall - surface.melt;
    let dsoilwater = (surface.rainfall + surface.melt) - (soil.evap + soil.flow);
    if clamp {
        [dsnowpack.max(-state.snowpack), dsoilwater.max(-state.soilwater)]
    } else {
        [dsnowpack, dsoilwater]
    }
}

/// The ExpHydro ODE system driven by interpolated forcing.
pub struct ExpHydro<'a, T: Scalar, I> {
    pub params: Parameters<T>,
    pub forcing: &'a ForcingInterpolant<I>,
    pub clamp: bool,
}

impl<'a, T: Scalar, I: Interpolator> ExpHydro<'a, T, I> {
    pub fn new(params: Parameters<T>, forcing: &'a ForcingInterpolant<I>, clamp: bool) -> Self {
        Self {
            params,
            forcing,
            clamp,
        }
    }

    /// Forcing at time t lifted into the scalar type.
    fn forcing_at(&self, t: f64) -> (T, T, T) {
        let (temp, lday, prcp) = self.forcing.at(t);
        (T::cst(temp), T::cst(lday), T::cst(prcp))
    }
}

impl<'a, T: Scalar, I: Interpolator> DynamicalSystem<T> for ExpHydro<'a, T, I> {
    fn dimension(&self) -> usize {
        STATE_DIM
    }

    fn apply(&self, t: T, x: &[T], out: &mut [T]) {
        let (temp, lday, prcp) = self.forcing_at(t.real());
        let d = derivatives(&State::from_slice(x), temp, lday, prcp, &self.params, self.clamp);
        out[..STATE_DIM].copy_from_slice(&d);
    }
}

/// Recomputes model outputs at saved states, using the forcing at each save
/// time.
pub fn replay_outputs<T: Scalar, I: Interpolator>(
    params: &Parameters<T>,
    ts: &[f64],
    ys: &[Vec<T>],
    forcing: &ForcingInterpolant<I>,
) -> Vec<ModelOutput<T>> {
    ts.iter()
        .zip(ys)
        .map(|(&t, y)| {
            let state = State::from_slice(y);
            let (temp, lday, prcp) = forcing.at(t);
            let surface = surface_bucket(
                state.snowpack,
                T::cst(temp),
                T::cst(lday),
                T::cst(prcp),
                params,
            );
            soil_bucket(state.soilwater, surface.pet, surface.melt, params)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::Dual;
    use approx::assert_relative_eq;

    #[test]
    fn step_fn_is_half_at_zero_and_saturates() {
        assert_relative_eq!(step_fn(0.0), 0.5);
        assert!(step_fn(5.0) > 1.0 - 1e-9);
        assert!(step_fn(-5.0) < 1e-9);
    }

    #[test]
    fn pet_matches_hamon_formula() {
        let temp = 10.0_f64;
        let lday = 0.5;
        let expected =
            29.8 * lday * 24.0 * 0.611 * (17.3 * temp / (temp + 237.3)).exp() / (temp + 273.2);
        assert_relative_eq!(potential_evapotranspiration(temp, lday), expected, epsilon = 1e-12);
    }

    #[test]
    fn cold_precipitation_falls_as_snow() {
        let params = Parameters::default();
        let surface = surface_bucket(0.0, -15.0, 0.4, 10.0, &params);
        assert_relative_eq!(surface.snowfall, 10.0, epsilon = 1e-9);
        assert!(surface.rainfall < 1e-9);
    }

    #[test]
    fn warm_days_melt_snow_up_to_the_pack() {
        let params = Parameters::default();
        let surface = surface_bucket(1.0, 20.0, 0.5, 0.0, &params);
        // Df * (T - Tmax) far exceeds the pack, so melt is the whole pack.
        assert_relative_eq!(surface.melt, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn surfaceflow_only_above_capacity() {
        let params = Parameters::default();
        let below = soil_bucket(100.0, 1.0, 0.0, &params);
        assert_eq!(below.surfaceflow, 0.0);
        let above = soil_bucket(params.smax + 12.0, 1.0, 0.0, &params);
        assert_relative_eq!(above.surfaceflow, 12.0, epsilon = 1e-9);
        assert_relative_eq!(above.baseflow, params.qmax, epsilon = 1e-9);
        assert_relative_eq!(above.flow, above.baseflow + above.surfaceflow);
    }

    #[test]
    fn clamp_prevents_draining_below_empty() {
        // A small capacity keeps baseflow near Qmax while the store is almost empty.
        let params = Parameters {
            smax: 1.0,
            ..Parameters::default()
        };
        let state = State {
            snowpack: 0.0,
            soilwater: 1e-3,
        };
        let free = derivatives(&state, 25.0, 0.6, 0.0, &params, false);
        let clamped = derivatives(&state, 25.0, 0.6, 0.0, &params, true);
        assert!(free[1] < -state.soilwater);
        assert_relative_eq!(clamped[1], -state.soilwater);
    }

    #[test]
    fn dual_evaluation_matches_f64_values() {
        let params = Parameters::default();
        let state = State {
            snowpack: 12.0,
            soilwater: 800.0,
        };
        let plain = derivatives(&state, 1.5, 0.45, 3.0, &params, true);
        let dual = derivatives(
            &state.lift::<Dual>(),
            Dual::constant(1.5),
            Dual::constant(0.45),
            Dual::constant(3.0),
            &params.lift::<Dual>(),
            true,
        );
        assert_relative_eq!(plain[0], dual[0].val);
        assert_relative_eq!(plain[1], dual[1].val);
        assert_eq!(dual[0].eps, 0.0);
    }

    #[test]
    fn qmax_sensitivity_of_baseflow() {
        let params = Parameters::default();
        let mut seeded = params.lift::<Dual>();
        seeded.qmax = Dual::variable(params.qmax);
        let out = soil_bucket(Dual::constant(900.0), Dual::constant(1.0), Dual::constant(0.0), &seeded);
        // baseflow is linear in Qmax.
        assert_relative_eq!(out.baseflow.eps, out.baseflow.val / params.qmax, epsilon = 1e-12);
    }

    #[test]
    fn validation_rejects_non_positive_capacity() {
        let params = Parameters {
            smax: 0.0,
            ..Parameters::default()
        };
        assert!(params.validate().is_err());
        assert!(Parameters::default().validate().is_ok());
    }

    #[test]
    fn from_slice_checks_length() {
        assert!(Parameters::<f64>::from_slice(&[1.0, 2.0]).is_err());
        let params = Parameters::from_slice(&Parameters::default().to_array()).expect("six values");
        assert_eq!(params, Parameters::default());
    }
}
