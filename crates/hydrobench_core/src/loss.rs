//! Forward solves of the ExpHydro model and the flow-matching loss.

use crate::autodiff::{gradient, Dual};
use crate::benchmark::Variant;
use crate::controller::PidController;
use crate::elements::{ExpHydroUnit, ImplicitEuler, Pegasus};
use crate::forcing::Forcing;
use crate::integrate::{integrate_adaptive, integrate_fixed, AdaptiveOptions, Solution, SolverStats};
use crate::interpolation::{CubicHermite, ForcingInterpolant, Interpolator, LinearInterpolator, NaturalCubicSpline};
use crate::metrics::mse;
use crate::model::{replay_outputs, ExpHydro, ModelOutput, Parameters, State, PARAMETER_NAMES, STATE_DIM};
use crate::solvers::{Dopri5, FixedScheme, Rk38, Tsit5, RK4};
use crate::traits::Scalar;
use anyhow::{bail, Context, Result};

/// Everything needed to turn a parameter set into simulated flow, apart from
/// the parameters themselves.
#[derive(Debug, Clone)]
pub struct FlowProblem<'a> {
    pub forcing: &'a Forcing,
    pub initial: State,
    pub variant: Variant,
    pub controller: PidController,
    pub options: AdaptiveOptions,
    /// Step of the fixed-step solver.
    pub dt: f64,
    pub scheme: FixedScheme,
    pub root_finder: Pegasus,
}

/// Simulated outputs at every save time.
#[derive(Debug, Clone)]
pub struct FlowRun<T> {
    pub outputs: Vec<ModelOutput<T>>,
    pub stats: SolverStats,
}

impl<T: Copy> FlowRun<T> {
    pub fn flow(&self) -> Vec<T> {
        self.outputs.iter().map(|o| o.flow).collect()
    }
}

impl<'a> FlowProblem<'a> {
    /// Problem with the variant's default solver settings.
    pub fn new(forcing: &'a Forcing, variant: Variant) -> Self {
        Self {
            forcing,
            initial: State::default(),
            variant,
            controller: variant.default_controller(),
            options: AdaptiveOptions {
                dt0: variant.default_dt0(),
                ..AdaptiveOptions::default()
            },
            dt: 1.0,
            scheme: FixedScheme::default(),
            root_finder: Pegasus::default(),
        }
    }

    /// One save time per forcing day, starting at the variant's time origin.
    pub fn save_at(&self) -> Vec<f64> {
        let t0 = self.variant.time_origin();
        (0..self.forcing.len()).map(|k| t0 + k as f64).collect()
    }

    pub fn simulate<T: Scalar>(&self, params: &Parameters<T>) -> Result<FlowRun<T>> {
        params.real().validate()?;
        match self.variant {
            Variant::Tsit5 => self.simulate_ode::<T, CubicHermite>(params, true),
            Variant::Rk45 => self.simulate_ode::<T, LinearInterpolator>(params, false),
            Variant::Rk4 => self.simulate_ode::<T, NaturalCubicSpline>(params, true),
            Variant::ImplicitEuler => self.simulate_elements(params),
        }
    }

    fn simulate_ode<T: Scalar, I: Interpolator>(
        &self,
        params: &Parameters<T>,
        clamp: bool,
    ) -> Result<FlowRun<T>> {
        let save_at = self.save_at();
        let interpolant = ForcingInterpolant::<I>::new(self.forcing, self.variant.time_origin())?;
        let system = ExpHydro::new(*params, &interpolant, clamp);
        let y0 = self.initial.lift::<T>().to_array();

        let solution: Solution<T> = match self.variant {
            Variant::Tsit5 => integrate_adaptive(
                &mut Tsit5::new(STATE_DIM),
                &self.controller,
                &system,
                &y0,
                &save_at,
                self.options,
            ),
            Variant::Rk45 => integrate_adaptive(
                &mut Dopri5::new(STATE_DIM),
                &self.controller,
                &system,
                &y0,
                &save_at,
                self.options,
            ),
            Variant::Rk4 => match self.scheme {
                FixedScheme::ThreeEighths => {
                    integrate_fixed(&mut Rk38::new(STATE_DIM), &system, &y0, &save_at, self.dt)
                }
                FixedScheme::Classic => {
                    integrate_fixed(&mut RK4::new(STATE_DIM), &system, &y0, &save_at, self.dt)
                }
            },
            Variant::ImplicitEuler => bail!("The implicit-euler variant has no ODE form."),
        }
        .with_context(|| format!("{} solve failed", self.variant))?;

        let outputs = replay_outputs(params, &solution.ts, &solution.ys, &interpolant);
        Ok(FlowRun {
            outputs,
            stats: solution.stats,
        })
    }

    fn simulate_elements<T: Scalar>(&self, params: &Parameters<T>) -> Result<FlowRun<T>> {
        let unit = ExpHydroUnit::new(params.real(), self.initial);
        let internals = unit.run(&ImplicitEuler::new(self.root_finder), self.forcing)?;
        let outputs = (0..internals.flow.len())
            .map(|k| ModelOutput {
                flow: T::cst(internals.flow[k]),
                baseflow: T::cst(internals.baseflow[k]),
                surfaceflow: T::cst(internals.surfaceflow[k]),
                evap: T::cst(internals.evap[k]),
                melt: T::cst(internals.melt[k]),
            })
            .collect();
        Ok(FlowRun {
            outputs,
            stats: SolverStats {
                accepted_steps: internals.flow.len(),
                ..SolverStats::default()
            },
        })
    }
}

/// Mean squared error between simulated and observed flow.
pub fn flow_loss<T: Scalar>(problem: &FlowProblem, params: &Parameters<T>) -> Result<T> {
    let run = problem.simulate(params)?;
    Ok(mse(&problem.forcing.observed_flow, &run.flow()))
}

/// Loss value and its derivative with respect to each parameter, in
/// [`PARAMETER_NAMES`] order.
pub fn loss_gradient(problem: &FlowProblem, params: &Parameters) -> Result<(f64, Parameters)> {
    if !problem.variant.is_differentiable() {
        bail!("The {} variant is not differentiable.", problem.variant);
    }
    let (loss, grad) = gradient(&params.to_array(), |seeded: &[Dual]| {
        flow_loss(problem, &Parameters::from_slice(seeded)?)
    })?;
    log::debug!(
        "loss {loss:.6e}, gradient {:?}",
        PARAMETER_NAMES.iter().zip(&grad).collect::<Vec<_>>()
    );
    Ok((loss, Parameters::from_slice(&grad)?))
}
