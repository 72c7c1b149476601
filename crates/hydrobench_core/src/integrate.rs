//! Drivers that run a stepper over a save-at grid and collect the trajectory.

use crate::controller::{ControllerHistory, PidController};
use crate::error::SolveError;
use crate::traits::{DynamicalSystem, EmbeddedStepper, Scalar, Steppable};
use serde::{Deserialize, Serialize};

/// Work counters for one solve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverStats {
    pub accepted_steps: usize,
    pub rejected_steps: usize,
    pub rhs_evaluations: usize,
}

/// States recorded at the requested save times.
#[derive(Debug, Clone)]
pub struct Solution<T> {
    pub ts: Vec<f64>,
    pub ys: Vec<Vec<T>>,
    pub stats: SolverStats,
}

/// Options for [`integrate_adaptive`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveOptions {
    /// Initial step; chosen automatically when `None`.
    pub dt0: Option<f64>,
    /// Upper bound on attempted (accepted + rejected) steps between two
    /// consecutive save times.
    pub max_steps: usize,
}

impl Default for AdaptiveOptions {
    fn default() -> Self {
        Self {
            dt0: None,
            max_steps: 10_000,
        }
    }
}

fn validate_save_at(save_at: &[f64]) -> Result<(), SolveError> {
    if save_at.is_empty() {
        return Err(SolveError::InvalidSaveAt("no save times given".into()));
    }
    if save_at.iter().any(|t| !t.is_finite()) {
        return Err(SolveError::InvalidSaveAt("save times must be finite".into()));
    }
    if save_at.windows(2).any(|w| w[1] <= w[0]) {
        return Err(SolveError::InvalidSaveAt(
            "save times must be strictly increasing".into(),
        ));
    }
    Ok(())
}

fn check_finite<T: Scalar>(t: f64, y: &[T]) -> Result<(), SolveError> {
    if y.iter().all(|v| v.real().is_finite()) {
        Ok(())
    } else {
        Err(SolveError::NonFiniteState { t })
    }
}

/// Integrates with a fixed step `dt` from `save_at[0]`, recording the state
/// at every save time. Each gap between save times must be a whole number of
/// steps.
pub fn integrate_fixed<T, S, Sys>(
    stepper: &mut S,
    system: &Sys,
    y0: &[T],
    save_at: &[f64],
    dt: f64,
) -> Result<Solution<T>, SolveError>
where
    T: Scalar,
    S: Steppable<T>,
    Sys: DynamicalSystem<T>,
{
    validate_save_at(save_at)?;
    if !(dt > 0.0) {
        return Err(SolveError::InvalidSaveAt(format!(
            "step size must be positive, got {dt}"
        )));
    }

    let mut stats = SolverStats::default();
    let mut ys = Vec::with_capacity(save_at.len());
    let mut y = y0.to_vec();
    ys.push(y.clone());

    for window in save_at.windows(2) {
        let gap = window[1] - window[0];
        let steps = (gap / dt).round();
        if steps < 1.0 || (steps * dt - gap).abs() > 1e-9 * gap.max(1.0) {
            return Err(SolveError::InvalidSaveAt(format!(
                "gap {gap} between save times is not a multiple of dt = {dt}"
            )));
        }
        let mut t = T::cst(window[0]);
        for _ in 0..steps as usize {
            stepper.step(system, &mut t, &mut y, T::cst(dt));
            stats.accepted_steps += 1;
            stats.rhs_evaluations += stepper.stages();
        }
        check_finite(window[1], &y)?;
        ys.push(y.clone());
    }

    log::debug!(
        "fixed-step solve finished: {} steps, {} rhs evaluations",
        stats.accepted_steps,
        stats.rhs_evaluations
    );
    Ok(Solution {
        ts: save_at.to_vec(),
        ys,
        stats,
    })
}

/// Integrates with adaptive step-size control from `save_at[0]` to the last
/// save time. Steps are shortened to land exactly on each save time, and the
/// step budget `max_steps` restarts at every save time reached.
pub fn integrate_adaptive<T, S, Sys>(
    stepper: &mut S,
    controller: &PidController,
    system: &Sys,
    y0: &[T],
    save_at: &[f64],
    options: AdaptiveOptions,
) -> Result<Solution<T>, SolveError>
where
    T: Scalar,
    S: EmbeddedStepper<T>,
    Sys: DynamicalSystem<T>,
{
    validate_save_at(save_at)?;
    let order = stepper.error_order();
    let stages = <S as EmbeddedStepper<T>>::stages(&*stepper);
    let n = y0.len();

    let t_start = save_at[0];
    let t_end = save_at[save_at.len() - 1];
    let mut dt = match options.dt0 {
        Some(dt0) if dt0 > 0.0 => dt0,
        Some(dt0) => {
            return Err(SolveError::InvalidSaveAt(format!(
                "initial step must be positive, got {dt0}"
            )))
        }
        None => {
            let h = controller.select_initial_step(system, t_start, y0, t_end - t_start, order);
            // Two evaluations spent on the heuristic.
            h.max(f64::EPSILON)
        }
    };
    dt = controller.limit(dt);

    let mut stats = SolverStats::default();
    if options.dt0.is_none() {
        stats.rhs_evaluations += 2;
    }
    let mut history = ControllerHistory::default();
    let mut ys = Vec::with_capacity(save_at.len());
    let mut t = t_start;
    let mut y = y0.to_vec();
    let mut y_new = vec![T::zero(); n];
    let mut error = vec![T::zero(); n];
    let mut y_real = vec![0.0; n];
    let mut y_new_real = vec![0.0; n];
    let mut err_real = vec![0.0; n];
    ys.push(y.clone());

    let mut next = 1;
    let mut interval_steps = 0;
    while next < save_at.len() {
        if interval_steps >= options.max_steps {
            return Err(SolveError::MaxStepsExceeded {
                max_steps: options.max_steps,
                t,
            });
        }

        let target = save_at[next];
        let remaining = target - t;
        let (h, lands) = if dt >= remaining * (1.0 - 1e-10) {
            (remaining, true)
        } else {
            (dt, false)
        };

        stepper.trial_step(system, T::cst(t), &y, T::cst(h), &mut y_new, &mut error);
        stats.rhs_evaluations += stages;
        interval_steps += 1;

        for i in 0..n {
            y_real[i] = y[i].real();
            y_new_real[i] = y_new[i].real();
            err_real[i] = error[i].real();
        }
        let norm = controller.error_norm(&y_real, &y_new_real, &err_real);
        let accepted = norm <= 1.0;
        let factor = controller.factor(&mut history, norm, order, accepted);

        if accepted {
            stats.accepted_steps += 1;
            t = if lands { target } else { t + h };
            std::mem::swap(&mut y, &mut y_new);
            check_finite(t, &y)?;
            if lands {
                ys.push(y.clone());
                next += 1;
                interval_steps = 0;
            }
        } else {
            stats.rejected_steps += 1;
            log::trace!("rejected step at t = {t}: dt = {h:e}, error norm = {norm:e}");
        }

        // A step shortened to hit a save time does not shrink the next one.
        let mut proposal = h * factor;
        if accepted && lands {
            proposal = proposal.max(dt.min(h * controller.factor_max));
        }
        dt = controller.limit(proposal);
        let floor = controller.dt_min.max(16.0 * f64::EPSILON * t.abs().max(1.0));
        if dt < floor {
            return Err(SolveError::StepSizeUnderflow { dt, t });
        }
    }

    log::debug!(
        "adaptive solve finished: {} accepted, {} rejected, {} rhs evaluations",
        stats.accepted_steps,
        stats.rejected_steps,
        stats.rhs_evaluations
    );
    Ok(Solution {
        ts: save_at.to_vec(),
        ys,
        stats,
    })
}
