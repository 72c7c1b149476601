//! Timed runs of each solution strategy on shared forcing.

use crate::config::{BenchmarkConfig, Gr4jConfig};
use crate::controller::PidController;
use crate::elements::{ExpHydroInternals, ExpHydroUnit, Gr4jInternals, Gr4jUnit, ImplicitEuler, Pegasus};
use crate::forcing::{Forcing, Gr4jForcing};
use crate::integrate::{AdaptiveOptions, SolverStats};
use crate::loss::{loss_gradient, FlowProblem};
use crate::metrics::{kge, mse, nse, rmse};
use crate::model::Parameters;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// A way of solving the ExpHydro model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    /// Tsitouras 5(4) with PID control on cubic Hermite forcing.
    Tsit5,
    /// Dormand-Prince 5(4) with integral control on linear forcing.
    Rk45,
    /// Fixed-step 3/8-rule RK4 on natural-spline forcing.
    Rk4,
    /// Snow and soil stores advanced by implicit Euler on daily forcing.
    ImplicitEuler,
}

impl Variant {
    pub const ALL: [Variant; 4] = [
        Variant::Tsit5,
        Variant::Rk45,
        Variant::Rk4,
        Variant::ImplicitEuler,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Variant::Tsit5 => "tsit5",
            Variant::Rk45 => "rk45",
            Variant::Rk4 => "rk4",
            Variant::ImplicitEuler => "implicit-euler",
        }
    }

    /// Time assigned to the first forcing day.
    pub fn time_origin(self) -> f64 {
        match self {
            Variant::Rk45 => 0.0,
            _ => 1.0,
        }
    }

    /// Forcing rows used when the configuration does not say.
    pub fn default_data_length(self) -> usize {
        match self {
            Variant::Tsit5 => 10_000,
            _ => 1_000,
        }
    }

    pub fn default_controller(self) -> PidController {
        match self {
            Variant::Rk45 => PidController::integral(1e-3, 1e-3),
            _ => PidController::new(1e-3, 1e-3),
        }
    }

    pub fn default_dt0(self) -> Option<f64> {
        match self {
            Variant::Tsit5 => Some(1.0),
            _ => None,
        }
    }

    /// Whether the loss can be differentiated with respect to the parameters.
    pub fn is_differentiable(self) -> bool {
        !matches!(self, Variant::ImplicitEuler)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Variant {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tsit5" => Ok(Variant::Tsit5),
            "rk45" | "dopri5" => Ok(Variant::Rk45),
            "rk4" => Ok(Variant::Rk4),
            "implicit-euler" | "implicit_euler" => Ok(Variant::ImplicitEuler),
            other => bail!(
                "Unknown variant '{other}'. Expected one of: tsit5, rk45, rk4, implicit-euler."
            ),
        }
    }
}

/// Fit of one variant's simulated flow against the observations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub variant: Variant,
    pub data_length: usize,
    pub loss: f64,
    pub rmse: f64,
    pub nse: f64,
    pub kge: f64,
    pub stats: SolverStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gradient: Option<Parameters>,
}

/// Outcome of one benchmarked variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkReport {
    #[serde(flatten)]
    pub evaluation: Evaluation,
    /// Median wall time of a forward solve plus loss evaluation.
    pub median_seconds: f64,
}

/// Outcome of the GR4J element run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gr4jReport {
    pub data_length: usize,
    pub median_seconds: f64,
    #[serde(skip)]
    pub internals: Gr4jInternals,
}

/// Runs `f` `repeats` times and returns the median duration and the last
/// result.
pub fn median_time<T>(repeats: usize, mut f: impl FnMut() -> Result<T>) -> Result<(Duration, T)> {
    let repeats = repeats.max(1);
    let mut times = Vec::with_capacity(repeats);
    let mut last = None;
    for _ in 0..repeats {
        let start = Instant::now();
        let value = f()?;
        times.push(start.elapsed());
        last = Some(value);
    }
    times.sort();
    match last {
        Some(value) => Ok((times[repeats / 2], value)),
        None => bail!("No timed runs were performed."),
    }
}

impl BenchmarkConfig {
    pub fn data_length_for(&self, variant: Variant) -> usize {
        self.data_length
            .unwrap_or_else(|| variant.default_data_length())
    }

    /// Solver settings for `variant` on `forcing`, with the configured
    /// overrides applied.
    pub fn problem<'a>(&self, forcing: &'a Forcing, variant: Variant) -> FlowProblem<'a> {
        let mut problem = FlowProblem::new(forcing, variant);
        problem.initial = self.initial_state;
        problem.root_finder = self.root_finder;
        problem.scheme = self.rk4_scheme;
        if let Some(controller) = self.controller {
            problem.controller = controller;
        }
        problem.options = AdaptiveOptions {
            dt0: self.dt0.or(problem.options.dt0),
            max_steps: self.max_steps,
        };
        problem
    }
}

/// Solves once and scores the flow, without timing.
pub fn evaluate_variant(config: &BenchmarkConfig, forcing: &Forcing, variant: Variant) -> Result<Evaluation> {
    let problem = config.problem(forcing, variant);
    let params = config.parameters;
    let run = problem.simulate(&params)?;
    let flow = run.flow();

    let gradient = if config.gradient && variant.is_differentiable() {
        let (_, grad) = loss_gradient(&problem, &params)?;
        Some(grad)
    } else {
        None
    };

    Ok(Evaluation {
        variant,
        data_length: forcing.len(),
        loss: mse(&forcing.observed_flow, &flow),
        rmse: rmse(&forcing.observed_flow, &flow),
        nse: nse(&forcing.observed_flow, &flow),
        kge: kge(&forcing.observed_flow, &flow),
        stats: run.stats,
        gradient,
    })
}

/// Benchmarks one variant on already loaded forcing.
pub fn run_variant(config: &BenchmarkConfig, forcing: &Forcing, variant: Variant) -> Result<BenchmarkReport> {
    let problem = config.problem(forcing, variant);
    let params = config.parameters;

    // Warmup
    let evaluation = evaluate_variant(config, forcing, variant)?;

    let (elapsed, _) = median_time(config.repeats, || {
        let run = problem.simulate(&params)?;
        Ok(std::hint::black_box(mse(&forcing.observed_flow, &run.flow())))
    })?;

    log::info!(
        "{variant}: loss {:.4}, median {:.4} s over {} runs",
        evaluation.loss,
        elapsed.as_secs_f64(),
        config.repeats.max(1)
    );

    Ok(BenchmarkReport {
        evaluation,
        median_seconds: elapsed.as_secs_f64(),
    })
}

/// Loads the forcing for each configured variant and benchmarks it.
pub fn run_all(config: &BenchmarkConfig) -> Result<Vec<BenchmarkReport>> {
    let mut reports = Vec::with_capacity(config.variants.len());
    for &variant in &config.variants {
        let forcing = Forcing::from_path(&config.data_path, Some(config.data_length_for(variant)))?;
        let report = run_variant(config, &forcing, variant)
            .with_context(|| format!("Benchmark of {variant} failed"))?;
        reports.push(report);
    }
    Ok(reports)
}

/// Runs the GR4J element unit on already loaded forcing.
pub fn run_gr4j(
    config: &Gr4jConfig,
    forcing: &Gr4jForcing,
    root_finder: Pegasus,
    repeats: usize,
) -> Result<Gr4jReport> {
    let unit = Gr4jUnit::new(&config.parameters);
    let solver = ImplicitEuler::new(root_finder);
    let (elapsed, internals) = median_time(repeats, || unit.run(&solver, forcing))?;
    log::info!("gr4j: median {:.4} s", elapsed.as_secs_f64());
    Ok(Gr4jReport {
        data_length: forcing.len(),
        median_seconds: elapsed.as_secs_f64(),
        internals,
    })
}

/// Daily states and fluxes of the implicit-euler ExpHydro unit with the
/// configured parameters and initial state.
pub fn run_exphydro_internals(config: &BenchmarkConfig, forcing: &Forcing) -> Result<ExpHydroInternals> {
    let unit = ExpHydroUnit::new(config.parameters, config.initial_state);
    unit.run(&ImplicitEuler::new(config.root_finder), forcing)
}

fn create_csv(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

/// Writes the GR4J internals to a CSV file.
pub fn write_gr4j_internals(path: impl AsRef<Path>, internals: &Gr4jInternals) -> Result<()> {
    let path = path.as_ref();
    internals
        .write_csv(create_csv(path)?)
        .with_context(|| format!("Failed to write GR4J internals to {}", path.display()))
}

/// Writes the ExpHydro unit internals to a CSV file.
pub fn write_exphydro_internals(path: impl AsRef<Path>, internals: &ExpHydroInternals) -> Result<()> {
    let path = path.as_ref();
    internals
        .write_csv(create_csv(path)?)
        .with_context(|| format!("Failed to write ExpHydro internals to {}", path.display()))
}
