pub mod autodiff;
pub mod benchmark;
pub mod config;
pub mod controller;
pub mod elements;
pub mod error;
pub mod forcing;
pub mod integrate;
pub mod interpolation;
pub mod loss;
pub mod metrics;
pub mod model;
pub mod solvers;
/// The `hydrobench_core` crate runs the ExpHydro snow/soil bucket model under
/// several solution strategies and compares their cost and fit.
/// The model is written once, generic over the scalar type, so the same code
/// runs on `f64` for timing and on Dual numbers for parameter gradients.
///
/// Key components:
/// - **Traits**: `Scalar` (numeric type abstraction), `DynamicalSystem` (ODEs), `Steppable` / `EmbeddedStepper` (Solvers).
/// - **Solvers**: Explicit Runge-Kutta integrators (RK4, 3/8-rule RK4, Tsit5, Dopri5) driven by `integrate` with a PID step-size controller.
/// - **Elements**: Implicit-Euler stores with a Pegasus root finder, unit hydrographs, and the ExpHydro / GR4J units built from them.
/// - **Autodiff**: Dual number implementation and forward-mode gradients of the loss.
/// - **Benchmark**: Variant selection, TOML configuration, timing and reports.
pub mod traits;
