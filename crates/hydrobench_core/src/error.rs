use thiserror::Error;

/// Failures raised while integrating the model or solving a store's implicit
/// update. Converted into `anyhow::Error` at API boundaries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveError {
    #[error("maximum number of solver steps ({max_steps}) reached at t = {t}")]
    MaxStepsExceeded { max_steps: usize, t: f64 },

    #[error("step size {dt:e} fell below the minimum at t = {t}")]
    StepSizeUnderflow { dt: f64, t: f64 },

    #[error("state became non-finite at t = {t}")]
    NonFiniteState { t: f64 },

    #[error("invalid save-at grid: {0}")]
    InvalidSaveAt(String),

    #[error("root not bracketed: f({lower}) = {f_lower}, f({upper}) = {f_upper}")]
    RootNotBracketed {
        lower: f64,
        upper: f64,
        f_lower: f64,
        f_upper: f64,
    },

    #[error("root finder did not converge after {iterations} iterations (|f| = {residual:e})")]
    RootNotConverged { iterations: usize, residual: f64 },
}
