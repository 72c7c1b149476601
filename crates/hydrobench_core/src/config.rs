//! TOML run configuration for the benchmark driver.

use crate::benchmark::Variant;
use crate::controller::PidController;
use crate::elements::{Gr4jParameters, Pegasus};
use crate::model::{Parameters, State};
use crate::solvers::FixedScheme;
use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    pub data_path: PathBuf,
    /// Rows of forcing to use; each variant has its own default.
    pub data_length: Option<usize>,
    pub variants: Vec<Variant>,
    /// Initial step of the adaptive variants; `None` keeps the variant
    /// default.
    pub dt0: Option<f64>,
    /// Step budget of the adaptive variants between two save times.
    pub max_steps: usize,
    /// Tableau of the `rk4` variant.
    pub rk4_scheme: FixedScheme,
    /// Number of timed repetitions; the median is reported.
    pub repeats: usize,
    /// Also evaluate the loss gradient for differentiable variants.
    pub gradient: bool,
    /// Where to write the daily states and fluxes of the implicit-euler run.
    pub internals_csv: Option<PathBuf>,
    pub parameters: Parameters,
    pub initial_state: State,
    /// Replaces the variant's default controller for the adaptive variants.
    pub controller: Option<PidController>,
    pub root_finder: Pegasus,
    pub gr4j: Option<Gr4jConfig>,
    pub logging: Logging,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/hydro.csv"),
            data_length: None,
            variants: Variant::ALL.to_vec(),
            parameters: Parameters::default(),
            initial_state: State::default(),
            dt0: None,
            max_steps: 10_000,
            rk4_scheme: FixedScheme::default(),
            repeats: 7,
            gradient: false,
            internals_csv: None,
            controller: None,
            root_finder: Pegasus::default(),
            gr4j: None,
            logging: Logging::default(),
        }
    }
}

/// Settings of the GR4J element run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Gr4jConfig {
    pub data_path: PathBuf,
    pub data_length: Option<usize>,
    /// Where to write the daily internals as CSV.
    pub internals_csv: Option<PathBuf>,
    pub parameters: Gr4jParameters,
}

impl Default for Gr4jConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/gr4j/sample.csv"),
            data_length: Some(3600),
            internals_csv: None,
            parameters: Gr4jParameters::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Logging {
    /// Verbosity of logging
    pub level: usize,
}

impl Logging {
    /// Converts a logging level to a `log::LevelFilter`.
    pub fn filter(&self) -> log::LevelFilter {
        match self.level {
            0 => log::LevelFilter::Off,
            1 => log::LevelFilter::Error,
            2 => log::LevelFilter::Warn,
            3 => log::LevelFilter::Info,
            4 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

impl Default for Logging {
    fn default() -> Self {
        Logging { level: 2 }
    }
}

/// Loads a config from a toml file.
pub fn import_from_toml<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let string = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&string).with_context(|| format!("Failed to parse config file {}", path.display()))
}

/// Writes a config to a toml file.
pub fn export_to_toml<T: Serialize>(path: impl AsRef<Path>, config: &T) -> Result<()> {
    let string = toml::to_string_pretty(config)?;
    std::fs::write(path, string)?;
    Ok(())
}
