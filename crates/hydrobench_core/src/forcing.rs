//! Daily forcing series and their CSV loaders.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

/// Daily forcing for the ExpHydro model plus the observed streamflow used as
/// the calibration target.
///
/// All arrays have the same length and contain no NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct Forcing {
    /// Mean air temperature (°C).
    pub temp: Vec<f64>,
    /// Daylength (fraction of a day).
    pub lday: Vec<f64>,
    /// Precipitation (mm/day).
    pub prcp: Vec<f64>,
    /// Observed streamflow (mm/day).
    pub observed_flow: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct ExpHydroRecord {
    #[serde(rename = "tmean(C)")]
    temp: f64,
    #[serde(rename = "dayl(day)")]
    lday: f64,
    #[serde(rename = "prcp(mm/day)")]
    prcp: f64,
    #[serde(rename = "flow(mm)")]
    flow: f64,
}

impl Forcing {
    /// Builds forcing from raw columns, validating lengths and values.
    pub fn new(
        temp: Vec<f64>,
        lday: Vec<f64>,
        prcp: Vec<f64>,
        observed_flow: Vec<f64>,
    ) -> Result<Self> {
        let n = temp.len();
        if n == 0 {
            bail!("Forcing series are empty.");
        }
        for (name, series) in [("lday", &lday), ("prcp", &prcp), ("flow", &observed_flow)] {
            if series.len() != n {
                bail!(
                    "{} length {} does not match temp length {}",
                    name,
                    series.len(),
                    n
                );
            }
        }
        for (name, series) in [
            ("temp", &temp),
            ("lday", &lday),
            ("prcp", &prcp),
            ("flow", &observed_flow),
        ] {
            if let Some(idx) = series.iter().position(|v| v.is_nan()) {
                bail!("{} contains NaN at row {}", name, idx);
            }
        }
        Ok(Self {
            temp,
            lday,
            prcp,
            observed_flow,
        })
    }

    /// Reads an ExpHydro forcing CSV, keeping at most `data_length` rows.
    pub fn from_path(path: impl AsRef<Path>, data_length: Option<usize>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open forcing file {}", path.display()))?;
        Self::from_reader(file, data_length)
            .with_context(|| format!("Failed to load forcing from {}", path.display()))
    }

    /// Reads ExpHydro forcing from any CSV source with columns `tmean(C)`,
    /// `dayl(day)`, `prcp(mm/day)` and `flow(mm)`. Extra columns are ignored.
    pub fn from_reader<R: Read>(reader: R, data_length: Option<usize>) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(reader);
        let limit = data_length.unwrap_or(usize::MAX);

        let mut temp = Vec::new();
        let mut lday = Vec::new();
        let mut prcp = Vec::new();
        let mut flow = Vec::new();
        for (row, record) in reader.deserialize::<ExpHydroRecord>().take(limit).enumerate() {
            let record = record.with_context(|| format!("Malformed forcing row {}", row + 1))?;
            temp.push(record.temp);
            lday.push(record.lday);
            prcp.push(record.prcp);
            flow.push(record.flow);
        }

        Self::new(temp, lday, prcp, flow)
    }

    /// Number of daily timesteps.
    pub fn len(&self) -> usize {
        self.temp.len()
    }

    /// Returns `true` if there are no timesteps.
    pub fn is_empty(&self) -> bool {
        self.temp.is_empty()
    }
}

/// Daily precipitation and potential evapotranspiration driving the GR4J unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Gr4jForcing {
    pub precip: Vec<f64>,
    pub pet: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct Gr4jRecord {
    prec: f64,
    pet: f64,
}

impl Gr4jForcing {
    pub fn new(precip: Vec<f64>, pet: Vec<f64>) -> Result<Self> {
        if precip.is_empty() {
            bail!("precip array is empty");
        }
        if precip.len() != pet.len() {
            bail!(
                "precip length {} does not match pet length {}",
                precip.len(),
                pet.len()
            );
        }
        if precip.iter().chain(pet.iter()).any(|v| v.is_nan()) {
            bail!("GR4J forcing contains NaN values");
        }
        Ok(Self { precip, pet })
    }

    pub fn from_path(path: impl AsRef<Path>, data_length: Option<usize>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open forcing file {}", path.display()))?;
        Self::from_reader(file, data_length)
            .with_context(|| format!("Failed to load GR4J forcing from {}", path.display()))
    }

    /// Reads `prec` and `pet` columns.
    pub fn from_reader<R: Read>(reader: R, data_length: Option<usize>) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(reader);
        let mut precip = Vec::new();
        let mut pet = Vec::new();
        for (row, record) in reader
            .deserialize::<Gr4jRecord>()
            .take(data_length.unwrap_or(usize::MAX))
            .enumerate()
        {
            let record = record.with_context(|| format!("Malformed forcing row {}", row + 1))?;
            precip.push(record.prec);
            pet.push(record.pet);
        }
        Self::new(precip, pet)
    }

    pub fn len(&self) -> usize {
        self.precip.len()
    }

    pub fn is_empty(&self) -> bool {
        self.precip.is_empty()
    }
}
