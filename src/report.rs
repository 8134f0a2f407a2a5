use std::ffi::OsStr;
use std::fs::{create_dir_all, File};
use std::path::{Path, PathBuf};

use csv::Writer;
use serde_derive::{Deserialize, Serialize};

use crate::error::EpiError;
use crate::log::{debug, trace};
use crate::population::{InfectionStatus, Population};

/// Observes the population after every timestep.
///
/// The controller calls `setup` once before the first timestep, `report` at timestep 0
/// (initial state) and after each simulated timestep, and `teardown` once at the end.
pub trait Reporter {
    fn setup(&mut self, _population: &Population) -> Result<(), EpiError> {
        Ok(())
    }

    fn report(&mut self, population: &Population, timestep: u32) -> Result<(), EpiError>;

    fn teardown(&mut self) -> Result<(), EpiError> {
        Ok(())
    }
}

/// One row of the compartment report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompartmentRow {
    pub timestep: u32,
    pub status: InfectionStatus,
    pub count: usize,
}

// Creates the file and all parent directories if they do not exist.
fn create_csv(path: &Path) -> Result<File, EpiError> {
    match path.extension().and_then(OsStr::to_str) {
        Some("csv") => {
            if let Some(parent) = path.parent() {
                create_dir_all(parent)?;
            }
            Ok(File::create(path)?)
        }
        _ => Err(EpiError::ConfigError(format!(
            "report output files must be CSVs, got {}",
            path.display()
        ))),
    }
}

/// Writes the population-wide count of every compartment at every timestep to a CSV file.
pub struct CompartmentReporter {
    path: PathBuf,
    writer: Option<Writer<File>>,
}

impl CompartmentReporter {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CompartmentReporter {
            path: path.into(),
            writer: None,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Reporter for CompartmentReporter {
    fn setup(&mut self, _population: &Population) -> Result<(), EpiError> {
        debug!("writing compartment report to {}", self.path.display());
        self.writer = Some(Writer::from_writer(create_csv(&self.path)?));
        Ok(())
    }

    fn report(&mut self, population: &Population, timestep: u32) -> Result<(), EpiError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(EpiError::EpiError(format!(
                "compartment report {} written before setup",
                self.path.display()
            )));
        };
        let totals = population.compartment_totals();
        for (status, count) in totals.iter() {
            writer.serialize(CompartmentRow {
                timestep,
                status,
                count,
            })?;
        }
        trace!("reported timestep {timestep}");
        Ok(())
    }

    fn teardown(&mut self) -> Result<(), EpiError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}
