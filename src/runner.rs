//! The command line driver.
//!
//! `run_with_args` builds a synthetic population, wires up the standard sweep pipeline and a
//! compartment report, and runs it on the sequential controller (`--threads 1`) or on the
//! threaded one.
use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;

use crate::error::EpiError;
use crate::execution_stats::{print_execution_statistics, ExecutionStatistics};
use crate::log::{info, LevelFilter, LogSettings};
use crate::parameters::Parameters;
use crate::population::{Population, PopulationConfig, ToyPopulationFactory};
use crate::rand::SeedableRng;
use crate::random::SimRng;
use crate::report::CompartmentReporter;
use crate::simulation::{Simulation, ThreadedSimulation};
use crate::sweep::{
    HostProgressionSweep, HouseholdSweep, NewInfectionSweep, PlaceSweep, RandomSeedSweep,
    SpatialSweep,
};

/// Name of the compartment report inside `--output-dir`.
pub const COMPARTMENT_REPORT: &str = "compartments.csv";

/// Default cli arguments for the epiabm runner
#[derive(Parser, Debug)]
#[command(name = "epiabm", about = "Run a cell-structured epidemic simulation")]
pub struct BaseArgs {
    /// Random seed
    #[arg(short, long, default_value = "0")]
    pub random_seed: u64,

    /// Optional path to a JSON parameter file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Optional path to a JSON description of the synthetic population
    #[arg(short, long)]
    pub population: Option<PathBuf>,

    /// Directory for report output
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Number of timesteps to simulate
    #[arg(short, long, default_value = "60")]
    pub timesteps: u32,

    /// Worker threads; 1 runs the sequential controller
    #[arg(long, default_value = "1")]
    pub threads: usize,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long)]
    pub log_level: Option<LevelFilter>,

    /// Log level for one module, as `module=level`; may be repeated
    #[arg(long = "log-filter", value_parser = parse_module_filter)]
    pub log_filters: Vec<(String, LevelFilter)>,

    /// Show a progress bar over the timesteps
    #[arg(long)]
    pub progress: bool,

    /// Do not print execution statistics at the end of the run
    #[arg(long)]
    pub quiet: bool,
}

impl Default for BaseArgs {
    fn default() -> Self {
        BaseArgs {
            random_seed: 0,
            config: None,
            population: None,
            output_dir: PathBuf::from("."),
            timesteps: 60,
            threads: 1,
            log_level: None,
            log_filters: Vec::new(),
            progress: false,
            quiet: false,
        }
    }
}

/// The population used when no `--population` file is given: 16 cells of 1000 people.
#[must_use]
pub fn default_population_config() -> PopulationConfig {
    PopulationConfig {
        cells: 16,
        microcells_per_cell: 4,
        people_per_microcell: 250,
        max_household_size: 6,
        places: 20,
        place_groups: 2,
        place_probability: 0.3,
        age_proportions: Vec::new(),
    }
}

fn parse_module_filter(arg: &str) -> Result<(String, LevelFilter), String> {
    let (module, level) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected module=level, got {arg:?}"))?;
    let level = level
        .parse()
        .map_err(|_| format!("unknown log level {level:?}"))?;
    Ok((module.to_string(), level))
}

/// The logging the arguments ask for, or `None` to leave logging as it is.
fn log_settings(args: &BaseArgs) -> Option<LogSettings> {
    if args.log_level.is_none() && args.log_filters.is_empty() {
        return None;
    }
    let settings = LogSettings::new(args.log_level.unwrap_or(LevelFilter::Off));
    Some(
        args.log_filters
            .iter()
            .fold(settings, |settings, (module, level)| {
                settings.with_module_filter(module, *level)
            }),
    )
}

fn load_population_config(path: &Path) -> Result<PopulationConfig, EpiError> {
    info!("loading population description from {}", path.display());
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Parses the process arguments and runs. Invalid arguments exit the process with a usage
/// message.
///
/// # Errors
///
/// Returns an error if loading an input file or the run fails.
pub fn run() -> Result<ExecutionStatistics, EpiError> {
    run_with_args(&BaseArgs::parse())
}

/// Runs a simulation described by `args` and returns its execution statistics.
///
/// # Errors
///
/// Returns an error if a parameter or population file cannot be loaded, or if the run fails.
pub fn run_with_args(args: &BaseArgs) -> Result<ExecutionStatistics, EpiError> {
    if let Some(settings) = log_settings(args) {
        settings.install()?;
    }

    let parameters = match &args.config {
        Some(path) => Parameters::from_json_file(path)?,
        None => Parameters::default(),
    };
    let population_config = match &args.population {
        Some(path) => load_population_config(path)?,
        None => default_population_config(),
    };
    let mut rng = SimRng::seed_from_u64(args.random_seed);
    let population = ToyPopulationFactory::build(&population_config, &mut rng)?;
    let report = CompartmentReporter::new(args.output_dir.join(COMPARTMENT_REPORT));

    let statistics = if args.threads <= 1 {
        run_sequential(args, population, parameters, report)?
    } else {
        run_threaded(args, population, parameters, report)?
    };
    if !args.quiet {
        print_execution_statistics(&statistics);
    }
    Ok(statistics)
}

fn run_sequential(
    args: &BaseArgs,
    population: Population,
    parameters: Parameters,
    report: CompartmentReporter,
) -> Result<ExecutionStatistics, EpiError> {
    let mut simulation = Simulation::new(population, parameters, args.random_seed);
    simulation.add_sweep(RandomSeedSweep::new().until(1));
    simulation.add_sweep(HouseholdSweep::new());
    simulation.add_sweep(PlaceSweep::new());
    simulation.add_sweep(SpatialSweep::new());
    simulation.add_sweep(NewInfectionSweep::new());
    simulation.add_sweep(HostProgressionSweep::new());
    simulation.add_reporter(report);
    if args.progress {
        simulation.enable_progress_bar();
    }
    simulation.simulate(args.timesteps)?;
    simulation
        .execution_statistics()
        .cloned()
        .ok_or_else(|| EpiError::EpiError("run finished without statistics".to_string()))
}

fn run_threaded(
    args: &BaseArgs,
    population: Population,
    parameters: Parameters,
    report: CompartmentReporter,
) -> Result<ExecutionStatistics, EpiError> {
    let mut simulation =
        ThreadedSimulation::new(population, parameters, args.random_seed, args.threads)?;
    simulation.add_sweep_to_group(0, RandomSeedSweep::new().until(1))?;
    simulation.add_sweep_to_group(1, HouseholdSweep::new())?;
    simulation.add_sweep_to_group(1, PlaceSweep::new())?;
    simulation.add_sweep_to_group(1, SpatialSweep::new())?;
    simulation.add_sweep_to_group(2, NewInfectionSweep::new())?;
    simulation.add_sweep_to_group(3, HostProgressionSweep::new())?;
    simulation.add_reporter(report);
    if args.progress {
        simulation.enable_progress_bar();
    }
    simulation.simulate(args.timesteps)?;
    simulation
        .execution_statistics()
        .cloned()
        .ok_or_else(|| EpiError::EpiError("run finished without statistics".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::InfectionStatus;
    use crate::report::CompartmentRow;
    use serde_json::json;
    use strum::EnumCount;
    use tempfile::tempdir;

    fn small_population(dir: &Path) -> PathBuf {
        let path = dir.join("population.json");
        let contents = json!({
            "cells": 4,
            "microcells_per_cell": 2,
            "people_per_microcell": 30,
            "max_household_size": 4,
            "places": 2,
            "place_probability": 0.5
        });
        fs::write(&path, contents.to_string()).unwrap();
        path
    }

    fn read_report(dir: &Path) -> Vec<CompartmentRow> {
        let mut reader = csv::Reader::from_path(dir.join(COMPARTMENT_REPORT)).unwrap();
        reader.deserialize().map(Result::unwrap).collect()
    }

    #[test]
    fn parses_command_line() {
        let args = BaseArgs::try_parse_from([
            "epiabm",
            "--random-seed",
            "7",
            "--timesteps",
            "5",
            "--threads",
            "3",
            "--log-level",
            "debug",
            "--log-filter",
            "epiabm::sweep=trace",
            "-o",
            "out",
        ])
        .unwrap();
        assert_eq!(args.random_seed, 7);
        assert_eq!(args.timesteps, 5);
        assert_eq!(args.threads, 3);
        assert_eq!(args.log_level, Some(LevelFilter::Debug));
        let settings = log_settings(&args).unwrap();
        assert_eq!(settings.level(), LevelFilter::Debug);
        assert_eq!(
            settings.module_filter("epiabm::sweep"),
            Some(LevelFilter::Trace)
        );
        assert_eq!(args.output_dir, PathBuf::from("out"));
        assert!(args.config.is_none());
    }

    #[test]
    fn sequential_run_writes_report() {
        let dir = tempdir().unwrap();
        let args = BaseArgs {
            population: Some(small_population(dir.path())),
            output_dir: dir.path().join("output"),
            timesteps: 4,
            quiet: true,
            ..BaseArgs::default()
        };
        let statistics = run_with_args(&args).unwrap();
        assert_eq!(statistics.population, 240);
        assert_eq!(statistics.timesteps, 4);

        let rows = read_report(&args.output_dir);
        assert_eq!(rows.len(), 5 * InfectionStatus::COUNT);
        let total: usize = rows
            .iter()
            .filter(|row| row.timestep == 4)
            .map(|row| row.count)
            .sum();
        assert_eq!(total, 240);
    }

    #[test]
    fn threaded_run_is_reproducible() {
        let dir = tempdir().unwrap();
        let population = small_population(dir.path());
        let run_once = |name: &str| {
            let args = BaseArgs {
                random_seed: 3,
                population: Some(population.clone()),
                output_dir: dir.path().join(name),
                timesteps: 8,
                threads: 2,
                quiet: true,
                ..BaseArgs::default()
            };
            run_with_args(&args).unwrap();
            read_report(&args.output_dir)
        };
        assert_eq!(run_once("first"), run_once("second"));
    }

    #[test]
    fn missing_parameter_file_is_an_error() {
        let dir = tempdir().unwrap();
        let args = BaseArgs {
            config: Some(dir.path().join("missing.json")),
            population: Some(small_population(dir.path())),
            output_dir: dir.path().to_path_buf(),
            quiet: true,
            ..BaseArgs::default()
        };
        assert!(matches!(run_with_args(&args), Err(EpiError::IoError(_))));
    }

    #[test]
    fn malformed_population_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("population.json");
        fs::write(&path, "{ \"cells\": \"many\" }").unwrap();
        let args = BaseArgs {
            population: Some(path),
            output_dir: dir.path().to_path_buf(),
            quiet: true,
            ..BaseArgs::default()
        };
        assert!(matches!(run_with_args(&args), Err(EpiError::JsonError(_))));
    }

    #[test]
    fn logging_is_left_alone_unless_asked() {
        assert!(log_settings(&BaseArgs::default()).is_none());
        let args = BaseArgs {
            log_filters: vec![("epiabm::simulation".to_string(), LevelFilter::Debug)],
            ..BaseArgs::default()
        };
        let settings = log_settings(&args).unwrap();
        assert_eq!(settings.level(), LevelFilter::Off);
        assert_eq!(
            settings.module_filter("epiabm::simulation"),
            Some(LevelFilter::Debug)
        );
    }

    #[test]
    fn malformed_log_filter_is_rejected() {
        assert!(BaseArgs::try_parse_from(["epiabm", "--log-filter", "epiabm::sweep"]).is_err());
        assert!(BaseArgs::try_parse_from(["epiabm", "--log-filter", "epiabm=loud"]).is_err());
    }
}
