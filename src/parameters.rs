//! Simulation parameters.
//!
//! Parameters are read from a JSON file by `Parameters::from_json_file`, checked by
//! `Parameters::validate`, and then shared read-only (behind an `Arc`) by every sweep. Any
//! field missing from the file takes its value from `Parameters::default()`, which describes
//! a small, fully specified disease model that is handy for tests and demos.
//!
//! ```json
//! {
//!     "timesteps_per_day": 1,
//!     "household_transmission": 0.1,
//!     "place_transmission": 0.2,
//!     "spatial_transmission": 0.05,
//!     "host_progression": {
//!         "use_ages": false,
//!         "transitions": [
//!             { "from": "Exposed", "to": "InfectMild", "probabilities": [1.0] }
//!         ]
//!     }
//! }
//! ```

use std::fs;
use std::path::Path;

use serde_derive::Deserialize;
use strum::IntoEnumIterator;

use crate::error::EpiError;
use crate::log::debug;
use crate::numeric::sums_to_one;
use crate::population::InfectionStatus;
use crate::random::InverseCdf;

/// The probability of moving from `from` to `to`, one entry per age group (or a single entry
/// when age stratification is disabled).
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct TransitionProbabilities {
    pub from: InfectionStatus,
    pub to: InfectionStatus,
    pub probabilities: Vec<f64>,
}

/// The delay distribution for the transition `from -> to`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct TransitionTime {
    pub from: InfectionStatus,
    pub to: InfectionStatus,
    pub icdf: InverseCdf,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct HostProgressionParams {
    /// Use one transition matrix per age group instead of a population-weighted average.
    pub use_ages: bool,
    /// Relative sizes of the age groups, used to average age-stratified probabilities.
    pub age_proportions: Vec<f64>,
    pub transitions: Vec<TransitionProbabilities>,
    pub transition_times: Vec<TransitionTime>,
    /// Delay from exposure to the first post-exposure status.
    pub latent_period: InverseCdf,
    /// Relative infectiousness over the course of an infection, sampled at evenly spaced
    /// points from infection start to the mean asymptomatic recovery time.
    pub infectiousness_profile: Vec<f64>,
    /// Shape of the mean-one gamma distribution for a person's initial infectiousness.
    pub infectiousness_gamma_shape: f64,
    pub asymptomatic_infectiousness: f64,
    pub symptomatic_infectiousness: f64,
    /// Length of the precomputed infectiousness profile in timesteps.
    pub max_infectious_steps: usize,
}

impl Default for HostProgressionParams {
    fn default() -> Self {
        use InfectionStatus::*;

        let transition = |from, to, p: f64| TransitionProbabilities {
            from,
            to,
            probabilities: vec![p],
        };
        let time = |from, to, mean: f64| TransitionTime {
            from,
            to,
            icdf: InverseCdf::constant(mean),
        };

        HostProgressionParams {
            use_ages: false,
            age_proportions: Vec::new(),
            transitions: vec![
                transition(Exposed, InfectASympt, 0.4),
                transition(Exposed, InfectMild, 0.6),
                transition(InfectASympt, Recovered, 1.0),
                transition(InfectMild, Recovered, 0.9),
                transition(InfectMild, InfectGP, 0.1),
                transition(InfectGP, Recovered, 0.8),
                transition(InfectGP, InfectHosp, 0.2),
                transition(InfectHosp, Recovered, 0.7),
                transition(InfectHosp, InfectICU, 0.2),
                transition(InfectHosp, Dead, 0.1),
                transition(InfectICU, InfectICURecov, 0.6),
                transition(InfectICU, Dead, 0.4),
                transition(InfectICURecov, Recovered, 1.0),
            ],
            transition_times: vec![
                time(Exposed, InfectASympt, 1.0),
                time(Exposed, InfectMild, 1.0),
                time(InfectASympt, Recovered, 5.0),
                time(InfectMild, Recovered, 5.0),
                time(InfectMild, InfectGP, 2.0),
                time(InfectGP, Recovered, 5.0),
                time(InfectGP, InfectHosp, 3.0),
                time(InfectHosp, Recovered, 8.0),
                time(InfectHosp, InfectICU, 2.0),
                time(InfectHosp, Dead, 6.0),
                time(InfectICU, InfectICURecov, 10.0),
                time(InfectICU, Dead, 8.0),
                time(InfectICURecov, Recovered, 5.0),
            ],
            latent_period: InverseCdf::constant(4.0),
            infectiousness_profile: vec![
                0.49, 0.82, 1.0, 1.06, 1.05, 1.0, 0.93, 0.85, 0.77, 0.69, 0.61, 0.53, 0.46, 0.39,
                0.33, 0.27, 0.22, 0.17, 0.12, 0.08, 0.0,
            ],
            infectiousness_gamma_shape: 4.0,
            asymptomatic_infectiousness: 0.5,
            symptomatic_infectiousness: 1.0,
            max_infectious_steps: 2550,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Parameters {
    pub timesteps_per_day: u32,
    pub household_transmission: f64,
    pub place_transmission: f64,
    pub spatial_transmission: f64,
    /// Scales the expected number of spatial infection attempts per infector.
    pub basic_reproduction_number: f64,
    /// Cells farther apart than this are never spatial infection targets. Zero means no limit.
    pub infection_radius: f64,
    /// The random seed sweep exposes each susceptible person with probability
    /// `1 / seed_per_n_people`.
    pub seed_per_n_people: u64,
    pub host_progression: HostProgressionParams,
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            timesteps_per_day: 1,
            household_transmission: 0.1,
            place_transmission: 0.2,
            spatial_transmission: 0.05,
            basic_reproduction_number: 1.0,
            infection_radius: 0.0,
            seed_per_n_people: 100,
            host_progression: HostProgressionParams::default(),
        }
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<(), EpiError> {
    if value.is_nan() || value < 0.0 {
        return Err(EpiError::ConfigError(format!(
            "{name} must be non-negative, got {value}"
        )));
    }
    Ok(())
}

impl Parameters {
    /// Loads and validates parameters from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON for `Parameters` (this
    /// includes malformed inverse-CDF tables), or fails `validate`.
    pub fn from_json_file(path: &Path) -> Result<Parameters, EpiError> {
        debug!("loading parameters from {}", path.display());
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Parses and validates parameters from a JSON string.
    ///
    /// # Errors
    ///
    /// See `from_json_file`.
    pub fn from_json_str(contents: &str) -> Result<Parameters, EpiError> {
        let parameters: Parameters = serde_json::from_str(contents)?;
        parameters.validate()?;
        Ok(parameters)
    }

    /// Checks the consistency of the parameters.
    ///
    /// # Errors
    ///
    /// Returns `EpiError::ConfigError` describing the first problem found.
    pub fn validate(&self) -> Result<(), EpiError> {
        if self.timesteps_per_day == 0 {
            return Err(EpiError::ConfigError(
                "timesteps_per_day must be positive".to_string(),
            ));
        }
        check_non_negative("household_transmission", self.household_transmission)?;
        check_non_negative("place_transmission", self.place_transmission)?;
        check_non_negative("spatial_transmission", self.spatial_transmission)?;
        check_non_negative("basic_reproduction_number", self.basic_reproduction_number)?;
        check_non_negative("infection_radius", self.infection_radius)?;
        if self.seed_per_n_people == 0 {
            return Err(EpiError::ConfigError(
                "seed_per_n_people must be positive".to_string(),
            ));
        }

        let hp = &self.host_progression;
        for weight in &hp.age_proportions {
            check_non_negative("age proportion", *weight)?;
        }
        if hp.use_ages && hp.age_proportions.is_empty() {
            return Err(EpiError::ConfigError(
                "age-stratified transitions need age_proportions".to_string(),
            ));
        }
        for transition in &hp.transitions {
            let n = transition.probabilities.len();
            let expected_ok = if hp.use_ages {
                n == hp.age_proportions.len()
            } else {
                n == 1 || n == hp.age_proportions.len()
            };
            if !expected_ok {
                return Err(EpiError::ConfigError(format!(
                    "transition {} -> {} has {n} probabilities, expected {}",
                    transition.from,
                    transition.to,
                    if hp.use_ages {
                        hp.age_proportions.len().to_string()
                    } else {
                        format!("1 or {}", hp.age_proportions.len())
                    }
                )));
            }
            if let Some(p) = transition
                .probabilities
                .iter()
                .find(|p| !(0.0..=1.0).contains(*p))
            {
                return Err(EpiError::ConfigError(format!(
                    "transition {} -> {} has probability {p} outside [0, 1]",
                    transition.from, transition.to
                )));
            }
            if transition.from.is_terminal() && transition.from != transition.to {
                return Err(EpiError::ConfigError(format!(
                    "{} is terminal and cannot transition to {}",
                    transition.from, transition.to
                )));
            }
        }
        for from in InfectionStatus::iter() {
            let rows: Vec<&[f64]> = hp
                .transitions
                .iter()
                .filter(|t| t.from == from)
                .map(|t| t.probabilities.as_slice())
                .collect();
            let columns = rows.iter().map(|row| row.len()).max().unwrap_or(0);
            for column in 0..columns {
                // A single probability applies to every age group
                let weights = rows
                    .iter()
                    .filter_map(|row| row.get(column).or(row.last()).copied());
                if !sums_to_one(weights) {
                    return Err(EpiError::ConfigError(format!(
                        "transition probabilities out of {from} do not sum to one for age \
                         group {column}"
                    )));
                }
            }
        }
        if hp.infectiousness_profile.len() < 2 {
            return Err(EpiError::ConfigError(
                "infectiousness_profile needs at least two points".to_string(),
            ));
        }
        for value in &hp.infectiousness_profile {
            check_non_negative("infectiousness profile value", *value)?;
        }
        if hp.infectiousness_gamma_shape.is_nan() || hp.infectiousness_gamma_shape <= 0.0 {
            return Err(EpiError::ConfigError(format!(
                "infectiousness_gamma_shape must be positive, got {}",
                hp.infectiousness_gamma_shape
            )));
        }
        check_non_negative("asymptomatic_infectiousness", hp.asymptomatic_infectiousness)?;
        check_non_negative("symptomatic_infectiousness", hp.symptomatic_infectiousness)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::INVERSE_CDF_RESOLUTION;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_validate() {
        Parameters::default().validate().unwrap();
    }

    #[test]
    fn partial_json_fills_defaults() {
        let parameters = Parameters::from_json_str(
            r#"{ "timesteps_per_day": 4, "household_transmission": 0.3 }"#,
        )
        .unwrap();
        assert_eq!(parameters.timesteps_per_day, 4);
        assert_eq!(parameters.household_transmission, 0.3);
        assert_eq!(parameters.place_transmission, 0.2);
        assert_eq!(parameters.host_progression, HostProgressionParams::default());
    }

    #[test]
    fn loads_from_file() {
        let values = vec![0.5; INVERSE_CDF_RESOLUTION + 1];
        let contents = json!({
            "spatial_transmission": 0.7,
            "host_progression": {
                "use_ages": true,
                "age_proportions": [0.5, 0.5],
                "transitions": [
                    { "from": "Exposed", "to": "InfectMild", "probabilities": [1.0, 1.0] },
                    { "from": "InfectMild", "to": "Recovered", "probabilities": [1.0, 1.0] }
                ],
                "transition_times": [
                    { "from": "InfectMild", "to": "Recovered",
                      "icdf": { "mean": 3.0, "values": values } }
                ]
            }
        });
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{contents}").unwrap();

        let parameters = Parameters::from_json_file(file.path()).unwrap();
        assert_eq!(parameters.spatial_transmission, 0.7);
        assert!(parameters.host_progression.use_ages);
        assert_eq!(parameters.host_progression.transition_times.len(), 1);
        assert_eq!(
            parameters.host_progression.transition_times[0].icdf.mean(),
            3.0
        );
    }

    #[test]
    fn short_icdf_table_is_rejected_at_load() {
        let contents = json!({
            "host_progression": {
                "latent_period": { "mean": 3.0, "values": [0.0, 0.1, 0.2] }
            }
        });
        let result = Parameters::from_json_str(&contents.to_string());
        assert!(matches!(result, Err(EpiError::JsonError(_))));
    }

    #[test]
    fn rejects_inconsistent_values() {
        let mut parameters = Parameters::default();
        parameters.timesteps_per_day = 0;
        assert!(parameters.validate().is_err());

        let mut parameters = Parameters::default();
        parameters.place_transmission = -1.0;
        assert!(parameters.validate().is_err());

        let mut parameters = Parameters::default();
        parameters.host_progression.use_ages = true;
        assert!(parameters.validate().is_err());

        let mut parameters = Parameters::default();
        parameters.host_progression.transitions[0].probabilities = vec![1.5];
        assert!(parameters.validate().is_err());

        let mut parameters = Parameters::default();
        parameters.host_progression.transitions[1].probabilities = vec![0.5];
        assert!(matches!(
            parameters.validate(),
            Err(EpiError::ConfigError(_))
        ));

        let mut parameters = Parameters::default();
        parameters.host_progression.transitions.push(TransitionProbabilities {
            from: InfectionStatus::Dead,
            to: InfectionStatus::Recovered,
            probabilities: vec![1.0],
        });
        assert!(matches!(
            parameters.validate(),
            Err(EpiError::ConfigError(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = Parameters::from_json_file(Path::new("/nonexistent/parameters.json"));
        assert!(matches!(result, Err(EpiError::IoError(_))));
    }
}
