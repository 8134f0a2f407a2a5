//! The host-progression state machine tables, built once from `Parameters` at bind time and
//! shared by the sweeps that move people between statuses.

use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;
use rand_distr::Gamma;
use strum::EnumCount;

use crate::error::EpiError;
use crate::hashing::HashMap;
use crate::log::debug;
use crate::parameters::{HostProgressionParams, Parameters};
use crate::population::{Cell, InfectionStatus};
use crate::random::InverseCdf;

type Row = Option<WeightedIndex<f64>>;

/// The timestep `delay` steps after `timestep`, or an error if it does not fit in a `u32`.
pub(crate) fn scheduled_at(timestep: u32, delay: u32) -> Result<u32, EpiError> {
    timestep.checked_add(delay).ok_or_else(|| {
        EpiError::InvariantViolation(format!(
            "a delay of {delay} steps from timestep {timestep} is past the last timestep"
        ))
    })
}

#[derive(Clone, Debug)]
pub struct DiseaseModel {
    timesteps_per_day: u32,
    /// `rows[age_group][from]`; `None` for a state with no outgoing transitions.
    rows: Vec<[Row; InfectionStatus::COUNT]>,
    transition_times: HashMap<(InfectionStatus, InfectionStatus), InverseCdf>,
    latent_period: InverseCdf,
    profile: Vec<f64>,
    initial_infectiousness: Gamma<f64>,
    asymptomatic_infectiousness: f64,
    symptomatic_infectiousness: f64,
}

/// Collapses the probability arrays to one value per age group of the model.
fn age_weights(hp: &HostProgressionParams, probabilities: &[f64]) -> Vec<f64> {
    if hp.use_ages || probabilities.len() == 1 {
        return probabilities.to_vec();
    }
    let total: f64 = hp.age_proportions.iter().sum();
    if total <= 0.0 {
        return vec![0.0];
    }
    let average = probabilities
        .iter()
        .zip(&hp.age_proportions)
        .map(|(p, w)| p * w)
        .sum::<f64>()
        / total;
    vec![average]
}

/// Resamples `curve` onto `n` evenly spaced points, scales the result to unit average and
/// pads it with zeros to `len`.
fn build_profile(curve: &[f64], n: usize, len: usize) -> Vec<f64> {
    let mut profile = vec![0.0; len];
    if n == 0 || curve.len() < 2 {
        return profile;
    }
    let last = (curve.len() - 1) as f64;
    for (i, value) in profile.iter_mut().take(n).enumerate() {
        let x = i as f64 * last / n as f64;
        let j = x.floor() as usize;
        let frac = x - j as f64;
        *value = curve[j] * (1.0 - frac) + curve[(j + 1).min(curve.len() - 1)] * frac;
    }
    let sum: f64 = profile[..n].iter().sum();
    if sum > 0.0 {
        let scale = n as f64 / sum;
        for value in &mut profile[..n] {
            *value *= scale;
        }
    }
    profile
}

impl DiseaseModel {
    /// Builds the tables.
    ///
    /// # Errors
    ///
    /// Returns `EpiError::ConfigError` if there is no `InfectASympt -> Recovered` time table
    /// (it sets the length of the infectiousness profile), if that profile would not fit in
    /// `max_infectious_steps`, or if the gamma shape is invalid.
    pub fn new(parameters: &Parameters) -> Result<Self, EpiError> {
        let hp = &parameters.host_progression;
        let groups = if hp.use_ages {
            hp.age_proportions.len().max(1)
        } else {
            1
        };

        let mut weights = vec![[[0.0; InfectionStatus::COUNT]; InfectionStatus::COUNT]; groups];
        for transition in &hp.transitions {
            for (age, p) in age_weights(hp, &transition.probabilities)
                .into_iter()
                .enumerate()
                .take(groups)
            {
                weights[age][transition.from.index()][transition.to.index()] += p;
            }
        }
        let rows: Vec<[Row; InfectionStatus::COUNT]> = weights
            .iter()
            .map(|table| {
                std::array::from_fn(|from| {
                    let terminal =
                        InfectionStatus::from_index(from).is_some_and(InfectionStatus::is_terminal);
                    if terminal {
                        None
                    } else {
                        WeightedIndex::new(table[from]).ok()
                    }
                })
            })
            .collect();

        let transition_times = hp
            .transition_times
            .iter()
            .map(|t| ((t.from, t.to), t.icdf.clone()))
            .collect::<HashMap<_, _>>();

        let recovery = transition_times
            .get(&(InfectionStatus::InfectASympt, InfectionStatus::Recovered))
            .ok_or_else(|| {
                EpiError::ConfigError(
                    "no InfectASympt -> Recovered transition time to size the infectiousness \
                     profile"
                        .to_string(),
                )
            })?;
        let steps = (recovery.mean() * f64::from(parameters.timesteps_per_day)).ceil() as usize;
        if steps >= hp.max_infectious_steps {
            return Err(EpiError::ConfigError(format!(
                "infectiousness profile needs {steps} steps but max_infectious_steps is {}",
                hp.max_infectious_steps
            )));
        }
        let profile = build_profile(&hp.infectiousness_profile, steps, hp.max_infectious_steps);

        let shape = hp.infectiousness_gamma_shape;
        let initial_infectiousness = Gamma::new(shape, 1.0 / shape).map_err(|e| {
            EpiError::ConfigError(format!("invalid infectiousness_gamma_shape {shape}: {e}"))
        })?;

        debug!(
            "disease model: {groups} age groups, {} transition times, profile over {steps} steps",
            transition_times.len()
        );
        Ok(DiseaseModel {
            timesteps_per_day: parameters.timesteps_per_day,
            rows,
            transition_times,
            latent_period: hp.latent_period.clone(),
            profile,
            initial_infectiousness,
            asymptomatic_infectiousness: hp.asymptomatic_infectiousness,
            symptomatic_infectiousness: hp.symptomatic_infectiousness,
        })
    }

    #[must_use]
    pub fn timesteps_per_day(&self) -> u32 {
        self.timesteps_per_day
    }

    #[must_use]
    pub fn profile(&self) -> &[f64] {
        &self.profile
    }

    /// Draws the status that follows `from` for a person in `age_group`.
    ///
    /// # Errors
    ///
    /// `EpiError::InvariantViolation` if the age group is outside the matrix or `from` is a
    /// non-terminal state with no outgoing probability.
    pub fn next_status<R: Rng + ?Sized>(
        &self,
        from: InfectionStatus,
        age_group: usize,
        rng: &mut R,
    ) -> Result<InfectionStatus, EpiError> {
        if from.is_terminal() {
            return Ok(from);
        }
        let row = if self.rows.len() == 1 {
            &self.rows[0]
        } else {
            self.rows.get(age_group).ok_or_else(|| {
                EpiError::InvariantViolation(format!(
                    "age group {age_group} outside the {}-group transition matrix",
                    self.rows.len()
                ))
            })?
        };
        let Some(distribution) = &row[from.index()] else {
            return Err(EpiError::InvariantViolation(format!(
                "no transitions out of non-terminal status {from}"
            )));
        };
        let to = distribution.sample(rng);
        InfectionStatus::from_index(to).ok_or_else(|| {
            EpiError::InvariantViolation(format!("transition to unknown status index {to}"))
        })
    }

    /// Draws the delay in timesteps of the transition `from -> to`.
    ///
    /// # Errors
    ///
    /// `EpiError::InvariantViolation` if there is no time table for the pair.
    pub fn transition_time<R: Rng + ?Sized>(
        &self,
        from: InfectionStatus,
        to: InfectionStatus,
        rng: &mut R,
    ) -> Result<u32, EpiError> {
        let icdf = self.transition_times.get(&(from, to)).ok_or_else(|| {
            EpiError::InvariantViolation(format!("no transition time table for {from} -> {to}"))
        })?;
        Ok(icdf.choose(self.timesteps_per_day, rng))
    }

    pub fn latent_time<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        self.latent_period.choose(self.timesteps_per_day, rng)
    }

    /// Draws the baseline infectiousness of someone who has just become `status`.
    pub fn initial_infectiousness<R: Rng + ?Sized>(
        &self,
        status: InfectionStatus,
        rng: &mut R,
    ) -> f64 {
        let multiplier = if status == InfectionStatus::InfectASympt {
            self.asymptomatic_infectiousness
        } else {
            self.symptomatic_infectiousness
        };
        self.initial_infectiousness.sample(rng) * multiplier
    }

    /// The profile value `since_start` timesteps into an infection.
    ///
    /// # Errors
    ///
    /// `EpiError::InvariantViolation` past the end of the profile.
    pub fn profile_at(&self, since_start: u32) -> Result<f64, EpiError> {
        self.profile
            .get(since_start as usize)
            .copied()
            .ok_or_else(|| {
                EpiError::InvariantViolation(format!(
                    "time since infection {since_start} exceeds the {}-step infectiousness profile",
                    self.profile.len()
                ))
            })
    }

    /// Moves the susceptible person at `index` to Exposed and schedules the end of their
    /// latent period.
    ///
    /// # Errors
    ///
    /// Propagates errors from `next_status`.
    pub fn expose<R: Rng + ?Sized>(
        &self,
        cell: &mut Cell,
        index: usize,
        timestep: u32,
        rng: &mut R,
    ) -> Result<(), EpiError> {
        let Some(age_group) = cell.person(index).map(|person| person.age_group()) else {
            return Err(EpiError::InvariantViolation(format!(
                "cell {} has no person {index}",
                cell.index()
            )));
        };
        let next = self.next_status(InfectionStatus::Exposed, age_group, rng)?;
        let at = scheduled_at(timestep, self.latent_time(rng))?;
        cell.set_status(index, InfectionStatus::Exposed);
        if let Some(params) = cell.params_mut(index) {
            params.next_status = Some(next);
            params.next_status_time = Some(at);
            params.infection_start = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_almost_eq;
    use crate::parameters::{TransitionProbabilities, TransitionTime};
    use crate::population::{PersonParams, Population};
    use crate::random::SimRng;
    use rand::SeedableRng;

    fn model(parameters: &Parameters) -> DiseaseModel {
        DiseaseModel::new(parameters).unwrap()
    }

    #[test]
    fn profile_has_unit_average() {
        let parameters = Parameters::default();
        let model = model(&parameters);
        // InfectASympt -> Recovered has a 5 day mean at 1 step per day
        let profile = model.profile();
        assert_eq!(profile.len(), 2550);
        let sum: f64 = profile[..5].iter().sum();
        assert_almost_eq!(sum / 5.0, 1.0, 1e-12);
        assert!(profile[5..].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn profile_resampling_interpolates() {
        let profile = build_profile(&[0.0, 2.0], 4, 6);
        // Values 0, 0.5, 1.0, 1.5 scaled to unit average
        assert_almost_eq!(profile[0], 0.0, 1e-12);
        assert_almost_eq!(profile[1], 2.0 / 3.0, 1e-12);
        assert_almost_eq!(profile[2], 4.0 / 3.0, 1e-12);
        assert_almost_eq!(profile[3], 2.0, 1e-12);
        assert_eq!(&profile[4..], &[0.0, 0.0]);
    }

    #[test]
    fn profile_too_long_is_config_error() {
        let mut parameters = Parameters::default();
        parameters.host_progression.max_infectious_steps = 5;
        assert!(matches!(
            DiseaseModel::new(&parameters),
            Err(EpiError::ConfigError(_))
        ));
    }

    #[test]
    fn terminal_states_stay() {
        let model = model(&Parameters::default());
        let mut rng = SimRng::seed_from_u64(1);
        for status in [InfectionStatus::Recovered, InfectionStatus::Dead] {
            assert_eq!(model.next_status(status, 0, &mut rng).unwrap(), status);
        }
    }

    #[test]
    fn draws_follow_matrix_row() {
        let model = model(&Parameters::default());
        let mut rng = SimRng::seed_from_u64(2);
        let mut mild = 0;
        for _ in 0..10_000 {
            match model
                .next_status(InfectionStatus::Exposed, 0, &mut rng)
                .unwrap()
            {
                InfectionStatus::InfectMild => mild += 1,
                InfectionStatus::InfectASympt => {}
                other => panic!("unexpected transition to {other}"),
            }
        }
        assert!((5500..6500).contains(&mild), "mild = {mild}");
        assert_eq!(
            model
                .next_status(InfectionStatus::InfectASympt, 0, &mut rng)
                .unwrap(),
            InfectionStatus::Recovered
        );
    }

    #[test]
    fn missing_rows_and_tables_are_invariant_violations() {
        let model = model(&Parameters::default());
        let mut rng = SimRng::seed_from_u64(3);
        assert!(matches!(
            model.next_status(InfectionStatus::Susceptible, 0, &mut rng),
            Err(EpiError::InvariantViolation(_))
        ));
        assert!(matches!(
            model.transition_time(InfectionStatus::Exposed, InfectionStatus::Dead, &mut rng),
            Err(EpiError::InvariantViolation(_))
        ));
        assert!(matches!(
            model.profile_at(2550),
            Err(EpiError::InvariantViolation(_))
        ));
        assert_eq!(
            model
                .transition_time(InfectionStatus::InfectGP, InfectionStatus::InfectHosp, &mut rng)
                .unwrap(),
            3
        );
    }

    #[test]
    fn age_stratified_rows() {
        let mut parameters = Parameters::default();
        let hp = &mut parameters.host_progression;
        hp.use_ages = true;
        hp.age_proportions = vec![0.5, 0.5];
        hp.transitions = vec![
            TransitionProbabilities {
                from: InfectionStatus::Exposed,
                to: InfectionStatus::InfectASympt,
                probabilities: vec![1.0, 0.0],
            },
            TransitionProbabilities {
                from: InfectionStatus::Exposed,
                to: InfectionStatus::InfectMild,
                probabilities: vec![0.0, 1.0],
            },
        ];
        hp.transition_times.push(TransitionTime {
            from: InfectionStatus::Exposed,
            to: InfectionStatus::InfectMild,
            icdf: InverseCdf::constant(1.0),
        });
        let model = model(&parameters);
        let mut rng = SimRng::seed_from_u64(4);
        for _ in 0..100 {
            assert_eq!(
                model
                    .next_status(InfectionStatus::Exposed, 0, &mut rng)
                    .unwrap(),
                InfectionStatus::InfectASympt
            );
            assert_eq!(
                model
                    .next_status(InfectionStatus::Exposed, 1, &mut rng)
                    .unwrap(),
                InfectionStatus::InfectMild
            );
        }
        assert!(matches!(
            model.next_status(InfectionStatus::Exposed, 2, &mut rng),
            Err(EpiError::InvariantViolation(_))
        ));
    }

    #[test]
    fn averaged_rows_use_age_proportions() {
        let mut parameters = Parameters::default();
        let hp = &mut parameters.host_progression;
        hp.age_proportions = vec![3.0, 1.0];
        hp.transitions[0].probabilities = vec![1.0, 0.0];
        hp.transitions[1].probabilities = vec![0.0, 1.0];
        assert_eq!(age_weights(hp, &[1.0, 0.0]), vec![0.75]);
        assert_eq!(age_weights(hp, &[0.4]), vec![0.4]);

        let model = model(&parameters);
        let mut rng = SimRng::seed_from_u64(5);
        let asymptomatic = (0..10_000)
            .filter(|_| {
                model
                    .next_status(InfectionStatus::Exposed, 7, &mut rng)
                    .unwrap()
                    == InfectionStatus::InfectASympt
            })
            .count();
        assert!((7000..8000).contains(&asymptomatic), "{asymptomatic}");
    }

    #[test]
    fn initial_infectiousness_has_multiplier_mean() {
        let model = model(&Parameters::default());
        let mut rng = SimRng::seed_from_u64(6);
        let n = 20_000;
        let mean = (0..n)
            .map(|_| model.initial_infectiousness(InfectionStatus::InfectASympt, &mut rng))
            .sum::<f64>()
            / f64::from(n);
        assert!((mean - 0.5).abs() < 0.02, "mean {mean}");
    }

    #[test]
    fn expose_schedules_latent_period() {
        let model = model(&Parameters::default());
        let mut population = Population::new();
        let c = population.add_cell((0.0, 0.0));
        let cell = population.cell_mut(c).unwrap();
        let mc = cell.add_microcell();
        cell.add_person(mc, PersonParams::default()).unwrap();
        let mut rng = SimRng::seed_from_u64(7);

        model.expose(cell, 0, 3, &mut rng).unwrap();
        let person = cell.person(0).unwrap();
        assert_eq!(person.status(), InfectionStatus::Exposed);
        // The default latent period is a constant 4 days
        assert_eq!(person.params.next_status_time, Some(7));
        assert!(matches!(
            person.params.next_status,
            Some(InfectionStatus::InfectASympt | InfectionStatus::InfectMild)
        ));
        assert_eq!(cell.num_exposed(), 1);
        assert!(model.expose(cell, 5, 3, &mut rng).is_err());
    }

    #[test]
    fn latent_period_past_last_timestep_is_rejected() {
        let mut parameters = Parameters::default();
        parameters.host_progression.latent_period = InverseCdf::constant(1e10);
        let model = model(&parameters);
        let mut population = Population::new();
        let c = population.add_cell((0.0, 0.0));
        let cell = population.cell_mut(c).unwrap();
        let mc = cell.add_microcell();
        cell.add_person(mc, PersonParams::default()).unwrap();
        let mut rng = SimRng::seed_from_u64(8);

        let result = model.expose(cell, 0, 3, &mut rng);
        assert!(matches!(result, Err(EpiError::InvariantViolation(_))));
        let person = cell.person(0).unwrap();
        assert!(person.is_susceptible());
        assert_eq!(person.params.next_status_time, None);
        assert_eq!(cell.num_exposed(), 0);
    }

    #[test]
    fn scheduled_at_checks_overflow() {
        assert_eq!(scheduled_at(3, 4).unwrap(), 7);
        assert_eq!(scheduled_at(0, u32::MAX).unwrap(), u32::MAX);
        assert!(matches!(
            scheduled_at(3, u32::MAX),
            Err(EpiError::InvariantViolation(_))
        ));
    }
}
