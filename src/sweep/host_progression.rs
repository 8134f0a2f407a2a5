//! Disease progression of infected hosts.
//!
//! Every exposed or infectious person carries a scheduled next status and the timestep at
//! which it applies. When that time comes the sweep applies the status, draws the one after
//! it from the transition matrix row of the new status (and the person's age group), and
//! schedules it with a delay drawn from the matching time table. Recovered and Dead are
//! terminal: nothing is scheduled after them.
//!
//! Infectiousness follows a profile indexed by time since the start of infectiousness,
//! scaled by a per-person gamma-distributed draw made when the person first becomes
//! infectious.

use std::sync::Arc;

use strum::EnumCount;

use crate::error::EpiError;
use crate::log::{debug, trace};
use crate::parameters::Parameters;
use crate::population::{Cell, InfectionStatus, Population};
use crate::random::SimRng;
use crate::sweep::disease_model::scheduled_at;
use crate::sweep::{bound, DiseaseModel, Sweep, SweepAccess};

/// A person may pass through several zero-delay transitions in one timestep, but never more
/// than there are statuses unless the transition graph has a zero-delay cycle.
const MAX_TRANSITIONS_PER_STEP: usize = InfectionStatus::COUNT;

#[derive(Default)]
pub struct HostProgressionSweep {
    model: Option<DiseaseModel>,
}

impl HostProgressionSweep {
    #[must_use]
    pub fn new() -> Self {
        HostProgressionSweep::default()
    }

    /// Applies every transition of the person at `index` that is due by `timestep`.
    fn advance(
        model: &DiseaseModel,
        cell: &mut Cell,
        index: usize,
        timestep: u32,
        rng: &mut SimRng,
    ) -> Result<(), EpiError> {
        for _ in 0..MAX_TRANSITIONS_PER_STEP {
            let person = &cell.people()[index];
            let current = person.status();
            let age_group = person.age_group();
            let params = &person.params;
            if current.is_terminal() || !params.next_status_time.is_some_and(|t| t <= timestep) {
                return Ok(());
            }
            let next = match params.next_status {
                Some(next) => next,
                None => model.next_status(current, age_group, rng)?,
            };

            // Draw everything before mutating, so a failed draw leaves the person untouched
            let following = model.next_status(next, age_group, rng)?;
            let at = if next.is_terminal() {
                None
            } else {
                Some(scheduled_at(
                    timestep,
                    model.transition_time(next, following, rng)?,
                )?)
            };
            let initial = (current == InfectionStatus::Exposed && next.is_infectious())
                .then(|| model.initial_infectiousness(next, rng));

            cell.set_status(index, next);
            let Some(params) = cell.params_mut(index) else {
                return Ok(());
            };
            if let Some(initial) = initial {
                params.infection_start = Some(timestep);
                params.initial_infectiousness = initial;
            }
            match at {
                Some(at) => {
                    params.next_status = Some(following);
                    params.next_status_time = Some(at);
                }
                None => {
                    params.next_status = None;
                    params.next_status_time = None;
                }
            }
            if !next.is_infectious() {
                params.infectiousness = 0.0;
            }
        }
        Err(EpiError::InvariantViolation(format!(
            "person {index} of cell {} made more than {MAX_TRANSITIONS_PER_STEP} transitions \
             at timestep {timestep}",
            cell.index()
        )))
    }

    /// Gives a person who entered a non-terminal status without a schedule (e.g. by being
    /// seeded straight into it) a next status and a time for it, counted from `timestep`.
    fn schedule(
        model: &DiseaseModel,
        cell: &mut Cell,
        index: usize,
        timestep: u32,
        rng: &mut SimRng,
    ) -> Result<(), EpiError> {
        let person = &cell.people()[index];
        let current = person.status();
        let age_group = person.age_group();
        let next = match person.params.next_status {
            Some(next) => next,
            None => model.next_status(current, age_group, rng)?,
        };
        let delay = if current == InfectionStatus::Exposed {
            model.latent_time(rng)
        } else {
            model.transition_time(current, next, rng)?
        };
        let at = scheduled_at(timestep, delay)?;
        debug!(
            "person {index} of cell {} was {current} with no schedule, now due to become {next} \
             at timestep {at}",
            cell.index()
        );
        if let Some(params) = cell.params_mut(index) {
            params.next_status = Some(next);
            params.next_status_time = Some(at);
        }
        Ok(())
    }

    /// Sets the infectiousness of the infectious person at `index` from the profile.
    fn update_infectiousness(
        model: &DiseaseModel,
        cell: &mut Cell,
        index: usize,
        timestep: u32,
    ) -> Result<(), EpiError> {
        let cell_index = cell.index();
        let Some(params) = cell.params_mut(index) else {
            return Ok(());
        };
        // People made infectious directly (e.g. by an initial seeding) keep their
        // infectiousness until they progress.
        let Some(start) = params.infection_start else {
            return Ok(());
        };
        if start > timestep {
            return Err(EpiError::InvariantViolation(format!(
                "person {index} of cell {cell_index} has infection start {start} after \
                 timestep {timestep}"
            )));
        }
        params.infectiousness = params.initial_infectiousness * model.profile_at(timestep - start)?;
        Ok(())
    }
}

impl Sweep for HostProgressionSweep {
    fn name(&self) -> &'static str {
        "host progression"
    }

    fn bind(
        &mut self,
        population: &Population,
        parameters: &Arc<Parameters>,
    ) -> Result<(), EpiError> {
        debug!(
            "binding host progression over {} people",
            population.total_people()
        );
        self.model = Some(DiseaseModel::new(parameters)?);
        Ok(())
    }

    fn access(&self) -> SweepAccess {
        SweepAccess::Exclusive
    }

    fn update_cell(
        &self,
        timestep: u32,
        cell: &mut Cell,
        rng: &mut SimRng,
    ) -> Result<bool, EpiError> {
        let model = bound(self.model.as_ref(), self.name())?;

        let unscheduled: Vec<usize> = cell
            .exposed()
            .chain(cell.infectious())
            .filter(|&index| cell.people()[index].params.next_status_time.is_none())
            .collect();
        for index in unscheduled {
            Self::schedule(model, cell, index, timestep, rng)?;
        }

        // The partition changes as people progress, so take the due list up front
        let due: Vec<usize> = cell
            .exposed()
            .chain(cell.infectious())
            .filter(|&index| {
                cell.people()[index]
                    .params
                    .next_status_time
                    .is_some_and(|t| t <= timestep)
            })
            .collect();
        if !due.is_empty() {
            trace!(
                "timestep {timestep}: {} transitions due in cell {}",
                due.len(),
                cell.index()
            );
        }
        for index in due {
            Self::advance(model, cell, index, timestep, rng)?;
        }

        let infectious: Vec<usize> = cell.infectious().collect();
        for index in infectious {
            Self::update_infectiousness(model, cell, index, timestep)?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_almost_eq;
    use crate::parameters::{TransitionProbabilities, TransitionTime};
    use crate::population::PersonParams;
    use crate::random::InverseCdf;
    use rand::SeedableRng;

    fn population(n: usize) -> Population {
        let mut population = Population::new();
        let c = population.add_cell((0.0, 0.0));
        let cell = population.cell_mut(c).unwrap();
        let mc = cell.add_microcell();
        for _ in 0..n {
            cell.add_person(mc, PersonParams::default()).unwrap();
        }
        population
    }

    fn bound_sweep(population: &Population, parameters: Parameters) -> HostProgressionSweep {
        let mut sweep = HostProgressionSweep::new();
        sweep.bind(population, &Arc::new(parameters)).unwrap();
        sweep
    }

    /// Exposed -> InfectASympt after one day, recovery after five.
    fn simple_parameters() -> Parameters {
        use InfectionStatus::*;
        let mut parameters = Parameters::default();
        let hp = &mut parameters.host_progression;
        hp.transitions = vec![
            TransitionProbabilities {
                from: Exposed,
                to: InfectASympt,
                probabilities: vec![1.0],
            },
            TransitionProbabilities {
                from: InfectASympt,
                to: Recovered,
                probabilities: vec![1.0],
            },
        ];
        hp.transition_times = vec![
            TransitionTime {
                from: Exposed,
                to: InfectASympt,
                icdf: InverseCdf::constant(1.0),
            },
            TransitionTime {
                from: InfectASympt,
                to: Recovered,
                icdf: InverseCdf::constant(5.0),
            },
        ];
        parameters
    }

    fn expose(population: &mut Population, index: usize, at: u32) {
        let cell = population.cell_mut(0).unwrap();
        cell.set_status(index, InfectionStatus::Exposed);
        let params = cell.params_mut(index).unwrap();
        params.next_status = Some(InfectionStatus::InfectASympt);
        params.next_status_time = Some(at);
    }

    #[test]
    fn follows_schedule_to_recovery() {
        let mut population = population(3);
        expose(&mut population, 0, 2);
        let sweep = bound_sweep(&population, simple_parameters());
        let mut rng = SimRng::seed_from_u64(1);

        let status = |p: &Population| p.cells()[0].person(0).unwrap().status();
        sweep.run(&mut population, 1, &mut rng).unwrap();
        assert_eq!(status(&population), InfectionStatus::Exposed);

        sweep.run(&mut population, 2, &mut rng).unwrap();
        assert_eq!(status(&population), InfectionStatus::InfectASympt);
        {
            let cell = &population.cells()[0];
            let params = &cell.person(0).unwrap().params;
            assert_eq!(params.infection_start, Some(2));
            assert_eq!(params.next_status, Some(InfectionStatus::Recovered));
            assert_eq!(params.next_status_time, Some(7));
            assert!(params.initial_infectiousness > 0.0);
            assert_eq!(cell.num_infectious(), 1);
            assert_eq!(cell.num_exposed(), 0);
        }

        for t in 3..7 {
            sweep.run(&mut population, t, &mut rng).unwrap();
            assert_eq!(status(&population), InfectionStatus::InfectASympt);
        }
        sweep.run(&mut population, 7, &mut rng).unwrap();
        assert_eq!(status(&population), InfectionStatus::Recovered);
        let cell = &population.cells()[0];
        let params = &cell.person(0).unwrap().params;
        assert_eq!(params.next_status, None);
        assert_eq!(params.next_status_time, None);
        assert_eq!(params.infectiousness, 0.0);
        assert_eq!(cell.num_infectious(), 0);
        assert_eq!(cell.compartment_counter().total(), 3);
    }

    #[test]
    fn infectiousness_follows_profile() {
        let mut population = population(1);
        expose(&mut population, 0, 1);
        let sweep = bound_sweep(&population, simple_parameters());
        let model = DiseaseModel::new(&simple_parameters()).unwrap();
        let mut rng = SimRng::seed_from_u64(2);

        for t in 1..5 {
            sweep.run(&mut population, t, &mut rng).unwrap();
            let params = &population.cells()[0].person(0).unwrap().params;
            assert_almost_eq!(
                params.infectiousness,
                params.initial_infectiousness * model.profile()[(t - 1) as usize],
                1e-12
            );
        }
    }

    #[test]
    fn terminal_states_never_change() {
        let mut population = population(2);
        {
            let cell = population.cell_mut(0).unwrap();
            cell.set_status(0, InfectionStatus::Recovered);
            cell.set_status(1, InfectionStatus::Dead);
            // A stale schedule must not revive anyone
            cell.params_mut(0).unwrap().next_status = Some(InfectionStatus::InfectMild);
            cell.params_mut(0).unwrap().next_status_time = Some(0);
        }
        let sweep = bound_sweep(&population, Parameters::default());
        let mut rng = SimRng::seed_from_u64(3);
        for t in 1..50 {
            sweep.run(&mut population, t, &mut rng).unwrap();
        }
        let cell = &population.cells()[0];
        assert_eq!(cell.person(0).unwrap().status(), InfectionStatus::Recovered);
        assert_eq!(cell.person(1).unwrap().status(), InfectionStatus::Dead);
    }

    #[test]
    fn unscheduled_infectious_draws_next_status() {
        let mut population = population(1);
        {
            let cell = population.cell_mut(0).unwrap();
            cell.set_status(0, InfectionStatus::InfectASympt);
            let params = cell.params_mut(0).unwrap();
            params.infectiousness = 1.0;
            params.next_status_time = Some(5);
        }
        let sweep = bound_sweep(&population, simple_parameters());
        let mut rng = SimRng::seed_from_u64(4);
        for t in 1..5 {
            sweep.run(&mut population, t, &mut rng).unwrap();
            // No infection start, so the seeded infectiousness is kept
            assert_eq!(
                population.cells()[0].person(0).unwrap().params.infectiousness,
                1.0
            );
        }
        sweep.run(&mut population, 5, &mut rng).unwrap();
        assert_eq!(
            population.cells()[0].person(0).unwrap().status(),
            InfectionStatus::Recovered
        );
    }

    #[test]
    fn infection_start_in_future_is_fatal() {
        let mut population = population(1);
        {
            let cell = population.cell_mut(0).unwrap();
            cell.set_status(0, InfectionStatus::InfectMild);
            let params = cell.params_mut(0).unwrap();
            params.infection_start = Some(10);
            params.next_status_time = Some(100);
        }
        let sweep = bound_sweep(&population, Parameters::default());
        let mut rng = SimRng::seed_from_u64(5);
        let result = sweep.run(&mut population, 3, &mut rng);
        assert!(matches!(result, Err(EpiError::InvariantViolation(_))));
    }

    #[test]
    fn time_since_infection_past_profile_is_fatal() {
        let mut population = population(1);
        {
            let cell = population.cell_mut(0).unwrap();
            cell.set_status(0, InfectionStatus::InfectMild);
            let params = cell.params_mut(0).unwrap();
            params.infection_start = Some(0);
            params.next_status_time = Some(10_000);
        }
        let sweep = bound_sweep(&population, Parameters::default());
        let mut rng = SimRng::seed_from_u64(6);
        sweep.run(&mut population, 2549, &mut rng).unwrap();
        let result = sweep.run(&mut population, 2550, &mut rng);
        assert!(matches!(result, Err(EpiError::InvariantViolation(_))));
    }

    #[test]
    fn missing_time_table_is_fatal() {
        // InfectASympt now leads to Dead, which has no time table
        let mut parameters = simple_parameters();
        parameters.host_progression.transitions[1].to = InfectionStatus::Dead;

        let mut population = population(1);
        expose(&mut population, 0, 1);
        let sweep = bound_sweep(&population, parameters);
        let mut rng = SimRng::seed_from_u64(7);
        let result = sweep.run(&mut population, 1, &mut rng);
        assert!(matches!(result, Err(EpiError::InvariantViolation(_))));
        // The failed transition left the person as they were
        assert_eq!(
            population.cells()[0].person(0).unwrap().status(),
            InfectionStatus::Exposed
        );
    }

    #[test]
    fn zero_delay_cycle_is_detected() {
        use InfectionStatus::*;
        let mut parameters = simple_parameters();
        let hp = &mut parameters.host_progression;
        hp.transitions = vec![
            TransitionProbabilities {
                from: InfectMild,
                to: InfectGP,
                probabilities: vec![1.0],
            },
            TransitionProbabilities {
                from: InfectGP,
                to: InfectMild,
                probabilities: vec![1.0],
            },
        ];
        hp.transition_times.push(TransitionTime {
            from: InfectMild,
            to: InfectGP,
            icdf: InverseCdf::constant(0.0),
        });
        hp.transition_times.push(TransitionTime {
            from: InfectGP,
            to: InfectMild,
            icdf: InverseCdf::constant(0.0),
        });

        let mut population = population(1);
        {
            let cell = population.cell_mut(0).unwrap();
            cell.set_status(0, InfectMild);
            cell.params_mut(0).unwrap().next_status_time = Some(1);
        }
        let sweep = bound_sweep(&population, parameters);
        let mut rng = SimRng::seed_from_u64(8);
        assert!(matches!(
            sweep.run(&mut population, 1, &mut rng),
            Err(EpiError::InvariantViolation(_))
        ));
    }

    #[test]
    fn unscheduled_infectious_gets_a_schedule() {
        let mut population = population(1);
        {
            let cell = population.cell_mut(0).unwrap();
            cell.set_status(0, InfectionStatus::InfectASympt);
            cell.params_mut(0).unwrap().infectiousness = 1.0;
        }
        let sweep = bound_sweep(&population, simple_parameters());
        let mut rng = SimRng::seed_from_u64(9);

        sweep.run(&mut population, 2, &mut rng).unwrap();
        let params = &population.cells()[0].person(0).unwrap().params;
        assert_eq!(params.next_status, Some(InfectionStatus::Recovered));
        assert_eq!(params.next_status_time, Some(7));

        for t in 3..7 {
            sweep.run(&mut population, t, &mut rng).unwrap();
        }
        assert_eq!(
            population.cells()[0].person(0).unwrap().status(),
            InfectionStatus::InfectASympt
        );
        sweep.run(&mut population, 7, &mut rng).unwrap();
        assert_eq!(
            population.cells()[0].person(0).unwrap().status(),
            InfectionStatus::Recovered
        );
    }

    #[test]
    fn transition_past_last_timestep_is_fatal() {
        let mut parameters = simple_parameters();
        parameters.host_progression.transition_times[1].icdf = InverseCdf::constant(1e10);

        let mut population = population(1);
        expose(&mut population, 0, 5);
        let sweep = bound_sweep(&population, parameters);
        let mut rng = SimRng::seed_from_u64(10);
        let result = sweep.run(&mut population, 5, &mut rng);
        assert!(matches!(result, Err(EpiError::InvariantViolation(_))));
        // The failed transition left the person as they were
        let person = population.cells()[0].person(0).unwrap();
        assert_eq!(person.status(), InfectionStatus::Exposed);
        assert_eq!(person.params.next_status_time, Some(5));
    }

    #[test]
    fn unscheduled_exposed_waits_out_latent_period() {
        let mut population = population(1);
        population
            .cell_mut(0)
            .unwrap()
            .set_status(0, InfectionStatus::Exposed);
        let sweep = bound_sweep(&population, simple_parameters());
        let mut rng = SimRng::seed_from_u64(11);

        sweep.run(&mut population, 2, &mut rng).unwrap();
        let person = population.cells()[0].person(0).unwrap();
        assert_eq!(person.status(), InfectionStatus::Exposed);
        assert_eq!(person.params.next_status, Some(InfectionStatus::InfectASympt));
        // The default latent period is a constant 4 days
        assert_eq!(person.params.next_status_time, Some(6));
    }
}
