use std::sync::Arc;

use crate::error::EpiError;
use crate::log::{debug, trace};
use crate::parameters::Parameters;
use crate::population::{PersonId, PlaceMembership, Population};
use crate::random::{binomial_or_all, SimRng};
use crate::sweep::{attempt_infection, bound, Sweep, SweepAccess};

/// Transmission within the groups of the places infectors belong to.
///
/// Instead of testing every member of a group, the sweep draws how many members an infector
/// reaches from a binomial distribution and samples that many. Only the sampled members
/// cost anything, which keeps large workplaces cheap.
#[derive(Default)]
pub struct PlaceSweep {
    transmission: Option<f64>,
}

impl PlaceSweep {
    #[must_use]
    pub fn new() -> Self {
        PlaceSweep::default()
    }

    fn infect_group(
        population: &Population,
        infector: PersonId,
        infectiousness: f64,
        membership: PlaceMembership,
        transmission: f64,
        rng: &mut SimRng,
    ) {
        let Some(place) = population.place(membership.place) else {
            return;
        };
        let n = place.group_size(membership.group);
        if n <= 1 {
            return;
        }
        let rate = transmission * infectiousness * place.infectiousness / (n - 1) as f64;
        if rate <= 0.0 {
            return;
        }

        if rate >= 1.0 {
            for member in place.members(membership.group) {
                if member != infector
                    && population.person(member).is_some_and(|p| p.is_susceptible())
                    && population.enqueue_person(member)
                {
                    trace!("{infector} infected {member} at place {}", membership.place);
                }
            }
            return;
        }

        let reached = binomial_or_all(rng, n - 1, rate);
        if reached == 0 {
            return;
        }
        for member in place.sample_other_members(membership.group, infector, reached, rng) {
            attempt_infection(population, infector, member, rng);
        }
    }
}

impl Sweep for PlaceSweep {
    fn name(&self) -> &'static str {
        "place"
    }

    fn bind(
        &mut self,
        population: &Population,
        parameters: &Arc<Parameters>,
    ) -> Result<(), EpiError> {
        debug!(
            "binding place sweep over {} places, transmission={}",
            population.places().len(),
            parameters.place_transmission
        );
        self.transmission = Some(parameters.place_transmission);
        Ok(())
    }

    fn access(&self) -> SweepAccess {
        SweepAccess::Shared
    }

    fn visit_cell(
        &self,
        _timestep: u32,
        population: &Population,
        cell: usize,
        rng: &mut SimRng,
    ) -> Result<bool, EpiError> {
        let transmission = *bound(self.transmission.as_ref(), self.name())?;
        let Some(owner) = population.cell(cell) else {
            return Ok(true);
        };
        for index in owner.infectious() {
            let person = &owner.people()[index];
            let infector = PersonId::new(cell, index);
            for &membership in person.places() {
                Self::infect_group(
                    population,
                    infector,
                    person.params.infectiousness,
                    membership,
                    transmission,
                    rng,
                );
            }
        }
        Ok(true)
    }
}
