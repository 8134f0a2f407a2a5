use std::sync::Arc;

use rand::Rng;

use crate::error::EpiError;
use crate::log::{debug, trace};
use crate::parameters::Parameters;
use crate::population::{Cell, PersonId, Population};
use crate::random::SimRng;
use crate::sweep::{bound, Sweep, SweepAccess};

/// Transmission between members of the same household.
#[derive(Default)]
pub struct HouseholdSweep {
    transmission: Option<f64>,
}

impl HouseholdSweep {
    #[must_use]
    pub fn new() -> Self {
        HouseholdSweep::default()
    }

    fn infect_from(&self, cell: &Cell, infector: usize, transmission: f64, rng: &mut SimRng) {
        let Some(household) = cell.household_of(infector) else {
            return;
        };
        let base = transmission
            * cell.people()[infector].params.infectiousness
            * household.params.infectiousness
            * household.params.susceptibility;
        if base <= 0.0 {
            return;
        }
        for target in cell.household_members(infector) {
            if target == infector {
                continue;
            }
            let person = &cell.people()[target];
            if !person.is_susceptible() {
                continue;
            }
            let force = base * person.params.susceptibility;
            if rng.random::<f64>() < force && cell.enqueue_person(target) {
                trace!(
                    "{} infected {} in their household",
                    PersonId::new(cell.index(), infector),
                    PersonId::new(cell.index(), target)
                );
            }
        }
    }
}

impl Sweep for HouseholdSweep {
    fn name(&self) -> &'static str {
        "household"
    }

    fn bind(
        &mut self,
        _population: &Population,
        parameters: &Arc<Parameters>,
    ) -> Result<(), EpiError> {
        debug!(
            "binding household sweep, transmission={}",
            parameters.household_transmission
        );
        self.transmission = Some(parameters.household_transmission);
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
        let Some(cell) = population.cell(cell) else {
            return Ok(true);
        };
        for infector in cell.infectious() {
            self.infect_from(cell, infector, transmission, rng);
        }
        Ok(true)
    }
}
