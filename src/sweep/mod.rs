//! Sweeps are the mechanisms that advance the simulation by one timestep. Each sweep is a
//! self-contained piece of logic (one transmission route, or the disease progression of
//! infected hosts) executed once per timestep over every cell.
//!
//! A sweep declares how it touches the population through `Sweep::access`:
//!
//! * `SweepAccess::Shared` sweeps read the whole population and may only *enqueue* people
//!   for infection on the cell that owns them. Their per-cell work unit is `visit_cell`.
//!   Transmission sweeps are shared: an infector in one cell can infect people anywhere.
//! * `SweepAccess::Exclusive` sweeps mutate the one cell they are handed and nothing else.
//!   Their per-cell work unit is `update_cell`. Status changes only happen here.
//!
//! The split is what lets the threaded controller run a group of sweeps on many cells at
//! once: shared work units hold `&Population`, exclusive ones hold a disjoint `&mut Cell`.
mod disease_model;
mod household;
mod host_progression;
mod new_infection;
mod place;
mod random_seed;
mod spatial;

use std::sync::Arc;

pub use disease_model::DiseaseModel;
pub use household::HouseholdSweep;
pub use host_progression::HostProgressionSweep;
pub use new_infection::NewInfectionSweep;
pub use place::PlaceSweep;
pub use random_seed::RandomSeedSweep;
pub use spatial::{SpatialKernel, SpatialSweep};

use crate::error::EpiError;
use crate::log::trace;
use crate::parameters::Parameters;
use crate::population::{Cell, PersonId, Population};
use crate::rand::Rng;
use crate::random::SimRng;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SweepAccess {
    Shared,
    Exclusive,
}

pub trait Sweep: Send + Sync {
    fn name(&self) -> &'static str;

    /// Attaches the sweep to a population and parameters before the first timestep. Sweeps
    /// precompute whatever tables they need here.
    fn bind(&mut self, population: &Population, parameters: &Arc<Parameters>)
        -> Result<(), EpiError>;

    fn access(&self) -> SweepAccess;

    /// Work unit of a shared sweep for the cell at `cell`. Returns `false` to stop visiting
    /// further cells this timestep.
    fn visit_cell(
        &self,
        _timestep: u32,
        _population: &Population,
        _cell: usize,
        _rng: &mut SimRng,
    ) -> Result<bool, EpiError> {
        Ok(true)
    }

    /// Work unit of an exclusive sweep. Returns `false` to stop visiting further cells this
    /// timestep.
    fn update_cell(
        &self,
        _timestep: u32,
        _cell: &mut Cell,
        _rng: &mut SimRng,
    ) -> Result<bool, EpiError> {
        Ok(true)
    }

    /// Runs the sweep once over every cell of `population`, in cell order.
    fn run(
        &self,
        population: &mut Population,
        timestep: u32,
        rng: &mut SimRng,
    ) -> Result<(), EpiError> {
        match self.access() {
            SweepAccess::Shared => {
                for cell in 0..population.cells().len() {
                    if !self.visit_cell(timestep, population, cell, rng)? {
                        break;
                    }
                }
            }
            SweepAccess::Exclusive => {
                for cell in population.cells_mut() {
                    if !self.update_cell(timestep, cell, rng)? {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

/// The parameters a sweep was bound with, or an error naming the unbound sweep.
pub(crate) fn bound<'a, T>(value: Option<&'a T>, sweep: &str) -> Result<&'a T, EpiError> {
    value.ok_or_else(|| EpiError::EpiError(format!("{sweep} sweep used before bind")))
}

/// A transmission attempt on `target`: if they are susceptible and pass a susceptibility
/// draw they are queued on their own cell. Returns whether they were newly queued.
pub(crate) fn attempt_infection(
    population: &Population,
    infector: PersonId,
    target: PersonId,
    rng: &mut SimRng,
) -> bool {
    let Some(person) = population.person(target) else {
        return false;
    };
    if !person.is_susceptible() || rng.random::<f64>() >= person.params.susceptibility {
        return false;
    }
    let queued = population.enqueue_person(target);
    if queued {
        trace!("{infector} infected {target}");
    }
    queued
}
