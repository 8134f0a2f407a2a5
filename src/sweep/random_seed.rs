use std::sync::Arc;

use rand::Rng;

use crate::error::EpiError;
use crate::log::info;
use crate::parameters::Parameters;
use crate::population::{Cell, Population};
use crate::random::SimRng;
use crate::sweep::{bound, DiseaseModel, Sweep, SweepAccess};

struct Bound {
    model: DiseaseModel,
    probability: f64,
}

/// Seeds an outbreak by exposing each susceptible person with probability
/// `1 / seed_per_n_people`, bypassing transmission.
#[derive(Default)]
pub struct RandomSeedSweep {
    last_timestep: Option<u32>,
    bound: Option<Bound>,
}

impl RandomSeedSweep {
    #[must_use]
    pub fn new() -> Self {
        RandomSeedSweep::default()
    }

    /// Restricts seeding to timesteps up to and including `timestep`.
    #[must_use]
    pub fn until(mut self, timestep: u32) -> Self {
        self.last_timestep = Some(timestep);
        self
    }
}

impl Sweep for RandomSeedSweep {
    fn name(&self) -> &'static str {
        "random seed"
    }

    fn bind(
        &mut self,
        _population: &Population,
        parameters: &Arc<Parameters>,
    ) -> Result<(), EpiError> {
        if parameters.seed_per_n_people == 0 {
            return Err(EpiError::ConfigError(
                "seed_per_n_people must be positive".to_string(),
            ));
        }
        self.bound = Some(Bound {
            model: DiseaseModel::new(parameters)?,
            probability: 1.0 / parameters.seed_per_n_people as f64,
        });
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
        let bound = bound(self.bound.as_ref(), self.name())?;
        if self.last_timestep.is_some_and(|last| timestep > last) {
            return Ok(false);
        }
        let mut seeded = 0;
        for index in 0..cell.len() {
            if cell.people()[index].is_susceptible() && rng.random_bool(bound.probability) {
                bound.model.expose(cell, index, timestep, rng)?;
                seeded += 1;
            }
        }
        if seeded > 0 {
            info!("timestep {timestep}: seeded {seeded} infections in cell {}", cell.index());
        }
        Ok(true)
    }
}
