use std::sync::Arc;

use crate::error::EpiError;
use crate::log::debug;
use crate::parameters::Parameters;
use crate::population::{Cell, Population};
use crate::random::SimRng;
use crate::sweep::{bound, DiseaseModel, Sweep, SweepAccess};

/// Turns the people queued by the transmission sweeps into new infections.
///
/// Transmission sweeps only enqueue, so a person reached by several mechanisms in one
/// timestep is exposed exactly once, here. Queued people are exposed in index order.
#[derive(Default)]
pub struct NewInfectionSweep {
    model: Option<DiseaseModel>,
}

impl NewInfectionSweep {
    #[must_use]
    pub fn new() -> Self {
        NewInfectionSweep::default()
    }
}

impl Sweep for NewInfectionSweep {
    fn name(&self) -> &'static str {
        "new infection"
    }

    fn bind(
        &mut self,
        _population: &Population,
        parameters: &Arc<Parameters>,
    ) -> Result<(), EpiError> {
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
        // Queue order depends on which thread enqueued first
        let mut queued = Vec::with_capacity(cell.pending_len());
        cell.process_queue(|_, index| {
            queued.push(index);
            Ok(())
        })?;
        queued.sort_unstable();

        let mut exposed = 0;
        for index in queued {
            // Someone may have been queued twice across timesteps or seeded meanwhile
            if cell.person(index).is_some_and(|p| p.is_susceptible()) {
                model.expose(cell, index, timestep, rng)?;
                exposed += 1;
            }
        }
        if exposed > 0 {
            debug!("timestep {timestep}: {exposed} new infections in cell {}", cell.index());
        }
        Ok(true)
    }
}
