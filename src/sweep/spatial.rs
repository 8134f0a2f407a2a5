use std::sync::Arc;

use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;
use rand_distr::Poisson;

use crate::error::EpiError;
use crate::log::debug;
use crate::parameters::Parameters;
use crate::population::{PersonId, Population};
use crate::random::SimRng;
use crate::sweep::{attempt_infection, bound, Sweep, SweepAccess};

/// Distances below this are treated as this distance by the inverse-distance kernel.
const MIN_DISTANCE: f64 = 1e-6;

/// Weight given to a target cell at a given distance from the infector's cell.
#[derive(Clone, Default)]
pub enum SpatialKernel {
    #[default]
    InverseDistance,
    Custom(Arc<dyn Fn(f64) -> f64 + Send + Sync>),
}

impl SpatialKernel {
    fn weight(&self, distance: f64) -> f64 {
        match self {
            SpatialKernel::InverseDistance => 1.0 / distance.max(MIN_DISTANCE),
            SpatialKernel::Custom(kernel) => kernel(distance).max(0.0),
        }
    }
}

struct Bound {
    scale: f64,
    /// Target-cell distribution per source cell; `None` where no other cell is reachable.
    targets: Vec<Option<WeightedIndex<f64>>>,
}

/// Transmission from infectors to people in other cells.
#[derive(Default)]
pub struct SpatialSweep {
    kernel: SpatialKernel,
    bound: Option<Bound>,
}

impl SpatialSweep {
    #[must_use]
    pub fn new() -> Self {
        SpatialSweep::default()
    }

    #[must_use]
    pub fn with_kernel(kernel: SpatialKernel) -> Self {
        SpatialSweep {
            kernel,
            bound: None,
        }
    }

    fn target_distribution(
        &self,
        population: &Population,
        source: usize,
        radius: f64,
    ) -> Option<WeightedIndex<f64>> {
        let (x, y) = population.cells()[source].location();
        let weights = population.cells().iter().map(|cell| {
            if cell.index() == source || cell.is_empty() {
                return 0.0;
            }
            let (tx, ty) = cell.location();
            let distance = (tx - x).hypot(ty - y);
            if radius > 0.0 && distance > radius {
                0.0
            } else {
                self.kernel.weight(distance)
            }
        });
        WeightedIndex::new(weights).ok()
    }
}

impl Sweep for SpatialSweep {
    fn name(&self) -> &'static str {
        "spatial"
    }

    fn bind(
        &mut self,
        population: &Population,
        parameters: &Arc<Parameters>,
    ) -> Result<(), EpiError> {
        let cells = population.cells().len();
        let targets: Vec<Option<WeightedIndex<f64>>> = if cells > 1 {
            (0..cells)
                .map(|source| {
                    self.target_distribution(population, source, parameters.infection_radius)
                })
                .collect()
        } else {
            Vec::new()
        };
        debug!(
            "binding spatial sweep over {cells} cells, {} with reachable neighbours",
            targets.iter().filter(|t| t.is_some()).count()
        );
        self.bound = Some(Bound {
            scale: parameters.basic_reproduction_number * parameters.spatial_transmission,
            targets,
        });
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
        let bound = bound(self.bound.as_ref(), self.name())?;
        if population.cells().len() <= 1 {
            return Ok(true);
        }
        let Some(source) = population.cell(cell) else {
            return Ok(true);
        };
        if source.num_infectious() == 0 {
            return Ok(true);
        }
        let Some(Some(targets)) = bound.targets.get(cell) else {
            return Ok(true);
        };

        for index in source.infectious() {
            let infector = PersonId::new(cell, index);
            let mean = bound.scale * source.people()[index].params.infectiousness;
            if mean <= 0.0 {
                continue;
            }
            let Ok(poisson) = Poisson::new(mean) else {
                continue;
            };
            let attempts: f64 = poisson.sample(rng);
            for _ in 0..attempts as u64 {
                let target_cell = targets.sample(rng);
                let Some(target) = population.cell(target_cell) else {
                    return Err(EpiError::InvariantViolation(format!(
                        "spatial sweep bound to a population without cell {target_cell}"
                    )));
                };
                if target.is_empty() {
                    continue;
                }
                let target = PersonId::new(target_cell, rng.random_range(0..target.len()));
                attempt_infection(population, infector, target, rng);
            }
        }
        Ok(true)
    }
}
