//! Builds synthetic populations for experiments and tests. Real populations come from
//! external data loaders; this factory only needs to produce the same shape of data.

use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;
use serde_derive::Deserialize;

use crate::error::EpiError;
use crate::log::debug;
use crate::population::{HouseholdParams, PersonId, PersonParams, Place, Population};

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct PopulationConfig {
    pub cells: usize,
    pub microcells_per_cell: usize,
    pub people_per_microcell: usize,
    /// Household sizes are drawn uniformly from `1..=max_household_size`; 0 disables
    /// households.
    pub max_household_size: usize,
    pub places: usize,
    pub place_groups: usize,
    /// Probability that a person is a member of some place.
    pub place_probability: f64,
    /// Relative weights of the age groups. Empty means everyone is in age group 0.
    pub age_proportions: Vec<f64>,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        PopulationConfig {
            cells: 1,
            microcells_per_cell: 1,
            people_per_microcell: 100,
            max_household_size: 0,
            places: 0,
            place_groups: 1,
            place_probability: 0.0,
            age_proportions: Vec::new(),
        }
    }
}

pub struct ToyPopulationFactory;

impl ToyPopulationFactory {
    /// Lays `config.cells` cells out on a unit-spaced square grid and fills them.
    ///
    /// # Errors
    ///
    /// Returns `EpiError::ConfigError` for an invalid age distribution or place probability.
    pub fn build<R: Rng>(config: &PopulationConfig, rng: &mut R) -> Result<Population, EpiError> {
        if !(0.0..=1.0).contains(&config.place_probability) {
            return Err(EpiError::ConfigError(format!(
                "place_probability {} is not a probability",
                config.place_probability
            )));
        }
        let ages = if config.age_proportions.is_empty() {
            None
        } else {
            Some(WeightedIndex::new(&config.age_proportions).map_err(|e| {
                EpiError::ConfigError(format!("invalid age_proportions: {e}"))
            })?)
        };

        let mut population = Population::new();
        let side = (config.cells as f64).sqrt().ceil().max(1.0) as usize;
        for c in 0..config.cells {
            let location = ((c % side) as f64, (c / side) as f64);
            let cell_index = population.add_cell(location);
            let Some(cell) = population.cell_mut(cell_index) else {
                continue;
            };
            for _ in 0..config.microcells_per_cell {
                let mc = cell.add_microcell();
                let mut members = Vec::with_capacity(config.people_per_microcell);
                for _ in 0..config.people_per_microcell {
                    let params = PersonParams {
                        age_group: ages.as_ref().map_or(0, |ages| ages.sample(rng)),
                        ..PersonParams::default()
                    };
                    members.push(cell.add_person(mc, params)?);
                }

                if config.max_household_size > 0 {
                    let mut remaining = members.as_slice();
                    while !remaining.is_empty() {
                        let size = rng
                            .random_range(1..=config.max_household_size)
                            .min(remaining.len());
                        let household = cell.add_household(
                            mc,
                            HouseholdParams {
                                location,
                                ..HouseholdParams::default()
                            },
                        )?;
                        for &index in &remaining[..size] {
                            cell.add_to_household(index, household)?;
                        }
                        remaining = &remaining[size..];
                    }
                }
            }
        }

        if config.places > 0 {
            let extent = side as f64;
            for p in 0..config.places {
                let location = (rng.random_range(0.0..extent), rng.random_range(0.0..extent));
                population.add_place(Place::new(p % 3, location, config.place_groups));
            }
            for c in 0..population.cells().len() {
                for index in 0..population.cells()[c].len() {
                    if rng.random_bool(config.place_probability) {
                        let place = rng.random_range(0..config.places);
                        let group = rng.random_range(0..config.place_groups.max(1));
                        population.add_place_member(PersonId::new(c, index), place, group)?;
                    }
                }
            }
        }

        debug!(
            "built toy population: {} cells, {} people, {} places",
            population.cells().len(),
            population.total_people(),
            population.places().len()
        );
        Ok(population)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::InfectionStatus;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn config() -> PopulationConfig {
        PopulationConfig {
            cells: 4,
            microcells_per_cell: 2,
            people_per_microcell: 25,
            max_household_size: 4,
            places: 3,
            place_groups: 2,
            place_probability: 0.5,
            age_proportions: vec![0.2, 0.5, 0.3],
        }
    }

    #[test]
    fn builds_requested_shape() {
        let mut rng = SmallRng::seed_from_u64(1);
        let population = ToyPopulationFactory::build(&config(), &mut rng).unwrap();
        assert_eq!(population.cells().len(), 4);
        assert_eq!(population.total_people(), 200);
        assert_eq!(population.places().len(), 3);
        assert_eq!(
            population
                .compartment_totals()
                .get(InfectionStatus::Susceptible),
            200
        );

        for cell in population.cells() {
            assert_eq!(cell.microcells().len(), 2);
            // Everyone lives in exactly one household
            for person in cell.people() {
                assert!(person.household().is_some());
                assert!(person.age_group() < 3);
            }
            let housed: usize = cell
                .microcells()
                .iter()
                .flat_map(|mc| mc.households())
                .map(|h| h.len())
                .sum();
            assert_eq!(housed, cell.len());
        }

        let members: usize = population
            .places()
            .iter()
            .map(|p| (0..p.num_groups()).map(|g| p.group_size(g)).sum::<usize>())
            .sum();
        let memberships: usize = population
            .cells()
            .iter()
            .flat_map(|c| c.people())
            .map(|p| p.places().len())
            .sum();
        assert_eq!(members, memberships);
    }

    #[test]
    fn same_seed_same_population() {
        let a = ToyPopulationFactory::build(&config(), &mut SmallRng::seed_from_u64(9)).unwrap();
        let b = ToyPopulationFactory::build(&config(), &mut SmallRng::seed_from_u64(9)).unwrap();
        let ages = |p: &Population| -> Vec<usize> {
            p.cells()
                .iter()
                .flat_map(|c| c.people())
                .map(|p| p.age_group())
                .collect()
        };
        assert_eq!(ages(&a), ages(&b));
    }

    #[test]
    fn rejects_bad_place_probability() {
        let config = PopulationConfig {
            place_probability: 1.5,
            ..PopulationConfig::default()
        };
        let result = ToyPopulationFactory::build(&config, &mut SmallRng::seed_from_u64(0));
        assert!(matches!(result, Err(EpiError::ConfigError(_))));
    }
}
