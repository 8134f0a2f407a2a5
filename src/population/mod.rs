//! The population data model: cells of people grouped into microcells and households, plus a
//! flat list of places that draw members from any cell.
//!
//! Everything is linked by index. A person is addressed by `PersonId { cell, index }` and
//! resolved through the `Population` root; places refer to people the same way and people
//! refer to places by position in `Population::places`.
mod cell;
mod compartment_counter;
mod factory;
mod household;
mod microcell;
mod person;
mod place;
mod status;

pub use cell::Cell;
pub use compartment_counter::CompartmentCounter;
pub use factory::{PopulationConfig, ToyPopulationFactory};
pub use household::{Household, HouseholdParams};
pub use microcell::Microcell;
pub use person::{Person, PersonId, PersonParams, PlaceMembership};
pub use place::Place;
pub use status::InfectionStatus;

use crate::error::EpiError;

#[derive(Debug, Default)]
pub struct Population {
    cells: Vec<Cell>,
    places: Vec<Place>,
}

impl Population {
    #[must_use]
    pub fn new() -> Self {
        Population::default()
    }

    /// Adds an empty cell at `location` and returns its index.
    pub fn add_cell(&mut self, location: (f64, f64)) -> usize {
        let index = self.cells.len();
        self.cells.push(Cell::new(index, location));
        index
    }

    /// Adds a place and returns its index.
    pub fn add_place(&mut self, place: Place) -> usize {
        self.places.push(place);
        self.places.len() - 1
    }

    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    #[must_use]
    pub fn cell(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    pub fn cell_mut(&mut self, index: usize) -> Option<&mut Cell> {
        self.cells.get_mut(index)
    }

    #[must_use]
    pub fn places(&self) -> &[Place] {
        &self.places
    }

    #[must_use]
    pub fn place(&self, index: usize) -> Option<&Place> {
        self.places.get(index)
    }

    #[must_use]
    pub fn person(&self, id: PersonId) -> Option<&Person> {
        self.cells.get(id.cell)?.person(id.index)
    }

    #[must_use]
    pub fn total_people(&self) -> usize {
        self.cells.iter().map(Cell::len).sum()
    }

    /// Sums the cell-level compartment counters.
    #[must_use]
    pub fn compartment_totals(&self) -> CompartmentCounter {
        let mut totals = CompartmentCounter::new();
        for cell in &self.cells {
            totals += cell.compartment_counter();
        }
        totals
    }

    /// Rebuilds every cell's counters and partitions from current statuses.
    pub fn initialize_counters(&mut self) {
        for cell in &mut self.cells {
            cell.initialize_counters();
        }
    }

    /// Queues `id` for the next new-infection sweep on the cell that owns them.
    pub fn enqueue_person(&self, id: PersonId) -> bool {
        self.cells
            .get(id.cell)
            .is_some_and(|cell| cell.enqueue_person(id.index))
    }

    /// Adds `id` to group `group` of place `place`, recording the membership on both sides.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown person or place.
    pub fn add_place_member(
        &mut self,
        id: PersonId,
        place: usize,
        group: usize,
    ) -> Result<(), EpiError> {
        let target = self
            .places
            .get_mut(place)
            .ok_or_else(|| EpiError::EpiError(format!("no place {place}")))?;
        let person = self
            .cells
            .get_mut(id.cell)
            .and_then(|cell| cell.person_mut(id.index))
            .ok_or_else(|| EpiError::EpiError(format!("no person {id}")))?;
        if target.add_member(id, group) {
            person.places.push(PlaceMembership { place, group });
        }
        Ok(())
    }

    /// Removes `id` from group `group` of place `place`. Returns `false` if they were not a
    /// member.
    pub fn remove_place_member(&mut self, id: PersonId, place: usize, group: usize) -> bool {
        let Some(target) = self.places.get_mut(place) else {
            return false;
        };
        let Some(person) = self
            .cells
            .get_mut(id.cell)
            .and_then(|cell| cell.person_mut(id.index))
        else {
            return false;
        };
        if !target.remove_member(id, group) {
            return false;
        }
        person
            .places
            .retain(|membership| *membership != PlaceMembership { place, group });
        true
    }
}
