use std::fmt::{self, Display};

use serde_derive::Serialize;

use crate::population::InfectionStatus;

/// Identifies a person by the cell that owns them and their stable position in that cell's
/// person list. Positions never change once the population is built.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize)]
pub struct PersonId {
    pub cell: usize,
    pub index: usize,
}

impl PersonId {
    #[must_use]
    pub fn new(cell: usize, index: usize) -> Self {
        PersonId { cell, index }
    }
}

impl Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.cell, self.index)
    }
}

/// Per-person parameters and scheduling state.
#[derive(Clone, Debug, PartialEq)]
pub struct PersonParams {
    pub age_group: usize,
    pub susceptibility: f64,
    pub infectiousness: f64,
    pub initial_infectiousness: f64,
    /// The status the person moves to at `next_status_time`.
    pub next_status: Option<InfectionStatus>,
    pub next_status_time: Option<u32>,
    pub infection_start: Option<u32>,
}

impl Default for PersonParams {
    fn default() -> Self {
        PersonParams {
            age_group: 0,
            susceptibility: 1.0,
            infectiousness: 0.0,
            initial_infectiousness: 0.0,
            next_status: None,
            next_status_time: None,
            infection_start: None,
        }
    }
}

/// A place membership: the place index in `Population::places` and the group within it.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct PlaceMembership {
    pub place: usize,
    pub group: usize,
}

#[derive(Clone, Debug)]
pub struct Person {
    pub(crate) status: InfectionStatus,
    pub params: PersonParams,
    pub(crate) microcell: usize,
    /// Position in the owning microcell's person list.
    pub(crate) microcell_pos: usize,
    /// Index into the owning microcell's household list.
    pub(crate) household: Option<usize>,
    pub(crate) places: Vec<PlaceMembership>,
    /// Position in the owning cell's partition ordering.
    pub(crate) list_pos: usize,
}

impl Person {
    pub(crate) fn new(microcell: usize, microcell_pos: usize, params: PersonParams) -> Self {
        Person {
            status: InfectionStatus::Susceptible,
            params,
            microcell,
            microcell_pos,
            household: None,
            places: Vec::new(),
            list_pos: 0,
        }
    }

    #[must_use]
    pub fn status(&self) -> InfectionStatus {
        self.status
    }

    #[must_use]
    pub fn age_group(&self) -> usize {
        self.params.age_group
    }

    #[must_use]
    pub fn microcell(&self) -> usize {
        self.microcell
    }

    #[must_use]
    pub fn household(&self) -> Option<usize> {
        self.household
    }

    #[must_use]
    pub fn places(&self) -> &[PlaceMembership] {
        &self.places
    }

    #[must_use]
    pub fn list_pos(&self) -> usize {
        self.list_pos
    }

    #[must_use]
    pub fn is_susceptible(&self) -> bool {
        self.status == InfectionStatus::Susceptible
    }
}
