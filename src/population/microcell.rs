use crate::population::{CompartmentCounter, Household};

/// A sub-partition of a cell. It holds positions into its cell's person list, the households
/// living in it, and a compartment counter over exactly those people.
#[derive(Clone, Debug, Default)]
pub struct Microcell {
    pub(crate) people: Vec<usize>,
    pub(crate) households: Vec<Household>,
    pub(crate) counter: CompartmentCounter,
}

impl Microcell {
    #[must_use]
    pub fn new() -> Self {
        Microcell::default()
    }

    /// Cell positions of the people in this microcell, indexed by microcell-local index.
    #[must_use]
    pub fn people(&self) -> &[usize] {
        &self.people
    }

    #[must_use]
    pub fn households(&self) -> &[Household] {
        &self.households
    }

    #[must_use]
    pub fn household(&self, index: usize) -> Option<&Household> {
        self.households.get(index)
    }

    #[must_use]
    pub fn compartment_counter(&self) -> &CompartmentCounter {
        &self.counter
    }
}
