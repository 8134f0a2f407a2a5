use crate::hashing::HashSet;

/// Transmission scalars for a household. Both default to 1 so that the household
/// transmission rate alone controls the force of infection.
#[derive(Clone, Debug, PartialEq)]
pub struct HouseholdParams {
    pub susceptibility: f64,
    pub infectiousness: f64,
    pub location: (f64, f64),
}

impl Default for HouseholdParams {
    fn default() -> Self {
        HouseholdParams {
            susceptibility: 1.0,
            infectiousness: 1.0,
            location: (0.0, 0.0),
        }
    }
}

/// A set of people living together. Members are stored as microcell-local indices, i.e.
/// positions in the owning `Microcell::people` list.
#[derive(Clone, Debug, Default)]
pub struct Household {
    members: HashSet<usize>,
    pub params: HouseholdParams,
}

impl Household {
    #[must_use]
    pub fn new(params: HouseholdParams) -> Self {
        Household {
            members: HashSet::default(),
            params,
        }
    }

    /// Returns `false` if the member was already present.
    pub(crate) fn add_member(&mut self, microcell_index: usize) -> bool {
        self.members.insert(microcell_index)
    }

    pub(crate) fn remove_member(&mut self, microcell_index: usize) -> bool {
        self.members.remove(&microcell_index)
    }

    #[must_use]
    pub fn is_member(&self, microcell_index: usize) -> bool {
        self.members.contains(&microcell_index)
    }

    pub fn members(&self) -> impl Iterator<Item = usize> + '_ {
        self.members.iter().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
