//! Incremental per-status counts for a cell or a microcell.
//!
//! Rebuilding a counter is *O*(*n*) in the number of people it covers, so it is done once by
//! `initialize`. After that every status change must be reported exactly once through
//! `notify`, which keeps per-timestep reporting *O*(1).

use strum::{EnumCount, IntoEnumIterator};

use crate::population::InfectionStatus;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompartmentCounter {
    counts: [usize; InfectionStatus::COUNT],
}

impl CompartmentCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the counts to those of the given statuses.
    pub fn initialize(&mut self, statuses: impl IntoIterator<Item = InfectionStatus>) {
        self.counts = [0; InfectionStatus::COUNT];
        for status in statuses {
            self.counts[status.index()] += 1;
        }
    }

    /// Counts a newly added person.
    pub(crate) fn add(&mut self, status: InfectionStatus) {
        self.counts[status.index()] += 1;
    }

    /// Moves one person from `old` to `new`.
    ///
    /// # Panics
    ///
    /// Panics if no person is counted under `old`; that means a status change was applied
    /// without going through the owning cell.
    pub fn notify(&mut self, old: InfectionStatus, new: InfectionStatus) {
        let old_count = &mut self.counts[old.index()];
        assert!(
            *old_count > 0,
            "compartment counter underflow moving {old} -> {new}"
        );
        *old_count -= 1;
        self.counts[new.index()] += 1;
    }

    #[must_use]
    pub fn get(&self, status: InfectionStatus) -> usize {
        self.counts[status.index()]
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (InfectionStatus, usize)> + '_ {
        InfectionStatus::iter().map(|status| (status, self.counts[status.index()]))
    }
}

impl std::ops::AddAssign<&CompartmentCounter> for CompartmentCounter {
    fn add_assign(&mut self, rhs: &CompartmentCounter) {
        for (lhs, rhs) in self.counts.iter_mut().zip(rhs.counts.iter()) {
            *lhs += rhs;
        }
    }
}
