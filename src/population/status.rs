use serde_derive::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumIter, EnumString, IntoEnumIterator};

/// The infection compartment a person currently occupies.
///
/// The discriminants are dense and start at zero so that a status can index a fixed-size
/// array (see `CompartmentCounter` and the transition matrix).
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumIter,
    EnumCount,
    EnumString,
    Display,
)]
pub enum InfectionStatus {
    #[default]
    Susceptible,
    Exposed,
    InfectASympt,
    InfectMild,
    InfectGP,
    InfectHosp,
    InfectICU,
    InfectICURecov,
    Recovered,
    Dead,
}

impl InfectionStatus {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// The status with the given dense index.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        InfectionStatus::iter().nth(index)
    }

    /// Statuses that place a person in the infectious prefix of their cell.
    #[must_use]
    pub fn is_infectious(self) -> bool {
        matches!(
            self,
            InfectionStatus::InfectASympt
                | InfectionStatus::InfectMild
                | InfectionStatus::InfectGP
                | InfectionStatus::InfectHosp
                | InfectionStatus::InfectICU
                | InfectionStatus::InfectICURecov
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, InfectionStatus::Recovered | InfectionStatus::Dead)
    }
}
