//! A cell-structured kernel for agent-based epidemic simulation.
//!
//! The population is split into spatial *cells*, each holding people grouped into
//! microcells and households, plus a list of *places* (schools, workplaces) whose members
//! may come from any cell. A simulation advances in discrete timesteps. Every timestep a
//! sequence of *sweeps* runs over all cells:
//!
//! * transmission sweeps (`HouseholdSweep`, `PlaceSweep`, `SpatialSweep`) pick people to
//!   infect and add them to the pending queue of their cell;
//! * `NewInfectionSweep` drains the queues and exposes each queued person once;
//! * `HostProgressionSweep` moves infected people through the disease states and updates
//!   their infectiousness.
//!
//! Sweeps run on a `Simulation` (one thread) or a `ThreadedSimulation` (a rayon pool, with
//! sweeps arranged in numbered groups). Both are reproducible for a fixed seed; a threaded
//! run is reproducible for a fixed seed *and* thread count. Results are recorded by
//! `Reporter`s, and `runner` wraps the whole thing in a command line driver.
pub mod error;
pub mod execution_stats;
pub mod hashing;
pub mod log;
pub mod macros;
pub mod numeric;
pub mod parameters;
pub mod population;
#[cfg(feature = "progress_bar")]
mod progress;
pub mod random;
pub mod report;
pub mod runner;
pub mod simulation;
pub mod sweep;

pub use error::EpiError;
pub use execution_stats::{print_execution_statistics, ExecutionStatistics};
pub use parameters::Parameters;
pub use population::{InfectionStatus, PersonId, Population, PopulationConfig};
pub use random::{RandomManager, SimRng};
pub use report::{CompartmentReporter, Reporter};
pub use simulation::{Simulation, ThreadedSimulation};
pub use sweep::{Sweep, SweepAccess};

// Re-exports for users of the crate
pub use csv;
pub use rand;
