//! Reproducible randomness for a multi-threaded simulation.
//!
//! The `RandomManager` holds one generator per *worker slot*. A slot is a small integer the
//! controller assigns to each parallel task (the sequential controller only uses slot 0).
//! The threaded controller gives slot `s` the same block of cells every timestep, and every
//! per-cell work unit draws from the generator of its slot. Generators are created lazily, seeded from the base seed and the slot number, so two
//! runs with the same base seed and the same number of slots see the same stream per slot.
//!
//! Each slot's generator sits behind its own mutex. Different slots never contend, and the
//! lock guarantees that a generator is never used by two threads at once even if a caller
//! gets the slot assignment wrong.
mod inverse_cdf;
mod sampling_algorithms;

use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

pub use inverse_cdf::{InverseCdf, InverseCdfParams, INVERSE_CDF_RESOLUTION};
pub use sampling_algorithms::{binomial_or_all, sample_multiple_from_known_length};

use crate::hashing::hash_usize;
use crate::log::trace;
use crate::rand::distr::uniform::{SampleRange, SampleUniform};
use crate::rand::distr::Distribution;
use crate::rand::rngs::SmallRng;
use crate::rand::{Rng, SeedableRng};

/// The generator type handed to sweeps.
pub type SimRng = SmallRng;

pub struct RandomManager {
    base_seed: u64,
    generators: Vec<OnceLock<Mutex<SimRng>>>,
}

impl RandomManager {
    /// Creates a manager for `slots` worker slots. At least one slot is always available.
    #[must_use]
    pub fn new(base_seed: u64, slots: usize) -> Self {
        trace!("initializing random manager with {slots} slots, seed={base_seed}");
        RandomManager {
            base_seed,
            generators: (0..slots.max(1)).map(|_| OnceLock::new()).collect(),
        }
    }

    #[must_use]
    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    #[must_use]
    pub fn num_slots(&self) -> usize {
        self.generators.len()
    }

    /// The seed used for `slot`'s generator.
    #[must_use]
    pub fn seed_for_slot(&self, slot: usize) -> u64 {
        self.base_seed.wrapping_add(hash_usize(slot))
    }

    /// Discards all generators and changes the base seed. Generators are re-created on first
    /// use.
    pub fn reset(&mut self, base_seed: u64) {
        self.base_seed = base_seed;
        for generator in &mut self.generators {
            generator.take();
        }
    }

    /// Exclusive access to the generator of `slot`, creating it on first use.
    ///
    /// # Panics
    ///
    /// Panics if `slot >= self.num_slots()`.
    pub fn generator(&self, slot: usize) -> MutexGuard<'_, SimRng> {
        let Some(holder) = self.generators.get(slot) else {
            panic!(
                "worker slot {slot} out of range for a random manager with {} slots",
                self.generators.len()
            );
        };
        holder
            .get_or_init(|| {
                let seed = self.seed_for_slot(slot);
                trace!("creating new RNG (seed={seed}) for slot {slot}");
                Mutex::new(SimRng::seed_from_u64(seed))
            })
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `sampler` to the generator of `slot`.
    pub fn sample<T>(&self, slot: usize, sampler: impl FnOnce(&mut SimRng) -> T) -> T {
        let mut rng = self.generator(slot);
        sampler(&mut rng)
    }

    /// Draws from `distribution` with the generator of `slot`.
    pub fn sample_distr<T>(&self, slot: usize, distribution: impl Distribution<T>) -> T {
        self.sample(slot, |rng| distribution.sample(rng))
    }

    /// Draws uniformly from `range` with the generator of `slot`.
    pub fn random_range<S, T>(&self, slot: usize, range: S) -> T
    where
        S: SampleRange<T>,
        T: SampleUniform,
    {
        self.sample(slot, |rng| rng.random_range(range))
    }

    /// Draws a uniform `f64` in `[0, 1)` with the generator of `slot`.
    pub fn random_f64(&self, slot: usize) -> f64 {
        self.sample(slot, |rng| rng.random::<f64>())
    }
}
