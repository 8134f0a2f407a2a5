//! A cell owns its people by value and keeps them partitioned by infection state.
//!
//! `people` never reorders, so a `(cell, index)` pair identifies a person for the whole run.
//! The partition lives in a separate permutation, `sorted`: its first `num_infectious` entries
//! are the positions of the infectious people and the rest are everybody else. Each person
//! stores its own position in `sorted` (`list_pos`), so moving someone across the boundary is a
//! single swap. People in the `Exposed` compartment are tracked in their own set because they
//! are progressing but not yet transmitting.
//!
//! The pending queue is the only part of a cell that other cells' sweeps write to. It is behind
//! a mutex so that transmission sweeps can enqueue through a shared `&Population` from any
//! worker thread.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use indexmap::IndexSet;
use log::trace;

use crate::error::EpiError;
use crate::hashing::HashSet;
use crate::population::{
    CompartmentCounter, Household, HouseholdParams, InfectionStatus, Microcell, Person,
    PersonParams,
};

/// People waiting to become exposed at the next new-infection sweep.
#[derive(Debug, Default)]
struct PendingQueue {
    order: VecDeque<usize>,
    queued: HashSet<usize>,
}

#[derive(Debug)]
pub struct Cell {
    index: usize,
    location: (f64, f64),
    people: Vec<Person>,
    microcells: Vec<Microcell>,
    sorted: Vec<usize>,
    num_infectious: usize,
    exposed: IndexSet<usize>,
    pending: Mutex<PendingQueue>,
    counter: CompartmentCounter,
}

impl Cell {
    #[must_use]
    pub fn new(index: usize, location: (f64, f64)) -> Self {
        Cell {
            index,
            location,
            people: Vec::new(),
            microcells: Vec::new(),
            sorted: Vec::new(),
            num_infectious: 0,
            exposed: IndexSet::new(),
            pending: Mutex::new(PendingQueue::default()),
            counter: CompartmentCounter::new(),
        }
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn location(&self) -> (f64, f64) {
        self.location
    }

    // Construction

    /// Adds an empty microcell and returns its index.
    pub fn add_microcell(&mut self) -> usize {
        self.microcells.push(Microcell::new());
        self.microcells.len() - 1
    }

    /// Adds a susceptible person to `microcell` and returns their position in the cell.
    ///
    /// # Errors
    ///
    /// Returns an error if the microcell does not exist.
    pub fn add_person(&mut self, microcell: usize, params: PersonParams) -> Result<usize, EpiError> {
        let index = self.people.len();
        let mc = self.microcells.get_mut(microcell).ok_or_else(|| {
            EpiError::EpiError(format!(
                "cell {} has no microcell {microcell}",
                self.index
            ))
        })?;
        let mut person = Person::new(microcell, mc.people.len(), params);
        mc.people.push(index);
        mc.counter.add(person.status);
        self.counter.add(person.status);

        person.list_pos = self.sorted.len();
        self.sorted.push(index);
        self.people.push(person);
        Ok(index)
    }

    /// Adds an empty household to `microcell` and returns its index within that microcell.
    ///
    /// # Errors
    ///
    /// Returns an error if the microcell does not exist.
    pub fn add_household(
        &mut self,
        microcell: usize,
        params: HouseholdParams,
    ) -> Result<usize, EpiError> {
        let mc = self.microcells.get_mut(microcell).ok_or_else(|| {
            EpiError::EpiError(format!(
                "cell {} has no microcell {microcell}",
                self.index
            ))
        })?;
        mc.households.push(Household::new(params));
        Ok(mc.households.len() - 1)
    }

    /// Places the person at `index` into a household of their own microcell.
    ///
    /// # Errors
    ///
    /// A person belongs to at most one household; joining a second one is an error, as is an
    /// unknown person or household.
    pub fn add_to_household(&mut self, index: usize, household: usize) -> Result<(), EpiError> {
        let person = self
            .people
            .get_mut(index)
            .ok_or_else(|| EpiError::EpiError(format!("cell {} has no person {index}", self.index)))?;
        if let Some(existing) = person.household {
            return Err(EpiError::EpiError(format!(
                "person {}:{index} already belongs to household {existing}",
                self.index
            )));
        }
        let target = self.microcells[person.microcell]
            .households
            .get_mut(household)
            .ok_or_else(|| {
                EpiError::EpiError(format!(
                    "microcell {} of cell {} has no household {household}",
                    person.microcell, self.index
                ))
            })?;
        target.add_member(person.microcell_pos);
        person.household = Some(household);
        Ok(())
    }

    /// Removes the person at `index` from their household, if they have one.
    pub fn leave_household(&mut self, index: usize) -> bool {
        let Some(person) = self.people.get_mut(index) else {
            return false;
        };
        let Some(household) = person.household.take() else {
            return false;
        };
        self.microcells[person.microcell].households[household].remove_member(person.microcell_pos)
    }

    // Access

    #[must_use]
    pub fn people(&self) -> &[Person] {
        &self.people
    }

    #[must_use]
    pub fn person(&self, index: usize) -> Option<&Person> {
        self.people.get(index)
    }

    /// Mutable access to a person's parameters. Status changes go through `set_status`.
    pub fn params_mut(&mut self, index: usize) -> Option<&mut PersonParams> {
        self.people.get_mut(index).map(|person| &mut person.params)
    }

    pub(crate) fn person_mut(&mut self, index: usize) -> Option<&mut Person> {
        self.people.get_mut(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.people.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }

    #[must_use]
    pub fn microcells(&self) -> &[Microcell] {
        &self.microcells
    }

    /// The household of the person at `index`, if any.
    #[must_use]
    pub fn household_of(&self, index: usize) -> Option<&Household> {
        let person = self.people.get(index)?;
        self.microcells[person.microcell].household(person.household?)
    }

    /// Cell positions of the members of the household the person at `index` lives in.
    pub fn household_members(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        let microcell = self.people.get(index).map(|person| &self.microcells[person.microcell]);
        self.household_of(index)
            .into_iter()
            .flat_map(Household::members)
            .filter_map(move |local| microcell.and_then(|mc| mc.people.get(local).copied()))
    }

    #[must_use]
    pub fn compartment_counter(&self) -> &CompartmentCounter {
        &self.counter
    }

    #[must_use]
    pub fn num_infectious(&self) -> usize {
        self.num_infectious
    }

    #[must_use]
    pub fn num_exposed(&self) -> usize {
        self.exposed.len()
    }

    /// Positions of the infectious people, in partition order.
    pub fn infectious(&self) -> impl ExactSizeIterator<Item = usize> + '_ {
        self.sorted[..self.num_infectious].iter().copied()
    }

    /// Positions of the non-infectious people, in partition order.
    pub fn non_infectious(&self) -> impl ExactSizeIterator<Item = usize> + '_ {
        self.sorted[self.num_infectious..].iter().copied()
    }

    pub fn exposed(&self) -> impl ExactSizeIterator<Item = usize> + '_ {
        self.exposed.iter().copied()
    }

    // Visitation. The callback returns `true` to continue; each visit returns `false` if the
    // callback stopped it early.

    pub fn visit_people(&self, mut callback: impl FnMut(usize, &Person) -> bool) -> bool {
        self.people
            .iter()
            .enumerate()
            .all(|(index, person)| callback(index, person))
    }

    pub fn visit_infectious(&self, mut callback: impl FnMut(usize, &Person) -> bool) -> bool {
        self.infectious()
            .all(|index| callback(index, &self.people[index]))
    }

    pub fn visit_non_infectious(&self, mut callback: impl FnMut(usize, &Person) -> bool) -> bool {
        self.non_infectious()
            .all(|index| callback(index, &self.people[index]))
    }

    pub fn visit_exposed(&self, mut callback: impl FnMut(usize, &Person) -> bool) -> bool {
        self.exposed()
            .all(|index| callback(index, &self.people[index]))
    }

    // Partition bookkeeping

    fn swap_sorted(&mut self, a: usize, b: usize) {
        self.sorted.swap(a, b);
        let (first, second) = (self.sorted[a], self.sorted[b]);
        self.people[first].list_pos = a;
        self.people[second].list_pos = b;
    }

    /// Moves the person at `index` into the infectious prefix. Returns `false` if they were
    /// already there.
    pub fn mark_infectious(&mut self, index: usize) -> bool {
        let pos = self.people[index].list_pos;
        if pos < self.num_infectious {
            return false;
        }
        self.swap_sorted(pos, self.num_infectious);
        self.num_infectious += 1;
        true
    }

    /// Moves the person at `index` out of the infectious prefix. Returns `false` if they were
    /// not in it.
    pub fn mark_non_infectious(&mut self, index: usize) -> bool {
        let pos = self.people[index].list_pos;
        if pos >= self.num_infectious {
            return false;
        }
        self.swap_sorted(pos, self.num_infectious - 1);
        self.num_infectious -= 1;
        true
    }

    pub fn mark_exposed(&mut self, index: usize) -> bool {
        self.exposed.insert(index)
    }

    pub fn mark_non_exposed(&mut self, index: usize) -> bool {
        self.exposed.swap_remove(&index)
    }

    /// Changes the status of the person at `index` and returns the previous status.
    ///
    /// This is the single path through which statuses change: the cell and microcell
    /// counters are notified once, and the infectious partition and exposed set follow the
    /// new status.
    pub fn set_status(&mut self, index: usize, status: InfectionStatus) -> InfectionStatus {
        let person = &mut self.people[index];
        let old = person.status;
        if old == status {
            return old;
        }
        person.status = status;
        let microcell = person.microcell;
        self.counter.notify(old, status);
        self.microcells[microcell].counter.notify(old, status);

        if status.is_infectious() {
            self.mark_infectious(index);
        } else {
            self.mark_non_infectious(index);
        }
        if status == InfectionStatus::Exposed {
            self.mark_exposed(index);
        } else {
            self.mark_non_exposed(index);
        }
        trace!("cell {}: person {index} {old} -> {status}", self.index);
        old
    }

    /// Rebuilds the counters, the infectious partition and the exposed set from the people's
    /// current statuses.
    pub fn initialize_counters(&mut self) {
        let statuses: Vec<InfectionStatus> = self.people.iter().map(Person::status).collect();
        self.counter.initialize(statuses.iter().copied());
        for mc in &mut self.microcells {
            mc.counter
                .initialize(mc.people.iter().map(|&index| statuses[index]));
        }

        self.exposed.clear();
        for (index, status) in statuses.iter().enumerate() {
            if status.is_infectious() {
                self.mark_infectious(index);
            } else {
                self.mark_non_infectious(index);
            }
            if *status == InfectionStatus::Exposed {
                self.exposed.insert(index);
            }
        }
    }

    // Pending queue

    fn pending(&self) -> MutexGuard<'_, PendingQueue> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues the person at `index` for the next new-infection sweep. Returns `false` if they
    /// were already queued.
    pub fn enqueue_person(&self, index: usize) -> bool {
        let mut pending = self.pending();
        if !pending.queued.insert(index) {
            return false;
        }
        pending.order.push_back(index);
        true
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending().order.len()
    }

    /// Drains the pending queue, calling `callback` for each queued person in FIFO order. The
    /// queue is empty when this returns, whether or not the callback failed.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `callback`; the remaining entries are dropped.
    pub fn process_queue<F>(&mut self, mut callback: F) -> Result<(), EpiError>
    where
        F: FnMut(&mut Cell, usize) -> Result<(), EpiError>,
    {
        let pending = std::mem::take(
            self.pending
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for index in pending.order {
            callback(self, index)?;
        }
        Ok(())
    }
}
