use indexmap::IndexSet;
use rand::Rng;

use crate::population::PersonId;
use crate::rand::seq::index::sample as choose_range;
use crate::random::sample_multiple_from_known_length;

/// A place where people from any cell mix, e.g. a school or workplace. Members are split into
/// numbered groups (classes, teams); transmission happens within a group.
///
/// A place aggregates people from many cells, so it is only ever mutated through
/// `&mut Population`. Sweeps running on the worker pool see places read-only.
#[derive(Clone, Debug)]
pub struct Place {
    pub place_type: usize,
    pub location: (f64, f64),
    /// Scales the place transmission rate of infectors within this place.
    pub infectiousness: f64,
    groups: Vec<IndexSet<PersonId>>,
}

impl Place {
    #[must_use]
    pub fn new(place_type: usize, location: (f64, f64), num_groups: usize) -> Self {
        Place {
            place_type,
            location,
            infectiousness: 1.0,
            groups: vec![IndexSet::new(); num_groups.max(1)],
        }
    }

    #[must_use]
    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    /// Adds `person` to `group`, growing the group list if needed. Returns `false` if the
    /// person was already a member of that group.
    pub(crate) fn add_member(&mut self, person: PersonId, group: usize) -> bool {
        if group >= self.groups.len() {
            self.groups.resize_with(group + 1, IndexSet::new);
        }
        self.groups[group].insert(person)
    }

    pub(crate) fn remove_member(&mut self, person: PersonId, group: usize) -> bool {
        match self.groups.get_mut(group) {
            Some(members) => members.swap_remove(&person),
            None => false,
        }
    }

    #[must_use]
    pub fn is_member(&self, person: PersonId, group: usize) -> bool {
        self.groups
            .get(group)
            .is_some_and(|members| members.contains(&person))
    }

    #[must_use]
    pub fn group_size(&self, group: usize) -> usize {
        self.groups.get(group).map_or(0, IndexSet::len)
    }

    pub fn members(&self, group: usize) -> impl Iterator<Item = PersonId> + '_ {
        self.groups
            .get(group)
            .into_iter()
            .flat_map(|members| members.iter().copied())
    }

    /// Samples one member of `group` uniformly. `None` for an empty or unknown group.
    pub fn sample_member<R: Rng>(&self, group: usize, rng: &mut R) -> Option<PersonId> {
        let members = self.groups.get(group)?;
        if members.is_empty() {
            return None;
        }
        members.get_index(rng.random_range(0..members.len())).copied()
    }

    /// Samples up to `requested` distinct members of `group` uniformly without replacement.
    pub fn sample_members<R: Rng>(
        &self,
        group: usize,
        requested: usize,
        rng: &mut R,
    ) -> Vec<PersonId> {
        let Some(members) = self.groups.get(group) else {
            return Vec::new();
        };
        let requested = requested.min(members.len());
        if requested == 0 {
            return Vec::new();
        }
        sample_multiple_from_known_length(rng, members.iter().copied(), requested)
    }

    /// Samples up to `requested` distinct members of `group` other than `exclude`.
    pub fn sample_other_members<R: Rng>(
        &self,
        group: usize,
        exclude: PersonId,
        requested: usize,
        rng: &mut R,
    ) -> Vec<PersonId> {
        let Some(members) = self.groups.get(group) else {
            return Vec::new();
        };
        let skip = members.get_index_of(&exclude);
        let available = members.len() - usize::from(skip.is_some());
        let requested = requested.min(available);
        if requested == 0 {
            return Vec::new();
        }
        choose_range(rng, available, requested)
            .into_iter()
            .filter_map(|i| {
                let i = match skip {
                    Some(s) if i >= s => i + 1,
                    _ => i,
                };
                members.get_index(i).copied()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::HashSet;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn place_with_members(n: usize) -> Place {
        let mut place = Place::new(0, (0.0, 0.0), 2);
        for i in 0..n {
            assert!(place.add_member(PersonId::new(i % 3, i), 0));
        }
        place
    }

    #[test]
    fn add_and_remove_members() {
        let mut place = place_with_members(4);
        assert_eq!(place.group_size(0), 4);
        assert!(!place.add_member(PersonId::new(0, 0), 0));
        assert!(place.remove_member(PersonId::new(0, 0), 0));
        assert!(!place.remove_member(PersonId::new(0, 0), 0));
        assert!(!place.remove_member(PersonId::new(0, 0), 7));
        assert_eq!(place.group_size(0), 3);
        assert_eq!(place.group_size(1), 0);
    }

    #[test]
    fn add_to_new_group_grows() {
        let mut place = Place::new(1, (1.0, 1.0), 1);
        place.add_member(PersonId::new(0, 0), 3);
        assert_eq!(place.num_groups(), 4);
        assert!(place.is_member(PersonId::new(0, 0), 3));
    }

    #[test]
    fn sampling_stays_within_group() {
        let place = place_with_members(10);
        let mut rng = SmallRng::seed_from_u64(42);
        for _ in 0..100 {
            let member = place.sample_member(0, &mut rng).unwrap();
            assert!(place.is_member(member, 0));
        }
        assert!(place.sample_member(1, &mut rng).is_none());

        let sampled = place.sample_members(0, 6, &mut rng);
        assert_eq!(sampled.len(), 6);
        let unique: HashSet<_> = sampled.iter().collect();
        assert_eq!(unique.len(), 6);

        // Asking for more than the group holds returns the whole group
        assert_eq!(place.sample_members(0, 50, &mut rng).len(), 10);
    }

    #[test]
    fn sampling_others_never_returns_excluded() {
        let place = place_with_members(5);
        let excluded = PersonId::new(2, 2);
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..200 {
            let sampled = place.sample_other_members(0, excluded, 2, &mut rng);
            assert_eq!(sampled.len(), 2);
            assert!(!sampled.contains(&excluded));
        }
        // Everyone else is returned when asking for the whole group
        let others = place.sample_other_members(0, excluded, 10, &mut rng);
        assert_eq!(others.len(), 4);

        // A non-member exclusion leaves the whole group available
        let outsider = PersonId::new(9, 9);
        assert_eq!(place.sample_other_members(0, outsider, 10, &mut rng).len(), 5);
    }
}
