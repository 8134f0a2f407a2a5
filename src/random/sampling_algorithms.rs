//! Algorithms for uniform random sampling from containers that can be iterated but not
//! necessarily indexed, such as the membership sets of a place group.

use crate::rand::seq::index::sample as choose_range;
use crate::rand::Rng;

/// Sample multiple random elements uniformly without replacement from a container of known length.
/// This function assumes `iter.len() >= requested` and `requested > 0`.
///
/// We do not assume the container is randomly indexable, only that it can be iterated over.
/// The chosen positions are drawn up front and sorted, so the iterator is walked at most once
/// and stops at the last chosen element.
pub fn sample_multiple_from_known_length<I, R, T>(rng: &mut R, iter: I, requested: usize) -> Vec<T>
where
    R: Rng,
    I: IntoIterator<Item = T> + ExactSizeIterator<Item = T>,
{
    let mut indexes = Vec::with_capacity(requested);
    indexes.extend(choose_range(rng, iter.len(), requested));
    indexes.sort_unstable();
    let mut index_iterator = indexes.into_iter();
    let Some(mut next_idx) = index_iterator.next() else {
        return Vec::new();
    };
    let mut selected = Vec::with_capacity(requested);

    for (idx, item) in iter.enumerate() {
        if idx == next_idx {
            selected.push(item);
            if let Some(i) = index_iterator.next() {
                next_idx = i;
            } else {
                break;
            }
        }
    }

    selected
}

/// Counts how many of `trials` independent Bernoulli(`p`) attempts succeed, or returns all of
/// them when `p >= 1`.
pub fn binomial_or_all<R: Rng>(rng: &mut R, trials: usize, p: f64) -> usize {
    use rand_distr::{Binomial, Distribution};

    if trials == 0 || p <= 0.0 {
        return 0;
    }
    if p >= 1.0 {
        return trials;
    }
    match Binomial::new(trials as u64, p) {
        Ok(binomial) => binomial.sample(rng) as usize,
        // `p` is in (0, 1) here, so construction only fails for NaN.
        Err(_) => 0,
    }
}
