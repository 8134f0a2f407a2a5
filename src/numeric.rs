//! Floating point comparisons for probabilities, rates and infectiousness values.

use approx::AbsDiffEq;

/// Default tolerance for comparing probabilities that should sum to one.
pub const PROBABILITY_TOLERANCE: f64 = 1e-9;

/// Compares two floats via `approx::abs_diff_eq` using a maximum absolute difference of `acc`.
/// Two infinities are equal only if they have the same sign.
#[must_use]
pub fn almost_eq(a: f64, b: f64, acc: f64) -> bool {
    if a.is_infinite() && b.is_infinite() {
        return a == b;
    }
    a.abs_diff_eq(&b, acc)
}

/// Whether `weights` sum to one within `PROBABILITY_TOLERANCE`.
#[must_use]
pub fn sums_to_one(weights: impl IntoIterator<Item = f64>) -> bool {
    almost_eq(weights.into_iter().sum(), 1.0, PROBABILITY_TOLERANCE)
}
