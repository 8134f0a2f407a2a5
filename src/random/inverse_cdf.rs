//! Table-driven sampling of stochastic durations.
//!
//! A table holds the inverse cumulative distribution of a unit-mean delay at
//! `INVERSE_CDF_RESOLUTION + 1` evenly spaced quantiles. The values are stored as `exp(-v)` so
//! that a draw only needs one interpolation and one logarithm: pick a uniform quantile, find
//! its bucket, interpolate linearly between the two neighbouring stored values, take
//! `-mean * ln(..)` and convert days to timesteps, rounding to the nearest timestep.

use rand::Rng;
use serde_derive::Deserialize;

use crate::error::EpiError;

/// Number of buckets in an inverse-CDF table. Tables carry one more value than this.
pub const INVERSE_CDF_RESOLUTION: usize = 20;

/// The on-disk form of a table: a mean in days and the raw quantile values.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct InverseCdfParams {
    pub mean: f64,
    pub values: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(try_from = "InverseCdfParams")]
pub struct InverseCdf {
    mean: f64,
    table: [f64; INVERSE_CDF_RESOLUTION + 1],
}

impl InverseCdf {
    /// Builds a table from raw quantile values.
    ///
    /// # Errors
    ///
    /// Returns `EpiError::ConfigError` if `values` does not hold exactly
    /// `INVERSE_CDF_RESOLUTION + 1` entries, if any entry is negative or NaN, or if the mean is
    /// negative or NaN.
    pub fn new(mean: f64, values: &[f64]) -> Result<Self, EpiError> {
        if values.len() != INVERSE_CDF_RESOLUTION + 1 {
            return Err(EpiError::ConfigError(format!(
                "inverse CDF table needs {} values, got {}",
                INVERSE_CDF_RESOLUTION + 1,
                values.len()
            )));
        }
        if mean.is_nan() || mean < 0.0 {
            return Err(EpiError::ConfigError(format!(
                "inverse CDF mean must be non-negative, got {mean}"
            )));
        }
        let mut table = [0.0; INVERSE_CDF_RESOLUTION + 1];
        for (slot, &value) in table.iter_mut().zip(values) {
            if value.is_nan() || value < 0.0 {
                return Err(EpiError::ConfigError(format!(
                    "inverse CDF values must be non-negative, got {value}"
                )));
            }
            *slot = (-value).exp();
        }
        Ok(InverseCdf { mean, table })
    }

    /// A delay that is always `mean` days: every quantile maps to one mean.
    #[must_use]
    pub fn constant(mean: f64) -> Self {
        InverseCdf {
            mean: mean.max(0.0),
            table: [(-1.0f64).exp(); INVERSE_CDF_RESOLUTION + 1],
        }
    }

    #[must_use]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Draws a delay in whole timesteps.
    pub fn choose<R: Rng + ?Sized>(&self, timesteps_per_day: u32, rng: &mut R) -> u32 {
        let q = rng.random::<f64>() * INVERSE_CDF_RESOLUTION as f64;
        let bucket = (q.floor() as usize).min(INVERSE_CDF_RESOLUTION - 1);
        let offset = q - bucket as f64;
        let interpolated = offset * self.table[bucket + 1] + (1.0 - offset) * self.table[bucket];
        let days = -self.mean * interpolated.ln();
        let steps = (0.5 + days * f64::from(timesteps_per_day)).floor();
        if steps.is_nan() || steps <= 0.0 {
            0
        } else {
            steps as u32
        }
    }
}

impl TryFrom<InverseCdfParams> for InverseCdf {
    type Error = EpiError;

    fn try_from(params: InverseCdfParams) -> Result<Self, Self::Error> {
        InverseCdf::new(params.mean, &params.values)
    }
}
