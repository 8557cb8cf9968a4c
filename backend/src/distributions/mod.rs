//! Random-variate generators for service and inter-arrival times.
//!
//! A `Distribution` is plain data: it is deserialized from a model file,
//! validated once, and sampled with the network's `SimRng`. Draws are raw
//! `f64`; conversion to `SimTime` (and the positivity check) happens in the
//! service unit that consumes them.
//!
//! # Example
//!
//! ```
//! use queueing_sim_core::{Distribution, SimRng};
//!
//! let mut rng = SimRng::new(42);
//! let service = Distribution::Erlang { mean: 8.0, variance: 32.0 };
//! service.validate().unwrap();
//!
//! let draw = service.sample(&mut rng);
//! assert!(draw > 0.0);
//! ```

use crate::rng::SimRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid generator parameters
#[derive(Debug, Error, PartialEq)]
pub enum DistributionError {
    #[error("fixed value must be positive, got {0}")]
    NonPositiveFixed(f64),

    #[error("uniform upper bound {max} must exceed lower bound {min}")]
    InvertedBounds { min: f64, max: f64 },

    #[error("mean must be positive, got {0}")]
    NonPositiveMean(f64),

    #[error("standard deviation must be non-negative, got {0}")]
    NegativeStdDev(f64),

    #[error("variance must be positive, got {0}")]
    NonPositiveVariance(f64),

    #[error("sum needs at least one part")]
    EmptySum,
}

/// Duration generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dist", rename_all = "snake_case")]
pub enum Distribution {
    /// Always the same value
    Fixed { value: f64 },

    /// Uniform on `(min, max)`
    Uniform { min: f64, max: f64 },

    /// Exponential with the given mean
    Exponential { mean: f64 },

    /// Normal, re-drawn until the sample is strictly positive
    PositiveNormal { mean: f64, std_dev: f64 },

    /// Erlang matched to a target mean and variance.
    ///
    /// Shape `k = max(1, round(mean² / variance))`, rate `k / mean`.
    Erlang { mean: f64, variance: f64 },

    /// Sum of independent draws from each part
    Sum { parts: Vec<Distribution> },
}

impl Distribution {
    /// Check parameters. Call once before sampling.
    pub fn validate(&self) -> Result<(), DistributionError> {
        match self {
            Distribution::Fixed { value } => {
                if *value > 0.0 {
                    Ok(())
                } else {
                    Err(DistributionError::NonPositiveFixed(*value))
                }
            }
            Distribution::Uniform { min, max } => {
                if max > min {
                    Ok(())
                } else {
                    Err(DistributionError::InvertedBounds {
                        min: *min,
                        max: *max,
                    })
                }
            }
            Distribution::Exponential { mean } => positive_mean(*mean),
            Distribution::PositiveNormal { mean, std_dev } => {
                positive_mean(*mean)?;
                if *std_dev < 0.0 {
                    return Err(DistributionError::NegativeStdDev(*std_dev));
                }
                Ok(())
            }
            Distribution::Erlang { mean, variance } => {
                positive_mean(*mean)?;
                if *variance <= 0.0 {
                    return Err(DistributionError::NonPositiveVariance(*variance));
                }
                Ok(())
            }
            Distribution::Sum { parts } => {
                if parts.is_empty() {
                    return Err(DistributionError::EmptySum);
                }
                parts.iter().try_for_each(Distribution::validate)
            }
        }
    }

    /// Draw one value.
    pub fn sample(&self, rng: &mut SimRng) -> f64 {
        match self {
            Distribution::Fixed { value } => *value,
            Distribution::Uniform { min, max } => min + (max - min) * rng.next_open_f64(),
            Distribution::Exponential { mean } => -mean * rng.next_open_f64().ln(),
            Distribution::PositiveNormal { mean, std_dev } => loop {
                let n = mean + std_dev * rng.standard_normal();
                if n > 0.0 {
                    break n;
                }
            },
            Distribution::Erlang { mean, variance } => {
                let k = erlang_shape(*mean, *variance);
                let rate = k as f64 / mean;
                (0..k).map(|_| -rng.next_open_f64().ln() / rate).sum()
            }
            Distribution::Sum { parts } => parts.iter().map(|p| p.sample(rng)).sum(),
        }
    }

    /// Theoretical mean.
    pub fn mean(&self) -> f64 {
        match self {
            Distribution::Fixed { value } => *value,
            Distribution::Uniform { min, max } => (min + max) / 2.0,
            Distribution::Exponential { mean } => *mean,
            // Truncation shifts this up; good enough for reporting.
            Distribution::PositiveNormal { mean, .. } => *mean,
            Distribution::Erlang { mean, .. } => *mean,
            Distribution::Sum { parts } => parts.iter().map(Distribution::mean).sum(),
        }
    }
}

fn positive_mean(mean: f64) -> Result<(), DistributionError> {
    if mean > 0.0 {
        Ok(())
    } else {
        Err(DistributionError::NonPositiveMean(mean))
    }
}

/// Erlang shape parameter for a target mean and variance.
pub fn erlang_shape(mean: f64, variance: f64) -> u32 {
    ((mean * mean) / variance).round().max(1.0) as u32
}
