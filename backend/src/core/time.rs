//! Simulated time
//!
//! Durations in the kernel are fixed-point: an `i64` count of micro-units
//! (six decimal places of one model time unit). Service units compare their
//! remaining time against exactly zero, so floating-point accumulation would
//! make completions drift; integer arithmetic keeps every step exact.
//!
//! CRITICAL: generator draws are converted to `SimTime` once, at draw time,
//! and never go back through `f64` inside the kernel.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Number of micro-units in one model time unit.
pub const MICROS_PER_UNIT: i64 = 1_000_000;

/// A non-negative span of simulated time.
///
/// # Example
/// ```
/// use queueing_sim_core::SimTime;
///
/// let a = SimTime::from_units(2.5);
/// let b = SimTime::from_units(0.5);
/// assert_eq!(a - b, SimTime::from_units(2.0));
/// assert_eq!((a + b).as_units(), 3.0);
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SimTime(i64);

impl SimTime {
    /// Zero duration.
    pub const ZERO: SimTime = SimTime(0);

    /// Sentinel reported by closed gates and routers: "blocked until further notice".
    pub const MAX: SimTime = SimTime(i64::MAX);

    /// Build from a raw micro-unit count.
    pub const fn from_micros(micros: i64) -> Self {
        SimTime(micros)
    }

    /// Build from model time units, rounding to the nearest micro-unit.
    ///
    /// Values beyond the representable range saturate; NaN maps to zero.
    pub fn from_units(units: f64) -> Self {
        if units.is_nan() {
            return SimTime::ZERO;
        }
        let scaled = (units * MICROS_PER_UNIT as f64).round();
        if scaled >= i64::MAX as f64 {
            SimTime::MAX
        } else if scaled <= i64::MIN as f64 {
            SimTime(i64::MIN)
        } else {
            SimTime(scaled as i64)
        }
    }

    /// Raw micro-unit count.
    pub const fn micros(self) -> i64 {
        self.0
    }

    /// Value in model time units.
    pub fn as_units(self) -> f64 {
        self.0 as f64 / MICROS_PER_UNIT as f64
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// True for the "blocked" sentinel.
    pub fn is_blocked(self) -> bool {
        self == SimTime::MAX
    }

    /// Subtraction clamped at zero.
    pub fn saturating_sub(self, other: SimTime) -> SimTime {
        SimTime(self.0.saturating_sub(other.0).max(0))
    }
}

impl Add for SimTime {
    type Output = SimTime;

    fn add(self, rhs: SimTime) -> SimTime {
        SimTime(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for SimTime {
    fn add_assign(&mut self, rhs: SimTime) {
        *self = *self + rhs;
    }
}

impl Sub for SimTime {
    type Output = SimTime;

    fn sub(self, rhs: SimTime) -> SimTime {
        SimTime(self.0 - rhs.0)
    }
}

impl SubAssign for SimTime {
    fn sub_assign(&mut self, rhs: SimTime) {
        *self = *self - rhs;
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_blocked() {
            write!(f, "blocked")
        } else {
            write!(f, "{:.6}", self.as_units())
        }
    }
}
