//! Service unit: the atomic resource of the network.
//!
//! A three-state machine driven by a duration generator:
//!
//! ```text
//!            accept()             advance() hits 0
//!   Idle ───────────────▶ Busy ───────────────────▶ Completed
//!    ▲                                                 │
//!    └──────────────────── rearm() ────────────────────┘
//! ```
//!
//! # Critical Invariants
//!
//! - `remaining` is meaningful only in `Busy`, and is then strictly positive
//! - `Busy -> Completed` happens exactly when `remaining` reaches zero
//! - the caller re-arms explicitly; `accept()` in `Completed` is an error

use crate::core::SimTime;
use crate::distributions::Distribution;
use crate::models::stats::UnitStats;
use crate::rng::SimRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Misuse of the service-unit state machine
#[derive(Debug, Error, PartialEq)]
pub enum UnitError {
    #[error("unit is not idle")]
    AlreadyBusy,

    #[error("unit is not busy")]
    NotBusy,

    #[error("advance by {requested} exceeds remaining {remaining}")]
    OverAdvance {
        requested: SimTime,
        remaining: SimTime,
    },

    #[error("generator drew non-positive duration {value}")]
    NonPositiveDraw { value: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitState {
    Idle,
    Busy,
    Completed,
}

/// A resource that consumes simulated time to do one piece of work.
///
/// # Example
/// ```
/// use queueing_sim_core::{Distribution, ServiceUnit, SimRng, SimTime, UnitState};
///
/// let mut rng = SimRng::new(1);
/// let mut unit = ServiceUnit::new(Distribution::Fixed { value: 4.0 });
///
/// unit.accept(&mut rng).unwrap();
/// assert_eq!(unit.remaining(), Some(SimTime::from_units(4.0)));
///
/// assert!(!unit.advance(SimTime::from_units(1.0)).unwrap());
/// assert!(unit.advance(SimTime::from_units(3.0)).unwrap());
/// assert_eq!(unit.state(), UnitState::Completed);
///
/// unit.rearm().unwrap();
/// assert_eq!(unit.state(), UnitState::Idle);
/// ```
#[derive(Debug, Clone)]
pub struct ServiceUnit {
    generator: Distribution,
    state: UnitState,
    remaining: SimTime,
    stats: UnitStats,
}

impl ServiceUnit {
    /// Create an idle unit.
    pub fn new(generator: Distribution) -> Self {
        Self {
            generator,
            state: UnitState::Idle,
            remaining: SimTime::ZERO,
            stats: UnitStats::default(),
        }
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == UnitState::Idle
    }

    pub fn is_busy(&self) -> bool {
        self.state == UnitState::Busy
    }

    /// Time to completion; `None` unless busy.
    pub fn remaining(&self) -> Option<SimTime> {
        match self.state {
            UnitState::Busy => Some(self.remaining),
            UnitState::Idle | UnitState::Completed => None,
        }
    }

    pub fn generator(&self) -> &Distribution {
        &self.generator
    }

    pub fn stats(&self) -> &UnitStats {
        &self.stats
    }

    pub fn clear_stats(&mut self) {
        self.stats.clear();
    }

    /// Start a piece of work: draw a duration and go `Idle -> Busy`.
    ///
    /// # Errors
    /// - `AlreadyBusy` unless idle
    /// - `NonPositiveDraw` if the draw rounds to zero or below
    pub fn accept(&mut self, rng: &mut SimRng) -> Result<(), UnitError> {
        if self.state != UnitState::Idle {
            return Err(UnitError::AlreadyBusy);
        }

        let value = self.generator.sample(rng);
        let duration = SimTime::from_units(value);
        if !duration.is_positive() {
            return Err(UnitError::NonPositiveDraw { value });
        }

        self.remaining = duration;
        self.state = UnitState::Busy;
        self.stats.add_request();
        Ok(())
    }

    /// Make progress on the current piece of work.
    ///
    /// Returns `true` when this call completed the work.
    ///
    /// # Errors
    /// - `NotBusy` unless busy
    /// - `OverAdvance` if `dt` exceeds the remaining time
    pub fn advance(&mut self, dt: SimTime) -> Result<bool, UnitError> {
        if self.state != UnitState::Busy {
            return Err(UnitError::NotBusy);
        }
        if dt > self.remaining {
            return Err(UnitError::OverAdvance {
                requested: dt,
                remaining: self.remaining,
            });
        }

        self.remaining -= dt;
        self.stats.add_busy(dt);

        if self.remaining.is_zero() {
            self.state = UnitState::Completed;
            self.stats.add_served();
            return Ok(true);
        }
        Ok(false)
    }

    /// Account idle (or blocked) time.
    ///
    /// # Errors
    /// `AlreadyBusy` while busy.
    pub fn wait_idle(&mut self, dt: SimTime) -> Result<(), UnitError> {
        if self.state == UnitState::Busy {
            return Err(UnitError::AlreadyBusy);
        }
        self.stats.add_idle(dt);
        Ok(())
    }

    /// `Completed -> Idle`. A no-op on an idle unit.
    ///
    /// # Errors
    /// `AlreadyBusy` while busy.
    pub fn rearm(&mut self) -> Result<(), UnitError> {
        match self.state {
            UnitState::Busy => Err(UnitError::AlreadyBusy),
            UnitState::Idle | UnitState::Completed => {
                self.state = UnitState::Idle;
                self.remaining = SimTime::ZERO;
                Ok(())
            }
        }
    }
}
