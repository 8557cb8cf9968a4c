//! Statistics ledgers
//!
//! One ledger per node type. Ledgers are owned by their node and mutated
//! only through the node's own operations (the recording methods are
//! crate-private); everything else, the driver included, reads them. The
//! driver's only write access is `clear()` between warm-up and measurement.
//!
//! Durations are accumulated as exact `SimTime`; the queue-size integral is
//! the one quantity kept in `f64` since it is a count times a time.

use crate::core::SimTime;
use serde::{Deserialize, Serialize};

/// Ledger for a service unit (and the device or source wrapping it)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitStats {
    busy_time: SimTime,
    total_time: SimTime,
    requests: u64,
    served: u64,
}

impl UnitStats {
    pub fn busy_time(&self) -> SimTime {
        self.busy_time
    }

    pub fn total_time(&self) -> SimTime {
        self.total_time
    }

    /// Pieces of work started.
    pub fn requests(&self) -> u64 {
        self.requests
    }

    pub fn served(&self) -> u64 {
        self.served
    }

    /// `busy_time / total_time`, 0 before any time has elapsed.
    pub fn utilization(&self) -> f64 {
        ratio(self.busy_time, self.total_time)
    }

    pub(crate) fn add_busy(&mut self, dt: SimTime) {
        self.busy_time += dt;
        self.total_time += dt;
    }

    pub(crate) fn add_idle(&mut self, dt: SimTime) {
        self.total_time += dt;
    }

    pub(crate) fn add_request(&mut self) {
        self.requests += 1;
    }

    pub(crate) fn add_served(&mut self) {
        self.served += 1;
    }

    pub fn clear(&mut self) {
        *self = UnitStats::default();
    }
}

/// Ledger for a queue
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    requests: u64,
    served: u64,
    max_backlog: u64,
    observed_time: SimTime,
    /// Integral of backlog over time
    backlog_integral: f64,
}

impl QueueStats {
    pub fn requests(&self) -> u64 {
        self.requests
    }

    pub fn served(&self) -> u64 {
        self.served
    }

    pub fn max_backlog(&self) -> u64 {
        self.max_backlog
    }

    pub fn observed_time(&self) -> SimTime {
        self.observed_time
    }

    /// Item-time spent waiting: the integral of backlog over time.
    pub fn total_wait_time(&self) -> f64 {
        self.backlog_integral
    }

    /// Time-weighted mean backlog.
    pub fn average_queue_size(&self) -> f64 {
        if self.observed_time.is_zero() {
            0.0
        } else {
            self.backlog_integral / self.observed_time.as_units()
        }
    }

    /// Mean wait per served item.
    pub fn average_wait_time(&self) -> f64 {
        self.average_batch_wait_time(1)
    }

    /// Mean wait per dispatched batch of `batch_size` items.
    pub fn average_batch_wait_time(&self, batch_size: u64) -> f64 {
        if self.served == 0 {
            0.0
        } else {
            self.backlog_integral * batch_size as f64 / self.served as f64
        }
    }

    pub(crate) fn add_request(&mut self, backlog_after: u64) {
        self.requests += 1;
        self.max_backlog = self.max_backlog.max(backlog_after);
    }

    pub(crate) fn add_served(&mut self, items: u64) {
        self.served += items;
    }

    pub(crate) fn record(&mut self, backlog: u64, dt: SimTime) {
        self.observed_time += dt;
        self.backlog_integral += backlog as f64 * dt.as_units();
    }

    pub fn clear(&mut self) {
        *self = QueueStats::default();
    }
}

/// Ledger for a router
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouterStats {
    requests: u64,
    forwarded: u64,
    blocked: u64,
    refused: u64,
    availability: Availability,
}

impl RouterStats {
    pub fn requests(&self) -> u64 {
        self.requests
    }

    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }

    /// Requests turned away because the router's condition was false.
    pub fn blocked(&self) -> u64 {
        self.blocked
    }

    /// Requests turned away because no candidate could take the item.
    pub fn refused(&self) -> u64 {
        self.refused
    }

    pub fn total_time(&self) -> SimTime {
        self.availability.total_time
    }

    pub fn availability(&self) -> f64 {
        self.availability.fraction()
    }

    /// Items forwarded per unit of time.
    pub fn throughput(&self) -> f64 {
        per_unit(self.forwarded, self.availability.total_time)
    }

    /// Mean time between requests.
    pub fn mean_inter_request_time(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.availability.total_time.as_units() / self.requests as f64
        }
    }

    pub(crate) fn add_request(&mut self) {
        self.requests += 1;
    }

    pub(crate) fn add_forwarded(&mut self) {
        self.forwarded += 1;
    }

    pub(crate) fn add_blocked(&mut self) {
        self.blocked += 1;
    }

    pub(crate) fn add_refused(&mut self) {
        self.refused += 1;
    }

    pub(crate) fn record(&mut self, open: bool, dt: SimTime) {
        self.availability.record(open, dt);
    }

    pub fn clear(&mut self) {
        *self = RouterStats::default();
    }
}

/// Ledger for a gate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateStats {
    requests: u64,
    forwarded: u64,
    failures: u64,
    availability: Availability,
}

impl GateStats {
    pub fn requests(&self) -> u64 {
        self.requests
    }

    /// Requests passed to the primary successor.
    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn failure_probability(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.failures as f64 / self.requests as f64
        }
    }

    pub fn total_time(&self) -> SimTime {
        self.availability.total_time
    }

    pub fn availability(&self) -> f64 {
        self.availability.fraction()
    }

    pub fn throughput(&self) -> f64 {
        per_unit(self.forwarded, self.availability.total_time)
    }

    pub(crate) fn add_request(&mut self) {
        self.requests += 1;
    }

    pub(crate) fn add_forwarded(&mut self) {
        self.forwarded += 1;
    }

    pub(crate) fn add_failure(&mut self) {
        self.failures += 1;
    }

    pub(crate) fn record(&mut self, open: bool, dt: SimTime) {
        self.availability.record(open, dt);
    }

    pub fn clear(&mut self) {
        *self = GateStats::default();
    }
}

/// Time-weighted fraction of elapsed time a predicate held.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
struct Availability {
    open_time: SimTime,
    total_time: SimTime,
}

impl Availability {
    fn record(&mut self, open: bool, dt: SimTime) {
        self.total_time += dt;
        if open {
            self.open_time += dt;
        }
    }

    fn fraction(&self) -> f64 {
        ratio(self.open_time, self.total_time)
    }
}

fn ratio(part: SimTime, whole: SimTime) -> f64 {
    if whole.is_zero() {
        0.0
    } else {
        part.micros() as f64 / whole.micros() as f64
    }
}

fn per_unit(count: u64, time: SimTime) -> f64 {
    if time.is_zero() {
        0.0
    } else {
        count as f64 / time.as_units()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(units: f64) -> SimTime {
        SimTime::from_units(units)
    }

    #[test]
    fn test_utilization_zero_without_time() {
        assert_eq!(UnitStats::default().utilization(), 0.0);
    }

    #[test]
    fn test_utilization_ratio() {
        let mut s = UnitStats::default();
        s.add_busy(t(3.0));
        s.add_idle(t(1.0));
        assert_eq!(s.utilization(), 0.75);
        assert_eq!(s.total_time(), t(4.0));
    }

    #[test]
    fn test_queue_time_weighted_average() {
        let mut q = QueueStats::default();
        q.record(2, t(1.0));
        q.record(0, t(3.0));
        assert_eq!(q.total_wait_time(), 2.0);
        assert_eq!(q.average_queue_size(), 0.5);
    }

    #[test]
    fn test_queue_batch_wait_scales_with_batch() {
        let mut q = QueueStats::default();
        q.record(1, t(4.0));
        q.add_served(2);
        assert_eq!(q.average_wait_time(), 2.0);
        assert_eq!(q.average_batch_wait_time(2), 4.0);
    }

    #[test]
    fn test_gate_failure_probability() {
        let mut g = GateStats::default();
        assert_eq!(g.failure_probability(), 0.0);
        g.add_request();
        g.add_request();
        g.add_failure();
        assert_eq!(g.failure_probability(), 0.5);
    }

    #[test]
    fn test_availability_fraction() {
        let mut r = RouterStats::default();
        r.record(true, t(1.0));
        r.record(false, t(3.0));
        assert_eq!(r.availability(), 0.25);
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut r = RouterStats::default();
        r.add_request();
        r.record(true, t(1.0));
        r.clear();
        assert_eq!(r, RouterStats::default());
    }
}
