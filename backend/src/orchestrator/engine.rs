//! Simulation Engine
//!
//! Drives a `Network` in variable-sized steps: every step jumps straight to
//! the earliest pending event among the reachable nodes.
//!
//! # Architecture
//!
//! ```text
//! Simulation::new(network)
//!   discover: breadth-first from the sources, each node visited once
//!
//! For each step (budget = remaining horizon):
//! 1. Ask every discovered node for its pending time
//! 2. dt = min(earliest pending, budget)      (no pending at all: NoLiveEvents)
//! 3. Advance every node by dt, in REVERSE discovery order
//! 4. elapsed += dt
//! ```
//!
//! Advancing downstream nodes first means a device freed in this step is
//! already idle when its upstream queue dispatches into it. An item sent
//! back upstream (a feedback loop) reaches a node that has not been
//! advanced yet; the network advances that node on arrival and step 3
//! then skips it, so each node moves by dt exactly once per step.
//!
//! # Example
//!
//! ```rust
//! use queueing_sim_core::{Distribution, Network, SimTime, Simulation};
//!
//! let mut net = Network::new(42);
//! let src = net.add_source("Arrivals", Distribution::Fixed { value: 5.0 }).unwrap();
//! let queue = net.add_queue("Queue").unwrap();
//! let server = net.add_device("Server", Distribution::Fixed { value: 10.0 }).unwrap();
//! net.connect(src, queue).unwrap();
//! net.connect(queue, server).unwrap();
//!
//! let mut sim = Simulation::new(net).unwrap();
//! sim.run(SimTime::from_units(100.0)).unwrap();
//!
//! let report = sim.report().unwrap();
//! assert_eq!(report.metric("Server", "served"), Some(9.0));
//! ```

use crate::core::SimTime;
use crate::error::SimulationError;
use crate::network::{Network, NodeId};
use crate::orchestrator::report::SimulationReport;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info, trace};

/// Outcome of one `run` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Driver steps taken
    pub steps: u64,
    /// Simulated time covered
    pub advanced: SimTime,
}

/// Nodes reachable from `sources`, breadth-first, each exactly once.
///
/// Router candidates and gate alternates are followed. A node is marked
/// when it is enqueued, so a feedback loop cannot enqueue it twice.
pub fn discover(network: &Network, sources: &[NodeId]) -> Result<Vec<NodeId>, SimulationError> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();
    let mut order = Vec::new();

    for &source in sources {
        network.node(source)?;
        if seen.insert(source) {
            queue.push_back(source);
        }
    }

    while let Some(id) = queue.pop_front() {
        order.push(id);
        for next in network.successors(id)? {
            if seen.insert(next) {
                queue.push_back(next);
            }
        }
    }

    Ok(order)
}

/// The driver: owns the network, the discovery order and the clock
#[derive(Debug, Clone)]
pub struct Simulation {
    network: Network,
    sources: Vec<NodeId>,
    order: Vec<NodeId>,
    elapsed: SimTime,
    measured_from: SimTime,
}

impl Simulation {
    /// Validate the network and discover it from all of its sources.
    pub fn new(network: Network) -> Result<Self, SimulationError> {
        let sources = network.sources();
        Self::with_sources(network, sources)
    }

    /// Discover from an explicit set of start nodes.
    pub fn with_sources(network: Network, sources: Vec<NodeId>) -> Result<Self, SimulationError> {
        network.validate()?;
        let order = discover(&network, &sources)?;
        debug!(
            sources = sources.len(),
            reachable = order.len(),
            total = network.len(),
            "network discovered"
        );

        Ok(Self {
            network,
            sources,
            order,
            elapsed: SimTime::ZERO,
            measured_from: SimTime::ZERO,
        })
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Mutable access, e.g. to pre-load items before the first step.
    ///
    /// Call `rediscover` after changing the topology.
    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    pub fn rediscover(&mut self) -> Result<(), SimulationError> {
        self.network.validate()?;
        self.order = discover(&self.network, &self.sources)?;
        Ok(())
    }

    /// Discovery order (upstream first).
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn elapsed(&self) -> SimTime {
        self.elapsed
    }

    /// Time since the last `clear_stats` (or since the start).
    pub fn measured(&self) -> SimTime {
        self.elapsed - self.measured_from
    }

    /// Earliest pending time among the discovered nodes.
    ///
    /// # Errors
    /// `NoLiveEvents` when no node has anything pending.
    pub fn next_event_in(&self) -> Result<SimTime, SimulationError> {
        let mut earliest: Option<SimTime> = None;
        for &id in &self.order {
            if let Some(t) = self.network.pending_time(id)? {
                earliest = Some(earliest.map_or(t, |e| e.min(t)));
            }
        }
        earliest.ok_or(SimulationError::NoLiveEvents)
    }

    /// Take one step of at most `budget`; returns the time advanced.
    pub fn step(&mut self, budget: SimTime) -> Result<SimTime, SimulationError> {
        let dt = self.next_event_in()?.min(budget);

        self.network.begin_step(dt, &self.order);
        let advanced = self.advance_all();
        self.network.finish_step();
        advanced?;

        self.elapsed += dt;
        trace!(dt = %dt, elapsed = %self.elapsed, "step");
        Ok(dt)
    }

    /// Reverse discovery order. A node an item already reached this step was
    /// caught up on arrival and is skipped here.
    fn advance_all(&mut self) -> Result<(), SimulationError> {
        for i in (0..self.order.len()).rev() {
            let id = self.order[i];
            self.network.catch_up(id)?;
        }
        Ok(())
    }

    /// Advance the clock by exactly `horizon`.
    pub fn run(&mut self, horizon: SimTime) -> Result<RunSummary, SimulationError> {
        info!(horizon = %horizon, start = %self.elapsed, "run started");

        let mut summary = RunSummary::default();
        let mut left = horizon;
        while left.is_positive() {
            let dt = self.step(left)?;
            left -= dt;
            summary.steps += 1;
            summary.advanced += dt;
        }

        info!(
            steps = summary.steps,
            elapsed = %self.elapsed,
            "run finished"
        );
        Ok(summary)
    }

    /// Zero every ledger and start measuring from now.
    pub fn clear_stats(&mut self) {
        self.network.clear_stats();
        self.measured_from = self.elapsed;
        info!(at = %self.elapsed, "statistics cleared");
    }

    /// Run `warmup`, discard its statistics, then run `horizon`.
    pub fn run_with_warmup(
        &mut self,
        warmup: SimTime,
        horizon: SimTime,
    ) -> Result<RunSummary, SimulationError> {
        let warm = self.run(warmup)?;
        self.clear_stats();
        let measured = self.run(horizon)?;
        Ok(RunSummary {
            steps: warm.steps + measured.steps,
            advanced: warm.advanced + measured.advanced,
        })
    }

    /// Statistics of every discovered node.
    pub fn report(&self) -> Result<SimulationReport, SimulationError> {
        SimulationReport::collect(&self.network, &self.order, self.elapsed, self.measured())
    }
}
