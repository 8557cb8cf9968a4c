//! Network arena
//!
//! A `Network` owns every node, a name index and the single random stream.
//! Nodes refer to each other by `NodeId`, so feedback loops are ordinary
//! data. All behaviour goes through one uniform contract:
//!
//! - `pending_time(id)`: time until the node's next self-initiated event;
//!   `None` means ready to take an item now, `Some(SimTime::MAX)` means
//!   blocked by a closed condition
//! - `advance(id, dt)`: move the node's clock forward; `dt` never exceeds
//!   its pending time
//! - `accept(id)`: push one item in; `Ok(false)` is a refusal
//! - `successors(id)` / `chosen_successor(id)`: outgoing edges
//!
//! # Critical Invariants
//!
//! 1. A device or source completion forwards exactly one item downstream
//! 2. Queues hold items only while their successor is busy or the backlog
//!    is below one batch
//! 3. Pending-time queries and accept cascades through routers and gates
//!    are bounded to `MAX_ROUTING_DEPTH` nested hops
//! 4. Within a driver step every discovered node is advanced exactly once,
//!    and before any item reaches it (see `begin_step`)

mod node;

pub use node::{
    DeviceNode, GateNode, Node, NodeId, NodeKind, NodeKindTag, QueueNode, RouterNode, SourceNode,
};

use crate::core::SimTime;
use crate::distributions::Distribution;
use crate::error::SimulationError;
use crate::models::{GateStats, QueueStats, RouterStats, ServiceUnit};
use crate::policy::{
    Candidate, Condition, ConditionContext, ConditionError, NetworkSnapshot, NodeAttribute,
    NodeState, SelectionPolicy,
};
use crate::rng::SimRng;
use std::cell::Cell;
use std::collections::HashMap;
use tracing::debug;

/// Nesting limit for router and gate hops, in pending-time queries and in
/// accept cascades
pub const MAX_ROUTING_DEPTH: u32 = 64;

type Result<T> = std::result::Result<T, SimulationError>;

/// Graph of nodes plus the random stream every draw comes from
#[derive(Debug, Clone)]
pub struct Network {
    nodes: Vec<Node>,
    names: HashMap<String, NodeId>,
    rng: SimRng,
    depth: Cell<u32>,
    step: Option<StepSync>,
}

/// Nodes still to be brought up to the end of the current driver step
#[derive(Debug, Clone)]
struct StepSync {
    dt: SimTime,
    pending: Vec<bool>,
}

impl Network {
    pub fn new(seed: u64) -> Self {
        Self::with_rng(SimRng::new(seed))
    }

    pub fn with_rng(rng: SimRng) -> Self {
        Self {
            nodes: Vec::new(),
            names: HashMap::new(),
            rng,
            depth: Cell::new(0),
            step: None,
        }
    }

    pub fn rng(&self) -> &SimRng {
        &self.rng
    }

    // ========================================================================
    // Construction
    // ========================================================================

    /// Add an arrival process. It draws its first inter-arrival time now.
    pub fn add_source(&mut self, name: &str, interarrival: Distribution) -> Result<NodeId> {
        self.check_new_name(name)?;
        interarrival
            .validate()
            .map_err(|e| SimulationError::from_distribution(name, e))?;

        let mut unit = ServiceUnit::new(interarrival);
        unit.accept(&mut self.rng)
            .map_err(|e| SimulationError::from_unit(name, e))?;

        Ok(self.insert(name, NodeKind::Source(SourceNode { unit, next: None })))
    }

    pub fn add_device(&mut self, name: &str, service: Distribution) -> Result<NodeId> {
        self.add_device_inner(name, service, None)
    }

    /// Add a device that rests for a `cooldown` draw after every item.
    pub fn add_device_with_cooldown(
        &mut self,
        name: &str,
        service: Distribution,
        cooldown: Distribution,
    ) -> Result<NodeId> {
        self.add_device_inner(name, service, Some(cooldown))
    }

    fn add_device_inner(
        &mut self,
        name: &str,
        service: Distribution,
        cooldown: Option<Distribution>,
    ) -> Result<NodeId> {
        self.check_new_name(name)?;
        service
            .validate()
            .map_err(|e| SimulationError::from_distribution(name, e))?;
        if let Some(cooldown) = &cooldown {
            cooldown
                .validate()
                .map_err(|e| SimulationError::from_distribution(name, e))?;
        }

        Ok(self.insert(
            name,
            NodeKind::Device(DeviceNode {
                unit: ServiceUnit::new(service),
                cooldown: cooldown.map(ServiceUnit::new),
                cooldown_time: SimTime::ZERO,
                next: None,
            }),
        ))
    }

    pub fn add_queue(&mut self, name: &str) -> Result<NodeId> {
        self.add_batch_queue(name, 1)
    }

    /// Add a queue that releases `batch_size` items per dispatch.
    pub fn add_batch_queue(&mut self, name: &str, batch_size: u64) -> Result<NodeId> {
        self.check_new_name(name)?;
        if batch_size == 0 {
            return Err(SimulationError::InvalidConfiguration(format!(
                "queue '{}' needs a batch size of at least 1",
                name
            )));
        }

        Ok(self.insert(
            name,
            NodeKind::Queue(QueueNode {
                backlog: 0,
                batch_size,
                next: None,
                stats: QueueStats::default(),
            }),
        ))
    }

    /// Add a router with no candidates; add them with `add_candidate`.
    pub fn add_router(&mut self, name: &str, policy: SelectionPolicy) -> Result<NodeId> {
        self.check_new_name(name)?;
        Ok(self.insert(
            name,
            NodeKind::Router(RouterNode {
                candidates: Vec::new(),
                policy,
                condition: None,
                stats: RouterStats::default(),
            }),
        ))
    }

    pub fn add_gate(&mut self, name: &str, condition: Condition) -> Result<NodeId> {
        self.check_new_name(name)?;
        check_condition(name, &condition)?;
        Ok(self.insert(
            name,
            NodeKind::Gate(GateNode {
                condition,
                primary: None,
                alternate: None,
                stats: GateStats::default(),
            }),
        ))
    }

    /// Set the successor of a source, device or queue, or a gate's primary path.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        self.node(to)?;
        let (name, kind, _) = self.split_mut(from)?;
        match kind {
            NodeKind::Source(s) => s.next = Some(to),
            NodeKind::Device(d) => d.next = Some(to),
            NodeKind::Queue(q) => q.next = Some(to),
            NodeKind::Gate(g) => g.primary = Some(to),
            NodeKind::Router(_) => {
                return Err(SimulationError::InvalidConfiguration(format!(
                    "router '{}' takes candidates, not a single successor",
                    name
                )))
            }
        }
        Ok(())
    }

    pub fn add_candidate(&mut self, router: NodeId, target: NodeId, weight: u32) -> Result<()> {
        self.node(target)?;
        let name = self.node(router)?.name.clone();
        if weight == 0 {
            return Err(SimulationError::InvalidConfiguration(format!(
                "router '{}' candidate weights must be positive",
                name
            )));
        }
        self.router_mut(router)?.candidates.push(Candidate {
            node: target,
            weight,
        });
        Ok(())
    }

    /// Guard a router: while `condition` is false it blocks every item.
    pub fn set_router_condition(&mut self, router: NodeId, condition: Condition) -> Result<()> {
        check_condition(self.node(router)?.name(), &condition)?;
        self.router_mut(router)?.condition = Some(condition);
        Ok(())
    }

    /// Overflow path taken by items a closed gate rejects.
    pub fn set_alternate(&mut self, gate: NodeId, target: NodeId) -> Result<()> {
        self.node(target)?;
        self.gate_mut(gate)?.alternate = Some(target);
        Ok(())
    }

    /// Structural checks that construction alone cannot enforce.
    ///
    /// Every router needs a candidate and every condition must name
    /// existing nodes.
    pub fn validate(&self) -> Result<()> {
        for node in &self.nodes {
            let condition = match &node.kind {
                NodeKind::Router(r) => {
                    if r.candidates.is_empty() {
                        return Err(SimulationError::InvalidConfiguration(format!(
                            "router '{}' has no candidates",
                            node.name
                        )));
                    }
                    r.condition.as_ref()
                }
                NodeKind::Gate(g) => Some(&g.condition),
                _ => None,
            };
            if let Some(condition) = condition {
                for referenced in condition.referenced_nodes() {
                    if !self.names.contains_key(referenced) {
                        return Err(SimulationError::Condition {
                            node: node.name.clone(),
                            source: ConditionError::UnknownNode(referenced.to_string()),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn id(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    /// Like `id`, but a missing name is an error.
    pub fn require(&self, name: &str) -> Result<NodeId> {
        self.id(name)
            .ok_or_else(|| SimulationError::UnknownNode(name.to_string()))
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| SimulationError::UnknownNode(id.to_string()))
    }

    pub fn name(&self, id: NodeId) -> Result<&str> {
        Ok(self.node(id)?.name())
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// Source nodes in insertion order.
    pub fn sources(&self) -> Vec<NodeId> {
        self.nodes()
            .filter(|(_, n)| n.tag() == NodeKindTag::Source)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn source(&self, id: NodeId) -> Result<&SourceNode> {
        match &self.node(id)?.kind {
            NodeKind::Source(s) => Ok(s),
            _ => Err(self.wrong_kind(id, NodeKindTag::Source)),
        }
    }

    pub fn device(&self, id: NodeId) -> Result<&DeviceNode> {
        match &self.node(id)?.kind {
            NodeKind::Device(d) => Ok(d),
            _ => Err(self.wrong_kind(id, NodeKindTag::Device)),
        }
    }

    pub fn queue(&self, id: NodeId) -> Result<&QueueNode> {
        match &self.node(id)?.kind {
            NodeKind::Queue(q) => Ok(q),
            _ => Err(self.wrong_kind(id, NodeKindTag::Queue)),
        }
    }

    pub fn router(&self, id: NodeId) -> Result<&RouterNode> {
        match &self.node(id)?.kind {
            NodeKind::Router(r) => Ok(r),
            _ => Err(self.wrong_kind(id, NodeKindTag::Router)),
        }
    }

    pub fn gate(&self, id: NodeId) -> Result<&GateNode> {
        match &self.node(id)?.kind {
            NodeKind::Gate(g) => Ok(g),
            _ => Err(self.wrong_kind(id, NodeKindTag::Gate)),
        }
    }

    /// Reset every ledger. Item state (busy units, backlogs) is kept.
    pub fn clear_stats(&mut self) {
        for node in &mut self.nodes {
            node.clear_stats();
        }
    }

    /// Observable state of every node at this instant.
    pub fn snapshot(&self) -> Result<NetworkSnapshot> {
        let mut snapshot = NetworkSnapshot::new();
        for (id, node) in self.nodes() {
            let state = NodeState {
                busy: self.pending_time(id)?.is_some(),
                backlog: node.backlog(),
                served: node.served(),
                requests: node.requests(),
            };
            snapshot.nodes.insert(node.name.clone(), state);
        }
        Ok(snapshot)
    }

    // ========================================================================
    // Driver steps
    // ========================================================================

    /// Open a step of length `dt` over the discovered nodes in `order`.
    ///
    /// Until `finish_step`, a node in `order` that has not yet been advanced
    /// is brought up to the end of the step before it takes an item, so an
    /// item sent back upstream never sees time that passed before it
    /// arrived. `dt` must not exceed any discovered node's pending time.
    pub(crate) fn begin_step(&mut self, dt: SimTime, order: &[NodeId]) {
        let mut pending = vec![false; self.nodes.len()];
        for id in order {
            if let Some(flag) = pending.get_mut(id.0) {
                *flag = true;
            }
        }
        self.step = Some(StepSync { dt, pending });
    }

    pub(crate) fn finish_step(&mut self) {
        self.step = None;
    }

    /// Advance `id` by the open step's `dt` unless that already happened.
    ///
    /// Outside a step this does nothing.
    pub(crate) fn catch_up(&mut self, id: NodeId) -> Result<()> {
        let dt = match self.step.as_mut() {
            Some(step) if step.pending.get(id.0).copied().unwrap_or(false) => {
                step.pending[id.0] = false;
                step.dt
            }
            _ => return Ok(()),
        };
        self.advance(id, dt)
    }

    // ========================================================================
    // Node contract
    // ========================================================================

    /// Time until the node's next self-initiated event; `None` when ready now.
    ///
    /// # Errors
    /// `InvalidConfiguration` when the query nests deeper than
    /// `MAX_ROUTING_DEPTH` (a router/gate cycle with nothing in between).
    pub fn pending_time(&self, id: NodeId) -> Result<Option<SimTime>> {
        let depth = self.depth.get();
        if depth >= MAX_ROUTING_DEPTH {
            return Err(SimulationError::InvalidConfiguration(format!(
                "pending-time query through '{}' exceeded {} hops; routing cycle without a device or queue",
                self.name(id)?,
                MAX_ROUTING_DEPTH
            )));
        }

        self.depth.set(depth + 1);
        let result = self.pending_time_inner(id);
        self.depth.set(depth);
        result
    }

    fn pending_time_inner(&self, id: NodeId) -> Result<Option<SimTime>> {
        let node = self.node(id)?;
        match &node.kind {
            NodeKind::Source(s) => Ok(s.unit.remaining()),
            NodeKind::Device(d) => Ok(d.pending()),
            NodeKind::Queue(_) => Ok(None),
            NodeKind::Router(r) => {
                if !self.condition_open(&node.name, r.condition.as_ref())? {
                    return Ok(Some(SimTime::MAX));
                }
                if !r.policy.considers_readiness() {
                    return Ok(None);
                }
                if r.candidates.is_empty() {
                    return Err(SimulationError::InvalidConfiguration(format!(
                        "router '{}' has no candidates",
                        node.name
                    )));
                }

                let mut earliest: Option<SimTime> = None;
                for candidate in &r.candidates {
                    match self.pending_time(candidate.node)? {
                        None => return Ok(None),
                        Some(t) => earliest = Some(earliest.map_or(t, |e| e.min(t))),
                    }
                }
                Ok(earliest)
            }
            NodeKind::Gate(g) => {
                if !self.condition_open(&node.name, Some(&g.condition))? {
                    return Ok(Some(SimTime::MAX));
                }
                match g.primary {
                    Some(primary) => self.pending_time(primary),
                    None => Ok(None),
                }
            }
        }
    }

    /// Move the node's clock forward by `dt`.
    ///
    /// Completions inside the interval forward items downstream before this
    /// returns.
    pub fn advance(&mut self, id: NodeId, dt: SimTime) -> Result<()> {
        match self.node(id)?.tag() {
            NodeKindTag::Source => self.advance_source(id, dt),
            NodeKindTag::Device => self.advance_device(id, dt),
            NodeKindTag::Queue => {
                let queue = self.queue_mut(id)?;
                queue.stats.record(queue.backlog, dt);
                self.dispatch(id)
            }
            NodeKindTag::Router => {
                let node = self.node(id)?;
                let open = self.condition_open(&node.name, self.router(id)?.condition.as_ref())?;
                self.router_mut(id)?.stats.record(open, dt);
                Ok(())
            }
            NodeKindTag::Gate => {
                let node = self.node(id)?;
                let open = self.condition_open(&node.name, Some(&self.gate(id)?.condition))?;
                self.gate_mut(id)?.stats.record(open, dt);
                Ok(())
            }
        }
    }

    /// Push one item into the node.
    ///
    /// `Ok(false)` means the item was refused (closed gate or router, or no
    /// ready candidate); it is counted in the node's ledger and dropped or
    /// sent down the gate's alternate path.
    ///
    /// # Errors
    /// - `UnsupportedByDesign` for sources
    /// - `AlreadyBusy` for a device that is working or cooling down
    pub fn accept(&mut self, id: NodeId) -> Result<bool> {
        let tag = self.node(id)?.tag();
        if tag == NodeKindTag::Source {
            return Err(SimulationError::UnsupportedByDesign {
                node: self.name(id)?.to_string(),
            });
        }
        // an item arriving mid-step lands at the step's end instant
        self.catch_up(id)?;

        match tag {
            NodeKindTag::Device => self.accept_device(id),
            NodeKindTag::Queue => {
                let queue = self.queue_mut(id)?;
                queue.backlog += 1;
                queue.stats.add_request(queue.backlog);
                self.dispatch(id)?;
                Ok(true)
            }
            _ => self.accept_routed(id, tag),
        }
    }

    /// Every outgoing edge: candidates for routers, primary then alternate
    /// for gates.
    pub fn successors(&self, id: NodeId) -> Result<Vec<NodeId>> {
        Ok(match &self.node(id)?.kind {
            NodeKind::Source(s) => s.next.into_iter().collect(),
            NodeKind::Device(d) => d.next.into_iter().collect(),
            NodeKind::Queue(q) => q.next.into_iter().collect(),
            NodeKind::Router(r) => r.candidates.iter().map(|c| c.node).collect(),
            NodeKind::Gate(g) => g.primary.into_iter().chain(g.alternate).collect(),
        })
    }

    /// The edge the next item would take right now.
    ///
    /// For probabilistic routers this makes a draw from the network's RNG.
    pub fn chosen_successor(&mut self, id: NodeId) -> Result<Option<NodeId>> {
        let node = self.node(id)?;
        match &node.kind {
            NodeKind::Source(s) => Ok(s.next),
            NodeKind::Device(d) => Ok(d.next),
            NodeKind::Queue(q) => Ok(q.next),
            NodeKind::Gate(g) => {
                let open = self.condition_open(&node.name, Some(&g.condition))?;
                Ok(if open { g.primary } else { g.alternate })
            }
            NodeKind::Router(r) => {
                if !self.condition_open(&node.name, r.condition.as_ref())? {
                    return Ok(None);
                }
                let (policy, candidates) = (r.policy, r.candidates.clone());
                let ready = self.readiness(policy, &candidates)?;
                Ok(policy.select(&candidates, &ready, &mut self.rng))
            }
        }
    }

    // ========================================================================
    // Per-kind behaviour
    // ========================================================================

    fn advance_source(&mut self, id: NodeId, dt: SimTime) -> Result<()> {
        let mut left = dt;
        loop {
            let (name, source, rng) = self.source_mut(id)?;
            let unit_err = |e| SimulationError::from_unit(name, e);

            if !source.unit.is_busy() {
                source.unit.accept(rng).map_err(unit_err)?;
            }
            let remaining = source.unit.remaining().unwrap_or(SimTime::MAX);
            if left < remaining {
                if left.is_positive() {
                    source.unit.advance(left).map_err(unit_err)?;
                }
                return Ok(());
            }

            // arrival: forward, then draw the next gap on the following pass
            source.unit.advance(remaining).map_err(unit_err)?;
            source.unit.rearm().map_err(unit_err)?;
            left -= remaining;
            let next = source.next;
            if let Some(next) = next {
                self.accept(next)?;
            }
        }
    }

    fn advance_device(&mut self, id: NodeId, dt: SimTime) -> Result<()> {
        let (name, device, rng) = self.device_mut(id)?;
        let unit_err = |e| SimulationError::from_unit(name, e);

        if device.unit.is_busy() {
            if !device.unit.advance(dt).map_err(unit_err)? {
                return Ok(());
            }
            // re-arm before forwarding so a loop back here finds the device
            // in cool-down rather than completed
            device.unit.rearm().map_err(unit_err)?;
            if let Some(cooldown) = &mut device.cooldown {
                cooldown.rearm().map_err(unit_err)?;
                cooldown.accept(rng).map_err(unit_err)?;
            }
            let next = device.next;
            if let Some(next) = next {
                self.accept(next)?;
            }
            return Ok(());
        }

        let cooling = device.cooling_down();
        match device.cooldown.as_mut() {
            Some(cooldown) if cooling => {
                if cooldown.advance(dt).map_err(unit_err)? {
                    cooldown.rearm().map_err(unit_err)?;
                }
                device.cooldown_time += dt;
            }
            Some(cooldown) => cooldown.wait_idle(dt).map_err(unit_err)?,
            None => {}
        }
        device.unit.wait_idle(dt).map_err(unit_err)
    }

    fn accept_device(&mut self, id: NodeId) -> Result<bool> {
        let (name, device, rng) = self.device_mut(id)?;
        if device.cooling_down() {
            return Err(SimulationError::AlreadyBusy {
                node: name.to_string(),
            });
        }
        device
            .unit
            .accept(rng)
            .map_err(|e| SimulationError::from_unit(name, e))?;
        Ok(true)
    }

    /// Release whole batches while the successor is ready.
    fn dispatch(&mut self, id: NodeId) -> Result<()> {
        loop {
            let Some(next) = self.queue(id)?.next else {
                return Ok(());
            };
            self.catch_up(next)?;

            let queue = self.queue(id)?;
            let (backlog, batch_size) = (queue.backlog, queue.batch_size);
            if backlog < batch_size || self.pending_time(next)?.is_some() {
                return Ok(());
            }

            let queue = self.queue_mut(id)?;
            queue.backlog -= batch_size;
            queue.stats.add_served(batch_size);
            self.accept(next)?;
        }
    }

    /// Router and gate hops, bounded by `MAX_ROUTING_DEPTH`.
    fn accept_routed(&mut self, id: NodeId, tag: NodeKindTag) -> Result<bool> {
        let depth = self.depth.get();
        if depth >= MAX_ROUTING_DEPTH {
            return Err(SimulationError::InvalidConfiguration(format!(
                "item reached '{}' after {} routing hops; routing cycle without a device",
                self.name(id)?,
                MAX_ROUTING_DEPTH
            )));
        }

        self.depth.set(depth + 1);
        let result = if tag == NodeKindTag::Router {
            self.accept_router(id)
        } else {
            self.accept_gate(id)
        };
        self.depth.set(depth);
        result
    }

    fn accept_router(&mut self, id: NodeId) -> Result<bool> {
        let name = self.name(id)?.to_string();
        let router = self.router(id)?;
        let open = self.condition_open(&name, router.condition.as_ref())?;
        let (policy, candidates) = (router.policy, router.candidates.clone());

        self.router_mut(id)?.stats.add_request();
        if !open {
            self.router_mut(id)?.stats.add_blocked();
            debug!(router = %name, "router closed, item blocked");
            return Ok(false);
        }

        if policy.considers_readiness() {
            for candidate in &candidates {
                self.catch_up(candidate.node)?;
            }
        }
        let ready = self.readiness(policy, &candidates)?;
        match policy.select(&candidates, &ready, &mut self.rng) {
            None => {
                self.router_mut(id)?.stats.add_refused();
                debug!(router = %name, "no ready candidate, item refused");
                Ok(false)
            }
            Some(target) => {
                self.router_mut(id)?.stats.add_forwarded();
                self.accept(target)
            }
        }
    }

    fn accept_gate(&mut self, id: NodeId) -> Result<bool> {
        let name = self.name(id)?.to_string();
        let gate = self.gate(id)?;
        let open = self.condition_open(&name, Some(&gate.condition))?;
        let (primary, alternate) = (gate.primary, gate.alternate);

        let stats = &mut self.gate_mut(id)?.stats;
        stats.add_request();
        if open {
            stats.add_forwarded();
            if let Some(primary) = primary {
                self.accept(primary)?;
            }
            Ok(true)
        } else {
            stats.add_failure();
            debug!(gate = %name, "gate closed, item rejected");
            if let Some(alternate) = alternate {
                self.accept(alternate)?;
            }
            Ok(false)
        }
    }

    fn readiness(&self, policy: SelectionPolicy, candidates: &[Candidate]) -> Result<Vec<bool>> {
        if !policy.considers_readiness() {
            return Ok(vec![true; candidates.len()]);
        }
        candidates
            .iter()
            .map(|c| Ok(self.pending_time(c.node)?.is_none()))
            .collect()
    }

    fn condition_open(&self, name: &str, condition: Option<&Condition>) -> Result<bool> {
        match condition {
            None => Ok(true),
            Some(condition) => {
                condition
                    .evaluate(self)
                    .map_err(|source| SimulationError::Condition {
                        node: name.to_string(),
                        source,
                    })
            }
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn check_new_name(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(SimulationError::InvalidConfiguration(
                "node names must not be empty".to_string(),
            ));
        }
        if self.names.contains_key(name) {
            return Err(SimulationError::InvalidConfiguration(format!(
                "duplicate node name '{}'",
                name
            )));
        }
        Ok(())
    }

    fn insert(&mut self, name: &str, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name: name.to_string(),
            kind,
        });
        self.names.insert(name.to_string(), id);
        id
    }

    fn wrong_kind(&self, id: NodeId, expected: NodeKindTag) -> SimulationError {
        let name = self.name(id).unwrap_or("?");
        SimulationError::InvalidConfiguration(format!("'{}' is not a {}", name, expected))
    }

    fn split_mut(&mut self, id: NodeId) -> Result<(&str, &mut NodeKind, &mut SimRng)> {
        let Network { nodes, rng, .. } = self;
        let node = nodes
            .get_mut(id.0)
            .ok_or_else(|| SimulationError::UnknownNode(id.to_string()))?;
        Ok((node.name.as_str(), &mut node.kind, rng))
    }

    fn source_mut(&mut self, id: NodeId) -> Result<(&str, &mut SourceNode, &mut SimRng)> {
        self.source(id)?;
        match self.split_mut(id)? {
            (name, NodeKind::Source(s), rng) => Ok((name, s, rng)),
            _ => Err(SimulationError::UnknownNode(id.to_string())),
        }
    }

    fn device_mut(&mut self, id: NodeId) -> Result<(&str, &mut DeviceNode, &mut SimRng)> {
        self.device(id)?;
        match self.split_mut(id)? {
            (name, NodeKind::Device(d), rng) => Ok((name, d, rng)),
            _ => Err(SimulationError::UnknownNode(id.to_string())),
        }
    }

    fn queue_mut(&mut self, id: NodeId) -> Result<&mut QueueNode> {
        self.queue(id)?;
        match self.split_mut(id)? {
            (_, NodeKind::Queue(q), _) => Ok(q),
            _ => Err(SimulationError::UnknownNode(id.to_string())),
        }
    }

    fn router_mut(&mut self, id: NodeId) -> Result<&mut RouterNode> {
        self.router(id)?;
        match self.split_mut(id)? {
            (_, NodeKind::Router(r), _) => Ok(r),
            _ => Err(SimulationError::UnknownNode(id.to_string())),
        }
    }

    fn gate_mut(&mut self, id: NodeId) -> Result<&mut GateNode> {
        self.gate(id)?;
        match self.split_mut(id)? {
            (_, NodeKind::Gate(g), _) => Ok(g),
            _ => Err(SimulationError::UnknownNode(id.to_string())),
        }
    }
}

fn check_condition(name: &str, condition: &Condition) -> Result<()> {
    condition
        .check_fields()
        .map_err(|source| SimulationError::Condition {
            node: name.to_string(),
            source,
        })
}

/// The live network as a condition context: reads state at the current instant.
impl ConditionContext for Network {
    fn attribute(
        &self,
        node: &str,
        attribute: NodeAttribute,
    ) -> std::result::Result<f64, ConditionError> {
        let id = self
            .id(node)
            .ok_or_else(|| ConditionError::UnknownNode(node.to_string()))?;
        let entry = &self.nodes[id.0];

        let busy = || {
            self.pending_time(id)
                .map(|p| p.is_some())
                .map_err(|e| ConditionError::Unavailable {
                    node: node.to_string(),
                    reason: e.to_string(),
                })
        };

        let state = match attribute {
            NodeAttribute::Busy | NodeAttribute::Ready => NodeState {
                busy: busy()?,
                ..NodeState::default()
            },
            NodeAttribute::Backlog | NodeAttribute::Served | NodeAttribute::Requests => {
                NodeState {
                    busy: false,
                    backlog: entry.backlog(),
                    served: entry.served(),
                    requests: entry.requests(),
                }
            }
        };
        Ok(state.attribute(attribute))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(value: f64) -> Distribution {
        Distribution::Fixed { value }
    }

    fn t(units: f64) -> SimTime {
        SimTime::from_units(units)
    }

    #[test]
    fn test_source_arms_on_construction() {
        let mut net = Network::new(1);
        let src = net.add_source("Arrivals", fixed(5.0)).unwrap();
        assert_eq!(net.pending_time(src).unwrap(), Some(t(5.0)));
    }

    #[test]
    fn test_source_refuses_items() {
        let mut net = Network::new(1);
        let src = net.add_source("Arrivals", fixed(5.0)).unwrap();
        assert_eq!(
            net.accept(src),
            Err(SimulationError::UnsupportedByDesign {
                node: "Arrivals".to_string()
            })
        );
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut net = Network::new(1);
        net.add_queue("Q").unwrap();
        assert!(matches!(
            net.add_device("Q", fixed(1.0)),
            Err(SimulationError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_device_busy_then_ready() {
        let mut net = Network::new(1);
        let dev = net.add_device("D", fixed(3.0)).unwrap();
        assert_eq!(net.pending_time(dev).unwrap(), None);
        assert!(net.accept(dev).unwrap());
        assert_eq!(net.pending_time(dev).unwrap(), Some(t(3.0)));
        assert!(matches!(
            net.accept(dev),
            Err(SimulationError::AlreadyBusy { .. })
        ));
        net.advance(dev, t(3.0)).unwrap();
        assert_eq!(net.pending_time(dev).unwrap(), None);
        assert_eq!(net.device(dev).unwrap().stats().served(), 1);
    }

    #[test]
    fn test_device_cooldown_blocks_and_counts_as_utilized() {
        let mut net = Network::new(1);
        let dev = net
            .add_device_with_cooldown("D", fixed(2.0), fixed(1.0))
            .unwrap();
        net.accept(dev).unwrap();
        net.advance(dev, t(2.0)).unwrap();

        assert_eq!(net.pending_time(dev).unwrap(), Some(t(1.0)));
        assert!(net.device(dev).unwrap().cooling_down());
        assert!(matches!(
            net.accept(dev),
            Err(SimulationError::AlreadyBusy { .. })
        ));

        net.advance(dev, t(1.0)).unwrap();
        assert_eq!(net.pending_time(dev).unwrap(), None);
        net.advance(dev, t(1.0)).unwrap();

        let device = net.device(dev).unwrap();
        assert_eq!(device.cooldown_time(), t(1.0));
        assert!((device.utilization() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_queue_forwards_to_ready_successor() {
        let mut net = Network::new(1);
        let q = net.add_queue("Q").unwrap();
        let dev = net.add_device("D", fixed(4.0)).unwrap();
        net.connect(q, dev).unwrap();

        assert!(net.accept(q).unwrap());
        assert_eq!(net.queue(q).unwrap().backlog(), 0);
        assert!(net.accept(q).unwrap());
        assert_eq!(net.queue(q).unwrap().backlog(), 1);

        net.advance(dev, t(4.0)).unwrap();
        net.advance(q, t(4.0)).unwrap();
        assert_eq!(net.queue(q).unwrap().backlog(), 0);
        assert_eq!(net.queue(q).unwrap().stats().served(), 2);
    }

    #[test]
    fn test_router_readiness_follows_candidates() {
        let mut net = Network::new(1);
        let a = net.add_device("A", fixed(2.0)).unwrap();
        let b = net.add_device("B", fixed(5.0)).unwrap();
        let r = net.add_router("R", SelectionPolicy::Priority).unwrap();
        net.add_candidate(r, a, 1).unwrap();
        net.add_candidate(r, b, 1).unwrap();

        assert_eq!(net.pending_time(r).unwrap(), None);
        net.accept(a).unwrap();
        assert_eq!(net.pending_time(r).unwrap(), None);
        net.accept(b).unwrap();
        assert_eq!(net.pending_time(r).unwrap(), Some(t(2.0)));
    }

    #[test]
    fn test_router_refuses_without_ready_candidate() {
        let mut net = Network::new(1);
        let a = net.add_device("A", fixed(2.0)).unwrap();
        let r = net.add_router("R", SelectionPolicy::Probability).unwrap();
        net.add_candidate(r, a, 3).unwrap();
        net.accept(a).unwrap();

        assert!(!net.accept(r).unwrap());
        let stats = net.router(r).unwrap().stats();
        assert_eq!(stats.requests(), 1);
        assert_eq!(stats.refused(), 1);
        assert_eq!(stats.forwarded(), 0);
    }

    #[test]
    fn test_router_zero_weight_rejected() {
        let mut net = Network::new(1);
        let a = net.add_queue("A").unwrap();
        let r = net.add_router("R", SelectionPolicy::Priority).unwrap();
        assert!(net.add_candidate(r, a, 0).is_err());
        assert!(net.validate().is_err());
    }

    #[test]
    fn test_router_cannot_connect() {
        let mut net = Network::new(1);
        let a = net.add_queue("A").unwrap();
        let r = net.add_router("R", SelectionPolicy::Priority).unwrap();
        assert!(net.connect(r, a).is_err());
    }

    #[test]
    fn test_gate_alternate_path() {
        let mut net = Network::new(1);
        let g = net.add_gate("G", Condition::Never).unwrap();
        let main = net.add_queue("Main").unwrap();
        let overflow = net.add_queue("Overflow").unwrap();
        net.connect(g, main).unwrap();
        net.set_alternate(g, overflow).unwrap();

        assert_eq!(net.pending_time(g).unwrap(), Some(SimTime::MAX));
        assert!(!net.accept(g).unwrap());
        assert_eq!(net.queue(overflow).unwrap().stats().requests(), 1);
        assert_eq!(net.queue(main).unwrap().stats().requests(), 0);
        assert_eq!(net.successors(g).unwrap(), vec![main, overflow]);
        assert_eq!(net.chosen_successor(g).unwrap(), Some(overflow));
    }

    #[test]
    fn test_routing_cycle_hits_depth_guard() {
        let mut net = Network::new(1);
        let g = net.add_gate("G", Condition::Always).unwrap();
        let r = net.add_router("R", SelectionPolicy::Priority).unwrap();
        net.connect(g, r).unwrap();
        net.add_candidate(r, g, 1).unwrap();

        assert!(matches!(
            net.pending_time(g),
            Err(SimulationError::InvalidConfiguration(_))
        ));
        // the guard unwinds cleanly
        assert_eq!(net.depth.get(), 0);
    }

    #[test]
    fn test_accept_cycle_through_queue_hits_depth_guard() {
        // the queue makes every pending-time query finite; only the item loops
        let mut net = Network::new(1);
        let g = net.add_gate("G", Condition::Always).unwrap();
        let q = net.add_queue("Q").unwrap();
        net.connect(g, q).unwrap();
        net.connect(q, g).unwrap();
        assert_eq!(net.pending_time(g).unwrap(), None);

        assert!(matches!(
            net.accept(g),
            Err(SimulationError::InvalidConfiguration(_))
        ));
        assert_eq!(net.depth.get(), 0);
    }

    #[test]
    fn test_item_arriving_mid_step_catches_the_node_up_first() {
        let mut net = Network::new(1);
        let dev = net.add_device("D", fixed(3.0)).unwrap();

        net.begin_step(t(2.0), &[dev]);
        assert!(net.accept(dev).unwrap());
        // already at the step's end: the driver's own pass is a no-op
        net.catch_up(dev).unwrap();
        net.finish_step();

        let device = net.device(dev).unwrap();
        assert_eq!(device.stats().total_time(), t(2.0));
        assert_eq!(device.stats().busy_time(), SimTime::ZERO);
        assert_eq!(device.unit().remaining(), Some(t(3.0)));
    }

    #[test]
    fn test_catch_up_outside_a_step_does_nothing() {
        let mut net = Network::new(1);
        let q = net.add_queue("Q").unwrap();
        net.catch_up(q).unwrap();
        assert_eq!(net.queue(q).unwrap().stats().observed_time(), SimTime::ZERO);
    }

    #[test]
    fn test_device_requests_count_started_work() {
        let mut net = Network::new(1);
        let dev = net.add_device("D", fixed(3.0)).unwrap();
        net.accept(dev).unwrap();

        let node = net.node(dev).unwrap();
        assert_eq!(node.requests(), 1);
        assert_eq!(node.served(), 0);
        assert_eq!(net.snapshot().unwrap().nodes["D"].requests, 1);
    }

    #[test]
    fn test_condition_reads_live_state() {
        let mut net = Network::new(1);
        let dev = net.add_device("D", fixed(1.0)).unwrap();
        let cond: Condition =
            serde_json::from_str(r#"{"op": "==", "left": {"field": "D.busy"}, "right": 1}"#)
                .unwrap();
        assert!(!cond.evaluate(&net).unwrap());
        net.accept(dev).unwrap();
        assert!(cond.evaluate(&net).unwrap());
    }

    #[test]
    fn test_validate_unknown_condition_node() {
        let mut net = Network::new(1);
        let cond: Condition =
            serde_json::from_str(r#"{"op": ">", "left": {"count_ready": ["Ghost"]}, "right": 0}"#)
                .unwrap();
        net.add_gate("G", cond).unwrap();
        assert!(matches!(
            net.validate(),
            Err(SimulationError::Condition { .. })
        ));
    }

    #[test]
    fn test_snapshot_matches_live_view() {
        let mut net = Network::new(1);
        let q = net.add_queue("Q").unwrap();
        let dev = net.add_device("D", fixed(1.0)).unwrap();
        net.connect(q, dev).unwrap();
        net.accept(q).unwrap();
        net.accept(q).unwrap();

        let snap = net.snapshot().unwrap();
        assert!(snap.nodes["D"].busy);
        assert_eq!(snap.nodes["Q"].backlog, 1);
        assert_eq!(snap.nodes["Q"].requests, 2);
    }
}
