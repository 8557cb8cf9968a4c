//! Network nodes
//!
//! A closed set of variants behind one `Node` record. Successors are
//! `NodeId` handles into the owning `Network`'s arena, so cycles need no
//! shared ownership.

use crate::core::SimTime;
use crate::models::{GateStats, QueueStats, RouterStats, ServiceUnit, UnitStats};
use crate::policy::{Candidate, Condition, SelectionPolicy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle to a node inside a `Network`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Short name of a node variant, used in reports and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKindTag {
    Source,
    Device,
    Queue,
    Router,
    Gate,
}

impl fmt::Display for NodeKindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeKindTag::Source => "source",
            NodeKindTag::Device => "device",
            NodeKindTag::Queue => "queue",
            NodeKindTag::Router => "router",
            NodeKindTag::Gate => "gate",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Source(SourceNode),
    Device(DeviceNode),
    Queue(QueueNode),
    Router(RouterNode),
    Gate(GateNode),
}

impl Node {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn tag(&self) -> NodeKindTag {
        match self.kind {
            NodeKind::Source(_) => NodeKindTag::Source,
            NodeKind::Device(_) => NodeKindTag::Device,
            NodeKind::Queue(_) => NodeKindTag::Queue,
            NodeKind::Router(_) => NodeKindTag::Router,
            NodeKind::Gate(_) => NodeKindTag::Gate,
        }
    }

    /// Items completed (units), dispatched (queues) or passed on (routers, gates).
    pub fn served(&self) -> u64 {
        match &self.kind {
            NodeKind::Source(s) => s.unit.stats().served(),
            NodeKind::Device(d) => d.unit.stats().served(),
            NodeKind::Queue(q) => q.stats.served(),
            NodeKind::Router(r) => r.stats.forwarded(),
            NodeKind::Gate(g) => g.stats.forwarded(),
        }
    }

    /// Items offered to the node. Sources count the arrivals they emitted.
    pub fn requests(&self) -> u64 {
        match &self.kind {
            NodeKind::Source(s) => s.unit.stats().served(),
            NodeKind::Device(d) => d.unit.stats().requests(),
            NodeKind::Queue(q) => q.stats.requests(),
            NodeKind::Router(r) => r.stats.requests(),
            NodeKind::Gate(g) => g.stats.requests(),
        }
    }

    pub fn backlog(&self) -> u64 {
        match &self.kind {
            NodeKind::Queue(q) => q.backlog,
            _ => 0,
        }
    }

    pub(crate) fn clear_stats(&mut self) {
        match &mut self.kind {
            NodeKind::Source(s) => s.unit.clear_stats(),
            NodeKind::Device(d) => {
                d.unit.clear_stats();
                if let Some(cooldown) = &mut d.cooldown {
                    cooldown.clear_stats();
                }
                d.cooldown_time = SimTime::ZERO;
            }
            NodeKind::Queue(q) => q.stats.clear(),
            NodeKind::Router(r) => r.stats.clear(),
            NodeKind::Gate(g) => g.stats.clear(),
        }
    }
}

/// Self-regenerating arrival process
#[derive(Debug, Clone)]
pub struct SourceNode {
    pub(crate) unit: ServiceUnit,
    pub(crate) next: Option<NodeId>,
}

impl SourceNode {
    pub fn unit(&self) -> &ServiceUnit {
        &self.unit
    }

    pub fn next(&self) -> Option<NodeId> {
        self.next
    }

    pub fn stats(&self) -> &UnitStats {
        self.unit.stats()
    }
}

/// Service station with an optional rest period after each item
#[derive(Debug, Clone)]
pub struct DeviceNode {
    pub(crate) unit: ServiceUnit,
    pub(crate) cooldown: Option<ServiceUnit>,
    pub(crate) cooldown_time: SimTime,
    pub(crate) next: Option<NodeId>,
}

impl DeviceNode {
    pub fn unit(&self) -> &ServiceUnit {
        &self.unit
    }

    pub fn cooldown(&self) -> Option<&ServiceUnit> {
        self.cooldown.as_ref()
    }

    pub fn next(&self) -> Option<NodeId> {
        self.next
    }

    pub fn stats(&self) -> &UnitStats {
        self.unit.stats()
    }

    pub fn cooling_down(&self) -> bool {
        self.cooldown.as_ref().map_or(false, ServiceUnit::is_busy)
    }

    pub fn cooldown_time(&self) -> SimTime {
        self.cooldown_time
    }

    /// `(busy + cooldown) / total`, 0 before any time has elapsed.
    pub fn utilization(&self) -> f64 {
        let total = self.unit.stats().total_time();
        if total.is_zero() {
            return 0.0;
        }
        (self.unit.stats().busy_time() + self.cooldown_time).as_units() / total.as_units()
    }

    pub(crate) fn pending(&self) -> Option<SimTime> {
        self.unit
            .remaining()
            .or_else(|| self.cooldown.as_ref().and_then(ServiceUnit::remaining))
    }
}

/// FIFO buffer releasing items in batches
#[derive(Debug, Clone)]
pub struct QueueNode {
    pub(crate) backlog: u64,
    pub(crate) batch_size: u64,
    pub(crate) next: Option<NodeId>,
    pub(crate) stats: QueueStats,
}

impl QueueNode {
    pub fn backlog(&self) -> u64 {
        self.backlog
    }

    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    pub fn next(&self) -> Option<NodeId> {
        self.next
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    /// Mean time a batch waited, using this queue's batch size.
    pub fn average_batch_wait_time(&self) -> f64 {
        self.stats.average_batch_wait_time(self.batch_size)
    }
}

/// Weighted fan-out to one of several candidates
#[derive(Debug, Clone)]
pub struct RouterNode {
    pub(crate) candidates: Vec<Candidate>,
    pub(crate) policy: SelectionPolicy,
    pub(crate) condition: Option<Condition>,
    pub(crate) stats: RouterStats,
}

impl RouterNode {
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }
}

/// Predicate-guarded pass-through with an optional overflow path
#[derive(Debug, Clone)]
pub struct GateNode {
    pub(crate) condition: Condition,
    pub(crate) primary: Option<NodeId>,
    pub(crate) alternate: Option<NodeId>,
    pub(crate) stats: GateStats,
}

impl GateNode {
    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    pub fn primary(&self) -> Option<NodeId> {
        self.primary
    }

    pub fn alternate(&self) -> Option<NodeId> {
        self.alternate
    }

    pub fn stats(&self) -> &GateStats {
        &self.stats
    }
}
