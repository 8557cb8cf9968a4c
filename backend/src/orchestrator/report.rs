//! Run reports
//!
//! A `SimulationReport` is a plain-data copy of every discovered node's
//! ledger, in discovery order. Exporters that want a flat view use
//! `metric_pairs()`, which yields `(node, metric, value)` triples.

use crate::core::SimTime;
use crate::error::SimulationError;
use crate::network::{Network, NodeId, NodeKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    /// Total simulated time
    pub elapsed: f64,
    /// Time since statistics were last cleared
    pub measured: f64,
    pub nodes: Vec<NodeReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeReport {
    pub name: String,
    #[serde(flatten)]
    pub metrics: NodeMetrics,
}

/// Per-kind counters and derived figures. Durations are in model time units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeMetrics {
    Source {
        served: u64,
        total_time: f64,
    },
    Device {
        requests: u64,
        served: u64,
        busy_time: f64,
        cooldown_time: f64,
        total_time: f64,
        utilization: f64,
    },
    Queue {
        requests: u64,
        served: u64,
        backlog: u64,
        max_backlog: u64,
        batch_size: u64,
        total_wait_time: f64,
        average_queue_size: f64,
        average_wait_time: f64,
        average_batch_wait_time: f64,
    },
    Router {
        requests: u64,
        forwarded: u64,
        blocked: u64,
        refused: u64,
        availability: f64,
        throughput: f64,
        mean_inter_request_time: f64,
    },
    Gate {
        requests: u64,
        forwarded: u64,
        failures: u64,
        failure_probability: f64,
        availability: f64,
        throughput: f64,
    },
}

impl NodeMetrics {
    pub fn kind(&self) -> &'static str {
        match self {
            NodeMetrics::Source { .. } => "source",
            NodeMetrics::Device { .. } => "device",
            NodeMetrics::Queue { .. } => "queue",
            NodeMetrics::Router { .. } => "router",
            NodeMetrics::Gate { .. } => "gate",
        }
    }

    /// Every metric as `(name, value)`, counters widened to `f64`.
    pub fn pairs(&self) -> Vec<(&'static str, f64)> {
        match *self {
            NodeMetrics::Source { served, total_time } => {
                vec![("served", served as f64), ("total_time", total_time)]
            }
            NodeMetrics::Device {
                requests,
                served,
                busy_time,
                cooldown_time,
                total_time,
                utilization,
            } => vec![
                ("requests", requests as f64),
                ("served", served as f64),
                ("busy_time", busy_time),
                ("cooldown_time", cooldown_time),
                ("total_time", total_time),
                ("utilization", utilization),
            ],
            NodeMetrics::Queue {
                requests,
                served,
                backlog,
                max_backlog,
                batch_size,
                total_wait_time,
                average_queue_size,
                average_wait_time,
                average_batch_wait_time,
            } => vec![
                ("requests", requests as f64),
                ("served", served as f64),
                ("backlog", backlog as f64),
                ("max_backlog", max_backlog as f64),
                ("batch_size", batch_size as f64),
                ("total_wait_time", total_wait_time),
                ("average_queue_size", average_queue_size),
                ("average_wait_time", average_wait_time),
                ("average_batch_wait_time", average_batch_wait_time),
            ],
            NodeMetrics::Router {
                requests,
                forwarded,
                blocked,
                refused,
                availability,
                throughput,
                mean_inter_request_time,
            } => vec![
                ("requests", requests as f64),
                ("forwarded", forwarded as f64),
                ("blocked", blocked as f64),
                ("refused", refused as f64),
                ("availability", availability),
                ("throughput", throughput),
                ("mean_inter_request_time", mean_inter_request_time),
            ],
            NodeMetrics::Gate {
                requests,
                forwarded,
                failures,
                failure_probability,
                availability,
                throughput,
            } => vec![
                ("requests", requests as f64),
                ("forwarded", forwarded as f64),
                ("failures", failures as f64),
                ("failure_probability", failure_probability),
                ("availability", availability),
                ("throughput", throughput),
            ],
        }
    }
}

impl NodeReport {
    fn from_kind(name: &str, kind: &NodeKind) -> Self {
        let metrics = match kind {
            NodeKind::Source(s) => NodeMetrics::Source {
                served: s.stats().served(),
                total_time: s.stats().total_time().as_units(),
            },
            NodeKind::Device(d) => NodeMetrics::Device {
                requests: d.stats().requests(),
                served: d.stats().served(),
                busy_time: d.stats().busy_time().as_units(),
                cooldown_time: d.cooldown_time().as_units(),
                total_time: d.stats().total_time().as_units(),
                utilization: d.utilization(),
            },
            NodeKind::Queue(q) => NodeMetrics::Queue {
                requests: q.stats().requests(),
                served: q.stats().served(),
                backlog: q.backlog(),
                max_backlog: q.stats().max_backlog(),
                batch_size: q.batch_size(),
                total_wait_time: q.stats().total_wait_time(),
                average_queue_size: q.stats().average_queue_size(),
                average_wait_time: q.stats().average_wait_time(),
                average_batch_wait_time: q.average_batch_wait_time(),
            },
            NodeKind::Router(r) => NodeMetrics::Router {
                requests: r.stats().requests(),
                forwarded: r.stats().forwarded(),
                blocked: r.stats().blocked(),
                refused: r.stats().refused(),
                availability: r.stats().availability(),
                throughput: r.stats().throughput(),
                mean_inter_request_time: r.stats().mean_inter_request_time(),
            },
            NodeKind::Gate(g) => NodeMetrics::Gate {
                requests: g.stats().requests(),
                forwarded: g.stats().forwarded(),
                failures: g.stats().failures(),
                failure_probability: g.stats().failure_probability(),
                availability: g.stats().availability(),
                throughput: g.stats().throughput(),
            },
        };
        NodeReport {
            name: name.to_string(),
            metrics,
        }
    }
}

impl SimulationReport {
    pub(crate) fn collect(
        network: &Network,
        order: &[NodeId],
        elapsed: SimTime,
        measured: SimTime,
    ) -> Result<Self, SimulationError> {
        let nodes = order
            .iter()
            .map(|&id| {
                let node = network.node(id)?;
                Ok(NodeReport::from_kind(node.name(), node.kind()))
            })
            .collect::<Result<Vec<_>, SimulationError>>()?;

        Ok(Self {
            elapsed: elapsed.as_units(),
            measured: measured.as_units(),
            nodes,
        })
    }

    pub fn node(&self, name: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Look up one figure, e.g. `metric("Loader1", "utilization")`.
    pub fn metric(&self, node: &str, metric: &str) -> Option<f64> {
        self.node(node)?
            .metrics
            .pairs()
            .into_iter()
            .find(|(name, _)| *name == metric)
            .map(|(_, value)| value)
    }

    /// Flat `(node, metric, value)` view of the whole report.
    pub fn metric_pairs(&self) -> Vec<(&str, &'static str, f64)> {
        self.nodes
            .iter()
            .flat_map(|n| {
                n.metrics
                    .pairs()
                    .into_iter()
                    .map(move |(metric, value)| (n.name.as_str(), metric, value))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> SimulationReport {
        SimulationReport {
            elapsed: 10.0,
            measured: 10.0,
            nodes: vec![
                NodeReport {
                    name: "G".into(),
                    metrics: NodeMetrics::Gate {
                        requests: 4,
                        forwarded: 3,
                        failures: 1,
                        failure_probability: 0.25,
                        availability: 0.5,
                        throughput: 0.3,
                    },
                },
                NodeReport {
                    name: "S".into(),
                    metrics: NodeMetrics::Source {
                        served: 4,
                        total_time: 10.0,
                    },
                },
            ],
        }
    }

    #[test]
    fn test_metric_lookup() {
        let r = report();
        assert_eq!(r.metric("G", "failure_probability"), Some(0.25));
        assert_eq!(r.metric("S", "served"), Some(4.0));
        assert_eq!(r.metric("S", "utilization"), None);
        assert_eq!(r.metric("Nope", "served"), None);
    }

    #[test]
    fn test_metric_pairs_are_flat() {
        let binding = report();
        let pairs = binding.metric_pairs();
        assert_eq!(pairs.len(), 6 + 2);
        assert_eq!(pairs[0], ("G", "requests", 4.0));
    }

    #[test]
    fn test_json_is_tagged_by_kind() {
        let json = serde_json::to_value(report()).unwrap();
        assert_eq!(json["nodes"][0]["kind"], "gate");
        assert_eq!(json["nodes"][0]["name"], "G");
        assert_eq!(json["nodes"][1]["served"], 4);
    }
}
