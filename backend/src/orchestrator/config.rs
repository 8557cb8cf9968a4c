//! Model configuration
//!
//! A model file is JSON: run parameters plus a flat list of nodes, each
//! tagged by `kind`. Edges are written by node name and resolved in a
//! second pass, so nodes may reference ones declared later (feedback loops
//! included).
//!
//! ```json
//! {
//!   "seed": 7,
//!   "warmup": 0,
//!   "horizon": 100,
//!   "nodes": [
//!     { "kind": "source", "name": "Arrivals",
//!       "interarrival": { "dist": "exponential", "mean": 5 }, "next": "Queue" },
//!     { "kind": "queue",  "name": "Queue", "next": "Server" },
//!     { "kind": "device", "name": "Server",
//!       "service": { "dist": "fixed", "value": 4 } }
//!   ]
//! }
//! ```

use crate::core::SimTime;
use crate::distributions::Distribution;
use crate::error::SimulationError;
use crate::network::Network;
use crate::orchestrator::engine::Simulation;
use crate::policy::{Condition, SelectionPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Failure to load a model file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read model file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse model: {0}")]
    Parse(#[from] serde_json::Error),
}

fn default_seed() -> u64 {
    12345
}

fn default_batch_size() -> u64 {
    1
}

fn default_weight() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Time simulated before statistics are cleared
    #[serde(default)]
    pub warmup: f64,

    /// Measured time after warm-up
    pub horizon: f64,

    pub nodes: Vec<NodeConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeConfig {
    Source {
        name: String,
        interarrival: Distribution,
        #[serde(default)]
        next: Option<String>,
    },
    Device {
        name: String,
        service: Distribution,
        #[serde(default)]
        cooldown: Option<Distribution>,
        #[serde(default)]
        next: Option<String>,
    },
    Queue {
        name: String,
        #[serde(default = "default_batch_size")]
        batch_size: u64,
        #[serde(default)]
        next: Option<String>,
    },
    Router {
        name: String,
        #[serde(default)]
        policy: SelectionPolicy,
        candidates: Vec<CandidateConfig>,
        #[serde(default)]
        condition: Option<Condition>,
    },
    Gate {
        name: String,
        condition: Condition,
        #[serde(default)]
        next: Option<String>,
        #[serde(default)]
        alternate: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateConfig {
    pub node: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

impl NodeConfig {
    pub fn name(&self) -> &str {
        match self {
            NodeConfig::Source { name, .. }
            | NodeConfig::Device { name, .. }
            | NodeConfig::Queue { name, .. }
            | NodeConfig::Router { name, .. }
            | NodeConfig::Gate { name, .. } => name,
        }
    }

    /// Every node name this entry refers to.
    fn references(&self) -> Vec<&str> {
        match self {
            NodeConfig::Source { next, .. }
            | NodeConfig::Device { next, .. }
            | NodeConfig::Queue { next, .. } => next.iter().map(String::as_str).collect(),
            NodeConfig::Router {
                candidates,
                condition,
                ..
            } => candidates
                .iter()
                .map(|c| c.node.as_str())
                .chain(condition.iter().flat_map(Condition::referenced_nodes))
                .collect(),
            NodeConfig::Gate {
                condition,
                next,
                alternate,
                ..
            } => next
                .iter()
                .chain(alternate.iter())
                .map(String::as_str)
                .chain(condition.referenced_nodes())
                .collect(),
        }
    }
}

impl ModelConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn warmup_time(&self) -> SimTime {
        SimTime::from_units(self.warmup)
    }

    pub fn horizon_time(&self) -> SimTime {
        SimTime::from_units(self.horizon)
    }

    /// Check the model without building it.
    ///
    /// # Errors
    /// `InvalidConfiguration` for a non-positive horizon, negative warm-up,
    /// duplicate or unknown names, zero weights, empty candidate lists,
    /// zero batch sizes or bad distribution parameters.
    pub fn validate(&self) -> Result<(), SimulationError> {
        let invalid = |msg: String| Err(SimulationError::InvalidConfiguration(msg));

        if !(self.horizon > 0.0) {
            return invalid(format!("horizon must be positive, got {}", self.horizon));
        }
        if !(self.warmup >= 0.0) {
            return invalid(format!("warmup must be non-negative, got {}", self.warmup));
        }

        let mut names = HashSet::new();
        for node in &self.nodes {
            if !names.insert(node.name()) {
                return invalid(format!("duplicate node name '{}'", node.name()));
            }
        }

        for node in &self.nodes {
            let name = node.name();
            for referenced in node.references() {
                if !names.contains(referenced) {
                    return invalid(format!(
                        "'{}' refers to unknown node '{}'",
                        name, referenced
                    ));
                }
            }

            match node {
                NodeConfig::Source { interarrival, .. } => interarrival
                    .validate()
                    .map_err(|e| SimulationError::from_distribution(name, e))?,
                NodeConfig::Device {
                    service, cooldown, ..
                } => {
                    for dist in std::iter::once(service).chain(cooldown.iter()) {
                        dist.validate()
                            .map_err(|e| SimulationError::from_distribution(name, e))?;
                    }
                }
                NodeConfig::Queue { batch_size, .. } => {
                    if *batch_size == 0 {
                        return invalid(format!("queue '{}' needs a batch size of at least 1", name));
                    }
                }
                NodeConfig::Router { candidates, .. } => {
                    if candidates.is_empty() {
                        return invalid(format!("router '{}' has no candidates", name));
                    }
                    if candidates.iter().any(|c| c.weight == 0) {
                        return invalid(format!(
                            "router '{}' candidate weights must be positive",
                            name
                        ));
                    }
                }
                NodeConfig::Gate { .. } => {}
            }
        }

        Ok(())
    }

    /// Build the network: nodes in declaration order, then edges.
    ///
    /// Sources draw their first arrival as they are added, so declaration
    /// order is part of the random stream.
    pub fn build_network(&self) -> Result<Network, SimulationError> {
        self.validate()?;
        let mut network = Network::new(self.seed);

        for node in &self.nodes {
            match node {
                NodeConfig::Source {
                    name, interarrival, ..
                } => network.add_source(name, interarrival.clone())?,
                NodeConfig::Device {
                    name,
                    service,
                    cooldown: Some(cooldown),
                    ..
                } => network.add_device_with_cooldown(name, service.clone(), cooldown.clone())?,
                NodeConfig::Device {
                    name,
                    service,
                    cooldown: None,
                    ..
                } => network.add_device(name, service.clone())?,
                NodeConfig::Queue {
                    name, batch_size, ..
                } => network.add_batch_queue(name, *batch_size)?,
                NodeConfig::Router { name, policy, .. } => network.add_router(name, *policy)?,
                NodeConfig::Gate {
                    name, condition, ..
                } => network.add_gate(name, condition.clone())?,
            };
        }

        for node in &self.nodes {
            let id = network.require(node.name())?;
            match node {
                NodeConfig::Source { next, .. }
                | NodeConfig::Device { next, .. }
                | NodeConfig::Queue { next, .. } => {
                    if let Some(next) = next {
                        let to = network.require(next)?;
                        network.connect(id, to)?;
                    }
                }
                NodeConfig::Router {
                    candidates,
                    condition,
                    ..
                } => {
                    for candidate in candidates {
                        let to = network.require(&candidate.node)?;
                        network.add_candidate(id, to, candidate.weight)?;
                    }
                    if let Some(condition) = condition {
                        network.set_router_condition(id, condition.clone())?;
                    }
                }
                NodeConfig::Gate {
                    next, alternate, ..
                } => {
                    if let Some(next) = next {
                        let to = network.require(next)?;
                        network.connect(id, to)?;
                    }
                    if let Some(alternate) = alternate {
                        let to = network.require(alternate)?;
                        network.set_alternate(id, to)?;
                    }
                }
            }
        }

        network.validate()?;
        Ok(network)
    }

    /// Build a ready-to-run simulation.
    pub fn build(&self) -> Result<Simulation, SimulationError> {
        Simulation::new(self.build_network()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "horizon": 50,
        "nodes": [
            { "kind": "source", "name": "S", "interarrival": { "dist": "fixed", "value": 5 }, "next": "Q" },
            { "kind": "queue", "name": "Q", "next": "D" },
            { "kind": "device", "name": "D", "service": { "dist": "fixed", "value": 2 } }
        ]
    }"#;

    #[test]
    fn test_defaults() {
        let config = ModelConfig::from_json_str(MINIMAL).unwrap();
        assert_eq!(config.seed, 12345);
        assert_eq!(config.warmup, 0.0);
        match &config.nodes[1] {
            NodeConfig::Queue { batch_size, .. } => assert_eq!(*batch_size, 1),
            other => panic!("expected queue, got {:?}", other),
        }
    }

    #[test]
    fn test_build_wires_edges() {
        let sim = ModelConfig::from_json_str(MINIMAL).unwrap().build().unwrap();
        let net = sim.network();
        let q = net.id("Q").unwrap();
        assert_eq!(net.successors(q).unwrap(), vec![net.id("D").unwrap()]);
        assert_eq!(sim.order().len(), 3);
    }

    #[test]
    fn test_unknown_reference() {
        let mut config = ModelConfig::from_json_str(MINIMAL).unwrap();
        config.nodes.push(NodeConfig::Gate {
            name: "G".into(),
            condition: Condition::Always,
            next: Some("Nowhere".into()),
            alternate: None,
        });
        assert!(matches!(
            config.validate(),
            Err(SimulationError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_rejects_bad_run_parameters() {
        let mut config = ModelConfig::from_json_str(MINIMAL).unwrap();
        config.horizon = 0.0;
        assert!(config.validate().is_err());

        let mut config = ModelConfig::from_json_str(MINIMAL).unwrap();
        config.warmup = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_error_is_reported() {
        assert!(matches!(
            ModelConfig::from_json_str("{ \"horizon\": 1, \"nodes\": [ { \"kind\": \"teleporter\" } ] }"),
            Err(ConfigError::Parse(_))
        ));
    }
}
