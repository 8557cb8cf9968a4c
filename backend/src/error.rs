//! Simulation errors
//!
//! Every error is fatal to the run that raised it. Refusals (a router with
//! no ready candidate, a closed gate) are not errors; they are `false`
//! returns recorded in the node's statistics.

use crate::core::SimTime;
use crate::distributions::DistributionError;
use crate::models::UnitError;
use crate::policy::ConditionError;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SimulationError {
    /// An item was pushed into a busy device (or one in cool-down)
    #[error("node '{node}' is busy and cannot accept an item")]
    AlreadyBusy { node: String },

    #[error("node '{node}' was advanced while not busy")]
    NotBusy { node: String },

    #[error("node '{node}' advanced by {requested} but only {remaining} remained")]
    OverAdvance {
        node: String,
        requested: SimTime,
        remaining: SimTime,
    },

    /// The node kind never takes items (sources)
    #[error("node '{node}' does not accept items")]
    UnsupportedByDesign { node: String },

    /// No reachable node has a pending event; the topology lacks a source
    #[error("no live events: no reachable node has pending work")]
    NoLiveEvents,

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("condition on '{node}' failed: {source}")]
    Condition {
        node: String,
        #[source]
        source: ConditionError,
    },

    #[error("unknown node: {0}")]
    UnknownNode(String),
}

impl SimulationError {
    /// Attach the owning node's name to a service-unit error.
    pub fn from_unit(node: &str, err: UnitError) -> Self {
        let node = node.to_string();
        match err {
            UnitError::AlreadyBusy => SimulationError::AlreadyBusy { node },
            UnitError::NotBusy => SimulationError::NotBusy { node },
            UnitError::OverAdvance {
                requested,
                remaining,
            } => SimulationError::OverAdvance {
                node,
                requested,
                remaining,
            },
            UnitError::NonPositiveDraw { value } => SimulationError::InvalidConfiguration(format!(
                "generator of '{}' drew non-positive duration {}",
                node, value
            )),
        }
    }

    pub fn from_distribution(node: &str, err: DistributionError) -> Self {
        SimulationError::InvalidConfiguration(format!("distribution of '{}': {}", node, err))
    }
}
