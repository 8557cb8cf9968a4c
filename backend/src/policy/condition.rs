//! Gate and router conditions
//!
//! Conditions are data, not closures: a small expression tree over named
//! node attributes, evaluated against a `ConditionContext`. The live network
//! is one context (a read-only view at the evaluation instant); an owned
//! `NetworkSnapshot` is another, which lets a condition be tested without
//! building a network at all.
//!
//! # JSON form
//!
//! ```json
//! {
//!   "op": "and",
//!   "conditions": [
//!     { "op": "<", "left": { "count_busy": ["Loader1", "Loader2"] }, "right": 2 },
//!     { "op": ">", "left": { "count_ready": ["Truck1", "Truck2"] },
//!                  "right": { "count_busy": ["Loader1", "Loader2"] } }
//!   ]
//! }
//! ```
//!
//! Field operands name `<node>.<attribute>`; attributes are `busy`, `ready`,
//! `backlog`, `served` and `requests`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const FLOAT_EPSILON: f64 = 1e-9;

/// Errors raised while evaluating a condition
#[derive(Debug, Error, PartialEq)]
pub enum ConditionError {
    #[error("unknown node '{0}'")]
    UnknownNode(String),

    #[error("unknown attribute '{0}' (expected busy, ready, backlog, served or requests)")]
    UnknownAttribute(String),

    #[error("malformed field '{0}' (expected <node>.<attribute>)")]
    MalformedField(String),

    #[error("state of '{node}' unavailable: {reason}")]
    Unavailable { node: String, reason: String },
}

/// Observable attribute of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeAttribute {
    /// 1 if the node has a pending event (cannot take an item now)
    Busy,
    /// 1 if the node can take an item now
    Ready,
    /// Items waiting in a queue; 0 for other nodes
    Backlog,
    Served,
    Requests,
}

impl FromStr for NodeAttribute {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "busy" => Ok(NodeAttribute::Busy),
            "ready" => Ok(NodeAttribute::Ready),
            "backlog" => Ok(NodeAttribute::Backlog),
            "served" => Ok(NodeAttribute::Served),
            "requests" => Ok(NodeAttribute::Requests),
            other => Err(ConditionError::UnknownAttribute(other.to_string())),
        }
    }
}

impl fmt::Display for NodeAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeAttribute::Busy => "busy",
            NodeAttribute::Ready => "ready",
            NodeAttribute::Backlog => "backlog",
            NodeAttribute::Served => "served",
            NodeAttribute::Requests => "requests",
        };
        f.write_str(s)
    }
}

/// Source of node state for condition evaluation
pub trait ConditionContext {
    fn attribute(&self, node: &str, attribute: NodeAttribute) -> Result<f64, ConditionError>;
}

/// A value inside a comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    /// `"<node>.<attribute>"`
    Field { field: String },

    /// Number of listed nodes that are busy
    CountBusy { count_busy: Vec<String> },

    /// Number of listed nodes that are ready
    CountReady { count_ready: Vec<String> },

    Literal { value: f64 },

    Number(f64),
}

impl Operand {
    pub fn evaluate<C>(&self, ctx: &C) -> Result<f64, ConditionError>
    where
        C: ConditionContext + ?Sized,
    {
        match self {
            Operand::Field { field } => {
                let (node, attribute) = parse_field(field)?;
                ctx.attribute(node, attribute)
            }
            Operand::CountBusy { count_busy } => count(ctx, count_busy, NodeAttribute::Busy),
            Operand::CountReady { count_ready } => count(ctx, count_ready, NodeAttribute::Ready),
            Operand::Literal { value } | Operand::Number(value) => Ok(*value),
        }
    }

    fn collect_nodes<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Operand::Field { field } => {
                if let Some((node, _)) = field.rsplit_once('.') {
                    out.push(node);
                }
            }
            Operand::CountBusy { count_busy: names } | Operand::CountReady { count_ready: names } => {
                out.extend(names.iter().map(String::as_str));
            }
            Operand::Literal { .. } | Operand::Number(_) => {}
        }
    }
}

fn count<C>(ctx: &C, names: &[String], attribute: NodeAttribute) -> Result<f64, ConditionError>
where
    C: ConditionContext + ?Sized,
{
    let mut total = 0.0;
    for name in names {
        total += ctx.attribute(name, attribute)?;
    }
    Ok(total)
}

fn parse_field(field: &str) -> Result<(&str, NodeAttribute), ConditionError> {
    let (node, attribute) = field
        .rsplit_once('.')
        .filter(|(node, _)| !node.is_empty())
        .ok_or_else(|| ConditionError::MalformedField(field.to_string()))?;
    Ok((node, attribute.parse()?))
}

/// Boolean expression guarding a gate or router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Condition {
    #[serde(rename = "always")]
    Always,

    #[serde(rename = "never")]
    Never,

    #[serde(rename = "==")]
    Equal { left: Operand, right: Operand },

    #[serde(rename = "!=")]
    NotEqual { left: Operand, right: Operand },

    #[serde(rename = "<")]
    LessThan { left: Operand, right: Operand },

    #[serde(rename = "<=")]
    LessOrEqual { left: Operand, right: Operand },

    #[serde(rename = ">")]
    GreaterThan { left: Operand, right: Operand },

    #[serde(rename = ">=")]
    GreaterOrEqual { left: Operand, right: Operand },

    /// Short-circuits on the first false
    #[serde(rename = "and")]
    And { conditions: Vec<Condition> },

    /// Short-circuits on the first true
    #[serde(rename = "or")]
    Or { conditions: Vec<Condition> },

    #[serde(rename = "not")]
    Not { condition: Box<Condition> },
}

impl Condition {
    pub fn evaluate<C>(&self, ctx: &C) -> Result<bool, ConditionError>
    where
        C: ConditionContext + ?Sized,
    {
        match self {
            Condition::Always => Ok(true),
            Condition::Never => Ok(false),
            Condition::Equal { left, right } => {
                let (l, r) = (left.evaluate(ctx)?, right.evaluate(ctx)?);
                Ok((l - r).abs() < FLOAT_EPSILON)
            }
            Condition::NotEqual { left, right } => {
                let (l, r) = (left.evaluate(ctx)?, right.evaluate(ctx)?);
                Ok((l - r).abs() >= FLOAT_EPSILON)
            }
            Condition::LessThan { left, right } => Ok(left.evaluate(ctx)? < right.evaluate(ctx)?),
            Condition::LessOrEqual { left, right } => {
                let (l, r) = (left.evaluate(ctx)?, right.evaluate(ctx)?);
                Ok(l <= r || (l - r).abs() < FLOAT_EPSILON)
            }
            Condition::GreaterThan { left, right } => {
                Ok(left.evaluate(ctx)? > right.evaluate(ctx)?)
            }
            Condition::GreaterOrEqual { left, right } => {
                let (l, r) = (left.evaluate(ctx)?, right.evaluate(ctx)?);
                Ok(l >= r || (l - r).abs() < FLOAT_EPSILON)
            }
            Condition::And { conditions } => {
                for condition in conditions {
                    if !condition.evaluate(ctx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Or { conditions } => {
                for condition in conditions {
                    if condition.evaluate(ctx)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::Not { condition } => Ok(!condition.evaluate(ctx)?),
        }
    }

    /// Every node name this condition reads, in order of appearance.
    pub fn referenced_nodes(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_nodes(&mut out);
        out
    }

    /// Check field syntax without a context.
    pub fn check_fields(&self) -> Result<(), ConditionError> {
        match self {
            Condition::Always | Condition::Never => Ok(()),
            Condition::Equal { left, right }
            | Condition::NotEqual { left, right }
            | Condition::LessThan { left, right }
            | Condition::LessOrEqual { left, right }
            | Condition::GreaterThan { left, right }
            | Condition::GreaterOrEqual { left, right } => {
                for operand in [left, right] {
                    if let Operand::Field { field } = operand {
                        parse_field(field)?;
                    }
                }
                Ok(())
            }
            Condition::And { conditions } | Condition::Or { conditions } => {
                conditions.iter().try_for_each(Condition::check_fields)
            }
            Condition::Not { condition } => condition.check_fields(),
        }
    }

    fn collect_nodes<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Condition::Always | Condition::Never => {}
            Condition::Equal { left, right }
            | Condition::NotEqual { left, right }
            | Condition::LessThan { left, right }
            | Condition::LessOrEqual { left, right }
            | Condition::GreaterThan { left, right }
            | Condition::GreaterOrEqual { left, right } => {
                left.collect_nodes(out);
                right.collect_nodes(out);
            }
            Condition::And { conditions } | Condition::Or { conditions } => {
                for condition in conditions {
                    condition.collect_nodes(out);
                }
            }
            Condition::Not { condition } => condition.collect_nodes(out),
        }
    }
}

/// Observable state of one node at an instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    pub busy: bool,
    pub backlog: u64,
    pub served: u64,
    pub requests: u64,
}

/// Owned copy of every node's observable state, keyed by name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub nodes: BTreeMap<String, NodeState>,
}

impl NetworkSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, state: NodeState) -> Self {
        self.nodes.insert(name.into(), state);
        self
    }
}

impl NodeState {
    pub fn attribute(&self, attribute: NodeAttribute) -> f64 {
        match attribute {
            NodeAttribute::Busy => bool_to_f64(self.busy),
            NodeAttribute::Ready => bool_to_f64(!self.busy),
            NodeAttribute::Backlog => self.backlog as f64,
            NodeAttribute::Served => self.served as f64,
            NodeAttribute::Requests => self.requests as f64,
        }
    }
}

impl ConditionContext for NetworkSnapshot {
    fn attribute(&self, node: &str, attribute: NodeAttribute) -> Result<f64, ConditionError> {
        self.nodes
            .get(node)
            .map(|state| state.attribute(attribute))
            .ok_or_else(|| ConditionError::UnknownNode(node.to_string()))
    }
}

fn bool_to_f64(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}
