//! Queueing Simulator Core - Rust Engine
//!
//! Discrete-event simulation kernel for queueing networks: sources, devices,
//! queues, routers and gates wired into a (possibly cyclic) graph, driven by
//! a variable-step clock that always jumps to the next event.
//!
//! # Architecture
//!
//! - **core**: fixed-point simulated time
//! - **rng**: deterministic random number generation
//! - **distributions**: service and inter-arrival time generators
//! - **models**: the service unit state machine and statistics ledgers
//! - **policy**: router selection policies and gate/router conditions
//! - **network**: the node arena and the uniform node contract
//! - **orchestrator**: discovery, the time-advance loop, config and reports
//!
//! # Critical Invariants
//!
//! 1. All durations are `SimTime` (i64 micro-units); "remaining reaches zero"
//!    is exact
//! 2. All randomness is deterministic (one seeded `SimRng` per network)
//! 3. Every step advances by the earliest pending time, never past it

// Module declarations
pub mod core;
pub mod distributions;
pub mod error;
pub mod models;
pub mod network;
pub mod orchestrator;
pub mod policy;
pub mod rng;

// Re-exports for convenience
pub use crate::core::SimTime;
pub use distributions::{Distribution, DistributionError};
pub use error::SimulationError;
pub use models::{
    service_unit::{ServiceUnit, UnitError, UnitState},
    stats::{GateStats, QueueStats, RouterStats, UnitStats},
};
pub use network::{Network, NodeId, NodeKindTag, MAX_ROUTING_DEPTH};
pub use orchestrator::{
    discover, ConfigError, ModelConfig, NodeConfig, NodeMetrics, NodeReport, RunSummary,
    Simulation, SimulationReport,
};
pub use policy::{Condition, ConditionContext, NetworkSnapshot, Operand, SelectionPolicy};
pub use rng::SimRng;
