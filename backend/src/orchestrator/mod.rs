//! Orchestrator - the simulation driver and its inputs and outputs
//!
//! - `engine`: discovery and the time-advance loop
//! - `config`: JSON model files
//! - `report`: per-node results
//!
//! See `engine.rs` for the loop itself.

pub mod config;
pub mod engine;
pub mod report;

// Re-export main types for convenience
pub use config::{CandidateConfig, ConfigError, ModelConfig, NodeConfig};
pub use engine::{discover, RunSummary, Simulation};
pub use report::{NodeMetrics, NodeReport, SimulationReport};
