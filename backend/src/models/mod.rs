//! Domain models: the service unit and the statistics ledgers

pub mod service_unit;
pub mod stats;

// Re-exports
pub use service_unit::{ServiceUnit, UnitError, UnitState};
pub use stats::{GateStats, QueueStats, RouterStats, UnitStats};
