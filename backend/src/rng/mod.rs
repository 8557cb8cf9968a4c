//! Deterministic random number generation
//!
//! Uses xorshift64* for fast, seed-reproducible draws.
//! CRITICAL: every service-time draw and every probabilistic routing decision
//! goes through the single `SimRng` owned by the network. There is no global
//! generator.

mod xorshift;

pub use xorshift::SimRng;
