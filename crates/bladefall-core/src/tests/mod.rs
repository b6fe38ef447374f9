//! Cross-module tests for the combat simulation.
//!
//! Unit-level behavior is tested in `#[cfg(test)]` modules next to the code
//! it covers; everything here exercises several modules through the world
//! driver at once:
//!
//! - `determinism.rs`: same seed and same operations reproduce the same
//!   event log and the same serialized state
//! - `integration.rs`: full fights end to end, from cast validation through
//!   mitigation, procs and death
//! - `helpers.rs`: unit and spell factories shared by both suites

mod determinism;
mod helpers;
