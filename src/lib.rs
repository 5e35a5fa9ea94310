//! Readiness Harness - deterministic waits for UI-driven test automation
//!
//! This library observes the completion of asynchronously scheduled UI
//! work (instance launch, content load, deferred background init) without
//! sleeps or races.

pub mod cli;
pub mod commands;
pub mod common;
pub mod harness;
pub mod platform;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use harness::{LaunchPolicy, ReadinessSequencer, Stage, TimeoutSpec, WaitOutcome};
