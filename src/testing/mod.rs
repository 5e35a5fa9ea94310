//! Scenario testing against a simulated windowing system
//!
//! Reads YAML readiness scenarios, builds a scripted platform for each
//! and reports whether the readiness sequence behaved as expected.

mod config;
mod runner;
pub mod sim;

pub use config::*;
pub use runner::{classify, run_loaded, run_scenario, StageTiming, TestResult};
