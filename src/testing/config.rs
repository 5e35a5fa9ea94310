//! Scenario configuration types
//!
//! Defines the data structures for deserializing YAML readiness scenarios.

use serde::Deserialize;
use std::time::Duration;

use super::sim::LaunchScript;
use crate::harness::{AmbiguityPolicy, SequencerBudgets, Stage};

/// A complete readiness scenario loaded from a YAML file
#[derive(Deserialize, Debug)]
pub struct Scenario {
    /// Name of the scenario
    pub name: String,
    /// Optional description of what the scenario verifies
    pub description: Option<String>,
    /// Kind of instance to launch and wait for
    #[serde(default = "default_target")]
    pub target: String,
    /// Content to open in the launched instance
    pub url: Option<String>,
    /// Launch a new instance or reuse the first existing one
    #[serde(default)]
    pub mode: ScenarioMode,
    /// Instances alive before the launch
    #[serde(default)]
    pub existing: Vec<ExistingInstance>,
    /// What the simulated launch produces
    #[serde(default)]
    pub launch: LaunchScript,
    /// When deferred startup completes; `null` means never
    #[serde(default = "default_background_init")]
    pub background_init_after_ms: Option<u64>,
    /// Tie-break for several new matching instances
    #[serde(default)]
    pub ambiguity: AmbiguityPolicy,
    /// Per-stage budget overrides
    pub timeouts: Option<ScenarioTimeouts>,
    /// Expected result of the readiness sequence
    pub expect: Expectation,
}

fn default_target() -> String {
    "custom_tab".to_string()
}

fn default_background_init() -> Option<u64> {
    Some(0)
}

/// How the scenario obtains its instance
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioMode {
    #[default]
    Launch,
    UseExisting,
}

/// An instance that is live before the scenario starts
#[derive(Deserialize, Debug, Clone)]
pub struct ExistingInstance {
    /// Instance kind; defaults to the scenario target
    pub kind: Option<String>,
    #[serde(default = "default_true")]
    pub expected_surface: bool,
    /// Whether its content is still loading
    #[serde(default)]
    pub loading: bool,
}

fn default_true() -> bool {
    true
}

/// Budget overrides in milliseconds
#[derive(Deserialize, Debug, Clone, Default)]
pub struct ScenarioTimeouts {
    pub launch_ms: Option<u64>,
    pub content_load_ms: Option<u64>,
    pub background_init_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
}

impl ScenarioTimeouts {
    /// Apply these overrides on top of configured budgets
    pub fn apply(&self, budgets: &mut SequencerBudgets) {
        let ms = Duration::from_millis;
        if let Some(launch) = self.launch_ms {
            budgets.launch.timeout = ms(launch);
        }
        if let Some(content) = self.content_load_ms {
            budgets.content_load.timeout = ms(content);
        }
        if let Some(background) = self.background_init_ms {
            budgets.background_init.timeout = ms(background);
        }
        if let Some(interval) = self.poll_interval_ms {
            for spec in [
                &mut budgets.launch,
                &mut budgets.content_load,
                &mut budgets.background_init,
            ] {
                spec.poll_interval = ms(interval);
            }
        }
    }
}

/// Expected result of a scenario
#[derive(Deserialize, Debug, Clone)]
pub struct Expectation {
    pub outcome: ExpectedOutcome,
    /// Stage expected to abort (for `aborted`)
    pub stage: Option<Stage>,
    /// Expected failure kind (for `aborted`)
    pub failure: Option<FailureKind>,
    /// Upper bound on total wall time
    pub max_elapsed_ms: Option<u64>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedOutcome {
    Ready,
    Aborted,
}

/// Coarse classification of why a sequence aborted
#[derive(Deserialize, serde::Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Assertion,
    ConditionEvaluation,
    Launch,
    Other,
}
