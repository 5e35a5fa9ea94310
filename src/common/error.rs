//! Error types for the readiness harness
//!
//! Failures always say which wait gave up and why, so a flaky test log
//! points straight at the stage that never became ready.

use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::harness::Stage;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the readiness harness
#[derive(Error, Debug)]
pub enum Error {
    // === Wait Errors ===
    #[error("Condition '{description}' failed during evaluation: {message}")]
    ConditionEvaluation { description: String, message: String },

    #[error("Timed out after {}ms waiting for: {description}", .waited.as_millis())]
    Timeout {
        description: String,
        waited: Duration,
    },

    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("Readiness stage '{stage}' aborted: {cause}")]
    StageAborted {
        stage: Stage,
        #[source]
        cause: Box<Error>,
    },

    // === Execution Context Errors ===
    #[error("UI context has shut down and no longer accepts work")]
    UiContextClosed,

    #[error("UI task panicked: {0}")]
    UiTaskPanicked(String),

    // === Launch Errors ===
    #[error("Launch request failed: {0}")]
    LaunchFailed(String),

    #[error("Launch produced {count} new matching instances; expected exactly one")]
    AmbiguousLaunch { count: usize },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // === Test Errors ===
    #[error("Test assertion failed: {0}")]
    TestAssertion(String),
}

impl Error {
    /// Create a timeout error for a described wait
    pub fn timeout(description: impl Into<String>, waited: Duration) -> Self {
        Self::Timeout {
            description: description.into(),
            waited,
        }
    }

    /// Create a condition evaluation error
    pub fn condition_evaluation(description: &str, message: impl Into<String>) -> Self {
        Self::ConditionEvaluation {
            description: description.to_string(),
            message: message.into(),
        }
    }

    /// Wrap an error as the failure of a readiness stage
    pub fn stage_aborted(stage: Stage, cause: Error) -> Self {
        Self::StageAborted {
            stage,
            cause: Box::new(cause),
        }
    }

    /// Whether this error (or the cause of an aborted stage) is a timeout
    ///
    /// Callers use this to decide whether a missing event is benign.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::StageAborted { cause, .. } => cause.is_timeout(),
            _ => false,
        }
    }

    /// The readiness stage that failed, if this error came from the sequencer
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::StageAborted { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Short machine-readable code for reports
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConditionEvaluation { .. } => "CONDITION_EVALUATION",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Assertion(_) | Self::TestAssertion(_) => "ASSERTION",
            Self::StageAborted { cause, .. } => cause.code(),
            Self::UiContextClosed | Self::UiTaskPanicked(_) => "UI_CONTEXT",
            Self::LaunchFailed(_) | Self::AmbiguousLaunch { .. } => "LAUNCH",
            Self::Config(_) | Self::ConfigParse(_) => "CONFIG",
            _ => "INTERNAL_ERROR",
        }
    }
}
