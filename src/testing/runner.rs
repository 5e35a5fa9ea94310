//! Scenario runner implementation
//!
//! Builds a simulated platform from a scenario, drives the readiness
//! sequence against it on a real UI thread and checks the outcome
//! against the scenario's expectation.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use colored::Colorize;
use serde::Serialize;

use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::harness::{
    InstanceHandle, LaunchPolicy, Ready, SequencerBudgets, Stage, UiExecutor, UiThread,
};
use crate::platform::{Instance, LaunchRequest};

use super::config::{ExpectedOutcome, Expectation, FailureKind, Scenario, ScenarioMode};
use super::sim::SimPlatform;

/// Result of a scenario run
#[derive(Debug, Serialize)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    /// `ready` or `aborted`
    pub outcome: String,
    /// Stage that aborted, if any
    pub stage: Option<Stage>,
    pub failure: Option<FailureKind>,
    pub error: Option<String>,
    pub elapsed_ms: u64,
    pub timings: Vec<StageTiming>,
}

/// Duration of one completed stage
#[derive(Debug, Serialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub elapsed_ms: u64,
}

/// Run a scenario from a YAML file
pub async fn run_scenario(path: &Path, config: &Config, verbose: bool) -> Result<TestResult> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;

    let scenario: Scenario = serde_yaml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse scenario: {}", e)))?;

    run_loaded(scenario, config, verbose).await
}

/// Run an already parsed scenario
pub async fn run_loaded(scenario: Scenario, config: &Config, verbose: bool) -> Result<TestResult> {
    println!(
        "\n{} {}",
        "Running Scenario:".blue().bold(),
        scenario.name.white().bold()
    );
    if let Some(desc) = &scenario.description {
        println!("  {}", desc.dimmed());
    }

    let mut budgets = SequencerBudgets::from_config(&config.timeouts);
    if let Some(overrides) = &scenario.timeouts {
        overrides.apply(&mut budgets);
    }
    if verbose {
        println!(
            "  Budgets: launch {}ms, content {}ms, background {}ms",
            budgets.launch.timeout.as_millis(),
            budgets.content_load.timeout.as_millis(),
            budgets.background_init.timeout.as_millis()
        );
    }

    let platform = SimPlatform::new(scenario.launch.clone());
    let existing: Vec<Arc<dyn Instance>> = scenario
        .existing
        .iter()
        .map(|spec| {
            let kind = spec.kind.as_deref().unwrap_or(&scenario.target);
            platform.add_existing(kind, spec.expected_surface, spec.loading) as Arc<dyn Instance>
        })
        .collect();
    platform
        .process
        .complete_after(scenario.background_init_after_ms.map(Duration::from_millis))?;

    let policy = match scenario.mode {
        ScenarioMode::Launch => {
            let mut request = LaunchRequest::new(scenario.target.clone());
            request.url = scenario.url.clone();
            LaunchPolicy::Launch(request)
        }
        ScenarioMode::UseExisting => {
            let first = existing.first().ok_or_else(|| {
                Error::Config("use_existing mode requires at least one existing instance".into())
            })?;
            LaunchPolicy::UseExisting(InstanceHandle::new(first))
        }
    };

    let ui: Arc<dyn UiExecutor> = Arc::new(UiThread::spawn("ui-main")?);
    let sequencer = platform
        .sequencer(ui, &scenario.target)
        .with_ambiguity_policy(scenario.ambiguity);

    let started = Instant::now();
    let result = sequencer.await_fully_ready(policy, &budgets).await;
    let elapsed = started.elapsed();

    let report = match &result {
        Ok(ready) => report_ready(ready),
        Err(e) => report_aborted(e),
    };

    let mut test = TestResult {
        name: scenario.name.clone(),
        passed: false,
        outcome: report.outcome.to_string(),
        stage: report.stage,
        failure: report.failure,
        error: result.as_ref().err().map(|e| e.to_string()),
        elapsed_ms: elapsed.as_millis() as u64,
        timings: report.timings,
    };

    match check_expectation(&scenario.expect, &result, elapsed) {
        Ok(()) => {
            test.passed = true;
            println!(
                "\n{} {} ({}ms)\n",
                "✓".green().bold(),
                "Scenario Passed".green().bold(),
                test.elapsed_ms
            );
        }
        Err(e) => {
            println!("\n{} {}\n", "✗".red().bold(), e.to_string().red());
            test.error = Some(e.to_string());
        }
    }

    Ok(test)
}

struct Report {
    outcome: &'static str,
    stage: Option<Stage>,
    failure: Option<FailureKind>,
    timings: Vec<StageTiming>,
}

fn report_ready(ready: &Ready) -> Report {
    println!("\n{}", "Stages:".cyan());
    let timings = ready
        .timings
        .iter()
        .map(|(stage, elapsed)| {
            println!(
                "  {} {} ({}ms)",
                "✓".green(),
                stage,
                elapsed.as_millis().to_string().dimmed()
            );
            StageTiming {
                stage: *stage,
                elapsed_ms: elapsed.as_millis() as u64,
            }
        })
        .collect();
    Report {
        outcome: "ready",
        stage: None,
        failure: None,
        timings,
    }
}

fn report_aborted(error: &Error) -> Report {
    let stage = error.stage();
    println!("\n{}", "Stages:".cyan());
    println!(
        "  {} {}: {}",
        "✗".red(),
        stage.map(|s| s.to_string()).unwrap_or_else(|| "setup".into()),
        error.to_string().dimmed()
    );
    Report {
        outcome: "aborted",
        stage,
        failure: Some(classify(error)),
        timings: Vec::new(),
    }
}

/// Classify an error by its innermost cause
pub fn classify(error: &Error) -> FailureKind {
    match error {
        Error::StageAborted { cause, .. } => classify(cause),
        Error::Timeout { .. } => FailureKind::Timeout,
        Error::Assertion(_) => FailureKind::Assertion,
        Error::ConditionEvaluation { .. } => FailureKind::ConditionEvaluation,
        Error::LaunchFailed(_) | Error::AmbiguousLaunch { .. } => FailureKind::Launch,
        _ => FailureKind::Other,
    }
}

fn check_expectation(
    expect: &Expectation,
    result: &Result<Ready>,
    elapsed: Duration,
) -> Result<()> {
    match (expect.outcome, result) {
        (ExpectedOutcome::Ready, Ok(_)) => {}
        (ExpectedOutcome::Ready, Err(e)) => {
            return Err(Error::TestAssertion(format!("Expected ready, got: {}", e)));
        }
        (ExpectedOutcome::Aborted, Ok(_)) => {
            return Err(Error::TestAssertion(
                "Expected the sequence to abort, but it became ready".into(),
            ));
        }
        (ExpectedOutcome::Aborted, Err(e)) => {
            if let Some(expected_stage) = expect.stage {
                if e.stage() != Some(expected_stage) {
                    return Err(Error::TestAssertion(format!(
                        "Expected abort at stage '{}', got: {}",
                        expected_stage, e
                    )));
                }
            }
            if let Some(expected_failure) = expect.failure {
                let actual = classify(e);
                if actual != expected_failure {
                    return Err(Error::TestAssertion(format!(
                        "Expected {:?} failure, got {:?}: {}",
                        expected_failure, actual, e
                    )));
                }
            }
        }
    }

    if let Some(max) = expect.max_elapsed_ms {
        if elapsed > Duration::from_millis(max) {
            return Err(Error::TestAssertion(format!(
                "Expected completion within {}ms, took {}ms",
                max,
                elapsed.as_millis()
            )));
        }
    }

    Ok(())
}
