//! Ordered readiness chain for a launched instance
//!
//! `NotStarted -> InstanceLaunched -> ContentLoaded -> BackgroundInitComplete -> Ready`
//!
//! Each stage starts only after the previous one reported success. The
//! first failure aborts the chain with [`Error::StageAborted`] naming the
//! stage that was being entered. Stages are never retried.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::condition::Criteria;
use super::event::EventWaiter;
use super::launch::{AmbiguityPolicy, LaunchDetector, TargetPredicate};
use super::poller::Poller;
use super::snapshot::InstanceHandle;
use super::timeout::{TimeoutSpec, WaitOutcome};
use super::ui::{run_on_ui, UiExecutor};
use crate::common::config::Timeouts;
use crate::common::{Error, Result};
use crate::platform::{
    ContentLoadEvents, ContentViewHandle, Instance, InstanceRegistry, LaunchRequest, Launcher,
    ProcessState,
};

/// Description of the content-attach poll
pub const CONTENT_NOT_ATTACHED: &str = "Content never attached/initialized";
/// Description of the content-load event wait
pub const CONTENT_NOT_LOADED: &str = "Content never finished loading";
/// Description of the background-init poll
pub const BACKGROUND_INIT_INCOMPLETE: &str = "Deferred startup never completed";

/// Readiness stages, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub enum Stage {
    #[serde(rename = "not-started")]
    NotStarted,
    #[serde(rename = "instance-launched")]
    InstanceLaunched,
    #[serde(rename = "content-loaded")]
    ContentLoaded,
    #[serde(rename = "background-init")]
    BackgroundInitComplete,
    #[serde(rename = "ready")]
    Ready,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not-started",
            Self::InstanceLaunched => "instance-launched",
            Self::ContentLoaded => "content-loaded",
            Self::BackgroundInitComplete => "background-init",
            Self::Ready => "ready",
        }
    }

    /// The stage after this one, `None` once ready
    pub fn next(&self) -> Option<Stage> {
        match self {
            Self::NotStarted => Some(Self::InstanceLaunched),
            Self::InstanceLaunched => Some(Self::ContentLoaded),
            Self::ContentLoaded => Some(Self::BackgroundInitComplete),
            Self::BackgroundInitComplete => Some(Self::Ready),
            Self::Ready => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the first stage obtains its instance
#[derive(Debug, Clone)]
pub enum LaunchPolicy {
    /// Launch a new instance and detect it
    Launch(LaunchRequest),
    /// Reuse an instance the test already holds
    UseExisting(InstanceHandle),
}

/// Timeout budget for each stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencerBudgets {
    pub launch: TimeoutSpec,
    /// Covers both the content-attach poll and the load event
    pub content_load: TimeoutSpec,
    /// Longest budget: background work is amortized per process
    pub background_init: TimeoutSpec,
}

impl SequencerBudgets {
    pub fn from_config(timeouts: &Timeouts) -> Self {
        Self {
            launch: timeouts.default_spec(),
            content_load: timeouts.startup_spec(),
            background_init: timeouts.long_spec(),
        }
    }
}

impl Default for SequencerBudgets {
    fn default() -> Self {
        Self::from_config(&Timeouts::default())
    }
}

/// A fully ready instance, with results memoized on the UI context
#[derive(Debug, Clone)]
pub struct Ready {
    pub instance: InstanceHandle,
    pub content_view: ContentViewHandle,
    /// How long each completed stage took
    pub timings: Vec<(Stage, Duration)>,
}

/// Composes launch detection, event waiting and polling into one chain
pub struct ReadinessSequencer {
    poller: Poller,
    detector: LaunchDetector,
    launcher: Arc<dyn Launcher>,
    process: Arc<dyn ProcessState>,
    target: TargetPredicate,
}

impl ReadinessSequencer {
    pub fn new(
        ui: Arc<dyn UiExecutor>,
        registry: Arc<dyn InstanceRegistry>,
        launcher: Arc<dyn Launcher>,
        process: Arc<dyn ProcessState>,
    ) -> Self {
        let poller = Poller::new(ui);
        let detector = LaunchDetector::new(poller.clone(), registry);
        Self {
            poller,
            detector,
            launcher,
            process,
            target: Arc::new(|instance: &dyn Instance| instance.is_expected_surface()),
        }
    }

    /// Select which new instances count as the launched one
    pub fn with_target(
        mut self,
        target: impl Fn(&dyn Instance) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.target = Arc::new(target);
        self
    }

    pub fn with_ambiguity_policy(mut self, policy: AmbiguityPolicy) -> Self {
        self.detector = self.detector.with_ambiguity_policy(policy);
        self
    }

    /// Drive an instance through every readiness stage
    pub async fn await_fully_ready(
        &self,
        policy: LaunchPolicy,
        budgets: &SequencerBudgets,
    ) -> Result<Ready> {
        let mut timings = Vec::with_capacity(4);

        let stage = Stage::InstanceLaunched;
        let started = self.enter(stage);
        let instance = self
            .launch_stage(policy, budgets.launch)
            .await
            .map_err(|e| self.abort(stage, e))?;
        timings.push(self.finish(stage, started));

        let stage = Stage::ContentLoaded;
        let started = self.enter(stage);
        self.content_stage(&instance, budgets.content_load)
            .await
            .map_err(|e| self.abort(stage, e))?;
        timings.push(self.finish(stage, started));

        let stage = Stage::BackgroundInitComplete;
        let started = self.enter(stage);
        self.background_stage(budgets.background_init)
            .await
            .map_err(|e| self.abort(stage, e))?;
        timings.push(self.finish(stage, started));

        let stage = Stage::Ready;
        let started = self.enter(stage);
        let content_view = self
            .final_assertions(&instance)
            .await
            .map_err(|e| self.abort(stage, e))?;
        timings.push(self.finish(stage, started));

        Ok(Ready {
            instance,
            content_view,
            timings,
        })
    }

    fn enter(&self, stage: Stage) -> Instant {
        tracing::debug!(%stage, "Entering readiness stage");
        Instant::now()
    }

    fn finish(&self, stage: Stage, started: Instant) -> (Stage, Duration) {
        let elapsed = started.elapsed();
        tracing::debug!(%stage, elapsed_ms = elapsed.as_millis() as u64, "Readiness stage complete");
        (stage, elapsed)
    }

    fn abort(&self, stage: Stage, cause: Error) -> Error {
        tracing::warn!(%stage, error = %cause, "Readiness sequence aborted");
        Error::stage_aborted(stage, cause)
    }

    async fn launch_stage(&self, policy: LaunchPolicy, spec: TimeoutSpec) -> Result<InstanceHandle> {
        match policy {
            LaunchPolicy::Launch(request) => {
                let launcher = self.launcher.clone();
                self.detector
                    .detect_new_instance(move || launcher.launch(&request), self.target.clone(), spec)
                    .await
            }
            LaunchPolicy::UseExisting(handle) => {
                if handle.is_alive() {
                    tracing::debug!(instance = %handle.id(), "Reusing existing instance");
                    Ok(handle)
                } else {
                    Err(Error::Assertion(
                        "existing instance was destroyed before the sequence started".into(),
                    ))
                }
            }
        }
    }

    async fn content_stage(&self, instance: &InstanceHandle, spec: TimeoutSpec) -> Result<()> {
        // Attach poll and load event share one budget
        let started = Instant::now();
        let deadline = spec.deadline(started);

        let attached = instance.clone();
        self.poller
            .wait_for(
                Criteria::fallible(CONTENT_NOT_ATTACHED, move || {
                    let instance = attached.upgrade().ok_or_else(destroyed)?;
                    Ok(instance.content_view().is_some())
                }),
                spec,
            )
            .await?
            .into_result(started.elapsed())?;

        // Register before reading the loading flag so a load finishing in
        // between is still counted.
        let observed = instance.clone();
        let (token, loading) = run_on_ui(&**self.poller.ui(), move || {
            let instance = observed.upgrade().ok_or_else(destroyed)?;
            let token = EventWaiter::register(&ContentLoadEvents(&*instance), CONTENT_NOT_LOADED);
            let loading = instance.is_content_loading();
            Ok::<_, Error>((token, loading))
        })
        .await??;

        let outcome = if loading {
            let remaining = spec.with_timeout(deadline.saturating_duration_since(Instant::now()));
            token.await_count(1, remaining).await
        } else {
            tracing::debug!("Content already loaded, not waiting for load event");
            WaitOutcome::Satisfied
        };

        // Observer lists belong to the UI context
        run_on_ui(&**self.poller.ui(), move || token.unregister()).await?;

        outcome.into_result(started.elapsed())
    }

    async fn background_stage(&self, spec: TimeoutSpec) -> Result<()> {
        let process = self.process.clone();
        self.poller
            .wait_until(
                BACKGROUND_INIT_INCOMPLETE,
                move || process.is_background_init_complete(),
                spec,
            )
            .await?
            .into_result(spec.timeout)
    }

    async fn final_assertions(&self, instance: &InstanceHandle) -> Result<ContentViewHandle> {
        let checked = instance.clone();
        run_on_ui(&**self.poller.ui(), move || {
            let instance = checked
                .upgrade()
                .ok_or_else(|| Error::Assertion("instance was destroyed".into()))?;
            let view = instance
                .content_view()
                .ok_or_else(|| Error::Assertion("instance has no content view".into()))?;
            if !instance.is_expected_surface() {
                return Err(Error::Assertion(
                    "instance is not the expected kind of surface".into(),
                ));
            }
            Ok(view)
        })
        .await?
    }
}

fn destroyed() -> Error {
    Error::Assertion("instance was destroyed while waiting".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        let mut stage = Stage::NotStarted;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            assert!(next > stage);
            seen.push(next);
            stage = next;
        }
        assert_eq!(seen.len(), 5);
        assert_eq!(stage, Stage::Ready);
    }

    #[test]
    fn test_stage_names_round_trip_through_serde() {
        let stage: Stage = serde_yaml::from_str("background-init").unwrap();
        assert_eq!(stage, Stage::BackgroundInitComplete);
        assert_eq!(stage.to_string(), "background-init");
    }

    #[test]
    fn test_background_budget_is_longest() {
        let budgets = SequencerBudgets::default();
        assert!(budgets.background_init.timeout > budgets.content_load.timeout);
        assert!(budgets.content_load.timeout > budgets.launch.timeout);
    }
}
