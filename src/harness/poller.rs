//! Poll-until-satisfied on the UI context
//!
//! Each check is marshalled onto the UI context as its own job, so the
//! context keeps making progress between polls. The poller holds no lock
//! while sleeping.

use std::sync::Arc;

use tokio::time::Instant;

use super::condition::{Condition, Criteria};
use super::timeout::{TimeoutSpec, WaitOutcome};
use super::ui::{run_on_ui, UiExecutor};
use crate::common::{Error, Result};

/// Re-evaluates conditions on a UI context until they hold or time runs out
#[derive(Clone)]
pub struct Poller {
    ui: Arc<dyn UiExecutor>,
}

impl Poller {
    pub fn new(ui: Arc<dyn UiExecutor>) -> Self {
        Self { ui }
    }

    pub fn ui(&self) -> &Arc<dyn UiExecutor> {
        &self.ui
    }

    /// Wait until `condition` holds
    ///
    /// Returns `Satisfied` on the first passing check. Returns `TimedOut`
    /// with the condition's description once `spec.timeout` has elapsed
    /// after a failing check; a zero timeout checks exactly once. A check
    /// that errors or panics ends the wait with
    /// [`Error::ConditionEvaluation`].
    pub async fn wait_for<C>(&self, condition: C, spec: TimeoutSpec) -> Result<WaitOutcome>
    where
        C: Condition + 'static,
    {
        let description = condition.description().to_string();
        let started = Instant::now();
        let deadline = spec.deadline(started);
        let mut condition = condition;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;

            // A stalled UI context must not turn this into an unbounded wait
            let job_budget = deadline
                .saturating_duration_since(Instant::now())
                .saturating_add(spec.poll_interval);
            let job = run_on_ui(&*self.ui, move || {
                let result = condition.check();
                (condition, result)
            });

            let (returned, result) = match tokio::time::timeout(job_budget, job).await {
                Ok(Ok(pair)) => pair,
                Ok(Err(Error::UiTaskPanicked(message))) => {
                    return Err(Error::condition_evaluation(&description, message));
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    tracing::warn!(
                        condition = %description,
                        attempts,
                        "UI context did not run the check before the deadline"
                    );
                    return Ok(WaitOutcome::TimedOut(description));
                }
            };
            condition = returned;

            match result {
                Ok(true) => {
                    tracing::debug!(
                        condition = %description,
                        attempts,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Condition satisfied"
                    );
                    return Ok(WaitOutcome::Satisfied);
                }
                Ok(false) => {
                    tracing::trace!(condition = %description, attempts, "Condition not yet satisfied");
                }
                Err(e @ Error::ConditionEvaluation { .. }) => return Err(e),
                Err(e) => return Err(Error::condition_evaluation(&description, e.to_string())),
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(
                    condition = %description,
                    attempts,
                    timeout_ms = spec.timeout.as_millis() as u64,
                    "Condition timed out"
                );
                return Ok(WaitOutcome::TimedOut(description));
            }

            tokio::time::sleep(spec.poll_interval.min(deadline - now)).await;
        }
    }

    /// Wait until a closure returns true
    pub async fn wait_until(
        &self,
        description: impl Into<String>,
        check: impl FnMut() -> bool + Send + 'static,
        spec: TimeoutSpec,
    ) -> Result<WaitOutcome> {
        self.wait_for(Criteria::new(description, check), spec).await
    }
}
