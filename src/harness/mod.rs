//! Readiness synchronization primitives
//!
//! Deterministic waits on asynchronously scheduled UI work:
//!
//! - [`Poller`] re-checks a [`Condition`] on the UI context until it holds
//! - [`InstanceSetSnapshot`] records which instances already existed
//! - [`LaunchDetector`] finds the instance a launch created
//! - [`EventWaiter`] counts callbacks fired from any thread
//! - [`ReadinessSequencer`] chains them: launched, content loaded,
//!   background init complete, ready
//!
//! Every wait is bounded by a [`TimeoutSpec`].

mod condition;
mod event;
mod launch;
mod poller;
mod sequencer;
mod snapshot;
mod timeout;
mod ui;

pub use condition::{Condition, Criteria, DEFAULT_DESCRIPTION};
pub use event::{EventWaiter, ObserverToken};
pub use launch::{AmbiguityPolicy, LaunchDetector, TargetPredicate, NOT_LAUNCHED};
pub use poller::Poller;
pub use sequencer::{
    LaunchPolicy, ReadinessSequencer, Ready, SequencerBudgets, Stage, BACKGROUND_INIT_INCOMPLETE,
    CONTENT_NOT_ATTACHED, CONTENT_NOT_LOADED,
};
pub use snapshot::{InstanceHandle, InstanceId, InstanceSetSnapshot};
pub use timeout::{TimeoutSpec, WaitOutcome, DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT, MAX_TIMEOUT};
pub use ui::{run_on_ui, UiExecutor, UiJob, UiThread};
