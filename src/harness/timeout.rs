//! Timeout budgets and wait outcomes

use std::time::Duration;

use tokio::time::Instant;

use crate::common::{Error, Result};

/// Delay between condition checks unless configured otherwise
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Base budget for a poll before scaling
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Upper bound on any single wait, whatever the spec asks for
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// How long a wait may take and how often it re-checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutSpec {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl TimeoutSpec {
    pub const fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    /// Check exactly once, no retries
    pub const fn once() -> Self {
        Self::new(Duration::ZERO, DEFAULT_POLL_INTERVAL)
    }

    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Multiply the timeout for slow environments; the interval is kept
    ///
    /// The result is clamped to [`MAX_TIMEOUT`]. A scale that is not a
    /// positive number yields a zero timeout.
    pub fn scaled(self, scale: f64) -> Self {
        let timeout = match Duration::try_from_secs_f64(self.timeout.as_secs_f64() * scale) {
            Ok(timeout) => timeout.min(MAX_TIMEOUT),
            Err(_) if scale > 0.0 => MAX_TIMEOUT,
            Err(_) => Duration::ZERO,
        };
        Self { timeout, ..self }
    }

    /// When a wait that began at `start` gives up
    pub fn deadline(&self, start: Instant) -> Instant {
        start + self.timeout.min(MAX_TIMEOUT)
    }
}

impl Default for TimeoutSpec {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_POLL_INTERVAL)
    }
}

/// Result of a bounded wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Satisfied,
    /// Carries the description of what never happened
    TimedOut(String),
}

impl WaitOutcome {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied)
    }

    /// Escalate a timeout into an error
    pub fn into_result(self, waited: Duration) -> Result<()> {
        match self {
            Self::Satisfied => Ok(()),
            Self::TimedOut(description) => Err(Error::timeout(description, waited)),
        }
    }
}
