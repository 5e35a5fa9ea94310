//! Repeatable checks with a diagnostic description

use std::fmt;

use crate::common::Result;

/// A check the poller evaluates until it holds
///
/// Checks run on the UI context and must return immediately; a check
/// that blocks stalls the context it is waiting on.
pub trait Condition: Send {
    /// Evaluate once. An `Err` is a harness bug, not "not ready yet".
    fn check(&mut self) -> Result<bool>;

    /// What the wait is for, reported on timeout
    fn description(&self) -> &str;
}

/// Description used when none is given
pub const DEFAULT_DESCRIPTION: &str = "Criteria not met";

/// A closure-backed [`Condition`]
pub struct Criteria {
    description: String,
    check: Box<dyn FnMut() -> Result<bool> + Send>,
}

impl Criteria {
    pub fn new(
        description: impl Into<String>,
        mut check: impl FnMut() -> bool + Send + 'static,
    ) -> Self {
        Self::fallible(description, move || Ok(check()))
    }

    /// A check that can fault; the fault aborts the wait
    pub fn fallible(
        description: impl Into<String>,
        check: impl FnMut() -> Result<bool> + Send + 'static,
    ) -> Self {
        Self {
            description: description.into(),
            check: Box::new(check),
        }
    }

    pub fn unnamed(check: impl FnMut() -> bool + Send + 'static) -> Self {
        Self::new(DEFAULT_DESCRIPTION, check)
    }
}

impl Condition for Criteria {
    fn check(&mut self) -> Result<bool> {
        (self.check)()
    }

    fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Debug for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Criteria")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}
