//! Contracts the harness needs from the windowing system under test
//!
//! The harness never creates, owns or destroys instances. It only reads
//! these capabilities, always from the UI context, and keeps nothing but
//! weak handles across a wait.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::common::Result;

/// Callback fired by an event source; may run on any thread
pub type EventCallback = Arc<dyn Fn() + Send + Sync>;

/// Opaque handle to an instance's primary content view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub struct ContentViewHandle(u64);

impl ContentViewHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Removes an observer registration when run or dropped
///
/// Dropping the guard is enough; `run` exists for call sites that want
/// the removal to be visible.
pub struct Unregister(Option<Box<dyn FnOnce() + Send>>);

impl Unregister {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(f)))
    }

    /// A registration that needs no cleanup
    pub fn noop() -> Self {
        Self(None)
    }

    pub fn run(mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl Drop for Unregister {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl fmt::Debug for Unregister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unregister")
            .field("pending", &self.0.is_some())
            .finish()
    }
}

/// A live top-level UI instance (window, activity, surface)
///
/// All methods are called on the UI context.
pub trait Instance: Any + Send + Sync {
    /// Upcast for type checks against concrete instance types
    fn as_any(&self) -> &dyn Any;

    /// The primary content view, once it has been created
    fn content_view(&self) -> Option<ContentViewHandle>;

    /// Whether the primary content is currently loading
    fn is_content_loading(&self) -> bool;

    /// Observe "content finished loading" events
    fn register_content_load_observer(&self, callback: EventCallback) -> Unregister;

    /// Whether this instance is the kind of surface the test expects
    fn is_expected_surface(&self) -> bool;
}

impl<'a> dyn Instance + 'a {
    /// Whether this instance is of concrete type `T`
    pub fn is<T: Instance>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Instance>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// The windowing system's list of running instances
pub trait InstanceRegistry: Send + Sync {
    /// Weak references to every instance the system considers running,
    /// in registry order. Some may already be reclaimed.
    fn snapshot_live_instances(&self) -> Vec<Weak<dyn Instance>>;
}

/// What to launch; interpretation belongs to the `Launcher`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchRequest {
    /// Kind of instance to create
    pub target: String,
    /// Optional content to open in it
    pub url: Option<String>,
}

impl LaunchRequest {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// Fire-and-forget creation trigger
pub trait Launcher: Send + Sync {
    /// Dispatch the request. Returns once dispatched, not once the
    /// instance exists.
    fn launch(&self, request: &LaunchRequest) -> Result<()>;
}

/// Process-wide state owned outside the harness
pub trait ProcessState: Send + Sync {
    /// Whether deferred background initialization has finished
    fn is_background_init_complete(&self) -> bool;
}

/// Anything that can deliver a repeatable notification
pub trait EventSource {
    fn subscribe(&self, callback: EventCallback) -> Unregister;
}

/// The "content finished loading" event of one instance
pub struct ContentLoadEvents<'a>(pub &'a dyn Instance);

impl EventSource for ContentLoadEvents<'_> {
    fn subscribe(&self, callback: EventCallback) -> Unregister {
        self.0.register_content_load_observer(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_unregister_runs_once_on_drop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let guard = Unregister::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(guard);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregister_run_consumes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        Unregister::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .run();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_launch_request_builder() {
        let request = LaunchRequest::new("custom_tab").with_url("https://example.com");
        assert_eq!(request.target, "custom_tab");
        assert_eq!(request.url.as_deref(), Some("https://example.com"));
    }
}
