//! Identity snapshots of live instances
//!
//! Handles are weak: holding one never keeps an instance alive. A weak
//! reference does pin the allocation, so an address captured here cannot
//! be reused by a newer instance while the snapshot exists.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use crate::platform::{Instance, InstanceRegistry};

/// Identity of an instance allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(usize);

impl InstanceId {
    fn of(instance: &Weak<dyn Instance>) -> Self {
        Self(instance.as_ptr() as *const () as usize)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Non-owning, identity-compared reference to a UI instance
#[derive(Clone)]
pub struct InstanceHandle {
    inner: Weak<dyn Instance>,
    id: InstanceId,
}

impl InstanceHandle {
    pub fn new(instance: &Arc<dyn Instance>) -> Self {
        Self::from_weak(Arc::downgrade(instance))
    }

    pub fn from_weak(inner: Weak<dyn Instance>) -> Self {
        let id = InstanceId::of(&inner);
        Self { inner, id }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Resolve to the instance, or `None` once it has been destroyed
    ///
    /// Resolve on the UI context and drop the result before the next
    /// wait.
    pub fn upgrade(&self) -> Option<Arc<dyn Instance>> {
        self.inner.upgrade()
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl PartialEq for InstanceHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for InstanceHandle {}

impl Hash for InstanceHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceHandle")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// The set of instances that were alive at one moment
#[derive(Debug, Clone, Default)]
pub struct InstanceSetSnapshot {
    handles: HashMap<InstanceId, InstanceHandle>,
}

impl InstanceSetSnapshot {
    /// Capture from raw weak references, dropping ones already reclaimed
    pub fn capture<I>(refs: I) -> Self
    where
        I: IntoIterator<Item = Weak<dyn Instance>>,
    {
        let handles = refs
            .into_iter()
            .filter(|weak| weak.strong_count() > 0)
            .map(InstanceHandle::from_weak)
            .map(|handle| (handle.id(), handle))
            .collect();
        Self { handles }
    }

    pub fn capture_registry(registry: &dyn InstanceRegistry) -> Self {
        Self::capture(registry.snapshot_live_instances())
    }

    pub fn contains(&self, instance: &Arc<dyn Instance>) -> bool {
        self.contains_handle(&InstanceHandle::new(instance))
    }

    pub fn contains_handle(&self, handle: &InstanceHandle) -> bool {
        self.handles.contains_key(&handle.id())
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn handles(&self) -> impl Iterator<Item = &InstanceHandle> {
        self.handles.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{ContentViewHandle, EventCallback, Unregister};
    use std::any::Any;

    struct Plain;

    impl Instance for Plain {
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn content_view(&self) -> Option<ContentViewHandle> {
            None
        }
        fn is_content_loading(&self) -> bool {
            false
        }
        fn register_content_load_observer(&self, _callback: EventCallback) -> Unregister {
            Unregister::noop()
        }
        fn is_expected_surface(&self) -> bool {
            false
        }
    }

    fn instance() -> Arc<dyn Instance> {
        Arc::new(Plain)
    }

    #[test]
    fn test_capture_drops_reclaimed() {
        let alive = instance();
        let dead = instance();
        let dead_ref = Arc::downgrade(&dead);
        drop(dead);

        let snapshot = InstanceSetSnapshot::capture(vec![Arc::downgrade(&alive), dead_ref]);
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains(&alive));
    }

    #[test]
    fn test_identity_not_structure() {
        let a = instance();
        let b = instance();
        let snapshot = InstanceSetSnapshot::capture(vec![Arc::downgrade(&a)]);
        assert!(snapshot.contains(&a));
        assert!(!snapshot.contains(&b));
    }

    #[test]
    fn test_handle_does_not_extend_lifetime() {
        let a = instance();
        let handle = InstanceHandle::new(&a);
        assert!(handle.is_alive());
        drop(a);
        assert!(!handle.is_alive());
        assert!(handle.upgrade().is_none());
    }

    #[test]
    fn test_handle_equality_by_identity() {
        let a = instance();
        let h1 = InstanceHandle::new(&a);
        let h2 = InstanceHandle::new(&a);
        assert_eq!(h1, h2);
        assert_ne!(h1, InstanceHandle::new(&instance()));
    }
}
