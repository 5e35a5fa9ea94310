//! Detect the instance a launch request created
//!
//! Snapshot the live set, fire the launch, then poll the registry for a
//! live instance that matches the target and was not in the snapshot.

use std::sync::{Arc, Mutex};

use super::condition::Criteria;
use super::poller::Poller;
use super::snapshot::{InstanceHandle, InstanceSetSnapshot};
use super::timeout::{TimeoutSpec, WaitOutcome};
use super::ui::run_on_ui;
use crate::common::{Error, Result};
use crate::platform::{Instance, InstanceRegistry};

/// Description reported when no new instance shows up
pub const NOT_LAUNCHED: &str = "instance not launched";

/// Predicate selecting the instance type a launch should produce
pub type TargetPredicate = Arc<dyn Fn(&dyn Instance) -> bool + Send + Sync>;

/// What to do when one poll finds several new matching instances
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// Take the first match in registry order
    #[default]
    FirstFound,
    /// Fail with [`Error::AmbiguousLaunch`]
    ///
    /// After the first poll that finds a match, the registry is scanned
    /// once more one poll interval later. A sibling appearing after that
    /// second scan goes unnoticed.
    RejectAmbiguous,
}

/// Finds newly created instances by diffing against a pre-launch snapshot
#[derive(Clone)]
pub struct LaunchDetector {
    poller: Poller,
    registry: Arc<dyn InstanceRegistry>,
    ambiguity: AmbiguityPolicy,
}

#[derive(Default)]
struct Found {
    first: Option<InstanceHandle>,
    count: usize,
}

impl LaunchDetector {
    pub fn new(poller: Poller, registry: Arc<dyn InstanceRegistry>) -> Self {
        Self {
            poller,
            registry,
            ambiguity: AmbiguityPolicy::default(),
        }
    }

    pub fn with_ambiguity_policy(mut self, policy: AmbiguityPolicy) -> Self {
        self.ambiguity = policy;
        self
    }

    /// Capture the currently live instances on the UI context
    pub async fn snapshot(&self) -> Result<InstanceSetSnapshot> {
        let registry = self.registry.clone();
        run_on_ui(&**self.poller.ui(), move || {
            InstanceSetSnapshot::capture_registry(&*registry)
        })
        .await
    }

    /// Run `launch` and return the new instance it produced
    ///
    /// Never returns an instance that was alive before `launch` ran, even
    /// if it matches `target`. Fails with [`Error::Timeout`] carrying
    /// [`NOT_LAUNCHED`] if no qualifying instance appears in time.
    pub async fn detect_new_instance<L>(
        &self,
        launch: L,
        target: TargetPredicate,
        spec: TimeoutSpec,
    ) -> Result<InstanceHandle>
    where
        L: FnOnce() -> Result<()>,
    {
        let before = self.snapshot().await?;
        tracing::debug!(existing = before.len(), "Captured pre-launch instances");

        launch()?;

        let before = Arc::new(before);
        let found = Arc::new(Mutex::new(Found::default()));
        let slot = found.clone();
        let registry = self.registry.clone();
        let snapshot = before.clone();
        let predicate = target.clone();
        let reject_ambiguous = self.ambiguity == AmbiguityPolicy::RejectAmbiguous;

        let condition = Criteria::fallible(NOT_LAUNCHED, move || {
            let matches = scan(&*registry, &snapshot, &predicate, !reject_ambiguous);
            let satisfied = matches.first.is_some();
            if satisfied {
                let mut slot = slot
                    .lock()
                    .map_err(|_| Error::Assertion("launch detector state poisoned".into()))?;
                *slot = matches;
            }
            Ok(satisfied)
        });

        let outcome = self.poller.wait_for(condition, spec).await?;
        if let WaitOutcome::TimedOut(description) = outcome {
            return Err(Error::timeout(description, spec.timeout));
        }

        let mut found = std::mem::take(
            &mut *found
                .lock()
                .map_err(|_| Error::Assertion("launch detector state poisoned".into()))?,
        );
        if reject_ambiguous && found.count == 1 {
            // Siblings from the same launch can land one poll later
            tokio::time::sleep(spec.poll_interval).await;
            let registry = self.registry.clone();
            let settled = run_on_ui(&**self.poller.ui(), move || {
                scan(&*registry, &before, &target, false)
            })
            .await?;
            found.count = found.count.max(settled.count);
        }

        if found.count > 1 {
            tracing::warn!(count = found.count, "Launch produced several matching instances");
            return Err(Error::AmbiguousLaunch { count: found.count });
        }

        let handle = found
            .first
            .ok_or_else(|| Error::Assertion("detected instance was not recorded".into()))?;
        tracing::debug!(instance = %handle.id(), "Detected launched instance");
        Ok(handle)
    }
}

/// Live instances matching `target` that were not in `before`, in
/// registry order
fn scan(
    registry: &dyn InstanceRegistry,
    before: &InstanceSetSnapshot,
    target: &TargetPredicate,
    stop_at_first: bool,
) -> Found {
    let mut matches = Found::default();
    for weak in registry.snapshot_live_instances() {
        let Some(instance) = weak.upgrade() else {
            continue;
        };
        if before.contains(&instance) || !target(&*instance) {
            continue;
        }
        matches.count += 1;
        if matches.first.is_none() {
            matches.first = Some(InstanceHandle::new(&instance));
        }
        if stop_at_first {
            break;
        }
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::ui::UiThread;
    use crate::platform::{ContentViewHandle, EventCallback, Unregister};
    use std::any::Any;
    use std::sync::Weak;
    use std::time::Duration;

    struct Window {
        wanted: bool,
    }

    impl Instance for Window {
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
            self.wanted
        }
    }

    #[derive(Default)]
    struct Registry {
        live: Mutex<Vec<Arc<dyn Instance>>>,
    }

    impl Registry {
        fn add(&self, wanted: bool) -> Arc<dyn Instance> {
            let instance: Arc<dyn Instance> = Arc::new(Window { wanted });
            self.live.lock().unwrap().push(instance.clone());
            instance
        }
    }

    impl InstanceRegistry for Registry {
        fn snapshot_live_instances(&self) -> Vec<Weak<dyn Instance>> {
            self.live.lock().unwrap().iter().map(Arc::downgrade).collect()
        }
    }

    fn wanted() -> TargetPredicate {
        Arc::new(|instance: &dyn Instance| instance.is_expected_surface())
    }

    fn setup() -> (Arc<Registry>, LaunchDetector) {
        let registry = Arc::new(Registry::default());
        let poller = Poller::new(Arc::new(UiThread::spawn("ui-launch-test").unwrap()));
        let detector = LaunchDetector::new(poller, registry.clone());
        (registry, detector)
    }

    fn spec(ms: u64) -> TimeoutSpec {
        TimeoutSpec::new(Duration::from_millis(ms), Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_detects_new_instance_not_in_snapshot() {
        let (registry, detector) = setup();
        let existing = registry.add(true);

        let launcher = registry.clone();
        let mut created = None;
        let handle = detector
            .detect_new_instance(
                || {
                    created = Some(launcher.add(true));
                    Ok(())
                },
                wanted(),
                spec(1_000),
            )
            .await
            .unwrap();

        assert_eq!(handle, InstanceHandle::new(created.as_ref().unwrap()));
        assert_ne!(handle, InstanceHandle::new(&existing));
    }

    #[tokio::test]
    async fn test_preexisting_match_is_never_reported() {
        let (registry, detector) = setup();
        let _existing = registry.add(true);

        let err = detector
            .detect_new_instance(|| Ok(()), wanted(), spec(100))
            .await
            .unwrap_err();

        match err {
            Error::Timeout { description, .. } => assert_eq!(description, NOT_LAUNCHED),
            other => panic!("Expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_skips_new_instance_of_wrong_type() {
        let (registry, detector) = setup();
        let launcher = registry.clone();

        let err = detector
            .detect_new_instance(
                || {
                    launcher.add(false);
                    Ok(())
                },
                wanted(),
                spec(100),
            )
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_launch_failure_propagates() {
        let (_registry, detector) = setup();
        let err = detector
            .detect_new_instance(
                || Err(Error::LaunchFailed("no handler".into())),
                wanted(),
                spec(100),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LaunchFailed(_)));
    }

    #[tokio::test]
    async fn test_reject_ambiguous() {
        let (registry, detector) = setup();
        let detector = detector.with_ambiguity_policy(AmbiguityPolicy::RejectAmbiguous);
        let launcher = registry.clone();

        let err = detector
            .detect_new_instance(
                || {
                    launcher.add(true);
                    launcher.add(true);
                    Ok(())
                },
                wanted(),
                spec(500),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AmbiguousLaunch { count: 2 }));
    }

    #[tokio::test]
    async fn test_reject_ambiguous_sees_late_sibling() {
        let (registry, detector) = setup();
        let detector = detector.with_ambiguity_policy(AmbiguityPolicy::RejectAmbiguous);
        let launcher = registry.clone();

        let err = detector
            .detect_new_instance(
                || {
                    launcher.add(true);
                    let late = launcher.clone();
                    std::thread::spawn(move || {
                        std::thread::sleep(Duration::from_millis(10));
                        late.add(true);
                    });
                    Ok(())
                },
                wanted(),
                TimeoutSpec::new(Duration::from_millis(1_000), Duration::from_millis(150)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AmbiguousLaunch { count: 2 }), "{err:?}");
    }

    #[tokio::test]
    async fn test_reject_ambiguous_accepts_single_match() {
        let (registry, detector) = setup();
        let detector = detector.with_ambiguity_policy(AmbiguityPolicy::RejectAmbiguous);
        let launcher = registry.clone();
        let mut created = None;

        let handle = detector
            .detect_new_instance(
                || {
                    created = Some(launcher.add(true));
                    Ok(())
                },
                wanted(),
                spec(500),
            )
            .await
            .unwrap();
        assert_eq!(handle, InstanceHandle::new(created.as_ref().unwrap()));
    }

    #[tokio::test]
    async fn test_first_found_takes_registry_order() {
        let (registry, detector) = setup();
        let launcher = registry.clone();
        let mut first = None;

        let handle = detector
            .detect_new_instance(
                || {
                    first = Some(launcher.add(true));
                    launcher.add(true);
                    Ok(())
                },
                wanted(),
                spec(500),
            )
            .await
            .unwrap();
        assert_eq!(handle, InstanceHandle::new(first.as_ref().unwrap()));
    }
}
