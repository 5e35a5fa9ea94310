//! In-process simulated windowing system
//!
//! Implements every platform contract with scripted delays. Instances are
//! created, attached and finish loading on background threads, so the
//! harness sees the same cross-thread timing it would against a real UI.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

use serde::Deserialize;

use crate::common::{Error, Result};
use crate::harness::{ReadinessSequencer, UiExecutor};
use crate::platform::{
    ContentViewHandle, EventCallback, Instance, InstanceRegistry, LaunchRequest, Launcher,
    ProcessState, Unregister,
};

static NEXT_VIEW_ID: AtomicU64 = AtomicU64::new(1);

fn next_view() -> ContentViewHandle {
    ContentViewHandle::new(NEXT_VIEW_ID.fetch_add(1, Ordering::Relaxed))
}

#[derive(Debug, Default)]
struct ContentState {
    view: Option<ContentViewHandle>,
    loading: bool,
}

type Observers = Arc<Mutex<Vec<(u64, EventCallback)>>>;

/// A simulated top-level instance
pub struct SimInstance {
    kind: String,
    expected_surface: bool,
    state: Mutex<ContentState>,
    observers: Observers,
    next_observer: AtomicU64,
}

impl SimInstance {
    pub fn new(kind: impl Into<String>, expected_surface: bool) -> Arc<Self> {
        Arc::new(Self {
            kind: kind.into(),
            expected_surface,
            state: Mutex::new(ContentState::default()),
            observers: Arc::new(Mutex::new(Vec::new())),
            next_observer: AtomicU64::new(0),
        })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Create the content view, optionally already loading
    pub fn attach_content(&self, loading: bool) -> ContentViewHandle {
        let view = next_view();
        if let Ok(mut state) = self.state.lock() {
            state.view = Some(view);
            state.loading = loading;
        }
        view
    }

    /// Mark content loaded and notify observers on the calling thread
    pub fn finish_loading(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.loading = false;
        }
        // Fire outside the lock; observers may call back into us
        let observers: Vec<EventCallback> = match self.observers.lock() {
            Ok(list) => list.iter().map(|(_, cb)| cb.clone()).collect(),
            Err(_) => return,
        };
        tracing::trace!(kind = %self.kind, observers = observers.len(), "Content finished loading");
        for observer in observers {
            observer();
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().map(|list| list.len()).unwrap_or(0)
    }
}

impl Instance for SimInstance {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn content_view(&self) -> Option<ContentViewHandle> {
        self.state.lock().ok().and_then(|state| state.view)
    }

    fn is_content_loading(&self) -> bool {
        self.state.lock().map(|state| state.loading).unwrap_or(false)
    }

    fn register_content_load_observer(&self, callback: EventCallback) -> Unregister {
        let id = self.next_observer.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut list) = self.observers.lock() {
            list.push((id, callback));
        }
        let observers = self.observers.clone();
        Unregister::new(move || {
            if let Ok(mut list) = observers.lock() {
                list.retain(|(other, _)| *other != id);
            }
        })
    }

    fn is_expected_surface(&self) -> bool {
        self.expected_surface
    }
}

/// Owns the simulated instances, in creation order
#[derive(Default)]
pub struct SimRegistry {
    live: Mutex<Vec<Arc<SimInstance>>>,
}

impl SimRegistry {
    pub fn insert(&self, instance: Arc<SimInstance>) {
        if let Ok(mut live) = self.live.lock() {
            live.push(instance);
        }
    }

    /// Destroy an instance; outstanding weak handles stop resolving
    pub fn destroy(&self, instance: &Arc<SimInstance>) {
        if let Ok(mut live) = self.live.lock() {
            live.retain(|other| !Arc::ptr_eq(other, instance));
        }
    }

    pub fn len(&self) -> usize {
        self.live.lock().map(|live| live.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn instances(&self) -> Vec<Arc<SimInstance>> {
        self.live.lock().map(|live| live.clone()).unwrap_or_default()
    }
}

impl InstanceRegistry for SimRegistry {
    fn snapshot_live_instances(&self) -> Vec<Weak<dyn Instance>> {
        self.instances()
            .iter()
            .map(|instance| Arc::downgrade(instance) as Weak<dyn Instance>)
            .collect()
    }
}

/// Timing script for what a launch produces
#[derive(Debug, Clone, Deserialize)]
pub struct LaunchScript {
    /// Kind of instance created; `None` uses the request's target
    #[serde(default)]
    pub kind: Option<String>,
    /// Delay before the instance appears; `None` means it never does
    #[serde(default = "default_zero")]
    pub create_after_ms: Option<u64>,
    /// Delay after creation before content attaches; `None` means never
    #[serde(default = "default_zero")]
    pub content_after_ms: Option<u64>,
    /// Content attaches loading and finishes after this delay; `None`
    /// attaches it already loaded
    #[serde(default)]
    pub load_ms: Option<u64>,
    /// Whether loading ever finishes
    #[serde(default = "default_true")]
    pub finish_loading: bool,
    #[serde(default = "default_true")]
    pub expected_surface: bool,
    /// Extra identical instances created alongside the first
    #[serde(default)]
    pub siblings: usize,
    /// Reject the launch request outright
    #[serde(default)]
    pub reject: bool,
}

impl Default for LaunchScript {
    fn default() -> Self {
        Self {
            kind: None,
            create_after_ms: default_zero(),
            content_after_ms: default_zero(),
            load_ms: None,
            finish_loading: true,
            expected_surface: true,
            siblings: 0,
            reject: false,
        }
    }
}

fn default_zero() -> Option<u64> {
    Some(0)
}

fn default_true() -> bool {
    true
}

/// Launcher that plays a [`LaunchScript`] on a background thread
pub struct SimLauncher {
    registry: Arc<SimRegistry>,
    script: LaunchScript,
    launches: AtomicUsize,
}

impl SimLauncher {
    pub fn new(registry: Arc<SimRegistry>, script: LaunchScript) -> Self {
        Self {
            registry,
            script,
            launches: AtomicUsize::new(0),
        }
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

impl Launcher for SimLauncher {
    fn launch(&self, request: &LaunchRequest) -> Result<()> {
        if self.script.reject {
            return Err(Error::LaunchFailed(format!(
                "no handler for '{}'",
                request.target
            )));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(target_kind = %request.target, url = ?request.url, "Simulated launch dispatched");

        let Some(create_after) = self.script.create_after_ms else {
            return Ok(());
        };

        let registry = self.registry.clone();
        let script = self.script.clone();
        let kind = script.kind.clone().unwrap_or_else(|| request.target.clone());

        thread::Builder::new()
            .name("sim-launch".to_string())
            .spawn(move || {
                thread::sleep(Duration::from_millis(create_after));
                let created: Vec<Arc<SimInstance>> = (0..=script.siblings)
                    .map(|_| SimInstance::new(kind.clone(), script.expected_surface))
                    .collect();
                for instance in &created {
                    registry.insert(instance.clone());
                }

                let Some(content_after) = script.content_after_ms else {
                    return;
                };
                thread::sleep(Duration::from_millis(content_after));
                for instance in &created {
                    instance.attach_content(script.load_ms.is_some());
                }

                if let (Some(load), true) = (script.load_ms, script.finish_loading) {
                    thread::sleep(Duration::from_millis(load));
                    for instance in &created {
                        instance.finish_loading();
                    }
                }
            })?;

        Ok(())
    }
}

/// Process-wide deferred startup flag
#[derive(Default)]
pub struct SimProcessState {
    complete: Arc<AtomicBool>,
}

impl SimProcessState {
    pub fn set_complete(&self) {
        self.complete.store(true, Ordering::SeqCst);
    }

    /// Complete after a delay; `None` leaves it incomplete forever
    pub fn complete_after(&self, delay: Option<Duration>) -> Result<()> {
        let Some(delay) = delay else {
            return Ok(());
        };
        if delay.is_zero() {
            self.set_complete();
            return Ok(());
        }
        let flag = self.complete.clone();
        thread::Builder::new()
            .name("sim-deferred-startup".to_string())
            .spawn(move || {
                thread::sleep(delay);
                flag.store(true, Ordering::SeqCst);
            })?;
        Ok(())
    }
}

impl ProcessState for SimProcessState {
    fn is_background_init_complete(&self) -> bool {
        self.complete.load(Ordering::SeqCst)
    }
}

/// Registry, launcher and process state wired together
pub struct SimPlatform {
    pub registry: Arc<SimRegistry>,
    pub launcher: Arc<SimLauncher>,
    pub process: Arc<SimProcessState>,
}

impl SimPlatform {
    pub fn new(script: LaunchScript) -> Self {
        let registry = Arc::new(SimRegistry::default());
        let launcher = Arc::new(SimLauncher::new(registry.clone(), script));
        Self {
            registry,
            launcher,
            process: Arc::new(SimProcessState::default()),
        }
    }

    /// Add an instance that is already live before any launch
    pub fn add_existing(&self, kind: &str, expected_surface: bool, loading: bool) -> Arc<SimInstance> {
        let instance = SimInstance::new(kind, expected_surface);
        instance.attach_content(loading);
        self.registry.insert(instance.clone());
        instance
    }

    /// A sequencer over this platform targeting instances of `kind`
    pub fn sequencer(&self, ui: Arc<dyn UiExecutor>, kind: &str) -> ReadinessSequencer {
        ReadinessSequencer::new(
            ui,
            self.registry.clone(),
            self.launcher.clone(),
            self.process.clone(),
        )
        .with_target(kind_predicate(kind))
    }
}

/// Matches simulated instances of one kind
pub fn kind_predicate(kind: &str) -> impl Fn(&dyn Instance) -> bool + Send + Sync + 'static {
    let kind = kind.to_string();
    move |instance: &dyn Instance| {
        instance
            .downcast_ref::<SimInstance>()
            .is_some_and(|sim| sim.kind() == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_loading_notifies_observers() {
        let instance = SimInstance::new("tab", true);
        instance.attach_content(true);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let _registration = instance.register_content_load_observer(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        instance.finish_loading();
        assert!(!instance.is_content_loading());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregister_removes_observer() {
        let instance = SimInstance::new("tab", true);
        let registration = instance.register_content_load_observer(Arc::new(|| {}));
        assert_eq!(instance.observer_count(), 1);
        drop(registration);
        assert_eq!(instance.observer_count(), 0);
    }

    #[test]
    fn test_destroyed_instances_stop_resolving() {
        let platform = SimPlatform::new(LaunchScript::default());
        let instance = platform.add_existing("tab", true, false);
        let refs = platform.registry.snapshot_live_instances();
        platform.registry.destroy(&instance);
        drop(instance);
        assert!(refs[0].upgrade().is_none());
    }

    #[test]
    fn test_kind_predicate() {
        let matches = kind_predicate("custom_tab");
        let tab: Arc<dyn Instance> = SimInstance::new("custom_tab", true);
        let other: Arc<dyn Instance> = SimInstance::new("main", true);
        assert!(matches(&*tab));
        assert!(!matches(&*other));
    }

    #[test]
    fn test_rejected_launch() {
        let script = LaunchScript {
            reject: true,
            ..LaunchScript::default()
        };
        let platform = SimPlatform::new(script);
        let err = platform.launcher.launch(&LaunchRequest::new("tab")).unwrap_err();
        assert!(matches!(err, Error::LaunchFailed(_)));
        assert_eq!(platform.launcher.launch_count(), 0);
    }
}
