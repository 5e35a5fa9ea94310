//! Counting rendezvous for asynchronous callbacks
//!
//! The observer attached to the subject bumps a counter held in a watch
//! channel. Increments may come from any thread; waiters only compare
//! the counter against a target, so the release is naturally one-shot
//! and later increments never re-signal anyone.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use super::timeout::{TimeoutSpec, WaitOutcome};
use crate::platform::{EventCallback, EventSource, Unregister};

/// Registers counting observers on event sources
pub struct EventWaiter;

impl EventWaiter {
    /// Attach a counting observer to `subject`
    ///
    /// Register before triggering or inspecting the subject; events fired
    /// after this returns are never lost.
    pub fn register(subject: &dyn EventSource, description: impl Into<String>) -> ObserverToken {
        let (sender, receiver) = watch::channel(0usize);
        let callback: EventCallback = Arc::new(move || {
            // Works with no receivers left, so late events stay harmless
            sender.send_modify(|count| *count += 1);
        });
        let unregister = subject.subscribe(callback);

        ObserverToken {
            description: description.into(),
            count: receiver,
            unregister: Mutex::new(Some(unregister)),
        }
    }
}

/// A live registration plus its call counter
///
/// Dropping the token removes the observer from the subject, on the
/// dropping thread; call [`ObserverToken::unregister`] on the UI context
/// when the subject expects that.
#[derive(Debug)]
pub struct ObserverToken {
    description: String,
    count: watch::Receiver<usize>,
    unregister: Mutex<Option<Unregister>>,
}

impl ObserverToken {
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Number of events observed since registration
    pub fn call_count(&self) -> usize {
        *self.count.borrow()
    }

    /// Wait until at least `required` events have been observed in total
    pub async fn await_count(&self, required: usize, spec: TimeoutSpec) -> WaitOutcome {
        self.await_count_from(0, required, spec).await
    }

    /// Wait for `additional` events beyond a previously seen `call_count`
    ///
    /// Resolves immediately, without blocking, when the count is already
    /// reached. Safe to call repeatedly and concurrently.
    pub async fn await_count_from(
        &self,
        start: usize,
        additional: usize,
        spec: TimeoutSpec,
    ) -> WaitOutcome {
        let target = start.saturating_add(additional);
        let mut receiver = self.count.clone();

        let waited = tokio::time::timeout(spec.timeout, async {
            receiver.wait_for(|count| *count >= target).await.is_ok()
        })
        .await;

        match waited {
            Ok(true) => {
                tracing::debug!(event = %self.description, target, "Event count reached");
                WaitOutcome::Satisfied
            }
            Ok(false) => {
                tracing::warn!(
                    event = %self.description,
                    observed = self.call_count(),
                    target,
                    "Event source dropped its observer before the count was reached"
                );
                WaitOutcome::TimedOut(self.description.clone())
            }
            Err(_) => {
                tracing::debug!(
                    event = %self.description,
                    observed = self.call_count(),
                    target,
                    "Timed out waiting for events"
                );
                WaitOutcome::TimedOut(self.description.clone())
            }
        }
    }

    /// Remove the observer now instead of on drop
    pub fn unregister(&self) {
        let registration = self.unregister.lock().ok().and_then(|mut u| u.take());
        if let Some(registration) = registration {
            registration.run();
        }
    }
}

impl Drop for ObserverToken {
    fn drop(&mut self) {
        self.unregister();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Subject that stores observers and fires them on demand
    #[derive(Default)]
    struct Subject {
        observers: Arc<Mutex<Vec<(u64, EventCallback)>>>,
        next_id: Mutex<u64>,
    }

    impl Subject {
        fn fire(&self) {
            let observers: Vec<EventCallback> = self
                .observers
                .lock()
                .unwrap()
                .iter()
                .map(|(_, cb)| cb.clone())
                .collect();
            for observer in observers {
                observer();
            }
        }

        fn observer_count(&self) -> usize {
            self.observers.lock().unwrap().len()
        }
    }

    impl EventSource for Subject {
        fn subscribe(&self, callback: EventCallback) -> Unregister {
            let id = {
                let mut next = self.next_id.lock().unwrap();
                *next += 1;
                *next
            };
            self.observers.lock().unwrap().push((id, callback));
            let observers = self.observers.clone();
            Unregister::new(move || {
                observers.lock().unwrap().retain(|(other, _)| *other != id);
            })
        }
    }

    fn spec(ms: u64) -> TimeoutSpec {
        TimeoutSpec::new(Duration::from_millis(ms), Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_events_before_await_are_counted() {
        let subject = Subject::default();
        let token = EventWaiter::register(&subject, "load finished");
        subject.fire();
        subject.fire();

        assert_eq!(token.await_count(2, spec(50)).await, WaitOutcome::Satisfied);
        assert_eq!(token.call_count(), 2);
    }

    #[tokio::test]
    async fn test_events_from_other_thread() {
        let subject = Arc::new(Subject::default());
        let token = EventWaiter::register(&*subject, "load finished");

        let firing = subject.clone();
        std::thread::spawn(move || {
            for _ in 0..3 {
                std::thread::sleep(Duration::from_millis(10));
                firing.fire();
            }
        });

        assert_eq!(token.await_count(3, spec(2_000)).await, WaitOutcome::Satisfied);
    }

    #[tokio::test]
    async fn test_too_few_events_time_out() {
        let subject = Subject::default();
        let token = EventWaiter::register(&subject, "load finished");
        subject.fire();

        assert_eq!(
            token.await_count(2, spec(50)).await,
            WaitOutcome::TimedOut("load finished".to_string())
        );
    }

    #[tokio::test]
    async fn test_await_twice_when_satisfied() {
        let subject = Subject::default();
        let token = EventWaiter::register(&subject, "load finished");
        subject.fire();

        let started = std::time::Instant::now();
        assert!(token.await_count(1, spec(5_000)).await.is_satisfied());
        assert!(token.await_count(1, spec(5_000)).await.is_satisfied());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_zero_timeout_still_sees_recorded_events() {
        let subject = Subject::default();
        let token = EventWaiter::register(&subject, "load finished");
        subject.fire();
        assert!(token.await_count(1, TimeoutSpec::once()).await.is_satisfied());
    }

    #[tokio::test]
    async fn test_await_count_from_previous_count() {
        let subject = Subject::default();
        let token = EventWaiter::register(&subject, "load finished");
        subject.fire();
        let seen = token.call_count();

        assert!(!token.await_count_from(seen, 1, spec(30)).await.is_satisfied());
        subject.fire();
        assert!(token.await_count_from(seen, 1, spec(30)).await.is_satisfied());
    }

    #[test]
    fn test_drop_unregisters_and_late_events_are_harmless() {
        let subject = Subject::default();
        let token = EventWaiter::register(&subject, "load finished");
        assert_eq!(subject.observer_count(), 1);

        drop(token);
        assert_eq!(subject.observer_count(), 0);
        subject.fire();
    }

    #[test]
    fn test_late_event_after_unregister_with_retained_callback() {
        let subject = Subject::default();
        let token = EventWaiter::register(&subject, "load finished");
        let retained = subject.observers.lock().unwrap()[0].1.clone();
        drop(token);
        retained();
    }
}
