//! The designated UI execution context
//!
//! All instance and content state is read on a single UI thread. Test
//! logic runs elsewhere and marshals work onto it with [`run_on_ui`],
//! getting back plain values once the job finishes.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;
use std::thread::{self, JoinHandle, ThreadId};

use tokio::sync::{mpsc, oneshot};

use crate::common::{Error, Result};

/// A unit of work for the UI context
pub type UiJob = Box<dyn FnOnce() + Send + 'static>;

/// Something that can run jobs on the UI context
pub trait UiExecutor: Send + Sync {
    /// Queue a job. Must not run it inline on the caller's thread.
    fn post(&self, job: UiJob) -> Result<()>;

    /// Whether the current thread is the UI context
    fn is_ui_thread(&self) -> bool;
}

/// Run `f` on the UI context and wait for its result
///
/// A panic inside `f` is caught on the UI thread and surfaced as
/// [`Error::UiTaskPanicked`]; the UI context keeps running.
pub async fn run_on_ui<E, F, R>(ui: &E, f: F) -> Result<R>
where
    E: UiExecutor + ?Sized,
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    ui.post(Box::new(move || {
        let result = panic::catch_unwind(AssertUnwindSafe(f)).map_err(panic_message);
        // Receiver gone means the caller stopped waiting
        let _ = tx.send(result);
    }))?;

    match rx.await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(message)) => Err(Error::UiTaskPanicked(message)),
        Err(_) => Err(Error::UiContextClosed),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// A dedicated OS thread acting as the UI/main context
///
/// Jobs run strictly in posting order, one at a time.
pub struct UiThread {
    sender: Mutex<Option<mpsc::UnboundedSender<UiJob>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl UiThread {
    /// Spawn the UI thread
    pub fn spawn(name: &str) -> Result<Self> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<UiJob>();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                tracing::debug!("UI context started");
                while let Some(job) = receiver.blocking_recv() {
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                        tracing::error!(
                            panic = %panic_message(payload),
                            "UI job panicked"
                        );
                    }
                }
                tracing::debug!("UI context stopped");
            })?;

        let thread_id = handle.thread().id();
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
            thread_id,
        })
    }

    /// Stop accepting jobs, drain the queue and join the thread
    ///
    /// Blocks; call it from synchronous code or `spawn_blocking`.
    pub fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let handle = self.handle.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                tracing::warn!("UI thread exited with a panic");
            }
        }
    }
}

impl UiExecutor for UiThread {
    fn post(&self, job: UiJob) -> Result<()> {
        let sender = self.sender.lock().map_err(|_| Error::UiContextClosed)?;
        match sender.as_ref() {
            Some(sender) => sender.send(job).map_err(|_| Error::UiContextClosed),
            None => Err(Error::UiContextClosed),
        }
    }

    fn is_ui_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }
}

impl Drop for UiThread {
    /// Close the queue and detach; only [`UiThread::shutdown`] joins
    fn drop(&mut self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }
}
