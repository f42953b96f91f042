//! Background task plumbing: cancellation flags, join handles, and a shared
//! slot surfacing background failures to the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{debug, error, warn};

/// Cooperative cancellation flag shared with a background task.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct SlotState {
    err: Option<(&'static str, anyhow::Error)>,
    closed: bool,
}

/// First-error-wins slot for failures in background tasks.
///
/// Every failure is recorded, whichever side of a shutdown race it lands on;
/// the session calls [`close`](Self::close) when teardown begins, and only
/// errors arriving after that are discarded as teardown noise.
#[derive(Clone, Default)]
pub struct ErrorSlot(Arc<Mutex<SlotState>>);

impl ErrorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error from the named task. Only the first is kept; later
    /// ones, and anything arriving after `close`, are logged and dropped.
    pub fn record(&self, task: &'static str, err: anyhow::Error) {
        let mut slot = self.0.lock().unwrap();
        if slot.closed {
            debug!(task = task, error = %err, "Error during teardown discarded");
        } else if slot.err.is_none() {
            slot.err = Some((task, err));
        } else {
            warn!(task = task, error = %err, "Additional background error discarded");
        }
    }

    /// Stop accepting new errors; the session is tearing down.
    pub fn close(&self) {
        self.0.lock().unwrap().closed = true;
    }

    pub fn take(&self) -> Option<(&'static str, anyhow::Error)> {
        self.0.lock().unwrap().err.take()
    }
}

/// A started background task: its cancellation flag plus, when the task's
/// blocking reads allow it, a join handle.
pub struct TaskHandle {
    name: &'static str,
    cancel: CancelFlag,
    join: Option<thread::JoinHandle<()>>,
}

impl TaskHandle {
    /// Spawn a joinable task. The closure must poll the flag between blocking
    /// operations and return `Ok` when it exits because of cancellation.
    pub fn spawn<F>(
        name: &'static str,
        cancel: CancelFlag,
        errors: ErrorSlot,
        f: F,
    ) -> std::io::Result<Self>
    where
        F: FnOnce(&CancelFlag) -> anyhow::Result<()> + Send + 'static,
    {
        let flag = cancel.clone();
        let join = thread::Builder::new().name(name.into()).spawn(move || {
            if let Err(e) = f(&flag) {
                error!(task = name, error = %e, "Background task failed");
                errors.record(name, e);
            }
        })?;
        Ok(Self {
            name,
            cancel,
            join: Some(join),
        })
    }

    /// Track a task that cannot be joined (its read blocks on a source only
    /// the process end can release, e.g. stdin). Cancellation still stops it
    /// from acting the next time its read returns.
    pub fn detached(name: &'static str, cancel: CancelFlag) -> Self {
        Self {
            name,
            cancel,
            join: None,
        }
    }

    /// Signal cancellation and join if the task is joinable.
    pub fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take() {
            debug!(task = self.name, "Joining background task");
            if join.join().is_err() {
                error!(task = self.name, "Background task panicked");
            }
        }
    }
}
