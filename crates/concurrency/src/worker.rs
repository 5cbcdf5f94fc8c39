//! Persistent worker thread.
//!
//! A `BackgroundWorker` owns at most one live [`RunLoop`] on a dedicated
//! thread. Standing background handles use it so the thread that opened a
//! handle keeps processing events (change notifications in particular)
//! after the task that opened the handle has returned.
//!
//! `start` replaces any previous run: the old loop is cancelled before the
//! new thread is spawned, so two loops never coexist on one worker.
//! `stop` is cooperative and does not join.

use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::run_loop::RunLoop;

/// A dedicated thread hosting a run loop.
pub struct BackgroundWorker {
    label: String,
    current: Mutex<Option<RunLoop>>,
}

impl BackgroundWorker {
    /// Create a worker. Threads it spawns are named `<label>-<uuid>`.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            current: Mutex::new(None),
        }
    }

    /// Spawn a fresh thread and run `task` on it exactly once.
    ///
    /// Any previous run is stopped first. Does not wait for `task`.
    ///
    /// # Panics
    ///
    /// Panics if the operating system refuses to spawn the thread.
    pub fn start(&self, task: impl FnOnce() + Send + 'static) -> RunLoop {
        let mut current = self.current.lock();
        if let Some(previous) = current.take() {
            previous.cancel();
        }

        let name = format!("{}-{}", self.label, Uuid::new_v4());
        let run_loop = RunLoop::new(name.clone());

        let rl = run_loop.clone();
        std::thread::Builder::new()
            .name(name)
            .spawn(move || rl.run(Box::new(task)))
            .expect("failed to spawn background worker thread");

        debug!(run_loop = %run_loop.name(), "background worker started");
        *current = Some(run_loop.clone());
        run_loop
    }

    /// Cancel the current run and release it.
    ///
    /// The loop notices on its next wake; work already running is not interrupted.
    pub fn stop(&self) {
        if let Some(run_loop) = self.current.lock().take() {
            run_loop.cancel();
        }
    }

    /// Whether a run is active and not cancelled.
    pub fn is_running(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .map_or(false, |run_loop| !run_loop.is_cancelled())
    }

    /// The current run loop, if started.
    pub fn run_loop(&self) -> Option<RunLoop> {
        self.current.lock().clone()
    }

    /// Post `task` to the current run loop.
    ///
    /// Returns `false` if the worker is not running.
    pub fn perform(&self, task: impl FnOnce() + Send + 'static) -> bool {
        match self.run_loop() {
            Some(run_loop) => run_loop.perform(task),
            None => false,
        }
    }

    /// Prefix of the names given to spawned threads.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for BackgroundWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundWorker")
            .field("label", &self.label)
            .field("run_loop", &*self.current.lock())
            .finish()
    }
}
