//! Single-writer queue.
//!
//! A FIFO task queue drained by exactly one dedicated worker thread. Every
//! background write in the process goes through such a queue (by default
//! the one returned by [`SerialQueue::shared`]) so that at most one write
//! transaction is open at any time and writes commit in submission order.
//!
//! Tasks are never skipped and never run on the submitting thread. A task
//! dispatched after [`SerialQueue::shutdown`] has joined the worker spawns a
//! fresh worker under the same label, so at most one worker is ever live.

use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};
use tracing::{debug, error};
use undertow_core::{CallbackQueue, Task};

/// Name of the worker thread behind [`SerialQueue::shared`].
pub const SHARED_QUEUE_LABEL: &str = "undertow-writer";

static SHARED_QUEUE: Lazy<SerialQueue> = Lazy::new(|| SerialQueue::new(SHARED_QUEUE_LABEL));

/// Queue metrics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Number of tasks waiting in the queue.
    pub queue_depth: usize,
    /// Number of tasks currently executing (0 or 1).
    pub active_tasks: usize,
    /// Total number of tasks completed since queue creation.
    pub tasks_completed: u64,
}

struct QueueState {
    tasks: VecDeque<Task>,
    /// Set by the worker, under the lock, right before it returns
    exited: bool,
    /// Thread of the live (or last) worker
    worker_id: Option<ThreadId>,
}

struct QueueInner {
    label: String,
    state: Mutex<QueueState>,
    work_ready: Condvar,
    drain_cond: Condvar,
    shutdown: AtomicBool,
    queue_depth: AtomicUsize,
    active_tasks: AtomicUsize,
    tasks_completed: AtomicU64,
}

/// A serial execution context backed by one named thread.
pub struct SerialQueue {
    inner: Arc<QueueInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SerialQueue {
    /// Create a queue whose worker thread is named `label`.
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        let inner = Arc::new(QueueInner {
            label: label.clone(),
            state: Mutex::new(QueueState {
                tasks: VecDeque::new(),
                exited: false,
                worker_id: None,
            }),
            work_ready: Condvar::new(),
            drain_cond: Condvar::new(),
            shutdown: AtomicBool::new(false),
            queue_depth: AtomicUsize::new(0),
            active_tasks: AtomicUsize::new(0),
            tasks_completed: AtomicU64::new(0),
        });

        let handle = {
            let mut state = inner.state.lock();
            spawn_worker(&inner, &mut state)
        };

        Self {
            inner,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// The queue shared by every background write in the process.
    pub fn shared() -> &'static SerialQueue {
        &SHARED_QUEUE
    }

    /// Name of the worker thread.
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Whether the calling thread is this queue's worker thread.
    pub fn is_current(&self) -> bool {
        is_worker(&self.inner.state.lock())
    }

    /// Submit a task. Tasks run one at a time in submission order.
    pub fn enqueue(&self, task: impl FnOnce() + Send + 'static) {
        self.submit(Box::new(task));
    }

    fn submit(&self, task: Task) {
        {
            let mut state = self.inner.state.lock();
            if state.exited {
                self.respawn(&mut state);
            }
            state.tasks.push_back(task);
            self.inner.queue_depth.fetch_add(1, Ordering::Release);
        }
        self.inner.work_ready.notify_one();
    }

    /// Replace a worker that exited after shutdown. Caller holds the state lock.
    fn respawn(&self, state: &mut QueueState) {
        let mut worker = self.worker.lock();
        // The old worker set `exited` on its way out and holds no locks.
        if let Some(old) = worker.take() {
            let _ = old.join();
        }
        self.inner.shutdown.store(false, Ordering::Release);
        state.exited = false;
        *worker = Some(spawn_worker(&self.inner, state));
        debug!(queue = %self.inner.label, "serial queue worker respawned");
    }

    /// Block until all queued and in-flight tasks have completed.
    ///
    /// Must not be called from a task running on this queue.
    pub fn drain(&self) {
        let mut state = self.inner.state.lock();
        while self.inner.queue_depth.load(Ordering::Acquire) > 0
            || self.inner.active_tasks.load(Ordering::Acquire) > 0
        {
            self.inner.drain_cond.wait(&mut state);
        }
    }

    /// Shut the queue down: the worker finishes every queued task, then exits.
    ///
    /// Joins the worker unless called from the worker itself.
    pub fn shutdown(&self) {
        // Flag, notify and take the join handle under the state lock so a
        // concurrent respawn cannot swap in a worker we would then join.
        let handle = {
            let state = self.inner.state.lock();
            self.inner.shutdown.store(true, Ordering::Release);
            self.inner.work_ready.notify_all();
            if is_worker(&state) {
                return;
            }
            self.worker.lock().take()
        };

        if let Some(handle) = handle {
            let _ = handle.join();
            debug!(queue = %self.inner.label, "serial queue shut down");
        }
    }

    /// Return a snapshot of queue metrics.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            queue_depth: self.inner.queue_depth.load(Ordering::Relaxed),
            active_tasks: self.inner.active_tasks.load(Ordering::Relaxed),
            tasks_completed: self.inner.tasks_completed.load(Ordering::Relaxed),
        }
    }
}

impl CallbackQueue for SerialQueue {
    fn dispatch(&self, task: Task) {
        self.submit(task);
    }
}

impl std::fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialQueue")
            .field("label", &self.inner.label)
            .field("stats", &self.stats())
            .finish()
    }
}

/// RAII guard that decrements `active_tasks` and notifies drain waiters on drop.
///
/// Keeps the bookkeeping right when a task panics; without it `drain()`
/// would wait forever on an inflated `active_tasks`.
struct ActiveTaskGuard<'a> {
    inner: &'a QueueInner,
}

impl<'a> Drop for ActiveTaskGuard<'a> {
    fn drop(&mut self) {
        let prev_active = self.inner.active_tasks.fetch_sub(1, Ordering::Release);
        self.inner.tasks_completed.fetch_add(1, Ordering::Relaxed);

        // drain() holds the state lock while checking and waiting, so taking
        // it here rules out a lost wakeup.
        if prev_active == 1 && self.inner.queue_depth.load(Ordering::Acquire) == 0 {
            let _state = self.inner.state.lock();
            self.inner.drain_cond.notify_all();
        }
    }
}

/// Runs a task already counted in `active_tasks`.
fn run_task(inner: &QueueInner, task: Task) {
    let _guard = ActiveTaskGuard { inner };

    // A panicking task must not take the writer thread down with it.
    if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)) {
        error!(
            queue = %inner.label,
            "serial queue task panicked: {:?}",
            e.downcast_ref::<&str>().copied().unwrap_or("(non-string panic)")
        );
    }
}

fn is_worker(state: &QueueState) -> bool {
    state.worker_id == Some(std::thread::current().id())
}

/// Spawn the queue's worker and record its thread. Caller holds the state lock.
///
/// # Panics
///
/// Panics if the operating system refuses to spawn the thread.
fn spawn_worker(inner: &Arc<QueueInner>, state: &mut QueueState) -> JoinHandle<()> {
    let worker_inner = Arc::clone(inner);
    let handle = std::thread::Builder::new()
        .name(inner.label.clone())
        .spawn(move || worker_loop(&worker_inner))
        .expect("failed to spawn serial queue worker thread");
    state.worker_id = Some(handle.thread().id());
    handle
}

fn worker_loop(inner: &QueueInner) {
    loop {
        let task = {
            let mut state = inner.state.lock();
            loop {
                if let Some(task) = state.tasks.pop_front() {
                    inner.queue_depth.fetch_sub(1, Ordering::Release);
                    inner.active_tasks.fetch_add(1, Ordering::Release);
                    break task;
                }
                if inner.shutdown.load(Ordering::Acquire) {
                    state.exited = true;
                    return;
                }
                inner.work_ready.wait(&mut state);
            }
        };

        run_task(inner, task);
    }
}
