//! Per-thread event loop.
//!
//! A `RunLoop` is a task queue bound to one thread. The thread blocks in
//! [`RunLoop::run`] waiting for work with no timeout, runs whatever is
//! performed on it, and returns once the loop is cancelled. Thread-affine
//! collaborators (a storage handle, a notification subscription) capture
//! [`RunLoop::current`] on their owning thread and later post work back to
//! it with [`RunLoop::perform`].
//!
//! Values that must live exactly as long as the loop and be dropped on its
//! thread are kept in run-loop local storage ([`RunLoop::insert_local`],
//! [`RunLoop::retain`]). That storage is emptied on the loop's own thread
//! right before it reports itself exited.

use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, trace};
use undertow_core::Task;

thread_local! {
    /// Run loop driving the current thread, if any
    static CURRENT: RefCell<Option<RunLoop>> = RefCell::new(None);

    /// Keyed values owned by the current run loop
    static LOCALS: RefCell<HashMap<u64, Box<dyn Any>>> = RefCell::new(HashMap::new());

    /// Anonymous values kept alive for the current run loop's lifetime
    static RETAINED: RefCell<Vec<Box<dyn Any>>> = RefCell::new(Vec::new());
}

struct LoopState {
    tasks: VecDeque<Task>,
    cancelled: bool,
    exited: bool,
}

struct LoopInner {
    name: String,
    state: Mutex<LoopState>,
    wake: Condvar,
    exit_cond: Condvar,
}

/// Handle to a thread's event loop. Cheap to clone, safe to send.
#[derive(Clone)]
pub struct RunLoop {
    inner: Arc<LoopInner>,
}

impl RunLoop {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(LoopInner {
                name: name.into(),
                state: Mutex::new(LoopState {
                    tasks: VecDeque::new(),
                    cancelled: false,
                    exited: false,
                }),
                wake: Condvar::new(),
                exit_cond: Condvar::new(),
            }),
        }
    }

    /// The run loop driving the calling thread.
    ///
    /// `None` on threads that are not inside [`RunLoop::run`].
    pub fn current() -> Option<RunLoop> {
        CURRENT.with(|current| current.borrow().clone())
    }

    /// Name of the thread hosting this loop.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether the calling thread is the one driving this loop.
    pub fn is_current(&self) -> bool {
        RunLoop::current().map_or(false, |current| current == *self)
    }

    /// Post `task` to run on this loop's thread.
    ///
    /// Returns `false`, dropping the task, if the loop has been cancelled.
    pub fn perform(&self, task: impl FnOnce() + Send + 'static) -> bool {
        {
            let mut state = self.inner.state.lock();
            if state.cancelled {
                return false;
            }
            state.tasks.push_back(Box::new(task));
        }
        self.inner.wake.notify_one();
        true
    }

    /// Whether the loop has been asked to stop.
    pub fn is_cancelled(&self) -> bool {
        self.inner.state.lock().cancelled
    }

    /// Whether the loop has returned and released its local storage.
    pub fn has_exited(&self) -> bool {
        self.inner.state.lock().exited
    }

    /// Block until the loop has exited or `timeout` elapses.
    ///
    /// Returns whether the loop exited.
    pub fn wait_until_exited(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while !state.exited {
            if self.inner.exit_cond.wait_until(&mut state, deadline).timed_out() {
                return state.exited;
            }
        }
        true
    }

    /// Flag the loop cancelled and wake it. In-flight work is not interrupted.
    pub(crate) fn cancel(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.cancelled {
                return;
            }
            state.cancelled = true;
        }
        self.inner.wake.notify_all();
        debug!(run_loop = %self.inner.name, "run loop cancelled");
    }

    /// Drive this loop on the calling thread until it is cancelled.
    ///
    /// `initial` runs first, exactly once, even if the loop is cancelled
    /// before the thread gets to it.
    pub(crate) fn run(&self, initial: Task) {
        CURRENT.with(|current| *current.borrow_mut() = Some(self.clone()));
        trace!(run_loop = %self.inner.name, "run loop started");

        run_guarded(&self.inner.name, initial);

        loop {
            let task = {
                let mut state = self.inner.state.lock();
                loop {
                    if state.cancelled {
                        break None;
                    }
                    if let Some(task) = state.tasks.pop_front() {
                        break Some(task);
                    }
                    self.inner.wake.wait(&mut state);
                }
            };

            match task {
                Some(task) => run_guarded(&self.inner.name, task),
                None => break,
            }
        }

        self.finish();
    }

    fn finish(&self) {
        // Drop everything owned by the loop here, on its own thread, and
        // outside the thread-local borrows in case a destructor touches them.
        let pending = std::mem::take(&mut self.inner.state.lock().tasks);
        drop(pending);
        let locals = LOCALS.with(|locals| std::mem::take(&mut *locals.borrow_mut()));
        drop(locals);
        let retained = RETAINED.with(|retained| std::mem::take(&mut *retained.borrow_mut()));
        drop(retained);
        CURRENT.with(|current| current.borrow_mut().take());

        self.inner.state.lock().exited = true;
        self.inner.exit_cond.notify_all();
        debug!(run_loop = %self.inner.name, "run loop exited");
    }

    /// Store `value` under `key` in the current run loop's local storage.
    ///
    /// Returns `false`, dropping `value`, when the calling thread has no run loop.
    pub fn insert_local<T: 'static>(key: u64, value: T) -> bool {
        if RunLoop::current().is_none() {
            return false;
        }
        let previous = LOCALS.with(|locals| locals.borrow_mut().insert(key, Box::new(value)));
        drop(previous);
        true
    }

    /// Borrow the value stored under `key` in the current run loop's local storage.
    ///
    /// Returns `None` if nothing of type `T` is stored under `key`. `f` must
    /// not insert or remove run-loop locals.
    pub fn with_local<T: 'static, R>(key: u64, f: impl FnOnce(&T) -> R) -> Option<R> {
        LOCALS.with(|locals| {
            let locals = locals.borrow();
            locals.get(&key).and_then(|value| (**value).downcast_ref::<T>()).map(f)
        })
    }

    /// Remove and drop the value stored under `key`. Returns whether one existed.
    pub fn remove_local(key: u64) -> bool {
        let removed = LOCALS.with(|locals| locals.borrow_mut().remove(&key));
        removed.is_some()
    }

    /// Keep `value` alive until the current run loop exits.
    ///
    /// Returns `false`, dropping `value`, when the calling thread has no run loop.
    pub fn retain<T: 'static>(value: T) -> bool {
        if RunLoop::current().is_none() {
            return false;
        }
        RETAINED.with(|retained| retained.borrow_mut().push(Box::new(value)));
        true
    }
}

impl PartialEq for RunLoop {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for RunLoop {}

impl std::fmt::Debug for RunLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("RunLoop")
            .field("name", &self.inner.name)
            .field("pending", &state.tasks.len())
            .field("cancelled", &state.cancelled)
            .field("exited", &state.exited)
            .finish()
    }
}

fn run_guarded(name: &str, task: Task) {
    if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)) {
        error!(
            run_loop = %name,
            "run loop task panicked: {:?}",
            e.downcast_ref::<&str>().copied().unwrap_or("(non-string panic)")
        );
    }
}
