//! Standing background handles
//!
//! A `BackgroundHandle` pairs one dedicated worker thread with one storage
//! handle opened on that thread. The storage handle stays alive in the
//! worker's run-loop local storage, so change subscriptions registered from
//! the setup callback keep firing after the callback returns. Dropping the
//! `BackgroundHandle` stops the worker; the storage handle is then dropped
//! on its own thread.
//!
//! Lifecycle: `Uninitialized → Opening → Ready | Failed`. `reopen` goes back
//! to `Opening` on a fresh thread and cancels the previous run.
//!
//! Synchronized read-only configurations are opened through the engine's
//! asynchronous open on a shared completion queue instead of the worker.
//! The setup callback still receives the handle, but no standing handle is
//! hosted afterwards: the wrapper has no identity and
//! [`BackgroundHandle::perform`] has nothing to run on.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use undertow_concurrency::{BackgroundWorker, RunLoop, SerialQueue};
use undertow_core::{BackgroundError, Configuration, Result, StorageEngine, StorageHandle};

/// Label for standing worker threads
pub const WORKER_LABEL: &str = "undertow-background";

/// Label for the queue that completes asynchronous opens
pub const ASYNC_OPEN_QUEUE_LABEL: &str = "undertow-async-open";

static ASYNC_OPEN_QUEUE: Lazy<SerialQueue> = Lazy::new(|| SerialQueue::new(ASYNC_OPEN_QUEUE_LABEL));

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

type Identity<E> = <<E as StorageEngine>::Handle as StorageHandle>::Identity;

/// Setup progress of a [`BackgroundHandle`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupState {
    /// Constructed, worker not started
    Uninitialized,
    /// Worker started, handle being opened
    Opening,
    /// Handle opened and handed to the setup callback
    Ready,
    /// Opening failed; no handle is held
    Failed(BackgroundError),
}

struct Setup<I> {
    generation: u64,
    state: SetupState,
    identity: Option<I>,
}

struct Shared<I> {
    id: u64,
    configuration: Option<Configuration>,
    setup: Mutex<Setup<I>>,
}

impl<I: Clone> Shared<I> {
    /// Apply `f` only if no newer run has started since `generation`
    fn update(&self, generation: u64, f: impl FnOnce(&mut Setup<I>)) {
        let mut setup = self.setup.lock();
        if setup.generation == generation {
            f(&mut setup);
        }
    }

    fn ready(&self, generation: u64, identity: I) {
        self.update(generation, |setup| {
            setup.state = SetupState::Ready;
            setup.identity = Some(identity);
        })
    }

    fn fail(&self, generation: u64, error: BackgroundError) {
        self.update(generation, |setup| {
            setup.state = SetupState::Failed(error);
            setup.identity = None;
        })
    }
}

/// A long-lived storage handle hosted on its own worker thread
pub struct BackgroundHandle<E: StorageEngine> {
    engine: E,
    shared: Arc<Shared<Identity<E>>>,
    worker: BackgroundWorker,
    /// Serializes `start` so generations and worker runs are bumped together
    starting: Mutex<()>,
}

impl<E: StorageEngine> BackgroundHandle<E> {
    /// Create an unstarted handle for `configuration`.
    ///
    /// `Err` records a resolution failure that will be reported on start.
    pub(crate) fn new(engine: E, configuration: Result<Configuration>) -> Self {
        let (configuration, state) = match configuration {
            Ok(configuration) => (Some(configuration), SetupState::Uninitialized),
            Err(e) => (None, SetupState::Failed(e)),
        };
        Self {
            engine,
            shared: Arc::new(Shared {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                configuration,
                setup: Mutex::new(Setup {
                    generation: 0,
                    state,
                    identity: None,
                }),
            }),
            worker: BackgroundWorker::new(WORKER_LABEL),
            starting: Mutex::new(()),
        }
    }

    /// Start (or restart) opening the handle.
    ///
    /// `on_setup` runs exactly once, off the calling thread.
    pub(crate) fn start<F>(&self, on_setup: F)
    where
        F: FnOnce(Result<&E::Handle>) + Send + 'static,
    {
        let _starting = self.starting.lock();
        let generation = {
            let mut setup = self.shared.setup.lock();
            setup.generation += 1;
            setup.identity = None;
            if self.shared.configuration.is_some() {
                setup.state = SetupState::Opening;
            }
            setup.generation
        };

        let shared = Arc::clone(&self.shared);
        let Some(configuration) = self.shared.configuration.clone() else {
            self.worker.start(move || {
                warn!(background = shared.id, "no configuration to open");
                on_setup(Err(BackgroundError::NoBackgroundConfiguration));
            });
            return;
        };

        if configuration.is_synced_read_only() {
            self.worker.stop();
            debug!(background = shared.id, path = %configuration.path.display(), "opening asynchronously");
            self.engine.async_open(
                configuration,
                &*ASYNC_OPEN_QUEUE,
                Box::new(move |result: std::result::Result<E::Handle, E::Error>| match result {
                    Ok(handle) => {
                        // Not hosted, so the wrapper keeps no identity
                        shared.update(generation, |setup| setup.state = SetupState::Ready);
                        on_setup(Ok(&handle));
                    }
                    Err(e) => {
                        let error = BackgroundError::generic(e);
                        shared.fail(generation, error.clone());
                        on_setup(Err(error));
                    }
                }),
            );
            return;
        }

        let engine = self.engine.clone();
        self.worker.start(move || match engine.open(&configuration) {
            Ok(handle) => {
                shared.ready(generation, handle.identity());
                info!(background = shared.id, path = %configuration.path.display(), "background handle ready");
                on_setup(Ok(&handle));
                RunLoop::insert_local(shared.id, handle);
            }
            Err(e) => {
                warn!(background = shared.id, path = %configuration.path.display(), error = %e, "background open failed");
                let error = BackgroundError::generic(e);
                shared.fail(generation, error.clone());
                on_setup(Err(error));
            }
        });
    }

    /// Stop the current run and open the handle again on a fresh thread.
    ///
    /// The previous worker is cancelled and drops its handle on its own thread.
    pub fn reopen<F>(&self, on_setup: F)
    where
        F: FnOnce(Result<&E::Handle>) + Send + 'static,
    {
        self.start(on_setup);
    }

    /// Current setup state
    pub fn state(&self) -> SetupState {
        self.shared.setup.lock().state.clone()
    }

    /// Whether the handle opened successfully
    pub fn is_ready(&self) -> bool {
        self.shared.setup.lock().state == SetupState::Ready
    }

    /// Resolved configuration, if resolution succeeded
    pub fn configuration(&self) -> Option<&Configuration> {
        self.shared.configuration.as_ref()
    }

    /// Identity of the hosted storage handle once ready
    pub fn identity(&self) -> Option<Identity<E>> {
        self.shared.setup.lock().identity.clone()
    }

    /// Run loop of the current worker thread
    pub fn run_loop(&self) -> Option<RunLoop> {
        self.worker.run_loop()
    }

    /// Run `f` with the hosted handle on the worker thread.
    ///
    /// Returns `false` if the worker is not running. `f` is skipped, with a
    /// warning, if the worker holds no handle when it gets to run.
    pub fn perform<F>(&self, f: F) -> bool
    where
        F: FnOnce(&E::Handle) + Send + 'static,
    {
        let id = self.shared.id;
        self.worker.perform(move || {
            if RunLoop::with_local::<E::Handle, _>(id, f).is_none() {
                warn!(background = id, "no open handle on worker, skipping task");
            }
        })
    }
}

impl<E: StorageEngine> PartialEq for BackgroundHandle<E> {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.shared, &other.shared) {
            return true;
        }
        match (self.identity(), other.identity()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl<E: StorageEngine> std::fmt::Debug for BackgroundHandle<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let setup = self.shared.setup.lock();
        f.debug_struct("BackgroundHandle")
            .field("id", &self.shared.id)
            .field("configuration", &self.shared.configuration)
            .field("state", &setup.state)
            .field("identity", &setup.identity)
            .field("worker", &self.worker)
            .finish()
    }
}
