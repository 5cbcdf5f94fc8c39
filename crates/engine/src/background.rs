//! Background entry points
//!
//! `Background` resolves a configuration on the calling thread, then hands
//! the work off: ad-hoc writes and commits go to a single-writer queue
//! (the process-wide [`SerialQueue::shared`] unless the caller supplies
//! one), standing handles get a dedicated worker thread. Results always
//! arrive through the callback, on the executing thread.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::trace;
use undertow_concurrency::SerialQueue;
use undertow_core::{
    resolve, resolve_with_path, Configuration, ConfigurationRegistry, ResolutionPolicy, Result,
    StorageEngine, StorageHandle, TransactionDecision,
};

use crate::executor::{execute_commit, execute_write};
use crate::handle::BackgroundHandle;

/// Entry point for background writes and standing background handles
pub struct Background<E: StorageEngine> {
    engine: E,
    registry: Arc<ConfigurationRegistry>,
    policy: ResolutionPolicy,
}

impl<E: StorageEngine> Background<E> {
    /// Use `engine` with the process-wide default configuration and
    /// lenient resolution
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            registry: ConfigurationRegistry::global(),
            policy: ResolutionPolicy::default(),
        }
    }

    /// Read the default configuration from `registry` instead of the global one
    pub fn with_registry(mut self, registry: Arc<ConfigurationRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Choose what happens when neither an explicit nor a default configuration is set
    pub fn with_policy(mut self, policy: ResolutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The storage engine
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The registry the default configuration is read from
    pub fn registry(&self) -> &Arc<ConfigurationRegistry> {
        &self.registry
    }

    /// The resolution policy
    pub fn policy(&self) -> ResolutionPolicy {
        self.policy
    }

    fn resolve(&self, configuration: Option<&Configuration>) -> Result<Configuration> {
        resolve(configuration, self.registry.get().as_ref(), self.policy)
    }

    fn resolve_at(&self, path: PathBuf) -> Result<Configuration> {
        Ok(resolve_with_path(path, self.registry.get().as_ref()))
    }

    /// Run `on_result` inside a write transaction on the single-writer queue.
    ///
    /// The transaction commits when `on_result` returns. `configuration`
    /// falls back to the registry default and then per the resolution
    /// policy; it is always opened writable. `on_result` runs exactly once
    /// on the queue's thread.
    pub fn write_in_background<F>(
        &self,
        configuration: Option<&Configuration>,
        queue: Option<&SerialQueue>,
        on_result: F,
    ) where
        F: FnOnce(Result<&E::Handle>) + Send + 'static,
    {
        self.submit_write(self.resolve(configuration), queue, on_result);
    }

    /// Like [`Background::write_in_background`], using `handle`'s configuration
    pub fn write_in_background_from<F>(
        &self,
        handle: &E::Handle,
        queue: Option<&SerialQueue>,
        on_result: F,
    ) where
        F: FnOnce(Result<&E::Handle>) + Send + 'static,
    {
        self.submit_write(Ok(handle.configuration().clone()), queue, on_result);
    }

    /// Like [`Background::write_in_background`], with the store moved to `path`
    ///
    /// Every other setting comes from the default configuration, or the
    /// system default when none is set.
    pub fn write_in_background_at<F>(
        &self,
        path: impl Into<PathBuf>,
        queue: Option<&SerialQueue>,
        on_result: F,
    ) where
        F: FnOnce(Result<&E::Handle>) + Send + 'static,
    {
        self.submit_write(self.resolve_at(path.into()), queue, on_result);
    }

    /// Begin a write transaction on the single-writer queue and let
    /// `decide` commit or cancel it.
    ///
    /// Resolution follows [`Background::write_in_background`]. `decide` runs
    /// exactly once; its decision is ignored when it is handed an error.
    pub fn commit_in_background<F>(
        &self,
        configuration: Option<&Configuration>,
        queue: Option<&SerialQueue>,
        decide: F,
    ) where
        F: FnOnce(Result<&E::Handle>) -> TransactionDecision + Send + 'static,
    {
        self.submit_commit(self.resolve(configuration), queue, decide);
    }

    /// Like [`Background::commit_in_background`], using `handle`'s configuration
    pub fn commit_in_background_from<F>(
        &self,
        handle: &E::Handle,
        queue: Option<&SerialQueue>,
        decide: F,
    ) where
        F: FnOnce(Result<&E::Handle>) -> TransactionDecision + Send + 'static,
    {
        self.submit_commit(Ok(handle.configuration().clone()), queue, decide);
    }

    /// Like [`Background::commit_in_background`], with the store moved to `path`
    pub fn commit_in_background_at<F>(
        &self,
        path: impl Into<PathBuf>,
        queue: Option<&SerialQueue>,
        decide: F,
    ) where
        F: FnOnce(Result<&E::Handle>) -> TransactionDecision + Send + 'static,
    {
        self.submit_commit(self.resolve_at(path.into()), queue, decide);
    }

    /// Open a standing handle on its own worker thread.
    ///
    /// `on_setup` runs exactly once on the worker (or, for synchronized
    /// read-only stores, on the async-open queue). Subscriptions registered
    /// from it keep firing for as long as the returned handle is alive.
    pub fn open_background_handle<F>(
        &self,
        configuration: Option<&Configuration>,
        on_setup: F,
    ) -> BackgroundHandle<E>
    where
        F: FnOnce(Result<&E::Handle>) + Send + 'static,
    {
        let handle = BackgroundHandle::new(self.engine.clone(), self.resolve(configuration));
        handle.start(on_setup);
        handle
    }

    /// Like [`Background::open_background_handle`], with the store moved to `path`
    pub fn open_background_handle_at<F>(
        &self,
        path: impl Into<PathBuf>,
        on_setup: F,
    ) -> BackgroundHandle<E>
    where
        F: FnOnce(Result<&E::Handle>) + Send + 'static,
    {
        let handle = BackgroundHandle::new(self.engine.clone(), self.resolve_at(path.into()));
        handle.start(on_setup);
        handle
    }

    fn submit_write<F>(&self, resolved: Result<Configuration>, queue: Option<&SerialQueue>, on_result: F)
    where
        F: FnOnce(Result<&E::Handle>) + Send + 'static,
    {
        let queue = queue.unwrap_or_else(|| SerialQueue::shared());
        trace!(queue = %queue.label(), "submitting background write");
        let engine = self.engine.clone();
        queue.enqueue(move || match resolved {
            Ok(configuration) => {
                execute_write(&engine, &configuration, on_result);
            }
            Err(e) => on_result(Err(e)),
        });
    }

    fn submit_commit<F>(&self, resolved: Result<Configuration>, queue: Option<&SerialQueue>, decide: F)
    where
        F: FnOnce(Result<&E::Handle>) -> TransactionDecision + Send + 'static,
    {
        let queue = queue.unwrap_or_else(|| SerialQueue::shared());
        trace!(queue = %queue.label(), "submitting background commit");
        let engine = self.engine.clone();
        queue.enqueue(move || match resolved {
            Ok(configuration) => {
                execute_commit(&engine, &configuration, decide);
            }
            Err(e) => {
                decide(Err(e));
            }
        });
    }
}

impl<E: StorageEngine> Clone for Background<E> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            registry: Arc::clone(&self.registry),
            policy: self.policy,
        }
    }
}

impl<E: StorageEngine + std::fmt::Debug> std::fmt::Debug for Background<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Background")
            .field("engine", &self.engine)
            .field("default", &self.registry.get())
            .field("policy", &self.policy)
            .finish()
    }
}
