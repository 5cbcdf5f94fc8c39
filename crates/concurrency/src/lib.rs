//! Concurrency layer for Undertow
//!
//! This crate provides the two execution contexts background work runs on:
//! - SerialQueue: a FIFO queue drained by one thread, so at most one write
//!   transaction is ever open (the single-writer queue)
//! - BackgroundWorker / RunLoop: a dedicated thread with an event loop that
//!   outlives the task that started it, so thread-affine handles keep
//!   receiving notifications

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod queue;
pub mod run_loop;
pub mod worker;

pub use queue::{QueueStats, SerialQueue, SHARED_QUEUE_LABEL};
pub use run_loop::RunLoop;
pub use worker::BackgroundWorker;
