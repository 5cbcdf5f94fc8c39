//! Integration tests for background writes and standing handles.

#[path = "../common/mod.rs"]
mod common;

mod commit;
mod refresh;
mod resolution;
mod serialization;
mod standing;
mod worker;
