//! A failed refresh stops the write before any transaction opens.

use crate::common::*;
use std::sync::mpsc;
use undertow::{BackgroundError, Configuration, SerialQueue, TransactionDecision};
use undertow_storage::testing::Fault;
use undertow_storage::Record;

#[test]
fn write_reports_refresh_and_changes_nothing() {
    let bg = background();
    let queue = SerialQueue::new("refresh-writer");
    let configuration = Configuration::new(unique_path("refresh-write"));
    records(bg.engine(), &configuration);
    bg.engine().inject_fault(&configuration.path, Fault::Refresh);
    let (tx, rx) = mpsc::channel();

    bg.write_in_background(Some(&configuration), Some(&queue), move |result| {
        let outcome = result.map(|handle| handle.add(Record::new("1", "one")).is_ok());
        tx.send(outcome).unwrap();
    });
    queue.drain();

    assert_eq!(rx.recv_timeout(WAIT).unwrap(), Err(BackgroundError::Refresh));
    assert!(rx.try_recv().is_err());
    assert_eq!(bg.engine().committed_version(&configuration.path), Some(0));
}

#[test]
fn commit_reports_refresh_and_changes_nothing() {
    let bg = background();
    let queue = SerialQueue::new("refresh-writer");
    let configuration = Configuration::new(unique_path("refresh-commit"));
    records(bg.engine(), &configuration);
    bg.engine().inject_fault(&configuration.path, Fault::Refresh);
    let (tx, rx) = mpsc::channel();

    bg.commit_in_background(Some(&configuration), Some(&queue), move |result| {
        tx.send(result.err()).unwrap();
        TransactionDecision::Commit
    });
    queue.drain();

    assert_eq!(rx.recv_timeout(WAIT).unwrap(), Some(BackgroundError::Refresh));
    assert_eq!(bg.engine().committed_version(&configuration.path), Some(0));
}

#[test]
fn store_invalidated_mid_transaction_rejects_commit() {
    let bg = background();
    let queue = SerialQueue::new("refresh-writer");
    let configuration = Configuration::new(unique_path("invalidated"));
    let (tx, rx) = mpsc::channel();

    let engine = bg.engine().clone();
    let path = configuration.path.clone();
    bg.commit_in_background(Some(&configuration), Some(&queue), move |result| {
        let handle = result.unwrap();
        handle.add(Record::new("1", "one")).unwrap();
        engine.invalidate(&path);
        tx.send(()).unwrap();
        TransactionDecision::Commit
    });
    queue.drain();

    rx.recv_timeout(WAIT).unwrap();
    assert!(records(bg.engine(), &configuration).is_empty());
}
