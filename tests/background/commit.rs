//! Cancellable commits.

use crate::common::*;
use std::sync::mpsc;
use undertow::{Configuration, SerialQueue, StorageHandle, TransactionDecision};
use undertow_storage::testing::Fault;
use undertow_storage::Record;

#[test]
fn cancel_leaves_no_visible_change() {
    let bg = background();
    let queue = SerialQueue::new("commit-writer");
    let configuration = Configuration::new(unique_path("cancel"));

    bg.commit_in_background(Some(&configuration), Some(&queue), |result| {
        let handle = result.unwrap();
        handle.add(Record::new("discarded", "never committed")).unwrap();
        TransactionDecision::from_should_cancel(true)
    });
    queue.drain();

    assert!(records(bg.engine(), &configuration).is_empty());
    assert_eq!(bg.engine().committed_version(&configuration.path), Some(0));
}

#[test]
fn commit_is_visible_to_a_fresh_handle() {
    let bg = background();
    let queue = SerialQueue::new("commit-writer");
    let configuration = Configuration::new(unique_path("commit"));

    bg.commit_in_background(Some(&configuration), Some(&queue), |result| {
        let handle = result.unwrap();
        handle.add(Record::new("kept", "committed")).unwrap();
        TransactionDecision::from_should_cancel(false)
    });
    queue.drain();

    assert_eq!(
        records(bg.engine(), &configuration),
        vec![Record::new("kept", "committed")]
    );
}

#[test]
fn cancelled_commit_does_not_block_the_next_writer() {
    let bg = background();
    let queue = SerialQueue::new("commit-writer");
    let configuration = Configuration::new(unique_path("after-cancel"));
    let (tx, rx) = mpsc::channel();

    bg.commit_in_background(Some(&configuration), Some(&queue), |_| TransactionDecision::Cancel);
    bg.write_in_background(Some(&configuration), Some(&queue), move |result| {
        let handle = result.unwrap();
        handle.add(Record::new("next", "write")).unwrap();
        tx.send(handle.is_in_write_transaction()).unwrap();
    });

    assert!(rx.recv_timeout(WAIT).unwrap());
    queue.drain();
    assert_eq!(records(bg.engine(), &configuration).len(), 1);
}

#[test]
fn open_failure_reaches_decision_once() {
    let bg = background();
    let queue = SerialQueue::new("commit-writer");
    let path = unique_path("open-failure");
    bg.engine().inject_fault(&path, Fault::Open);
    let (tx, rx) = mpsc::channel();

    bg.commit_in_background_at(path, Some(&queue), move |result| {
        tx.send(result.is_err()).unwrap();
        TransactionDecision::Commit
    });
    queue.drain();

    assert!(rx.recv_timeout(WAIT).unwrap());
    assert!(rx.try_recv().is_err());
}

#[test]
fn commit_failure_after_decision_rolls_back() {
    let bg = background();
    let queue = SerialQueue::new("commit-writer");
    let configuration = Configuration::new(unique_path("commit-failure"));
    records(bg.engine(), &configuration);
    bg.engine().inject_fault(&configuration.path, Fault::Commit);
    let (tx, rx) = mpsc::channel();

    bg.commit_in_background(Some(&configuration), Some(&queue), move |result| {
        result.unwrap().add(Record::new("lost", "x")).unwrap();
        tx.send(()).unwrap();
        TransactionDecision::Commit
    });
    queue.drain();

    rx.recv_timeout(WAIT).unwrap();
    assert!(rx.try_recv().is_err());
    bg.engine().clear_faults(&configuration.path);
    assert!(records(bg.engine(), &configuration).is_empty());
}
