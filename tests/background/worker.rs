//! Restarting a worker never leaves two loops running.

use crate::common::*;
use std::sync::mpsc;
use std::thread;
use undertow::{BackgroundWorker, Configuration};

#[test]
fn second_start_cancels_first_loop() {
    init_tracing();
    let worker = BackgroundWorker::new("restart");
    let (tx, rx) = mpsc::channel();

    let tx1 = tx.clone();
    let first = worker.start(move || tx1.send(thread::current().id()).unwrap());
    let first_thread = rx.recv_timeout(WAIT).unwrap();

    let second = worker.start(move || tx.send(thread::current().id()).unwrap());
    let second_thread = rx.recv_timeout(WAIT).unwrap();

    assert_ne!(first_thread, second_thread);
    assert!(first.is_cancelled());
    assert!(first.wait_until_exited(WAIT));
    assert!(!second.is_cancelled());
    assert!(worker.is_running());
    assert_eq!(worker.run_loop(), Some(second.clone()));

    worker.stop();
    assert!(!worker.is_running());
    assert!(second.wait_until_exited(WAIT));
}

#[test]
fn reopening_a_standing_handle_replaces_its_thread() {
    let bg = background();
    let configuration = Configuration::new(unique_path("reopen"));
    let (tx, rx) = mpsc::channel();

    let tx1 = tx.clone();
    let standing = bg.open_background_handle(Some(&configuration), move |result| {
        tx1.send(result.map(|_| thread::current().id())).unwrap();
    });
    let first_thread = rx.recv_timeout(WAIT).unwrap().unwrap();
    let first_loop = standing.run_loop().unwrap();

    standing.reopen(move |result| {
        tx.send(result.map(|_| thread::current().id())).unwrap();
    });
    let second_thread = rx.recv_timeout(WAIT).unwrap().unwrap();

    assert_ne!(first_thread, second_thread);
    assert!(first_loop.is_cancelled());
    assert!(first_loop.wait_until_exited(WAIT));

    let current = standing.run_loop().unwrap();
    assert_ne!(current, first_loop);
    assert!(!current.is_cancelled());
    assert_eq!(standing.identity().map(|id| id.thread), Some(second_thread));
}
