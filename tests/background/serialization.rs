//! Background writes never overlap and run in submission order.

use crate::common::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::Duration;
use undertow::{Configuration, SerialQueue, TransactionDecision};
use undertow_storage::Record;

#[derive(Default)]
struct Overlap {
    active: AtomicUsize,
    max_seen: AtomicUsize,
}

impl Overlap {
    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[test]
fn back_to_back_writes_run_in_submission_order() {
    let bg = background();
    let queue = SerialQueue::new("ordering-writer");
    let configuration = Configuration::new(unique_path("ordering"));
    let overlap = Arc::new(Overlap::default());
    let completed = Arc::new(Mutex::new(Vec::new()));

    for tag in 0..50u64 {
        let overlap = Arc::clone(&overlap);
        let completed = Arc::clone(&completed);
        bg.write_in_background(Some(&configuration), Some(&queue), move |result| {
            overlap.enter();
            let handle = result.unwrap();
            handle.add(Record::new(tag.to_string(), "tag")).unwrap();
            thread::sleep(Duration::from_micros(200));
            completed.lock().push(tag);
            overlap.exit();
        });
    }
    queue.drain();

    assert_eq!(overlap.max_seen.load(Ordering::SeqCst), 1);
    assert_eq!(*completed.lock(), (0..50).collect::<Vec<_>>());
    assert_eq!(records(bg.engine(), &configuration).len(), 50);
}

#[test]
fn writes_from_many_threads_never_overlap() {
    let bg = background();
    let queue = Arc::new(SerialQueue::new("contended-writer"));
    let configuration = Configuration::new(unique_path("contended"));
    let overlap = Arc::new(Overlap::default());
    let barrier = Arc::new(Barrier::new(4));

    let submitters: Vec<_> = (0..4)
        .map(|t| {
            let bg = bg.clone();
            let queue = Arc::clone(&queue);
            let configuration = configuration.clone();
            let overlap = Arc::clone(&overlap);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut submitted = Vec::new();
                for i in 0..25 {
                    let overlap = Arc::clone(&overlap);
                    let tag = format!("{}-{}", t, i);
                    submitted.push(tag.clone());
                    if i % 2 == 0 {
                        bg.write_in_background(Some(&configuration), Some(&*queue), move |result| {
                            overlap.enter();
                            result.unwrap().add(Record::new(tag, "w")).unwrap();
                            overlap.exit();
                        });
                    } else {
                        bg.commit_in_background(Some(&configuration), Some(&*queue), move |result| {
                            overlap.enter();
                            result.unwrap().add(Record::new(tag, "c")).unwrap();
                            overlap.exit();
                            TransactionDecision::Commit
                        });
                    }
                }
                submitted
            })
        })
        .collect();

    let mut expected: Vec<String> = submitters
        .into_iter()
        .flat_map(|s| s.join().unwrap())
        .collect();
    queue.drain();

    assert_eq!(overlap.max_seen.load(Ordering::SeqCst), 1);
    let mut stored: Vec<String> = records(bg.engine(), &configuration)
        .into_iter()
        .map(|r| r.id)
        .collect();
    expected.sort();
    stored.sort();
    assert_eq!(stored, expected);
}

#[test]
fn per_thread_order_is_preserved_on_shared_queue() {
    let bg = background();
    let configuration = Configuration::new(unique_path("shared-queue"));
    let completed = Arc::new(Mutex::new(Vec::new()));
    let (tx, rx) = mpsc::channel();

    for tag in 0..20u32 {
        let completed = Arc::clone(&completed);
        let tx = tx.clone();
        bg.write_in_background(Some(&configuration), None, move |result| {
            result.unwrap();
            completed.lock().push(tag);
            if tag == 19 {
                tx.send(thread::current().name().map(str::to_string)).unwrap();
            }
        });
    }

    let name = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(name.as_deref(), Some(undertow::SHARED_QUEUE_LABEL));
    assert_eq!(*completed.lock(), (0..20).collect::<Vec<_>>());
}

#[test]
fn sequence_numbers_commit_in_order() {
    let bg = background();
    let queue = SerialQueue::new("sequence-writer");
    let configuration = Configuration::new(unique_path("sequence"));
    let next = Arc::new(AtomicUsize::new(0));

    for _ in 0..30 {
        let next = Arc::clone(&next);
        bg.commit_in_background(Some(&configuration), Some(&queue), move |result| {
            let handle = result.unwrap();
            // Each transaction sees every earlier commit
            let seen = handle.len();
            let n = next.fetch_add(1, Ordering::SeqCst);
            assert_eq!(seen, n);
            handle.add(Record::new(format!("{:03}", n), "seq")).unwrap();
            TransactionDecision::Commit
        });
    }
    queue.drain();

    let ids: Vec<String> = records(bg.engine(), &configuration)
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, (0..30).map(|n| format!("{:03}", n)).collect::<Vec<_>>());
}
