//! Standing background handles and their notifications.

use crate::common::*;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use undertow::{Configuration, RunLoop, SerialQueue, SetupState, StorageHandle};
use undertow_storage::{Change, MemoryHandle, Record};

#[test]
fn subscription_outlives_setup_callback() {
    let bg = background();
    let queue = SerialQueue::new("standing-writer");
    let configuration = Configuration::new(unique_path("standing"));
    let (setup_tx, setup_rx) = mpsc::channel();
    let (change_tx, change_rx) = mpsc::channel();

    let standing = bg.open_background_handle(Some(&configuration), move |result| {
        let handle = result.unwrap();
        let token = handle
            .observe(move |change| {
                let _ = change_tx.send((thread::current().id(), change.clone()));
            })
            .unwrap();
        assert!(RunLoop::retain(token));
        setup_tx.send(thread::current().id()).unwrap();
    });

    let setup_thread = setup_rx.recv_timeout(WAIT).unwrap();
    assert_ne!(setup_thread, thread::current().id());
    assert_eq!(standing.state(), SetupState::Ready);

    let (thread_id, initial) = change_rx.recv_timeout(WAIT).unwrap();
    assert_eq!(thread_id, setup_thread);
    assert_eq!(initial, Change::Initial(Vec::new()));

    let written = Record::new("note-1", "written in the background");
    let to_write = written.clone();
    bg.write_in_background(Some(&configuration), Some(&queue), move |result| {
        result.unwrap().add(to_write).unwrap();
    });

    let (thread_id, update) = change_rx.recv_timeout(WAIT).unwrap();
    assert_eq!(thread_id, setup_thread);
    match update {
        Change::Update(change) => {
            assert_eq!(change.insertions, vec![written]);
            assert!(change.modifications.is_empty());
            assert!(change.deletions.is_empty());
        }
        other => panic!("expected an update, got {:?}", other),
    }
}

#[test]
fn hosted_handle_sees_background_writes() {
    let bg = background();
    let queue = SerialQueue::new("standing-writer");
    let configuration = Configuration::new(unique_path("hosted"));
    let (ready_tx, ready_rx) = mpsc::channel();

    let standing = bg.open_background_handle(Some(&configuration), move |result| {
        ready_tx.send(result.is_ok()).unwrap();
    });
    assert!(ready_rx.recv_timeout(WAIT).unwrap());

    bg.write_in_background(Some(&configuration), Some(&queue), |result| {
        result.unwrap().add(Record::new("1", "one")).unwrap();
    });
    queue.drain();

    let (tx, rx) = mpsc::channel();
    assert!(standing.perform(move |handle: &MemoryHandle| {
        tx.send(handle.objects()).unwrap();
    }));
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), vec![Record::new("1", "one")]);
}

#[test]
fn dropping_the_standing_handle_ends_notifications() {
    let bg = background();
    let configuration = Configuration::new(unique_path("dropped"));
    let (ready_tx, ready_rx) = mpsc::channel();

    let standing = bg.open_background_handle(Some(&configuration), move |result| {
        let token = result.unwrap().observe(|_| {}).unwrap();
        RunLoop::retain(token);
        ready_tx.send(()).unwrap();
    });
    ready_rx.recv_timeout(WAIT).unwrap();
    let run_loop = standing.run_loop().unwrap();
    assert_eq!(bg.engine().subscriber_count(&configuration.path), 1);

    drop(standing);

    assert!(run_loop.wait_until_exited(WAIT));
    assert_eq!(bg.engine().subscriber_count(&configuration.path), 0);
}

#[test]
fn open_at_path_uses_registry_default_as_base() {
    let bg = background();
    bg.registry()
        .set(Some(Configuration::new("base.store").with_schema_version(3)));
    let path = unique_path("standing-at");
    let (tx, rx) = mpsc::channel();

    let standing = bg.open_background_handle_at(path.clone(), move |result| {
        tx.send(result.map(|h| h.configuration().clone())).unwrap();
    });

    let opened = rx.recv_timeout(WAIT).unwrap().unwrap();
    assert_eq!(opened.path, path);
    assert_eq!(opened.schema_version, 3);
    assert_eq!(standing.configuration(), Some(&opened));
}

#[test]
fn lenient_default_opens_system_default() {
    let bg = background();
    let (tx, rx) = mpsc::channel();

    let _standing = bg.open_background_handle(None, move |result| {
        tx.send(result.map(|h| h.configuration().path.clone())).unwrap();
    });

    assert_eq!(
        rx.recv_timeout(WAIT).unwrap().unwrap(),
        PathBuf::from(undertow::DEFAULT_STORE_FILE_NAME)
    );
}
