//! Which configuration a background write opens.

use crate::common::*;
use std::path::PathBuf;
use std::sync::mpsc;
use undertow::{
    BackgroundError, Configuration, ResolutionPolicy, SerialQueue, StorageHandle,
    DEFAULT_STORE_FILE_NAME,
};

/// Path of the handle the write callback received, or the error
fn opened_path(
    run: impl FnOnce(&SerialQueue, mpsc::Sender<Result<PathBuf, BackgroundError>>),
) -> Result<PathBuf, BackgroundError> {
    let queue = SerialQueue::new("resolution-writer");
    let (tx, rx) = mpsc::channel();
    run(&queue, tx);
    let result = rx.recv_timeout(WAIT).expect("callback was not invoked");
    queue.drain();
    assert!(rx.try_recv().is_err(), "callback invoked more than once");
    result
}

#[test]
fn explicit_beats_default_beats_system_default() {
    let explicit = Configuration::new("explicit.store");
    let default = Configuration::new("default.from-registry.store");

    for (use_explicit, use_default) in [(true, true), (true, false), (false, true), (false, false)] {
        let bg = background();
        if use_default {
            bg.registry().set(Some(default.clone()));
        }
        let explicit = use_explicit.then(|| explicit.clone());

        let path = opened_path(|queue, tx| {
            bg.write_in_background(explicit.as_ref(), Some(queue), move |result| {
                tx.send(result.map(|h| h.configuration().path.clone())).unwrap();
            });
        })
        .unwrap();

        let expected = match (use_explicit, use_default) {
            (true, _) => PathBuf::from("explicit.store"),
            (false, true) => PathBuf::from("default.from-registry.store"),
            (false, false) => PathBuf::from(DEFAULT_STORE_FILE_NAME),
        };
        assert_eq!(path, expected, "explicit={} default={}", use_explicit, use_default);
    }
}

#[test]
fn path_overlays_default_or_system_default() {
    for use_default in [true, false] {
        let bg = background();
        if use_default {
            bg.registry()
                .set(Some(Configuration::new("base.store").with_schema_version(7)));
        }

        let (tx, rx) = mpsc::channel();
        let queue = SerialQueue::new("resolution-writer");
        bg.write_in_background_at("overlay.store", Some(&queue), move |result| {
            tx.send(result.map(|h| h.configuration().clone())).unwrap();
        });
        let opened = rx.recv_timeout(WAIT).unwrap().unwrap();

        assert_eq!(opened.path, PathBuf::from("overlay.store"));
        assert_eq!(opened.schema_version, if use_default { 7 } else { 0 });
    }
}

#[test]
fn path_resolution_ignores_strict_policy() {
    let bg = background().with_policy(ResolutionPolicy::Strict);

    let path = opened_path(|queue, tx| {
        bg.write_in_background_at("strict-path.store", Some(queue), move |result| {
            tx.send(result.map(|h| h.configuration().path.clone())).unwrap();
        });
    });

    assert_eq!(path.unwrap(), PathBuf::from("strict-path.store"));
}

#[test]
fn strict_with_nothing_set_reports_missing_configuration() {
    let bg = background().with_policy(ResolutionPolicy::Strict);

    let write = opened_path(|queue, tx| {
        bg.write_in_background(None, Some(queue), move |result| {
            tx.send(result.map(|h| h.configuration().path.clone())).unwrap();
        });
    });
    let commit = opened_path(|queue, tx| {
        bg.commit_in_background(None, Some(queue), move |result| {
            tx.send(result.map(|h| h.configuration().path.clone())).unwrap();
            undertow::TransactionDecision::Commit
        });
    });

    assert_eq!(write, Err(BackgroundError::NoBackgroundConfiguration));
    assert_eq!(commit, Err(BackgroundError::NoBackgroundConfiguration));
    assert_eq!(bg.engine().opened_handles(), 0);
}

#[test]
fn strict_uses_default_when_set() {
    let bg = background().with_policy(ResolutionPolicy::Strict);
    bg.registry().set(Some(Configuration::new("strict-default.store")));

    let path = opened_path(|queue, tx| {
        bg.write_in_background(None, Some(queue), move |result| {
            tx.send(result.map(|h| h.configuration().path.clone())).unwrap();
        });
    });

    assert_eq!(path.unwrap(), PathBuf::from("strict-default.store"));
}

#[test]
fn caller_configuration_is_not_mutated() {
    let bg = background();
    let read_only = Configuration::new(unique_path("read-only")).with_read_only(true);

    let (tx, rx) = mpsc::channel();
    let queue = SerialQueue::new("resolution-writer");
    bg.write_in_background(Some(&read_only), Some(&queue), move |result| {
        tx.send(result.map(|h| h.configuration().read_only)).unwrap();
    });

    assert_eq!(rx.recv_timeout(WAIT).unwrap(), Ok(false));
    assert!(read_only.read_only);
}
