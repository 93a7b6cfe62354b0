use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pzip_core::{CancelToken, FailFastWorker, PzipError};

#[test]
fn all_submitted_items_are_executed() -> Result<(), Box<dyn std::error::Error>> {
    let seen = Arc::new(AtomicUsize::new(0));
    let worker = {
        let seen = Arc::clone(&seen);
        FailFastWorker::new(
            move |_item: usize| {
                seen.fetch_add(1, Ordering::AcqRel);
                Ok(())
            },
            4,
            4,
        )
    };

    worker.start(&CancelToken::new());
    for i in 0..128usize {
        worker.submit(i)?;
    }
    worker.wait()?;
    assert_eq!(seen.load(Ordering::Acquire), 128);
    Ok(())
}

#[test]
fn first_error_wins_and_later_submits_observe_it() {
    let worker = FailFastWorker::new(
        |item: usize| {
            if item == 3 {
                return Err(PzipError::Compression("item 3 exploded".to_string()));
            }
            Ok(())
        },
        2,
        2,
    );

    worker.start(&CancelToken::new());

    // Keep submitting until the recorded failure surfaces.
    let mut submit_error = None;
    for i in 0..10_000usize {
        match worker.submit(i) {
            Ok(()) => std::thread::sleep(Duration::from_millis(1)),
            Err(err) => {
                submit_error = Some(err);
                break;
            }
        }
    }
    let submit_error = submit_error.expect("submit should eventually fail");
    assert!(
        matches!(submit_error, PzipError::Cancelled(ref cause) if cause.contains("item 3 exploded")),
        "unexpected submit error: {submit_error}"
    );

    let wait_error = worker.wait().expect_err("wait must surface the error");
    assert!(
        matches!(wait_error, PzipError::Compression(ref msg) if msg == "item 3 exploded"),
        "unexpected wait error: {wait_error}"
    );
}

#[test]
fn lifecycle_misuse_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    let worker: FailFastWorker<usize> = FailFastWorker::new(|_| Ok(()), 1, 1);

    assert!(matches!(worker.submit(1), Err(PzipError::WorkerNotOpened)));
    assert!(matches!(worker.wait(), Err(PzipError::WorkerNotOpened)));

    worker.start(&CancelToken::new());
    assert!(worker.is_opened());
    worker.wait()?;
    assert!(worker.is_closed());

    assert!(matches!(worker.submit(1), Err(PzipError::WorkerClosed)));
    assert!(matches!(worker.wait(), Err(PzipError::WorkerClosed)));
    Ok(())
}

#[test]
fn parent_cancellation_unblocks_and_surfaces_the_cause() {
    // Workers park on an item that never finishes quickly; the queue
    // backs up so submit blocks, then the parent token fires.
    let worker = FailFastWorker::new(
        |_item: usize| {
            std::thread::sleep(Duration::from_millis(50));
            Ok(())
        },
        1,
        1,
    );

    let cancel = CancelToken::new();
    worker.start(&cancel);

    let canceller = {
        let cancel = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            cancel.cancel("operator interrupt");
        })
    };

    // Flood the queue; a submit must eventually block and then fail
    // with the cancellation cause.
    let mut saw_cancel = false;
    for i in 0..1_000usize {
        if let Err(err) = worker.submit(i) {
            assert!(
                matches!(err, PzipError::Cancelled(ref cause) if cause.contains("operator interrupt")),
                "unexpected submit error: {err}"
            );
            saw_cancel = true;
            break;
        }
    }
    canceller.join().expect("canceller thread");
    assert!(saw_cancel, "submit never observed the cancellation");

    let err = worker.wait().expect_err("wait must report cancellation");
    assert!(matches!(err, PzipError::Cancelled(_)));
}

#[test]
fn wait_drains_the_queue_before_returning() -> Result<(), Box<dyn std::error::Error>> {
    let seen = Arc::new(AtomicUsize::new(0));
    let worker = {
        let seen = Arc::clone(&seen);
        FailFastWorker::new(
            move |_item: usize| {
                std::thread::sleep(Duration::from_millis(2));
                seen.fetch_add(1, Ordering::AcqRel);
                Ok(())
            },
            2,
            8,
        )
    };

    worker.start(&CancelToken::new());
    for i in 0..8usize {
        worker.submit(i)?;
    }
    worker.wait()?;
    assert_eq!(seen.load(Ordering::Acquire), 8);
    Ok(())
}
