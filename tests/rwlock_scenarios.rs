use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use ripartito::locks::rwlock::{LockState, ReaderWriterLock};
use ripartito::worker::FixedWorker;

#[test]
fn test_readers_blocked_by_writer_all_proceed_after_release() {
    const READERS: usize = 100;

    let lock = Arc::new(ReaderWriterLock::new().unwrap());
    let entered = Arc::new(AtomicUsize::new(0));
    let started = Arc::new(Barrier::new(READERS + 1));

    lock.write_lock();
    assert_eq!(lock.state(), LockState::WriteLocked);

    let handles: Vec<_> = (0..READERS)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let entered = Arc::clone(&entered);
            let started = Arc::clone(&started);
            thread::spawn(move || {
                started.wait();
                let guard = lock.read();
                entered.fetch_add(1, Ordering::SeqCst);
                drop(guard);
            })
        })
        .collect();

    started.wait();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(entered.load(Ordering::SeqCst), 0);
    assert!(!lock.try_read_lock(None));

    lock.write_unlock();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(entered.load(Ordering::SeqCst), READERS);
    assert_eq!(lock.state(), LockState::Unlocked);
}

#[test]
fn test_writer_excludes_readers_and_writers() {
    let lock = Arc::new(ReaderWriterLock::new().unwrap());
    let inside_writer = Arc::new(AtomicBool::new(false));
    let violations = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let lock = Arc::clone(&lock);
            let inside_writer = Arc::clone(&inside_writer);
            let violations = Arc::clone(&violations);
            thread::spawn(move || {
                for i in 0..2_000 {
                    if (t + i) % 10 == 0 {
                        let _write = lock.write();
                        if inside_writer.swap(true, Ordering::SeqCst) {
                            violations.fetch_add(1, Ordering::SeqCst);
                        }
                        inside_writer.store(false, Ordering::SeqCst);
                    } else {
                        let _read = lock.read();
                        if inside_writer.load(Ordering::SeqCst) {
                            violations.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(violations.load(Ordering::SeqCst), 0);
    assert_eq!(lock.state(), LockState::Unlocked);
}

#[test]
fn test_upgrade_with_pending_writer_releases_reader() {
    let lock = ReaderWriterLock::with_workers(FixedWorker::new(0).with_workers(4), 4, 8).unwrap();

    lock.read_lock(Some(2));
    lock.read_lock(Some(3));

    // Another writer has claimed the flag and is waiting for readers.
    thread::scope(|s| {
        let writer = s.spawn(|| {
            lock.write_lock();
            lock.write_unlock();
        });
        while lock.state() != LockState::WriteLocked {
            thread::yield_now();
        }

        assert!(!lock.try_upgrade_release_on_fail(Some(2)));
        lock.read_unlock(Some(3));
        writer.join().unwrap();
    });

    assert_eq!(lock.state(), LockState::Unlocked);
}

#[test]
fn test_upgrade_waits_for_other_readers() {
    let lock = Arc::new(ReaderWriterLock::new().unwrap());
    let other_released = Arc::new(AtomicBool::new(false));

    let main = lock.read_at(0);
    let other = {
        let lock = Arc::clone(&lock);
        let other_released = Arc::clone(&other_released);
        let (tx, rx) = std::sync::mpsc::channel();
        let handle = thread::spawn(move || {
            let guard = lock.read_at(5);
            tx.send(()).unwrap();
            thread::sleep(Duration::from_millis(30));
            other_released.store(true, Ordering::SeqCst);
            drop(guard);
        });
        rx.recv().unwrap();
        handle
    };

    let write = main.try_upgrade().expect("no competing writer");
    assert!(other_released.load(Ordering::SeqCst));
    assert_eq!(lock.state(), LockState::WriteLocked);
    drop(write);

    other.join().unwrap();
    assert_eq!(lock.state(), LockState::Unlocked);
}
