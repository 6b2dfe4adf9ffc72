//! Integration tests for page-level locking

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use heapdb::common::{LockConfig, PageId, TransactionId};
use heapdb::transaction::{LockManager, LockMode};

fn page(n: u32) -> PageId {
    PageId::new(1, n)
}

#[test]
fn test_upgrade_blocked_by_other_reader() {
    let lm = LockManager::new(LockConfig::new(3, Duration::from_millis(10)));
    let (t1, t2) = (TransactionId::new(), TransactionId::new());

    lm.acquire(t1, page(0), LockMode::Shared).unwrap();
    lm.acquire(t2, page(0), LockMode::Shared).unwrap();

    let start = Instant::now();
    let err = lm.acquire(t1, page(0), LockMode::Exclusive).unwrap_err();
    assert!(err.is_abort());
    assert!(start.elapsed() >= Duration::from_millis(20));

    // The failed upgrade leaves the shared lock in place
    assert_eq!(lm.lock_mode(t1, page(0)), Some(LockMode::Shared));
    assert_eq!(lm.lock_mode(t2, page(0)), Some(LockMode::Shared));
}

#[test]
fn test_waiter_granted_after_release() {
    let lm = Arc::new(LockManager::new(LockConfig::new(5, Duration::from_millis(50))));
    let (holder, waiter) = (TransactionId::new(), TransactionId::new());

    lm.acquire(holder, page(0), LockMode::Exclusive).unwrap();

    let lm_clone = Arc::clone(&lm);
    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        lm_clone.release_all(holder);
    });

    lm.acquire(waiter, page(0), LockMode::Exclusive).unwrap();
    releaser.join().unwrap();

    assert_eq!(lm.holders(page(0)), vec![(waiter, LockMode::Exclusive)]);
}

#[test]
fn test_exclusive_lock_mutual_exclusion() {
    let lm = Arc::new(LockManager::new(LockConfig::new(100, Duration::from_millis(10))));
    let inside = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));
    let mut handles = vec![];

    for _ in 0..4 {
        let lm = Arc::clone(&lm);
        let inside = Arc::clone(&inside);
        let completed = Arc::clone(&completed);

        handles.push(thread::spawn(move || {
            for _ in 0..20 {
                let txn = TransactionId::new();
                if lm.acquire(txn, page(0), LockMode::Exclusive).is_err() {
                    continue;
                }

                assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                thread::yield_now();
                inside.fetch_sub(1, Ordering::SeqCst);

                completed.fetch_add(1, Ordering::SeqCst);
                lm.release_all(txn);
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(completed.load(Ordering::SeqCst) > 0);
    assert_eq!(lm.locked_page_count(), 0);
}

#[test]
fn test_readers_share_while_writer_waits() {
    let lm = Arc::new(LockManager::new(LockConfig::new(3, Duration::from_millis(10))));
    let readers: Vec<TransactionId> = (0..3).map(|_| TransactionId::new()).collect();
    let barrier = Arc::new(Barrier::new(readers.len()));

    let handles: Vec<_> = readers
        .iter()
        .map(|&txn| {
            let lm = Arc::clone(&lm);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                lm.acquire(txn, page(0), LockMode::Shared).unwrap();
                barrier.wait();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(lm.holders(page(0)).len(), 3);

    let writer = TransactionId::new();
    assert!(lm.acquire(writer, page(0), LockMode::Exclusive).is_err());

    for txn in readers {
        lm.release_all(txn);
    }
    lm.acquire(writer, page(0), LockMode::Exclusive).unwrap();
}

#[test]
fn test_deadlock_resolved_by_timeout() {
    let lm = Arc::new(LockManager::new(LockConfig::new(3, Duration::from_millis(20))));
    let (t1, t2) = (TransactionId::new(), TransactionId::new());

    lm.acquire(t1, page(0), LockMode::Exclusive).unwrap();
    lm.acquire(t2, page(1), LockMode::Exclusive).unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let spawn_cross = |txn: TransactionId, target: PageId| {
        let lm = Arc::clone(&lm);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            let result = lm.acquire(txn, target, LockMode::Exclusive);
            // An aborted transaction gives up everything it holds
            if result.is_err() {
                lm.release_all(txn);
            }
            result.is_ok()
        })
    };

    let first = spawn_cross(t1, page(1));
    let second = spawn_cross(t2, page(0));
    let granted = [first.join().unwrap(), second.join().unwrap()];

    // At least one side gives up, and nobody waits forever
    assert!(granted.iter().any(|ok| !ok));
}

#[test]
fn test_release_all_clears_both_views() {
    let lm = LockManager::default();
    let txn = TransactionId::new();

    for n in 0..5 {
        lm.acquire(txn, page(n), LockMode::Shared).unwrap();
    }
    lm.acquire(txn, page(2), LockMode::Exclusive).unwrap();
    assert_eq!(lm.locked_pages(txn).len(), 5);

    lm.release_all(txn);
    assert!(lm.locked_pages(txn).is_empty());
    assert_eq!(lm.locked_page_count(), 0);
    for n in 0..5 {
        assert!(lm.holders(page(n)).is_empty());
    }
}
