//! Lease and lock behavior across independent contenders.
//!
//! flock(2) locks belong to the open file description, so two handles on
//! the same path contend exactly like two processes do; these tests drive
//! the leases through independent handles.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use claude_relay::bridge::{with_session_lock, ConnectionArbiter, SessionLock};
use tempfile::TempDir;

#[test]
fn connection_lease_is_exclusive() {
    let home = TempDir::new().unwrap();

    let holder = ConnectionArbiter::new(home.path());
    let lease = holder.try_acquire().unwrap();
    assert!(lease.is_some());

    // Every other contender loses, and losing is not an error.
    for _ in 0..4 {
        let contender = ConnectionArbiter::new(home.path());
        assert!(contender.try_acquire().unwrap().is_none());
    }
}

#[test]
fn connection_lease_is_reacquirable_after_holder_death() {
    let home = TempDir::new().unwrap();

    // Dropping the lease stands in for the holding process dying: both
    // close the file description, and the kernel releases the lock.
    let holder = ConnectionArbiter::new(home.path());
    let lease = holder.try_acquire().unwrap();
    assert!(lease.is_some());
    drop(lease);

    let next = ConnectionArbiter::new(home.path());
    assert!(next.try_acquire().unwrap().is_some());
}

#[test]
fn session_critical_sections_never_overlap() {
    let threads = 4;
    let barrier = Arc::new(Barrier::new(threads));
    let active = Arc::new(AtomicUsize::new(0));
    let max_active = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            let active = Arc::clone(&active);
            let max_active = Arc::clone(&max_active);
            std::thread::spawn(move || {
                barrier.wait();
                for _ in 0..5 {
                    with_session_lock("overlap-test", || {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        max_active.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(std::time::Duration::from_millis(2));
                        active.fetch_sub(1, Ordering::SeqCst);
                    })
                    .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(max_active.load(Ordering::SeqCst), 1);
}

#[test]
fn different_sessions_do_not_block_each_other() {
    let _held = SessionLock::acquire("indep-test-a").unwrap();
    // A second session's lock is immediately available.
    assert!(SessionLock::try_acquire("indep-test-b").unwrap().is_some());
    // The held session's lock is not.
    assert!(SessionLock::try_acquire("indep-test-a").unwrap().is_none());
}

#[test]
fn session_lock_released_on_panic() {
    let result = std::panic::catch_unwind(|| {
        with_session_lock("panic-test", || panic!("boom")).unwrap();
    });
    assert!(result.is_err());

    // The unwind dropped the guard; the lock is free again.
    assert!(SessionLock::try_acquire("panic-test").unwrap().is_some());
}
