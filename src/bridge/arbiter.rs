//! The connection arbiter.
//!
//! At most one process at a time may hold the real-time Socket Mode
//! connection; a second connection would steal events belonging to other
//! sessions' threads. The arbiter hands out a single system-wide lease via
//! a non-blocking exclusive flock. Losing the race is not an error, it is
//! the expected steady state for every process but one; losers poll the
//! Web API instead.

use std::io;
use std::path::{Path, PathBuf};

use super::flock::{open_lock_file, try_flock_exclusive, FlockGuard};

/// Errors from lease and lock acquisition.
#[derive(Debug, thiserror::Error)]
pub enum LeaseError {
    #[error("Failed to open lock file {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("Failed to lock {path}: {source}")]
    Lock { path: PathBuf, source: io::Error },
}

/// The system-wide real-time connection lease.
///
/// Held for the lifetime of this value; released on drop or process death.
#[derive(Debug)]
pub struct ConnectionLease {
    _guard: FlockGuard,
}

/// Hands out the single [`ConnectionLease`].
#[derive(Debug)]
pub struct ConnectionArbiter {
    lock_path: PathBuf,
}

impl ConnectionArbiter {
    /// Arbiter over the relay home's bridge lock file.
    #[must_use]
    pub fn new(home: &Path) -> Self {
        Self {
            lock_path: home.join("bridge.lock"),
        }
    }

    /// Arbiter over an explicit lock file path.
    #[must_use]
    pub fn with_path(lock_path: PathBuf) -> Self {
        Self { lock_path }
    }

    /// The lock file backing the lease.
    #[must_use]
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Attempt non-blocking acquisition of the lease.
    ///
    /// Returns `Ok(None)` when another process holds it.
    ///
    /// # Errors
    ///
    /// Returns an error only for unexpected filesystem failures; contention
    /// is not an error.
    pub fn try_acquire(&self) -> Result<Option<ConnectionLease>, LeaseError> {
        let file = open_lock_file(&self.lock_path).map_err(|e| LeaseError::Open {
            path: self.lock_path.clone(),
            source: e,
        })?;

        let guard = try_flock_exclusive(file).map_err(|e| LeaseError::Lock {
            path: self.lock_path.clone(),
            source: e,
        })?;

        Ok(guard.map(|guard| ConnectionLease { _guard: guard }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn first_acquisition_succeeds() {
        let home = TempDir::new().unwrap();
        let arbiter = ConnectionArbiter::new(home.path());
        assert!(arbiter.try_acquire().unwrap().is_some());
    }

    #[test]
    fn second_acquisition_fails_while_held() {
        let home = TempDir::new().unwrap();
        let first = ConnectionArbiter::new(home.path());
        let second = ConnectionArbiter::new(home.path());

        let lease = first.try_acquire().unwrap();
        assert!(lease.is_some());
        assert!(second.try_acquire().unwrap().is_none());
    }

    #[test]
    fn dropping_the_lease_frees_it() {
        let home = TempDir::new().unwrap();
        let arbiter = ConnectionArbiter::new(home.path());

        let lease = arbiter.try_acquire().unwrap();
        assert!(lease.is_some());
        drop(lease);

        let again = ConnectionArbiter::new(home.path());
        assert!(again.try_acquire().unwrap().is_some());
    }

    #[test]
    fn exactly_one_of_many_contenders_wins() {
        let home = TempDir::new().unwrap();
        let arbiters: Vec<_> = (0..8)
            .map(|_| ConnectionArbiter::new(home.path()))
            .collect();

        let leases: Vec<_> = arbiters
            .iter()
            .map(|a| a.try_acquire().unwrap())
            .collect();
        assert_eq!(leases.iter().filter(|l| l.is_some()).count(), 1);
    }

    #[test]
    fn creates_missing_parent_directories() {
        let home = TempDir::new().unwrap();
        let arbiter = ConnectionArbiter::with_path(home.path().join("deep/nested/bridge.lock"));
        assert!(arbiter.try_acquire().unwrap().is_some());
    }
}
