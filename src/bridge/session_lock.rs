//! The session serializer.
//!
//! Several hook invocations for the same session can fire near
//! simultaneously (parallel tool calls). The permission cache must only be
//! read and written by one of them at a time, or two invocations race to
//! cache a decision and both prompt the human. This lock is per session, so
//! unrelated sessions never block each other, and it is process-external:
//! the contenders are independent OS processes.

use std::path::PathBuf;

use super::arbiter::LeaseError;
use super::flock::{flock_exclusive, open_lock_file, try_flock_exclusive, FlockGuard};

/// Exclusive lease on one session's critical section.
///
/// Held for the lifetime of this value; released on drop or process death.
#[derive(Debug)]
pub struct SessionLock {
    _guard: FlockGuard,
}

impl SessionLock {
    /// The lock file for a session, under the system temp directory.
    #[must_use]
    pub fn lock_path(session_id: &str) -> PathBuf {
        let sanitized: String = session_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        std::env::temp_dir().join(format!("claude-relay-session-{sanitized}.lock"))
    }

    /// Acquire the session lock, blocking until the current holder releases.
    ///
    /// # Errors
    ///
    /// Returns an error on unexpected filesystem failures.
    pub fn acquire(session_id: &str) -> Result<Self, LeaseError> {
        let path = Self::lock_path(session_id);
        let file = open_lock_file(&path).map_err(|e| LeaseError::Open {
            path: path.clone(),
            source: e,
        })?;
        let guard = flock_exclusive(file).map_err(|e| LeaseError::Lock { path, source: e })?;
        Ok(Self { _guard: guard })
    }

    /// Attempt non-blocking acquisition. Returns `Ok(None)` when held.
    ///
    /// # Errors
    ///
    /// Returns an error on unexpected filesystem failures.
    pub fn try_acquire(session_id: &str) -> Result<Option<Self>, LeaseError> {
        let path = Self::lock_path(session_id);
        let file = open_lock_file(&path).map_err(|e| LeaseError::Open {
            path: path.clone(),
            source: e,
        })?;
        let guard = try_flock_exclusive(file).map_err(|e| LeaseError::Lock { path, source: e })?;
        Ok(guard.map(|guard| Self { _guard: guard }))
    }
}

/// Run `body` while holding the session lock.
///
/// The lock is released on every exit path, including panics inside `body`
/// (unwinding drops the guard) and process death (the kernel drops the
/// flock).
///
/// # Errors
///
/// Returns an error if the lock cannot be acquired.
pub fn with_session_lock<T>(
    session_id: &str,
    body: impl FnOnce() -> T,
) -> Result<T, LeaseError> {
    let _lock = SessionLock::acquire(session_id)?;
    Ok(body())
}
