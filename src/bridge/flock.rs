//! flock(2) helpers shared by the connection and session leases.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// RAII guard over an exclusively flocked file.
///
/// Dropping the guard releases the lock; so does process death, because the
/// lock belongs to the open file description, not to any in-process state.
#[derive(Debug)]
pub struct FlockGuard {
    #[cfg(unix)]
    _lock: nix::fcntl::Flock<File>,
    #[cfg(not(unix))]
    _file: File,
}

/// Open (creating if needed) a lock file without truncating it.
pub(crate) fn open_lock_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
}

/// Try to acquire an exclusive flock (non-blocking).
///
/// Returns `Ok(None)` if the file is already locked by another process.
pub(crate) fn try_flock_exclusive(file: File) -> io::Result<Option<FlockGuard>> {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::fcntl::{Flock, FlockArg};

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => Ok(Some(FlockGuard { _lock: lock })),
            Err((_file, errno)) if errno == Errno::EWOULDBLOCK => Ok(None),
            Err((_file, errno)) => Err(io::Error::from_raw_os_error(errno as i32)),
        }
    }
    #[cfg(not(unix))]
    {
        Ok(Some(FlockGuard { _file: file }))
    }
}

/// Acquire an exclusive flock, blocking until the holder releases it.
pub(crate) fn flock_exclusive(file: File) -> io::Result<FlockGuard> {
    #[cfg(unix)]
    {
        use nix::fcntl::{Flock, FlockArg};

        match Flock::lock(file, FlockArg::LockExclusive) {
            Ok(lock) => Ok(FlockGuard { _lock: lock }),
            Err((_file, errno)) => Err(io::Error::from_raw_os_error(errno as i32)),
        }
    }
    #[cfg(not(unix))]
    {
        Ok(FlockGuard { _file: file })
    }
}
