//! Thread state persistence.
//!
//! Stores the Slack `thread_ts` per session under
//! `<home>/slack/threads/<session>.json`, so every hook invocation for a
//! session posts into the same Slack thread. The mapping is written on
//! first post and never changed afterwards; only an explicit reset removes
//! it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Errors from thread state operations.
#[derive(Debug, thiserror::Error)]
pub enum ThreadStoreError {
    #[error("Failed to write thread state {path}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize thread state: {0}")]
    SerializeError(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ThreadState {
    thread_ts: Option<String>,
}

/// Per-session Slack thread mapping.
#[derive(Debug, Clone)]
pub struct ThreadStore {
    dir: PathBuf,
}

impl ThreadStore {
    /// Store rooted at the given relay home.
    #[must_use]
    pub fn new(home: &Path) -> Self {
        Self {
            dir: home.join("slack").join("threads"),
        }
    }

    fn state_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    /// The thread for a session, if one has been started.
    #[must_use]
    pub fn load(&self, session_id: &str) -> Option<String> {
        let content = std::fs::read_to_string(self.state_path(session_id)).ok()?;
        serde_json::from_str::<ThreadState>(&content)
            .ok()
            .and_then(|state| state.thread_ts)
    }

    /// Record the thread for a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the state file cannot be written.
    pub fn save(&self, session_id: &str, thread_ts: &str) -> Result<(), ThreadStoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| ThreadStoreError::WriteError {
            path: self.dir.clone(),
            source: e,
        })?;
        let state = ThreadState {
            thread_ts: Some(thread_ts.to_string()),
        };
        let mut content = serde_json::to_string(&state)?;
        content.push('\n');
        let path = self.state_path(session_id);
        std::fs::write(&path, content)
            .map_err(|e| ThreadStoreError::WriteError { path, source: e })
    }

    /// Forget a session's thread, so the next post starts a new one.
    ///
    /// # Errors
    ///
    /// Returns an error if the state file exists but cannot be removed.
    pub fn reset(&self, session_id: &str) -> Result<(), ThreadStoreError> {
        let path = self.state_path(session_id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ThreadStoreError::WriteError { path, source: e }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_missing_returns_none() {
        let home = TempDir::new().unwrap();
        let store = ThreadStore::new(home.path());
        assert!(store.load("s1").is_none());
    }

    #[test]
    fn save_then_load_roundtrips() {
        let home = TempDir::new().unwrap();
        let store = ThreadStore::new(home.path());
        store.save("s1", "1712345678.000100").unwrap();
        assert_eq!(store.load("s1").as_deref(), Some("1712345678.000100"));
        assert!(store.load("s2").is_none());
    }

    #[test]
    fn reset_forgets_thread() {
        let home = TempDir::new().unwrap();
        let store = ThreadStore::new(home.path());
        store.save("s1", "1.0").unwrap();
        store.reset("s1").unwrap();
        assert!(store.load("s1").is_none());
        // Resetting again is fine.
        store.reset("s1").unwrap();
    }

    #[test]
    fn corrupt_state_reads_as_none() {
        let home = TempDir::new().unwrap();
        let store = ThreadStore::new(home.path());
        std::fs::create_dir_all(home.path().join("slack/threads")).unwrap();
        std::fs::write(home.path().join("slack/threads/s1.json"), "not json").unwrap();
        assert!(store.load("s1").is_none());
    }
}
