//! Per-session approval cache.
//!
//! Remembers tool-use approvals granted from Slack so the human is not
//! re-asked for repeated uses of an already-approved tool/file within a
//! session. Only positive decisions are ever written: caching a deny would
//! lock a tool out for the rest of the session with no further human
//! recourse, so denials always prompt again.
//!
//! Callers must hold the session lock (see [`crate::bridge::SessionLock`])
//! around every lookup/remember pair.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::session_dir;

use super::{tool_has_rule, tool_input_value};

/// A cached decision for a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachedDecision {
    Allowed,
    Denied,
}

/// Errors from cache file operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Failed to read cache file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write cache file {path}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize cache: {0}")]
    SerializeError(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct CacheFile {
    permissions: PermissionLists,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct PermissionLists {
    allow: Vec<String>,
    deny: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct PrefixFile {
    approved: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

/// Result of checking a Bash command's prefixes against the session cache.
#[derive(Debug, Clone, Default)]
pub struct PrefixCheck {
    /// Prefixes already approved for this session.
    pub approved: Vec<String>,
    /// Prefixes with no approval yet.
    pub unapproved: Vec<String>,
}

impl PrefixCheck {
    /// True when the command has prefixes and every one is approved.
    #[must_use]
    pub fn all_approved(&self) -> bool {
        self.unapproved.is_empty() && !self.approved.is_empty()
    }
}

/// On-disk approval cache for one session.
#[derive(Debug, Clone)]
pub struct SessionCache {
    dir: PathBuf,
}

impl SessionCache {
    /// Cache for the given session under the relay home.
    #[must_use]
    pub fn new(home: &Path, session_id: &str) -> Self {
        Self {
            dir: session_dir(home, session_id),
        }
    }

    fn permissions_path(&self) -> PathBuf {
        self.dir.join("permissions.json")
    }

    fn prefixes_path(&self) -> PathBuf {
        self.dir.join("bash_prefixes.json")
    }

    fn load_permissions(&self) -> CacheFile {
        let Ok(content) = std::fs::read_to_string(self.permissions_path()) else {
            return CacheFile::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    fn load_prefixes(&self) -> PrefixFile {
        let Ok(content) = std::fs::read_to_string(self.prefixes_path()) else {
            return PrefixFile::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    fn write_json<T: Serialize>(&self, path: &PathBuf, value: &T) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| CacheError::WriteError {
            path: self.dir.clone(),
            source: e,
        })?;
        let mut content = serde_json::to_string_pretty(value)?;
        content.push('\n');
        std::fs::write(path, content).map_err(|e| CacheError::WriteError {
            path: path.clone(),
            source: e,
        })
    }

    /// Look up a cached decision for a tool call.
    ///
    /// Deny rules take precedence over allows on read (the file may be
    /// hand-edited), but [`SessionCache::remember_allow`] is the only writer
    /// and it never writes a deny.
    #[must_use]
    pub fn lookup(
        &self,
        tool_name: &str,
        tool_input: &serde_json::Value,
    ) -> Option<CachedDecision> {
        let file = self.load_permissions();
        if tool_has_rule(tool_name, tool_input, &file.permissions.deny) {
            return Some(CachedDecision::Denied);
        }
        if tool_has_rule(tool_name, tool_input, &file.permissions.allow) {
            return Some(CachedDecision::Allowed);
        }
        None
    }

    /// Append an allow rule to the session cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache file cannot be written.
    pub fn remember_allow(&self, rule: &str) -> Result<(), CacheError> {
        let mut file = self.load_permissions();
        if !file.permissions.allow.iter().any(|r| r == rule) {
            file.permissions.allow.push(rule.to_string());
        }
        file.updated_at = Some(Utc::now());
        self.write_json(&self.permissions_path(), &file)
    }

    /// Check which of a Bash command's prefixes are already approved.
    #[must_use]
    pub fn check_bash_prefixes(&self, command: &str) -> PrefixCheck {
        let approved_set = self.load_prefixes().approved;
        let mut check = PrefixCheck::default();
        for prefix in crate::shell::extract_command_prefixes(command) {
            if approved_set.iter().any(|p| *p == prefix) {
                check.approved.push(prefix);
            } else {
                check.unapproved.push(prefix);
            }
        }
        check
    }

    /// Record command prefixes as approved for this session.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix file cannot be written.
    pub fn remember_prefixes(&self, prefixes: &[String]) -> Result<(), CacheError> {
        let mut file = self.load_prefixes();
        for prefix in prefixes {
            if !file.approved.iter().any(|p| p == prefix) {
                file.approved.push(prefix.clone());
            }
        }
        file.updated_at = Some(Utc::now());
        self.write_json(&self.prefixes_path(), &file)
    }

    /// Remove the session's cache directory entirely.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be removed.
    pub fn clear(&self) -> Result<(), CacheError> {
        if self.dir.is_dir() {
            std::fs::remove_dir_all(&self.dir).map_err(|e| CacheError::WriteError {
                path: self.dir.clone(),
                source: e,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn cache(home: &TempDir) -> SessionCache {
        SessionCache::new(home.path(), "session-1")
    }

    #[test]
    fn unknown_key_returns_none() {
        let home = TempDir::new().unwrap();
        assert!(cache(&home)
            .lookup("Edit", &json!({"file_path": "/a/b.rs"}))
            .is_none());
    }

    #[test]
    fn remember_allow_then_lookup_returns_allowed() {
        let home = TempDir::new().unwrap();
        let cache = cache(&home);
        cache.remember_allow("Edit(/a/b.rs)").unwrap();

        assert_eq!(
            cache.lookup("Edit", &json!({"file_path": "/a/b.rs"})),
            Some(CachedDecision::Allowed)
        );
        assert!(cache.lookup("Edit", &json!({"file_path": "/a/c.rs"})).is_none());
    }

    #[test]
    fn remember_allow_is_idempotent() {
        let home = TempDir::new().unwrap();
        let cache = cache(&home);
        cache.remember_allow("Edit(/a/b.rs)").unwrap();
        cache.remember_allow("Edit(/a/b.rs)").unwrap();

        let content =
            std::fs::read_to_string(home.path().join("sessions/session-1/permissions.json"))
                .unwrap();
        assert_eq!(content.matches("Edit(/a/b.rs)").count(), 1);
    }

    #[test]
    fn cache_never_contains_deny_entries() {
        let home = TempDir::new().unwrap();
        let cache = cache(&home);
        cache.remember_allow("Edit(/a/b.rs)").unwrap();

        let content =
            std::fs::read_to_string(home.path().join("sessions/session-1/permissions.json"))
                .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["permissions"]["deny"], json!([]));
    }

    #[test]
    fn hand_edited_deny_takes_precedence() {
        let home = TempDir::new().unwrap();
        let dir = home.path().join("sessions/session-1");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("permissions.json"),
            r#"{"permissions": {"allow": ["Edit(/a/*)"], "deny": ["Edit(/a/b.rs)"]}}"#,
        )
        .unwrap();

        let cache = cache(&home);
        assert_eq!(
            cache.lookup("Edit", &json!({"file_path": "/a/b.rs"})),
            Some(CachedDecision::Denied)
        );
        assert_eq!(
            cache.lookup("Edit", &json!({"file_path": "/a/c.rs"})),
            Some(CachedDecision::Allowed)
        );
    }

    #[test]
    fn bash_prefixes_roundtrip() {
        let home = TempDir::new().unwrap();
        let cache = cache(&home);

        let check = cache.check_bash_prefixes("git log --oneline | head -20");
        assert!(!check.all_approved());
        assert_eq!(check.unapproved, vec!["git log", "head"]);

        cache
            .remember_prefixes(&["git log".to_string(), "head".to_string()])
            .unwrap();

        let check = cache.check_bash_prefixes("git log --stat | head -5");
        assert!(check.all_approved());

        let check = cache.check_bash_prefixes("git log | wc -l");
        assert!(!check.all_approved());
        assert_eq!(check.unapproved, vec!["wc"]);
    }

    #[test]
    fn empty_command_is_never_all_approved() {
        let home = TempDir::new().unwrap();
        let check = cache(&home).check_bash_prefixes("   ");
        assert!(!check.all_approved());
    }

    #[test]
    fn clear_removes_session_dir() {
        let home = TempDir::new().unwrap();
        let cache = cache(&home);
        cache.remember_allow("Edit(/a/b.rs)").unwrap();
        assert!(home.path().join("sessions/session-1").is_dir());

        cache.clear().unwrap();
        assert!(!home.path().join("sessions/session-1").exists());
        // Clearing an absent dir is fine.
        cache.clear().unwrap();
    }

    #[test]
    fn corrupt_cache_file_reads_as_empty() {
        let home = TempDir::new().unwrap();
        let dir = home.path().join("sessions/session-1");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("permissions.json"), "not json").unwrap();

        assert!(cache(&home)
            .lookup("Edit", &json!({"file_path": "/a/b.rs"}))
            .is_none());
    }
}
