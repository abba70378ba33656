//! Relay home layout, Slack connection config, and session enablement state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default reply timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Errors from config and state file operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine home directory")]
    NoHomeDir,

    #[error("Failed to read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] serde_json::Error),
}

/// Resolve the relay home directory.
///
/// Checks `CLAUDE_RELAY_HOME` first, then falls back to `~/.claude-relay`.
///
/// # Errors
///
/// Returns [`ConfigError::NoHomeDir`] if no home directory can be determined.
pub fn relay_home() -> Result<PathBuf, ConfigError> {
    if let Some(dir) = std::env::var_os("CLAUDE_RELAY_HOME") {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    dirs::home_dir()
        .map(|h| h.join(".claude-relay"))
        .ok_or(ConfigError::NoHomeDir)
}

/// Create the relay home directory structure if it doesn't exist.
///
/// # Errors
///
/// Returns an error if a directory cannot be created.
pub fn ensure_home(home: &Path) -> Result<(), ConfigError> {
    for sub in [
        home.to_path_buf(),
        home.join("slack").join("threads"),
        home.join("sessions"),
        home.join("logs"),
    ] {
        std::fs::create_dir_all(&sub).map_err(|e| ConfigError::WriteError {
            path: sub.clone(),
            source: e,
        })?;
    }
    Ok(())
}

/// Slack connection configuration, loaded from `<home>/config.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Slack bot token (`xoxb-...`), used for all Web API calls.
    #[serde(rename = "slack_bot_token")]
    pub bot_token: String,

    /// Slack app-level token (`xapp-...`), used to open Socket Mode.
    #[serde(rename = "slack_app_token")]
    pub app_token: String,

    /// The verified Slack user whose replies and reactions are honored.
    #[serde(rename = "slack_user_id")]
    pub user_id: String,

    /// DM channel between the bot and the verified user.
    #[serde(rename = "slack_dm_channel_id")]
    pub dm_channel_id: String,

    /// Reply timeout in seconds.
    pub timeout: u64,

    /// Claude Code config directories with relay hooks installed.
    pub claude_homes: Vec<String>,
}

impl RelayConfig {
    fn config_path(home: &Path) -> PathBuf {
        home.join("config.json")
    }

    /// Load config from `<home>/config.json`, or defaults if absent/corrupt.
    #[must_use]
    pub fn load(home: &Path) -> Self {
        let path = Self::config_path(home);
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    /// Persist config to `<home>/config.json` with mode 0600.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, home: &Path) -> Result<(), ConfigError> {
        ensure_home(home)?;
        let path = Self::config_path(home);
        let mut content = serde_json::to_string_pretty(self)?;
        content.push('\n');
        std::fs::write(&path, content).map_err(|e| ConfigError::WriteError {
            path: path.clone(),
            source: e,
        })?;
        // Tokens live in this file; keep it private to the owner.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&path, perms).map_err(|e| ConfigError::WriteError {
                path,
                source: e,
            })?;
        }
        Ok(())
    }

    /// Whether all fields required for a Slack round trip are present.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.bot_token.is_empty()
            && !self.app_token.is_empty()
            && !self.user_id.is_empty()
            && !self.dm_channel_id.is_empty()
    }

    /// Effective reply timeout.
    #[must_use]
    pub fn timeout_secs(&self) -> u64 {
        if self.timeout == 0 {
            DEFAULT_TIMEOUT_SECS
        } else {
            self.timeout
        }
    }
}

/// Which sessions route to Slack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnabledSessions {
    /// The literal string `"all"`.
    All(AllMarker),
    /// An explicit list of session IDs.
    Ids(Vec<String>),
}

/// Serde helper so `"all"` round-trips as a bare string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllMarker {
    #[serde(rename = "all")]
    All,
}

impl Default for EnabledSessions {
    fn default() -> Self {
        Self::Ids(Vec::new())
    }
}

/// Session routing state, loaded from `<home>/state.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayState {
    pub enabled: EnabledSessions,
}

impl RelayState {
    fn state_path(home: &Path) -> PathBuf {
        home.join("state.json")
    }

    /// Load state, or defaults if absent/corrupt.
    #[must_use]
    pub fn load(home: &Path) -> Self {
        let path = Self::state_path(home);
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    /// Persist state to `<home>/state.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, home: &Path) -> Result<(), ConfigError> {
        ensure_home(home)?;
        let path = Self::state_path(home);
        let mut content = serde_json::to_string_pretty(self)?;
        content.push('\n');
        std::fs::write(&path, content).map_err(|e| ConfigError::WriteError { path, source: e })
    }

    /// Whether a session is enabled for Slack routing.
    #[must_use]
    pub fn is_session_enabled(&self, session_id: &str) -> bool {
        match &self.enabled {
            EnabledSessions::All(_) => true,
            EnabledSessions::Ids(ids) => ids.iter().any(|id| id == session_id),
        }
    }

    /// Enable routing for every session.
    pub fn enable_all(&mut self) {
        self.enabled = EnabledSessions::All(AllMarker::All);
    }

    /// Enable routing for one session. Returns false if already enabled.
    pub fn enable(&mut self, session_id: &str) -> bool {
        match &mut self.enabled {
            EnabledSessions::All(_) => false,
            EnabledSessions::Ids(ids) => {
                if ids.iter().any(|id| id == session_id) {
                    false
                } else {
                    ids.push(session_id.to_string());
                    true
                }
            }
        }
    }

    /// Disable routing for one session. Returns false if it wasn't enabled.
    pub fn disable(&mut self, session_id: &str) -> bool {
        match &mut self.enabled {
            EnabledSessions::All(_) => false,
            EnabledSessions::Ids(ids) => {
                let before = ids.len();
                ids.retain(|id| id != session_id);
                ids.len() < before
            }
        }
    }

    /// Disable routing for every session.
    pub fn disable_all(&mut self) {
        self.enabled = EnabledSessions::Ids(Vec::new());
    }
}

/// Path of the per-session state directory (permission caches and such).
#[must_use]
pub fn session_dir(home: &Path, session_id: &str) -> PathBuf {
    home.join("sessions").join(session_id)
}

/// Whether a session's transcript exists in any registered Claude home.
#[must_use]
pub fn session_exists(session_id: &str, claude_homes: &[String]) -> bool {
    for home in claude_homes {
        let projects = Path::new(home).join("projects");
        let Ok(entries) = std::fs::read_dir(&projects) else {
            continue;
        };
        for entry in entries.flatten() {
            if entry
                .path()
                .join(format!("{session_id}.jsonl"))
                .exists()
            {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn config_roundtrip_preserves_fields() {
        let home = TempDir::new().unwrap();
        let config = RelayConfig {
            bot_token: "xoxb-1".to_string(),
            app_token: "xapp-1".to_string(),
            user_id: "U123".to_string(),
            dm_channel_id: "D456".to_string(),
            timeout: 120,
            claude_homes: vec!["/home/u/.claude".to_string()],
        };
        config.save(home.path()).unwrap();

        let loaded = RelayConfig::load(home.path());
        assert_eq!(loaded.bot_token, "xoxb-1");
        assert_eq!(loaded.user_id, "U123");
        assert_eq!(loaded.timeout_secs(), 120);
        assert!(loaded.is_valid());
    }

    #[cfg(unix)]
    #[test]
    fn config_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let home = TempDir::new().unwrap();
        RelayConfig::default().save(home.path()).unwrap();
        let meta = std::fs::metadata(home.path().join("config.json")).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn missing_config_loads_defaults() {
        let home = TempDir::new().unwrap();
        let config = RelayConfig::load(home.path());
        assert!(!config.is_valid());
        assert_eq!(config.timeout_secs(), DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn state_enable_disable_sessions() {
        let mut state = RelayState::default();
        assert!(!state.is_session_enabled("s1"));

        assert!(state.enable("s1"));
        assert!(!state.enable("s1"));
        assert!(state.is_session_enabled("s1"));
        assert!(!state.is_session_enabled("s2"));

        assert!(state.disable("s1"));
        assert!(!state.disable("s1"));
        assert!(!state.is_session_enabled("s1"));
    }

    #[test]
    fn state_enable_all_covers_every_session() {
        let mut state = RelayState::default();
        state.enable_all();
        assert!(state.is_session_enabled("anything"));
        // Individual enable/disable are no-ops under "all".
        assert!(!state.enable("s1"));
        assert!(!state.disable("s1"));

        state.disable_all();
        assert!(!state.is_session_enabled("anything"));
    }

    #[test]
    fn state_all_serializes_as_bare_string() {
        let mut state = RelayState::default();
        state.enable_all();
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, r#"{"enabled":"all"}"#);

        let parsed: RelayState = serde_json::from_str(&json).unwrap();
        assert!(parsed.is_session_enabled("x"));
    }

    #[test]
    fn session_exists_scans_project_dirs() {
        let claude_home = TempDir::new().unwrap();
        let project_dir = claude_home.path().join("projects/-home-u-proj");
        std::fs::create_dir_all(&project_dir).unwrap();
        std::fs::write(project_dir.join("abc123.jsonl"), "{}").unwrap();

        let homes = vec![claude_home.path().to_string_lossy().into_owned()];
        assert!(session_exists("abc123", &homes));
        assert!(!session_exists("missing", &homes));
        assert!(!session_exists("abc123", &[]));
    }

    #[test]
    fn state_roundtrip_on_disk() {
        let home = TempDir::new().unwrap();
        let mut state = RelayState::load(home.path());
        state.enable("abc");
        state.save(home.path()).unwrap();

        let loaded = RelayState::load(home.path());
        assert!(loaded.is_session_enabled("abc"));
    }
}
