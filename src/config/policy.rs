//! Tool policy configuration.
//!
//! Controls how each tool is handled when Claude Code fires `PreToolUse`,
//! which file paths always prompt, and the bridge polling cadence. Loaded
//! from a TOML file when present, with built-in defaults otherwise.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How the `PreToolUse` hook handles a given tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolPolicy {
    /// Silently approve, never prompt on Slack (sensitive files still prompt).
    AutoAllow,
    /// Prompt once per file, remember for the session.
    AskOnce,
    /// Always prompt on Slack.
    AlwaysAsk,
}

/// Policy configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Seconds between Web API polling attempts in fallback mode.
    pub poll_interval_secs: u64,
    /// Per-tool prompt policy. Unlisted tools always ask.
    pub tools: HashMap<String, ToolPolicy>,
    /// Basename globs that force a prompt even for auto-allow tools.
    pub sensitive_patterns: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        let tools = [
            ("Read", ToolPolicy::AutoAllow),
            ("Grep", ToolPolicy::AutoAllow),
            ("Glob", ToolPolicy::AutoAllow),
            ("Edit", ToolPolicy::AskOnce),
            ("Write", ToolPolicy::AlwaysAsk),
            ("Bash", ToolPolicy::AlwaysAsk),
            ("Task", ToolPolicy::AlwaysAsk),
            ("WebFetch", ToolPolicy::AlwaysAsk),
            ("WebSearch", ToolPolicy::AlwaysAsk),
            ("NotebookEdit", ToolPolicy::AlwaysAsk),
        ]
        .into_iter()
        .map(|(name, policy)| (name.to_string(), policy))
        .collect();

        let sensitive_patterns = [
            ".env",
            ".env.*",
            "*.pem",
            "*.key",
            "*.p12",
            "*.pfx",
            "id_rsa",
            "id_rsa.*",
            "id_ed25519",
            "id_ed25519.*",
            ".npmrc",
            ".pypirc",
            "credentials.json",
            "secrets.*",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        Self {
            poll_interval_secs: 3,
            tools,
            sensitive_patterns,
        }
    }
}

impl PolicyConfig {
    /// Policy for a tool; tools not in the table always ask.
    #[must_use]
    pub fn policy_for(&self, tool_name: &str) -> ToolPolicy {
        self.tools
            .get(tool_name)
            .copied()
            .unwrap_or(ToolPolicy::AlwaysAsk)
    }

    /// Whether decisions for this tool are remembered for the session.
    ///
    /// Ask-once tools cache their approvals; Read is auto-allow but caches
    /// sensitive-file approvals.
    #[must_use]
    pub fn is_cacheable(&self, tool_name: &str) -> bool {
        self.policy_for(tool_name) == ToolPolicy::AskOnce || tool_name == "Read"
    }

    /// Whether a file path matches any sensitive basename pattern.
    #[must_use]
    pub fn is_sensitive_path(&self, file_path: &str) -> bool {
        if file_path.is_empty() {
            return false;
        }
        let basename = std::path::Path::new(file_path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.sensitive_patterns
            .iter()
            .any(|pat| crate::permissions::glob_match(pat, &basename))
    }
}

/// Configuration loader that searches multiple locations.
#[derive(Debug)]
pub struct PolicyLoader {
    /// Search paths in order of priority.
    search_paths: Vec<PathBuf>,
}

impl PolicyLoader {
    /// Create a new loader with default search paths.
    #[must_use]
    pub fn new() -> Self {
        let mut search_paths = Vec::new();

        // 1. Current directory: .claude-relay.toml
        search_paths.push(PathBuf::from(".claude-relay.toml"));

        // 2. User config directory: ~/.config/claude-relay/config.toml
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("claude-relay").join("config.toml"));
        }

        Self { search_paths }
    }

    /// Create a loader with a specific config file path.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            search_paths: vec![path],
        }
    }

    /// Load configuration from the first available file, or return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load(&self) -> Result<PolicyConfig, PolicyError> {
        for path in &self.search_paths {
            if path.exists() {
                tracing::debug!(path = %path.display(), "Loading policy file");
                return Self::load_from_path(path);
            }
        }

        tracing::debug!("No policy file found, using defaults");
        Ok(PolicyConfig::default())
    }

    fn load_from_path(path: &PathBuf) -> Result<PolicyConfig, PolicyError> {
        let content = std::fs::read_to_string(path).map_err(|e| PolicyError::ReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| PolicyError::ParseError {
            path: path.clone(),
            source: e,
        })
    }

    /// Get the search paths for debugging.
    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }
}

impl Default for PolicyLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur during policy loading.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("Failed to read policy file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse policy file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policies_match_table() {
        let config = PolicyConfig::default();
        assert_eq!(config.policy_for("Read"), ToolPolicy::AutoAllow);
        assert_eq!(config.policy_for("Edit"), ToolPolicy::AskOnce);
        assert_eq!(config.policy_for("Bash"), ToolPolicy::AlwaysAsk);
        assert_eq!(config.policy_for("SomeNewTool"), ToolPolicy::AlwaysAsk);
    }

    #[test]
    fn cacheable_covers_ask_once_and_read() {
        let config = PolicyConfig::default();
        assert!(config.is_cacheable("Edit"));
        assert!(config.is_cacheable("Read"));
        assert!(!config.is_cacheable("Bash"));
        assert!(!config.is_cacheable("Write"));
    }

    #[test]
    fn sensitive_path_matches_basename() {
        let config = PolicyConfig::default();
        assert!(config.is_sensitive_path("/path/to/.env"));
        assert!(config.is_sensitive_path("/path/to/.env.local"));
        assert!(config.is_sensitive_path("/home/u/.ssh/id_rsa"));
        assert!(config.is_sensitive_path("server.pem"));
        assert!(!config.is_sensitive_path("/path/to/main.rs"));
        assert!(!config.is_sensitive_path(""));
    }

    #[test]
    fn loader_returns_defaults_when_no_file() {
        let loader = PolicyLoader::with_path(PathBuf::from("/nonexistent/path.toml"));
        let config = loader.load().unwrap();
        assert_eq!(config.poll_interval_secs, 3);
    }

    #[test]
    fn parse_toml_overrides() {
        let toml_str = r#"
            poll_interval_secs = 5
            sensitive_patterns = ["*.secret"]

            [tools]
            Bash = "auto_allow"
            Edit = "always_ask"
        "#;

        let config: PolicyConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.policy_for("Bash"), ToolPolicy::AutoAllow);
        assert_eq!(config.policy_for("Edit"), ToolPolicy::AlwaysAsk);
        assert!(config.is_sensitive_path("api.secret"));
        assert!(!config.is_sensitive_path(".env"));
    }

    #[test]
    fn loader_default_paths() {
        let loader = PolicyLoader::new();
        assert!(!loader.search_paths().is_empty());
        assert!(loader.search_paths()[0].ends_with(".claude-relay.toml"));
    }
}
