//! Claude Code settings.json types.
//!
//! Read/write support for the hook section of Claude Code's settings.json,
//! preserving every field the relay does not interpret.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Claude Code settings from `<claude home>/settings.json`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClaudeSettings {
    /// Hook configuration section.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hooks: Option<HooksConfig>,
    /// Other fields we preserve but don't interpret.
    #[serde(flatten)]
    pub other: HashMap<String, serde_json::Value>,
}

/// Hook configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HooksConfig {
    /// `PreToolUse` hooks.
    #[serde(rename = "PreToolUse", skip_serializing_if = "Option::is_none")]
    pub pre_tool_use: Option<Vec<HookMatcher>>,
    /// Stop hooks.
    #[serde(rename = "Stop", skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<HookMatcher>>,
    /// `PermissionRequest` hooks.
    #[serde(rename = "PermissionRequest", skip_serializing_if = "Option::is_none")]
    pub permission_request: Option<Vec<HookMatcher>>,
    /// Notification hooks.
    #[serde(rename = "Notification", skip_serializing_if = "Option::is_none")]
    pub notification: Option<Vec<HookMatcher>>,
    /// Other hook types we preserve but don't interpret.
    #[serde(flatten)]
    pub other: HashMap<String, serde_json::Value>,
}

impl HooksConfig {
    /// True when no hook arrays and no foreign entries remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pre_tool_use.is_none()
            && self.stop.is_none()
            && self.permission_request.is_none()
            && self.notification.is_none()
            && self.other.is_empty()
    }
}

/// A matcher group: which tools an entry applies to, and its hooks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HookMatcher {
    /// Tool-name matcher; empty string matches every tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matcher: Option<String>,
    /// Hooks to run for matched events.
    pub hooks: Vec<HookEntry>,
}

impl HookMatcher {
    /// Creates a matcher group with a single command hook.
    #[must_use]
    pub fn command(matcher: impl Into<String>, entry: HookEntry) -> Self {
        Self {
            matcher: Some(matcher.into()),
            hooks: vec![entry],
        }
    }

    /// Whether any hook in this group was installed by claude-relay.
    #[must_use]
    pub fn is_relay_matcher(&self) -> bool {
        self.hooks.iter().any(HookEntry::is_relay_hook)
    }
}

/// A single hook entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HookEntry {
    /// Hook type (always "command" for our hooks).
    #[serde(rename = "type")]
    pub hook_type: String,
    /// Command to execute.
    pub command: String,
    /// Timeout in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
}

impl HookEntry {
    /// Creates a new command hook entry.
    #[must_use]
    pub fn command(cmd: impl Into<String>, timeout: Option<u32>) -> Self {
        Self {
            hook_type: "command".to_string(),
            command: cmd.into(),
            timeout,
        }
    }

    /// Checks if this hook entry was created by claude-relay.
    #[must_use]
    pub fn is_relay_hook(&self) -> bool {
        self.command.contains("claude-relay")
    }
}

impl ClaudeSettings {
    /// Loads settings from the given path, defaulting if the file is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &PathBuf) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::ReadError {
            path: path.clone(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| SettingsError::ParseError {
            path: path.clone(),
            source: e,
        })
    }

    /// Saves settings to the given path, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_to(&self, path: &PathBuf) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SettingsError::WriteError {
                path: path.clone(),
                source: e,
            })?;
        }
        let mut content =
            serde_json::to_string_pretty(self).map_err(SettingsError::SerializeError)?;
        content.push('\n');
        std::fs::write(path, content).map_err(|e| SettingsError::WriteError {
            path: path.clone(),
            source: e,
        })
    }
}

/// Errors that can occur when working with Claude settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read settings from {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse settings from {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to write settings to {path}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize settings: {0}")]
    SerializeError(serde_json::Error),
}
