//! Hook input types for Claude Code events.

use serde::{Deserialize, Serialize};

/// Input received from Claude Code hook events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookInput {
    /// The hook event name (`PreToolUse`, `Stop`, `PermissionRequest`, ...).
    #[serde(default)]
    pub hook_event_name: String,

    /// The session ID for the current Claude Code session.
    #[serde(default)]
    pub session_id: String,

    /// Current working directory.
    #[serde(default)]
    pub cwd: Option<String>,

    /// Path to the transcript file.
    #[serde(default)]
    pub transcript_path: Option<String>,

    /// Tool name (for `PreToolUse` and `PermissionRequest` events).
    #[serde(default)]
    pub tool_name: Option<String>,

    /// Tool input parameters.
    #[serde(default)]
    pub tool_input: Option<serde_json::Value>,

    /// Whether the stop hook is already driving a continuation.
    #[serde(default)]
    pub stop_hook_active: Option<bool>,

    /// Stop reason (for Stop notification events).
    #[serde(default)]
    pub stop_reason: Option<String>,

    /// Notification body (for Notification events).
    #[serde(default)]
    pub message: Option<String>,

    /// Notification subtype (e.g. `idle_prompt`).
    #[serde(default)]
    pub notification_type: Option<String>,
}

impl HookInput {
    /// Parse hook input from the JSON Claude Code writes to stdin.
    ///
    /// Malformed input yields the default (empty) input; hooks then exit
    /// silently rather than wedging the session.
    #[must_use]
    pub fn from_json(input: &str) -> Self {
        serde_json::from_str(input).unwrap_or_default()
    }

    /// The project name: the basename of the working directory.
    #[must_use]
    pub fn project_name(&self) -> String {
        self.cwd
            .as_deref()
            .and_then(|cwd| {
                std::path::Path::new(cwd)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// The first eight characters of the session id, for display.
    #[must_use]
    pub fn short_session_id(&self) -> String {
        self.session_id.chars().take(8).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_pre_tool_use() {
        let input = HookInput::from_json(
            r#"{
                "hook_event_name": "PreToolUse",
                "session_id": "abc123def456",
                "cwd": "/home/user/project",
                "tool_name": "Bash",
                "tool_input": {"command": "ls -la"}
            }"#,
        );
        assert_eq!(input.hook_event_name, "PreToolUse");
        assert_eq!(input.session_id, "abc123def456");
        assert_eq!(input.tool_name.as_deref(), Some("Bash"));
        assert_eq!(input.project_name(), "project");
        assert_eq!(input.short_session_id(), "abc123de");
    }

    #[test]
    fn deserialize_stop_event() {
        let input = HookInput::from_json(
            r#"{"hook_event_name": "Stop", "session_id": "abc", "stop_hook_active": true}"#,
        );
        assert_eq!(input.stop_hook_active, Some(true));
    }

    #[test]
    fn malformed_json_yields_default() {
        let input = HookInput::from_json("not json at all");
        assert!(input.session_id.is_empty());
        assert_eq!(input.project_name(), "unknown");
    }

    #[test]
    fn deserialize_notification_fields() {
        let input = HookInput::from_json(
            r#"{
                "hook_event_name": "Notification",
                "session_id": "abc",
                "message": "Claude needs your permission",
                "notification_type": "idle_prompt"
            }"#,
        );
        assert_eq!(input.message.as_deref(), Some("Claude needs your permission"));
        assert_eq!(input.notification_type.as_deref(), Some("idle_prompt"));
    }
}
