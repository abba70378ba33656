//! `PreToolUse` hook response encoding.

use serde::{Deserialize, Serialize};

/// Decision for a `PreToolUse` hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionDecision {
    Allow,
    Deny,
}

/// Inner content of a `PreToolUse` hook response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreToolUseOutput {
    pub hook_event_name: String,
    pub permission_decision: PermissionDecision,
    pub permission_decision_reason: String,
}

/// Response from a `PreToolUse` hook, wrapped in `hookSpecificOutput`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreToolUseResponse {
    pub hook_specific_output: PreToolUseOutput,
}

impl PreToolUseResponse {
    fn with_decision(decision: PermissionDecision, reason: impl Into<String>) -> Self {
        Self {
            hook_specific_output: PreToolUseOutput {
                hook_event_name: super::HookKind::ToolPermission.wire_name().to_string(),
                permission_decision: decision,
                permission_decision_reason: reason.into(),
            },
        }
    }

    #[must_use]
    pub fn allow(reason: impl Into<String>) -> Self {
        Self::with_decision(PermissionDecision::Allow, reason)
    }

    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self::with_decision(PermissionDecision::Deny, reason)
    }

    /// Serialize to the single JSON line Claude Code reads from stdout.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
