//! `PermissionRequest` hook response encoding, used for `ExitPlanMode`.

use serde::{Deserialize, Serialize};

/// Behavior for a `PermissionRequest` decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanBehavior {
    Allow,
    Deny,
}

/// The decision object inside a `PermissionRequest` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDecision {
    pub behavior: PlanBehavior,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Inner content of a `PermissionRequest` hook response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanApprovalOutput {
    pub hook_event_name: String,
    pub decision: PlanDecision,
}

/// Response from a `PermissionRequest` hook, wrapped in
/// `hookSpecificOutput`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanApprovalResponse {
    pub hook_specific_output: PlanApprovalOutput,
}

impl PlanApprovalResponse {
    fn with_decision(behavior: PlanBehavior, message: Option<String>) -> Self {
        Self {
            hook_specific_output: PlanApprovalOutput {
                hook_event_name: super::HookKind::PlanApproval.wire_name().to_string(),
                decision: PlanDecision { behavior, message },
            },
        }
    }

    /// Approve the plan; Claude starts coding.
    #[must_use]
    pub fn allow() -> Self {
        Self::with_decision(PlanBehavior::Allow, None)
    }

    /// Send the plan back for revision with feedback.
    #[must_use]
    pub fn deny(message: impl Into<String>) -> Self {
        Self::with_decision(PlanBehavior::Deny, Some(message.into()))
    }

    /// Serialize to the single JSON line Claude Code reads from stdout.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_response_format() {
        let json = PlanApprovalResponse::allow().to_json();
        assert!(json.contains("\"hookEventName\":\"PermissionRequest\""));
        assert!(json.contains("\"behavior\":\"allow\""));
        assert!(!json.contains("message"));
    }

    #[test]
    fn deny_response_carries_feedback() {
        let json = PlanApprovalResponse::deny("User requested changes via Slack: use sqlite")
            .to_json();
        assert!(json.contains("\"behavior\":\"deny\""));
        assert!(json.contains("use sqlite"));
    }
}
