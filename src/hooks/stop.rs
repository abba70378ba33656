//! Stop hook response encoding.
//!
//! Allowing the stop is expressed by emitting no response at all; only the
//! block case produces output.

use serde::{Deserialize, Serialize};

/// Decision for a Stop hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopDecision {
    Allow,
    Block,
}

/// Response from a Stop hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopResponse {
    pub decision: StopDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl StopResponse {
    /// Block the stop and feed `reason` back to Claude as the continuation
    /// prompt.
    #[must_use]
    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            decision: StopDecision::Block,
            reason: Some(reason.into()),
        }
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
    fn block_response_format() {
        let json = StopResponse::block("User replied from Slack: keep going").to_json();
        assert!(json.contains("\"decision\":\"block\""));
        assert!(json.contains("keep going"));
    }

    #[test]
    fn decision_vocabulary_roundtrips() {
        let parsed: StopResponse =
            serde_json::from_str(r#"{"decision":"allow"}"#).unwrap();
        assert_eq!(parsed.decision, StopDecision::Allow);
        assert!(parsed.reason.is_none());
    }
}
