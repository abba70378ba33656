//! Hook orchestration.
//!
//! The control flow every prompting hook shares: check the session gate,
//! consult Claude Code's own rules, take the session lock, consult the
//! cache, then do one Slack round trip and encode the decision. A hook that
//! cannot complete any of these steps emits nothing and exits cleanly; the
//! session must never hang or fail because the remote surface is broken.

use std::path::PathBuf;

use crate::bridge::{Bridge, ReplySignal, SessionLock};
use crate::config::{
    relay_home, ConfigError, PolicyConfig, PolicyLoader, RelayConfig, RelayState,
};
use crate::permissions::{
    build_session_rule, load_cc_permission_rules, tool_has_rule, tool_input_value,
    CachedDecision, SessionCache,
};
use crate::shell::extract_command_prefixes;
use crate::slack::formatting::{
    format_attention_notification, format_plan_approval, format_single_question,
    format_stop_header, format_stop_notification, format_tool_permission, md_to_mrkdwn, truncate,
};
use crate::slack::{SlackWebClient, Transport};
use crate::transcript;

use super::{HookInput, HookKind, PlanApprovalResponse, PreToolUseResponse, StopResponse,
    TimeoutPolicy};

/// Which one-way notification a `notify` invocation is delivering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyEvent {
    Stop,
    Notification,
}

/// Runs hook invocations against the loaded configuration.
#[derive(Debug)]
pub struct HookRunner {
    home: PathBuf,
    config: RelayConfig,
    state: RelayState,
    policy: PolicyConfig,
}

impl HookRunner {
    /// Build a runner over explicit configuration (used by tests).
    #[must_use]
    pub fn new(
        home: PathBuf,
        config: RelayConfig,
        state: RelayState,
        policy: PolicyConfig,
    ) -> Self {
        Self {
            home,
            config,
            state,
            policy,
        }
    }

    /// Load the runner from the relay home and policy search paths.
    ///
    /// # Errors
    ///
    /// Returns an error only if no home directory can be determined.
    pub fn load() -> Result<Self, ConfigError> {
        let home = relay_home()?;
        let config = RelayConfig::load(&home);
        let state = RelayState::load(&home);
        let policy = PolicyLoader::new().load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "policy file invalid, using defaults");
            PolicyConfig::default()
        });
        Ok(Self::new(home, config, state, policy))
    }

    /// Whether this invocation should do anything at all.
    fn gate(&self, input: &HookInput) -> bool {
        if input.session_id.is_empty() || !self.state.is_session_enabled(&input.session_id) {
            tracing::debug!(session = %input.session_id, "session not enabled, skipping");
            return false;
        }
        if !self.config.is_valid() {
            tracing::debug!("config incomplete, skipping");
            return false;
        }
        true
    }

    fn check_auto_allow(&self, tool_name: &str, tool_input: &serde_json::Value) -> bool {
        use crate::config::ToolPolicy;
        if self.policy.policy_for(tool_name) != ToolPolicy::AutoAllow {
            return false;
        }
        let value = tool_input_value(tool_name, tool_input);
        !self.policy.is_sensitive_path(&value)
    }

    /// Handle a `PreToolUse` event. Returns the JSON response to print, or
    /// `None` to emit nothing (pass through).
    pub async fn run_pre_tool_use(&self, input: &HookInput) -> Option<String> {
        if !self.gate(input) {
            return None;
        }
        let tool_name = input.tool_name.clone().unwrap_or_default();
        if tool_name.is_empty() {
            return None;
        }
        let tool_input = input
            .tool_input
            .clone()
            .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()));

        // If Claude Code already has a rule for this call, let it decide
        // locally without a Slack round trip.
        let cwd = input.cwd.clone().unwrap_or_default();
        let cc_rules = load_cc_permission_rules(&cwd);
        if tool_has_rule(&tool_name, &tool_input, &cc_rules) {
            tracing::debug!(tool = %tool_name, "matched a Claude Code rule, skipping Slack");
            return None;
        }

        let is_ask = tool_name == "AskUserQuestion";
        let questions: Vec<serde_json::Value> = if is_ask {
            tool_input
                .get("questions")
                .and_then(serde_json::Value::as_array)
                .cloned()
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        if is_ask && questions.is_empty() {
            return None;
        }

        if !is_ask && self.check_auto_allow(&tool_name, &tool_input) {
            tracing::debug!(tool = %tool_name, "auto-allow (safe tool, non-sensitive path)");
            return Some(PreToolUseResponse::allow(format!("Auto-allowed ({tool_name})")).to_json());
        }

        // Serialize cache-sensitive work across racing invocations of this
        // session. The lock is held through the Slack round trip so
        // parallel prompts arrive in the thread one at a time.
        let session_id = input.session_id.clone();
        let _lock = match tokio::task::spawn_blocking(move || SessionLock::acquire(&session_id))
            .await
        {
            Ok(Ok(lock)) => lock,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "session lock failed, passing through");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "session lock task failed, passing through");
                return None;
            }
        };

        // Re-check the cache now that we hold the lock; a parallel
        // invocation may have cached an approval while we waited.
        let cache = SessionCache::new(&self.home, &input.session_id);
        if cache.lookup(&tool_name, &tool_input) == Some(CachedDecision::Allowed) {
            tracing::debug!(tool = %tool_name, "approved from session cache");
            return Some(
                PreToolUseResponse::allow("Auto-approved from session cache").to_json(),
            );
        }

        let mut unapproved_prefixes: Option<Vec<String>> = None;
        let mut all_prefixes: Option<Vec<String>> = None;
        if !is_ask && tool_name == "Bash" {
            let command = tool_input
                .get("command")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default();
            let check = cache.check_bash_prefixes(command);
            if check.all_approved() {
                tracing::debug!(prefixes = ?check.approved, "all bash prefixes approved");
                return Some(
                    PreToolUseResponse::allow(format!(
                        "Auto-allowed (all prefixes approved: {})",
                        check.approved.join(", ")
                    ))
                    .to_json(),
                );
            }
            if !check.unapproved.is_empty() {
                all_prefixes = Some(extract_command_prefixes(command));
                unapproved_prefixes = Some(check.unapproved);
            }
        }

        let mut bridge =
            match Bridge::connect(&self.home, &self.config, &self.policy, &input.session_id)
                .await
            {
                Ok(bridge) => bridge,
                Err(e) => {
                    tracing::warn!(error = %e, "bridge unavailable, passing through");
                    return None;
                }
            };

        if is_ask {
            ask_questions(&mut bridge, &questions).await
        } else {
            ask_permission(
                &mut bridge,
                &self.policy,
                &cache,
                &tool_name,
                &tool_input,
                unapproved_prefixes,
                all_prefixes,
            )
            .await
        }
    }

    /// Handle a Stop event: post the final message, wait for a continuation.
    pub async fn run_stop(&self, input: &HookInput) -> Option<String> {
        if !self.gate(input) {
            return None;
        }

        // Give Claude Code a moment to flush the transcript to disk.
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;

        let transcript_path = input.transcript_path.clone().unwrap_or_default();
        let assistant_msg = transcript::last_assistant_message(&transcript_path);
        let session_name = transcript::session_name(&transcript_path);

        let header = format_stop_header(
            &input.short_session_id(),
            &session_name,
            &input.project_name(),
        );
        let body = if assistant_msg.is_empty() {
            "_Claude finished (no text response)_".to_string()
        } else {
            truncate(&md_to_mrkdwn(&assistant_msg))
        };

        let mut bridge =
            match Bridge::connect(&self.home, &self.config, &self.policy, &input.session_id)
                .await
            {
                Ok(bridge) => bridge,
                Err(e) => {
                    tracing::warn!(error = %e, "bridge unavailable, allowing stop");
                    return None;
                }
            };

        if let Err(e) = bridge.post(&body, Some(&header)).await {
            tracing::warn!(error = %e, "failed to post stop message, allowing stop");
            return None;
        }

        tracing::debug!(session = %input.short_session_id(), "stop waiting for reply");
        await_stop_reply(&mut bridge).await
    }

    /// Handle a `PermissionRequest` event for `ExitPlanMode`.
    pub async fn run_plan_approval(&self, input: &HookInput) -> Option<String> {
        if !self.gate(input) {
            return None;
        }

        let tool_input = input
            .tool_input
            .clone()
            .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()));
        let plan = tool_input
            .get("plan")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        let allowed_prompts = tool_input
            .get("allowedPrompts")
            .and_then(serde_json::Value::as_array)
            .cloned()
            .unwrap_or_default();

        if plan.is_empty() && allowed_prompts.is_empty() {
            tracing::debug!("no plan content or prompts, approving");
            return Some(PlanApprovalResponse::allow().to_json());
        }

        let text = format_plan_approval(plan, Some(&allowed_prompts));

        let mut bridge =
            match Bridge::connect(&self.home, &self.config, &self.policy, &input.session_id)
                .await
            {
                Ok(bridge) => bridge,
                Err(e) => {
                    tracing::warn!(error = %e, "bridge unavailable, approving plan");
                    return Some(PlanApprovalResponse::allow().to_json());
                }
            };

        ask_plan_approval(&mut bridge, &text).await
    }

    /// Send a one-way notification. Returns false only on delivery failure.
    pub async fn run_notify(&self, input: &HookInput, event: NotifyEvent) -> bool {
        if !self.gate(input) {
            return true;
        }

        let message = match event {
            NotifyEvent::Stop => format_stop_notification(
                &input.project_name(),
                input.stop_reason.as_deref().unwrap_or_default(),
            ),
            NotifyEvent::Notification => {
                if input.notification_type.as_deref() == Some("idle_prompt") {
                    return true;
                }
                format_attention_notification(
                    &input.project_name(),
                    input.message.as_deref().unwrap_or_default(),
                )
            }
        };

        let web = SlackWebClient::new(self.config.bot_token.clone());
        match web.post(&self.config.dm_channel_id, None, &message).await {
            Ok(_) => {
                tracing::debug!(event = ?event, "notification posted");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to send notification");
                false
            }
        }
    }
}

/// The response a hook kind resolves to when its wait times out.
///
/// Realizes the per-kind table from [`HookKind::timeout_policy`]: permission
/// style waits emit nothing (no privileged action), a stop wait lets the
/// stop happen (also by emitting nothing), and a plan wait approves so the
/// session is not wedged behind a dead channel.
#[must_use]
pub fn timeout_response(kind: HookKind) -> Option<String> {
    match kind.timeout_policy() {
        TimeoutPolicy::PassThrough | TimeoutPolicy::NoWait => None,
        TimeoutPolicy::Allow => match kind {
            HookKind::PlanApproval => Some(PlanApprovalResponse::allow().to_json()),
            // Allowing a stop is expressed by emitting nothing.
            _ => None,
        },
    }
}

/// Post a permission prompt and map the reply to a decision.
///
/// Approvals are cached under the session lock the caller already holds;
/// denials never are.
pub async fn ask_permission<T: Transport>(
    bridge: &mut Bridge<T>,
    policy: &PolicyConfig,
    cache: &SessionCache,
    tool_name: &str,
    tool_input: &serde_json::Value,
    unapproved_prefixes: Option<Vec<String>>,
    all_prefixes: Option<Vec<String>>,
) -> Option<String> {
    let text = format_tool_permission(tool_name, tool_input, unapproved_prefixes.as_deref());
    if let Err(e) = bridge.post(&text, None).await {
        tracing::warn!(error = %e, "failed to post permission prompt, passing through");
        return None;
    }

    match bridge.wait_for_reply().await {
        Some(ReplySignal::Approve) => {
            if let Some(rule) = build_session_rule(policy, tool_name, tool_input) {
                match cache.remember_allow(&rule) {
                    Ok(()) => tracing::debug!(rule = %rule, "cached session approval"),
                    Err(e) => tracing::warn!(error = %e, "failed to cache approval"),
                }
            }
            Some(PreToolUseResponse::allow("Approved via Slack").to_json())
        }
        Some(ReplySignal::AlwaysApprove) => {
            let prefixes = all_prefixes.unwrap_or_default();
            if !prefixes.is_empty() {
                match cache.remember_prefixes(&prefixes) {
                    Ok(()) => tracing::debug!(prefixes = ?prefixes, "cached bash prefixes"),
                    Err(e) => tracing::warn!(error = %e, "failed to cache prefixes"),
                }
            }
            Some(
                PreToolUseResponse::allow(format!(
                    "Always-allowed via Slack (prefixes: {})",
                    prefixes.join(", ")
                ))
                .to_json(),
            )
        }
        Some(ReplySignal::Reject) => {
            Some(PreToolUseResponse::deny("Denied via Slack").to_json())
        }
        // Any text reply is a deny carrying the text as feedback. There is
        // no textual allow: explicit affirmation must be an unambiguous
        // positive reaction.
        Some(ReplySignal::Text(reply)) => {
            Some(PreToolUseResponse::deny(format!("User feedback via Slack: {reply}")).to_json())
        }
        None => timeout_response(HookKind::ToolPermission),
    }
}

/// Post questions one at a time, collect answers, deny with the combined
/// response so Claude receives them as feedback.
pub async fn ask_questions<T: Transport>(
    bridge: &mut Bridge<T>,
    questions: &[serde_json::Value],
) -> Option<String> {
    let total = questions.len();
    let mut answers: Vec<String> = Vec::new();

    for (qi, question) in questions.iter().enumerate() {
        let text = format_single_question(question, qi + 1, total);
        if let Err(e) = bridge.post(&text, None).await {
            tracing::warn!(error = %e, "failed to post question, passing through");
            return None;
        }
        match bridge.wait_for_reply().await {
            Some(ReplySignal::Text(reply)) => {
                answers.push(resolve_question_answer(&reply, question));
            }
            // A reaction is not an answer; timing out or reacting leaves
            // the question for the terminal.
            Some(_) | None => return timeout_response(HookKind::Question),
        }
    }

    let combined = if total == 1 {
        answers[0].clone()
    } else {
        questions
            .iter()
            .zip(answers.iter())
            .enumerate()
            .map(|(qi, (q, a))| {
                let header = q
                    .get("header")
                    .and_then(serde_json::Value::as_str)
                    .map_or_else(|| format!("Question {}", qi + 1), String::from);
                format!("{header}: {a}")
            })
            .collect::<Vec<_>>()
            .join("; ")
    };

    let mut confirm_parts: Vec<String> = if total > 1 {
        vec![format!(":white_check_mark: *All {total} answers received*\n")]
    } else {
        Vec::new()
    };
    for (qi, (q, a)) in questions.iter().zip(answers.iter()).enumerate() {
        let header = q
            .get("header")
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| format!("Q{}", qi + 1), String::from);
        confirm_parts.push(format!("*{header}:* {a}"));
    }
    if let Err(e) = bridge.post(&confirm_parts.join("\n"), None).await {
        tracing::debug!(error = %e, "failed to post answer confirmation");
    }

    tracing::debug!(answers = %combined, "question answers combined");
    Some(PreToolUseResponse::deny(format!("User replied from Slack: {combined}")).to_json())
}

/// Wait for a continuation after the stop message was posted.
pub async fn await_stop_reply<T: Transport>(bridge: &mut Bridge<T>) -> Option<String> {
    match bridge.wait_for_reply().await {
        Some(ReplySignal::Text(reply)) => {
            tracing::debug!("stop got reply, blocking stop");
            Some(StopResponse::block(format!("User replied from Slack: {reply}")).to_json())
        }
        // A reaction on the final message just acknowledges it.
        Some(_) => None,
        None => timeout_response(HookKind::Stop),
    }
}

/// Post a plan prompt and map the reply to a `PermissionRequest` decision.
pub async fn ask_plan_approval<T: Transport>(
    bridge: &mut Bridge<T>,
    plan_text: &str,
) -> Option<String> {
    if let Err(e) = bridge.post(plan_text, None).await {
        tracing::warn!(error = %e, "failed to post plan, approving");
        return Some(PlanApprovalResponse::allow().to_json());
    }

    match bridge.wait_for_reply().await {
        Some(ReplySignal::Approve | ReplySignal::AlwaysApprove) => {
            let _ = bridge
                .post(":white_check_mark: *Plan approved.* Starting work.", None)
                .await;
            Some(PlanApprovalResponse::allow().to_json())
        }
        Some(ReplySignal::Reject) => {
            let _ = bridge
                .post(":x: *Plan rejected.* Claude will revise.", None)
                .await;
            Some(PlanApprovalResponse::deny("Plan rejected via Slack").to_json())
        }
        // Feedback text sends the plan back for revision; there is no
        // textual approve.
        Some(ReplySignal::Text(reply)) => {
            let _ = bridge
                .post(
                    &format!(":speech_balloon: *Feedback sent.* Claude will revise.\n> {reply}"),
                    None,
                )
                .await;
            Some(
                PlanApprovalResponse::deny(format!("User feedback via Slack: {reply}")).to_json(),
            )
        }
        None => {
            tracing::debug!("plan approval timed out, approving");
            timeout_response(HookKind::PlanApproval)
        }
    }
}

/// Map a numbered reply back to an option label when possible.
#[must_use]
pub fn resolve_question_answer(reply: &str, question: &serde_json::Value) -> String {
    let reply = reply.trim();
    let options = question
        .get("options")
        .and_then(serde_json::Value::as_array)
        .cloned()
        .unwrap_or_default();
    let multi = question
        .get("multiSelect")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);

    let label_for = |num: usize, fallback: &str| -> String {
        options
            .get(num - 1)
            .and_then(|o| o.get("label"))
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| fallback.to_string(), String::from)
    };

    if let Ok(num) = reply.parse::<usize>() {
        if (1..=options.len()).contains(&num) {
            return label_for(num, reply);
        }
    }

    if multi && reply.contains(',') {
        let labels: Vec<String> = reply
            .split(',')
            .map(str::trim)
            .map(|part| match part.parse::<usize>() {
                Ok(num) if (1..=options.len()).contains(&num) => label_for(num, part),
                _ => part.to_string(),
            })
            .collect();
        if !labels.is_empty() {
            return labels.join(", ");
        }
    }

    reply.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn runner(home: &TempDir, enabled: bool) -> HookRunner {
        let config = RelayConfig {
            bot_token: "xoxb-1".to_string(),
            app_token: "xapp-1".to_string(),
            user_id: "U1".to_string(),
            dm_channel_id: "D1".to_string(),
            timeout: 1,
            claude_homes: Vec::new(),
        };
        let mut state = RelayState::default();
        if enabled {
            state.enable_all();
        }
        HookRunner::new(
            home.path().to_path_buf(),
            config,
            state,
            PolicyConfig::default(),
        )
    }

    #[tokio::test]
    async fn disabled_session_passes_through() {
        let home = TempDir::new().unwrap();
        let runner = runner(&home, false);
        let input = HookInput {
            hook_event_name: "PreToolUse".to_string(),
            session_id: "s1".to_string(),
            tool_name: Some("Bash".to_string()),
            tool_input: Some(json!({"command": "ls"})),
            ..HookInput::default()
        };
        assert!(runner.run_pre_tool_use(&input).await.is_none());
    }

    #[tokio::test]
    async fn empty_session_id_passes_through() {
        let home = TempDir::new().unwrap();
        let runner = runner(&home, true);
        let input = HookInput::default();
        assert!(runner.run_pre_tool_use(&input).await.is_none());
        assert!(runner.run_stop(&input).await.is_none());
    }

    #[tokio::test]
    async fn invalid_config_passes_through() {
        let home = TempDir::new().unwrap();
        let mut state = RelayState::default();
        state.enable_all();
        let runner = HookRunner::new(
            home.path().to_path_buf(),
            RelayConfig::default(),
            state,
            PolicyConfig::default(),
        );
        let input = HookInput {
            session_id: "s1".to_string(),
            tool_name: Some("Bash".to_string()),
            ..HookInput::default()
        };
        assert!(runner.run_pre_tool_use(&input).await.is_none());
    }

    #[tokio::test]
    async fn safe_tool_is_auto_allowed_without_slack() {
        let home = TempDir::new().unwrap();
        let runner = runner(&home, true);
        let input = HookInput {
            session_id: "s1".to_string(),
            tool_name: Some("Grep".to_string()),
            tool_input: Some(json!({"pattern": "foo"})),
            ..HookInput::default()
        };
        let response = runner.run_pre_tool_use(&input).await.unwrap();
        assert!(response.contains("\"permissionDecision\":\"allow\""));
        assert!(response.contains("Auto-allowed (Grep)"));
    }

    #[test]
    fn sensitive_read_is_not_auto_allowed() {
        let home = TempDir::new().unwrap();
        let runner = runner(&home, true);
        assert!(runner.check_auto_allow("Read", &json!({"file_path": "/src/main.rs"})));
        assert!(!runner.check_auto_allow("Read", &json!({"file_path": "/app/.env"})));
        assert!(!runner.check_auto_allow("Bash", &json!({"command": "ls"})));
    }

    #[tokio::test]
    async fn cc_rule_skips_the_round_trip() {
        let home = TempDir::new().unwrap();
        let project = home.path().join("project");
        std::fs::create_dir_all(project.join(".claude")).unwrap();
        std::fs::write(
            project.join(".claude/settings.json"),
            r#"{"permissions": {"allow": ["Bash(cargo *)"]}}"#,
        )
        .unwrap();

        let runner = runner(&home, true);
        let input = HookInput {
            session_id: "s1".to_string(),
            cwd: Some(project.to_string_lossy().into_owned()),
            tool_name: Some("Bash".to_string()),
            tool_input: Some(json!({"command": "cargo build"})),
            ..HookInput::default()
        };
        assert!(runner.run_pre_tool_use(&input).await.is_none());
    }

    #[test]
    fn timeout_table_fails_closed_for_permissions() {
        assert!(timeout_response(HookKind::ToolPermission).is_none());
        assert!(timeout_response(HookKind::Question).is_none());
    }

    #[test]
    fn timeout_table_fails_open_for_stop_and_plan() {
        // Allowing the stop is silence.
        assert!(timeout_response(HookKind::Stop).is_none());
        // An unanswered plan is approved explicitly.
        let plan = timeout_response(HookKind::PlanApproval).unwrap();
        assert!(plan.contains("\"behavior\":\"allow\""));
    }

    #[test]
    fn resolve_answer_maps_numbers_to_labels() {
        let q = json!({
            "options": [{"label": "Fast"}, {"label": "Clean"}]
        });
        assert_eq!(resolve_question_answer("1", &q), "Fast");
        assert_eq!(resolve_question_answer(" 2 ", &q), "Clean");
        assert_eq!(resolve_question_answer("3", &q), "3");
        assert_eq!(resolve_question_answer("my own answer", &q), "my own answer");
    }

    #[test]
    fn resolve_answer_multi_select() {
        let q = json!({
            "multiSelect": true,
            "options": [{"label": "A"}, {"label": "B"}, {"label": "C"}]
        });
        assert_eq!(resolve_question_answer("1,3", &q), "A, C");
        assert_eq!(resolve_question_answer("2, custom", &q), "B, custom");
    }

    #[test]
    fn resolve_answer_without_options_passes_text() {
        let q = json!({});
        assert_eq!(resolve_question_answer("42", &q), "42");
    }
}
