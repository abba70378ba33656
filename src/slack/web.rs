//! Slack Web API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::bridge::InboundEvent;

use super::{PostedMessage, Transport, TransportError};

/// Connection timeout for HTTP requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Overall request timeout for HTTP requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const SLACK_API_BASE: &str = "https://slack.com/api";

/// Build an HTTP client with proper timeout configuration.
fn build_http_client() -> Client {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .expect("Failed to build HTTP client")
}

/// Result of `auth.test`.
#[derive(Debug, Clone)]
pub struct AuthInfo {
    /// The bot's own user id, used to filter the bot's messages out of
    /// polled replies.
    pub user_id: String,
}

/// Slack Web API client authenticated with a bot token.
#[derive(Debug, Clone)]
pub struct SlackWebClient {
    client: Client,
    base_url: String,
    bot_token: String,
}

impl SlackWebClient {
    /// Create a new client for the given bot token.
    #[must_use]
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            client: build_http_client(),
            base_url: SLACK_API_BASE.to_string(),
            bot_token: bot_token.into(),
        }
    }

    /// Override the API base URL (used by tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// POST a method with a JSON body and return the parsed response.
    async fn call_json(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, TransportError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), method);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.bot_token)
            .json(body)
            .send()
            .await?
            .json::<serde_json::Value>()
            .await?;
        check_ok(method, resp)
    }

    /// POST a method with form parameters and return the parsed response.
    async fn call_form(
        &self,
        method: &str,
        params: &[(&str, &str)],
    ) -> Result<serde_json::Value, TransportError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), method);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.bot_token)
            .form(params)
            .send()
            .await?
            .json::<serde_json::Value>()
            .await?;
        check_ok(method, resp)
    }

    /// Identify the bot user behind this token.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the token is rejected.
    pub async fn auth_test(&self) -> Result<AuthInfo, TransportError> {
        let resp = self.call_form("auth.test", &[]).await?;
        let user_id = resp
            .get("user_id")
            .and_then(serde_json::Value::as_str)
            .ok_or(TransportError::MalformedResponse("user_id"))?
            .to_string();
        Ok(AuthInfo { user_id })
    }

    /// Open (or reopen) a DM conversation with a user. Returns the channel id.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the user is unknown.
    pub async fn open_dm(&self, user_id: &str) -> Result<String, TransportError> {
        let resp = self
            .call_form("conversations.open", &[("users", user_id)])
            .await?;
        resp.get("channel")
            .and_then(|c| c.get("id"))
            .and_then(serde_json::Value::as_str)
            .map(String::from)
            .ok_or(TransportError::MalformedResponse("channel.id"))
    }
}

/// Fail on `"ok": false` responses, mapping Slack's error string.
fn check_ok(method: &str, resp: serde_json::Value) -> Result<serde_json::Value, TransportError> {
    if resp.get("ok").and_then(serde_json::Value::as_bool) == Some(true) {
        Ok(resp)
    } else {
        let error = resp
            .get("error")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown_error");
        Err(TransportError::Api(format!("{method}: {error}")))
    }
}

#[async_trait]
impl Transport for SlackWebClient {
    async fn post(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        text: &str,
    ) -> Result<PostedMessage, TransportError> {
        let mut body = serde_json::json!({
            "channel": channel,
            "text": text,
        });
        if let Some(ts) = thread_ts {
            body["thread_ts"] = serde_json::Value::String(ts.to_string());
        }

        let resp = self.call_json("chat.postMessage", &body).await?;
        let ts = resp
            .get("ts")
            .and_then(serde_json::Value::as_str)
            .ok_or(TransportError::MalformedResponse("ts"))?
            .to_string();
        Ok(PostedMessage { ts })
    }

    async fn poll_replies(
        &self,
        channel: &str,
        thread_ts: &str,
        oldest_ts: &str,
    ) -> Result<Vec<InboundEvent>, TransportError> {
        let resp = self
            .call_form(
                "conversations.replies",
                &[
                    ("channel", channel),
                    ("ts", thread_ts),
                    ("oldest", oldest_ts),
                    ("limit", "10"),
                ],
            )
            .await?;

        let messages = resp
            .get("messages")
            .and_then(serde_json::Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(messages
            .iter()
            .map(|msg| InboundEvent::ThreadReply {
                channel: channel.to_string(),
                thread_ts: msg
                    .get("thread_ts")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or(thread_ts)
                    .to_string(),
                ts: field(msg, "ts"),
                user: opt_field(msg, "user"),
                bot_id: opt_field(msg, "bot_id"),
                subtype: opt_field(msg, "subtype"),
                text: field(msg, "text"),
            })
            .collect())
    }

    async fn poll_reactions(
        &self,
        channel: &str,
        message_ts: &str,
    ) -> Result<Vec<InboundEvent>, TransportError> {
        let resp = self
            .call_form(
                "reactions.get",
                &[("channel", channel), ("timestamp", message_ts)],
            )
            .await?;

        let reactions = resp
            .get("message")
            .and_then(|m| m.get("reactions"))
            .and_then(serde_json::Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut events = Vec::new();
        for reaction in &reactions {
            let name = field(reaction, "name");
            let users = reaction
                .get("users")
                .and_then(serde_json::Value::as_array)
                .cloned()
                .unwrap_or_default();
            for user in users.iter().filter_map(serde_json::Value::as_str) {
                events.push(InboundEvent::Reaction {
                    channel: channel.to_string(),
                    message_ts: message_ts.to_string(),
                    user: Some(user.to_string()),
                    name: name.clone(),
                });
            }
        }
        Ok(events)
    }
}

fn field(value: &serde_json::Value, key: &str) -> String {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn opt_field(value: &serde_json::Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_ok_passes_success() {
        let resp = serde_json::json!({"ok": true, "ts": "1.2"});
        assert!(check_ok("chat.postMessage", resp).is_ok());
    }

    #[test]
    fn check_ok_maps_error_string() {
        let resp = serde_json::json!({"ok": false, "error": "channel_not_found"});
        let err = check_ok("chat.postMessage", resp).unwrap_err();
        assert!(err.to_string().contains("channel_not_found"));
    }

    #[test]
    fn check_ok_handles_missing_error_field() {
        let resp = serde_json::json!({"ok": false});
        let err = check_ok("auth.test", resp).unwrap_err();
        assert!(err.to_string().contains("unknown_error"));
    }
}
