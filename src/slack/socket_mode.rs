//! Slack Socket Mode client.
//!
//! Opens the WebSocket URL handed out by `apps.connections.open` and turns
//! incoming envelopes into [`RealtimeEnvelope`]s. Acknowledgment is *not*
//! automatic: the bridge decides per event whether to ack, so replies meant
//! for another process's thread stay unacknowledged and Slack redelivers
//! them to the connection that owns them.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::bridge::InboundEvent;

use super::{EventStream, RealtimeEnvelope, RealtimeTransport, TransportError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const SLACK_API_BASE: &str = "https://slack.com/api";
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Socket Mode client authenticated with an app-level token.
#[derive(Debug, Clone)]
pub struct SocketModeClient {
    client: Client,
    base_url: String,
    app_token: String,
}

impl SocketModeClient {
    /// Create a new client for the given app-level token (`xapp-...`).
    #[must_use]
    pub fn new(app_token: impl Into<String>) -> Self {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            base_url: SLACK_API_BASE.to_string(),
            app_token: app_token.into(),
        }
    }

    /// Override the API base URL (used by tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Request a fresh WebSocket URL from `apps.connections.open`.
    async fn connections_open(&self) -> Result<Url, TransportError> {
        let url = format!(
            "{}/apps.connections.open",
            self.base_url.trim_end_matches('/')
        );
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.app_token)
            .send()
            .await?
            .json::<serde_json::Value>()
            .await?;

        if resp.get("ok").and_then(serde_json::Value::as_bool) != Some(true) {
            let error = resp
                .get("error")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown_error");
            return Err(TransportError::Api(format!(
                "apps.connections.open: {error}"
            )));
        }

        let wss = resp
            .get("url")
            .and_then(serde_json::Value::as_str)
            .ok_or(TransportError::MalformedResponse("url"))?;
        Ok(Url::parse(wss)?)
    }
}

#[async_trait]
impl RealtimeTransport for SocketModeClient {
    fn is_available(&self) -> bool {
        !self.app_token.is_empty()
    }

    async fn subscribe(
        &self,
        shutdown: CancellationToken,
    ) -> Result<EventStream, TransportError> {
        let wss_url = self.connections_open().await?;
        let (ws, _response) = tokio_tungstenite::connect_async(wss_url.as_str())
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))?;
        tracing::debug!("socket mode connected");

        let (mut sink, mut stream) = ws.split();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (ack_tx, mut ack_rx) = mpsc::channel::<String>(EVENT_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        let _ = sink.close().await;
                        tracing::debug!("socket mode disconnected");
                        break;
                    }
                    Some(envelope_id) = ack_rx.recv() => {
                        let ack = serde_json::json!({ "envelope_id": envelope_id });
                        if sink.send(Message::text(ack.to_string())).await.is_err() {
                            tracing::warn!("socket mode ack failed, connection lost");
                            break;
                        }
                    }
                    msg = stream.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(envelope) = parse_envelope(text.as_str()) {
                                if event_tx.send(envelope).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "socket mode read error");
                            break;
                        }
                        None => {
                            tracing::debug!("socket mode stream closed");
                            break;
                        }
                    }
                }
            }
        });

        Ok(EventStream {
            events: tokio_stream::wrappers::ReceiverStream::new(event_rx),
            acks: ack_tx,
        })
    }
}

/// Parse one Socket Mode frame into an envelope.
///
/// Frames without an envelope id (`hello`, `disconnect`) need no ack and
/// yield `None`. Envelopes that are not events-api payloads, or whose event
/// is neither a thread reply nor a reaction, carry `event: None` and are
/// acknowledged unconditionally by the bridge.
fn parse_envelope(text: &str) -> Option<RealtimeEnvelope> {
    let frame: serde_json::Value = serde_json::from_str(text).ok()?;
    let envelope_id = frame
        .get("envelope_id")
        .and_then(serde_json::Value::as_str)?
        .to_string();

    let frame_type = frame.get("type").and_then(serde_json::Value::as_str);
    if frame_type != Some("events_api") {
        return Some(RealtimeEnvelope {
            envelope_id,
            event: None,
        });
    }

    let event = frame
        .get("payload")
        .and_then(|p| p.get("event"))
        .and_then(parse_event);
    Some(RealtimeEnvelope { envelope_id, event })
}

/// Normalize an events-api event into the bridge's event shape.
fn parse_event(event: &serde_json::Value) -> Option<InboundEvent> {
    let event_type = event.get("type").and_then(serde_json::Value::as_str)?;
    match event_type {
        "message" => {
            // Only thread replies can answer a prompt.
            let thread_ts = event.get("thread_ts").and_then(serde_json::Value::as_str)?;
            Some(InboundEvent::ThreadReply {
                channel: str_field(event, "channel"),
                thread_ts: thread_ts.to_string(),
                ts: str_field(event, "ts"),
                user: opt_str_field(event, "user"),
                bot_id: opt_str_field(event, "bot_id"),
                subtype: opt_str_field(event, "subtype"),
                text: str_field(event, "text"),
            })
        }
        "reaction_added" => {
            let item = event.get("item")?;
            Some(InboundEvent::Reaction {
                channel: str_field(item, "channel"),
                message_ts: str_field(item, "ts"),
                user: opt_str_field(event, "user"),
                name: str_field(event, "reaction"),
            })
        }
        _ => None,
    }
}

fn str_field(value: &serde_json::Value, key: &str) -> String {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn opt_str_field(value: &serde_json::Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(String::from)
}
