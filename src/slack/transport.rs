//! Transport seams between the bridge core and Slack.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::bridge::InboundEvent;

/// Errors from transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Slack API error: {0}")]
    Api(String),

    #[error("Unexpected Slack API response: missing {0}")]
    MalformedResponse(&'static str),

    #[error("Invalid Socket Mode URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("WebSocket error: {0}")]
    WebSocket(String),
}

/// A message successfully posted to the chat surface.
#[derive(Debug, Clone)]
pub struct PostedMessage {
    /// The message timestamp, Slack's message identifier. Doubles as the
    /// correlation marker for replies and reactions.
    pub ts: String,
}

/// An event delivered over the real-time connection, paired with the
/// envelope identifier needed to acknowledge it.
#[derive(Debug, Clone)]
pub struct RealtimeEnvelope {
    pub envelope_id: String,
    /// `None` for envelope types that carry no reply or reaction; those are
    /// acknowledged unconditionally.
    pub event: Option<InboundEvent>,
}

/// A live subscription to the real-time event stream.
///
/// Events arrive on `events`; an event is acknowledged (and thus not
/// redelivered) by sending its envelope id into `acks`. Events that are
/// never acknowledged are redelivered by the transport to whichever
/// connection owns them next.
#[derive(Debug)]
pub struct EventStream {
    pub events: ReceiverStream<RealtimeEnvelope>,
    pub acks: mpsc::Sender<String>,
}

/// Posting and polling against the chat surface.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Post a message, threaded under `thread_ts` when given. Returns the
    /// new message's marker.
    async fn post(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        text: &str,
    ) -> Result<PostedMessage, TransportError>;

    /// Fetch thread replies newer than `oldest_ts`.
    async fn poll_replies(
        &self,
        channel: &str,
        thread_ts: &str,
        oldest_ts: &str,
    ) -> Result<Vec<InboundEvent>, TransportError>;

    /// Fetch reactions currently on a message.
    async fn poll_reactions(
        &self,
        channel: &str,
        message_ts: &str,
    ) -> Result<Vec<InboundEvent>, TransportError>;
}

/// The low-latency push variant of the transport.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Whether this transport is configured and worth attempting.
    fn is_available(&self) -> bool;

    /// Open the real-time connection and return its event stream. The
    /// connection closes when `shutdown` is cancelled or the stream is
    /// dropped.
    async fn subscribe(&self, shutdown: CancellationToken)
        -> Result<EventStream, TransportError>;
}
