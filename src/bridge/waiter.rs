//! Request/reply waiter internals.
//!
//! Two ways a reply can arrive: pushed over the real-time stream (routed by
//! a background task into a channel the waiter awaits), or fetched by the
//! flat-rate poll loop. Both paths funnel every event through
//! [`EventRouter::route`], so the correlation and acknowledgment rules are
//! identical regardless of mode.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::StreamExt;

use crate::slack::{EventStream, Transport};

use super::{EventRouter, ReplySignal};

/// Consume the real-time stream, acking and forwarding per routing outcome.
///
/// Runs until the stream closes or the signal receiver is dropped.
pub(crate) async fn route_realtime_events(
    mut stream: EventStream,
    router: Arc<Mutex<EventRouter>>,
    signals: mpsc::Sender<ReplySignal>,
) {
    while let Some(envelope) = stream.events.next().await {
        let Some(event) = envelope.event else {
            // Not a reply or reaction; no waiter anywhere wants it.
            let _ = stream.acks.send(envelope.envelope_id).await;
            continue;
        };

        let outcome = {
            let router = router.lock().expect("router mutex poisoned");
            router.route(&event)
        };

        if outcome.ack {
            let _ = stream.acks.send(envelope.envelope_id).await;
        }
        if let Some(signal) = outcome.signal {
            if signals.send(signal).await.is_err() {
                break;
            }
        }
    }
}

/// Poll the transport for a matching reply or reaction until the deadline.
///
/// A flat-rate catch-up loop: no backoff growth, no queuing. Transport
/// errors are logged and retried on the next tick; only the deadline ends
/// the wait empty-handed.
pub(crate) async fn poll_for_signal<T: Transport>(
    transport: &T,
    router: &Arc<Mutex<EventRouter>>,
    channel: &str,
    timeout: Duration,
    interval: Duration,
) -> Option<ReplySignal> {
    let deadline = Instant::now() + timeout;

    loop {
        let (thread_ts, last_post_ts) = {
            let router = router.lock().expect("router mutex poisoned");
            (
                router.thread_ts().map(String::from),
                router.last_post_ts().map(String::from),
            )
        };

        if let Some(thread_ts) = &thread_ts {
            let oldest = last_post_ts.as_deref().unwrap_or(thread_ts);
            match transport.poll_replies(channel, thread_ts, oldest).await {
                Ok(events) => {
                    if let Some(signal) = route_all(router, &events) {
                        tracing::debug!("poll: received reply");
                        return Some(signal);
                    }
                }
                Err(e) => tracing::debug!(error = %e, "poll: fetching replies failed"),
            }
        }

        if let Some(message_ts) = &last_post_ts {
            match transport.poll_reactions(channel, message_ts).await {
                Ok(events) => {
                    if let Some(signal) = route_all(router, &events) {
                        tracing::debug!("poll: received reaction");
                        return Some(signal);
                    }
                }
                Err(e) => tracing::debug!(error = %e, "poll: fetching reactions failed"),
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            tracing::debug!(timeout = ?timeout, "poll: reply timed out");
            return None;
        }
        tokio::time::sleep(remaining.min(interval)).await;
    }
}

fn route_all(
    router: &Arc<Mutex<EventRouter>>,
    events: &[crate::bridge::InboundEvent],
) -> Option<ReplySignal> {
    let router = router.lock().expect("router mutex poisoned");
    events
        .iter()
        .find_map(|event| router.route(event).signal)
}
