//! The event router.
//!
//! Inbound events from either transport mode (Socket Mode push or Web API
//! poll results) are normalized into [`InboundEvent`] and matched against
//! the most recently posted prompt. The acknowledgment rule is the load
//! bearing part: an event is acked only when its correlation marker matches
//! ours. A reply in another session's thread, or a reaction on a message we
//! didn't post, stays unacknowledged so the transport redelivers it to the
//! connection that owns it. Without this, one process's bridge would
//! silently swallow events meant for another.

/// A normalized inbound event from the chat surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A message posted into a thread.
    ThreadReply {
        channel: String,
        /// The thread's root timestamp: the reply's correlation marker.
        thread_ts: String,
        /// This message's own timestamp.
        ts: String,
        user: Option<String>,
        bot_id: Option<String>,
        subtype: Option<String>,
        text: String,
    },
    /// An emoji reaction added to a message.
    Reaction {
        channel: String,
        /// Timestamp of the reacted-to message: the reaction's correlation
        /// marker.
        message_ts: String,
        user: Option<String>,
        name: String,
    },
}

/// What a consumed event means to the waiting invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplySignal {
    /// Positive reaction: allow.
    Approve,
    /// Negative reaction: deny.
    Reject,
    /// Fast-forward reaction: allow and remember the command prefixes.
    AlwaysApprove,
    /// Free-text reply. There is no free-text allow: callers treat text as
    /// a deny carrying feedback.
    Text(String),
}

/// Result of routing one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteOutcome {
    /// The signal to hand to the waiter, if the event was consumed.
    pub signal: Option<ReplySignal>,
    /// Whether to acknowledge the event to the transport. Unacknowledged
    /// events are redelivered and may be consumed elsewhere.
    pub ack: bool,
}

impl RouteOutcome {
    fn ignore_unacked() -> Self {
        Self {
            signal: None,
            ack: false,
        }
    }

    fn ignore_acked() -> Self {
        Self {
            signal: None,
            ack: true,
        }
    }

    fn consume(signal: ReplySignal) -> Self {
        Self {
            signal: Some(signal),
            ack: true,
        }
    }
}

/// Emoji reactions mapped to allow/deny, so users can react instead of
/// typing.
const REACTION_ALLOW: &[&str] = &["+1", "thumbsup", "white_check_mark", "heavy_check_mark"];
const REACTION_DENY: &[&str] = &["-1", "thumbsdown", "x", "no_entry_sign", "no_entry"];
const REACTION_ALWAYS_ALLOW: &[&str] = &[
    "fast_forward",
    "black_right_pointing_double_triangle_with_vertical_bar",
];

/// Matches inbound events against this bridge's pending prompt.
#[derive(Debug)]
pub struct EventRouter {
    channel_id: String,
    verified_user: Option<String>,
    bot_user_id: Option<String>,
    thread_ts: Option<String>,
    last_post_ts: Option<String>,
}

impl EventRouter {
    /// Router for a DM channel, honoring only the verified user's events.
    #[must_use]
    pub fn new(channel_id: impl Into<String>, verified_user: Option<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            verified_user,
            bot_user_id: None,
            thread_ts: None,
            last_post_ts: None,
        }
    }

    /// Record the bot's own user id so its messages are never consumed.
    pub fn set_bot_user(&mut self, user_id: impl Into<String>) {
        self.bot_user_id = Some(user_id.into());
    }

    /// Record the session's thread.
    pub fn set_thread(&mut self, thread_ts: impl Into<String>) {
        self.thread_ts = Some(thread_ts.into());
    }

    /// Record the most recently posted prompt's marker. Replies at or before
    /// this timestamp, and reactions on any other message, no longer match.
    pub fn note_posted(&mut self, ts: impl Into<String>) {
        self.last_post_ts = Some(ts.into());
    }

    /// The session's thread, once one exists.
    #[must_use]
    pub fn thread_ts(&self) -> Option<&str> {
        self.thread_ts.as_deref()
    }

    /// The current correlation marker.
    #[must_use]
    pub fn last_post_ts(&self) -> Option<&str> {
        self.last_post_ts.as_deref()
    }

    /// Decide whether an event may be consumed, and whether to ack it.
    #[must_use]
    pub fn route(&self, event: &InboundEvent) -> RouteOutcome {
        match event {
            InboundEvent::ThreadReply {
                channel,
                thread_ts,
                ts,
                user,
                bot_id,
                subtype,
                text,
            } => {
                if subtype.is_some() {
                    // Joins, edits, etc. are noise; nothing else will want
                    // them either.
                    return RouteOutcome::ignore_acked();
                }
                // A reply in a thread we don't own belongs to another
                // bridge. Leave it unacked so it is redelivered there.
                if self.thread_ts.as_deref() != Some(thread_ts.as_str()) {
                    return RouteOutcome::ignore_unacked();
                }
                if channel != &self.channel_id {
                    return RouteOutcome::ignore_acked();
                }
                if bot_id.is_some() {
                    return RouteOutcome::ignore_acked();
                }
                if self.bot_user_id.is_some() && user.as_deref() == self.bot_user_id.as_deref() {
                    return RouteOutcome::ignore_acked();
                }
                if let Some(verified) = &self.verified_user {
                    if user.as_deref() != Some(verified.as_str()) {
                        tracing::debug!(user = ?user, "ignoring reply from non-verified user");
                        return RouteOutcome::ignore_acked();
                    }
                }
                // Slack timestamps are fixed-width decimal strings, so
                // lexicographic order is chronological order.
                if let Some(last) = &self.last_post_ts {
                    if ts.as_str() <= last.as_str() {
                        tracing::debug!(ts = %ts, last_post = %last, "ignoring stale message");
                        return RouteOutcome::ignore_acked();
                    }
                }
                RouteOutcome::consume(ReplySignal::Text(text.clone()))
            }
            InboundEvent::Reaction {
                channel,
                message_ts,
                user,
                name,
            } => {
                // A reaction on a message we didn't post belongs to another
                // bridge. Leave it unacked.
                if self.last_post_ts.as_deref() != Some(message_ts.as_str()) {
                    return RouteOutcome::ignore_unacked();
                }
                if channel != &self.channel_id {
                    return RouteOutcome::ignore_acked();
                }
                if let Some(verified) = &self.verified_user {
                    if user.as_deref() != Some(verified.as_str()) {
                        return RouteOutcome::ignore_acked();
                    }
                }
                if REACTION_ALLOW.contains(&name.as_str()) {
                    tracing::debug!(reaction = %name, "reaction -> allow");
                    RouteOutcome::consume(ReplySignal::Approve)
                } else if REACTION_DENY.contains(&name.as_str()) {
                    tracing::debug!(reaction = %name, "reaction -> deny");
                    RouteOutcome::consume(ReplySignal::Reject)
                } else if REACTION_ALWAYS_ALLOW.contains(&name.as_str()) {
                    tracing::debug!(reaction = %name, "reaction -> always allow");
                    RouteOutcome::consume(ReplySignal::AlwaysApprove)
                } else {
                    RouteOutcome::ignore_acked()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> EventRouter {
        let mut r = EventRouter::new("D1", Some("U1".to_string()));
        r.set_bot_user("B_USER");
        r.set_thread("100.0");
        r.note_posted("105.0");
        r
    }

    fn reply(thread_ts: &str, ts: &str, user: &str, text: &str) -> InboundEvent {
        InboundEvent::ThreadReply {
            channel: "D1".to_string(),
            thread_ts: thread_ts.to_string(),
            ts: ts.to_string(),
            user: Some(user.to_string()),
            bot_id: None,
            subtype: None,
            text: text.to_string(),
        }
    }

    fn reaction(message_ts: &str, user: &str, name: &str) -> InboundEvent {
        InboundEvent::Reaction {
            channel: "D1".to_string(),
            message_ts: message_ts.to_string(),
            user: Some(user.to_string()),
            name: name.to_string(),
        }
    }

    #[test]
    fn matching_reply_is_consumed_and_acked() {
        let outcome = router().route(&reply("100.0", "106.0", "U1", "go ahead"));
        assert!(outcome.ack);
        assert_eq!(
            outcome.signal,
            Some(ReplySignal::Text("go ahead".to_string()))
        );
    }

    #[test]
    fn foreign_thread_reply_is_left_unacked() {
        let outcome = router().route(&reply("999.0", "106.0", "U1", "not for us"));
        assert!(!outcome.ack);
        assert!(outcome.signal.is_none());
    }

    #[test]
    fn reply_with_no_thread_of_our_own_is_left_unacked() {
        let fresh = EventRouter::new("D1", Some("U1".to_string()));
        let outcome = fresh.route(&reply("100.0", "106.0", "U1", "hello"));
        assert!(!outcome.ack);
        assert!(outcome.signal.is_none());
    }

    #[test]
    fn stale_reply_is_acked_but_not_consumed() {
        // Sent before our latest prompt; it answered something older.
        let outcome = router().route(&reply("100.0", "104.0", "U1", "old answer"));
        assert!(outcome.ack);
        assert!(outcome.signal.is_none());

        // Equal timestamp is our own post.
        let outcome = router().route(&reply("100.0", "105.0", "U1", "same instant"));
        assert!(outcome.ack);
        assert!(outcome.signal.is_none());
    }

    #[test]
    fn reply_from_unverified_user_is_not_consumed() {
        let outcome = router().route(&reply("100.0", "106.0", "U_OTHER", "hijack"));
        assert!(outcome.ack);
        assert!(outcome.signal.is_none());
    }

    #[test]
    fn bot_messages_are_not_consumed() {
        let mut event = reply("100.0", "106.0", "U1", "echo");
        if let InboundEvent::ThreadReply { bot_id, .. } = &mut event {
            *bot_id = Some("B1".to_string());
        }
        let outcome = router().route(&event);
        assert!(outcome.ack);
        assert!(outcome.signal.is_none());

        let outcome = router().route(&reply("100.0", "106.0", "B_USER", "self"));
        assert!(outcome.signal.is_none());
    }

    #[test]
    fn subtyped_messages_are_ignored() {
        let mut event = reply("100.0", "106.0", "U1", "edited");
        if let InboundEvent::ThreadReply { subtype, .. } = &mut event {
            *subtype = Some("message_changed".to_string());
        }
        let outcome = router().route(&event);
        assert!(outcome.ack);
        assert!(outcome.signal.is_none());
    }

    #[test]
    fn wrong_channel_reply_is_not_consumed() {
        let mut event = reply("100.0", "106.0", "U1", "elsewhere");
        if let InboundEvent::ThreadReply { channel, .. } = &mut event {
            *channel = "D_OTHER".to_string();
        }
        assert!(router().route(&event).signal.is_none());
    }

    #[test]
    fn positive_reaction_on_our_post_approves() {
        for name in ["+1", "thumbsup", "white_check_mark", "heavy_check_mark"] {
            let outcome = router().route(&reaction("105.0", "U1", name));
            assert!(outcome.ack);
            assert_eq!(outcome.signal, Some(ReplySignal::Approve), "{name}");
        }
    }

    #[test]
    fn negative_reaction_on_our_post_rejects() {
        for name in ["-1", "thumbsdown", "x", "no_entry_sign", "no_entry"] {
            let outcome = router().route(&reaction("105.0", "U1", name));
            assert_eq!(outcome.signal, Some(ReplySignal::Reject), "{name}");
        }
    }

    #[test]
    fn fast_forward_reaction_always_approves() {
        let outcome = router().route(&reaction("105.0", "U1", "fast_forward"));
        assert_eq!(outcome.signal, Some(ReplySignal::AlwaysApprove));
    }

    #[test]
    fn unknown_reaction_is_acked_but_ignored() {
        let outcome = router().route(&reaction("105.0", "U1", "eyes"));
        assert!(outcome.ack);
        assert!(outcome.signal.is_none());
    }

    #[test]
    fn reaction_on_foreign_message_is_left_unacked() {
        let outcome = router().route(&reaction("999.0", "U1", "thumbsup"));
        assert!(!outcome.ack);
        assert!(outcome.signal.is_none());
    }

    #[test]
    fn reaction_from_unverified_user_is_ignored() {
        let outcome = router().route(&reaction("105.0", "U_OTHER", "thumbsup"));
        assert!(outcome.ack);
        assert!(outcome.signal.is_none());
    }

    #[test]
    fn markers_advance_with_each_post() {
        let mut r = router();
        assert_eq!(r.last_post_ts(), Some("105.0"));

        r.note_posted("110.0");
        // Reaction on the earlier prompt no longer matches.
        let outcome = r.route(&reaction("105.0", "U1", "thumbsup"));
        assert!(!outcome.ack);
        // Replies must now be newer than the new prompt.
        assert!(r.route(&reply("100.0", "108.0", "U1", "late")).signal.is_none());
        assert!(r.route(&reply("100.0", "111.0", "U1", "fresh")).signal.is_some());
    }
}
