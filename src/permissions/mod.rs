//! Claude Code permission rule loading and the session approval cache.
//!
//! [`rules`] reads Claude Code's own permission rules from settings files
//! (read-only, never writes) so a tool call that already has an allow/deny
//! rule skips the Slack round trip entirely. [`cache`] remembers approvals
//! granted from Slack so repeated uses of an approved tool/file within a
//! session don't prompt again.

mod cache;
mod rules;

pub use cache::*;
pub use rules::*;
