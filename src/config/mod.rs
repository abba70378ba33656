//! Configuration and persistent state for claude-relay.
//!
//! All persistent state lives under the relay home (`~/.claude-relay` by
//! default, overridable via `CLAUDE_RELAY_HOME`):
//!
//! - `config.json` — Slack tokens, verified user, DM channel (mode 0600)
//! - `state.json` — which sessions are enabled for Slack routing
//! - `slack/threads/` — per-session Slack thread state
//! - `sessions/` — per-session permission caches
//! - `logs/` — hook debug logs
//! - `bridge.lock` — the system-wide connection lease file
//!
//! Tunables (timeouts, poll interval, tool policies) load separately from a
//! TOML file, see [`PolicyConfig`].

mod claude_settings;
mod policy;
mod types;

pub use claude_settings::*;
pub use policy::*;
pub use types::*;
