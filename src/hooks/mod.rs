//! Hook handlers for Claude Code events.
//!
//! Each hook invocation is one short-lived process: Claude Code pipes a
//! JSON event description to stdin and reads at most one JSON decision from
//! stdout. [`HookRunner`] carries the control flow; the per-kind response
//! encoders keep the wire formats explicit.

mod handler;
mod input;
mod kind;
mod plan_approval;
mod pre_tool_use;
mod stop;

pub use handler::*;
pub use input::*;
pub use kind::*;
pub use plan_approval::*;
pub use pre_tool_use::*;
pub use stop::*;
