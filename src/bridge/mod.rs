//! The connection/coordination layer.
//!
//! Everything with real concurrency and failure-mode design lives here:
//!
//! - [`ConnectionArbiter`] decides, per OS process, whether it gets the
//!   exclusive real-time connection or must fall back to polling.
//! - [`EventRouter`] matches inbound events to the pending prompt by
//!   correlation marker and decides whether an event may be acknowledged.
//! - [`Bridge`] posts prompts and blocks for a reply with a timeout, over
//!   whichever transport mode the arbiter granted.
//! - [`SessionLock`] serializes permission-cache-sensitive work across
//!   concurrently racing invocations of one session.
//!
//! Both leases are flock(2)-based: the kernel drops them when the holding
//! process exits or crashes, so no cleanup code has to run.

mod arbiter;
mod connection;
mod flock;
mod router;
mod session_lock;
mod waiter;

pub use arbiter::*;
pub use connection::*;
pub use router::*;
pub use session_lock::*;
